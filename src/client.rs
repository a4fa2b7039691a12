use std::sync::Arc;
use std::time::Duration;

use crate::api::ApiClient;
use crate::auth::credentials::CredentialStore;
use crate::auth::session::{SessionHandle, SessionState};
use crate::auth::SessionManager;
use crate::cache::QueryCache;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::mutations::MutationCoordinator;

/// Top-level wiring for the client core.
///
/// Owns one of each component and the shared session handle they read from.
/// The UI talks to this type: session flows through `auth()`, reads through
/// the typed operations in `ops/`, cache introspection through `cache()`.
pub struct PlantMateClient {
    config: ClientConfig,
    session: SessionHandle,
    api: Arc<ApiClient>,
    cache: QueryCache,
    auth: SessionManager,
    mutations: MutationCoordinator,
}

impl PlantMateClient {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let session = SessionHandle::new();
        let api = Arc::new(ApiClient::new(&config, session.clone())?);
        let cache = QueryCache::new(session.clone(), Duration::from_secs(config.cache_ttl_secs));
        let store = CredentialStore::new(config.credentials_file());
        let auth = SessionManager::new(api.clone(), cache.clone(), store, session.clone());
        let mutations = MutationCoordinator::new(cache.clone());

        Ok(Self {
            config,
            session,
            api,
            cache,
            auth,
            mutations,
        })
    }

    /// Restore any saved session. Call once at startup; resolves the
    /// session's `Unknown` state.
    pub async fn start(&self) -> SessionState {
        self.auth.restore().await
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn auth(&self) -> &SessionManager {
        &self.auth
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn mutations(&self) -> &MutationCoordinator {
        &self.mutations
    }

    pub(crate) fn api(&self) -> Arc<ApiClient> {
        self.api.clone()
    }

    /// Route any operation result through the forced-logout check; every
    /// authenticated operation in `ops/` ends here.
    pub(crate) async fn guard<T>(&self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        self.auth.check_session(result).await
    }
}
