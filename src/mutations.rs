use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::{QueryCache, QueryKey};
use crate::error::ApiError;

/// Executes state-changing calls and reconciles the query cache afterward.
///
/// Two reconciliation policies:
/// - `run_invalidating`: on success, invalidate every affected key; on
///   failure, leave the cache untouched.
/// - `run_optimistic`: write the expected value before the call resolves,
///   overwrite with the server's authoritative value on success, restore the
///   pre-mutation entry on failure.
///
/// Each logical operation carries an identity string; a second call for an
/// identity already in flight is rejected before any network I/O, which is
/// what keeps a double-tapped button from issuing two requests. Mutations
/// are never retried here; offering a retry is the caller's decision.
#[derive(Clone)]
pub struct MutationCoordinator {
    cache: QueryCache,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl MutationCoordinator {
    pub fn new(cache: QueryCache) -> Self {
        Self {
            cache,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Whether a mutation with this identity is currently running. The UI
    /// uses this to disable the triggering control.
    pub fn is_in_flight(&self, identity: &str) -> bool {
        self.in_flight.lock().unwrap().contains(identity)
    }

    /// Invalidate-on-success policy.
    pub async fn run_invalidating<T, Fut>(
        &self,
        identity: &str,
        affected: &[QueryKey],
        op: Fut,
    ) -> Result<T, ApiError>
    where
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let _guard = self.acquire(identity)?;

        let result = op.await;
        match &result {
            Ok(_) => {
                info!("Mutation {} succeeded", identity);
                for key in affected {
                    self.cache.invalidate(key);
                }
            }
            Err(err) => warn!("Mutation {} failed: {}", identity, err),
        }
        result
    }

    /// Optimistic-update-with-rollback policy.
    ///
    /// `optimistic` is the expected post-mutation value; the server response
    /// is authoritative and replaces it on success, which is why it may
    /// differ from the guess without any special handling.
    pub async fn run_optimistic<T, Fut>(
        &self,
        identity: &str,
        key: QueryKey,
        optimistic: &T,
        op: Fut,
    ) -> Result<T, ApiError>
    where
        T: Serialize + DeserializeOwned,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let _guard = self.acquire(identity)?;

        let snapshot = self.cache.peek(&key);
        self.cache.set_value(key.clone(), optimistic)?;

        match op.await {
            Ok(server_value) => {
                self.cache.set_value(key, &server_value)?;
                info!("Mutation {} succeeded", identity);
                Ok(server_value)
            }
            Err(err) => {
                warn!("Mutation {} failed, rolling back optimistic value: {}", identity, err);
                self.cache.restore(key, snapshot);
                Err(err)
            }
        }
    }

    fn acquire(&self, identity: &str) -> Result<InFlightGuard, ApiError> {
        let mut set = self.in_flight.lock().unwrap();
        if !set.insert(identity.to_string()) {
            warn!("Rejected duplicate mutation {}", identity);
            return Err(ApiError::Validation(
                "This action is already in progress.".to_string(),
            ));
        }
        Ok(InFlightGuard {
            set: self.in_flight.clone(),
            identity: identity.to_string(),
        })
    }
}

/// Releases the identity when the mutation finishes, succeed or fail.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    identity: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().unwrap().remove(&self.identity);
    }
}
