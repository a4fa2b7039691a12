pub mod credentials;
pub mod session;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::cache::QueryCache;
use crate::error::ApiError;
use crate::models::{ProfileUpdate, UserProfile};

use self::credentials::CredentialStore;
use self::session::{SessionHandle, SessionState};

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignupRequest<'a> {
    first_name: &'a str,
    last_name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest<'a> {
    current_password: &'a str,
    new_password: &'a str,
}

#[derive(Debug, Serialize)]
struct ForgotPasswordRequest<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResetPasswordRequest<'a> {
    token: &'a str,
    new_password: &'a str,
}

/// What the server hands back whenever it issues (or reissues) a token.
#[derive(Debug, Deserialize)]
struct AuthPayload {
    token: String,
    user: UserProfile,
}

/// Orchestrates the session lifecycle: restore at startup, login/signup,
/// profile and password changes, logout, and forced logout on token expiry.
///
/// State machine: `Unknown` -> (`restore`) -> `LoggedOut` | `LoggedIn`, with
/// `login`/`register`/`reset_password` moving to `LoggedIn` and
/// `logout`/`force_logout` moving to `LoggedOut` from anywhere.
///
/// Session-affecting operations are mutually exclusive: a second
/// login/register/password/profile call while one is pending is rejected
/// rather than allowed to interleave two token persists. New tokens are
/// written to the credential store first and swapped into the shared handle
/// only afterwards, in one step.
pub struct SessionManager {
    api: Arc<ApiClient>,
    cache: QueryCache,
    store: CredentialStore,
    session: SessionHandle,
    op_lock: tokio::sync::Mutex<()>,
    pending: Arc<AtomicUsize>,
    expired_notice: AtomicBool,
}

impl SessionManager {
    pub fn new(
        api: Arc<ApiClient>,
        cache: QueryCache,
        store: CredentialStore,
        session: SessionHandle,
    ) -> Self {
        Self {
            api,
            cache,
            store,
            session,
            op_lock: tokio::sync::Mutex::new(()),
            pending: Arc::new(AtomicUsize::new(0)),
            expired_notice: AtomicBool::new(false),
        }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// OR of all in-flight session-affecting operations.
    pub fn is_loading(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }

    /// True once after a forced logout, so the UI can show a re-login
    /// prompt instead of a silent sign-out.
    pub fn take_expired_notice(&self) -> bool {
        self.expired_notice.swap(false, Ordering::SeqCst)
    }

    /// Resolve `Unknown` at startup by attempting a credential restore.
    /// Any load failure lands on `LoggedOut`; startup never fails here.
    pub async fn restore(&self) -> SessionState {
        match self.store.load().await {
            Some((token, user)) => {
                info!("Restored session for user {}", user.id);
                self.session.set_logged_in(token, user);
            }
            None => {
                info!("No saved session, starting logged out");
                self.session.set_logged_out();
            }
        }
        self.session.state()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ApiError> {
        let email = email.trim();
        validate_email(email)?;
        if password.is_empty() {
            return Err(ApiError::Validation("Password is required.".to_string()));
        }

        let _guard = self.begin_exclusive()?;
        let payload: AuthPayload = self
            .api
            .post("/auth/login", &LoginRequest { email, password })
            .await?;
        self.adopt(payload).await
    }

    pub async fn register(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        password: &str,
    ) -> Result<UserProfile, ApiError> {
        let first_name = first_name.trim();
        let last_name = last_name.trim();
        let email = email.trim();
        if first_name.is_empty() || last_name.is_empty() {
            return Err(ApiError::Validation("First and last name are required.".to_string()));
        }
        validate_email(email)?;
        validate_new_password(password)?;

        let _guard = self.begin_exclusive()?;
        let payload: AuthPayload = self
            .api
            .post(
                "/auth/signup",
                &SignupRequest {
                    first_name,
                    last_name,
                    email,
                    password,
                },
            )
            .await?;
        self.adopt(payload).await
    }

    /// Explicit logout. Local state is torn down first so the user ends up
    /// signed out even if clearing durable storage fails; a storage failure
    /// still surfaces because a token left on disk matters.
    pub async fn logout(&self) -> Result<(), ApiError> {
        info!("Logging out");
        self.session.set_logged_out();
        self.cache.clear();
        self.store.clear().await
    }

    /// Forced logout after an `AuthExpired` classification. Same teardown as
    /// `logout`, but best-effort on storage and it flags the expiry for the
    /// UI.
    pub async fn force_logout(&self) {
        warn!("Session expired, forcing logout");
        self.session.set_logged_out();
        self.cache.clear();
        self.expired_notice.store(true, Ordering::SeqCst);
        if let Err(e) = self.store.clear().await {
            warn!("Failed to clear stored credentials after expiry: {}", e);
        }
    }

    /// Update profile fields. The server's response replaces the local user
    /// wholesale and is re-persisted alongside the current token.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, ApiError> {
        if update.is_empty() {
            return Err(ApiError::Validation("Nothing to update.".to_string()));
        }
        if let Some(email) = &update.email {
            validate_email(email.trim())?;
        }

        let _guard = self.begin_exclusive()?;
        let token = self.session.token().ok_or(ApiError::AuthExpired)?;

        let result: Result<UserProfile, ApiError> = self.api.patch("/auth/updateMe", update).await;
        let user = self.check_session(result).await?;

        self.store.save(&token, &user).await?;
        self.session.replace_user(user.clone());
        info!("Profile updated for user {}", user.id);
        Ok(user)
    }

    /// Change the password. The server reissues a token; it is persisted and
    /// swapped in like a fresh login. Should the server still invalidate the
    /// session, the next authenticated call's 401 takes the forced-logout
    /// path.
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<UserProfile, ApiError> {
        if current_password.is_empty() {
            return Err(ApiError::Validation("Current password is required.".to_string()));
        }
        validate_new_password(new_password)?;
        if new_password == current_password {
            return Err(ApiError::Validation(
                "The new password must differ from the current one.".to_string(),
            ));
        }

        let _guard = self.begin_exclusive()?;
        if !self.session.is_logged_in() {
            return Err(ApiError::AuthExpired);
        }

        let result: Result<AuthPayload, ApiError> = self
            .api
            .post(
                "/auth/changePassword",
                &ChangePasswordRequest {
                    current_password,
                    new_password,
                },
            )
            .await;
        let payload = self.check_session(result).await?;
        self.adopt(payload).await
    }

    pub async fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
        let email = email.trim();
        validate_email(email)?;

        let _guard = self.begin_pending();
        self.api
            .post_unit("/auth/forgotPassword", &ForgotPasswordRequest { email })
            .await
    }

    /// Complete a password reset. Success behaves like a login: the issued
    /// token and user are persisted and the session moves to `LoggedIn`.
    pub async fn reset_password(
        &self,
        reset_token: &str,
        new_password: &str,
    ) -> Result<UserProfile, ApiError> {
        if reset_token.trim().is_empty() {
            return Err(ApiError::Validation("Reset code is required.".to_string()));
        }
        validate_new_password(new_password)?;

        let _guard = self.begin_exclusive()?;
        let payload: AuthPayload = self
            .api
            .post(
                "/auth/resetPassword",
                &ResetPasswordRequest {
                    token: reset_token.trim(),
                    new_password,
                },
            )
            .await?;
        self.adopt(payload).await
    }

    /// Route an operation result through the forced-logout check. Used by
    /// the ops layer for every authenticated call.
    pub async fn check_session<T>(&self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        if let Err(err) = &result {
            if err.is_auth_expired() {
                self.force_logout().await;
            }
        }
        result
    }

    /// Persist then publish a newly issued (token, user) pair.
    async fn adopt(&self, payload: AuthPayload) -> Result<UserProfile, ApiError> {
        self.store.save(&payload.token, &payload.user).await?;
        self.session
            .set_logged_in(payload.token, payload.user.clone());
        self.expired_notice.store(false, Ordering::SeqCst);
        info!("Session established for user {}", payload.user.id);
        Ok(payload.user)
    }

    fn begin_exclusive(&self) -> Result<OpGuard<'_>, ApiError> {
        let lock = self.op_lock.try_lock().map_err(|_| {
            ApiError::Validation("Another account operation is already in progress.".to_string())
        })?;
        self.pending.fetch_add(1, Ordering::SeqCst);
        Ok(OpGuard {
            _lock: Some(lock),
            pending: self.pending.clone(),
        })
    }

    fn begin_pending(&self) -> OpGuard<'_> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        OpGuard {
            _lock: None,
            pending: self.pending.clone(),
        }
    }
}

/// Holds the exclusivity lock (when taken) and keeps the loading counter
/// accurate however the operation ends.
struct OpGuard<'a> {
    _lock: Option<tokio::sync::MutexGuard<'a, ()>>,
    pending: Arc<AtomicUsize>,
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    if email.is_empty() {
        return Err(ApiError::Validation("Email is required.".to_string()));
    }
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(ApiError::Validation("Enter a valid email address.".to_string()));
    }
    Ok(())
}

fn validate_new_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters.".to_string(),
        ));
    }
    Ok(())
}
