use std::sync::{Arc, RwLock};

use crate::models::UserProfile;

/// Where the client currently stands with respect to authentication.
///
/// `Unknown` only exists between process start and the first credential
/// restore attempt; every transition after that is between `LoggedOut` and
/// `LoggedIn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unknown,
    LoggedOut,
    LoggedIn,
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    token: Option<String>,
    user: Option<UserProfile>,
}

/// Shared, read-mostly view of the current session.
///
/// The token and user are swapped together in one step so no reader can
/// observe a token without its matching user. The only writer is the
/// `SessionManager` (the setters are crate-private); the HTTP client and
/// query cache hold clones and read.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<RwLock<SessionInner>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionInner {
                state: SessionState::Unknown,
                token: None,
                user: None,
            })),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.read().unwrap().state
    }

    pub fn is_logged_in(&self) -> bool {
        self.state() == SessionState::LoggedIn
    }

    /// Snapshot of the bearer token, taken atomically at dispatch time.
    pub fn token(&self) -> Option<String> {
        self.inner.read().unwrap().token.clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.inner.read().unwrap().user.clone()
    }

    pub(crate) fn set_logged_in(&self, token: String, user: UserProfile) {
        let mut inner = self.inner.write().unwrap();
        inner.state = SessionState::LoggedIn;
        inner.token = Some(token);
        inner.user = Some(user);
    }

    pub(crate) fn set_logged_out(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.state = SessionState::LoggedOut;
        inner.token = None;
        inner.user = None;
    }

    /// Replace the cached user profile, keeping the current token.
    /// Only valid while logged in; ignored otherwise.
    pub(crate) fn replace_user(&self, user: UserProfile) {
        let mut inner = self.inner.write().unwrap();
        if inner.state == SessionState::LoggedIn {
            inner.user = Some(user);
        }
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationPreferences;

    fn test_user() -> UserProfile {
        UserProfile {
            id: "u1".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Green".to_string(),
            email: "ada@example.com".to_string(),
            notification_preferences: NotificationPreferences::default(),
        }
    }

    #[test]
    fn test_starts_unknown_and_empty() {
        let session = SessionHandle::new();
        assert_eq!(session.state(), SessionState::Unknown);
        assert!(session.token().is_none());
        assert!(session.user().is_none());
    }

    #[test]
    fn test_login_swaps_token_and_user_together() {
        let session = SessionHandle::new();
        session.set_logged_in("tok-1".to_string(), test_user());

        assert!(session.is_logged_in());
        assert_eq!(session.token().as_deref(), Some("tok-1"));
        assert_eq!(session.user().unwrap().id, "u1");
    }

    #[test]
    fn test_logout_clears_both() {
        let session = SessionHandle::new();
        session.set_logged_in("tok-1".to_string(), test_user());
        session.set_logged_out();

        assert_eq!(session.state(), SessionState::LoggedOut);
        assert!(session.token().is_none());
        assert!(session.user().is_none());
    }

    #[test]
    fn test_replace_user_keeps_token() {
        let session = SessionHandle::new();
        session.set_logged_in("tok-1".to_string(), test_user());

        let mut updated = test_user();
        updated.first_name = "Grace".to_string();
        session.replace_user(updated);

        assert_eq!(session.token().as_deref(), Some("tok-1"));
        assert_eq!(session.user().unwrap().first_name, "Grace");
    }

    #[test]
    fn test_replace_user_ignored_when_logged_out() {
        let session = SessionHandle::new();
        session.set_logged_out();
        session.replace_user(test_user());
        assert!(session.user().is_none());
    }
}
