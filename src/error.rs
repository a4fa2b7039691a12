use thiserror::Error;

/// Error taxonomy surfaced to the UI layer.
///
/// Every lower-level failure (reqwest transport errors, server payloads,
/// storage I/O) is converted into one of these kinds before it leaves the
/// crate. Variants carry human-readable messages and are `Clone` so the
/// query cache can keep the error on the entry it belongs to.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    /// Caller-supplied input was rejected before any network call.
    #[error("{0}")]
    Validation(String),

    /// The server rejected the supplied credentials.
    #[error("{0}")]
    Auth(String),

    /// A 401 on an authenticated call; the stored token is no longer valid.
    #[error("Your session has expired. Please log in again.")]
    AuthExpired,

    /// No response was received (connectivity, DNS, timeout).
    #[error("Could not reach the server. Please check your connection and try again.")]
    Network(String),

    /// The server answered with a non-2xx status and (usually) a message body.
    #[error("{message}")]
    Server { status: u16, message: String },

    /// Durable storage I/O failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ApiError {
    /// True when the error means the current session must be torn down.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ApiError::AuthExpired)
    }

    /// True when no response was received at all.
    pub fn is_connection(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}

impl From<ApiError> for String {
    fn from(err: ApiError) -> Self {
        err.to_string()
    }
}
