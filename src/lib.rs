pub mod api;
pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod mutations;
pub mod ops;

pub use auth::session::{SessionHandle, SessionState};
pub use cache::{CacheEntry, QueryCache, QueryKey, QueryStatus};
pub use client::PlantMateClient;
pub use config::ClientConfig;
pub use error::ApiError;
pub use mutations::MutationCoordinator;

/// Initialize logging for binaries embedding the core. Defaults to `info`,
/// overridable with `RUST_LOG`. Safe to call more than once.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .ok();
}
