use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::models::UserProfile;

/// On-disk form of a saved session. Token and user live in one document so
/// they are persisted (and observed) together or not at all.
#[derive(Debug, Serialize, Deserialize)]
struct StoredCredentials {
    token: String,
    user: UserProfile,
    saved_at: DateTime<Utc>,
}

/// Durable persistence for the session token and cached user profile.
///
/// All operations are async wrappers over blocking file I/O run under
/// `tokio::task::spawn_blocking`. Writes go to a temp file in the same
/// directory followed by an atomic rename, so an interrupted save never
/// leaves a partial or torn credential file behind.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Persist the (token, user) pair. Errors propagate: a failed save leaves
    /// session durability in doubt and the caller must know.
    pub async fn save(&self, token: &str, user: &UserProfile) -> Result<(), ApiError> {
        let path = self.path.clone();
        let record = StoredCredentials {
            token: token.to_string(),
            user: user.clone(),
            saved_at: Utc::now(),
        };

        tokio::task::spawn_blocking(move || write_atomic(&path, &record))
            .await
            .map_err(|e| ApiError::Storage(format!("Credential save task panicked: {}", e)))??;

        info!("Saved credentials for user {}", user.id);
        Ok(())
    }

    /// Load the saved pair, if any.
    ///
    /// Every failure mode (missing file, unreadable file, corrupt JSON) is
    /// treated as "no saved session" so a damaged file can never prevent the
    /// app from starting logged out.
    pub async fn load(&self) -> Option<(String, UserProfile)> {
        let path = self.path.clone();
        let result = tokio::task::spawn_blocking(move || read_credentials(&path)).await;

        match result {
            Ok(Ok(Some(record))) => {
                info!("Restored credentials for user {}", record.user.id);
                Some((record.token, record.user))
            }
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                warn!("Failed to load credentials, treating as logged out: {}", e);
                None
            }
            Err(e) => {
                warn!("Credential load task panicked, treating as logged out: {}", e);
                None
            }
        }
    }

    /// Remove the saved pair. A file that is already gone is a success.
    pub async fn clear(&self) -> Result<(), ApiError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ApiError::Storage(format!(
                "Failed to clear credentials at {:?}: {}",
                path, e
            ))),
        })
        .await
        .map_err(|e| ApiError::Storage(format!("Credential clear task panicked: {}", e)))?
    }
}

fn write_atomic(path: &Path, record: &StoredCredentials) -> Result<(), ApiError> {
    let parent = path
        .parent()
        .ok_or_else(|| ApiError::Storage(format!("Credential path has no parent: {:?}", path)))?;

    std::fs::create_dir_all(parent)
        .map_err(|e| ApiError::Storage(format!("Failed to create data dir {:?}: {}", parent, e)))?;

    let json = serde_json::to_string_pretty(record)
        .map_err(|e| ApiError::Storage(format!("Failed to serialize credentials: {}", e)))?;

    // Temp file in the same directory so the rename stays on one filesystem.
    let mut temp = NamedTempFile::new_in(parent)
        .map_err(|e| ApiError::Storage(format!("Failed to create temp file: {}", e)))?;
    temp.write_all(json.as_bytes())
        .map_err(|e| ApiError::Storage(format!("Failed to write credentials: {}", e)))?;
    temp.flush()
        .map_err(|e| ApiError::Storage(format!("Failed to flush credentials: {}", e)))?;
    temp.persist(path)
        .map_err(|e| ApiError::Storage(format!("Failed to persist credentials: {}", e)))?;

    Ok(())
}

fn read_credentials(path: &Path) -> Result<Option<StoredCredentials>, String> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(format!("Failed to read {:?}: {}", path, e)),
    };

    let record: StoredCredentials =
        serde_json::from_str(&raw).map_err(|e| format!("Corrupt credential file {:?}: {}", path, e))?;
    Ok(Some(record))
}
