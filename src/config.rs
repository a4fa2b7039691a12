use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;

/// Default REST API base URL.
const DEFAULT_BASE_URL: &str = "https://api.plantmate.app/api/v1";
/// Default ML inference service base URL.
const DEFAULT_ML_BASE_URL: &str = "https://ml.plantmate.app/identify";

/// Client configuration.
///
/// Loaded from an optional TOML file; every field has a default so a missing
/// file (the common case on first launch) yields a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the PlantMate REST API.
    pub base_url: String,
    /// Base URL of the ML identification service.
    pub ml_base_url: String,
    /// Timeout applied to every REST request, in seconds.
    pub request_timeout_secs: u64,
    /// Timeout for ML identification uploads, in seconds (larger payloads).
    pub identify_timeout_secs: u64,
    /// How long a cached query stays fresh, in seconds.
    pub cache_ttl_secs: u64,
    /// Override for the credential file location. Defaults to the platform
    /// data directory when unset.
    pub credentials_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            ml_base_url: DEFAULT_ML_BASE_URL.to_string(),
            request_timeout_secs: 30,
            identify_timeout_secs: 60,
            cache_ttl_secs: 300,
            credentials_path: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults; a file that exists but does not
    /// parse is an error (a half-applied configuration is worse than none).
    pub fn load(path: &Path) -> Result<Self, ApiError> {
        if !path.exists() {
            info!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|e| ApiError::Storage(format!("Failed to read config {:?}: {}", path, e)))?;
        let config: ClientConfig = toml::from_str(&raw)
            .map_err(|e| ApiError::Storage(format!("Failed to parse config {:?}: {}", path, e)))?;

        info!("Loaded config from {:?} (base_url: {})", path, config.base_url);
        Ok(config)
    }

    /// Resolve the credential file path: the configured override, or
    /// `<data dir>/plantmate/credentials.json`.
    pub fn credentials_file(&self) -> PathBuf {
        if let Some(path) = &self.credentials_path {
            return path.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("plantmate")
            .join("credentials.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.cache_ttl_secs, 300);
        assert!(config.credentials_path.is_none());
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ClientConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_load_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plantmate.toml");
        std::fs::write(
            &path,
            "base_url = \"http://localhost:3000/api/v1\"\ncache_ttl_secs = 60\n",
        )
        .unwrap();

        let config = ClientConfig::load(&path).unwrap();
        assert_eq!(config.base_url, "http://localhost:3000/api/v1");
        assert_eq!(config.cache_ttl_secs, 60);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_load_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plantmate.toml");
        std::fs::write(&path, "base_url = [not toml").unwrap();

        let result = ClientConfig::load(&path);
        assert!(result.is_err());
    }

    #[test]
    fn test_credentials_file_override() {
        let mut config = ClientConfig::default();
        config.credentials_path = Some(PathBuf::from("/tmp/creds.json"));
        assert_eq!(config.credentials_file(), PathBuf::from("/tmp/creds.json"));
    }
}
