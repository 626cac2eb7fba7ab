//! Configuration schema for cacher
//!
//! Configuration is stored at `~/.config/cacher/config.toml`

use crate::store::gcs::DEFAULT_ENDPOINT;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Blob store selection
    pub store: StoreConfig,

    /// Google Cloud Storage settings
    pub gcs: GcsConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Which blob store backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Google Cloud Storage bucket
    #[default]
    Gcs,
    /// Local directory
    Filesystem,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gcs => write!(f, "gcs"),
            Self::Filesystem => write!(f, "filesystem"),
        }
    }
}

/// Blob store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend to store archives in
    pub backend: StoreBackend,

    /// Bucket name (gcs backend)
    pub bucket: Option<String>,

    /// Prefix prepended to every object name
    pub prefix: String,

    /// Root directory (filesystem backend)
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Gcs,
            bucket: None,
            prefix: String::new(),
            path: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("cacher")
                .join("store"),
        }
    }
}

/// Where GCS access tokens come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    /// Environment token, then metadata server, then gcloud
    #[default]
    Auto,
    /// `GOOGLE_OAUTH_ACCESS_TOKEN`
    Env,
    /// `gcloud auth print-access-token`
    Gcloud,
    /// GCE/GKE metadata server
    Metadata,
}

/// Google Cloud Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GcsConfig {
    /// API endpoint (override for emulators)
    pub endpoint: String,

    /// Token source
    pub credentials: CredentialSource,

    /// Service account to impersonate (gcloud source only)
    pub service_account: Option<String>,
}

impl Default for GcsConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            credentials: CredentialSource::Auto,
            service_account: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[store]"));
        assert!(toml.contains("backend = \"gcs\""));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.store.backend, StoreBackend::Gcs);
        assert_eq!(config.gcs.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.gcs.credentials, CredentialSource::Auto);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [store]
            backend = "filesystem"
            path = "/var/cache/ci"

            [gcs]
            credentials = "metadata"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Filesystem);
        assert_eq!(config.store.path, PathBuf::from("/var/cache/ci"));
        assert_eq!(config.gcs.credentials, CredentialSource::Metadata);
        assert_eq!(config.general.log_format, "text"); // default preserved
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let result: Result<Config, _> = toml::from_str("[store]\nbackend = \"s3\"\n");
        assert!(result.is_err());
    }
}
