//! Blob store abstraction
//!
//! A blob store maps cache keys to compressed archives. Writes are streamed
//! and only become visible once the writer is finished; a writer dropped
//! early leaves nothing behind under the key.

pub mod filesystem;
pub mod gcs;

pub use filesystem::FilesystemStore;
pub use gcs::GcsStore;

use crate::config::schema::{StoreBackend, StoreConfig};
use crate::error::{CacherError, CacherResult};
use std::io::{Read, Write};

/// Streaming writer for one blob
pub trait BlobWriter: Write + Send {
    /// Flush remaining bytes and commit the blob under its key
    fn finish(self: Box<Self>) -> CacherResult<()>;
}

/// Key to bytes storage
pub trait BlobStore: Send + Sync {
    /// Check whether a blob exists for `key`
    fn exists(&self, key: &str) -> CacherResult<bool>;

    /// Start writing the blob for `key`
    fn open_writer(&self, key: &str) -> CacherResult<Box<dyn BlobWriter>>;

    /// Read the blob for `key`; fails with `BlobNotFound` when absent
    fn open_reader(&self, key: &str) -> CacherResult<Box<dyn Read>>;

    /// Human-readable location for log messages
    fn describe(&self, key: &str) -> String;
}

/// Create the blob store selected by the configuration.
///
/// `access_token` is only used by the GCS backend.
pub fn create_store(
    config: &StoreConfig,
    gcs_endpoint: &str,
    access_token: Option<String>,
) -> CacherResult<Box<dyn BlobStore>> {
    match config.backend {
        StoreBackend::Gcs => {
            let bucket = config
                .bucket
                .clone()
                .filter(|b| !b.is_empty())
                .ok_or_else(|| CacherError::MissingOption("--bucket is required".to_string()))?;
            let token = access_token.ok_or_else(|| {
                CacherError::GcpCredential("No access token available".to_string())
            })?;
            Ok(Box::new(GcsStore::new(
                gcs_endpoint,
                bucket,
                config.prefix.clone(),
                token,
            )))
        }
        StoreBackend::Filesystem => Ok(Box::new(FilesystemStore::new(
            config.path.clone(),
            config.prefix.clone(),
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn gcs_requires_bucket() {
        let config = StoreConfig {
            backend: StoreBackend::Gcs,
            bucket: None,
            ..StoreConfig::default()
        };
        let result = create_store(&config, "http://localhost", Some("token".into()));
        assert!(matches!(result, Err(CacherError::MissingOption(_))));
    }

    #[test]
    fn gcs_requires_token() {
        let config = StoreConfig {
            backend: StoreBackend::Gcs,
            bucket: Some("ci-cache".into()),
            ..StoreConfig::default()
        };
        let result = create_store(&config, "http://localhost", None);
        assert!(matches!(result, Err(CacherError::GcpCredential(_))));
    }

    #[test]
    fn filesystem_backend() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            backend: StoreBackend::Filesystem,
            path: dir.path().to_path_buf(),
            ..StoreConfig::default()
        };
        let store = create_store(&config, "", None).unwrap();
        assert!(!store.exists("anything").unwrap());
    }
}
