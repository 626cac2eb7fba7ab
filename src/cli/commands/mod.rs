//! CLI command implementations

pub mod key;
pub mod restore;
pub mod store;

pub use key::execute as key;
pub use restore::execute as restore;
pub use store::execute as store;

use crate::cli::args::{KeyArgs, StoreTarget};
use crate::cache::derive_key;
use crate::config::schema::StoreBackend;
use crate::config::Config;
use crate::credentials::GcpCredentials;
use crate::error::{CacherError, CacherResult};
use crate::store::{create_store, BlobStore};
use std::path::{Path, PathBuf};

fn working_dir() -> CacherResult<PathBuf> {
    std::env::current_dir().map_err(|e| CacherError::io("getting current directory", e))
}

/// Derive the cache key relative to `base_dir`
fn cache_key(args: &KeyArgs, base_dir: &Path) -> CacherResult<String> {
    args.validate()?;
    derive_key(args.literal(), &args.cache_key_files, base_dir)
}

/// Build the blob store, fetching a GCS token when the backend needs one
async fn open_store(target: &StoreTarget, config: &Config) -> CacherResult<Box<dyn BlobStore>> {
    let store_config = target.apply(&config.store);

    let token = match store_config.backend {
        StoreBackend::Gcs => {
            if store_config.bucket.as_deref().map_or(true, str::is_empty) {
                return Err(CacherError::MissingOption("--bucket is required".to_string()));
            }
            Some(GcpCredentials::get_access_token(&config.gcs).await?)
        }
        StoreBackend::Filesystem => None,
    };

    create_store(&store_config, &config.gcs.endpoint, token)
}

/// Run a blocking pipeline off the async runtime
async fn blocking<T, F>(f: F) -> CacherResult<T>
where
    F: FnOnce() -> CacherResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CacherError::Internal(format!("Pipeline task failed: {}", e)))?
}
