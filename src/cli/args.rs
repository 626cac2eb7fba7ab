//! CLI argument definitions using clap derive

use crate::config::schema::{StoreBackend, StoreConfig};
use crate::error::{CacherError, CacherResult};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// cacher - build pipeline artifact cache
///
/// Stores build outputs as compressed archives in a blob store under a key
/// derived from your inputs, and restores them on later runs.
#[derive(Parser, Debug)]
#[command(name = "cacher")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "CACHER_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pack matching files and upload them under the cache key
    Store(StoreArgs),

    /// Download and unpack the archive for the cache key, if present
    Restore(RestoreArgs),

    /// Print the cache key without touching the store
    Key(KeyArgs),
}

/// How the cache key is built
#[derive(Args, Debug, Clone, Default)]
pub struct KeyArgs {
    /// Literal cache key (prefix when combined with --cache-key-files)
    #[arg(long)]
    pub cache_key: Option<String>,

    /// Files whose contents derive the key (comma-separated globs)
    #[arg(long, value_delimiter = ',')]
    pub cache_key_files: Vec<String>,
}

impl KeyArgs {
    /// Require at least one key input
    pub fn validate(&self) -> CacherResult<()> {
        let literal_empty = self.cache_key.as_deref().map_or(true, str::is_empty);
        if literal_empty && self.cache_key_files.is_empty() {
            return Err(CacherError::MissingOption(
                "one of --cache-key or --cache-key-files has to be provided".to_string(),
            ));
        }
        Ok(())
    }

    /// The literal part of the key, empty when not given
    pub fn literal(&self) -> &str {
        self.cache_key.as_deref().unwrap_or("")
    }
}

/// Blob store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    /// Google Cloud Storage bucket
    Gcs,
    /// Local directory
    Filesystem,
}

impl From<BackendArg> for StoreBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Gcs => StoreBackend::Gcs,
            BackendArg::Filesystem => StoreBackend::Filesystem,
        }
    }
}

/// Where archives live; overrides the config file
#[derive(Args, Debug, Clone, Default)]
pub struct StoreTarget {
    /// Bucket holding the archives
    #[arg(long, env = "CACHER_BUCKET")]
    pub bucket: Option<String>,

    /// Blob store backend
    #[arg(long, env = "CACHER_BACKEND")]
    pub backend: Option<BackendArg>,

    /// Root directory for the filesystem backend
    #[arg(long, env = "CACHER_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    /// Prefix prepended to object names
    #[arg(long)]
    pub prefix: Option<String>,
}

impl StoreTarget {
    /// Merge these flags over the configured store settings
    pub fn apply(&self, base: &StoreConfig) -> StoreConfig {
        let mut merged = base.clone();
        if let Some(bucket) = &self.bucket {
            merged.bucket = Some(bucket.clone());
        }
        if let Some(backend) = self.backend {
            merged.backend = backend.into();
        }
        if let Some(dir) = &self.store_dir {
            merged.path = dir.clone();
        }
        if let Some(prefix) = &self.prefix {
            merged.prefix = prefix.clone();
        }
        merged
    }
}

/// Arguments for the store command
#[derive(Parser, Debug)]
pub struct StoreArgs {
    /// Files and directories to cache (comma-separated globs)
    #[arg(long, value_delimiter = ',', required = true)]
    pub file_patterns: Vec<String>,

    #[command(flatten)]
    pub key: KeyArgs,

    #[command(flatten)]
    pub target: StoreTarget,
}

/// Arguments for the restore command
#[derive(Parser, Debug)]
pub struct RestoreArgs {
    #[command(flatten)]
    pub key: KeyArgs,

    #[command(flatten)]
    pub target: StoreTarget,

    /// Write "hit" or "miss" to this file
    #[arg(long)]
    pub result_file: Option<PathBuf>,
}
