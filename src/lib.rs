//! cacher - build pipeline artifact cache
//!
//! Packs build outputs into gzip-compressed tar archives, stores them in a
//! blob store under a key derived from a literal and/or input file contents,
//! and restores them on later runs.

pub mod archive;
pub mod cache;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod paths;
pub mod store;

pub use error::{CacherError, CacherResult};
