//! Cache key derivation
//!
//! A key is either a literal, the SHA-256 of the files matched by a set of
//! patterns, or both joined as `<literal>-<digest>`. Same inputs, same key.

use crate::cache::pattern::match_patterns;
use crate::error::{CacherError, CacherResult};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Derive the cache key for a literal and a set of key file patterns.
///
/// With no patterns the literal is returned unchanged. Otherwise the matched
/// files are sorted and their contents hashed back to back into one digest;
/// file boundaries are not delimited.
pub fn derive_key<S: AsRef<str>>(
    literal: &str,
    file_patterns: &[S],
    base_dir: &Path,
) -> CacherResult<String> {
    if file_patterns.is_empty() {
        return Ok(literal.to_string());
    }

    let mut files = match_patterns(file_patterns, base_dir)?;
    files.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
    debug!("Hashing key files: {:?}", files);

    let digest = hash_files(&files, base_dir)?;

    if literal.is_empty() {
        Ok(digest)
    } else {
        Ok(format!("{}-{}", literal, digest))
    }
}

/// Feed every file, in order, into a single SHA-256 and hex-encode it
fn hash_files(files: &[PathBuf], base_dir: &Path) -> CacherResult<String> {
    let mut hasher = Sha256::new();

    for file in files {
        let path = base_dir.join(file);
        let mut handle = File::open(&path)
            .map_err(|e| CacherError::io(format!("opening key file {}", path.display()), e))?;
        io::copy(&mut handle, &mut hasher)
            .map_err(|e| CacherError::io(format!("reading key file {}", path.display()), e))?;
    }

    Ok(hex::encode(hasher.finalize()))
}
