//! Glob expansion for cache inputs
//!
//! Expands shell-style patterns into concrete paths. Relative patterns are
//! resolved against an explicit base directory and the results are returned
//! relative to it, so callers see the same paths a shell in that directory
//! would.

use crate::error::{CacherError, CacherResult};
use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Expand each pattern and concatenate the matches in pattern order.
///
/// Matches inside one pattern come back in sorted order. The same path may
/// appear more than once when patterns overlap. A pattern that matches
/// nothing contributes nothing.
pub fn match_patterns<S: AsRef<str>>(
    patterns: &[S],
    base_dir: &Path,
) -> CacherResult<Vec<PathBuf>> {
    let mut matches = Vec::new();

    for pattern in patterns {
        let pattern = pattern.as_ref();
        let found = expand(pattern, base_dir)?;
        debug!("Pattern {} matched {} path(s)", pattern, found.len());
        matches.extend(found);
    }

    Ok(matches)
}

fn expand(pattern: &str, base_dir: &Path) -> CacherResult<Vec<PathBuf>> {
    let invalid = |source| CacherError::Pattern {
        pattern: pattern.to_string(),
        source,
    };

    // Validate the pattern as written so errors point at the user's input,
    // not at the base directory prefix.
    Pattern::new(pattern).map_err(invalid)?;

    let absolute = Path::new(pattern).is_absolute();
    let full_pattern = if absolute {
        pattern.to_string()
    } else {
        let base = Pattern::escape(&base_dir.to_string_lossy());
        format!("{}/{}", base.trim_end_matches('/'), pattern)
    };

    let paths = glob::glob(&full_pattern).map_err(invalid)?;

    let mut found = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) if absolute => found.push(path),
            Ok(path) => match path.strip_prefix(base_dir) {
                Ok(relative) => found.push(relative.to_path_buf()),
                Err(_) => found.push(path),
            },
            Err(e) => debug!("Skipping unreadable path {}: {}", e.path().display(), e),
        }
    }

    Ok(found)
}
