//! Archive extraction
//!
//! Recreates the entries of a tar stream under a destination root. Entry
//! names are cleaned lexically and joined onto the root; absolute names are
//! treated as relative to `/`, and names that still climb out of the root
//! after cleaning are rejected.

use crate::archive::EntryKind;
use crate::error::{CacherError, CacherResult};
use crate::paths;
use std::fs::{self, DirBuilder, OpenOptions, Permissions};
use std::io::{self, Read};
use std::os::unix::fs::{symlink, DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tar::{Archive, Entry};
use tracing::{debug, info, warn};

/// Mode for every directory the extractor creates
const DIR_MODE: u32 = 0o755;

/// Counters for a finished extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnpackSummary {
    pub files: u64,
    pub directories: u64,
    pub symlinks: u64,
    /// Symlinks that could not be created (logged, not fatal)
    pub failed_symlinks: u64,
    /// Entries of a type the extractor does not restore
    pub skipped: u64,
    /// File payload bytes written
    pub bytes: u64,
}

/// Unpacks tar streams below a destination root
#[derive(Debug, Clone)]
pub struct Unpacker {
    dest_root: PathBuf,
}

impl Unpacker {
    /// Create an unpacker writing below `dest_root`
    pub fn new(dest_root: impl Into<PathBuf>) -> Self {
        Self {
            dest_root: dest_root.into(),
        }
    }

    /// Extract every entry of `source` until the end-of-archive marker.
    ///
    /// Stops at the first failure, except for symlinks that cannot be
    /// created, which are logged and skipped.
    pub fn unpack<R: Read>(&self, source: R) -> CacherResult<UnpackSummary> {
        let mut archive = Archive::new(source);
        let mut summary = UnpackSummary::default();

        let entries = archive
            .entries()
            .map_err(|e| CacherError::archive("reading archive", e))?;

        for entry in entries {
            let mut entry = entry.map_err(|e| CacherError::archive("reading archive entry", e))?;
            let name = entry
                .path()
                .map_err(|e| CacherError::archive("reading entry name", e))?
                .into_owned();
            let dest = self.destination(&name)?;
            let entry_type = entry.header().entry_type();

            match EntryKind::from_tar_type(entry_type) {
                Some(EntryKind::Directory) => {
                    create_dir_all(&dest)?;
                    summary.directories += 1;
                }
                Some(EntryKind::Symlink) => {
                    if self.extract_symlink(&entry, &dest)? {
                        summary.symlinks += 1;
                    } else {
                        summary.failed_symlinks += 1;
                    }
                }
                Some(EntryKind::File) => {
                    summary.bytes += extract_file(&mut entry, &dest)?;
                    summary.files += 1;
                }
                None => {
                    warn!(
                        "Skipping unsupported entry {} ({:?})",
                        name.display(),
                        entry_type
                    );
                    summary.skipped += 1;
                }
            }
        }

        info!(
            "Unpacked {} files, {} directories, {} symlinks into {}",
            summary.files,
            summary.directories,
            summary.symlinks,
            self.dest_root.display()
        );
        Ok(summary)
    }

    /// Resolve an entry name to its path below the destination root
    pub fn destination(&self, name: &Path) -> CacherResult<PathBuf> {
        let relative = paths::clean(&paths::strip_root(name));
        if paths::escapes(&relative) {
            return Err(CacherError::ArchiveUnsafePath {
                name: name.display().to_string(),
            });
        }
        Ok(self.dest_root.join(relative))
    }

    /// Returns `Ok(false)` when the link could not be created
    fn extract_symlink<R: Read>(&self, entry: &Entry<'_, R>, dest: &Path) -> CacherResult<bool> {
        let target = entry
            .link_name()
            .map_err(|e| CacherError::archive("reading link target", e))?
            .map(|t| t.into_owned())
            .unwrap_or_default();

        // Stored targets are resolved from "." exactly as written, so an
        // absolute target ends up relative.
        let link = paths::clean(&Path::new(".").join(paths::strip_root(&target)));
        if let Err(e) = ensure_parent(dest) {
            warn!("symlink warning: {} -> {}: {}", dest.display(), link.display(), e);
            return Ok(false);
        }

        match symlink(&link, dest) {
            Ok(()) => {
                debug!("Linked {} -> {}", dest.display(), link.display());
                Ok(true)
            }
            Err(e) => {
                warn!("symlink warning: {} -> {}: {}", dest.display(), link.display(), e);
                Ok(false)
            }
        }
    }
}

fn create_dir_all(path: &Path) -> CacherResult<()> {
    DirBuilder::new()
        .recursive(true)
        .mode(DIR_MODE)
        .create(path)
        .map_err(|e| CacherError::archive(format!("creating directory {}", path.display()), e))
}

fn ensure_parent(path: &Path) -> CacherResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Write a regular file entry and return the number of bytes written
fn extract_file<R: Read>(entry: &mut Entry<'_, R>, dest: &Path) -> CacherResult<u64> {
    let header = entry.header();
    let mode = header
        .mode()
        .map_err(|e| CacherError::archive(format!("reading mode of {}", dest.display()), e))?
        & 0o777;
    let expected = header
        .size()
        .map_err(|e| CacherError::archive(format!("reading size of {}", dest.display()), e))?;

    ensure_parent(dest)?;

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(dest)
        .map_err(|e| CacherError::archive(format!("creating {}", dest.display()), e))?;

    // An existing file keeps its old mode through O_TRUNC, and new files are
    // subject to the umask; set the recorded bits explicitly.
    fs::set_permissions(dest, Permissions::from_mode(mode))
        .map_err(|e| CacherError::archive(format!("setting mode on {}", dest.display()), e))?;

    let written = io::copy(entry, &mut file)
        .map_err(|e| CacherError::archive(format!("writing {}", dest.display()), e))?;

    if written != expected {
        return Err(CacherError::ArchiveSizeMismatch {
            path: dest.to_path_buf(),
            written,
            expected,
        });
    }

    debug!("Wrote {} ({} bytes)", dest.display(), written);
    Ok(written)
}
