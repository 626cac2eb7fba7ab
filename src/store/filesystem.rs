//! Filesystem-backed blob store for local runs and tests

use crate::error::{CacherError, CacherResult};
use crate::store::{BlobStore, BlobWriter};
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::debug;

/// Stores each blob as one file below a root directory
pub struct FilesystemStore {
    root_dir: PathBuf,
    prefix: String,
}

impl FilesystemStore {
    /// Create a store rooted at `root_dir`, creating the directory if needed
    pub fn new(root_dir: PathBuf, prefix: impl Into<String>) -> CacherResult<Self> {
        fs::create_dir_all(&root_dir).map_err(|e| {
            CacherError::io(format!("creating store directory {}", root_dir.display()), e)
        })?;
        Ok(Self {
            root_dir,
            prefix: prefix.into(),
        })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root_dir.join(sanitize_key(&format!("{}{}", self.prefix, key)))
    }
}

/// Make a key safe to use as a single file name
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            _ => c,
        })
        .collect()
}

impl BlobStore for FilesystemStore {
    fn exists(&self, key: &str) -> CacherResult<bool> {
        let path = self.key_path(key);
        match fs::metadata(&path) {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacherError::Store(format!(
                "checking {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn open_writer(&self, key: &str) -> CacherResult<Box<dyn BlobWriter>> {
        let target = self.key_path(key);
        let temp = NamedTempFile::new_in(&self.root_dir).map_err(|e| {
            CacherError::Store(format!(
                "creating temporary file in {}: {}",
                self.root_dir.display(),
                e
            ))
        })?;
        debug!("Writing {} via {}", target.display(), temp.path().display());
        Ok(Box::new(FileBlobWriter { temp, target }))
    }

    fn open_reader(&self, key: &str) -> CacherResult<Box<dyn Read>> {
        let path = self.key_path(key);
        match File::open(&path) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(CacherError::BlobNotFound(key.to_string()))
            }
            Err(e) => Err(CacherError::Store(format!(
                "opening {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn describe(&self, key: &str) -> String {
        self.key_path(key).display().to_string()
    }
}

/// Writes into a temporary file and renames it into place on finish.
///
/// Dropping it unfinished deletes the temporary file.
struct FileBlobWriter {
    temp: NamedTempFile,
    target: PathBuf,
}

impl Write for FileBlobWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

impl BlobWriter for FileBlobWriter {
    fn finish(self: Box<Self>) -> CacherResult<()> {
        let FileBlobWriter { mut temp, target } = *self;
        temp.flush()
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| CacherError::Store(format!("flushing {}: {}", target.display(), e)))?;
        temp.persist(&target)
            .map_err(|e| CacherError::Store(format!("committing {}: {}", target.display(), e.error)))?;
        debug!("Committed {}", target.display());
        Ok(())
    }
}
