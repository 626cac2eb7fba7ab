//! Store and restore pipelines
//!
//! store:   pack → gzip → blob writer
//! restore: exists → blob reader → gunzip → unpack

use crate::archive::{PackSummary, Packer, UnpackSummary, Unpacker};
use crate::error::{CacherError, CacherResult};
use crate::store::BlobStore;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::info;

/// Result of a restore attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Archive found and unpacked
    Hit(UnpackSummary),
    /// No archive under the key
    Miss,
}

impl RestoreOutcome {
    /// The literal written to result marker files
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit(_) => "hit",
            Self::Miss => "miss",
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

impl fmt::Display for RestoreOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pack `roots` and upload the compressed archive under `key`.
///
/// The blob is only committed after the archive and the gzip trailer have
/// been written in full; on any error the writer is dropped unfinished.
pub fn save(
    store: &dyn BlobStore,
    key: &str,
    roots: &[PathBuf],
    packer: &Packer,
) -> CacherResult<PackSummary> {
    info!("Storing {} path(s) to {}", roots.len(), store.describe(key));

    let writer = store.open_writer(key)?;
    let encoder = GzEncoder::new(writer, Compression::default());
    let (encoder, summary) = packer.pack(roots, encoder)?;
    let writer = encoder
        .finish()
        .map_err(|e| CacherError::archive("finishing gzip stream", e))?;
    writer.finish()?;

    info!("Stored {}", store.describe(key));
    Ok(summary)
}

/// Download and unpack the archive for `key`, if there is one.
///
/// A miss touches nothing on disk.
pub fn restore(
    store: &dyn BlobStore,
    key: &str,
    unpacker: &Unpacker,
) -> CacherResult<RestoreOutcome> {
    if !store.exists(key)? {
        info!("Cache miss for {}", key);
        return Ok(RestoreOutcome::Miss);
    }

    let reader = match store.open_reader(key) {
        Ok(reader) => reader,
        Err(e) if e.is_not_found() => {
            info!("Cache entry {} disappeared before download", key);
            return Ok(RestoreOutcome::Miss);
        }
        Err(e) => return Err(e),
    };

    info!("Cache hit for {}, restoring from {}", key, store.describe(key));
    let summary = unpacker.unpack(GzDecoder::new(reader))?;
    Ok(RestoreOutcome::Hit(summary))
}

/// Write `hit` or `miss` into the result marker file
pub fn write_result_marker(path: &Path, outcome: &RestoreOutcome) -> CacherResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| CacherError::io(format!("error writing result file {}", path.display()), e))?;
    file.write_all(outcome.as_str().as_bytes())
        .map_err(|e| CacherError::io(format!("error writing result file {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BlobWriter, FilesystemStore};
    use std::fs;
    use std::io::{self, Read};
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> FilesystemStore {
        FilesystemStore::new(dir.path().join("store"), "").unwrap()
    }

    #[test]
    fn save_then_restore() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);

        let work = tmp.path().join("work");
        fs::create_dir_all(work.join("node_modules").join(".bin")).unwrap();
        fs::write(work.join("node_modules").join("index.js"), "module.exports = 1").unwrap();
        symlink("../index.js", work.join("node_modules").join(".bin").join("tool")).unwrap();

        let summary = save(
            &store,
            "npm-abc",
            &[PathBuf::from("node_modules")],
            &Packer::new(&work),
        )
        .unwrap();
        assert_eq!(summary.entries, 4);

        let dest = tmp.path().join("dest");
        fs::create_dir(&dest).unwrap();
        let outcome = restore(&store, "npm-abc", &Unpacker::new(&dest)).unwrap();

        assert!(outcome.is_hit());
        assert_eq!(
            fs::read_to_string(dest.join("node_modules").join("index.js")).unwrap(),
            "module.exports = 1"
        );
        assert_eq!(
            fs::read_link(dest.join("node_modules").join(".bin").join("tool")).unwrap(),
            PathBuf::from("../index.js")
        );
    }

    #[test]
    fn stored_blob_is_gzip() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        fs::write(tmp.path().join("a.txt"), "a").unwrap();

        save(&store, "k", &[PathBuf::from("a.txt")], &Packer::new(tmp.path())).unwrap();

        let mut head = [0u8; 2];
        store.open_reader("k").unwrap().read_exact(&mut head).unwrap();
        assert_eq!(head, [0x1f, 0x8b]);
    }

    #[test]
    fn miss_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        let dest = tmp.path().join("dest");
        fs::create_dir(&dest).unwrap();

        let outcome = restore(&store, "never-stored", &Unpacker::new(&dest)).unwrap();

        assert_eq!(outcome, RestoreOutcome::Miss);
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 0);
    }

    /// Store whose blob vanishes between the existence check and the read
    struct Vanishing;

    impl BlobStore for Vanishing {
        fn exists(&self, _: &str) -> CacherResult<bool> {
            Ok(true)
        }
        fn open_writer(&self, _: &str) -> CacherResult<Box<dyn BlobWriter>> {
            Err(CacherError::Store("read only".into()))
        }
        fn open_reader(&self, key: &str) -> CacherResult<Box<dyn Read>> {
            Err(CacherError::BlobNotFound(key.to_string()))
        }
        fn describe(&self, key: &str) -> String {
            key.to_string()
        }
    }

    #[test]
    fn not_found_after_exists_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        let outcome = restore(&Vanishing, "k", &Unpacker::new(tmp.path())).unwrap();
        assert_eq!(outcome, RestoreOutcome::Miss);
    }

    /// Writer that fails after a few bytes and records whether it was committed
    struct Flaky {
        committed: std::sync::Arc<std::sync::atomic::AtomicBool>,
        budget: usize,
    }

    impl Write for Flaky {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if buf.len() > self.budget {
                return Err(io::Error::new(io::ErrorKind::Other, "connection reset"));
            }
            self.budget -= buf.len();
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl BlobWriter for Flaky {
        fn finish(self: Box<Self>) -> CacherResult<()> {
            self.committed
                .store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    struct FlakyStore(std::sync::Arc<std::sync::atomic::AtomicBool>);

    impl BlobStore for FlakyStore {
        fn exists(&self, _: &str) -> CacherResult<bool> {
            Ok(false)
        }
        fn open_writer(&self, _: &str) -> CacherResult<Box<dyn BlobWriter>> {
            Ok(Box::new(Flaky {
                committed: self.0.clone(),
                budget: 16,
            }))
        }
        fn open_reader(&self, key: &str) -> CacherResult<Box<dyn Read>> {
            Err(CacherError::BlobNotFound(key.to_string()))
        }
        fn describe(&self, key: &str) -> String {
            key.to_string()
        }
    }

    #[test]
    fn failed_upload_is_never_committed() {
        let tmp = TempDir::new().unwrap();
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i * 7919 % 251) as u8).collect();
        fs::write(tmp.path().join("blob.bin"), payload).unwrap();

        let committed = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let result = save(
            &FlakyStore(committed.clone()),
            "k",
            &[PathBuf::from("blob.bin")],
            &Packer::new(tmp.path()),
        );

        assert!(result.is_err());
        assert!(!committed.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn result_marker_contents_and_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let marker = tmp.path().join("result");

        write_result_marker(&marker, &RestoreOutcome::Miss).unwrap();
        assert_eq!(fs::read_to_string(&marker).unwrap(), "miss");
        assert_eq!(
            fs::metadata(&marker).unwrap().permissions().mode() & 0o777,
            0o600
        );

        write_result_marker(&marker, &RestoreOutcome::Hit(UnpackSummary::default())).unwrap();
        assert_eq!(fs::read_to_string(&marker).unwrap(), "hit");
    }
}
