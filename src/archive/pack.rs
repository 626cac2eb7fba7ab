//! Archive creation
//!
//! Walks each root path and writes every directory, regular file and symlink
//! it finds into a tar stream, parents before children.
//!
//! Failure handling is split at the point where bytes reach the sink:
//! anything that goes wrong before an entry's header is written (walk error,
//! stat, open, readlink) abandons the current root and packing moves on to
//! the next one. Anything that goes wrong after that aborts the whole pack,
//! so a caller never gets a stream with a half-written entry in it.

use crate::archive::{ArchiveEntry, EntryKind};
use crate::error::{CacherError, CacherResult};
use crate::paths;
use std::fs::{self, File, Metadata};
use std::io::{self, Read, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tar::{Builder, Header};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Counters for a finished pack
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackSummary {
    /// Entries written to the stream
    pub entries: u64,
    /// File payload bytes written
    pub bytes: u64,
    /// Roots abandoned after a walk failure, in the order given
    pub skipped_roots: Vec<PathBuf>,
}

/// Packs root paths into a tar stream
#[derive(Debug, Clone)]
pub struct Packer {
    working_dir: PathBuf,
}

/// Why packing a root stopped early
enum RootFailure {
    /// Nothing of the failing entry reached the sink; continue with the next root
    Abandon(CacherError),
    /// The stream may hold a partial entry; stop packing altogether
    Fatal(CacherError),
}

impl Packer {
    /// Create a packer resolving relative roots against `working_dir`
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    /// Pack every root into `sink` and terminate the archive.
    ///
    /// Returns the sink so the caller can finish any wrapping encoder.
    pub fn pack<P, W>(&self, roots: &[P], sink: W) -> CacherResult<(W, PackSummary)>
    where
        P: AsRef<Path>,
        W: Write,
    {
        let mut builder = Builder::new(sink);
        let mut summary = PackSummary::default();

        for root in roots {
            let root = paths::clean(root.as_ref());
            match self.pack_root(&mut builder, &root, &mut summary) {
                Ok(()) => {}
                Err(RootFailure::Abandon(e)) => {
                    warn!("Failed to add {} to archive: {}", root.display(), e);
                    summary.skipped_roots.push(root);
                }
                Err(RootFailure::Fatal(e)) => return Err(e),
            }
        }

        let sink = builder
            .into_inner()
            .map_err(|e| CacherError::archive("writing end-of-archive marker", e))?;

        info!(
            "Packed {} entries ({} bytes), {} root(s) skipped",
            summary.entries,
            summary.bytes,
            summary.skipped_roots.len()
        );
        Ok((sink, summary))
    }

    fn pack_root<W: Write>(
        &self,
        builder: &mut Builder<W>,
        root: &Path,
        summary: &mut PackSummary,
    ) -> Result<(), RootFailure> {
        for node in RootWalk::new(root, &self.working_dir) {
            let node = node.map_err(RootFailure::Abandon)?;
            let Some(prepared) = prepare(&node).map_err(RootFailure::Abandon)? else {
                continue;
            };

            debug!(
                "Adding {} {} ({} bytes)",
                prepared.entry.kind,
                prepared.entry.name.display(),
                prepared.entry.size
            );
            write_entry(builder, &node, prepared).map_err(RootFailure::Fatal)?;

            summary.entries += 1;
            if node.metadata.is_file() {
                summary.bytes += node.metadata.len();
            }
        }
        Ok(())
    }
}

/// A filesystem node reached by the walk
struct Node {
    /// Archive name
    name: PathBuf,
    /// Where the node lives on disk
    path: PathBuf,
    /// `lstat` metadata
    metadata: Metadata,
}

/// Lazy depth-first walk of one root, yielding archive names
struct RootWalk {
    root: PathBuf,
    fs_root: PathBuf,
    absolute: bool,
    inner: walkdir::IntoIter,
}

impl RootWalk {
    fn new(root: &Path, working_dir: &Path) -> Self {
        let absolute = root.is_absolute();
        let fs_root = if absolute {
            root.to_path_buf()
        } else {
            working_dir.join(root)
        };
        let inner = WalkDir::new(&fs_root)
            .follow_links(false)
            .follow_root_links(false)
            .sort_by_file_name()
            .into_iter();

        Self {
            root: root.to_path_buf(),
            fs_root,
            absolute,
            inner,
        }
    }

    fn archive_name(&self, path: &Path) -> PathBuf {
        let relative = path.strip_prefix(&self.fs_root).unwrap_or(path);
        match (self.absolute, relative.as_os_str().is_empty()) {
            (true, true) => PathBuf::from("."),
            (true, false) => relative.to_path_buf(),
            (false, true) => self.root.clone(),
            (false, false) => paths::clean(&self.root.join(relative)),
        }
    }
}

impl Iterator for RootWalk {
    type Item = CacherResult<Node>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = match self.inner.next()? {
            Ok(entry) => entry,
            Err(e) => {
                let context = match e.path() {
                    Some(path) => format!("walking {}", path.display()),
                    None => format!("walking {}", self.fs_root.display()),
                };
                return Some(Err(CacherError::io(context, io::Error::from(e))));
            }
        };

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                let context = format!("reading metadata of {}", entry.path().display());
                return Some(Err(CacherError::io(context, io::Error::from(e))));
            }
        };

        Some(Ok(Node {
            name: self.archive_name(entry.path()),
            path: entry.into_path(),
            metadata,
        }))
    }
}

/// Everything needed to write one entry, gathered before touching the sink
struct Prepared {
    entry: ArchiveEntry,
    file: Option<File>,
}

/// Stat-level work for a node; `None` for node types the archive skips
fn prepare(node: &Node) -> CacherResult<Option<Prepared>> {
    let file_type = node.metadata.file_type();
    let mode = node.metadata.mode() & 0o7777;

    if paths::has_parent_component(&node.name) {
        return Err(CacherError::ArchiveUnsafePath {
            name: node.name.display().to_string(),
        });
    }

    let (kind, size, link_target, file) = if file_type.is_dir() {
        (EntryKind::Directory, 0, None, None)
    } else if file_type.is_symlink() {
        let target = fs::read_link(&node.path)
            .map_err(|e| CacherError::io(format!("reading link {}", node.path.display()), e))?;
        (EntryKind::Symlink, 0, Some(target), None)
    } else if file_type.is_file() {
        let file = File::open(&node.path)
            .map_err(|e| CacherError::io(format!("can't open {}", node.path.display()), e))?;
        (EntryKind::File, node.metadata.len(), None, Some(file))
    } else {
        warn!("Skipping special file {}", node.path.display());
        return Ok(None);
    };

    Ok(Some(Prepared {
        entry: ArchiveEntry {
            name: node.name.clone(),
            kind,
            mode,
            size,
            link_target,
        },
        file,
    }))
}

fn header_for(entry: &ArchiveEntry, metadata: &Metadata) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry.kind.tar_type());
    header.set_mode(entry.mode);
    header.set_size(entry.size);
    header.set_uid(u64::from(metadata.uid()));
    header.set_gid(u64::from(metadata.gid()));
    header.set_mtime(metadata.mtime().max(0) as u64);
    header
}

fn write_entry<W: Write>(
    builder: &mut Builder<W>,
    node: &Node,
    prepared: Prepared,
) -> CacherResult<()> {
    let Prepared { entry, file } = prepared;
    let mut header = header_for(&entry, &node.metadata);
    let failed = |e| CacherError::archive(format!("writing {} to archive", entry.name.display()), e);

    match (entry.kind, file) {
        (EntryKind::File, Some(file)) => {
            let mut reader = ExactReader::new(file, entry.size);
            if let Err(e) = builder.append_data(&mut header, &entry.name, &mut reader) {
                if reader.remaining > 0 && e.kind() == io::ErrorKind::UnexpectedEof {
                    return Err(CacherError::ArchiveShortRead {
                        path: node.path.clone(),
                        read: entry.size - reader.remaining,
                        expected: entry.size,
                    });
                }
                return Err(failed(e));
            }
        }
        (EntryKind::Symlink, _) => {
            let target = entry.link_target.as_deref().unwrap_or_else(|| Path::new(""));
            builder
                .append_link(&mut header, &entry.name, target)
                .map_err(failed)?;
        }
        _ => {
            builder
                .append_data(&mut header, &entry.name, io::empty())
                .map_err(failed)?;
        }
    }

    Ok(())
}

/// Reads exactly `len` bytes from a file, failing if it ends sooner.
///
/// Bytes past `len` (a file that grew after it was stat'ed) are ignored so
/// the payload always matches the size in the header.
struct ExactReader<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> ExactReader<R> {
    fn new(inner: R, len: u64) -> Self {
        Self {
            inner,
            remaining: len,
        }
    }
}

impl<R: Read> Read for ExactReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = self.inner.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file ended before its recorded size",
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}
