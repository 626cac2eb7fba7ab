//! Tar archive packing and unpacking
//!
//! The archive is a plain tar stream (GNU headers) holding regular files,
//! directories and symlinks in walk order. Compression is layered on top by
//! the caller.
//!
//! # Entry names
//!
//! | Root given as | Root entry | Child entry |
//! |---------------|------------|-------------|
//! | `build/out`   | `build/out` | `build/out/lib.a` |
//! | `/opt/deps`   | `.`        | `lib.a` |
//!
//! Relative roots keep their walk path; absolute roots are stored relative
//! to themselves. Extraction joins names onto the destination root.

pub mod pack;
pub mod unpack;

pub use pack::{PackSummary, Packer};
pub use unpack::{UnpackSummary, Unpacker};

use std::fmt;
use std::path::PathBuf;

/// Kind of filesystem node an archive entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file, followed by its bytes
    File,
    /// Directory
    Directory,
    /// Symbolic link, stored by target
    Symlink,
}

impl EntryKind {
    /// The tar header type for this kind
    pub fn tar_type(&self) -> tar::EntryType {
        match self {
            Self::File => tar::EntryType::Regular,
            Self::Directory => tar::EntryType::Directory,
            Self::Symlink => tar::EntryType::Symlink,
        }
    }

    /// Map a tar header type back to a kind, if it is one we restore
    pub fn from_tar_type(entry_type: tar::EntryType) -> Option<Self> {
        match entry_type {
            tar::EntryType::Regular | tar::EntryType::Continuous => Some(Self::File),
            tar::EntryType::Directory => Some(Self::Directory),
            tar::EntryType::Symlink => Some(Self::Symlink),
            _ => None,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Symlink => "symlink",
        };
        write!(f, "{}", name)
    }
}

/// One record of the archive stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Archive-relative name, `/`-separated
    pub name: PathBuf,
    /// What the entry is
    pub kind: EntryKind,
    /// Permission bits (`mode & 0o7777`)
    pub mode: u32,
    /// Payload size for regular files, zero otherwise
    pub size: u64,
    /// Link target for symlinks
    pub link_target: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tar_type_mapping() {
        for kind in [EntryKind::File, EntryKind::Directory, EntryKind::Symlink] {
            assert_eq!(EntryKind::from_tar_type(kind.tar_type()), Some(kind));
        }
        assert_eq!(EntryKind::from_tar_type(tar::EntryType::Fifo), None);
        assert_eq!(EntryKind::from_tar_type(tar::EntryType::Link), None);
    }

    #[test]
    fn kind_display() {
        assert_eq!(EntryKind::Symlink.to_string(), "symlink");
    }
}
