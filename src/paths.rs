//! Lexical path helpers shared by the archiver and extractor
//!
//! Nothing here touches the filesystem: paths are normalized purely by
//! their components, so `a/./b/../c` becomes `a/c` whether or not `a/b`
//! exists or is a symlink.

use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path.
///
/// Removes `.` components and duplicate separators, resolves `..` against
/// the preceding normal component, and drops `..` directly under the root.
/// An empty result becomes `.`.
pub fn clean(path: &Path) -> PathBuf {
    let mut rooted = false;
    let mut parts: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                rooted = true;
                parts.clear();
            }
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(component),
            },
            Component::Normal(_) => parts.push(component),
        }
    }

    let mut cleaned = if rooted {
        PathBuf::from("/")
    } else {
        PathBuf::new()
    };
    for part in parts {
        cleaned.push(part.as_os_str());
    }

    if cleaned.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        cleaned
    }
}

/// Rewrite an absolute path as relative to `/`; relative paths pass through.
pub fn strip_root(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::Prefix(_) | Component::RootDir))
        .collect()
}

/// True when a (cleaned) relative path climbs above its starting directory.
pub fn escapes(path: &Path) -> bool {
    matches!(path.components().next(), Some(Component::ParentDir))
}

/// True when any component of the path is `..`
pub fn has_parent_component(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}
