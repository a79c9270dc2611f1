//! Path normalization for watch registration and ignore lookups.
//!
//! Registry keys, ignore sets and resolved event paths all go through
//! [`normalize_watch_path`] so that `dir/./file`, `dir/sub/../file` and a
//! relative spelling of the same file compare equal. Normalization is purely
//! lexical: symlinks are not resolved, since the kernel reports events under
//! the name that was watched.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::watcher::{NotifierError, NotifierResult};

/// Normalize a path against the current working directory.
pub fn normalize_watch_path(path: &Path) -> PathBuf {
    match std::env::current_dir() {
        Ok(cwd) => normalize_against(path, &cwd),
        Err(_) => normalize_against(path, Path::new("")),
    }
}

/// Normalize a path, prepending `base` when it is relative.
pub fn normalize_against(path: &Path, base: &Path) -> PathBuf {
    let joined = if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Fail with [`NotifierError::InvalidPath`] unless `path` exists.
///
/// Dangling symlinks count as existing; the watch source decides whether it
/// can follow them.
pub fn require_exists(path: &Path) -> NotifierResult<()> {
    fs::symlink_metadata(path)
        .map(|_| ())
        .map_err(|e| NotifierError::InvalidPath {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}
