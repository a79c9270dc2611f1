//! Path registry mapping watch handles to paths and back.
//!
//! Paths are interned (stored once, shared between both directions of the
//! mapping) and always kept in normalized form, so event resolution and ignore
//! lookups compare like with like.

use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::fmt;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use super::error::{NotifierError, NotifierResult};
use super::event::EventMask;
use super::source::WatchSource;
use crate::paths::{normalize_watch_path, require_exists};

/// A registered path and, for recursive registrations, the root it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedPath {
    path: Arc<Path>,
    recursive_root: Option<Arc<Path>>,
}

impl WatchedPath {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn recursive_root(&self) -> Option<&Path> {
        self.recursive_root.as_deref()
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive_root.is_some()
    }
}

/// Outcome of an ignore check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreVerdict {
    Pass,
    /// Suppressed, and the one-shot ignore entry was consumed.
    SuppressOnce,
    SuppressPermanent,
}

/// Registry for watched paths and their handles.
///
/// Handles come from a [`WatchSource`]; every mutating call takes the source
/// so the registry and the installed watches never drift apart.
pub struct PathRegistry<H> {
    by_handle: HashMap<H, WatchedPath>,
    by_path: HashMap<Arc<Path>, H>,
    ignore_once: HashSet<PathBuf>,
    ignore_permanent: HashSet<PathBuf>,
    /// Mask installed on every watch.
    watch_mask: EventMask,
    follow_symlinks: bool,
}

impl<H> PathRegistry<H>
where
    H: Clone + Eq + Hash + fmt::Debug,
{
    /// Create an empty registry installing watches with `watch_mask`.
    pub fn new(watch_mask: EventMask) -> Self {
        Self {
            by_handle: HashMap::new(),
            by_path: HashMap::new(),
            ignore_once: HashSet::new(),
            ignore_permanent: HashSet::new(),
            watch_mask,
            follow_symlinks: false,
        }
    }

    /// Follow symlinked directories during recursive registration.
    pub fn set_follow_symlinks(&mut self, follow: bool) {
        self.follow_symlinks = follow;
    }

    /// Watch a single file or directory.
    ///
    /// Returns the existing handle when the path is already watched.
    pub fn watch_file<S>(&mut self, source: &mut S, path: &Path) -> NotifierResult<H>
    where
        S: WatchSource<Handle = H>,
    {
        let path = normalize_watch_path(path);
        require_exists(&path)?;
        self.install(source, path, None)
    }

    /// Watch `path` and every directory beneath it.
    ///
    /// Returns the handles of all paths now covered by this registration.
    pub fn watch_directory_recursively<S>(
        &mut self,
        source: &mut S,
        path: &Path,
    ) -> NotifierResult<Vec<H>>
    where
        S: WatchSource<Handle = H>,
    {
        let path = normalize_watch_path(path);
        require_exists(&path)?;
        let root: Arc<Path> = Arc::from(path.as_path());
        self.install_tree(source, &path, root, false)
    }

    /// Extend an existing recursive registration to a newly created directory.
    ///
    /// Directories that vanish or cannot be read before their watch is
    /// installed are skipped, `dir` included.
    pub fn watch_subtree<S>(
        &mut self,
        source: &mut S,
        dir: &Path,
        root: Arc<Path>,
    ) -> NotifierResult<Vec<H>>
    where
        S: WatchSource<Handle = H>,
    {
        self.install_tree(source, dir, root, true)
    }

    /// Remove every watch at or beneath `dir` belonging to the recursive
    /// registration at `root`. Returns how many were removed.
    pub fn unwatch_subtree<S>(&mut self, source: &mut S, dir: &Path, root: &Path) -> usize
    where
        S: WatchSource<Handle = H>,
    {
        let released: Vec<H> = self
            .by_handle
            .iter()
            .filter(|(_, watched)| {
                watched.path.starts_with(dir) && watched.recursive_root.as_deref() == Some(root)
            })
            .map(|(handle, _)| handle.clone())
            .collect();

        for handle in &released {
            self.forget(handle);
            if let Err(e) = source.remove_watch(handle) {
                tracing::warn!("[registry] failed to remove watch {handle:?}: {e}");
            }
        }
        released.len()
    }

    fn install_tree<S>(
        &mut self,
        source: &mut S,
        dir: &Path,
        root: Arc<Path>,
        skip_unwatchable_top: bool,
    ) -> NotifierResult<Vec<H>>
    where
        S: WatchSource<Handle = H>,
    {
        // Collect first: installing a watch before reading a directory would
        // report our own directory reads as events.
        let dirs: Vec<PathBuf> = if dir.is_dir() {
            WalkDir::new(dir)
                .follow_links(self.follow_symlinks)
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(entry) if entry.file_type().is_dir() => Some(entry.into_path()),
                    Ok(_) => None,
                    Err(e) => {
                        crate::debug_event!("registry", "walk skipped", "{e}");
                        None
                    }
                })
                .collect()
        } else {
            vec![dir.to_path_buf()]
        };

        let mut handles = Vec::with_capacity(dirs.len());
        for path in dirs {
            let is_top = path == dir;
            match self.install(source, path, Some(root.clone())) {
                Ok(handle) => handles.push(handle),
                Err(e) if e.is_invalid_path() || e.is_permission_denied() => {
                    if is_top && !skip_unwatchable_top {
                        return Err(e);
                    }
                    crate::debug_event!("registry", "skipped unwatchable directory", "{e}");
                }
                Err(e) => return Err(e),
            }
        }

        crate::debug_event!(
            "registry",
            "recursive watch",
            "{} paths under {}",
            handles.len(),
            root.display()
        );
        Ok(handles)
    }

    /// Stop watching exactly `path`. No-op when it is not watched.
    pub fn unwatch_file<S>(&mut self, source: &mut S, path: &Path) -> NotifierResult<()>
    where
        S: WatchSource<Handle = H>,
    {
        let path = normalize_watch_path(path);
        let Some(handle) = self.by_path.remove(path.as_path()) else {
            return Ok(());
        };
        self.by_handle.remove(&handle);
        source.remove_watch(&handle)?;
        crate::debug_event!("registry", "unwatched", "{}", path.display());
        Ok(())
    }

    /// Suppress the next event reported for `path`.
    pub fn ignore_file_once(&mut self, path: &Path) {
        self.ignore_once.insert(normalize_watch_path(path));
    }

    /// Suppress every event reported for `path` until [`Self::unignore_file`].
    pub fn ignore_file(&mut self, path: &Path) {
        self.ignore_permanent.insert(normalize_watch_path(path));
    }

    /// Lift a permanent ignore. Returns true if one was set.
    pub fn unignore_file(&mut self, path: &Path) -> bool {
        self.ignore_permanent.remove(&normalize_watch_path(path))
    }

    /// Decide whether an event for `path` is dispatched.
    ///
    /// A pending ignore-once entry is always consumed first, even when the
    /// path is also permanently ignored.
    pub fn check_ignored(&mut self, path: &Path) -> IgnoreVerdict {
        if self.ignore_once.remove(path) {
            IgnoreVerdict::SuppressOnce
        } else if self.ignore_permanent.contains(path) {
            IgnoreVerdict::SuppressPermanent
        } else {
            IgnoreVerdict::Pass
        }
    }

    /// Resolve a handle and optional child name back to a path.
    pub fn resolve(&self, handle: &H, name: Option<&OsStr>) -> NotifierResult<PathBuf> {
        let watched = self
            .by_handle
            .get(handle)
            .ok_or_else(|| NotifierError::StaleHandle {
                handle: format!("{handle:?}"),
            })?;

        Ok(match name {
            Some(name) if !name.is_empty() => watched.path.join(name),
            _ => watched.path.to_path_buf(),
        })
    }

    pub fn lookup(&self, handle: &H) -> Option<&WatchedPath> {
        self.by_handle.get(handle)
    }

    pub fn handle_of(&self, path: &Path) -> Option<&H> {
        self.by_path.get(normalize_watch_path(path).as_path())
    }

    /// Drop bookkeeping for a watch the source has already retired.
    pub fn forget(&mut self, handle: &H) -> Option<WatchedPath> {
        let watched = self.by_handle.remove(handle)?;
        self.by_path.remove(&watched.path);
        crate::debug_event!("registry", "retired", "{}", watched.path.display());
        Some(watched)
    }

    /// Widen the installed mask to cover `mask`, updating every live watch.
    ///
    /// Watches whose path vanished or became unreadable are dropped. The new
    /// mask is only recorded once every remaining watch carries it, so a
    /// failed renewal is retried by the next call. Returns false when the
    /// installed mask already covered `mask`.
    pub fn widen_mask<S>(&mut self, source: &mut S, mask: EventMask) -> NotifierResult<bool>
    where
        S: WatchSource<Handle = H>,
    {
        let widened = self.watch_mask | (mask & EventMask::ALL_EVENTS);
        if widened == self.watch_mask {
            return Ok(false);
        }

        let watched: Vec<(Arc<Path>, H)> = self
            .by_path
            .iter()
            .map(|(path, handle)| (path.clone(), handle.clone()))
            .collect();

        for (path, handle) in watched {
            match source.add_watch(&path, widened) {
                Ok(renewed) if renewed != handle => {
                    if let Some(entry) = self.by_handle.remove(&handle) {
                        self.by_handle.insert(renewed.clone(), entry);
                    }
                    self.by_path.insert(path, renewed);
                }
                Ok(_) => {}
                Err(e) if e.is_invalid_path() || e.is_permission_denied() => {
                    crate::debug_event!("registry", "dropped on renewal", "{e}");
                    self.forget(&handle);
                    if let Err(e) = source.remove_watch(&handle) {
                        tracing::warn!("[registry] failed to remove watch {handle:?}: {e}");
                    }
                }
                Err(e) => return Err(e),
            }
        }

        self.watch_mask = widened;
        crate::debug_event!("registry", "mask widened", "{:?}", self.watch_mask);
        Ok(true)
    }

    pub fn watch_mask(&self) -> EventMask {
        self.watch_mask
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.handle_of(path).is_some()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.by_path.keys().map(|path| path.as_ref())
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }

    fn install<S>(
        &mut self,
        source: &mut S,
        path: PathBuf,
        root: Option<Arc<Path>>,
    ) -> NotifierResult<H>
    where
        S: WatchSource<Handle = H>,
    {
        if let Some(handle) = self.by_path.get(path.as_path()) {
            if let (Some(root), Some(entry)) = (root, self.by_handle.get_mut(handle)) {
                if entry.recursive_root.is_none() {
                    entry.recursive_root = Some(root);
                }
            }
            return Ok(handle.clone());
        }

        let handle = source.add_watch(&path, self.watch_mask)?;
        let path: Arc<Path> = Arc::from(path.as_path());

        // The kernel hands out one handle per inode; a second spelling of the
        // same inode takes over the existing entry.
        if let Some(previous) = self.by_handle.get(&handle) {
            crate::debug_event!(
                "registry",
                "handle reassigned",
                "{} -> {}",
                previous.path.display(),
                path.display()
            );
            self.by_path.remove(&previous.path);
        }

        self.by_path.insert(path.clone(), handle.clone());
        self.by_handle.insert(
            handle.clone(),
            WatchedPath {
                path: path.clone(),
                recursive_root: root,
            },
        );
        crate::debug_event!("registry", "watching", "{}", path.display());
        Ok(handle)
    }
}

impl<H> fmt::Debug for PathRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathRegistry")
            .field("watches", &self.by_handle.len())
            .field("ignore_once", &self.ignore_once.len())
            .field("ignore_permanent", &self.ignore_permanent.len())
            .field("watch_mask", &self.watch_mask)
            .finish()
    }
}
