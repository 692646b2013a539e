//! Eager registration of directory trees.
//!
//! The notification primitive only watches single directories, so recursive
//! coverage comes from registering every directory of a tree when it is
//! discovered, and again for each subdirectory created later.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::error::WatchError;
use super::service::{WatchKey, WatchService};

/// Owns the notification service and the key to directory mapping.
///
/// Only the event loop thread touches this, so the map needs no locking.
pub struct DirectoryRegistrar<S> {
    service: S,
    keys: HashMap<WatchKey, PathBuf>,
}

impl<S: WatchService> DirectoryRegistrar<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            keys: HashMap::new(),
        }
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    /// Register `dir` alone.
    ///
    /// Re-registering refreshes the stored path for the existing key.
    pub fn register(&mut self, dir: &Path) -> Result<WatchKey, WatchError> {
        let key = self.service.register(dir)?;
        if self.keys.insert(key, dir.to_path_buf()).is_none() {
            tracing::debug!(
                "[registrar] directory '{}' will be monitored for changes",
                dir.display()
            );
        }
        Ok(key)
    }

    /// Register `start` and every directory below it.
    ///
    /// Returns the directories visited, `start` first. Failures below `start`
    /// are logged and that sub-tree is skipped; a failure on `start` itself is
    /// returned.
    pub fn register_all(&mut self, start: &Path) -> Result<Vec<PathBuf>, WatchError> {
        let mut visited = Vec::new();
        let mut walker = WalkDir::new(start).follow_links(false).into_iter();

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("walk failed"));
                    return Err(WatchError::io(start, source));
                }
                Err(e) => {
                    tracing::warn!("[registrar] skipping unreadable entry: {e}");
                    continue;
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            match self.register(entry.path()) {
                Ok(_) => visited.push(entry.into_path()),
                Err(e) if entry.depth() == 0 => return Err(e),
                Err(e) => {
                    tracing::warn!("[registrar] {e}");
                    walker.skip_current_dir();
                }
            }
        }

        Ok(visited)
    }

    /// Re-arm `key`; drops it from the tracked set when its directory is gone.
    pub fn reset(&mut self, key: WatchKey) -> bool {
        if self.service.reset(key) {
            return true;
        }
        if let Some(dir) = self.keys.remove(&key) {
            crate::debug_event!("registrar", "no longer accessible", "{}", dir.display());
        }
        false
    }

    pub fn path_for(&self, key: WatchKey) -> Option<&Path> {
        self.keys.get(&key).map(PathBuf::as_path)
    }

    pub fn contains_dir(&self, dir: &Path) -> bool {
        self.keys.values().any(|d| d == dir)
    }

    /// Number of tracked directories.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
