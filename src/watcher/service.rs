//! Directory-level notification primitive.
//!
//! [`WatchService`] exposes the register / take / reset shape the event loop
//! is written against: one non-recursive subscription per directory, a
//! [`WatchKey`] per subscription, and creation events grouped by key.
//! [`NotifyWatchService`] implements it on top of `notify`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError, unbounded};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};

use super::error::WatchError;

/// Handle identifying one directory's live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchKey(u64);

impl WatchKey {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// An entry created inside a watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedEntry {
    /// Name of the new entry relative to the signalled directory.
    pub name: OsString,
}

/// A key that has pending events.
///
/// An empty `events` list means the directory itself changed state (e.g. it
/// was removed); resetting the key reports whether it is still valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub key: WatchKey,
    pub events: Vec<CreatedEntry>,
}

/// Directory-level creation notifications.
pub trait WatchService {
    /// Subscribe to entry creation in `dir` (non-recursive).
    ///
    /// Registering a directory that already has a subscription returns the
    /// existing key and does not subscribe twice.
    fn register(&mut self, dir: &Path) -> Result<WatchKey, WatchError>;

    /// Wait up to `timeout` for the next signalled key.
    ///
    /// Returns `Ok(None)` on timeout and `Err(WatchError::ChannelClosed)` once
    /// the primitive can no longer deliver events.
    fn take(&mut self, timeout: Duration) -> Result<Option<Signal>, WatchError>;

    /// Re-arm a signalled key. Returns `false` if its directory is no longer
    /// accessible, in which case the subscription is dropped.
    fn reset(&mut self, key: WatchKey) -> bool;
}

/// [`WatchService`] backed by `notify::RecommendedWatcher`.
pub struct NotifyWatchService {
    watcher: notify::RecommendedWatcher,
    event_rx: Receiver<notify::Result<Event>>,
    by_dir: HashMap<PathBuf, WatchKey>,
    dirs: HashMap<WatchKey, PathBuf>,
    /// Events accumulated per key since it was last taken.
    queued: HashMap<WatchKey, Vec<CreatedEntry>>,
    /// Signalled keys in arrival order, each at most once.
    ready: VecDeque<WatchKey>,
    /// Keys whose directory was removed or renamed away. The path may exist
    /// again by the time the key is reset, but the subscription is dead.
    gone: HashSet<WatchKey>,
    next_key: u64,
}

impl NotifyWatchService {
    /// Open the OS notification primitive.
    pub fn new() -> Result<Self, WatchError> {
        let (tx, rx) = unbounded();

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })?;

        Ok(Self {
            watcher,
            event_rx: rx,
            by_dir: HashMap::new(),
            dirs: HashMap::new(),
            queued: HashMap::new(),
            ready: VecDeque::new(),
            gone: HashSet::new(),
            next_key: 0,
        })
    }

    /// Number of live directory subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.dirs.keys().filter(|key| !self.gone.contains(key)).count()
    }

    fn ingest(&mut self, res: notify::Result<Event>) {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("[watcher] file watch error: {e}");
                return;
            }
        };

        match event.kind {
            EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                for path in &event.paths {
                    self.signal_created(path);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let [from, to] = event.paths.as_slice() {
                    self.signal_gone(from);
                    self.signal_created(to);
                }
            }
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                for path in &event.paths {
                    self.signal_gone(path);
                }
            }
            _ => {}
        }
    }

    fn signal_created(&mut self, path: &Path) {
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return;
        };
        let Some(&key) = self.by_dir.get(parent) else {
            return;
        };

        self.queued.entry(key).or_default().push(CreatedEntry {
            name: name.to_os_string(),
        });
        self.mark_ready(key);
    }

    /// A registered directory went away: signal its own key so the loop resets it.
    fn signal_gone(&mut self, path: &Path) {
        if let Some(&key) = self.by_dir.get(path) {
            self.gone.insert(key);
            self.queued.entry(key).or_default();
            self.mark_ready(key);
        }
    }

    fn mark_ready(&mut self, key: WatchKey) {
        if !self.ready.contains(&key) {
            self.ready.push_back(key);
        }
    }

    fn drain_available(&mut self) -> Result<(), WatchError> {
        loop {
            match self.event_rx.try_recv() {
                Ok(res) => self.ingest(res),
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => return Err(WatchError::ChannelClosed),
            }
        }
    }

    fn pop_signal(&mut self) -> Option<Signal> {
        let key = self.ready.pop_front()?;
        let events = self.queued.remove(&key).unwrap_or_default();
        Some(Signal { key, events })
    }
}

impl WatchService for NotifyWatchService {
    fn register(&mut self, dir: &Path) -> Result<WatchKey, WatchError> {
        if let Some(&key) = self.by_dir.get(dir) {
            if !self.gone.contains(&key) {
                return Ok(key);
            }
            // Recreated before its old key was reset: the stale key stays in
            // `dirs` so that reset still reports it invalid.
            self.by_dir.remove(dir);
            let _ = self.watcher.unwatch(dir);
        }

        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;

        let key = WatchKey(self.next_key);
        self.next_key += 1;
        self.by_dir.insert(dir.to_path_buf(), key);
        self.dirs.insert(key, dir.to_path_buf());
        Ok(key)
    }

    fn take(&mut self, timeout: Duration) -> Result<Option<Signal>, WatchError> {
        self.drain_available()?;
        if let Some(signal) = self.pop_signal() {
            return Ok(Some(signal));
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.event_rx.recv_timeout(remaining) {
                Ok(res) => {
                    self.ingest(res);
                    self.drain_available()?;
                    if let Some(signal) = self.pop_signal() {
                        return Ok(Some(signal));
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(WatchError::ChannelClosed),
            }
        }
    }

    fn reset(&mut self, key: WatchKey) -> bool {
        let Some(dir) = self.dirs.get(&key) else {
            return false;
        };
        if !self.gone.contains(&key) && dir.is_dir() {
            return true;
        }

        let Some(dir) = self.dirs.remove(&key) else {
            return false;
        };
        // A fresh registration of the same path owns the watch now.
        if self.by_dir.get(&dir) == Some(&key) {
            self.by_dir.remove(&dir);
            // The backend usually drops the watch itself when the directory goes away.
            let _ = self.watcher.unwatch(&dir);
        }
        self.gone.remove(&key);
        self.queued.remove(&key);
        self.ready.retain(|k| *k != key);
        false
    }
}
