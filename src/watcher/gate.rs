//! Readiness gate for freshly created artifacts.
//!
//! A creation event can arrive while the compiler or a copy is still writing
//! the file. Artifacts wait here until their size has been stable for the
//! settle window, the same way file saves are debounced elsewhere.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// An artifact file observed by the event loop, not yet loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingArtifact {
    /// Full path of the artifact.
    pub file: PathBuf,
    /// Directory the artifact was observed in.
    pub dir: PathBuf,
    pub file_name: String,
    size: u64,
    stable_since: Instant,
}

impl PendingArtifact {
    pub fn new(dir: PathBuf, file_name: String, now: Instant) -> Self {
        Self {
            file: dir.join(&file_name),
            dir,
            file_name,
            size: 0,
            stable_since: now,
        }
    }
}

#[derive(Debug)]
pub struct ReadinessGate {
    settle: Duration,
    pending: HashMap<PathBuf, PendingArtifact>,
}

impl ReadinessGate {
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            pending: HashMap::new(),
        }
    }

    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// Start tracking an artifact. Admitting a tracked file restarts its window.
    pub fn admit(&mut self, mut artifact: PendingArtifact) {
        if !self.settle.is_zero() {
            artifact.size = current_size(&artifact).unwrap_or(0);
        }
        self.pending.insert(artifact.file.clone(), artifact);
    }

    /// Artifacts whose size has not changed for the settle window, sorted by path.
    ///
    /// Files that disappeared while pending are dropped.
    pub fn take_ready(&mut self, now: Instant) -> Vec<PendingArtifact> {
        let mut ready = Vec::new();

        if self.settle.is_zero() {
            ready.extend(self.pending.drain().map(|(_, artifact)| artifact));
        } else {
            let settle = self.settle;
            self.pending.retain(|_, artifact| {
                let Some(size) = current_size(artifact) else {
                    crate::debug_event!("gate", "vanished", "{}", artifact.file.display());
                    return false;
                };

                if size != artifact.size {
                    artifact.size = size;
                    artifact.stable_since = now;
                    return true;
                }

                if now.saturating_duration_since(artifact.stable_since) >= settle {
                    ready.push(artifact.clone());
                    false
                } else {
                    true
                }
            });
        }

        ready.sort_by(|a, b| a.file.cmp(&b.file));
        ready
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

fn current_size(artifact: &PendingArtifact) -> Option<u64> {
    std::fs::metadata(&artifact.file).ok().map(|meta| meta.len())
}
