//! The watcher's single control loop.
//!
//! ```text
//! take(key) --> unknown key ------------------------------> ignore
//!           --> created dir  --> register_all --> existing artifacts --+
//!           --> created file -----------------------------------------+--> gate --> bridge
//!           --> reset(key) invalid --> drop --> none left --> Stopping
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};

use super::bridge::{BridgeOutcome, ClassLoaderBridge};
use super::error::WatchError;
use super::gate::{PendingArtifact, ReadinessGate};
use super::registrar::DirectoryRegistrar;
use super::service::{Signal, WatchService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopping,
    Stopped,
}

/// Tunables for the event loop.
#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// Suffix identifying artifact files, e.g. `.class`.
    pub artifact_suffix: String,
    /// Upper bound on one blocking wait.
    pub poll_interval: Duration,
    /// Readiness window for new artifacts.
    pub settle: Duration,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            artifact_suffix: ".class".to_string(),
            poll_interval: Duration::from_millis(250),
            settle: Duration::from_millis(50),
        }
    }
}

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    /// Artifacts loaded, with or without instrumentation.
    pub loaded: usize,
    /// Artifacts that could not be resolved or loaded.
    pub failed: usize,
    /// Directories still tracked at exit.
    pub directories: usize,
}

pub struct EventLoop<S> {
    registrar: DirectoryRegistrar<S>,
    bridge: ClassLoaderBridge,
    gate: ReadinessGate,
    options: LoopOptions,
    running: Arc<AtomicBool>,
    state: LoopState,
    /// Last version delivered per artifact, so one file version is loaded once.
    delivered: HashMap<PathBuf, SystemTime>,
    summary: LoopSummary,
}

impl<S: WatchService> EventLoop<S> {
    /// `registrar` must already hold the registered roots.
    pub fn new(
        registrar: DirectoryRegistrar<S>,
        bridge: ClassLoaderBridge,
        options: LoopOptions,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            registrar,
            bridge,
            gate: ReadinessGate::new(options.settle),
            options,
            running,
            state: LoopState::Running,
            delivered: HashMap::new(),
            summary: LoopSummary::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run until stopped. The loop cannot be restarted.
    pub fn run(mut self) -> LoopSummary {
        crate::log_event!(
            "watcher",
            "started",
            "{} directories under {} roots",
            self.registrar.len(),
            self.bridge.roots().roots().len()
        );

        if self.registrar.is_empty() {
            self.state = LoopState::Stopping;
        }
        while self.state == LoopState::Running {
            self.step();
        }

        self.state = LoopState::Stopped;
        self.summary.directories = self.registrar.len();
        crate::log_event!(
            "watcher",
            "stopped",
            "{} loaded, {} failed",
            self.summary.loaded,
            self.summary.failed
        );
        self.summary
    }

    /// One iteration: check the run flag, wait for a key, release ready artifacts.
    fn step(&mut self) -> LoopState {
        if !self.running.load(Ordering::Acquire) {
            crate::debug_event!("watcher", "stop requested");
            self.state = LoopState::Stopping;
            return self.state;
        }

        let timeout = if self.gate.has_pending() {
            self.options.poll_interval.min(self.gate.settle())
        } else {
            self.options.poll_interval
        };

        match self.registrar.service_mut().take(timeout) {
            Ok(Some(signal)) => self.handle_signal(signal),
            Ok(None) => {}
            Err(WatchError::ChannelClosed) => {
                tracing::error!("[watcher] notification channel closed");
                self.state = LoopState::Stopping;
            }
            Err(e) => tracing::error!("[watcher] {e}"),
        }

        self.release_ready(Instant::now());
        self.state
    }

    fn handle_signal(&mut self, signal: Signal) {
        let Some(dir) = self.registrar.path_for(signal.key).map(Path::to_path_buf) else {
            return;
        };

        for entry in &signal.events {
            let child = dir.join(&entry.name);
            if let Err(e) = self.handle_created(&dir, &child) {
                tracing::error!("[watcher] failed to process {}: {e}", child.display());
            }
        }

        if !self.registrar.reset(signal.key) {
            // Artifacts in a recreated directory are new files.
            self.delivered.retain(|file, _| file.parent() != Some(dir.as_path()));
            if self.registrar.is_empty() {
                crate::log_event!("watcher", "all directories are inaccessible");
                self.state = LoopState::Stopping;
            }
        }
    }

    fn handle_created(&mut self, dir: &Path, child: &Path) -> Result<(), WatchError> {
        let meta = std::fs::symlink_metadata(child).map_err(|e| WatchError::io(child, e))?;

        if meta.is_dir() {
            // Files may already be inside (a whole directory copied at once).
            for registered in self.registrar.register_all(child)? {
                if let Err(e) = self.admit_existing(&registered) {
                    tracing::warn!("[watcher] failed to list {}: {e}", registered.display());
                }
            }
        } else if let Some(name) = self.artifact_name(child) {
            self.gate
                .admit(PendingArtifact::new(dir.to_path_buf(), name, Instant::now()));
        }

        Ok(())
    }

    fn admit_existing(&mut self, dir: &Path) -> Result<(), WatchError> {
        let entries = std::fs::read_dir(dir).map_err(|e| WatchError::io(dir, e))?;
        let now = Instant::now();

        for entry in entries {
            let entry = entry.map_err(|e| WatchError::io(dir, e))?;
            let path = entry.path();
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = self.artifact_name(&path) {
                self.gate
                    .admit(PendingArtifact::new(dir.to_path_buf(), name, now));
            }
        }

        Ok(())
    }

    /// File name of `path` if it carries the artifact suffix.
    fn artifact_name(&self, path: &Path) -> Option<String> {
        let name = path.file_name()?;
        let Some(name) = name.to_str() else {
            tracing::warn!("[watcher] skipping non UTF-8 file name {}", path.display());
            return None;
        };
        name.ends_with(&self.options.artifact_suffix)
            .then(|| name.to_string())
    }

    fn release_ready(&mut self, now: Instant) {
        for artifact in self.gate.take_ready(now) {
            let modified = std::fs::metadata(&artifact.file)
                .and_then(|meta| meta.modified())
                .ok();
            if modified.is_some() && self.delivered.get(&artifact.file) == modified.as_ref() {
                crate::debug_event!("watcher", "already delivered", "{}", artifact.file.display());
                continue;
            }

            let outcome =
                self.bridge
                    .load_and_notify(&artifact.dir, &artifact.file_name, &artifact.file);
            match outcome {
                BridgeOutcome::Reloaded(resolved) | BridgeOutcome::LoadedOnly(resolved) => {
                    self.summary.loaded += 1;
                    self.delivered
                        .insert(resolved.source_file, resolved.last_modified);
                }
                BridgeOutcome::Unresolved | BridgeOutcome::Failed => {
                    self.summary.failed += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LoggingEngine;
    use crate::loader::{CLASS_MAGIC, ParentContext};
    use crate::watcher::roots::RootRegistry;
    use crate::watcher::service::testing::{ScriptedService, Step, Subscriptions};
    use std::fs;
    use tempfile::TempDir;

    struct Harness {
        temp: TempDir,
        root: PathBuf,
        engine: Arc<LoggingEngine>,
        running: Arc<AtomicBool>,
        subscriptions: Subscriptions,
    }

    impl Harness {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let root = temp.path().join("classes");
            fs::create_dir_all(&root).unwrap();
            let root = root.canonicalize().unwrap();
            Self {
                temp,
                root,
                engine: Arc::new(LoggingEngine::new()),
                running: Arc::new(AtomicBool::new(true)),
                subscriptions: Subscriptions::default(),
            }
        }

        fn event_loop(&mut self, script: Vec<Step>) -> EventLoop<ScriptedService> {
            let service = ScriptedService::new(script);
            self.subscriptions = service.subscriptions();
            let mut registrar = DirectoryRegistrar::new(service);
            registrar.register_all(&self.root).unwrap();

            let roots =
                RootRegistry::new(&[self.root.clone()], ParentContext::new("app")).unwrap();
            let bridge = ClassLoaderBridge::new(roots, self.engine.clone());
            let options = LoopOptions {
                settle: Duration::ZERO,
                ..LoopOptions::default()
            };
            EventLoop::new(registrar, bridge, options, self.running.clone())
        }

        fn write_class(&self, relative: &str) -> PathBuf {
            let path = self.root.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, CLASS_MAGIC).unwrap();
            path
        }

        fn type_ids(&self) -> Vec<String> {
            let mut ids: Vec<String> =
                self.engine.notices().into_iter().map(|n| n.type_id).collect();
            ids.sort();
            ids
        }
    }

    #[test]
    fn test_created_file_is_reloaded() {
        let mut h = Harness::new();
        let mut event_loop = h.event_loop(vec![]);
        h.write_class("Foo.class");
        event_loop
            .registrar
            .service_mut()
            .push(Step::created(&h.root, &["Foo.class"]));

        let summary = event_loop.run();

        assert_eq!(summary.loaded, 1);
        assert_eq!(h.type_ids(), vec!["Foo"]);
    }

    #[test]
    fn test_new_subdirectory_is_registered_and_observed() {
        let mut h = Harness::new();
        let mut event_loop = h.event_loop(vec![]);
        let a = h.root.join("a");
        assert!(!event_loop.registrar.contains_dir(&a));

        fs::create_dir(&a).unwrap();
        event_loop
            .registrar
            .service_mut()
            .push(Step::created(&h.root, &["a"]));
        assert_eq!(event_loop.step(), LoopState::Running);
        assert!(event_loop.registrar.contains_dir(&a));

        // No explicit registration: the file event arrives on the new key.
        h.write_class("a/b.class");
        event_loop
            .registrar
            .service_mut()
            .push(Step::created(&a, &["b.class"]));
        event_loop.run();

        assert_eq!(h.type_ids(), vec!["a/b"]);
    }

    #[test]
    fn test_copied_directory_routes_existing_artifacts() {
        let mut h = Harness::new();
        let mut event_loop = h.event_loop(vec![]);

        let staged = h.temp.path().join("staged");
        for relative in ["One.class", "Two.class", "Three.class", "deep/Four.class"] {
            let path = staged.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, CLASS_MAGIC).unwrap();
        }
        fs::write(staged.join("README.txt"), b"not an artifact").unwrap();
        fs::rename(&staged, h.root.join("pkg")).unwrap();

        event_loop
            .registrar
            .service_mut()
            .push(Step::created(&h.root, &["pkg"]));
        let summary = event_loop.run();

        assert_eq!(summary.loaded, 4);
        assert_eq!(
            h.type_ids(),
            vec!["pkg/One", "pkg/Three", "pkg/Two", "pkg/deep/Four"]
        );
        assert!(
            h.subscriptions
                .lock()
                .contains(&h.root.join("pkg").join("deep"))
        );
    }

    #[test]
    fn test_duplicate_signal_delivers_once() {
        let mut h = Harness::new();
        h.write_class("Foo.class");
        let mut event_loop = h.event_loop(vec![]);
        let service = event_loop.registrar.service_mut();
        service.push(Step::created(&h.root, &["Foo.class"]));
        service.push(Step::created(&h.root, &["Foo.class"]));

        let summary = event_loop.run();

        assert_eq!(summary.loaded, 1);
        assert_eq!(h.engine.notice_count(), 1);
    }

    #[test]
    fn test_failures_do_not_stop_the_loop() {
        let mut h = Harness::new();
        fs::write(h.root.join("Broken.class"), b"no").unwrap();
        h.write_class("Good.class");
        let mut event_loop = h.event_loop(vec![]);
        let service = event_loop.registrar.service_mut();
        service.push(Step::created(&h.root, &["Missing.class"]));
        service.push(Step::created(&h.root, &["Broken.class"]));
        service.push(Step::Stray);
        service.push(Step::created(&h.root, &["Good.class"]));

        let summary = event_loop.run();

        assert_eq!(summary.loaded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(h.type_ids(), vec!["Good"]);
    }

    #[test]
    fn test_non_artifact_files_are_ignored() {
        let mut h = Harness::new();
        fs::write(h.root.join("notes.txt"), b"x").unwrap();
        let mut event_loop = h.event_loop(vec![]);
        event_loop
            .registrar
            .service_mut()
            .push(Step::created(&h.root, &["notes.txt"]));

        let summary = event_loop.run();
        assert_eq!(summary, LoopSummary { loaded: 0, failed: 0, directories: 1 });
    }

    #[test]
    fn test_deleted_directory_is_dropped_and_last_one_stops() {
        let mut h = Harness::new();
        let sub = h.root.join("sub");
        fs::create_dir(&sub).unwrap();
        let mut event_loop = h.event_loop(vec![]);
        assert_eq!(event_loop.registrar.len(), 2);

        fs::remove_dir(&sub).unwrap();
        event_loop
            .registrar
            .service_mut()
            .push(Step::Touched { dir: sub.clone() });
        assert_eq!(event_loop.step(), LoopState::Running);
        assert_eq!(event_loop.registrar.len(), 1);

        fs::remove_dir(&h.root).unwrap();
        event_loop
            .registrar
            .service_mut()
            .push(Step::Touched { dir: h.root.clone() });
        assert_eq!(event_loop.step(), LoopState::Stopping);

        let summary = event_loop.run();
        assert_eq!(summary.directories, 0);
    }

    #[test]
    fn test_stop_flag_observed_at_top_of_iteration() {
        let mut h = Harness::new();
        let mut event_loop = h.event_loop(vec![Step::Idle, Step::Idle, Step::Idle]);

        assert_eq!(event_loop.step(), LoopState::Running);
        h.running.store(false, Ordering::Release);
        assert_eq!(event_loop.step(), LoopState::Stopping);
        assert_eq!(event_loop.state(), LoopState::Stopping);
    }

    #[test]
    fn test_dropped_directory_forgets_delivered_artifacts() {
        let mut h = Harness::new();
        let sub = h.root.join("sub");
        fs::create_dir(&sub).unwrap();
        let kept = h.write_class("Kept.class");
        h.write_class("sub/Gone.class");
        let mut event_loop = h.event_loop(vec![]);
        let service = event_loop.registrar.service_mut();
        service.push(Step::created(&h.root, &["Kept.class"]));
        service.push(Step::created(&sub, &["Gone.class"]));

        event_loop.step();
        event_loop.step();
        assert_eq!(event_loop.delivered.len(), 2);

        fs::remove_dir_all(&sub).unwrap();
        event_loop
            .registrar
            .service_mut()
            .push(Step::Touched { dir: sub.clone() });
        assert_eq!(event_loop.step(), LoopState::Running);

        assert_eq!(event_loop.delivered.keys().collect::<Vec<_>>(), vec![&kept]);
    }
}
