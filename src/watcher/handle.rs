//! Watcher lifecycle: build once, start once, stop and join through a handle.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::Settings;
use crate::engine::{DetachedEngine, ReloadEngine};
use crate::loader::{ArtifactLoader, ParentContext};

use super::bridge::ClassLoaderBridge;
use super::error::WatchError;
use super::event_loop::{EventLoop, LoopOptions, LoopSummary};
use super::registrar::DirectoryRegistrar;
use super::roots::RootRegistry;
use super::service::{NotifyWatchService, WatchService};

type LoaderFactory = Box<dyn Fn(&Path, &ParentContext) -> Arc<dyn ArtifactLoader> + Send>;

/// A configured, not yet started watcher.
pub struct ClassWatcher {
    roots: Vec<PathBuf>,
    parent: ParentContext,
    engine: Arc<dyn ReloadEngine>,
    options: LoopOptions,
    loader_factory: Option<LoaderFactory>,
}

impl ClassWatcher {
    /// Create a builder for configuring the watcher.
    pub fn builder() -> ClassWatcherBuilder {
        ClassWatcherBuilder::new()
    }

    /// Register every root and start the event loop on its own thread.
    ///
    /// Setup happens on the calling thread, so failing to open the
    /// notification primitive or to register a root is returned here.
    pub fn start(self) -> Result<WatcherHandle, WatchError> {
        let service = NotifyWatchService::new()?;
        self.start_with(service)
    }

    /// Like [`ClassWatcher::start`] with a caller-supplied notification service.
    pub fn start_with<S>(self, service: S) -> Result<WatcherHandle, WatchError>
    where
        S: WatchService + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let event_loop = self.prepare(service, running.clone())?;

        let thread = std::thread::Builder::new()
            .name("classwatch-loop".to_string())
            .spawn(move || event_loop.run())
            .map_err(|e| WatchError::InitFailed {
                reason: format!("cannot spawn watcher thread: {e}"),
            })?;

        Ok(WatcherHandle {
            running,
            thread: Some(thread),
        })
    }

    fn prepare<S: WatchService>(
        self,
        service: S,
        running: Arc<AtomicBool>,
    ) -> Result<EventLoop<S>, WatchError> {
        let roots = match self.loader_factory {
            Some(factory) => RootRegistry::with_loader_factory(&self.roots, self.parent, factory),
            None => RootRegistry::new(&self.roots, self.parent),
        }?;

        let mut registrar = DirectoryRegistrar::new(service);
        for root in roots.roots() {
            registrar.register_all(root.path())?;
        }

        let bridge = ClassLoaderBridge::new(roots, self.engine);
        Ok(EventLoop::new(registrar, bridge, self.options, running))
    }
}

impl fmt::Debug for ClassWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassWatcher")
            .field("roots", &self.roots)
            .field("parent", &self.parent)
            .field("options", &self.options)
            .finish()
    }
}

/// Owned handle to a running watcher.
///
/// Dropping the handle requests a stop but does not wait for the thread.
#[derive(Debug)]
#[must_use = "dropping the handle stops the watcher"]
pub struct WatcherHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<LoopSummary>>,
}

impl WatcherHandle {
    /// Ask the loop to exit; it notices within one poll interval.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// The flag the loop checks once per iteration.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the loop to exit on its own (or after [`WatcherHandle::stop`]).
    pub fn join(mut self) -> Result<LoopSummary, WatchError> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| WatchError::ThreadPanicked),
            None => Ok(LoopSummary::default()),
        }
    }

    /// Stop and wait at most `timeout` for the loop to exit.
    ///
    /// Returns `None` if the loop did not finish in time; its thread is left
    /// to exit on its own.
    pub fn shutdown(self, timeout: Duration) -> Option<LoopSummary> {
        self.stop();
        let deadline = Instant::now() + timeout;
        while !self.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!("[watcher] did not stop within {timeout:?}");
                return None;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        match self.join() {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::error!("[watcher] failed during shutdown: {e}");
                None
            }
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start a watcher from settings, logging instead of failing.
///
/// This is the permissive entry point for applications: if setup fails,
/// no class will be hot-loaded but the rest of the process carries on.
/// The watcher runs for as long as the returned handle is kept.
#[must_use = "dropping the handle stops the watcher"]
pub fn register(
    settings: &Settings,
    parent: ParentContext,
    engine: Arc<dyn ReloadEngine>,
) -> Option<WatcherHandle> {
    let started = ClassWatcher::builder()
        .settings(settings)
        .parent(parent)
        .engine_arc(engine)
        .build()
        .and_then(ClassWatcher::start);

    match started {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::error!("Failed to start the watcher. New classes will not be loaded: {e}");
            None
        }
    }
}

/// Builder for constructing a [`ClassWatcher`].
pub struct ClassWatcherBuilder {
    roots: Vec<PathBuf>,
    parent: Option<ParentContext>,
    engine: Option<Arc<dyn ReloadEngine>>,
    options: LoopOptions,
    loader_factory: Option<LoaderFactory>,
}

impl ClassWatcherBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            roots: Vec::new(),
            parent: None,
            engine: None,
            options: LoopOptions::default(),
            loader_factory: None,
        }
    }

    /// Apply the `[watch]` and `[engine]` sections of `settings`.
    pub fn settings(mut self, settings: &Settings) -> Self {
        self.roots = settings.watch.roots.clone();
        self.options = LoopOptions {
            artifact_suffix: settings.watch.artifact_suffix.clone(),
            poll_interval: settings.watch.poll_interval(),
            settle: settings.watch.settle(),
        };
        if self.parent.is_none() {
            self.parent = Some(ParentContext::new(settings.engine.context.clone()));
        }
        self
    }

    /// Replace the root list.
    pub fn roots<I, P>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.roots = roots.into_iter().map(Into::into).collect();
        self
    }

    /// Append one root.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    /// Set the parent loading context.
    pub fn parent(mut self, parent: ParentContext) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Set the reload engine.
    pub fn engine(self, engine: impl ReloadEngine + 'static) -> Self {
        self.engine_arc(Arc::new(engine))
    }

    /// Set an already shared reload engine.
    pub fn engine_arc(mut self, engine: Arc<dyn ReloadEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn artifact_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.options.artifact_suffix = suffix.into();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.options.poll_interval = interval;
        self
    }

    pub fn settle(mut self, settle: Duration) -> Self {
        self.options.settle = settle;
        self
    }

    /// Build per-root loaders with `factory` instead of the directory loader.
    pub fn loader_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Path, &ParentContext) -> Arc<dyn ArtifactLoader> + Send + 'static,
    {
        self.loader_factory = Some(Box::new(factory));
        self
    }

    /// Build the ClassWatcher.
    pub fn build(self) -> Result<ClassWatcher, WatchError> {
        if self.options.artifact_suffix.is_empty() {
            return Err(WatchError::ConfigError {
                reason: "artifact suffix must not be empty".to_string(),
            });
        }
        if self.options.poll_interval.is_zero() {
            return Err(WatchError::ConfigError {
                reason: "poll interval must be greater than zero".to_string(),
            });
        }

        Ok(ClassWatcher {
            roots: self.roots,
            parent: self.parent.unwrap_or_else(|| ParentContext::new("app")),
            engine: self.engine.unwrap_or_else(|| Arc::new(DetachedEngine)),
            options: self.options,
            loader_factory: self.loader_factory,
        })
    }
}

impl Default for ClassWatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
