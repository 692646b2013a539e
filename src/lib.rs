//! Hot-loading of freshly compiled class artifacts.
//!
//! `classwatch` watches one or more build-output roots, maps every new
//! artifact to its type name, loads it through the owning root's isolated
//! loader and tells the running reload engine about the new version.

pub mod config;
pub mod engine;
pub mod loader;
pub mod logging;
pub mod watcher;

pub mod cli;

pub use config::Settings;
pub use engine::{
    DetachedEngine, EngineError, LoggingEngine, RegistryHandle, ReloadEngine,
    encode_version_stamp,
};
pub use loader::{ArtifactLoader, DirectoryLoader, LoadError, LoadedType, ParentContext};
pub use watcher::{ClassWatcher, WatchError, WatcherHandle, register};
