//! Recursive class-output watcher.
//!
//! Watches build-output roots for newly created class artifacts, loads them
//! through the owning root's isolated loader and notifies the reload engine.
//!
//! # Architecture
//!
//! ```text
//! WatcherHandle (start / stop / join)
//!   - EventLoop (one dedicated thread)
//!       - DirectoryRegistrar  WatchKey -> directory, eager re-registration
//!           - WatchService    notify, one non-recursive watch per directory
//!       - ReadinessGate       holds artifacts until their size settles
//!       - ClassLoaderBridge
//!           - RootRegistry    roots + per-root loaders
//!           - resolver        directory + file name -> type names
//!           - ReloadEngine    find_registry / notify
//! ```

mod bridge;
mod error;
mod event_loop;
mod gate;
mod handle;
mod registrar;
mod resolver;
mod roots;
mod service;

pub use bridge::{BridgeOutcome, ClassLoaderBridge};
pub use error::WatchError;
pub use event_loop::{EventLoop, LoopOptions, LoopState, LoopSummary};
pub use gate::{PendingArtifact, ReadinessGate};
pub use handle::{ClassWatcher, ClassWatcherBuilder, WatcherHandle, register};
pub use registrar::DirectoryRegistrar;
pub use resolver::{ResolvedType, resolve, type_names};
pub use roots::{RootRegistry, WatchRoot};
pub use service::{CreatedEntry, NotifyWatchService, Signal, WatchKey, WatchService};
