//! Capability interface to the external reload engine.
//!
//! The watcher never sees the engine's internals. It asks for the registry
//! bound to a loading context and fires a notification carrying the type's
//! internal identifier and a version stamp.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use thiserror::Error;

use crate::loader::ParentContext;

/// Errors reported by a reload engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Type '{type_id}' is not registered with the reload engine")]
    UnknownType { type_id: String },

    #[error("Reload notification for '{type_id}' failed: {reason}")]
    NotifyFailed { type_id: String, reason: String },
}

/// Opaque handle to a live registry inside the reload engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryHandle {
    id: u64,
    context: String,
}

impl RegistryHandle {
    pub fn new(id: u64, context: impl Into<String>) -> Self {
        Self {
            id,
            context: context.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the loading context the registry is bound to.
    pub fn context(&self) -> &str {
        &self.context
    }
}

/// The reload engine as seen by the watcher.
pub trait ReloadEngine: Send + Sync {
    /// Registry bound to `context`, or `None` if the engine is not active for it.
    fn find_registry(&self, context: &ParentContext) -> Option<RegistryHandle>;

    /// Tell the engine that `type_id` (slashed form) should be (re)instrumented.
    fn notify(
        &self,
        registry: &RegistryHandle,
        type_id: &str,
        version_stamp: &str,
    ) -> Result<(), EngineError>;
}

impl<E: ReloadEngine + ?Sized> ReloadEngine for Arc<E> {
    fn find_registry(&self, context: &ParentContext) -> Option<RegistryHandle> {
        (**self).find_registry(context)
    }

    fn notify(
        &self,
        registry: &RegistryHandle,
        type_id: &str,
        version_stamp: &str,
    ) -> Result<(), EngineError> {
        (**self).notify(registry, type_id, version_stamp)
    }
}

const STAMP_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Encode a modification time as a version stamp.
///
/// Milliseconds since the Unix epoch in lowercase base 36. Times before the
/// epoch encode as `"0"`.
pub fn encode_version_stamp(modified: SystemTime) -> String {
    let mut millis = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);

    if millis == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while millis > 0 {
        digits.push(STAMP_DIGITS[(millis % 36) as usize]);
        millis /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// One notification received by a [`LoggingEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadNotice {
    pub type_id: String,
    pub version_stamp: String,
}

/// Engine that accepts every context and records each notification.
///
/// Used by the CLI, where no instrumentation agent is attached.
#[derive(Debug, Default)]
pub struct LoggingEngine {
    next_id: AtomicUsize,
    notices: Mutex<Vec<ReloadNotice>>,
}

impl LoggingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications received so far.
    pub fn notices(&self) -> Vec<ReloadNotice> {
        self.notices.lock().clone()
    }

    pub fn notice_count(&self) -> usize {
        self.notices.lock().len()
    }
}

impl ReloadEngine for LoggingEngine {
    fn find_registry(&self, context: &ParentContext) -> Option<RegistryHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) as u64;
        Some(RegistryHandle::new(id, context.name()))
    }

    fn notify(
        &self,
        registry: &RegistryHandle,
        type_id: &str,
        version_stamp: &str,
    ) -> Result<(), EngineError> {
        crate::log_event!(
            "engine",
            "reload",
            "{type_id} @ {version_stamp} ({})",
            registry.context()
        );
        self.notices.lock().push(ReloadNotice {
            type_id: type_id.to_string(),
            version_stamp: version_stamp.to_string(),
        });
        Ok(())
    }
}

/// Engine that is never active: types get loaded but not instrumented.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedEngine;

impl ReloadEngine for DetachedEngine {
    fn find_registry(&self, _context: &ParentContext) -> Option<RegistryHandle> {
        None
    }

    fn notify(
        &self,
        _registry: &RegistryHandle,
        type_id: &str,
        _version_stamp: &str,
    ) -> Result<(), EngineError> {
        Err(EngineError::UnknownType {
            type_id: type_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_version_stamp_encoding() {
        assert_eq!(encode_version_stamp(UNIX_EPOCH), "0");
        assert_eq!(
            encode_version_stamp(UNIX_EPOCH + Duration::from_millis(35)),
            "z"
        );
        assert_eq!(
            encode_version_stamp(UNIX_EPOCH + Duration::from_millis(36)),
            "10"
        );
        assert_eq!(
            encode_version_stamp(UNIX_EPOCH + Duration::from_millis(1_700_000_000_000)),
            "loyw3v28"
        );
    }

    #[test]
    fn test_version_stamp_orders_successive_versions() {
        let earlier = encode_version_stamp(UNIX_EPOCH + Duration::from_secs(1_000));
        let later = encode_version_stamp(UNIX_EPOCH + Duration::from_secs(1_001));
        assert_ne!(earlier, later);
        assert_eq!(earlier.len(), later.len());
        assert!(earlier < later);
    }

    #[test]
    fn test_logging_engine_records_notices() {
        let engine = LoggingEngine::new();
        let context = ParentContext::new("app");

        let registry = engine.find_registry(&context).unwrap();
        assert_eq!(registry.context(), "app");

        engine.notify(&registry, "com/acme/Foo", "abc").unwrap();
        assert_eq!(
            engine.notices(),
            vec![ReloadNotice {
                type_id: "com/acme/Foo".to_string(),
                version_stamp: "abc".to_string(),
            }]
        );
    }

    #[test]
    fn test_detached_engine_has_no_registry() {
        assert!(
            DetachedEngine
                .find_registry(&ParentContext::new("app"))
                .is_none()
        );
    }
}
