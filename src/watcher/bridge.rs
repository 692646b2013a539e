//! Loads discovered artifacts and hands them to the reload engine.

use std::path::Path;
use std::sync::Arc;

use crate::engine::{ReloadEngine, encode_version_stamp};

use super::error::WatchError;
use super::resolver::{ResolvedType, resolve};
use super::roots::RootRegistry;

/// What happened to one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// Loaded and the engine was told to instrument it.
    Reloaded(ResolvedType),
    /// Loaded, but no registry is active for the parent context.
    LoadedOnly(ResolvedType),
    /// No configured root owns the artifact's directory, or no type name
    /// could be derived.
    Unresolved,
    /// Loading or notifying failed.
    Failed,
}

impl BridgeOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, BridgeOutcome::Reloaded(_) | BridgeOutcome::LoadedOnly(_))
    }
}

pub struct ClassLoaderBridge {
    roots: RootRegistry,
    engine: Arc<dyn ReloadEngine>,
}

impl ClassLoaderBridge {
    pub fn new(roots: RootRegistry, engine: Arc<dyn ReloadEngine>) -> Self {
        Self { roots, engine }
    }

    pub fn roots(&self) -> &RootRegistry {
        &self.roots
    }

    /// Load the artifact `file` (named `file_name`, found in `dir`) and notify
    /// the engine. Never fails: every problem is logged and reported through
    /// the outcome.
    pub fn load_and_notify(&self, dir: &Path, file_name: &str, file: &Path) -> BridgeOutcome {
        let (root, resolved) = match resolve(&self.roots, dir, file_name, file) {
            Ok(found) => found,
            Err(e @ WatchError::Io { .. }) => {
                tracing::error!("[bridge] failed to load the class named {file_name}: {e}");
                return BridgeOutcome::Failed;
            }
            Err(e) => {
                tracing::warn!("[bridge] {e}");
                return BridgeOutcome::Unresolved;
            }
        };

        match self.load(root.loader().as_ref(), resolved) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("[bridge] failed to load the class named {file_name}: {e}");
                BridgeOutcome::Failed
            }
        }
    }

    fn load(
        &self,
        loader: &dyn crate::loader::ArtifactLoader,
        resolved: ResolvedType,
    ) -> Result<BridgeOutcome, WatchError> {
        loader.load(&resolved.dotted_name)?;

        // The registry lives with the application's context, not the per-root loader.
        let Some(registry) = self.engine.find_registry(self.roots.parent()) else {
            crate::debug_event!(
                "bridge",
                "no reload registry",
                "'{}' loaded without instrumentation",
                resolved.dotted_name
            );
            return Ok(BridgeOutcome::LoadedOnly(resolved));
        };

        let version_stamp = encode_version_stamp(resolved.last_modified);
        self.engine
            .notify(&registry, &resolved.slashed_name, &version_stamp)?;

        tracing::debug!("[bridge] new class '{}' has been loaded", resolved.dotted_name);
        Ok(BridgeOutcome::Reloaded(resolved))
    }
}
