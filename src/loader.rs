//! Artifact loaders.
//!
//! Every watch root gets its own isolated [`DirectoryLoader`] whose only search
//! location is that root. Names it cannot find are delegated to the shared
//! [`ParentContext`], mirroring how the running application resolves types.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

/// Magic number at the start of every class file.
pub const CLASS_MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

/// Errors from artifact loading.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Type '{name}' not found")]
    NotFound { name: String },

    #[error("Artifact {path} is not a valid class file: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Failed to read artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A type definition held by a loader's namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedType {
    /// Dotted type name, e.g. `com.acme.Foo`.
    pub name: String,
    /// Artifact the definition was read from.
    pub source: PathBuf,
    /// Size of the artifact when it was defined.
    pub bytes_len: usize,
}

/// Resolves a dotted type name to a loaded definition.
///
/// Loading a name that is already defined must return the existing
/// definition instead of defining it again.
pub trait ArtifactLoader: Send + Sync {
    fn load(&self, name: &str) -> Result<Arc<LoadedType>, LoadError>;
}

/// The application's shared loading context.
///
/// The reload engine binds its registry to this context, and per-root loaders
/// fall back to its loader for names they do not own.
#[derive(Clone)]
pub struct ParentContext {
    name: String,
    loader: Option<Arc<dyn ArtifactLoader>>,
}

impl ParentContext {
    /// A context without a fallback loader.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            loader: None,
        }
    }

    /// A context that resolves names through `loader`.
    pub fn with_loader(name: impl Into<String>, loader: Arc<dyn ArtifactLoader>) -> Self {
        Self {
            name: name.into(),
            loader: Some(loader),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn loader(&self) -> Option<&Arc<dyn ArtifactLoader>> {
        self.loader.as_ref()
    }
}

impl fmt::Debug for ParentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParentContext")
            .field("name", &self.name)
            .field("has_loader", &self.loader.is_some())
            .finish()
    }
}

/// Loader whose sole search location is one directory, chained to a parent context.
pub struct DirectoryLoader {
    root: PathBuf,
    parent: Option<Arc<dyn ArtifactLoader>>,
    defined: RwLock<HashMap<String, Arc<LoadedType>>>,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>, parent: &ParentContext) -> Self {
        Self {
            root: root.into(),
            parent: parent.loader().cloned(),
            defined: RwLock::new(HashMap::new()),
        }
    }

    /// Number of types defined in this loader's own namespace.
    pub fn defined_count(&self) -> usize {
        self.defined.read().len()
    }

    /// Location of the artifact for `name` under this loader's root.
    fn artifact_path(&self, name: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in name.split('.') {
            path.push(segment);
        }
        path.set_extension("class");
        path
    }

    fn define(&self, name: &str, path: PathBuf) -> Result<Arc<LoadedType>, LoadError> {
        let bytes = std::fs::read(&path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;

        if bytes.len() < CLASS_MAGIC.len() || bytes[..CLASS_MAGIC.len()] != CLASS_MAGIC {
            return Err(LoadError::Malformed {
                path,
                reason: "missing class file magic".to_string(),
            });
        }

        let mut defined = self.defined.write();
        // Another caller may have defined it while we were reading.
        let loaded = defined
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(LoadedType {
                    name: name.to_string(),
                    source: path,
                    bytes_len: bytes.len(),
                })
            })
            .clone();
        Ok(loaded)
    }
}

impl ArtifactLoader for DirectoryLoader {
    fn load(&self, name: &str) -> Result<Arc<LoadedType>, LoadError> {
        if let Some(existing) = self.defined.read().get(name) {
            return Ok(existing.clone());
        }

        let path = self.artifact_path(name);
        if path.is_file() {
            return self.define(name, path);
        }

        match &self.parent {
            Some(parent) => parent.load(name),
            None => Err(LoadError::NotFound {
                name: name.to_string(),
            }),
        }
    }
}

impl fmt::Debug for DirectoryLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryLoader")
            .field("root", &self.root)
            .field("defined", &self.defined_count())
            .finish()
    }
}
