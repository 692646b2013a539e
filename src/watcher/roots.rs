//! Configured watch roots and their isolated loaders.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::config::effective_roots;
use crate::loader::{ArtifactLoader, DirectoryLoader, ParentContext};

use super::error::WatchError;

/// A configured root directory and the loader scoped to it.
#[derive(Clone)]
pub struct WatchRoot {
    path: PathBuf,
    loader: Arc<dyn ArtifactLoader>,
}

impl WatchRoot {
    /// Canonical path of the root.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn loader(&self) -> &Arc<dyn ArtifactLoader> {
        &self.loader
    }
}

impl fmt::Debug for WatchRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchRoot").field("path", &self.path).finish()
    }
}

/// Registry of watch roots, immutable after construction.
#[derive(Debug)]
pub struct RootRegistry {
    roots: Vec<WatchRoot>,
    parent: ParentContext,
}

impl RootRegistry {
    /// Build one [`DirectoryLoader`] per root, chained to `parent`.
    ///
    /// An empty `roots` list is replaced by the conventional default root.
    pub fn new(roots: &[PathBuf], parent: ParentContext) -> Result<Self, WatchError> {
        Self::with_loader_factory(roots, parent, |root, parent| {
            Arc::new(DirectoryLoader::new(root, parent))
        })
    }

    /// Like [`RootRegistry::new`] with a custom per-root loader.
    pub fn with_loader_factory<F>(
        roots: &[PathBuf],
        parent: ParentContext,
        factory: F,
    ) -> Result<Self, WatchError>
    where
        F: Fn(&Path, &ParentContext) -> Arc<dyn ArtifactLoader>,
    {
        let mut watch_roots: Vec<WatchRoot> = Vec::new();

        for root in effective_roots(roots) {
            let path = root
                .canonicalize()
                .map_err(|e| WatchError::RootUnavailable {
                    path: root.clone(),
                    reason: e.to_string(),
                })?;

            if !path.is_dir() {
                return Err(WatchError::RootUnavailable {
                    path: root,
                    reason: "not a directory".to_string(),
                });
            }

            if watch_roots.iter().any(|r| r.path == path) {
                crate::debug_event!("watcher", "duplicate root", "{}", path.display());
                continue;
            }

            let loader = factory(&path, &parent);
            watch_roots.push(WatchRoot { path, loader });
        }

        Ok(Self {
            roots: watch_roots,
            parent,
        })
    }

    pub fn roots(&self) -> &[WatchRoot] {
        &self.roots
    }

    pub fn parent(&self) -> &ParentContext {
        &self.parent
    }

    /// The root that `dir` lies under, if any.
    ///
    /// Matching is on whole path components, so `/out` never claims
    /// `/out2/...`. When roots nest, the deepest one wins.
    pub fn resolve_root_for(&self, dir: &Path) -> Option<&WatchRoot> {
        self.locate(dir).map(|(root, _)| root)
    }

    /// The owning root together with `dir` relative to it.
    pub fn locate(&self, dir: &Path) -> Option<(&WatchRoot, PathBuf)> {
        let dir = normalize(dir);
        self.roots
            .iter()
            .filter(|root| dir.starts_with(&root.path))
            .max_by_key(|root| root.path.components().count())
            .and_then(|root| {
                dir.strip_prefix(&root.path)
                    .ok()
                    .map(|relative| (root, relative.to_path_buf()))
            })
    }
}

/// Absolute, symlink-resolved form of `dir` when it still exists.
fn normalize(dir: &Path) -> PathBuf {
    if let Ok(canonical) = dir.canonicalize() {
        return canonical;
    }
    if dir.is_relative()
        && let Ok(cwd) = std::env::current_dir()
    {
        return lexical_join(&cwd, dir);
    }
    dir.to_path_buf()
}

/// Join without touching the filesystem, folding `.` and `..`.
fn lexical_join(base: &Path, relative: &Path) -> PathBuf {
    let mut joined = base.to_path_buf();
    for component in relative.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                joined.pop();
            }
            other => joined.push(other),
        }
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn registry(roots: &[PathBuf]) -> RootRegistry {
        RootRegistry::new(roots, ParentContext::new("app")).unwrap()
    }

    #[test]
    fn test_resolves_owning_root() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        fs::create_dir_all(out.join("com/acme")).unwrap();
        let roots = registry(&[out.clone()]);

        let root = roots.resolve_root_for(&out.join("com/acme")).unwrap();
        assert_eq!(root.path(), out.canonicalize().unwrap());
    }

    #[test]
    fn test_sibling_with_shared_prefix_is_not_matched() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        let out2 = temp.path().join("out2");
        fs::create_dir_all(&out).unwrap();
        fs::create_dir_all(out2.join("com")).unwrap();
        let roots = registry(&[out]);

        assert!(roots.resolve_root_for(&out2.join("com")).is_none());
    }

    #[test]
    fn test_nested_roots_prefer_deepest() {
        let temp = TempDir::new().unwrap();
        let outer = temp.path().join("build");
        let inner = outer.join("classes");
        fs::create_dir_all(inner.join("pkg")).unwrap();
        let roots = registry(&[outer, inner.clone()]);

        let (root, relative) = roots.locate(&inner.join("pkg")).unwrap();
        assert_eq!(root.path(), inner.canonicalize().unwrap());
        assert_eq!(relative, PathBuf::from("pkg"));
    }

    #[test]
    fn test_root_itself_has_empty_relative_path() {
        let temp = TempDir::new().unwrap();
        let roots = registry(&[temp.path().to_path_buf()]);

        let (_, relative) = roots.locate(temp.path()).unwrap();
        assert_eq!(relative, PathBuf::new());
    }

    #[test]
    fn test_duplicate_roots_are_collapsed() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        let roots = registry(&[root.clone(), root.join(".")]);

        assert_eq!(roots.roots().len(), 1);
    }

    #[test]
    fn test_missing_root_is_setup_failure() {
        let temp = TempDir::new().unwrap();
        let err = RootRegistry::new(&[temp.path().join("nope")], ParentContext::new("app"))
            .unwrap_err();
        assert!(matches!(err, WatchError::RootUnavailable { .. }));
    }

    #[test]
    fn test_deleted_directory_still_resolves() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        let roots = registry(&[root.clone()]);

        let (_, relative) = roots.locate(&root.join("gone/away")).unwrap();
        assert_eq!(relative, PathBuf::from("gone/away"));
    }

    #[test]
    fn test_lexical_join_folds_dots() {
        assert_eq!(
            lexical_join(Path::new("/work"), Path::new("./target/../out/classes")),
            PathBuf::from("/work/out/classes")
        );
    }
}
