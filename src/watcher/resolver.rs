//! Path to type name resolution.

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use super::error::WatchError;
use super::roots::{RootRegistry, WatchRoot};

/// A type name derived from an artifact path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedType {
    /// `com.acme.Foo`, used for loader lookups.
    pub dotted_name: String,
    /// `com/acme/Foo`, the engine-facing identifier.
    pub slashed_name: String,
    pub source_file: PathBuf,
    pub last_modified: SystemTime,
}

/// Resolve the artifact `file_name` inside `dir` against the configured roots.
pub fn resolve<'r>(
    roots: &'r RootRegistry,
    dir: &Path,
    file_name: &str,
    file: &Path,
) -> Result<(&'r WatchRoot, ResolvedType), WatchError> {
    let (root, relative) = roots
        .locate(dir)
        .ok_or_else(|| WatchError::NoMatchingRoot {
            dir: dir.to_path_buf(),
        })?;

    let (dotted_name, slashed_name) = type_names(&relative, file_name)?;

    let last_modified = std::fs::metadata(file)
        .and_then(|meta| meta.modified())
        .map_err(|e| WatchError::io(file, e))?;

    Ok((
        root,
        ResolvedType {
            dotted_name,
            slashed_name,
            source_file: file.to_path_buf(),
            last_modified,
        },
    ))
}

/// Dotted and slashed names for `file_name` in the package directory `relative`.
pub fn type_names(relative: &Path, file_name: &str) -> Result<(String, String), WatchError> {
    let base = base_name(file_name);
    if base.is_empty() {
        return Err(WatchError::InvalidTypeName {
            path: relative.join(file_name),
            reason: "empty base name".to_string(),
        });
    }

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => {
                let segment = segment.to_str().ok_or_else(|| WatchError::InvalidTypeName {
                    path: relative.join(file_name),
                    reason: "package directory is not valid UTF-8".to_string(),
                })?;
                segments.push(segment);
            }
            // Leading separators left over from prefix removal
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(WatchError::InvalidTypeName {
                    path: relative.join(file_name),
                    reason: "directory is outside its root".to_string(),
                });
            }
        }
    }

    segments.push(base);
    Ok((segments.join("."), segments.join("/")))
}

/// Everything before the first '.'; nested-type markers like `$` are kept.
fn base_name(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or_default()
}
