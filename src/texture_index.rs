use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::error::{AtlasError, AtlasResult};

/// Texture basename -> file path, built by scanning the configured content roots.
///
/// Read-only once built; share it across node builds behind a reference or `Arc`.
#[derive(Clone, Debug, Default)]
pub struct TextureIndex {
    by_name: HashMap<String, PathBuf>,
}

impl TextureIndex {
    /// Scan `roots` in order with `pattern` (relative to each root).
    ///
    /// Files are keyed by basename; a later root replaces an earlier root's entry.
    /// Missing roots contribute nothing; unreadable entries are skipped with a warning.
    pub fn scan(roots: &[PathBuf], pattern: &str) -> AtlasResult<Self> {
        let mut index = Self::default();
        for root in roots {
            if !root.is_dir() {
                tracing::warn!(root = %root.display(), "texture root is not a directory");
                continue;
            }
            let full = format!(
                "{}/{}",
                glob::Pattern::escape(&root.to_string_lossy()),
                pattern
            );
            let paths = glob::glob(&full).map_err(|e| {
                AtlasError::validation(format!("texture glob '{full}': {e}"))
            })?;
            let before = index.len();
            for entry in paths {
                match entry {
                    Ok(path) if path.is_file() => index.insert(path),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "skipping unreadable texture entry"),
                }
            }
            tracing::debug!(
                root = %root.display(),
                total = index.len(),
                added = index.len().saturating_sub(before),
                "scanned texture root"
            );
        }
        tracing::info!(textures = index.len(), "texture index built");
        Ok(index)
    }

    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut index = Self::default();
        for path in paths {
            index.insert(path);
        }
        index
    }

    fn insert(&mut self, path: PathBuf) {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            self.by_name.insert(name.to_string(), path);
        }
    }

    pub fn resolve(&self, name: &str) -> Option<&Path> {
        self.by_name.get(name).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
