use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::{BufReader, BufWriter, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context as _;

use crate::{
    error::{AtlasError, AtlasResult},
    fingerprint::ContentFingerprint,
    model::NodeId,
};

const SNAPSHOT_VERSION: u32 = 1;

/// Incremental-build gate for one node.
///
/// Inputs are registered before any work happens; the gate then decides whether the
/// node must be rebuilt. The snapshot is replaced only by [`commit`](Self::commit), which
/// callers invoke after a fully successful build.
pub trait ChangeGate {
    /// Associate `tag` (e.g. `tile.3`) with texture `name` and its resolved file, if any.
    fn register_reference(&mut self, tag: &str, name: &str, path: Option<&Path>);

    /// Record a build setting (e.g. the render mode) whose change forces a rebuild.
    fn register_setting(&mut self, key: &str, value: &str);

    /// Record a produced file that must still exist for the node to count as up to date.
    fn register_output(&mut self, path: &Path);

    fn is_modified(&self) -> bool;

    /// Every registered tag resolved to an input file.
    fn all_tags_referenced(&self) -> bool;

    /// Every input in the previous snapshot is still referenced.
    fn all_loaded_references_used(&self) -> bool;

    fn commit(&mut self) -> AtlasResult<()>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
struct Snapshot {
    version: u32,
    tags: BTreeMap<String, String>,
    references: BTreeMap<String, ContentFingerprint>,
    outputs: Vec<PathBuf>,
}

/// [`ChangeGate`] persisted as one JSON snapshot per node.
#[derive(Debug)]
pub struct SnapshotGate {
    path: PathBuf,
    loaded: Option<Snapshot>,
    tags: BTreeMap<String, String>,
    references: BTreeMap<String, PathBuf>,
    unresolved_tags: BTreeSet<String>,
    outputs: BTreeSet<PathBuf>,
}

impl SnapshotGate {
    pub fn snapshot_path(state_dir: &Path, node: &NodeId) -> PathBuf {
        state_dir
            .join(&node.mod_name)
            .join(format!("{}.json", node.node_name))
    }

    /// Open the gate for `node`, loading its previous snapshot if present.
    ///
    /// An unreadable or outdated snapshot is treated as absent.
    pub fn open(state_dir: &Path, node: &NodeId) -> AtlasResult<Self> {
        let path = Self::snapshot_path(state_dir, node);
        let loaded = if path.exists() {
            match load_snapshot(&path) {
                Ok(s) if s.version == SNAPSHOT_VERSION => Some(s),
                Ok(s) => {
                    tracing::warn!(
                        node = %node,
                        version = s.version,
                        "ignoring snapshot with unknown version"
                    );
                    None
                }
                Err(e) => {
                    tracing::warn!(node = %node, error = %e, "ignoring unreadable snapshot");
                    None
                }
            }
        } else {
            None
        };
        Ok(Self {
            path,
            loaded,
            tags: BTreeMap::new(),
            references: BTreeMap::new(),
            unresolved_tags: BTreeSet::new(),
            outputs: BTreeSet::new(),
        })
    }

    /// Delete the snapshot for `node`, forcing its next build. Returns whether one existed.
    pub fn invalidate(state_dir: &Path, node: &NodeId) -> AtlasResult<bool> {
        let path = Self::snapshot_path(state_dir, node);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("remove snapshot '{}'", path.display()))
                .into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_snapshot(&self) -> bool {
        self.loaded.is_some()
    }
}

fn reference_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn load_snapshot(path: &Path) -> AtlasResult<Snapshot> {
    let f = File::open(path).with_context(|| format!("open snapshot '{}'", path.display()))?;
    serde_json::from_reader(BufReader::new(f))
        .map_err(|e| AtlasError::serde(format!("parse snapshot '{}': {e}", path.display())))
}

impl ChangeGate for SnapshotGate {
    fn register_reference(&mut self, tag: &str, name: &str, path: Option<&Path>) {
        self.tags.insert(tag.to_string(), name.to_string());
        match path {
            Some(path) => {
                self.unresolved_tags.remove(tag);
                self.references.insert(reference_key(path), path.to_path_buf());
            }
            None => {
                self.unresolved_tags.insert(tag.to_string());
            }
        }
    }

    fn register_setting(&mut self, key: &str, value: &str) {
        self.tags.insert(key.to_string(), value.to_string());
    }

    fn register_output(&mut self, path: &Path) {
        self.outputs.insert(path.to_path_buf());
    }

    fn is_modified(&self) -> bool {
        let Some(loaded) = &self.loaded else {
            return true;
        };
        if loaded.tags != self.tags {
            return true;
        }
        if !loaded.references.keys().eq(self.references.keys()) {
            return true;
        }
        for (key, path) in &self.references {
            match ContentFingerprint::of_file(path) {
                Ok(fp) if loaded.references.get(key) == Some(&fp) => {}
                _ => return true,
            }
        }
        loaded.outputs.iter().any(|output| !output.exists())
    }

    fn all_tags_referenced(&self) -> bool {
        self.unresolved_tags.is_empty()
    }

    fn all_loaded_references_used(&self) -> bool {
        self.loaded.as_ref().is_none_or(|loaded| {
            loaded
                .references
                .keys()
                .all(|key| self.references.contains_key(key))
        })
    }

    fn commit(&mut self) -> AtlasResult<()> {
        let mut references = BTreeMap::new();
        for (key, path) in &self.references {
            references.insert(key.clone(), ContentFingerprint::of_file(path)?);
        }
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            tags: self.tags.clone(),
            references,
            outputs: self.outputs.iter().cloned().collect(),
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create snapshot directory '{}'", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        {
            let f = File::create(&tmp)
                .with_context(|| format!("create snapshot '{}'", tmp.display()))?;
            let mut w = BufWriter::new(f);
            serde_json::to_writer_pretty(&mut w, &snapshot)
                .map_err(|e| AtlasError::serde(format!("encode snapshot: {e}")))?;
            w.flush()
                .with_context(|| format!("flush snapshot '{}'", tmp.display()))?;
        }
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace snapshot '{}'", self.path.display()))?;

        tracing::debug!(path = %self.path.display(), "committed snapshot");
        self.loaded = Some(snapshot);
        Ok(())
    }
}
