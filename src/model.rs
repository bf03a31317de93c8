use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::error::{AtlasError, AtlasResult};

/// `<mod>:<node>` identity of a node; both parts become output directory components.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    pub mod_name: String,
    pub node_name: String,
}

impl NodeId {
    pub fn new(mod_name: impl Into<String>, node_name: impl Into<String>) -> AtlasResult<Self> {
        let id = Self {
            mod_name: mod_name.into(),
            node_name: node_name.into(),
        };
        id.validate()?;
        Ok(id)
    }

    fn validate(&self) -> AtlasResult<()> {
        for part in [&self.mod_name, &self.node_name] {
            if part.is_empty() {
                return Err(AtlasError::validation(format!(
                    "node id '{self}' has an empty component"
                )));
            }
            if part == "." || part == ".." || part.contains(['/', '\\']) {
                return Err(AtlasError::validation(format!(
                    "node id '{self}' must not contain path separators or traversals"
                )));
            }
        }
        Ok(())
    }
}

impl FromStr for NodeId {
    type Err = AtlasError;

    fn from_str(s: &str) -> AtlasResult<Self> {
        let (mod_name, node_name) = s.split_once(':').ok_or_else(|| {
            AtlasError::validation(format!("node id '{s}' must have the form <mod>:<node>"))
        })?;
        Self::new(mod_name, node_name)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.mod_name, self.node_name)
    }
}

/// How a node's tiles are composited into a frame (`paramtype2`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum RenderMode {
    #[default]
    None,
    FaceDir,
    FlowingLiquid,
    GlassLikeLiquidLevel,
}

impl RenderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderMode::None => "none",
            RenderMode::FaceDir => "facedir",
            RenderMode::FlowingLiquid => "flowingliquid",
            RenderMode::GlassLikeLiquidLevel => "glasslikeliquidlevel",
        }
    }

    /// Whether special tiles are blitted into each cell before the base tile.
    pub fn overlays_special_tiles(self) -> bool {
        match self {
            RenderMode::None | RenderMode::FaceDir | RenderMode::FlowingLiquid => false,
            RenderMode::GlassLikeLiquidLevel => true,
        }
    }
}

impl FromStr for RenderMode {
    type Err = AtlasError;

    fn from_str(s: &str) -> AtlasResult<Self> {
        match s {
            "none" => Ok(RenderMode::None),
            "facedir" => Ok(RenderMode::FaceDir),
            "flowingliquid" => Ok(RenderMode::FlowingLiquid),
            "glasslikeliquidlevel" => Ok(RenderMode::GlassLikeLiquidLevel),
            other => Err(AtlasError::UnsupportedMode(other.to_string())),
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One indexed texture reference. `texture_ref` may carry `^`-joined modifiers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileSlot {
    pub index: u32,
    pub texture_ref: String,
}

impl TileSlot {
    pub fn new(index: u32, texture_ref: impl Into<String>) -> Self {
        Self {
            index,
            texture_ref: texture_ref.into(),
        }
    }

    /// Texture basename used for lookup: everything before the first `^`.
    pub fn texture_name(&self) -> &str {
        self.texture_ref
            .split_once('^')
            .map_or(self.texture_ref.as_str(), |(name, _)| name)
    }
}

/// Everything one atlas build needs to know about a node. Immutable during a build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeAtlasSpec {
    pub tiles: Vec<TileSlot>,
    pub special_tiles: Vec<TileSlot>,
    pub render_mode: RenderMode,
}

impl NodeAtlasSpec {
    /// Distinct texture names across base and special tiles, in first-seen order.
    pub fn distinct_texture_names(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.tiles
            .iter()
            .chain(self.special_tiles.iter())
            .map(TileSlot::texture_name)
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Build from exported node metadata. Returns `Ok(None)` for nodes without tiles.
    pub fn from_node_data(data: &NodeData) -> AtlasResult<Option<Self>> {
        let Some(tiles) = &data.tiles else {
            return Ok(None);
        };
        let render_mode = match data.paramtype2.as_deref() {
            Some(mode) => mode.parse()?,
            None => RenderMode::None,
        };
        let special_tiles = match &data.special_tiles {
            Some(list) => list.to_slots("special_tiles")?,
            None => Vec::new(),
        };
        Ok(Some(Self {
            tiles: tiles.to_slots("tiles")?,
            special_tiles,
            render_mode,
        }))
    }
}

/// Node metadata as exported upstream. Unknown fields are ignored.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct NodeData {
    #[serde(default)]
    pub tiles: Option<TileList>,
    #[serde(default)]
    pub special_tiles: Option<TileList>,
    #[serde(default)]
    pub paramtype2: Option<String>,
}

/// Exported node table keyed by `<mod>:<node>`.
pub type NodeTable = BTreeMap<String, NodeData>;

/// Tile lists arrive either as `{"1": ..., "2": ...}` maps or as plain arrays.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum TileList {
    Indexed(BTreeMap<String, TileRef>),
    Sequence(Vec<TileRef>),
}

impl TileList {
    fn to_slots(&self, field: &str) -> AtlasResult<Vec<TileSlot>> {
        let mut slots = match self {
            TileList::Indexed(map) => map
                .iter()
                .map(|(key, tile)| {
                    let index = key.trim().parse::<u32>().map_err(|_| {
                        AtlasError::validation(format!(
                            "{field} key '{key}' is not a non-negative integer"
                        ))
                    })?;
                    Ok(TileSlot::new(index, tile.name()))
                })
                .collect::<AtlasResult<Vec<_>>>()?,
            TileList::Sequence(list) => list
                .iter()
                .enumerate()
                .map(|(i, tile)| TileSlot::new(i as u32, tile.name()))
                .collect(),
        };
        // String keys sort lexically ("10" < "2"); slot order is by numeric index.
        slots.sort_by(|a, b| (a.index, &a.texture_ref).cmp(&(b.index, &b.texture_ref)));
        Ok(slots)
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum TileRef {
    Name(String),
    Table { name: String },
}

impl TileRef {
    pub fn name(&self) -> &str {
        match self {
            TileRef::Name(name) | TileRef::Table { name } => name,
        }
    }
}
