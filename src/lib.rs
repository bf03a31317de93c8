#![forbid(unsafe_code)]

pub mod builder;
pub mod change_gate;
pub mod composite;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod grid;
pub mod model;
pub mod pool;
pub mod scale;
pub mod texture;
pub mod texture_index;
pub mod tools;

pub use builder::{
    AtlasBuilder, BuildOutcome, BuildReport, BuildStats, Published, publish_artifacts,
};
pub use change_gate::{ChangeGate, SnapshotGate};
pub use config::{AtlasConfig, ToolConfig};
pub use error::{AtlasError, AtlasResult, BuildWarning};
pub use grid::{CELL_SIZE, GridLayout, fit_pow2};
pub use model::{NodeAtlasSpec, NodeData, NodeId, NodeTable, RenderMode, TileSlot};
pub use pool::{JobSlot, WorkerPool};
pub use scale::{AtlasArtifact, SCALE_SIZE_LIMIT, SCALES};
pub use texture::{DecodedTexture, TextureCache};
pub use texture_index::TextureIndex;
pub use tools::{SystemTools, ToolRunner, tool_available};
