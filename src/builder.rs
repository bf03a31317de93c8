use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use anyhow::Context as _;

use crate::{
    change_gate::{ChangeGate, SnapshotGate},
    composite::render_frames,
    config::AtlasConfig,
    error::{AtlasResult, BuildWarning},
    grid::GridLayout,
    model::{NodeAtlasSpec, NodeData, NodeId},
    pool::WorkerPool,
    scale::{AtlasArtifact, ScalePipeline, kept_scales},
    texture::preload_textures,
    texture_index::TextureIndex,
    tools::{SystemTools, ToolRunner},
};

/// Work counters for one node build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub decodes: u64,
    pub frames_rendered: u64,
    pub tool_invocations: u64,
}

#[derive(Debug)]
pub struct BuildReport {
    pub node: NodeId,
    pub layout: GridLayout,
    pub frame_count: u32,
    /// Frame files in frame order.
    pub frames: Vec<PathBuf>,
    pub artifacts: Vec<AtlasArtifact>,
    pub skipped_scales: Vec<u32>,
    pub warnings: BTreeSet<BuildWarning>,
    pub stats: BuildStats,
}

#[derive(Debug)]
pub enum BuildOutcome {
    /// The node declares no tiles.
    NoTiles,
    /// The change gate found nothing to do.
    UpToDate,
    Built(BuildReport),
}

impl BuildOutcome {
    pub fn report(&self) -> Option<&BuildReport> {
        match self {
            BuildOutcome::Built(report) => Some(report),
            BuildOutcome::NoTiles | BuildOutcome::UpToDate => None,
        }
    }
}

/// Builds node atlases. Holds the texture index, worker pool and tool runner shared by
/// every node build.
pub struct AtlasBuilder {
    config: AtlasConfig,
    textures: OnceLock<TextureIndex>,
    tools: Arc<dyn ToolRunner>,
    pool: WorkerPool,
}

impl AtlasBuilder {
    pub fn new(config: AtlasConfig) -> AtlasResult<Self> {
        Self::with_tools(config, Arc::new(SystemTools))
    }

    pub fn with_tools(config: AtlasConfig, tools: Arc<dyn ToolRunner>) -> AtlasResult<Self> {
        config.validate()?;
        let pool = WorkerPool::new(config.workers, config.phase_timeout())?;
        Ok(Self {
            config,
            textures: OnceLock::new(),
            tools,
            pool,
        })
    }

    /// Use `index` instead of scanning the configured content roots.
    pub fn with_texture_index(mut self, index: TextureIndex) -> Self {
        self.textures = OnceLock::from(index);
        self
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    /// The texture index, scanned from the content roots on first use.
    pub fn texture_index(&self) -> AtlasResult<&TextureIndex> {
        if let Some(index) = self.textures.get() {
            return Ok(index);
        }
        let index = TextureIndex::scan(&self.config.content_roots, &self.config.texture_glob)?;
        Ok(self.textures.get_or_init(|| index))
    }

    pub fn frames_dir(&self, node: &NodeId) -> PathBuf {
        self.config
            .frames_dir
            .join(&node.mod_name)
            .join(&node.node_name)
    }

    pub fn work_dir(&self, node: &NodeId) -> PathBuf {
        self.config.work_dir.join(&node.mod_name).join(&node.node_name)
    }

    /// Parse exported node metadata and build it.
    pub fn build_node_data(&self, node: &NodeId, data: &NodeData) -> AtlasResult<BuildOutcome> {
        match NodeAtlasSpec::from_node_data(data)? {
            Some(spec) => self.build_node(node, &spec),
            None => Ok(BuildOutcome::NoTiles),
        }
    }

    pub fn build_node(&self, node: &NodeId, spec: &NodeAtlasSpec) -> AtlasResult<BuildOutcome> {
        let mut gate = SnapshotGate::open(&self.config.state_dir, node)?;
        self.build_node_with_gate(node, spec, &mut gate)
    }

    /// Build one node's atlas: preload, render, then scale. Each phase completes before the
    /// next starts; the first fatal error aborts the build and leaves the gate uncommitted.
    #[tracing::instrument(skip_all, fields(node = %node))]
    pub fn build_node_with_gate(
        &self,
        node: &NodeId,
        spec: &NodeAtlasSpec,
        gate: &mut dyn ChangeGate,
    ) -> AtlasResult<BuildOutcome> {
        let index = self.texture_index()?;
        gate.register_setting("render_mode", spec.render_mode.as_str());
        for tile in &spec.tiles {
            let name = tile.texture_name();
            gate.register_reference(&format!("tile.{}", tile.index), name, index.resolve(name));
        }
        for tile in &spec.special_tiles {
            let name = tile.texture_name();
            gate.register_reference(
                &format!("special_tile.{}", tile.index),
                name,
                index.resolve(name),
            );
        }

        if !gate.is_modified() {
            tracing::info!("atlas up to date");
            return Ok(BuildOutcome::UpToDate);
        }

        let mut warnings = BTreeSet::new();
        if !gate.all_tags_referenced() {
            tracing::warn!("{}", BuildWarning::TagsMismatch);
            warnings.insert(BuildWarning::TagsMismatch);
        }
        if !gate.all_loaded_references_used() {
            tracing::warn!("{}", BuildWarning::UnusedLoadedReferences);
            warnings.insert(BuildWarning::UnusedLoadedReferences);
        }

        let layout = GridLayout::for_tile_count(spec.tiles.len());
        let mut stats = BuildStats::default();

        let preloaded = preload_textures(&self.pool, index, &spec.distinct_texture_names())?;
        stats.decodes = preloaded.decodes;
        warnings.extend(
            preloaded
                .unresolved
                .iter()
                .map(|name| BuildWarning::UnresolvedTexture { name: name.clone() }),
        );
        let frame_count = preloaded.cache.frame_count();
        tracing::info!(
            mode = %spec.render_mode,
            tiles = spec.tiles.len(),
            grid_dim = layout.grid_dim,
            canvas = layout.canvas_height(),
            frame_count,
            textures = preloaded.cache.len(),
            "textures preloaded"
        );

        let rendered = render_frames(
            &self.pool,
            layout,
            Arc::new(spec.clone()),
            preloaded.cache,
            frame_count,
            &self.frames_dir(node),
        )?;
        stats.frames_rendered = rendered.paths.len() as u64;
        for warning in &rendered.warnings {
            tracing::warn!("{warning}");
        }
        warnings.extend(rendered.warnings);

        let scaled = ScalePipeline {
            pool: &self.pool,
            tools: Arc::clone(&self.tools),
            programs: &self.config.tools,
            frame_delay: self.config.frame_delay,
        }
        .run(&rendered.paths, &self.work_dir(node), layout.canvas_height())?;
        stats.tool_invocations = scaled.tool_invocations;

        for frame in &rendered.paths {
            gate.register_output(frame);
        }
        for artifact in &scaled.artifacts {
            for output in artifact.outputs() {
                gate.register_output(output);
            }
        }
        gate.commit()?;

        tracing::info!(
            frames = rendered.paths.len(),
            scales = scaled.artifacts.len(),
            "atlas built"
        );
        Ok(BuildOutcome::Built(BuildReport {
            node: node.clone(),
            layout,
            frame_count,
            frames: rendered.paths,
            artifacts: scaled.artifacts,
            skipped_scales: scaled.skipped,
            warnings,
            stats,
        }))
    }

    /// Copy a node's combined animations into `<dist_dir>/<mod>/<node>/`.
    pub fn publish_node(
        &self,
        node: &NodeId,
        spec: &NodeAtlasSpec,
        dist_dir: &Path,
    ) -> AtlasResult<Published> {
        let layout = GridLayout::for_tile_count(spec.tiles.len());
        publish_artifacts(
            &self.work_dir(node),
            &dist_dir.join(&node.mod_name).join(&node.node_name),
            &kept_scales(layout.canvas_height()),
        )
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Published {
    pub copied: Vec<PathBuf>,
    pub warnings: Vec<BuildWarning>,
}

/// Copy each scale's `x<scale>.apng` and `x<scale>.gif` from `work_dir` into `target_dir`.
///
/// Existing targets are left alone. Missing sources are reported, not fatal.
pub fn publish_artifacts(
    work_dir: &Path,
    target_dir: &Path,
    scales: &[u32],
) -> AtlasResult<Published> {
    let mut out = Published::default();
    for scale in scales {
        for ext in ["apng", "gif"] {
            let file_name = format!("x{scale}.{ext}");
            let src = work_dir.join(&file_name);
            let dst = target_dir.join(&file_name);
            if !src.exists() {
                tracing::warn!(path = %src.display(), "missing asset");
                out.warnings.push(BuildWarning::MissingArtifact { path: src });
                continue;
            }
            if dst.exists() {
                continue;
            }
            std::fs::create_dir_all(target_dir)
                .with_context(|| format!("create publish directory '{}'", target_dir.display()))?;
            std::fs::copy(&src, &dst).with_context(|| {
                format!("copy '{}' to '{}'", src.display(), dst.display())
            })?;
            tracing::info!(from = %src.display(), to = %dst.display(), "published");
            out.copied.push(dst);
        }
    }
    Ok(out)
}
