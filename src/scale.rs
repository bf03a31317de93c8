use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context as _;

use crate::{
    config::ToolConfig,
    error::{AtlasError, AtlasResult},
    pool::{JobSlot, WorkerPool},
    tools::{ToolRunner, args},
};

/// Scale factors tried, in order.
pub const SCALES: [u32; 4] = [1, 2, 4, 8];

/// Atlases taller than this are only emitted at scale 1.
pub const SCALE_SIZE_LIMIT: u32 = 512;

pub fn scale_is_kept(canvas_height: u32, scale: u32) -> bool {
    scale == 1 || canvas_height <= SCALE_SIZE_LIMIT
}

pub fn kept_scales(canvas_height: u32) -> Vec<u32> {
    SCALES
        .into_iter()
        .filter(|&scale| scale_is_kept(canvas_height, scale))
        .collect()
}

/// Outputs for one kept scale factor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AtlasArtifact {
    pub scale: u32,
    /// Resized frames in frame order.
    pub frames: Vec<PathBuf>,
    /// Combined animated PNG.
    pub animation: PathBuf,
    /// GIF derived from `animation`.
    pub gif: PathBuf,
}

impl AtlasArtifact {
    pub fn outputs(&self) -> impl Iterator<Item = &Path> {
        self.frames
            .iter()
            .map(PathBuf::as_path)
            .chain([self.animation.as_path(), self.gif.as_path()])
    }
}

#[derive(Debug, Default)]
pub struct ScaleOutput {
    pub artifacts: Vec<AtlasArtifact>,
    pub skipped: Vec<u32>,
    pub tool_invocations: u64,
}

/// Re-encodes a node's frame sequence at each kept scale through the external tools.
pub struct ScalePipeline<'a> {
    pub pool: &'a WorkerPool,
    pub tools: Arc<dyn ToolRunner>,
    pub programs: &'a ToolConfig,
    pub frame_delay: u32,
}

impl ScalePipeline<'_> {
    pub fn run(
        &self,
        frames: &[PathBuf],
        work_dir: &Path,
        canvas_height: u32,
    ) -> AtlasResult<ScaleOutput> {
        let mut out = ScaleOutput::default();
        for scale in SCALES {
            if !scale_is_kept(canvas_height, scale) {
                tracing::info!(
                    scale,
                    canvas_height,
                    limit = SCALE_SIZE_LIMIT,
                    "frame exceeds size limit, skipping scale"
                );
                out.skipped.push(scale);
                continue;
            }
            let (artifact, invocations) = self.run_scale(scale, frames, work_dir)?;
            out.tool_invocations += invocations;
            out.artifacts.push(artifact);
        }
        Ok(out)
    }

    fn run_scale(
        &self,
        scale: u32,
        frames: &[PathBuf],
        work_dir: &Path,
    ) -> AtlasResult<(AtlasArtifact, u64)> {
        let scaled_dir = work_dir.join(format!("x{scale}"));
        std::fs::create_dir_all(&scaled_dir)
            .with_context(|| format!("create scaled frame directory '{}'", scaled_dir.display()))?;

        let percent = format!("{}%", scale * 100);
        let mut jobs = Vec::with_capacity(frames.len());
        for frame in frames {
            let basename = frame.file_name().ok_or_else(|| {
                AtlasError::validation(format!("frame path '{}' has no file name", frame.display()))
            })?;
            let src = frame.clone();
            let dst = scaled_dir.join(basename);
            let tools = Arc::clone(&self.tools);
            let scaler = self.programs.scaler.clone();
            let percent = percent.clone();
            jobs.push(move |_slot: JobSlot| -> AtlasResult<PathBuf> {
                tracing::debug!(frame = %src.display(), scale, "scaling frame");
                tools.run(
                    &scaler,
                    &args([
                        src.into_os_string(),
                        OsString::from("-scale"),
                        OsString::from(percent),
                        dst.clone().into_os_string(),
                    ]),
                )?;
                Ok(dst)
            });
        }
        let mut scaled = self.pool.run_phase("scale", jobs)?;
        scaled.sort();

        let animation = work_dir.join(format!("x{scale}.apng"));
        let mut assemble = args([
            "-F".to_string(),
            "-d".to_string(),
            self.frame_delay.to_string(),
            "-o".to_string(),
        ]);
        assemble.push(animation.clone().into_os_string());
        assemble.extend(scaled.iter().map(|p| p.clone().into_os_string()));
        tracing::info!(
            scale,
            frames = scaled.len(),
            out = %animation.display(),
            "assembling animation"
        );
        self.tools.run(&self.programs.apng_assembler, &assemble)?;

        let gif = animation.with_extension("gif");
        tracing::info!(scale, out = %gif.display(), "converting animation to gif");
        self.tools
            .run(&self.programs.gif_converter, &args([animation.clone()]))?;

        let invocations = scaled.len() as u64 + 2;
        Ok((
            AtlasArtifact {
                scale,
                frames: scaled,
                animation,
                gif,
            },
            invocations,
        ))
    }
}
