use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::Context as _;
use image::{Rgba, RgbaImage};

use crate::{
    error::{AtlasError, AtlasResult, BuildWarning},
    grid::GridLayout,
    model::NodeAtlasSpec,
    pool::{JobSlot, WorkerPool},
    texture::TextureCache,
};

const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Alpha-blend a `w`x`h` region of `src` at (`sx`,`sy`) onto `dst` at (`dx`,`dy`).
///
/// The region is clipped to both images. Returns the number of pixels touched.
#[allow(clippy::too_many_arguments)]
pub fn blit(
    dst: &mut RgbaImage,
    src: &RgbaImage,
    dx: u32,
    dy: u32,
    sx: u32,
    sy: u32,
    w: u32,
    h: u32,
) -> u64 {
    let w = w
        .min(src.width().saturating_sub(sx))
        .min(dst.width().saturating_sub(dx));
    let h = h
        .min(src.height().saturating_sub(sy))
        .min(dst.height().saturating_sub(dy));
    for row in 0..h {
        for col in 0..w {
            let s = src.get_pixel(sx + col, sy + row).0;
            let d = dst.get_pixel_mut(dx + col, dy + row);
            d.0 = over(d.0, s);
        }
    }
    u64::from(w) * u64::from(h)
}

/// Straight-alpha source-over.
pub fn over(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    let sa = u32::from(src[3]);
    if sa == 0 {
        return dst;
    }
    if sa == 255 {
        return src;
    }
    let da = mul_div255(u32::from(dst[3]), 255 - sa);
    let out_a = sa + da;
    let mut out = [0u8; 4];
    for i in 0..3 {
        let num = u32::from(src[i]) * sa + u32::from(dst[i]) * da;
        out[i] = ((num + out_a / 2) / out_a).min(255) as u8;
    }
    out[3] = out_a.min(255) as u8;
    out
}

fn mul_div255(x: u32, y: u32) -> u32 {
    (x * y + 127) / 255
}

pub fn clear(canvas: &mut RgbaImage) {
    for px in canvas.pixels_mut() {
        *px = CLEAR;
    }
}

/// Composite frame `frame_index` of a node atlas into `canvas`.
///
/// The canvas is cleared first. Missing textures leave their cell (or overlay) blank and are
/// reported as warnings.
pub fn compose_frame(
    canvas: &mut RgbaImage,
    layout: &GridLayout,
    spec: &NodeAtlasSpec,
    textures: &TextureCache,
    frame_index: u32,
) -> Vec<BuildWarning> {
    clear(canvas);
    let cs = layout.cell_size;
    let mut warnings = Vec::new();

    for tile in &spec.tiles {
        if !layout.contains_cell(tile.index) {
            warnings.push(BuildWarning::CellOutsideCanvas { slot: tile.index });
            continue;
        }
        let (x, y) = layout.cell_origin(tile.index);

        if spec.render_mode.overlays_special_tiles() {
            for special in &spec.special_tiles {
                match textures.get(special.texture_name()) {
                    Some(tex) => {
                        let row = tex.row_for_frame(frame_index);
                        blit(
                            canvas,
                            &tex.pixels,
                            x + 1,
                            y + 1,
                            1,
                            1 + row * cs,
                            cs - 2,
                            cs - 2,
                        );
                    }
                    None => warnings.push(BuildWarning::MissingSpecialTile {
                        slot: special.index,
                        name: special.texture_name().to_string(),
                    }),
                }
            }
        }

        match textures.get(tile.texture_name()) {
            Some(tex) => {
                let row = tex.row_for_frame(frame_index);
                blit(canvas, &tex.pixels, x, y, 0, row * cs, cs, cs);
            }
            None => warnings.push(BuildWarning::MissingTile {
                slot: tile.index,
                name: tile.texture_name().to_string(),
            }),
        }
    }

    warnings
}

/// Zero-padded so lexical order is frame order.
pub fn frame_path(dir: &Path, frame_index: u32) -> PathBuf {
    dir.join(format!("frame{frame_index:04}.png"))
}

#[derive(Debug, Default)]
pub struct RenderedFrames {
    /// Frame files in frame order.
    pub paths: Vec<PathBuf>,
    pub warnings: BTreeSet<BuildWarning>,
}

/// Render `frame_count` frames into `out_dir`, one pool job per frame.
///
/// Every worker owns one reusable canvas, selected by its slot index.
pub fn render_frames(
    pool: &WorkerPool,
    layout: GridLayout,
    spec: Arc<NodeAtlasSpec>,
    textures: Arc<TextureCache>,
    frame_count: u32,
    out_dir: &Path,
) -> AtlasResult<RenderedFrames> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("create frame directory '{}'", out_dir.display()))?;

    let canvases: Arc<Vec<Mutex<RgbaImage>>> = Arc::new(
        (0..pool.width())
            .map(|_| Mutex::new(RgbaImage::new(layout.canvas_width(), layout.canvas_height())))
            .collect(),
    );

    let jobs = (0..frame_count)
        .map(|frame_index| {
            let canvases = Arc::clone(&canvases);
            let spec = Arc::clone(&spec);
            let textures = Arc::clone(&textures);
            let path = frame_path(out_dir, frame_index);
            move |slot: JobSlot| -> AtlasResult<(u32, PathBuf, Vec<BuildWarning>)> {
                let buffer = canvases.get(slot.index).ok_or_else(|| {
                    AtlasError::evaluation(format!("no canvas for worker slot {}", slot.index))
                })?;
                let mut canvas = buffer
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                let warnings = compose_frame(&mut canvas, &layout, &spec, &textures, frame_index);
                tracing::debug!(frame = frame_index, path = %path.display(), "save frame");
                canvas
                    .save_with_format(&path, image::ImageFormat::Png)
                    .with_context(|| format!("write frame '{}'", path.display()))?;
                clear(&mut canvas);
                Ok((frame_index, path, warnings))
            }
        })
        .collect::<Vec<_>>();

    let mut done = pool.run_phase("render", jobs)?;
    done.sort_by_key(|(frame_index, _, _)| *frame_index);

    let mut out = RenderedFrames::default();
    for (_, path, warnings) in done {
        out.paths.push(path);
        out.warnings.extend(warnings);
    }
    Ok(out)
}
