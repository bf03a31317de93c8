use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use image::RgbaImage;

use crate::{
    error::{AtlasError, AtlasResult},
    grid::CELL_SIZE,
    pool::WorkerPool,
    texture_index::TextureIndex,
};

/// A decoded source texture. Animated textures stack their frames vertically,
/// one cell-height row per frame.
#[derive(Clone, Debug)]
pub struct DecodedTexture {
    pub pixels: RgbaImage,
}

impl DecodedTexture {
    pub fn new(pixels: RgbaImage) -> AtlasResult<Self> {
        if pixels.height() < CELL_SIZE {
            return Err(AtlasError::validation(format!(
                "texture height {} is smaller than one {CELL_SIZE}px cell",
                pixels.height()
            )));
        }
        Ok(Self { pixels })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Number of stacked animation rows (always >= 1).
    pub fn row_count(&self) -> u32 {
        self.pixels.height() / CELL_SIZE
    }

    /// Row shown on `frame_index`; animations shorter than the atlas loop.
    pub fn row_for_frame(&self, frame_index: u32) -> u32 {
        frame_index % self.row_count()
    }
}

pub fn decode_texture(name: &str, path: &Path) -> AtlasResult<DecodedTexture> {
    let pixels = image::open(path)
        .map_err(|source| AtlasError::Decode {
            name: name.to_string(),
            path: path.to_path_buf(),
            source,
        })?
        .to_rgba8();
    if pixels.height() < CELL_SIZE {
        return Err(AtlasError::validation(format!(
            "texture '{name}' ({}) is {}px tall, shorter than one {CELL_SIZE}px cell",
            path.display(),
            pixels.height()
        )));
    }
    Ok(DecodedTexture { pixels })
}

/// Per-build texture name -> decoded texture map, filled concurrently.
///
/// The first stored entry for a name wins; a racing duplicate decode is discarded.
#[derive(Debug, Default)]
pub struct TextureCache {
    entries: Mutex<HashMap<String, Arc<DecodedTexture>>>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `texture` under `name` unless an entry exists; returns the stored entry.
    pub fn insert(&self, name: &str, texture: DecodedTexture) -> Arc<DecodedTexture> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(
            entries
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(texture)),
        )
    }

    pub fn get(&self, name: &str) -> Option<Arc<DecodedTexture>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atlas frame count: the longest texture animation, or 1 when nothing decoded.
    pub fn frame_count(&self) -> u32 {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .map(|t| t.row_count())
            .fold(1, u32::max)
    }
}

/// Result of the preload phase.
#[derive(Debug)]
pub struct Preloaded {
    pub cache: Arc<TextureCache>,
    /// Names with no file in the texture index; their slots render blank.
    pub unresolved: Vec<String>,
    pub decodes: u64,
}

/// Decode every distinct resolvable texture in `names`, one pool job per name.
pub fn preload_textures(
    pool: &WorkerPool,
    index: &TextureIndex,
    names: &[&str],
) -> AtlasResult<Preloaded> {
    let cache = Arc::new(TextureCache::new());
    let mut unresolved = Vec::new();
    let mut scheduled = std::collections::HashSet::new();
    let mut jobs = Vec::new();

    for &name in names {
        if !scheduled.insert(name) {
            continue;
        }
        let Some(path) = index.resolve(name) else {
            tracing::warn!(texture = name, "texture not found in any content root");
            unresolved.push(name.to_string());
            continue;
        };
        let name = name.to_string();
        let path: PathBuf = path.to_path_buf();
        let cache = Arc::clone(&cache);
        jobs.push(move |_slot: crate::pool::JobSlot| -> AtlasResult<()> {
            tracing::debug!(texture = %name, path = %path.display(), "decoding texture");
            let texture = decode_texture(&name, &path)?;
            cache.insert(&name, texture);
            Ok(())
        });
    }

    let decodes = jobs.len() as u64;
    pool.run_phase("preload", jobs)?;
    Ok(Preloaded {
        cache,
        unresolved,
        decodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture(w: u32, h: u32) -> DecodedTexture {
        DecodedTexture::new(RgbaImage::new(w, h)).unwrap()
    }

    #[test]
    fn row_selection_wraps_shorter_animations() {
        let t = texture(16, 48);
        assert_eq!(t.row_count(), 3);
        assert_eq!(t.row_for_frame(5), 2);
        assert_eq!(t.row_for_frame(0), 0);
        assert_eq!(texture(16, 16).row_for_frame(7), 0);
    }

    #[test]
    fn short_texture_is_rejected() {
        assert!(DecodedTexture::new(RgbaImage::new(16, 8)).is_err());
    }

    #[test]
    fn cache_keeps_first_entry() {
        let cache = TextureCache::new();
        let first = cache.insert("water.png", texture(16, 32));
        let second = cache.insert("water.png", texture(16, 64));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("water.png").unwrap().row_count(), 2);
    }

    #[test]
    fn frame_count_is_longest_animation_or_one() {
        let cache = TextureCache::new();
        assert_eq!(cache.frame_count(), 1);
        cache.insert("a.png", texture(16, 16));
        cache.insert("b.png", texture(16, 64));
        cache.insert("c.png", texture(16, 32));
        assert_eq!(cache.frame_count(), 4);
    }
}
