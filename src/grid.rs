/// Width and height of one atlas cell in pixels.
pub const CELL_SIZE: u32 = 16;

/// Smallest power of two `>= value`, searching from `2^1`.
///
/// The search never considers `2^0`, so `fit_pow2(0)` and `fit_pow2(1)` are both `2`.
/// Downstream consumers rely on this exact sizing.
pub fn fit_pow2(value: u32) -> u32 {
    let mut current = 2u32;
    while current < value {
        match current.checked_mul(2) {
            Some(next) => current = next,
            None => break,
        }
    }
    current
}

/// Square power-of-two cell grid for one node's atlas.
///
/// Derived solely from the base tile count and fixed for the duration of a build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridLayout {
    pub grid_dim: u32,
    pub cell_size: u32,
}

impl GridLayout {
    pub fn for_tile_count(tile_count: usize) -> Self {
        let half = (tile_count.saturating_add(1) / 2).min(u32::MAX as usize) as u32;
        Self {
            grid_dim: fit_pow2(half),
            cell_size: CELL_SIZE,
        }
    }

    pub fn canvas_width(&self) -> u32 {
        self.grid_dim * self.cell_size
    }

    pub fn canvas_height(&self) -> u32 {
        self.grid_dim * self.cell_size
    }

    /// Top-left pixel of the cell addressed by a tile slot index.
    ///
    /// Indices past `grid_dim * grid_dim` map below the canvas; callers clip.
    pub fn cell_origin(&self, slot_index: u32) -> (u32, u32) {
        (
            (slot_index % self.grid_dim) * self.cell_size,
            (slot_index / self.grid_dim) * self.cell_size,
        )
    }

    pub fn contains_cell(&self, slot_index: u32) -> bool {
        slot_index / self.grid_dim < self.grid_dim
    }
}
