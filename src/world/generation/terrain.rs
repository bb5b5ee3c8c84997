use crate::constants::{CHUNK_SIZE_X, CHUNK_SIZE_Z};
use crate::world::core::BlockId;
use crate::world::generation::biome::BiomeBlendData;
use crate::world::generation::noise::TerrainNoise;
use crate::world::generation::worker::SubChunkView;

/// Octaves, persistence, and base frequency of the height field.
const HEIGHT_OCTAVES: u32 = 4;
const HEIGHT_PERSISTENCE: f64 = 0.5;
const HEIGHT_BASE_FREQUENCY: f64 = 0.01;

/// Height-field side length including a one-column margin on every side,
/// so the cliff pass can compare each column against its four neighbors.
pub const HEIGHT_GRID: usize = CHUNK_SIZE_X + 2;

/// Per-chunk height field with margin. `get(x, z)` accepts -1..=32.
#[derive(Debug)]
pub struct HeightField {
    values: Vec<i64>,
}

impl HeightField {
    fn index(x: i64, z: i64) -> usize {
        debug_assert!((-1..=CHUNK_SIZE_X as i64).contains(&x));
        debug_assert!((-1..=CHUNK_SIZE_Z as i64).contains(&z));
        ((z + 1) as usize) * HEIGHT_GRID + (x + 1) as usize
    }

    pub fn get(&self, x: i64, z: i64) -> i64 {
        self.values[Self::index(x, z)]
    }

    pub fn set(&mut self, x: i64, z: i64, height: i64) {
        self.values[Self::index(x, z)] = height;
    }
}

/// Blended terrain height for one world column.
pub fn terrain_height(
    noise: &TerrainNoise,
    sea_level: i64,
    offset: f64,
    amplitude: f64,
    world_x: i64,
    world_z: i64,
) -> i64 {
    let n = noise.fractal_2d(
        world_x as f64,
        world_z as f64,
        HEIGHT_OCTAVES,
        HEIGHT_PERSISTENCE,
        HEIGHT_BASE_FREQUENCY,
    );
    (sea_level as f64 + offset + n * amplitude).floor() as i64
}

/// Compute the chunk's height field (with margin) from the blended biome
/// parameters. The margin columns reuse this chunk's blend; they only feed
/// the cliff neighbor comparison.
pub fn compute_heights(
    noise: &TerrainNoise,
    blend: &BiomeBlendData,
    sea_level: i64,
    chunk_min_x: i64,
    chunk_min_z: i64,
) -> HeightField {
    let (offset, amplitude) = blend.blended_height_params();
    let mut field = HeightField {
        values: vec![0; HEIGHT_GRID * HEIGHT_GRID],
    };
    for z in -1..=CHUNK_SIZE_Z as i64 {
        for x in -1..=CHUNK_SIZE_X as i64 {
            let h = terrain_height(
                noise,
                sea_level,
                offset,
                amplitude,
                chunk_min_x + x,
                chunk_min_z + z,
            );
            field.set(x, z, h);
        }
    }
    field
}

/// Fill the sub-chunk's slice of every terrain column: surface block at the
/// height, subsurface just beneath, base rock below that.
pub fn fill_terrain(view: &mut SubChunkView<'_>, heights: &HeightField, blend: &BiomeBlendData) {
    let biome = &blend.primary;
    for z in 0..CHUNK_SIZE_Z {
        for x in 0..CHUNK_SIZE_X {
            let h = heights.get(x as i64, z as i64);
            let lowest = view.min_y();
            let highest = view.max_y().min(h);
            for y in lowest..=highest {
                let block = if y == h {
                    biome.surface_block
                } else if y > h - biome.subsurface_depth {
                    biome.subsurface_block
                } else {
                    biome.base_block
                };
                view.set(x, y, z, block);
            }
        }
    }
}

/// Cliff pass: where the cliff noise exceeds its threshold, terrain is
/// lifted by `intensity · max_height` blocks of the cliff block, and
/// columns standing at least two blocks proud of all four neighbors get
/// the cliff block exposed down the face.
///
/// Uplift is written into the height field so water and skylight see the
/// raised surface.
pub fn apply_cliffs(
    view: &mut SubChunkView<'_>,
    heights: &mut HeightField,
    noise: &TerrainNoise,
    blend: &BiomeBlendData,
    chunk_min_x: i64,
    chunk_min_z: i64,
) {
    let Some(cliff) = blend.primary.cliff.clone() else {
        return;
    };

    // Uplift the whole grid first, margin included, so the exposure rule
    // compares post-uplift heights.
    for z in -1..=CHUNK_SIZE_Z as i64 {
        for x in -1..=CHUNK_SIZE_X as i64 {
            let n = noise.noise_2d(
                (chunk_min_x + x) as f64 * cliff.frequency,
                (chunk_min_z + z) as f64 * cliff.frequency,
            );
            if n > cliff.threshold {
                let intensity = (n - cliff.threshold) / (1.0 - cliff.threshold);
                let lift = (intensity * cliff.max_height as f64).floor() as i64;
                if lift > 0 {
                    let base = heights.get(x, z);
                    heights.set(x, z, base + lift);
                    if (0..CHUNK_SIZE_X as i64).contains(&x) && (0..CHUNK_SIZE_Z as i64).contains(&z)
                    {
                        for y in (base + 1)..=(base + lift) {
                            view.set(x as usize, y, z as usize, cliff.block);
                        }
                    }
                }
            }
        }
    }

    let depth = blend.primary.subsurface_depth;
    for z in 0..CHUNK_SIZE_Z as i64 {
        for x in 0..CHUNK_SIZE_X as i64 {
            let h = heights.get(x, z);
            let proud = [(1, 0), (-1, 0), (0, 1), (0, -1)]
                .iter()
                .all(|&(dx, dz)| h - heights.get(x + dx, z + dz) >= 2);
            if proud {
                for y in (h - depth).max(view.min_y())..=h.min(view.max_y()) {
                    if !view.get(x as usize, y, z as usize).is_air() {
                        view.set(x as usize, y, z as usize, cliff.block);
                    }
                }
            }
        }
    }
}
