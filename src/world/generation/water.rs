use crate::constants::{CHUNK_SIZE_X, CHUNK_SIZE_Z};
use crate::world::generation::biome::WaterSettings;
use crate::world::generation::noise::TerrainNoise;
use crate::world::generation::terrain::HeightField;
use crate::world::generation::worker::SubChunkView;

/// Which chunk edges the flood reached; the scheduler queues neighbor
/// re-flood tasks from these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaterEdgeEffects {
    pub pos_x: bool,
    pub neg_x: bool,
    pub pos_z: bool,
    pub neg_z: bool,
}

impl WaterEdgeEffects {
    pub fn any(&self) -> bool {
        self.pos_x || self.neg_x || self.pos_z || self.neg_z
    }
}

/// True iff the chunk lies inside a water region: the low-frequency region
/// noise exceeds its threshold by at least the minimum depth.
pub fn chunk_in_water_region(
    noise: &TerrainNoise,
    settings: &WaterSettings,
    chunk_min_x: i64,
    chunk_min_z: i64,
) -> bool {
    let center_x = (chunk_min_x + CHUNK_SIZE_X as i64 / 2) as f64;
    let center_z = (chunk_min_z + CHUNK_SIZE_Z as i64 / 2) as f64;
    let sample = noise.noise_2d(
        center_x * settings.region_frequency,
        center_z * settings.region_frequency,
    );
    sample > settings.region_threshold && (sample - settings.region_threshold) >= settings.min_depth
}

/// Flood columns whose terrain lies below the water level, clamped to the
/// sub-chunk's Y range, and report which chunk edges carry water.
pub fn flood_water(
    view: &mut SubChunkView<'_>,
    heights: &HeightField,
    noise: &TerrainNoise,
    settings: &WaterSettings,
    chunk_min_x: i64,
    chunk_min_z: i64,
) -> WaterEdgeEffects {
    let mut effects = WaterEdgeEffects::default();
    if !chunk_in_water_region(noise, settings, chunk_min_x, chunk_min_z) {
        return effects;
    }

    for z in 0..CHUNK_SIZE_Z {
        for x in 0..CHUNK_SIZE_X {
            let terrain = heights.get(x as i64, z as i64);
            if terrain >= settings.water_level {
                continue;
            }
            let low = (terrain + 1).max(view.min_y());
            let high = settings.water_level.min(view.max_y());
            let mut touched = false;
            for y in low..=high {
                if view.get(x, y, z).is_air() {
                    view.set(x, y, z, settings.liquid_block);
                    touched = true;
                }
            }
            if touched {
                effects.pos_x |= x == CHUNK_SIZE_X - 1;
                effects.neg_x |= x == 0;
                effects.pos_z |= z == CHUNK_SIZE_Z - 1;
                effects.neg_z |= z == 0;
            }
        }
    }
    effects
}

/// Re-flood an already-generated sub-chunk after water arrived at one of
/// its edges. Reads actual blocks (biome blending is not reproducible
/// without full worker context): every column whose terrain sits below the
/// water level gets its air cells filled up to it, clamped to this
/// sub-chunk's Y range. Returns whether anything changed plus the edges
/// now carrying water, for onward propagation.
pub fn reflood_sub_chunk(
    column: &mut crate::world::storage::ChunkColumn,
    registry: &crate::world::core::BlockRegistry,
    sub_y: usize,
    water_level: i64,
    liquid: crate::world::core::BlockId,
) -> (bool, WaterEdgeEffects) {
    use crate::constants::SUB_CHUNK_HEIGHT;

    let min_y = (sub_y * SUB_CHUNK_HEIGHT) as i64;
    let max_y = min_y + SUB_CHUNK_HEIGHT as i64 - 1;
    let mut changed = false;
    let mut effects = WaterEdgeEffects::default();

    for z in 0..CHUNK_SIZE_Z {
        for x in 0..CHUNK_SIZE_X {
            // Walk down from the water level to the terrain surface,
            // treating existing liquid as fillable space.
            let mut terrain = -1i64;
            for y in (0..=water_level.min(max_y)).rev() {
                let block = column.get_block_world(x, y, z);
                if !block.is_air() && !registry.get(block).is_liquid {
                    terrain = y;
                    break;
                }
            }
            if terrain >= water_level {
                continue;
            }
            let low = (terrain + 1).max(min_y);
            let high = water_level.min(max_y);
            let mut touched = false;
            for y in low..=high {
                if column.get_block_world(x, y, z).is_air() {
                    column.set_block_world(x, y, z, liquid);
                    changed = true;
                    touched = true;
                } else if column.get_block_world(x, y, z) == liquid {
                    touched = true;
                }
            }
            if touched {
                effects.pos_x |= x == CHUNK_SIZE_X - 1;
                effects.neg_x |= x == 0;
                effects.pos_z |= z == CHUNK_SIZE_Z - 1;
                effects.neg_z |= z == 0;
            }
        }
    }
    (changed, effects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SUB_CHUNK_VOLUME;
    use crate::world::core::BlockId;
    use crate::world::generation::biome::{BiomeBlendData, BiomeConfig};
    use crate::world::generation::terrain::{compute_heights, fill_terrain};

    fn always_water() -> WaterSettings {
        WaterSettings {
            water_level: 64,
            region_frequency: 0.004,
            // Any sample passes: noise is bounded below by -1.
            region_threshold: -2.0,
            min_depth: 0.0,
            liquid_block: BlockId::WATER,
        }
    }

    fn basin_blend() -> BiomeBlendData {
        let mut biome = BiomeConfig::plains();
        biome.height_offset = -10.0;
        biome.height_amplitude = 0.0;
        biome.water = Some(always_water());
        BiomeBlendData {
            primary: biome,
            neighbors: Default::default(),
            local_x: 8,
            local_z: 8,
        }
    }

    #[test]
    fn basin_floods_to_water_level() {
        let noise = TerrainNoise::new(2);
        let blend = basin_blend();
        let heights = compute_heights(&noise, &blend, 64, 0, 0);
        let mut blocks = vec![0u16; SUB_CHUNK_VOLUME];
        let mut view = SubChunkView::new(&mut blocks, 64);
        fill_terrain(&mut view, &heights, &blend);
        let effects = flood_water(&mut view, &heights, &noise, &always_water(), 0, 0);

        // Terrain sits at 54; water fills 64 down toward it, edges touched.
        assert_eq!(view.get(5, 64, 5), BlockId::WATER);
        assert_eq!(view.get(5, 65, 5), BlockId::AIR);
        assert!(effects.pos_x && effects.neg_x && effects.pos_z && effects.neg_z);
    }

    #[test]
    fn reflood_fills_basin_and_reports_edges() {
        use crate::world::core::{BlockRegistry, ColumnPos};
        use crate::world::storage::ChunkColumn;

        let registry = BlockRegistry::with_stock_blocks();
        let mut column = ChunkColumn::new(ColumnPos::new(1, 0));
        // Flat stone floor at y = 60 across the chunk.
        for z in 0..CHUNK_SIZE_Z {
            for x in 0..CHUNK_SIZE_X {
                column.set_block_world(x, 60, z, BlockId::STONE);
            }
        }
        let (changed, effects) =
            reflood_sub_chunk(&mut column, &registry, 0, 63, BlockId::WATER);
        assert!(changed);
        assert_eq!(column.get_block_world(5, 61, 5), BlockId::WATER);
        assert_eq!(column.get_block_world(5, 63, 5), BlockId::WATER);
        assert_eq!(column.get_block_world(5, 60, 5), BlockId::STONE);
        assert!(effects.pos_x && effects.neg_z);

        // A second pass changes nothing but still reports wet edges.
        let (changed, effects) =
            reflood_sub_chunk(&mut column, &registry, 0, 63, BlockId::WATER);
        assert!(!changed);
        assert!(effects.any());
    }

    #[test]
    fn no_region_no_flood() {
        let noise = TerrainNoise::new(2);
        let blend = basin_blend();
        let heights = compute_heights(&noise, &blend, 64, 0, 0);
        let settings = WaterSettings {
            region_threshold: 2.0, // unreachable
            ..always_water()
        };
        let mut blocks = vec![0u16; SUB_CHUNK_VOLUME];
        let mut view = SubChunkView::new(&mut blocks, 64);
        fill_terrain(&mut view, &heights, &blend);
        let effects = flood_water(&mut view, &heights, &noise, &settings, 0, 0);
        assert!(!effects.any());
        assert_eq!(view.get(5, 64, 5), BlockId::AIR);
    }
}
