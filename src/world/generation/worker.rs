use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::constants::{
    CHUNK_SIZE_X, CHUNK_SIZE_Z, SUB_CHUNK_HEIGHT, SUB_CHUNK_VOLUME,
};
use crate::world::core::{local_index, BlockId, BlockRegistry, SubChunkPos};
use crate::world::generation::biome::BiomeBlendData;
use crate::world::generation::caves::carve_caves;
use crate::world::generation::noise::TerrainNoise;
use crate::world::generation::ores::{place_ores, OrePosition};
use crate::world::generation::terrain::{apply_cliffs, compute_heights, fill_terrain, HeightField};
use crate::world::generation::trees::{sample_tree_seeds, TreeSeed};
use crate::world::generation::water::{flood_water, WaterEdgeEffects};

/// Worker-owned window into a sub-chunk's block buffer, addressed by
/// (local x, world y, local z). Reads outside the Y range are air; writes
/// outside are dropped.
pub struct SubChunkView<'a> {
    blocks: &'a mut [u16],
    min_y: i64,
    chunk_min_x: i64,
    chunk_min_z: i64,
}

impl<'a> SubChunkView<'a> {
    pub fn new(blocks: &'a mut [u16], min_y: i64) -> Self {
        debug_assert_eq!(blocks.len(), SUB_CHUNK_VOLUME);
        Self {
            blocks,
            min_y,
            chunk_min_x: 0,
            chunk_min_z: 0,
        }
    }

    pub fn with_chunk_origin(mut self, chunk_min_x: i64, chunk_min_z: i64) -> Self {
        self.chunk_min_x = chunk_min_x;
        self.chunk_min_z = chunk_min_z;
        self
    }

    pub fn min_y(&self) -> i64 {
        self.min_y
    }

    pub fn max_y(&self) -> i64 {
        self.min_y + SUB_CHUNK_HEIGHT as i64 - 1
    }

    #[inline(always)]
    pub fn get(&self, x: usize, world_y: i64, z: usize) -> BlockId {
        if world_y < self.min_y || world_y > self.max_y() {
            return BlockId::AIR;
        }
        BlockId(self.blocks[local_index(x, (world_y - self.min_y) as usize, z)])
    }

    #[inline(always)]
    pub fn set(&mut self, x: usize, world_y: i64, z: usize, block: BlockId) {
        if world_y < self.min_y || world_y > self.max_y() {
            return;
        }
        self.blocks[local_index(x, (world_y - self.min_y) as usize, z)] = block.0;
    }

    /// Local (x, z) for a world position, if it lies within this chunk.
    pub fn world_to_local_xz(&self, world_x: i64, world_z: i64) -> Option<(usize, usize)> {
        let lx = world_x - self.chunk_min_x;
        let lz = world_z - self.chunk_min_z;
        if (0..CHUNK_SIZE_X as i64).contains(&lx) && (0..CHUNK_SIZE_Z as i64).contains(&lz) {
            Some((lx as usize, lz as usize))
        } else {
            None
        }
    }

    #[cfg(test)]
    pub fn solid_count(&self) -> usize {
        self.blocks.iter().filter(|&&b| b != 0).count()
    }
}

/// A generation job. The block and light buffers are pre-allocated by the
/// scheduler and moved into the job; the worker fills and returns them.
#[derive(Debug)]
pub struct GenerationJob {
    pub position: SubChunkPos,
    pub seed: u64,
    pub sea_level: i64,
    pub blend: BiomeBlendData,
    pub blocks: Vec<u16>,
    pub light: Vec<u8>,
}

/// Everything a finished generation job hands back to the main task.
#[derive(Debug)]
pub struct GenerationOutput {
    pub position: SubChunkPos,
    pub blocks: Vec<u16>,
    pub light: Vec<u8>,
    /// Terrain rises above this sub-chunk's Y range somewhere in the chunk.
    pub has_terrain_above: bool,
    /// Highest solid world Y inside this sub-chunk, if any.
    pub max_solid_y: Option<i64>,
    pub fully_opaque: bool,
    pub ore_positions: Vec<OrePosition>,
    pub tree_seeds: Vec<TreeSeed>,
    pub water_edges: WaterEdgeEffects,
}

/// Typed result crossing the worker boundary; failures are data, not
/// panics.
#[derive(Debug)]
pub enum GenerationResult {
    Completed(Box<GenerationOutput>),
    Failed {
        position: SubChunkPos,
        message: String,
    },
}

/// Deterministic generation pipeline for one sub-chunk. Phases run in a
/// fixed order: terrain, caves, cliffs, ores, water, provisional skylight.
pub fn generate_sub_chunk(job: GenerationJob, registry: &BlockRegistry) -> GenerationOutput {
    let position = job.position;
    let chunk_min_x = position.column.x * CHUNK_SIZE_X as i64;
    let chunk_min_z = position.column.z * CHUNK_SIZE_Z as i64;
    let min_y = position.min_world_y();
    let max_y = position.max_world_y();

    let mut blocks = job.blocks;
    let mut light = job.light;
    blocks.iter_mut().for_each(|b| *b = 0);
    light.iter_mut().for_each(|l| *l = 0);

    let noise = TerrainNoise::new(job.seed as u32);
    let mut heights = compute_heights(&noise, &job.blend, job.sea_level, chunk_min_x, chunk_min_z);

    let mut view = SubChunkView::new(&mut blocks, min_y).with_chunk_origin(chunk_min_x, chunk_min_z);
    fill_terrain(&mut view, &heights, &job.blend);

    if let Some(caves) = &job.blend.primary.caves {
        carve_caves(&mut view, &heights, &noise, caves, chunk_min_x, chunk_min_z);
    }

    apply_cliffs(
        &mut view,
        &mut heights,
        &noise,
        &job.blend,
        chunk_min_x,
        chunk_min_z,
    );

    let ore_positions = place_ores(
        &mut view,
        &job.blend.primary.ores,
        job.seed,
        position.column.x,
        position.column.z,
    );

    let water_edges = if let Some(water) = &job.blend.primary.water {
        flood_water(&mut view, &heights, &noise, water, chunk_min_x, chunk_min_z)
    } else {
        WaterEdgeEffects::default()
    };

    let tree_seeds = sample_tree_seeds(
        &view,
        &heights,
        &job.blend,
        job.seed,
        position.column.x,
        position.column.z,
    );

    initial_skylight(&blocks, &mut light, &heights, min_y);

    let has_terrain_above = terrain_above(&heights, max_y);
    let max_solid_y = max_solid_world_y(&blocks, min_y);
    let fully_opaque = blocks.iter().all(|&b| registry.is_opaque(BlockId(b)));

    GenerationOutput {
        position,
        blocks,
        light,
        has_terrain_above,
        max_solid_y,
        fully_opaque,
        ore_positions,
        tree_seeds,
        water_edges,
    }
}

/// Entry point the generation worker pool runs. Panics inside the pipeline
/// become typed failures so one bad coordinate cannot take a worker down.
pub fn run_generation_job(job: GenerationJob, registry: &Arc<BlockRegistry>) -> GenerationResult {
    let position = job.position;
    match catch_unwind(AssertUnwindSafe(|| generate_sub_chunk(job, registry))) {
        Ok(output) => GenerationResult::Completed(Box::new(output)),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "generation worker panicked".to_string());
            log::warn!(
                "[generation] job for ({}, {}, sub {}) failed: {}",
                position.column.x,
                position.column.z,
                position.sub_y,
                message
            );
            GenerationResult::Failed { position, message }
        }
    }
}

/// Provisional skylight written by the worker: full light above terrain,
/// darkness below and inside it. The propagator refines this later with
/// cross-boundary context.
fn initial_skylight(blocks: &[u16], light: &mut [u8], heights: &HeightField, min_y: i64) {
    for z in 0..CHUNK_SIZE_Z {
        for x in 0..CHUNK_SIZE_X {
            let h = heights.get(x as i64, z as i64);
            for ly in (0..SUB_CHUNK_HEIGHT).rev() {
                let world_y = min_y + ly as i64;
                let idx = local_index(x, ly, z);
                let sky = if blocks[idx] == 0 && world_y > h { 15 } else { 0 };
                light[idx] = sky << 4;
            }
        }
    }
}

fn terrain_above(heights: &HeightField, max_y: i64) -> bool {
    for z in 0..CHUNK_SIZE_Z as i64 {
        for x in 0..CHUNK_SIZE_X as i64 {
            if heights.get(x, z) > max_y {
                return true;
            }
        }
    }
    false
}

fn max_solid_world_y(blocks: &[u16], min_y: i64) -> Option<i64> {
    for ly in (0..SUB_CHUNK_HEIGHT).rev() {
        let layer = &blocks[ly * crate::constants::LAYER_AREA..(ly + 1) * crate::constants::LAYER_AREA];
        if layer.iter().any(|&b| b != 0) {
            return Some(min_y + ly as i64);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::generation::biome::BiomeConfig;

    fn flat_job(sub_y: u8) -> GenerationJob {
        let mut biome = BiomeConfig::plains();
        biome.height_offset = 0.0;
        biome.height_amplitude = 0.0;
        biome.caves = None;
        biome.water = None;
        biome.tree_density = 0.0;
        biome.ores.clear();
        GenerationJob {
            position: SubChunkPos::new(0, 0, sub_y),
            seed: 1,
            sea_level: 64,
            blend: BiomeBlendData {
                primary: biome,
                neighbors: Default::default(),
                local_x: 8,
                local_z: 8,
            },
            blocks: vec![0; SUB_CHUNK_VOLUME],
            light: vec![0; SUB_CHUNK_VOLUME],
        }
    }

    #[test]
    fn flat_world_surface_and_skylight() {
        let registry = BlockRegistry::with_stock_blocks();
        let out = generate_sub_chunk(flat_job(1), &registry);
        // World y 64 = local y 0 of sub-chunk 1: the grass surface.
        assert_eq!(out.blocks[local_index(7, 0, 9)], BlockId::GRASS.0);
        assert_eq!(out.blocks[local_index(7, 1, 9)], BlockId::AIR.0);
        // Skylight: 15 above the surface, 0 at and below it.
        assert_eq!(out.light[local_index(7, 1, 9)] >> 4, 15);
        assert_eq!(out.light[local_index(7, 0, 9)] >> 4, 0);
        assert_eq!(out.max_solid_y, Some(64));
        assert!(!out.has_terrain_above);
        assert!(!out.fully_opaque);
    }

    #[test]
    fn lower_sub_chunk_is_fully_opaque() {
        let registry = BlockRegistry::with_stock_blocks();
        let out = generate_sub_chunk(flat_job(0), &registry);
        assert!(out.fully_opaque);
        assert_eq!(out.max_solid_y, Some(63));
        assert!(out.has_terrain_above);
    }

    #[test]
    fn generation_is_bitwise_deterministic() {
        let registry = BlockRegistry::with_stock_blocks();
        let full = |sub_y| {
            let mut biome = BiomeConfig::plains();
            biome.water = Some(crate::world::generation::biome::WaterSettings {
                water_level: 64,
                region_frequency: 0.004,
                region_threshold: 0.1,
                min_depth: 0.0,
                liquid_block: BlockId::WATER,
            });
            GenerationJob {
                position: SubChunkPos::new(3, -2, sub_y),
                seed: 42,
                sea_level: 64,
                blend: BiomeBlendData {
                    primary: biome,
                    neighbors: Default::default(),
                    local_x: 3,
                    local_z: 14,
                },
                blocks: vec![0; SUB_CHUNK_VOLUME],
                light: vec![0; SUB_CHUNK_VOLUME],
            }
        };
        let a = generate_sub_chunk(full(1), &registry);
        let b = generate_sub_chunk(full(1), &registry);
        assert_eq!(a.blocks, b.blocks);
        assert_eq!(a.light, b.light);
        assert_eq!(a.water_edges, b.water_edges);
        assert_eq!(a.tree_seeds, b.tree_seeds);
    }
}
