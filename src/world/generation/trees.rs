use rustc_hash::FxHashSet;

use crate::constants::{CHUNK_SIZE_X, CHUNK_SIZE_Z};
use crate::world::core::{sub_y_of_world_y, BlockId, ColumnPos, SubChunkPos, VoxelPos};
use crate::world::generation::biome::BiomeBlendData;
use crate::world::generation::noise::position_random;
use crate::world::generation::terrain::HeightField;
use crate::world::generation::worker::SubChunkView;
use crate::world::storage::ChunkManager;

const TREE_SALT: u64 = 4201;
/// Grid cells per chunk axis; each cell is 4 blocks square.
const TREE_GRID: usize = 8;
const TREE_CELL: usize = CHUNK_SIZE_X / TREE_GRID;

/// A tree the worker decided to grow; the main thread places it, because a
/// canopy can span multiple sub-chunks and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeSeed {
    pub world_x: i64,
    pub world_z: i64,
    /// World Y of the surface block the trunk stands on.
    pub surface_y: i64,
    pub trunk_height: u8,
    pub trunk_block: BlockId,
    pub leaf_block: BlockId,
}

/// Jittered 8×8 grid sampling over the chunk. A cell sprouts a tree with
/// probability `tree_density / 64`; the seed is reported by the sub-chunk
/// whose Y range contains the surface so each tree is emitted exactly once.
pub fn sample_tree_seeds(
    view: &SubChunkView<'_>,
    heights: &HeightField,
    blend: &BiomeBlendData,
    seed: u64,
    chunk_x: i64,
    chunk_z: i64,
) -> Vec<TreeSeed> {
    let biome = &blend.primary;
    if biome.tree_density <= 0.0 {
        return Vec::new();
    }
    let accept = biome.tree_density / (TREE_GRID * TREE_GRID) as f64;
    let water_level = biome.water.as_ref().map(|w| w.water_level).unwrap_or(i64::MIN);
    let chunk_min_x = chunk_x * CHUNK_SIZE_X as i64;
    let chunk_min_z = chunk_z * CHUNK_SIZE_Z as i64;

    let mut seeds = Vec::new();
    for cz in 0..TREE_GRID {
        for cx in 0..TREE_GRID {
            let cell_x = chunk_x * TREE_GRID as i64 + cx as i64;
            let cell_z = chunk_z * TREE_GRID as i64 + cz as i64;
            if position_random(seed, cell_x, cell_z, TREE_SALT) >= accept {
                continue;
            }
            let jx = (position_random(seed, cell_x, cell_z, TREE_SALT + 1) * TREE_CELL as f64)
                as usize;
            let jz = (position_random(seed, cell_x, cell_z, TREE_SALT + 2) * TREE_CELL as f64)
                as usize;
            let lx = (cx * TREE_CELL + jx.min(TREE_CELL - 1)).min(CHUNK_SIZE_X - 1);
            let lz = (cz * TREE_CELL + jz.min(TREE_CELL - 1)).min(CHUNK_SIZE_Z - 1);

            let surface = heights.get(lx as i64, lz as i64);
            if surface < view.min_y() || surface > view.max_y() {
                continue;
            }
            // No trees under water, and none where caves ate the surface.
            if surface < water_level || view.get(lx, surface, lz).is_air() {
                continue;
            }
            let trunk_height =
                4 + (position_random(seed, cell_x, cell_z, TREE_SALT + 3) * 3.0) as u8;
            seeds.push(TreeSeed {
                world_x: chunk_min_x + lx as i64,
                world_z: chunk_min_z + lz as i64,
                surface_y: surface,
                trunk_height,
                trunk_block: biome.tree_trunk_block,
                leaf_block: biome.tree_leaf_block,
            });
        }
    }
    seeds
}

/// Place a tree into the world through column writes. May create or touch
/// sub-chunks in neighboring columns; returns every sub-chunk whose blocks
/// changed so the caller can queue remeshes.
pub fn place_tree(chunks: &mut ChunkManager, tree: &TreeSeed) -> FxHashSet<SubChunkPos> {
    let mut touched = FxHashSet::default();
    let top = tree.surface_y + tree.trunk_height as i64;

    for y in (tree.surface_y + 1)..=top {
        set_world_block(
            chunks,
            VoxelPos::new(tree.world_x, y, tree.world_z),
            tree.trunk_block,
            &mut touched,
        );
    }

    // Two 5×5 canopy layers below the tip, a 3×3 layer, then a single cap.
    for (dy, radius) in [(-2i64, 2i64), (-1, 2), (0, 1)] {
        for dz in -radius..=radius {
            for dx in -radius..=radius {
                if dx == 0 && dz == 0 && dy < 0 {
                    continue; // trunk passes through
                }
                // Trim the four corners of the wide layers.
                if radius == 2 && dx.abs() == 2 && dz.abs() == 2 {
                    continue;
                }
                set_world_leaf(
                    chunks,
                    VoxelPos::new(tree.world_x + dx, top + dy + 1, tree.world_z + dz),
                    tree.leaf_block,
                    &mut touched,
                );
            }
        }
    }
    set_world_leaf(
        chunks,
        VoxelPos::new(tree.world_x, top + 2, tree.world_z),
        tree.leaf_block,
        &mut touched,
    );
    touched
}

fn set_world_block(
    chunks: &mut ChunkManager,
    pos: VoxelPos,
    block: BlockId,
    touched: &mut FxHashSet<SubChunkPos>,
) {
    let Some(sub_y) = sub_y_of_world_y(pos.y) else {
        return;
    };
    let column_pos = ColumnPos::from_world(pos.x, pos.z);
    let (column, _evicted) = chunks.load_column(column_pos);
    let lx = pos.x.rem_euclid(CHUNK_SIZE_X as i64) as usize;
    let lz = pos.z.rem_euclid(CHUNK_SIZE_Z as i64) as usize;
    if column.set_block_world(lx, pos.y, lz, block) {
        touched.insert(SubChunkPos::from_column(column_pos, sub_y as u8));
    }
}

fn set_world_leaf(
    chunks: &mut ChunkManager,
    pos: VoxelPos,
    leaf: BlockId,
    touched: &mut FxHashSet<SubChunkPos>,
) {
    // Leaves never replace existing blocks.
    let column_pos = ColumnPos::from_world(pos.x, pos.z);
    let lx = pos.x.rem_euclid(CHUNK_SIZE_X as i64) as usize;
    let lz = pos.z.rem_euclid(CHUNK_SIZE_Z as i64) as usize;
    if let Some(column) = chunks.get(column_pos) {
        if !column.get_block_world(lx, pos.y, lz).is_air() {
            return;
        }
    }
    set_world_block(chunks, pos, leaf, touched);
}
