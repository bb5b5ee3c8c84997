//! Greedy mesher: per-face-direction 2D masks merged into maximal
//! rectangles, with neighbor-aware face culling and face light sampled
//! from the adjacent air cell. Runs inside mesh workers.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::constants::{CHUNK_SIZE_X, CHUNK_SIZE_Z, SUB_CHUNK_HEIGHT, SUB_CHUNK_VOLUME};
use crate::meshing::mesh::{brightness, MeshGroup, NonGreedyBlocks, SubChunkMesh};
use crate::world::core::{local_index, BlockId, BlockRegistry, FaceDirection, SubChunkPos};

/// Per-worker lookup tables derived from the registry once at pool spawn;
/// the per-cell hot path never touches `BlockProperties`.
pub struct MeshTables {
    registry: Arc<BlockRegistry>,
    opaque: Vec<bool>,
    non_greedy: Vec<bool>,
    transparent: Vec<bool>,
}

impl MeshTables {
    pub fn new(registry: Arc<BlockRegistry>) -> Self {
        let n = registry.block_count();
        let mut opaque = vec![false; n];
        let mut non_greedy = vec![false; n];
        let mut transparent = vec![false; n];
        for id in 0..n {
            let props = registry.get(BlockId(id as u16));
            opaque[id] = props.is_opaque;
            non_greedy[id] = props.non_greedy;
            transparent[id] = props.transparent_render;
        }
        Self {
            registry,
            opaque,
            non_greedy,
            transparent,
        }
    }

    #[inline(always)]
    fn is_non_greedy(&self, id: u16) -> bool {
        self.non_greedy.get(id as usize).copied().unwrap_or(false)
    }

    #[inline(always)]
    fn is_transparent(&self, id: u16) -> bool {
        self.transparent.get(id as usize).copied().unwrap_or(false)
    }

    #[inline(always)]
    fn should_render(&self, block: u16, neighbor: u16, face: FaceDirection) -> bool {
        self.registry
            .should_render_face(BlockId(block), BlockId(neighbor), face)
    }

    #[inline(always)]
    fn texture(&self, block: u16, face: FaceDirection) -> u16 {
        self.registry.texture_for_face(BlockId(block), face).0
    }
}

/// Block and light boundary layers of the six neighbor sub-chunks, each
/// `None` when the neighbor is absent. Vertical faces are indexed
/// `y·32 + u`, horizontal faces `z·32 + x`, matching
/// `SubChunk::boundary_blocks`.
#[derive(Debug, Default)]
pub struct NeighborLayers {
    pub blocks: [Option<Vec<u16>>; 6],
    pub light: [Option<Vec<u8>>; 6],
}

/// A meshing job. Buffers are owned copies; ownership passes to the worker
/// on dispatch and the mesh comes back in the result.
#[derive(Debug)]
pub struct MeshJob {
    pub position: SubChunkPos,
    pub blocks: Vec<u16>,
    pub light: Vec<u8>,
    pub neighbors: NeighborLayers,
}

#[derive(Debug)]
pub enum MeshResult {
    Completed {
        position: SubChunkPos,
        mesh: Box<SubChunkMesh>,
    },
    Failed {
        position: SubChunkPos,
        message: String,
    },
}

/// Entry point the mesh worker pool runs.
pub fn run_mesh_job(job: MeshJob, tables: &MeshTables) -> MeshResult {
    let position = job.position;
    match catch_unwind(AssertUnwindSafe(|| mesh_sub_chunk(&job, tables))) {
        Ok(mesh) => MeshResult::Completed {
            position,
            mesh: Box::new(mesh),
        },
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "mesh worker panicked".to_string());
            MeshResult::Failed { position, message }
        }
    }
}

#[inline(always)]
fn pack(texture: u16, light: u8, block: u16) -> u64 {
    ((texture as u64) << 32) | ((light as u64) << 16) | block as u64
}

#[inline(always)]
fn unpack(mask: u64) -> (u16, u8, u16) {
    (
        (mask >> 32) as u16,
        ((mask >> 16) & 0xFF) as u8,
        (mask & 0xFFFF) as u16,
    )
}

/// Produce the full mesh for one sub-chunk.
pub fn mesh_sub_chunk(job: &MeshJob, tables: &MeshTables) -> SubChunkMesh {
    debug_assert_eq!(job.blocks.len(), SUB_CHUNK_VOLUME);
    let mut builder = GroupBuilder::default();

    for face in FaceDirection::ALL {
        mesh_face(job, tables, face, &mut builder);
    }

    let mut mesh = builder.finish(tables);
    mesh.non_greedy = collect_non_greedy(job, tables);
    mesh
}

/// Accumulates quads per (texture, face, transparent) key, splitting a
/// group whenever another quad would overflow its 16-bit index space.
#[derive(Default)]
struct GroupBuilder {
    groups: Vec<MeshGroup>,
    index: FxHashMap<(u16, usize, bool), usize>,
}

impl GroupBuilder {
    fn group_for(&mut self, texture: u16, face: FaceDirection, transparent: bool) -> &mut MeshGroup {
        let key = (texture, face.index(), transparent);
        let slot = match self.index.get(&key) {
            Some(&i) if self.groups[i].vertex_count() + 4 <= u16::MAX as usize => i,
            _ => {
                self.groups.push(MeshGroup::new(
                    crate::world::core::TextureId(texture),
                    face,
                    transparent,
                ));
                let i = self.groups.len() - 1;
                self.index.insert(key, i);
                i
            }
        };
        &mut self.groups[slot]
    }

    fn finish(mut self, _tables: &MeshTables) -> SubChunkMesh {
        // Stable output order regardless of hash iteration.
        self.groups
            .sort_by_key(|g| (g.transparent, g.texture.0, g.face.index()));
        let (transparent, opaque): (Vec<_>, Vec<_>) =
            self.groups.into_iter().partition(|g| g.transparent);
        SubChunkMesh {
            opaque,
            transparent,
            non_greedy: Vec::new(),
        }
    }
}

/// (u, v) grid dimensions for a face direction.
fn face_dims(face: FaceDirection) -> (usize, usize, usize) {
    match face.axis() {
        0 => (CHUNK_SIZE_Z, SUB_CHUNK_HEIGHT, CHUNK_SIZE_X), // u=z, v=y, slices=x
        1 => (CHUNK_SIZE_X, CHUNK_SIZE_Z, SUB_CHUNK_HEIGHT), // u=x, v=z, slices=y
        _ => (CHUNK_SIZE_X, SUB_CHUNK_HEIGHT, CHUNK_SIZE_Z), // u=x, v=y, slices=z
    }
}

/// Local cell coordinates for (slice, u, v) under a face direction.
#[inline(always)]
fn cell_at(face: FaceDirection, slice: usize, u: usize, v: usize) -> (usize, usize, usize) {
    match face.axis() {
        0 => (slice, v, u),
        1 => (u, slice, v),
        _ => (u, v, slice),
    }
}

/// The block on the far side of a cell's face, reading the neighbor
/// boundary layer when the face leaves the sub-chunk. Absent neighbors
/// read as air.
fn neighbor_block(job: &MeshJob, face: FaceDirection, x: usize, y: usize, z: usize) -> u16 {
    let (dx, dy, dz) = face.offset();
    let nx = x as i64 + dx;
    let ny = y as i64 + dy;
    let nz = z as i64 + dz;
    if (0..CHUNK_SIZE_X as i64).contains(&nx)
        && (0..SUB_CHUNK_HEIGHT as i64).contains(&ny)
        && (0..CHUNK_SIZE_Z as i64).contains(&nz)
    {
        return job.blocks[local_index(nx as usize, ny as usize, nz as usize)];
    }
    match &job.neighbors.blocks[face.index()] {
        Some(layer) => layer[boundary_index(face, x, y, z)],
        None => 0,
    }
}

/// Light at the air cell outside the face: the neighbor cell in-chunk, the
/// boundary layer off-chunk, else 15 above / 0 below / 15 to the sides.
fn face_light(job: &MeshJob, face: FaceDirection, x: usize, y: usize, z: usize) -> u8 {
    let (dx, dy, dz) = face.offset();
    let nx = x as i64 + dx;
    let ny = y as i64 + dy;
    let nz = z as i64 + dz;
    let packed = if (0..CHUNK_SIZE_X as i64).contains(&nx)
        && (0..SUB_CHUNK_HEIGHT as i64).contains(&ny)
        && (0..CHUNK_SIZE_Z as i64).contains(&nz)
    {
        job.light[local_index(nx as usize, ny as usize, nz as usize)]
    } else {
        match &job.neighbors.light[face.index()] {
            Some(layer) => layer[boundary_index(face, x, y, z)],
            None => match face {
                FaceDirection::NegY => 0x00,
                _ => 0xF0, // open sky above and to the sides
            },
        }
    };
    (packed >> 4).max(packed & 0x0F)
}

/// Index into a neighbor boundary layer for the cell just across the face.
#[inline(always)]
fn boundary_index(face: FaceDirection, x: usize, y: usize, z: usize) -> usize {
    match face.axis() {
        0 => y * CHUNK_SIZE_Z + z,
        1 => z * CHUNK_SIZE_X + x,
        _ => y * CHUNK_SIZE_X + x,
    }
}

fn mesh_face(job: &MeshJob, tables: &MeshTables, face: FaceDirection, builder: &mut GroupBuilder) {
    let (u_size, v_size, slice_count) = face_dims(face);
    let mut mask = vec![0u64; u_size * v_size];

    for slice in 0..slice_count {
        mask.fill(0);
        let mut any = false;
        for v in 0..v_size {
            for u in 0..u_size {
                let (x, y, z) = cell_at(face, slice, u, v);
                let block = job.blocks[local_index(x, y, z)];
                if block == 0 || tables.is_non_greedy(block) {
                    continue;
                }
                let neighbor = neighbor_block(job, face, x, y, z);
                if !tables.should_render(block, neighbor, face) {
                    continue;
                }
                let light = face_light(job, face, x, y, z);
                mask[v * u_size + u] = pack(tables.texture(block, face), light, block);
                any = true;
            }
        }
        if !any {
            continue;
        }
        merge_mask(job, tables, face, slice, &mut mask, u_size, v_size, builder);
    }
}

/// Greedy rectangle extraction: extend right while the mask matches, then
/// extend down by full rows, emit one quad, zero the covered cells.
#[allow(clippy::too_many_arguments)]
fn merge_mask(
    job: &MeshJob,
    tables: &MeshTables,
    face: FaceDirection,
    slice: usize,
    mask: &mut [u64],
    u_size: usize,
    v_size: usize,
    builder: &mut GroupBuilder,
) {
    for v in 0..v_size {
        for u in 0..u_size {
            let value = mask[v * u_size + u];
            if value == 0 {
                continue;
            }
            let mut width = 1;
            while u + width < u_size && mask[v * u_size + u + width] == value {
                width += 1;
            }
            let mut height = 1;
            'rows: while v + height < v_size {
                for du in 0..width {
                    if mask[(v + height) * u_size + u + du] != value {
                        break 'rows;
                    }
                }
                height += 1;
            }
            for dv in 0..height {
                for du in 0..width {
                    mask[(v + dv) * u_size + u + du] = 0;
                }
            }
            emit_quad(job, tables, face, slice, u, v, width, height, value, builder);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn emit_quad(
    job: &MeshJob,
    tables: &MeshTables,
    face: FaceDirection,
    slice: usize,
    u0: usize,
    v0: usize,
    width: usize,
    height: usize,
    value: u64,
    builder: &mut GroupBuilder,
) {
    let (texture, light, block) = unpack(value);
    let transparent = tables.is_transparent(block);
    let group = builder.group_for(texture, face, transparent);

    let base = group.vertex_count() as u16;
    let plane = if face.is_positive() {
        slice as f32 + 1.0
    } else {
        slice as f32
    };
    let world = [
        (job.position.column.x * CHUNK_SIZE_X as i64) as f32,
        job.position.min_world_y() as f32,
        (job.position.column.z * CHUNK_SIZE_Z as i64) as f32,
    ];
    let normal = face.normal();
    let shade = brightness(light);

    let corners = [
        (u0 as f32, v0 as f32, 0.0f32, 0.0f32),
        ((u0 + width) as f32, v0 as f32, width as f32, 0.0),
        (
            (u0 + width) as f32,
            (v0 + height) as f32,
            width as f32,
            height as f32,
        ),
        (u0 as f32, (v0 + height) as f32, 0.0, height as f32),
    ];
    for (cu, cv, tu, tv) in corners {
        let (x, y, z) = match face.axis() {
            0 => (plane, cv, cu),
            1 => (cu, plane, cv),
            _ => (cu, cv, plane),
        };
        group.vertices.extend_from_slice(&[
            world[0] + x,
            world[1] + y,
            world[2] + z,
            tu,
            tv,
            normal[0],
            normal[1],
            normal[2],
            shade,
            shade,
            shade,
        ]);
    }

    // The ±Z faces wind the opposite way from the other four.
    let order: [u16; 6] = if face.axis() == 2 {
        [0, 2, 1, 0, 3, 2]
    } else {
        [0, 1, 2, 0, 2, 3]
    };
    group.indices.extend(order.iter().map(|&i| base + i));
}

/// Gather custom-geometry blocks with the max light of their surroundings.
fn collect_non_greedy(job: &MeshJob, tables: &MeshTables) -> Vec<NonGreedyBlocks> {
    let mut by_block: FxHashMap<u16, NonGreedyBlocks> = FxHashMap::default();
    for z in 0..CHUNK_SIZE_Z {
        for y in 0..SUB_CHUNK_HEIGHT {
            for x in 0..CHUNK_SIZE_X {
                let block = job.blocks[local_index(x, y, z)];
                if block == 0 || !tables.is_non_greedy(block) {
                    continue;
                }
                let mut light = 0u8;
                for face in FaceDirection::ALL {
                    light = light.max(face_light(job, face, x, y, z));
                }
                let entry = by_block.entry(block).or_insert_with(|| NonGreedyBlocks {
                    block: BlockId(block),
                    positions: Vec::new(),
                    light_levels: Vec::new(),
                });
                entry.positions.push([
                    (job.position.column.x * CHUNK_SIZE_X as i64 + x as i64) as f32,
                    (job.position.min_world_y() + y as i64) as f32,
                    (job.position.column.z * CHUNK_SIZE_Z as i64 + z as i64) as f32,
                ]);
                entry.light_levels.push(light);
            }
        }
    }
    let mut out: Vec<NonGreedyBlocks> = by_block.into_values().collect();
    out.sort_by_key(|n| n.block);
    out
}
