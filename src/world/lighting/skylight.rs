//! Skylight propagation over single sub-chunk buffers.
//!
//! Internally skylight runs on a doubled 0–30 scale: every cell traversal
//! costs one internal unit while the stored nibble is `internal / 2`, so
//! light reaches roughly twice as far into caves as naive 0–15 stepping.
//! Vertical open-sky columns are handled by the init walk, which does not
//! attenuate through air; the BFS flood only ever raises stored values.

use crate::constants::{CHUNK_SIZE_X, CHUNK_SIZE_Z, LAYER_AREA, SUB_CHUNK_HEIGHT};
use crate::world::core::{index_to_local, local_index, BlockId, BlockRegistry};

/// One queued flood cell: flat index plus internal-scale level.
pub type FloodEntry = (usize, u8);

#[inline(always)]
fn stored_sky(light: &[u8], idx: usize) -> u8 {
    light[idx] >> 4
}

#[inline(always)]
fn write_sky(light: &mut [u8], idx: usize, stored: u8) {
    light[idx] = (light[idx] & 0x0F) | (stored.min(15) << 4);
}

/// Top-down column initialization. `above` carries the stored skylight of
/// the layer directly above this sub-chunk; absent means open sky.
pub fn column_init(
    blocks: &[u16],
    light: &mut [u8],
    registry: &BlockRegistry,
    above: Option<&[u8]>,
) {
    for z in 0..CHUNK_SIZE_Z {
        for x in 0..CHUNK_SIZE_X {
            let mut sky: i16 = match above {
                Some(layer) => (layer[z * CHUNK_SIZE_X + x] as i16) * 2,
                None => 30,
            };
            let mut y = SUB_CHUNK_HEIGHT;
            while y > 0 {
                y -= 1;
                let idx = local_index(x, y, z);
                let blocking = registry.light_blocking(BlockId(blocks[idx]));
                if blocking > 0 {
                    sky = (sky - blocking as i16 * 2).max(0);
                    write_sky(light, idx, (sky / 2) as u8);
                    if blocking >= 15 {
                        for below in (0..y).rev() {
                            write_sky(light, local_index(x, below, z), 0);
                        }
                        break;
                    }
                } else {
                    write_sky(light, idx, (sky / 2) as u8);
                }
            }
        }
    }
}

/// Seed the flood queue with every lit cell that has an in-sub-chunk
/// neighbor more than one stored unit darker.
pub fn seed_gradient(light: &[u8], queue: &mut Vec<FloodEntry>) {
    for idx in 0..light.len() {
        let stored = stored_sky(light, idx) as i16;
        if stored == 0 {
            continue;
        }
        let (x, y, z) = index_to_local(idx);
        let mut steep = false;
        for (nx, ny, nz) in neighbors(x, y, z) {
            if stored_sky(light, local_index(nx, ny, nz)) < (stored - 1).max(0) as u8 {
                steep = true;
                break;
            }
        }
        if steep {
            queue.push((idx, (stored * 2) as u8));
        }
    }
}

/// Six-neighbor BFS over the sub-chunk. Uses a monotonic cursor into a
/// contiguous buffer rather than a deque. Returns whether any stored value
/// changed.
pub fn flood(
    blocks: &[u16],
    light: &mut [u8],
    registry: &BlockRegistry,
    mut queue: Vec<FloodEntry>,
) -> bool {
    let mut changed = false;
    let mut cursor = 0usize;
    while cursor < queue.len() {
        let (idx, internal) = queue[cursor];
        cursor += 1;
        if internal / 2 < stored_sky(light, idx) {
            continue; // superseded by a brighter path
        }
        let (x, y, z) = index_to_local(idx);
        for (nx, ny, nz) in neighbors(x, y, z) {
            let nidx = local_index(nx, ny, nz);
            let blocking = registry.light_blocking(BlockId(blocks[nidx]));
            if blocking >= 15 {
                continue;
            }
            let next = internal as i16 - 1 - blocking as i16 * 2;
            if next <= 0 {
                continue;
            }
            if (next / 2) as u8 > stored_sky(light, nidx) {
                write_sky(light, nidx, (next / 2) as u8);
                queue.push((nidx, next as u8));
                changed = true;
            }
        }
    }
    changed
}

/// Full per-sub-chunk pass: column init then horizontal flood.
pub fn propagate_sub_chunk(
    blocks: &[u16],
    light: &mut [u8],
    registry: &BlockRegistry,
    above: Option<&[u8]>,
) {
    column_init(blocks, light, registry, above);
    let mut queue = Vec::new();
    seed_gradient(light, &mut queue);
    flood(blocks, light, registry, queue);
}

/// Stored skylight of the bottom (y = 0) layer: what the sub-chunk below
/// receives as its above-boundary during top-down column processing.
pub fn bottom_boundary_light(light: &[u8]) -> Vec<u8> {
    let mut layer = vec![0u8; LAYER_AREA];
    for z in 0..CHUNK_SIZE_Z {
        for x in 0..CHUNK_SIZE_X {
            layer[z * CHUNK_SIZE_X + x] = stored_sky(light, local_index(x, 0, z));
        }
    }
    layer
}

/// Re-light from a refreshed above-boundary: walk each column downward
/// without attenuating through air (vertical sky rule), then flood
/// horizontally from every raised cell. Returns whether anything changed.
pub fn propagate_from_above(
    blocks: &[u16],
    light: &mut [u8],
    registry: &BlockRegistry,
    above: &[u8],
) -> bool {
    let mut queue = Vec::new();
    for z in 0..CHUNK_SIZE_Z {
        for x in 0..CHUNK_SIZE_X {
            let mut sky: i16 = (above[z * CHUNK_SIZE_X + x] as i16) * 2;
            let mut y = SUB_CHUNK_HEIGHT;
            while y > 0 && sky > 0 {
                y -= 1;
                let idx = local_index(x, y, z);
                let blocking = registry.light_blocking(BlockId(blocks[idx]));
                if blocking >= 15 {
                    break;
                }
                sky -= blocking as i16 * 2;
                if sky <= 0 {
                    break;
                }
                if (sky / 2) as u8 > stored_sky(light, idx) {
                    write_sky(light, idx, (sky / 2) as u8);
                    queue.push((idx, sky as u8));
                }
            }
        }
    }
    if queue.is_empty() {
        return false;
    }
    flood(blocks, light, registry, queue);
    true
}

/// Horizontal face direction for cross-sub-chunk transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalDir {
    PosX,
    NegX,
    PosZ,
    NegZ,
}

/// Transfer skylight across a shared vertical face. `source_face` is the
/// packed light of the source sub-chunk's facing slice, indexed
/// `y·32 + u`; one stored unit is lost crossing the boundary. Floods the
/// target afterwards and reports whether anything changed.
pub fn propagate_from_neighbor(
    blocks: &[u16],
    light: &mut [u8],
    registry: &BlockRegistry,
    dir: HorizontalDir,
    source_face: &[u8],
) -> bool {
    let mut queue = Vec::new();
    for y in 0..SUB_CHUNK_HEIGHT {
        for u in 0..CHUNK_SIZE_X {
            let incoming = (source_face[y * CHUNK_SIZE_X + u] >> 4) as i16;
            if incoming <= 1 {
                continue;
            }
            let (x, z) = match dir {
                HorizontalDir::PosX => (CHUNK_SIZE_X - 1, u),
                HorizontalDir::NegX => (0, u),
                HorizontalDir::PosZ => (u, CHUNK_SIZE_Z - 1),
                HorizontalDir::NegZ => (u, 0),
            };
            let idx = local_index(x, y, z);
            let blocking = registry.light_blocking(BlockId(blocks[idx]));
            if blocking >= 15 {
                continue;
            }
            let internal = incoming * 2 - 2 - blocking as i16 * 2;
            if internal <= 0 {
                continue;
            }
            if (internal / 2) as u8 > stored_sky(light, idx) {
                write_sky(light, idx, (internal / 2) as u8);
                queue.push((idx, internal as u8));
            }
        }
    }
    if queue.is_empty() {
        return false;
    }
    flood(blocks, light, registry, queue);
    true
}

/// Recompute the blocklight nibble of a sub-chunk from emissive blocks,
/// with a plain 0–15 six-neighbor flood.
pub fn rebuild_blocklight(blocks: &[u16], light: &mut [u8], registry: &BlockRegistry) {
    let mut queue: Vec<FloodEntry> = Vec::new();
    for idx in 0..light.len() {
        let emission = registry.light_emission(BlockId(blocks[idx]));
        light[idx] = (light[idx] & 0xF0) | emission.min(15);
        if emission > 0 {
            queue.push((idx, emission));
        }
    }
    let mut cursor = 0usize;
    while cursor < queue.len() {
        let (idx, level) = queue[cursor];
        cursor += 1;
        if level <= 1 || (light[idx] & 0x0F) > level {
            continue;
        }
        let (x, y, z) = index_to_local(idx);
        for (nx, ny, nz) in neighbors(x, y, z) {
            let nidx = local_index(nx, ny, nz);
            let blocking = registry.light_blocking(BlockId(blocks[nidx]));
            if blocking >= 15 {
                continue;
            }
            let next = (level as i16 - 1 - blocking as i16).max(0) as u8;
            if next > (light[nidx] & 0x0F) {
                light[nidx] = (light[nidx] & 0xF0) | next;
                queue.push((nidx, next));
            }
        }
    }
}

fn neighbors(x: usize, y: usize, z: usize) -> impl Iterator<Item = (usize, usize, usize)> {
    let mut out: [(usize, usize, usize); 6] = [(usize::MAX, 0, 0); 6];
    let mut n = 0;
    if x + 1 < CHUNK_SIZE_X {
        out[n] = (x + 1, y, z);
        n += 1;
    }
    if x > 0 {
        out[n] = (x - 1, y, z);
        n += 1;
    }
    if y + 1 < SUB_CHUNK_HEIGHT {
        out[n] = (x, y + 1, z);
        n += 1;
    }
    if y > 0 {
        out[n] = (x, y - 1, z);
        n += 1;
    }
    if z + 1 < CHUNK_SIZE_Z {
        out[n] = (x, y, z + 1);
        n += 1;
    }
    if z > 0 {
        out[n] = (x, y, z - 1);
        n += 1;
    }
    out.into_iter().take(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SUB_CHUNK_VOLUME;

    fn registry() -> BlockRegistry {
        BlockRegistry::with_stock_blocks()
    }

    fn solid_floor_at(blocks: &mut [u16], y: usize) {
        for z in 0..CHUNK_SIZE_Z {
            for x in 0..CHUNK_SIZE_X {
                blocks[local_index(x, y, z)] = BlockId::STONE.0;
            }
        }
    }

    #[test]
    fn open_sky_column_is_fully_lit() {
        let reg = registry();
        let blocks = vec![0u16; SUB_CHUNK_VOLUME];
        let mut light = vec![0u8; SUB_CHUNK_VOLUME];
        propagate_sub_chunk(&blocks, &mut light, &reg, None);
        assert_eq!(light[local_index(0, 0, 0)] >> 4, 15);
        assert_eq!(light[local_index(31, 63, 31)] >> 4, 15);
    }

    #[test]
    fn opaque_layer_blocks_the_column() {
        let reg = registry();
        let mut blocks = vec![0u16; SUB_CHUNK_VOLUME];
        solid_floor_at(&mut blocks, 40);
        let mut light = vec![0u8; SUB_CHUNK_VOLUME];
        propagate_sub_chunk(&blocks, &mut light, &reg, None);
        assert_eq!(light[local_index(5, 41, 5)] >> 4, 15);
        assert_eq!(light[local_index(5, 40, 5)] >> 4, 0);
        assert_eq!(light[local_index(5, 10, 5)] >> 4, 0);
    }

    #[test]
    fn water_attenuates_gradually() {
        let reg = registry();
        let mut blocks = vec![0u16; SUB_CHUNK_VOLUME];
        for y in 30..=50 {
            blocks[local_index(8, y, 8)] = BlockId::WATER.0;
        }
        let mut light = vec![0u8; SUB_CHUNK_VOLUME];
        column_init(&blocks, &mut light, &reg, None);
        // Each water cell costs one stored unit (blocking 1 on the doubled
        // scale); at the surface 14, fading with depth.
        assert_eq!(light[local_index(8, 50, 8)] >> 4, 14);
        assert_eq!(light[local_index(8, 45, 8)] >> 4, 9);
        assert_eq!(light[local_index(8, 36, 8)] >> 4, 0);
    }

    #[test]
    fn flood_reaches_into_side_pocket() {
        let reg = registry();
        let mut blocks = vec![0u16; SUB_CHUNK_VOLUME];
        // Ceiling over half the sub-chunk at y = 50, open at x >= 16.
        for z in 0..CHUNK_SIZE_Z {
            for x in 0..16 {
                blocks[local_index(x, 50, z)] = BlockId::STONE.0;
            }
        }
        let mut light = vec![0u8; SUB_CHUNK_VOLUME];
        propagate_sub_chunk(&blocks, &mut light, &reg, None);
        // Directly under the open side: full light.
        assert_eq!(light[local_index(20, 49, 8)] >> 4, 15);
        // Under the ceiling, light falls off ~1 per two cells inward.
        let at_edge = light[local_index(15, 49, 8)] >> 4;
        let deeper = light[local_index(10, 49, 8)] >> 4;
        assert!(at_edge >= 14, "edge cell got {at_edge}");
        assert!(deeper < at_edge && deeper > 0, "deeper cell got {deeper}");
        let far = light[local_index(0, 49, 8)] >> 4;
        assert!(far < deeper, "far cell got {far}");
    }

    #[test]
    fn neighbor_skylight_gradient_is_bounded() {
        let reg = registry();
        let mut blocks = vec![0u16; SUB_CHUNK_VOLUME];
        for z in 0..CHUNK_SIZE_Z {
            for x in 0..20 {
                blocks[local_index(x, 55, z)] = BlockId::STONE.0;
            }
        }
        let mut light = vec![0u8; SUB_CHUNK_VOLUME];
        propagate_sub_chunk(&blocks, &mut light, &reg, None);
        for z in 0..CHUNK_SIZE_Z {
            for x in 0..CHUNK_SIZE_X - 1 {
                for y in 0..SUB_CHUNK_HEIGHT {
                    let a = (light[local_index(x, y, z)] >> 4) as i16;
                    let b = (light[local_index(x + 1, y, z)] >> 4) as i16;
                    if blocks[local_index(x, y, z)] == 0 && blocks[local_index(x + 1, y, z)] == 0 {
                        assert!((a - b).abs() <= 2, "gradient {a} vs {b} at ({x},{y},{z})");
                    }
                }
            }
        }
    }

    #[test]
    fn above_boundary_feeds_the_column() {
        let reg = registry();
        let blocks = vec![0u16; SUB_CHUNK_VOLUME];
        let mut light = vec![0u8; SUB_CHUNK_VOLUME];
        // Above says this column is in half shadow.
        let above = vec![7u8; LAYER_AREA];
        propagate_sub_chunk(&blocks, &mut light, &reg, Some(&above));
        assert_eq!(light[local_index(3, 63, 3)] >> 4, 7);
        assert_eq!(light[local_index(3, 0, 3)] >> 4, 7);
    }

    #[test]
    fn propagate_from_above_only_raises() {
        let reg = registry();
        let blocks = vec![0u16; SUB_CHUNK_VOLUME];
        let mut light = vec![0u8; SUB_CHUNK_VOLUME];
        let dark = vec![3u8; LAYER_AREA];
        propagate_sub_chunk(&blocks, &mut light, &reg, Some(&dark));
        let bright = vec![15u8; LAYER_AREA];
        assert!(propagate_from_above(&blocks, &mut light, &reg, &bright));
        assert_eq!(light[local_index(0, 0, 0)] >> 4, 15);
        // Re-applying the dark boundary must not lower anything.
        assert!(!propagate_from_above(&blocks, &mut light, &reg, &dark));
        assert_eq!(light[local_index(0, 0, 0)] >> 4, 15);
    }

    #[test]
    fn neighbor_transfer_loses_one_unit() {
        let reg = registry();
        let blocks = vec![0u16; SUB_CHUNK_VOLUME];
        let mut light = vec![0u8; SUB_CHUNK_VOLUME];
        let mut source = vec![0u8; crate::constants::FACE_AREA];
        source[30 * CHUNK_SIZE_X + 10] = 12 << 4;
        let changed = propagate_from_neighbor(&blocks, &mut light, &reg, HorizontalDir::PosX, &source);
        assert!(changed);
        assert_eq!(light[local_index(31, 30, 10)] >> 4, 11);
        // And it spreads inward from there.
        assert!(light[local_index(30, 30, 10)] >> 4 >= 10);
    }

    #[test]
    fn blocklight_floods_from_emissive_blocks() {
        let reg = registry();
        let mut blocks = vec![0u16; SUB_CHUNK_VOLUME];
        blocks[local_index(16, 32, 16)] = BlockId::TORCH.0;
        let mut light = vec![0u8; SUB_CHUNK_VOLUME];
        rebuild_blocklight(&blocks, &mut light, &reg);
        assert_eq!(light[local_index(16, 32, 16)] & 0x0F, 14);
        assert_eq!(light[local_index(18, 32, 16)] & 0x0F, 12);
        assert_eq!(light[local_index(16, 32, 30)] & 0x0F, 0);
    }
}
