use std::f64::consts::TAU;

use rustc_hash::FxHashSet;

use crate::constants::{CHUNK_SIZE_X, CHUNK_SIZE_Z};
use crate::world::core::{BlockId, VoxelPos};
use crate::world::generation::biome::OreSettings;
use crate::world::generation::noise::position_random;
use crate::world::generation::worker::SubChunkView;

/// World position of a placed vein origin, reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrePosition {
    pub block: BlockId,
    pub position: VoxelPos,
}

/// Standard normal sample via the Box–Muller transform, fed by two
/// deterministic positional uniforms.
fn gaussian(seed: u64, chunk_x: i64, chunk_z: i64, salt: u64) -> f64 {
    let u1 = position_random(seed, chunk_x, chunk_z, salt).max(1e-12);
    let u2 = position_random(seed, chunk_x, chunk_z, salt.wrapping_add(1));
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}

/// Place every configured ore type into the sub-chunk.
///
/// Each attempt is positioned by pure positional hashing so any worker
/// generating this coordinate produces the identical result. The vein is a
/// bounded BFS blob whose growth probability decays as it fills.
pub fn place_ores(
    view: &mut SubChunkView<'_>,
    settings: &[OreSettings],
    seed: u64,
    chunk_x: i64,
    chunk_z: i64,
) -> Vec<OrePosition> {
    let mut placed_origins = Vec::new();
    let chunk_min_x = chunk_x * CHUNK_SIZE_X as i64;
    let chunk_min_z = chunk_z * CHUNK_SIZE_Z as i64;

    for ore in settings {
        for attempt in 0..ore.frequency {
            let base_salt = ore
                .salt
                .wrapping_mul(10_000)
                .wrapping_add(attempt as u64 * 7);
            let rx = position_random(seed, chunk_x, chunk_z, base_salt);
            let rz = position_random(seed, chunk_x, chunk_z, base_salt.wrapping_add(2));
            let x = ((rx * CHUNK_SIZE_X as f64) as usize).min(CHUNK_SIZE_X - 1);
            let z = ((rz * CHUNK_SIZE_Z as f64) as usize).min(CHUNK_SIZE_Z - 1);

            let y = (ore.peak_y as f64
                + gaussian(seed, chunk_x, chunk_z, base_salt.wrapping_add(3)) * ore.y_spread)
                .round() as i64;
            let y = y.clamp(ore.min_y, ore.max_y);
            if y < view.min_y() || y > view.max_y() {
                continue;
            }

            let origin = VoxelPos::new(chunk_min_x + x as i64, y, chunk_min_z + z as i64);
            if grow_vein(view, ore, seed, origin, base_salt) > 0 {
                placed_origins.push(OrePosition {
                    block: ore.block,
                    position: origin,
                });
            }
        }
    }
    placed_origins
}

/// BFS blob growth from the origin; replaces only listed blocks, capped at
/// `vein_size`, with acceptance probability `0.7 − 0.3·(placed/vein_size)`.
fn grow_vein(
    view: &mut SubChunkView<'_>,
    ore: &OreSettings,
    seed: u64,
    origin: VoxelPos,
    salt: u64,
) -> u32 {
    let mut frontier = vec![origin];
    let mut visited: FxHashSet<VoxelPos> = FxHashSet::default();
    visited.insert(origin);
    let mut placed = 0u32;
    let mut cursor = 0usize;

    while cursor < frontier.len() && placed < ore.vein_size {
        let pos = frontier[cursor];
        cursor += 1;

        let Some((lx, lz)) = view.world_to_local_xz(pos.x, pos.z) else {
            continue;
        };
        if pos.y < view.min_y() || pos.y > view.max_y() {
            continue;
        }
        let current = view.get(lx, pos.y, lz);
        if !ore.replaceable.contains(&current) {
            continue;
        }
        view.set(lx, pos.y, lz, ore.block);
        placed += 1;

        let accept = 0.7 - 0.3 * (placed as f64 / ore.vein_size as f64);
        for (i, (dx, dy, dz)) in [
            (1i64, 0i64, 0i64),
            (-1, 0, 0),
            (0, 1, 0),
            (0, -1, 0),
            (0, 0, 1),
            (0, 0, -1),
        ]
        .iter()
        .enumerate()
        {
            let next = pos.offset(*dx, *dy, *dz);
            if visited.contains(&next) {
                continue;
            }
            let roll = position_random(
                seed,
                next.x,
                next.z,
                salt.wrapping_add(next.y as u64 * 6 + i as u64),
            );
            if roll < accept {
                visited.insert(next);
                frontier.push(next);
            }
        }
    }
    placed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SUB_CHUNK_VOLUME;

    fn stone_view(blocks: &mut Vec<u16>, chunk_x: i64, chunk_z: i64) -> SubChunkView<'_> {
        blocks.iter_mut().for_each(|b| *b = BlockId::STONE.0);
        SubChunkView::new(blocks, 0).with_chunk_origin(chunk_x * 32, chunk_z * 32)
    }

    fn coal() -> OreSettings {
        OreSettings {
            block: BlockId::COAL_ORE,
            frequency: 10,
            vein_size: 12,
            peak_y: 32,
            y_spread: 12.0,
            min_y: 1,
            max_y: 63,
            replaceable: vec![BlockId::STONE],
            salt: 55,
        }
    }

    #[test]
    fn veins_are_deterministic() {
        let mut a = vec![0u16; SUB_CHUNK_VOLUME];
        let mut b = vec![0u16; SUB_CHUNK_VOLUME];
        {
            let mut view = stone_view(&mut a, 3, -2);
            place_ores(&mut view, &[coal()], 42, 3, -2);
        }
        {
            let mut view = stone_view(&mut b, 3, -2);
            place_ores(&mut view, &[coal()], 42, 3, -2);
        }
        assert_eq!(a, b);
        let coal_blocks = a.iter().filter(|&&b| b == BlockId::COAL_ORE.0).count();
        assert!(coal_blocks > 0, "coal must actually place at this seed");
    }

    #[test]
    fn veins_replace_only_listed_blocks() {
        let mut blocks = vec![BlockId::DIRT.0; SUB_CHUNK_VOLUME];
        let mut view = SubChunkView::new(&mut blocks, 0);
        let placed = place_ores(&mut view, &[coal()], 42, 0, 0);
        assert!(placed.is_empty());
        assert!(blocks.iter().all(|&b| b == BlockId::DIRT.0));
    }

    #[test]
    fn vein_respects_size_cap() {
        let mut blocks = vec![0u16; SUB_CHUNK_VOLUME];
        let mut view = stone_view(&mut blocks, 0, 0);
        let ore = coal();
        place_ores(&mut view, &[ore.clone()], 7, 0, 0);
        // No single attempt can have produced more than vein_size blocks,
        // so the total is bounded by frequency × vein_size.
        let count = blocks
            .iter()
            .filter(|&&b| b == BlockId::COAL_ORE.0)
            .count() as u32;
        assert!(count <= ore.frequency * ore.vein_size);
    }
}
