//! Column-scope lighting jobs executed on the lighting worker pool.
//!
//! Jobs carry copies of each existing sub-chunk's block and light buffers;
//! results carry per-cell diffs against that snapshot, so applying a result
//! can never clobber a concurrent fast-path update that touched other
//! cells.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::constants::{SUB_CHUNK_COUNT, SUB_CHUNK_HEIGHT, WORLD_HEIGHT};
use crate::world::core::{local_index, BlockId, BlockRegistry, ColumnPos};
use crate::world::lighting::skylight::{
    bottom_boundary_light, flood, propagate_from_above, propagate_sub_chunk, rebuild_blocklight,
};

/// Snapshot of one sub-chunk shipped into a lighting job.
#[derive(Debug)]
pub struct ColumnLightEntry {
    pub sub_y: usize,
    pub blocks: Vec<u16>,
    pub light: Vec<u8>,
}

/// Whether a result came from the background corrector or the block-edit
/// fast path; the manager stamps cooldowns only for corrections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightingJobKind {
    Correction,
    BlockEdit,
}

#[derive(Debug)]
pub enum LightingJob {
    RecalculateColumn {
        column: ColumnPos,
        entries: Vec<ColumnLightEntry>,
    },
    UpdateBlockLighting {
        column: ColumnPos,
        entries: Vec<ColumnLightEntry>,
        local_x: usize,
        global_y: i64,
        local_z: usize,
        was_removed: bool,
    },
}

impl LightingJob {
    pub fn column(&self) -> ColumnPos {
        match self {
            LightingJob::RecalculateColumn { column, .. } => *column,
            LightingJob::UpdateBlockLighting { column, .. } => *column,
        }
    }
}

/// Post-job light state of one sub-chunk: the cells that differ from the
/// snapshot, plus a remesh flag.
#[derive(Debug)]
pub struct UpdatedSubLight {
    pub sub_y: usize,
    pub diffs: Vec<(u32, u8)>,
    pub changed: bool,
}

#[derive(Debug)]
pub enum LightingResult {
    Completed {
        column: ColumnPos,
        kind: LightingJobKind,
        updated: Vec<UpdatedSubLight>,
    },
    Failed {
        column: ColumnPos,
        message: String,
    },
}

/// Entry point the lighting worker pool runs.
pub fn run_lighting_job(job: LightingJob, registry: &Arc<BlockRegistry>) -> LightingResult {
    let column = job.column();
    let outcome = catch_unwind(AssertUnwindSafe(|| match job {
        LightingJob::RecalculateColumn { column, mut entries } => {
            let updated = recalculate_column(&mut entries, registry);
            (column, LightingJobKind::Correction, updated)
        }
        LightingJob::UpdateBlockLighting {
            column,
            mut entries,
            local_x,
            global_y,
            local_z,
            was_removed,
        } => {
            let updated =
                update_block_lighting(&mut entries, registry, local_x, global_y, local_z, was_removed);
            (column, LightingJobKind::BlockEdit, updated)
        }
    }));
    match outcome {
        Ok((column, kind, updated)) => LightingResult::Completed {
            column,
            kind,
            updated,
        },
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "lighting worker panicked".to_string());
            LightingResult::Failed { column, message }
        }
    }
}

/// Full column relight: sub-chunks visited top-down with the bottom
/// boundary of each fed to the next, then a second top-down pass so
/// flood-raised bottom layers reach the sub-chunks below them, then a
/// blocklight rebuild.
pub fn recalculate_column(
    entries: &mut [ColumnLightEntry],
    registry: &BlockRegistry,
) -> Vec<UpdatedSubLight> {
    entries.sort_by(|a, b| b.sub_y.cmp(&a.sub_y));
    let snapshots: Vec<Vec<u8>> = entries.iter().map(|e| e.light.clone()).collect();

    // Pass 1: init + flood, chaining boundaries downward. Gaps between
    // present sub-chunks are all air, which passes skylight unchanged.
    let mut above: Option<Vec<u8>> = None;
    for entry in entries.iter_mut() {
        propagate_sub_chunk(&entry.blocks, &mut entry.light, registry, above.as_deref());
        above = Some(bottom_boundary_light(&entry.light));
    }

    // Pass 2: the horizontal floods of pass 1 can raise a sub-chunk's
    // bottom layer after its boundary was already handed down; push those
    // corrections through.
    let mut above: Option<Vec<u8>> = None;
    for entry in entries.iter_mut() {
        if let Some(layer) = above.as_deref() {
            propagate_from_above(&entry.blocks, &mut entry.light, registry, layer);
        }
        above = Some(bottom_boundary_light(&entry.light));
    }

    for entry in entries.iter_mut() {
        rebuild_blocklight(&entry.blocks, &mut entry.light, registry);
    }

    entries
        .iter()
        .zip(snapshots.iter())
        .map(|(entry, snapshot)| diff_entry(entry, snapshot, false))
        .collect()
}

/// Incremental repair after one block edit, per the removal/placement
/// rules. Only the edited cell's sub-chunk is flooded here; neighbor
/// sub-chunks pick up corrections from the background pass. The edited
/// sub-chunk is always reported changed (its block data changed), as are
/// Y-adjacent sub-chunks when the edit sits on a sub-chunk boundary.
pub fn update_block_lighting(
    entries: &mut [ColumnLightEntry],
    registry: &BlockRegistry,
    local_x: usize,
    global_y: i64,
    local_z: usize,
    was_removed: bool,
) -> Vec<UpdatedSubLight> {
    entries.sort_by(|a, b| b.sub_y.cmp(&a.sub_y));
    let snapshots: Vec<Vec<u8>> = entries.iter().map(|e| e.light.clone()).collect();

    let sub_y = (global_y.max(0) as usize / SUB_CHUNK_HEIGHT).min(SUB_CHUNK_COUNT - 1);
    let local_y = global_y.max(0) as usize % SUB_CHUNK_HEIGHT;

    if was_removed {
        repair_after_removal(entries, registry, local_x, global_y, local_z);
    } else {
        repair_after_placement(entries, registry, local_x, global_y, local_z);
    }

    if let Some(i) = entry_index(entries, sub_y) {
        let entry = &mut entries[i];
        rebuild_blocklight(&entry.blocks, &mut entry.light, registry);
    }

    let mut force_changed = vec![sub_y];
    if local_y == 0 && sub_y > 0 {
        force_changed.push(sub_y - 1);
    }
    if local_y == SUB_CHUNK_HEIGHT - 1 && sub_y + 1 < SUB_CHUNK_COUNT {
        force_changed.push(sub_y + 1);
    }

    entries
        .iter()
        .zip(snapshots.iter())
        .map(|(entry, snapshot)| {
            diff_entry(entry, snapshot, force_changed.contains(&entry.sub_y))
        })
        .collect()
}

/// True iff no opaque block sits at or above the given cell in the column
/// snapshot; missing sub-chunks read as transparent.
pub fn check_sky_access(
    entries: &[ColumnLightEntry],
    registry: &BlockRegistry,
    local_x: usize,
    global_y: i64,
    local_z: usize,
) -> bool {
    for y in global_y.max(0)..WORLD_HEIGHT as i64 {
        let sub_y = y as usize / SUB_CHUNK_HEIGHT;
        let Some(i) = entry_index(entries, sub_y) else {
            continue;
        };
        let idx = local_index(local_x, y as usize % SUB_CHUNK_HEIGHT, local_z);
        if registry.light_blocking(BlockId(entries[i].blocks[idx])) >= 15 {
            return false;
        }
    }
    true
}

fn repair_after_removal(
    entries: &mut [ColumnLightEntry],
    registry: &BlockRegistry,
    local_x: usize,
    global_y: i64,
    local_z: usize,
) {
    let sub_y = global_y as usize / SUB_CHUNK_HEIGHT;
    let local_y = global_y as usize % SUB_CHUNK_HEIGHT;

    let incoming = if check_sky_access(entries, registry, local_x, global_y, local_z) {
        15
    } else {
        let mut best = 0u8;
        for (dx, dy, dz) in [
            (1i64, 0i64, 0i64),
            (-1, 0, 0),
            (0, 1, 0),
            (0, -1, 0),
            (0, 0, 1),
            (0, 0, -1),
        ] {
            best = best.max(sky_at(
                entries,
                local_x as i64 + dx,
                global_y + dy,
                local_z as i64 + dz,
            ));
        }
        best.saturating_sub(1)
    };

    let Some(i) = entry_index(entries, sub_y) else {
        return;
    };
    let idx = local_index(local_x, local_y, local_z);
    let entry = &mut entries[i];
    entry.light[idx] = (entry.light[idx] & 0x0F) | (incoming.min(15) << 4);
    if incoming > 0 {
        flood(
            &entry.blocks,
            &mut entry.light,
            registry,
            vec![(idx, incoming * 2)],
        );
    }
}

fn repair_after_placement(
    entries: &mut [ColumnLightEntry],
    registry: &BlockRegistry,
    local_x: usize,
    global_y: i64,
    local_z: usize,
) {
    let placed = block_at(entries, local_x as i64, global_y, local_z as i64);
    let blocking = registry.light_blocking(placed);

    if blocking >= 15 {
        set_sky_at(entries, local_x, global_y, local_z, 0);

        // Darkness falls straight down through every non-opaque cell.
        let mut darkened = Vec::new();
        let mut y = global_y - 1;
        while y >= 0 {
            let below = block_at(entries, local_x as i64, y, local_z as i64);
            if registry.light_blocking(below) >= 15 {
                break;
            }
            if sky_at(entries, local_x as i64, y, local_z as i64) > 0 {
                set_sky_at(entries, local_x, y, local_z, 0);
                darkened.push(y);
            }
            y -= 1;
        }

        // Re-light the darkened run from its horizontal neighbors, then
        // flood each affected sub-chunk once.
        let mut seeds_by_sub: Vec<(usize, Vec<(usize, u8)>)> = Vec::new();
        for &dy in &darkened {
            let mut best = 0u8;
            for (dx, dz) in [(1i64, 0i64), (-1, 0), (0, 1), (0, -1)] {
                best = best.max(sky_at(entries, local_x as i64 + dx, dy, local_z as i64 + dz));
            }
            let relit = best.saturating_sub(1);
            if relit == 0 {
                continue;
            }
            set_sky_at(entries, local_x, dy, local_z, relit);
            let sub = dy as usize / SUB_CHUNK_HEIGHT;
            let idx = local_index(local_x, dy as usize % SUB_CHUNK_HEIGHT, local_z);
            match seeds_by_sub.iter_mut().find(|(s, _)| *s == sub) {
                Some((_, seeds)) => seeds.push((idx, relit * 2)),
                None => seeds_by_sub.push((sub, vec![(idx, relit * 2)])),
            }
        }
        for (sub, seeds) in seeds_by_sub {
            if let Some(i) = entry_index(entries, sub) {
                let entry = &mut entries[i];
                flood(&entry.blocks, &mut entry.light, registry, seeds);
            }
        }
    } else {
        // Partial blocker: recompute the cell from its brightest neighbor
        // and flood the correction outward.
        let mut best_internal = 0i16;
        for (dx, dy, dz) in [
            (1i64, 0i64, 0i64),
            (-1, 0, 0),
            (0, 1, 0),
            (0, -1, 0),
            (0, 0, 1),
            (0, 0, -1),
        ] {
            let s = sky_at(entries, local_x as i64 + dx, global_y + dy, local_z as i64 + dz);
            best_internal = best_internal.max(s as i16 * 2);
        }
        let internal = (best_internal - 1 - blocking as i16 * 2).max(0);
        let stored = (internal / 2) as u8;
        set_sky_at(entries, local_x, global_y, local_z, stored);
        let sub_y = global_y as usize / SUB_CHUNK_HEIGHT;
        if let Some(i) = entry_index(entries, sub_y) {
            let idx = local_index(local_x, global_y as usize % SUB_CHUNK_HEIGHT, local_z);
            let entry = &mut entries[i];
            if internal > 0 {
                flood(
                    &entry.blocks,
                    &mut entry.light,
                    registry,
                    vec![(idx, internal as u8)],
                );
            }
        }
    }
}

fn entry_index(entries: &[ColumnLightEntry], sub_y: usize) -> Option<usize> {
    entries.iter().position(|e| e.sub_y == sub_y)
}

fn block_at(entries: &[ColumnLightEntry], x: i64, y: i64, z: i64) -> BlockId {
    if !(0..crate::constants::CHUNK_SIZE_X as i64).contains(&x)
        || !(0..crate::constants::CHUNK_SIZE_Z as i64).contains(&z)
        || !(0..WORLD_HEIGHT as i64).contains(&y)
    {
        return BlockId::AIR;
    }
    let sub_y = y as usize / SUB_CHUNK_HEIGHT;
    match entry_index(entries, sub_y) {
        Some(i) => BlockId(
            entries[i].blocks[local_index(x as usize, y as usize % SUB_CHUNK_HEIGHT, z as usize)],
        ),
        None => BlockId::AIR,
    }
}

/// Stored skylight at a column-local position. Horizontal off-chunk reads
/// are 0 (conservative; the edge pass corrects them), missing sub-chunks
/// read as open sky.
fn sky_at(entries: &[ColumnLightEntry], x: i64, y: i64, z: i64) -> u8 {
    if !(0..crate::constants::CHUNK_SIZE_X as i64).contains(&x)
        || !(0..crate::constants::CHUNK_SIZE_Z as i64).contains(&z)
    {
        return 0;
    }
    if !(0..WORLD_HEIGHT as i64).contains(&y) {
        return 15;
    }
    let sub_y = y as usize / SUB_CHUNK_HEIGHT;
    match entry_index(entries, sub_y) {
        Some(i) => {
            entries[i].light[local_index(x as usize, y as usize % SUB_CHUNK_HEIGHT, z as usize)] >> 4
        }
        None => 15,
    }
}

fn set_sky_at(entries: &mut [ColumnLightEntry], x: usize, y: i64, z: usize, stored: u8) {
    if !(0..WORLD_HEIGHT as i64).contains(&y) {
        return;
    }
    let sub_y = y as usize / SUB_CHUNK_HEIGHT;
    if let Some(i) = entry_index(entries, sub_y) {
        let idx = local_index(x, y as usize % SUB_CHUNK_HEIGHT, z);
        let entry = &mut entries[i];
        entry.light[idx] = (entry.light[idx] & 0x0F) | (stored.min(15) << 4);
    }
}

fn diff_entry(entry: &ColumnLightEntry, snapshot: &[u8], force_changed: bool) -> UpdatedSubLight {
    let mut diffs = Vec::new();
    for (idx, (&new, &old)) in entry.light.iter().zip(snapshot.iter()).enumerate() {
        if new != old {
            diffs.push((idx as u32, new));
        }
    }
    let changed = force_changed || !diffs.is_empty();
    UpdatedSubLight {
        sub_y: entry.sub_y,
        diffs,
        changed,
    }
}
