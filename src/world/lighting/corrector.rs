//! Background lighting manager: revisits columns to correct lighting that
//! per-sub-chunk generation got wrong, propagates light across column
//! edges, and fast-paths block-edit relighting.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rand::Rng;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::constants::SUB_CHUNK_COUNT;
use crate::world::core::{BlockRegistry, ColumnPos, FaceDirection, SubChunkPos};
use crate::world::generation::noise::position_random;
use crate::world::lighting::skylight::{propagate_from_neighbor, HorizontalDir};
use crate::world::lighting::worker::{
    ColumnLightEntry, LightingJob, LightingJobKind, LightingResult,
};
use crate::world::storage::ChunkManager;
use crate::workers::WorkerPool;

const JITTER_SALT: u64 = 9107;

#[derive(Debug, Clone)]
pub struct LightingCorrectorConfig {
    /// Columns farther than this (in chunks) from the player are skipped.
    pub max_distance: f64,
    /// Within this distance the short cooldown applies.
    pub nearby_distance: f64,
    pub reprocess_cooldown: Duration,
    pub nearby_reprocess_cooldown: Duration,
    /// Correction dispatch attempts per tick.
    pub columns_per_update: usize,
    /// Edge-propagation columns drained per tick.
    pub edge_columns_per_update: usize,
}

impl Default for LightingCorrectorConfig {
    fn default() -> Self {
        Self {
            max_distance: 12.0,
            nearby_distance: 3.0,
            reprocess_cooldown: Duration::from_secs(20),
            nearby_reprocess_cooldown: Duration::from_secs(5),
            columns_per_update: 1,
            edge_columns_per_update: 5,
        }
    }
}

/// A block edit waiting for an idle lighting worker.
#[derive(Debug, Clone, Copy)]
struct PendingBlockChange {
    column: ColumnPos,
    local_x: usize,
    global_y: i64,
    local_z: usize,
    was_removed: bool,
}

#[derive(Debug)]
pub struct LightingCorrector {
    config: LightingCorrectorConfig,
    seed: u64,
    active: Vec<ColumnPos>,
    active_set: FxHashSet<ColumnPos>,
    pending_add: VecDeque<ColumnPos>,
    pending_add_set: FxHashSet<ColumnPos>,
    pending_jobs: FxHashSet<ColumnPos>,
    last_processed: FxHashMap<ColumnPos, Instant>,
    edge_queue: VecDeque<ColumnPos>,
    edge_set: FxHashSet<ColumnPos>,
    block_changes: VecDeque<PendingBlockChange>,
}

impl LightingCorrector {
    pub fn new(config: LightingCorrectorConfig, seed: u64) -> Self {
        Self {
            config,
            seed,
            active: Vec::new(),
            active_set: FxHashSet::default(),
            pending_add: VecDeque::new(),
            pending_add_set: FxHashSet::default(),
            pending_jobs: FxHashSet::default(),
            last_processed: FxHashMap::default(),
            edge_queue: VecDeque::new(),
            edge_set: FxHashSet::default(),
            block_changes: VecDeque::new(),
        }
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    /// Queue a column for eventual correction. At most one queued column is
    /// promoted to the active set per tick.
    pub fn enqueue_column(&mut self, column: ColumnPos) {
        if self.active_set.contains(&column) || self.pending_add_set.contains(&column) {
            return;
        }
        self.pending_add.push_back(column);
        self.pending_add_set.insert(column);
    }

    /// Queue a column for the cheap cross-edge light pass.
    pub fn enqueue_edge(&mut self, column: ColumnPos) {
        if self.edge_set.insert(column) {
            self.edge_queue.push_back(column);
        }
    }

    /// High-priority fast path for a block edit.
    pub fn queue_block_change(
        &mut self,
        column: ColumnPos,
        local_x: usize,
        global_y: i64,
        local_z: usize,
        was_removed: bool,
    ) {
        self.block_changes.push_back(PendingBlockChange {
            column,
            local_x,
            global_y,
            local_z,
            was_removed,
        });
    }

    /// One tick of background work. Returns sub-chunks needing remesh from
    /// the edge pass.
    pub fn update(
        &mut self,
        chunks: &mut ChunkManager,
        registry: &BlockRegistry,
        pool: &mut WorkerPool<LightingJob, LightingResult>,
        player_column: ColumnPos,
        now: Instant,
    ) -> Vec<SubChunkPos> {
        self.flush_block_changes(chunks, pool);
        self.promote_pending();
        let remesh = self.edge_propagation_pass(chunks, registry);
        self.dispatch_corrections(chunks, pool, player_column, now);
        remesh
    }

    fn promote_pending(&mut self) {
        if let Some(column) = self.pending_add.pop_front() {
            self.pending_add_set.remove(&column);
            if self.active_set.insert(column) {
                self.active.push(column);
            }
        }
    }

    /// Block-edit jobs preempt everything else on the pool.
    fn flush_block_changes(
        &mut self,
        chunks: &mut ChunkManager,
        pool: &mut WorkerPool<LightingJob, LightingResult>,
    ) {
        while let Some(change) = self.block_changes.front().copied() {
            if !pool.has_idle_worker() {
                break;
            }
            self.block_changes.pop_front();
            let Some(entries) = serialize_column(chunks, change.column) else {
                continue; // column unloaded since the edit
            };
            let job = LightingJob::UpdateBlockLighting {
                column: change.column,
                entries,
                local_x: change.local_x,
                global_y: change.global_y,
                local_z: change.local_z,
                was_removed: change.was_removed,
            };
            if pool.dispatch_idle(job).is_err() {
                // Raced with another dispatcher; retry next tick.
                self.block_changes.push_front(change);
                break;
            }
        }
    }

    /// Main-thread pass transferring skylight across the shared vertical
    /// faces of adjacent columns. Changed sub-chunks are remeshed and their
    /// columns' neighbors revisited.
    fn edge_propagation_pass(
        &mut self,
        chunks: &mut ChunkManager,
        registry: &BlockRegistry,
    ) -> Vec<SubChunkPos> {
        let mut remesh = Vec::new();
        for _ in 0..self.config.edge_columns_per_update {
            let Some(column) = self.edge_queue.pop_front() else {
                break;
            };
            self.edge_set.remove(&column);
            if !chunks.contains(column) {
                continue;
            }
            let mut any_changed = false;
            for (dir, hdir) in [
                (FaceDirection::PosX, HorizontalDir::PosX),
                (FaceDirection::NegX, HorizontalDir::NegX),
                (FaceDirection::PosZ, HorizontalDir::PosZ),
                (FaceDirection::NegZ, HorizontalDir::NegZ),
            ] {
                let (dx, _, dz) = dir.offset();
                let source_pos = column.offset(dx, dz);
                for sub_y in 0..SUB_CHUNK_COUNT {
                    // Copy the source face first; the target borrow below
                    // must be exclusive.
                    let face = chunks.get(source_pos).and_then(|source| {
                        source
                            .sub_chunk(sub_y)
                            .map(|sub| sub.boundary_light(dir.opposite()))
                    });
                    let Some(face) = face else {
                        continue;
                    };
                    let Some(target_col) = chunks.get_mut(column) else {
                        break;
                    };
                    let Some(target) = target_col.sub_chunk_mut(sub_y) else {
                        continue;
                    };
                    let (blocks, light) = target.buffers_split_mut();
                    if propagate_from_neighbor(blocks, light, registry, hdir, &face) {
                        any_changed = true;
                        remesh.push(SubChunkPos::from_column(column, sub_y as u8));
                    }
                }
            }
            if any_changed {
                for neighbor in column.neighbors() {
                    if chunks.contains(neighbor) {
                        self.enqueue_edge(neighbor);
                    }
                }
            }
        }
        remesh
    }

    /// Sample the active queue and dispatch column corrections to idle
    /// workers, honoring distance and cooldown rules.
    fn dispatch_corrections(
        &mut self,
        chunks: &mut ChunkManager,
        pool: &mut WorkerPool<LightingJob, LightingResult>,
        player_column: ColumnPos,
        now: Instant,
    ) {
        let mut rng = rand::thread_rng();
        for _ in 0..self.config.columns_per_update {
            if self.active.is_empty() {
                break;
            }
            // Random sampling avoids positional bias from insertion order.
            let index = rng.gen_range(0..self.active.len());
            let column = self.active[index];

            if !chunks.contains(column) {
                self.active.swap_remove(index);
                self.active_set.remove(&column);
                continue;
            }
            let distance = column.distance_to(player_column);
            if distance > self.config.max_distance {
                continue;
            }
            if self.pending_jobs.contains(&column) {
                continue;
            }
            if let Some(&stamp) = self.last_processed.get(&column) {
                let cooldown = if distance <= self.config.nearby_distance {
                    self.config.nearby_reprocess_cooldown
                } else {
                    // 0–50% deterministic jitter spreads far columns out.
                    let jitter =
                        position_random(self.seed, column.x, column.z, JITTER_SALT) * 0.5;
                    self.config.reprocess_cooldown.mul_f64(1.0 + jitter)
                };
                if now.duration_since(stamp) < cooldown {
                    continue;
                }
            }
            if !pool.has_idle_worker() {
                break; // retry next tick
            }
            let Some(entries) = serialize_column(chunks, column) else {
                continue;
            };
            if entries.is_empty() {
                continue;
            }
            let job = LightingJob::RecalculateColumn { column, entries };
            if pool.dispatch_idle(job).is_ok() {
                self.pending_jobs.insert(column);
                self.active.swap_remove(index);
                self.active_set.remove(&column);
            } else {
                break;
            }
        }
    }

    /// Apply one worker result. Returns sub-chunks needing remesh.
    pub fn on_result(
        &mut self,
        result: LightingResult,
        chunks: &mut ChunkManager,
        now: Instant,
    ) -> Vec<SubChunkPos> {
        match result {
            LightingResult::Completed {
                column,
                kind,
                updated,
            } => {
                self.pending_jobs.remove(&column);
                let mut remesh = Vec::new();
                if let Some(col) = chunks.get_mut(column) {
                    for sub_light in &updated {
                        if !sub_light.changed {
                            continue;
                        }
                        if let Some(sub) = col.sub_chunk_mut(sub_light.sub_y) {
                            let light = sub.light_mut();
                            for &(idx, value) in &sub_light.diffs {
                                light[idx as usize] = value;
                            }
                        }
                        remesh.push(SubChunkPos::from_column(column, sub_light.sub_y as u8));
                    }
                } else {
                    return Vec::new(); // unloaded while the job ran
                }
                if kind == LightingJobKind::Correction {
                    self.last_processed.insert(column, now);
                    // Corrected columns cycle back for their next visit and
                    // seed the edge pass outward.
                    if self.active_set.insert(column) {
                        self.active.push(column);
                    }
                    self.enqueue_edge(column);
                    for neighbor in column.neighbors() {
                        if chunks.contains(neighbor) {
                            self.enqueue_edge(neighbor);
                        }
                    }
                }
                remesh
            }
            LightingResult::Failed { column, message } => {
                log::warn!(
                    "[LightingCorrector] job for column ({}, {}) failed: {}",
                    column.x,
                    column.z,
                    message
                );
                self.pending_jobs.remove(&column);
                // Back into the active set without a timestamp update, so
                // the cooldown cycle can retry it later.
                if chunks.contains(column) && self.active_set.insert(column) {
                    self.active.push(column);
                }
                Vec::new()
            }
        }
    }

    /// Drop every reference to an unloaded column.
    pub fn purge_column(&mut self, column: ColumnPos) {
        if self.active_set.remove(&column) {
            self.active.retain(|&c| c != column);
        }
        if self.pending_add_set.remove(&column) {
            self.pending_add.retain(|&c| c != column);
        }
        if self.edge_set.remove(&column) {
            self.edge_queue.retain(|&c| c != column);
        }
        self.pending_jobs.remove(&column);
        self.last_processed.remove(&column);
        self.block_changes.retain(|c| c.column != column);
    }

    pub fn clear(&mut self) {
        self.active.clear();
        self.active_set.clear();
        self.pending_add.clear();
        self.pending_add_set.clear();
        self.pending_jobs.clear();
        self.last_processed.clear();
        self.edge_queue.clear();
        self.edge_set.clear();
        self.block_changes.clear();
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn has_pending_jobs(&self) -> bool {
        !self.pending_jobs.is_empty()
    }
}

/// Copy every existing sub-chunk of a column for a lighting job payload.
fn serialize_column(chunks: &mut ChunkManager, column: ColumnPos) -> Option<Vec<ColumnLightEntry>> {
    let col = chunks.get(column)?;
    Some(
        col.iter_sub_chunks()
            .map(|sub| {
                let (blocks, light) = sub.clone_buffers();
                ColumnLightEntry {
                    sub_y: sub.position().sub_y as usize,
                    blocks,
                    light,
                }
            })
            .collect(),
    )
}
