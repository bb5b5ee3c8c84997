//! Mesh scheduler: priority and background remesh queues, a single
//! in-flight job per sub-chunk, and throttled result application.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::meshing::greedy::{MeshJob, MeshResult, NeighborLayers};
use crate::meshing::mesh::SubChunkMesh;
use crate::world::core::{FaceDirection, SubChunkPos};
use crate::world::storage::{ChunkManager, SubChunkState};
use crate::workers::WorkerPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshPriority {
    High,
    Normal,
}

#[derive(Debug, Clone)]
pub struct MeshSchedulerConfig {
    /// Background dispatches allowed per tick.
    pub background_per_tick: usize,
    /// Results applied per tick (bounds GPU upload spikes downstream).
    pub applies_per_tick: usize,
}

impl Default for MeshSchedulerConfig {
    fn default() -> Self {
        Self {
            background_per_tick: 2,
            applies_per_tick: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    Sent,
    Skipped,
    PoolFull,
}

/// What happened to one applied result.
#[derive(Debug)]
pub enum MeshApplied {
    /// New mesh for this sub-chunk.
    Replaced(SubChunkPos, Box<SubChunkMesh>),
    /// The owning column is gone; result dropped.
    Discarded(SubChunkPos),
}

#[derive(Debug, Default)]
pub struct MeshScheduler {
    config: MeshSchedulerConfig,
    priority: VecDeque<SubChunkPos>,
    priority_set: FxHashSet<SubChunkPos>,
    background: VecDeque<SubChunkPos>,
    background_set: FxHashSet<SubChunkPos>,
    /// Sub-chunks with a job in flight; at most one job per sub-chunk.
    pending: FxHashSet<SubChunkPos>,
    /// Sub-chunks whose data changed while their job was in flight.
    pending_remesh: FxHashSet<SubChunkPos>,
    /// Buffered worker results awaiting throttled application.
    results: VecDeque<MeshResult>,
}

impl MeshScheduler {
    pub fn new(config: MeshSchedulerConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Queue a sub-chunk for (re)meshing.
    ///
    /// `force_requeue` pulls the key out of both queues first, and marks a
    /// follow-up rebuild when a job is already in flight — never a second
    /// concurrent job.
    pub fn queue_for_meshing(
        &mut self,
        position: SubChunkPos,
        priority: MeshPriority,
        force_requeue: bool,
    ) {
        if force_requeue {
            if self.priority_set.remove(&position) {
                self.priority.retain(|&p| p != position);
            }
            if self.background_set.remove(&position) {
                self.background.retain(|&p| p != position);
            }
        }
        if self.pending.contains(&position) {
            if force_requeue {
                self.pending_remesh.insert(position);
            }
            return;
        }
        match priority {
            MeshPriority::High => {
                // A promotion must not leave the key queued twice.
                if self.background_set.remove(&position) {
                    self.background.retain(|&p| p != position);
                }
                if self.priority_set.insert(position) {
                    self.priority.push_back(position);
                }
            }
            MeshPriority::Normal => {
                if !self.priority_set.contains(&position) && self.background_set.insert(position) {
                    self.background.push_back(position);
                }
            }
        }
    }

    /// Dispatch queued work to idle mesh workers: the priority queue
    /// drains first, then a bounded number of background entries.
    pub fn dispatch(
        &mut self,
        chunks: &mut ChunkManager,
        pool: &mut WorkerPool<MeshJob, MeshResult>,
    ) {
        while pool.has_idle_worker() {
            let Some(position) = self.priority.pop_front() else {
                break;
            };
            self.priority_set.remove(&position);
            if self.dispatch_one(position, chunks, pool) == Dispatch::PoolFull {
                break;
            }
        }
        let mut background_dispatched = 0;
        while pool.has_idle_worker() && background_dispatched < self.config.background_per_tick {
            let Some(position) = self.background.pop_front() else {
                break;
            };
            self.background_set.remove(&position);
            match self.dispatch_one(position, chunks, pool) {
                Dispatch::Sent => background_dispatched += 1,
                Dispatch::Skipped => {}
                Dispatch::PoolFull => break,
            }
        }
    }

    fn dispatch_one(
        &mut self,
        position: SubChunkPos,
        chunks: &mut ChunkManager,
        pool: &mut WorkerPool<MeshJob, MeshResult>,
    ) -> Dispatch {
        if self.pending.contains(&position) {
            // One job in flight per sub-chunk; the late update becomes a
            // follow-up rebuild when the running job completes.
            self.pending_remesh.insert(position);
            return Dispatch::Skipped;
        }
        let Some(job) = build_mesh_job(chunks, position) else {
            return Dispatch::Skipped; // column or sub-chunk no longer loaded
        };
        if let Some(col) = chunks.get_mut(position.column) {
            if let Some(sub) = col.sub_chunk_mut(position.sub_y as usize) {
                sub.set_state(SubChunkState::Meshing);
            }
        }
        match pool.dispatch_idle(job) {
            Ok(()) => {
                self.pending.insert(position);
                Dispatch::Sent
            }
            Err(_) => {
                // Pool filled up mid-loop; requeue at the front for next tick.
                self.priority.push_front(position);
                self.priority_set.insert(position);
                Dispatch::PoolFull
            }
        }
    }

    /// Move finished worker results into the apply buffer.
    pub fn collect_results(&mut self, pool: &mut WorkerPool<MeshJob, MeshResult>) {
        while let Some(result) = pool.try_recv() {
            self.results.push_back(result);
        }
    }

    /// Apply up to the configured number of buffered results. Sub-chunks
    /// flagged for remesh while in flight are immediately re-queued at
    /// high priority, so exactly one follow-up rebuild happens.
    pub fn apply_results(&mut self, chunks: &mut ChunkManager) -> Vec<MeshApplied> {
        let mut applied = Vec::new();
        for _ in 0..self.config.applies_per_tick {
            let Some(result) = self.results.pop_front() else {
                break;
            };
            match result {
                MeshResult::Completed { position, mesh } => {
                    self.pending.remove(&position);
                    let needs_remesh = self.pending_remesh.remove(&position);
                    let loaded = chunks
                        .get(position.column)
                        .and_then(|c| c.sub_chunk(position.sub_y as usize))
                        .is_some();
                    if !loaded {
                        applied.push(MeshApplied::Discarded(position));
                        continue;
                    }
                    if let Some(col) = chunks.get_mut(position.column) {
                        if let Some(sub) = col.sub_chunk_mut(position.sub_y as usize) {
                            sub.mark_meshed();
                        }
                    }
                    applied.push(MeshApplied::Replaced(position, mesh));
                    if needs_remesh {
                        self.queue_for_meshing(position, MeshPriority::High, false);
                    }
                }
                MeshResult::Failed { position, message } => {
                    log::warn!(
                        "[MeshScheduler] mesh job for ({}, {}, sub {}) failed: {}",
                        position.column.x,
                        position.column.z,
                        position.sub_y,
                        message
                    );
                    self.pending.remove(&position);
                    self.pending_remesh.remove(&position);
                }
            }
        }
        applied
    }

    /// Drop every reference to a sub-chunk (column unload).
    pub fn purge(&mut self, position: SubChunkPos) {
        if self.priority_set.remove(&position) {
            self.priority.retain(|&p| p != position);
        }
        if self.background_set.remove(&position) {
            self.background.retain(|&p| p != position);
        }
        self.pending.remove(&position);
        self.pending_remesh.remove(&position);
    }

    pub fn clear(&mut self) {
        self.priority.clear();
        self.priority_set.clear();
        self.background.clear();
        self.background_set.clear();
        self.pending.clear();
        self.pending_remesh.clear();
        self.results.clear();
    }

    pub fn queued_len(&self) -> usize {
        self.priority.len() + self.background.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn buffered_results(&self) -> usize {
        self.results.len()
    }
}

/// Assemble a mesh job payload: copies of the target's buffers plus the
/// boundary layers of its six neighbors where they exist.
pub fn build_mesh_job(chunks: &ChunkManager, position: SubChunkPos) -> Option<MeshJob> {
    let column = chunks.get(position.column)?;
    let sub = column.sub_chunk(position.sub_y as usize)?;
    let (blocks, light) = sub.clone_buffers();

    let mut neighbors = NeighborLayers::default();
    for face in FaceDirection::ALL {
        let source = match face {
            FaceDirection::PosY | FaceDirection::NegY => {
                let slot = if face == FaceDirection::PosY {
                    position.above()
                } else {
                    position.below()
                };
                slot.and_then(|p| column.sub_chunk(p.sub_y as usize))
            }
            _ => {
                let (dx, _, dz) = face.offset();
                chunks
                    .get(position.column.offset(dx, dz))
                    .and_then(|c| c.sub_chunk(position.sub_y as usize))
            }
        };
        if let Some(source) = source {
            let facing = face.opposite();
            neighbors.blocks[face.index()] = Some(source.boundary_blocks(facing));
            neighbors.light[face.index()] = Some(source.boundary_light(facing));
        }
    }

    Some(MeshJob {
        position,
        blocks,
        light,
        neighbors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::core::{BlockId, ColumnPos};

    fn pos(sub_y: u8) -> SubChunkPos {
        SubChunkPos::new(0, 0, sub_y)
    }

    #[test]
    fn duplicate_queueing_is_deduped() {
        let mut sched = MeshScheduler::new(MeshSchedulerConfig::default());
        sched.queue_for_meshing(pos(0), MeshPriority::Normal, false);
        sched.queue_for_meshing(pos(0), MeshPriority::Normal, false);
        assert_eq!(sched.queued_len(), 1);
    }

    #[test]
    fn pending_sub_chunk_is_not_requeued_without_force() {
        let mut sched = MeshScheduler::new(MeshSchedulerConfig::default());
        sched.pending.insert(pos(0));
        sched.queue_for_meshing(pos(0), MeshPriority::High, false);
        assert_eq!(sched.queued_len(), 0);
        assert!(!sched.pending_remesh.contains(&pos(0)));
        sched.queue_for_meshing(pos(0), MeshPriority::High, true);
        assert_eq!(sched.queued_len(), 0);
        assert!(sched.pending_remesh.contains(&pos(0)));
    }

    #[test]
    fn promotion_to_high_leaves_no_background_duplicate() {
        let mut sched = MeshScheduler::new(MeshSchedulerConfig::default());
        sched.queue_for_meshing(pos(0), MeshPriority::Normal, false);
        sched.queue_for_meshing(pos(0), MeshPriority::High, false);
        assert_eq!(sched.priority.len(), 1);
        assert_eq!(sched.background.len(), 0);
        assert!(!sched.background_set.contains(&pos(0)));
    }

    #[test]
    fn force_requeue_moves_between_queues() {
        let mut sched = MeshScheduler::new(MeshSchedulerConfig::default());
        sched.queue_for_meshing(pos(1), MeshPriority::Normal, false);
        sched.queue_for_meshing(pos(1), MeshPriority::High, true);
        assert_eq!(sched.priority.len(), 1);
        assert_eq!(sched.background.len(), 0);
    }

    #[test]
    fn completed_result_for_unloaded_column_is_discarded() {
        let mut sched = MeshScheduler::new(MeshSchedulerConfig::default());
        let mut chunks = ChunkManager::new(4);
        sched.pending.insert(pos(0));
        sched.results.push_back(MeshResult::Completed {
            position: pos(0),
            mesh: Box::new(SubChunkMesh::default()),
        });
        let applied = sched.apply_results(&mut chunks);
        assert!(matches!(applied.as_slice(), [MeshApplied::Discarded(_)]));
        assert_eq!(sched.pending_len(), 0);
    }

    #[test]
    fn pending_remesh_requeues_after_apply() {
        let mut sched = MeshScheduler::new(MeshSchedulerConfig::default());
        let mut chunks = ChunkManager::new(4);
        {
            let (col, _) = chunks.load_column(ColumnPos::new(0, 0));
            col.sub_chunk_or_create(0).set_block(0, 0, 0, BlockId::STONE);
        }
        sched.pending.insert(pos(0));
        sched.pending_remesh.insert(pos(0));
        sched.results.push_back(MeshResult::Completed {
            position: pos(0),
            mesh: Box::new(SubChunkMesh::default()),
        });
        let applied = sched.apply_results(&mut chunks);
        assert!(matches!(applied.as_slice(), [MeshApplied::Replaced(_, _)]));
        // The missed update turned into exactly one high-priority requeue.
        assert_eq!(sched.priority.len(), 1);
        assert!(sched.pending_remesh.is_empty());
    }

    #[test]
    fn apply_throttle_limits_per_tick() {
        let mut sched = MeshScheduler::new(MeshSchedulerConfig {
            background_per_tick: 2,
            applies_per_tick: 2,
        });
        let mut chunks = ChunkManager::new(4);
        for sub_y in 0..5 {
            sched.results.push_back(MeshResult::Completed {
                position: pos(sub_y),
                mesh: Box::new(SubChunkMesh::default()),
            });
        }
        assert_eq!(sched.apply_results(&mut chunks).len(), 2);
        assert_eq!(sched.buffered_results(), 3);
    }

    #[test]
    fn failed_result_clears_tracking() {
        let mut sched = MeshScheduler::new(MeshSchedulerConfig::default());
        let mut chunks = ChunkManager::new(4);
        sched.pending.insert(pos(2));
        sched.pending_remesh.insert(pos(2));
        sched.results.push_back(MeshResult::Failed {
            position: pos(2),
            message: "boom".into(),
        });
        let applied = sched.apply_results(&mut chunks);
        assert!(applied.is_empty());
        assert_eq!(sched.pending_len(), 0);
        assert!(sched.pending_remesh.is_empty());
    }
}
