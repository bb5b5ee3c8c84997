//! Generation scheduler: an ellipsoidal window of sub-chunks around the
//! player, ordered by distance, with bookkeeping for in-flight loads and
//! generation jobs, distance unloads, and cross-chunk water reprocessing.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::constants::SUB_CHUNK_COUNT;
use crate::world::core::{ColumnPos, FaceDirection, SubChunkPos};

#[derive(Debug, Clone)]
pub struct GenerationSchedulerConfig {
    /// Horizontal load radius, in chunks.
    pub chunk_distance: i64,
    /// Queue entries popped per tick.
    pub dispatches_per_tick: usize,
    /// Water reprocess tasks handled per tick.
    pub reprocess_per_tick: usize,
}

impl Default for GenerationSchedulerConfig {
    fn default() -> Self {
        Self {
            chunk_distance: 6,
            dispatches_per_tick: 2,
            reprocess_per_tick: 2,
        }
    }
}

/// Queue entry ordered by scaled ellipsoid distance (lowest first).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingGen {
    priority_milli: u32,
    position: SubChunkPos,
}

impl Ord for PendingGen {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority_milli
            .cmp(&other.priority_milli)
            .then_with(|| self.position.column.x.cmp(&other.position.column.x))
            .then_with(|| self.position.column.z.cmp(&other.position.column.z))
            .then_with(|| self.position.sub_y.cmp(&other.position.sub_y))
    }
}

impl PartialOrd for PendingGen {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
pub struct GenerationScheduler {
    config: GenerationSchedulerConfig,
    player: Option<(i64, i64, i64)>,
    queue: BinaryHeap<Reverse<PendingGen>>,
    queued: FxHashSet<SubChunkPos>,
    generated: FxHashSet<SubChunkPos>,
    generating: FxHashSet<SubChunkPos>,
    /// Persistence request id -> sub-chunk awaiting the reply.
    awaiting_load: FxHashMap<u64, SubChunkPos>,
    water_reprocess: VecDeque<(SubChunkPos, Option<FaceDirection>)>,
    water_reprocess_set: FxHashSet<SubChunkPos>,
}

impl GenerationScheduler {
    pub fn new(config: GenerationSchedulerConfig) -> Self {
        Self {
            config,
            player: None,
            queue: BinaryHeap::new(),
            queued: FxHashSet::default(),
            generated: FxHashSet::default(),
            generating: FxHashSet::default(),
            awaiting_load: FxHashMap::default(),
            water_reprocess: VecDeque::new(),
            water_reprocess_set: FxHashSet::default(),
        }
    }

    pub fn chunk_distance(&self) -> i64 {
        self.config.chunk_distance
    }

    /// Unload radius: 1.5× the load radius, rounded up.
    pub fn unload_distance(&self) -> i64 {
        (self.config.chunk_distance * 3 + 1) / 2
    }

    pub fn dispatches_per_tick(&self) -> usize {
        self.config.dispatches_per_tick
    }

    pub fn reprocess_per_tick(&self) -> usize {
        self.config.reprocess_per_tick
    }

    fn vertical_radius(&self) -> f64 {
        (self.config.chunk_distance as f64 / 2.0).max(1.0)
    }

    /// Scaled distance from the player to a sub-chunk slot; the load
    /// window is `distance <= chunk_distance`.
    fn ellipsoid_distance(&self, dx: i64, dz: i64, dy: i64, y_bias: f64) -> f64 {
        let y_scale = self.config.chunk_distance as f64 / self.vertical_radius();
        let fy = dy as f64 * y_scale * y_bias;
        ((dx * dx + dz * dz) as f64 + fy * fy).sqrt()
    }

    /// Update the player's cell. Returns true (and rebuilds the queue)
    /// when any of chunk X, chunk Z, or sub-Y changed.
    pub fn set_player_cell(&mut self, chunk_x: i64, chunk_z: i64, sub_y: i64) -> bool {
        let cell = (chunk_x, chunk_z, sub_y.clamp(0, SUB_CHUNK_COUNT as i64 - 1));
        if self.player == Some(cell) {
            return false;
        }
        self.player = Some(cell);
        self.rebuild_queue();
        true
    }

    pub fn player_column(&self) -> Option<ColumnPos> {
        self.player.map(|(x, z, _)| ColumnPos::new(x, z))
    }

    /// Rebuild the pending queue by walking outward over the load window.
    /// Priority favors the player's horizontal band: the Y term is scaled
    /// an extra 1.5×.
    pub fn rebuild_queue(&mut self) {
        let Some((px, pz, psub)) = self.player else {
            return;
        };
        self.queue.clear();
        self.queued.clear();
        let d = self.config.chunk_distance;
        for dz in -d..=d {
            for dx in -d..=d {
                for sub_y in 0..SUB_CHUNK_COUNT as i64 {
                    let dy = sub_y - psub;
                    if self.ellipsoid_distance(dx, dz, dy, 1.0) > d as f64 {
                        continue;
                    }
                    let position = SubChunkPos::new(px + dx, pz + dz, sub_y as u8);
                    if self.generated.contains(&position) || self.generating.contains(&position) {
                        continue;
                    }
                    let priority = self.ellipsoid_distance(dx, dz, dy, 1.5);
                    self.queue.push(Reverse(PendingGen {
                        priority_milli: (priority * 1000.0) as u32,
                        position,
                    }));
                    self.queued.insert(position);
                }
            }
        }
        log::debug!(
            "[GenerationScheduler::rebuild_queue] {} sub-chunks pending around ({}, {}, sub {})",
            self.queue.len(),
            px,
            pz,
            psub
        );
    }

    /// Pop the highest-priority sub-chunk still worth generating.
    pub fn pop_next(&mut self) -> Option<SubChunkPos> {
        while let Some(Reverse(entry)) = self.queue.pop() {
            self.queued.remove(&entry.position);
            if self.generated.contains(&entry.position)
                || self.generating.contains(&entry.position)
            {
                continue;
            }
            return Some(entry.position);
        }
        None
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn mark_generating(&mut self, position: SubChunkPos) {
        self.generating.insert(position);
    }

    pub fn clear_generating(&mut self, position: SubChunkPos) {
        self.generating.remove(&position);
    }

    pub fn mark_generated(&mut self, position: SubChunkPos) {
        self.generating.remove(&position);
        self.generated.insert(position);
    }

    pub fn is_generated(&self, position: SubChunkPos) -> bool {
        self.generated.contains(&position)
    }

    pub fn is_generating(&self, position: SubChunkPos) -> bool {
        self.generating.contains(&position)
    }

    /// Record an in-flight persistence load for a sub-chunk.
    pub fn track_load_request(&mut self, request_id: u64, position: SubChunkPos) {
        self.awaiting_load.insert(request_id, position);
        self.generating.insert(position);
    }

    /// Resolve a persistence reply to the sub-chunk that asked for it.
    pub fn take_load_request(&mut self, request_id: u64) -> Option<SubChunkPos> {
        self.awaiting_load.remove(&request_id)
    }

    /// Columns outside the unload ellipse. The caller disposes them and
    /// purges their keys everywhere.
    pub fn columns_to_unload(&self, loaded: &[ColumnPos]) -> Vec<ColumnPos> {
        let Some(player) = self.player_column() else {
            return Vec::new();
        };
        let unload = self.unload_distance() as f64;
        loaded
            .iter()
            .copied()
            .filter(|c| c.distance_to(player) > unload)
            .collect()
    }

    /// Forget generated flags for sub-chunks of resident columns that
    /// drifted outside the unload ellipsoid, so a returning player
    /// regenerates them.
    pub fn drop_far_generated(&mut self) {
        let Some((px, pz, psub)) = self.player else {
            return;
        };
        let unload = self.unload_distance() as f64;
        let y_scale = self.config.chunk_distance as f64 / self.vertical_radius();
        self.generated.retain(|pos| {
            let dx = (pos.column.x - px) as f64;
            let dz = (pos.column.z - pz) as f64;
            let dy = (pos.sub_y as i64 - psub) as f64 * y_scale;
            (dx * dx + dz * dz + dy * dy).sqrt() <= unload
        });
    }

    /// Drop every key belonging to an unloaded column.
    pub fn purge_column(&mut self, column: ColumnPos) {
        self.generated.retain(|p| p.column != column);
        self.generating.retain(|p| p.column != column);
        self.queued.retain(|p| p.column != column);
        self.awaiting_load.retain(|_, p| p.column != column);
        if !self.water_reprocess.is_empty() {
            self.water_reprocess.retain(|(p, _)| p.column != column);
            self.water_reprocess_set.retain(|p| p.column != column);
        }
        // Stale heap entries are filtered lazily by pop_next.
    }

    /// Queue a neighbor sub-chunk for water reprocessing. `came_from` is
    /// the face of the target adjacent to the water source, so propagation
    /// never walks back the way it came.
    pub fn queue_water_reprocess(
        &mut self,
        position: SubChunkPos,
        came_from: Option<FaceDirection>,
    ) {
        if self.water_reprocess_set.insert(position) {
            self.water_reprocess.push_back((position, came_from));
        }
    }

    pub fn pop_water_reprocess(&mut self) -> Option<(SubChunkPos, Option<FaceDirection>)> {
        let (position, came_from) = self.water_reprocess.pop_front()?;
        self.water_reprocess_set.remove(&position);
        Some((position, came_from))
    }

    /// Seed-change reset: everything queued, tracked, or generated is
    /// forgotten.
    pub fn reset(&mut self) {
        self.player = None;
        self.queue.clear();
        self.queued.clear();
        self.generated.clear();
        self.generating.clear();
        self.awaiting_load.clear();
        self.water_reprocess.clear();
        self.water_reprocess_set.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(distance: i64) -> GenerationScheduler {
        GenerationScheduler::new(GenerationSchedulerConfig {
            chunk_distance: distance,
            dispatches_per_tick: 2,
            reprocess_per_tick: 2,
        })
    }

    #[test]
    fn player_cell_change_rebuilds_queue() {
        let mut sched = scheduler(3);
        assert!(sched.set_player_cell(0, 0, 1));
        let first = sched.queue_len();
        assert!(first > 0);
        assert!(!sched.set_player_cell(0, 0, 1));
        assert!(sched.set_player_cell(1, 0, 1));
    }

    #[test]
    fn nearest_sub_chunk_pops_first() {
        let mut sched = scheduler(4);
        sched.set_player_cell(10, -5, 2);
        let first = sched.pop_next().expect("queue is non-empty");
        assert_eq!(first.column, ColumnPos::new(10, -5));
        assert_eq!(first.sub_y, 2);
    }

    #[test]
    fn generated_entries_are_skipped() {
        let mut sched = scheduler(2);
        sched.set_player_cell(0, 0, 0);
        let first = sched.pop_next().expect("non-empty");
        sched.mark_generated(first);
        sched.rebuild_queue();
        while let Some(next) = sched.pop_next() {
            assert_ne!(next, first);
            sched.mark_generated(next);
        }
    }

    #[test]
    fn unload_distance_is_one_and_a_half_times() {
        assert_eq!(scheduler(6).unload_distance(), 9);
        assert_eq!(scheduler(5).unload_distance(), 8);
    }

    #[test]
    fn far_columns_are_unloaded() {
        let mut sched = scheduler(2);
        sched.set_player_cell(0, 0, 0);
        let loaded = vec![
            ColumnPos::new(0, 0),
            ColumnPos::new(2, 0),
            ColumnPos::new(8, 0),
        ];
        let unloads = sched.columns_to_unload(&loaded);
        assert_eq!(unloads, vec![ColumnPos::new(8, 0)]);
    }

    #[test]
    fn purge_column_clears_all_tracking() {
        let mut sched = scheduler(2);
        sched.set_player_cell(0, 0, 0);
        let pos = SubChunkPos::new(0, 0, 0);
        sched.mark_generated(pos);
        sched.queue_water_reprocess(pos.offset(1, 0), Some(FaceDirection::NegX));
        sched.purge_column(pos.column);
        assert!(!sched.is_generated(pos));
        assert!(sched.pop_water_reprocess().is_some(), "other column survives");
    }

    #[test]
    fn water_reprocess_dedups() {
        let mut sched = scheduler(2);
        let pos = SubChunkPos::new(1, 0, 2);
        sched.queue_water_reprocess(pos, None);
        sched.queue_water_reprocess(pos, Some(FaceDirection::PosX));
        assert!(sched.pop_water_reprocess().is_some());
        assert!(sched.pop_water_reprocess().is_none());
    }

    #[test]
    fn vertical_window_is_half_the_horizontal() {
        let mut sched = scheduler(4);
        sched.set_player_cell(0, 0, 8);
        let mut min_sub = u8::MAX;
        let mut max_sub = 0u8;
        while let Some(pos) = sched.pop_next() {
            if pos.column == ColumnPos::new(0, 0) {
                min_sub = min_sub.min(pos.sub_y);
                max_sub = max_sub.max(pos.sub_y);
            }
            sched.mark_generated(pos);
        }
        // Radius 4 horizontally means 2 sub-chunks vertically.
        assert_eq!(min_sub, 6);
        assert_eq!(max_sub, 10);
    }
}
