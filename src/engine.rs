//! Engine facade: owns all world state on the main task, paces the
//! schedulers each tick, and exposes the host-facing API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::DVec3;
use rustc_hash::FxHashMap;

use crate::constants::{CHUNK_SIZE_X, CHUNK_SIZE_Z, SUB_CHUNK_HEIGHT, SUB_CHUNK_VOLUME};
use crate::meshing::{
    run_mesh_job, MeshApplied, MeshJob, MeshPriority, MeshResult, MeshScheduler,
    MeshSchedulerConfig, MeshTables, SubChunkMesh,
};
use crate::persistence::{KeyValueStore, MemoryStore, StoreEvent, SubChunkRecord, WorldMetadata, WorldStore};
use crate::streaming::{GenerationScheduler, GenerationSchedulerConfig, TaskBudget};
use crate::world::core::{
    sub_y_of_world_y, world_to_local, BlockId, BlockRegistry, ColumnPos, FaceDirection,
    SubChunkPos, VoxelPos,
};
use crate::world::generation::water::reflood_sub_chunk;
use crate::world::generation::{
    place_tree, run_generation_job, BiomeConfig, BiomeProvider, GenerationJob, GenerationOutput,
    GenerationResult, OrePosition,
};
use crate::world::lighting::{
    run_lighting_job, LightingCorrector, LightingCorrectorConfig, LightingJob, LightingResult,
};
use crate::world::storage::{ChunkColumn, ChunkManager, SubChunkState};
use crate::workers::WorkerPool;

/// Renderer-facing sink for mesh lifecycle events.
pub trait SceneSink {
    fn mesh_added(&mut self, position: SubChunkPos, mesh: &SubChunkMesh);
    fn mesh_removed(&mut self, position: SubChunkPos);
}

/// Renderer-owned cache of fully-opaque sub-chunks (software occlusion
/// feeds on it). Holds keys only; the engine pushes updates as opacity
/// changes and purges keys on unload.
pub trait OpacityCache {
    fn set_opacity(&mut self, position: SubChunkPos, fully_opaque: bool);
    fn remove(&mut self, position: SubChunkPos);
    fn clear(&mut self);
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub seed: u64,
    pub sea_level: i64,
    /// Horizontal streaming radius, in chunks.
    pub chunk_distance: i64,
    pub max_loaded_columns: usize,
    /// Main-task wall-clock budget per tick.
    pub frame_budget: Duration,
    pub generation_workers: usize,
    pub lighting_workers: usize,
    /// 0 selects `min(available cores, 4)`.
    pub mesh_workers: usize,
    pub autosave_interval: Duration,
    pub biomes: Vec<BiomeConfig>,
    pub lighting: LightingCorrectorConfig,
    pub meshing: MeshSchedulerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            sea_level: 64,
            chunk_distance: 6,
            max_loaded_columns: 512,
            frame_budget: Duration::from_millis(2),
            generation_workers: 2,
            lighting_workers: 4,
            mesh_workers: 0,
            autosave_interval: Duration::from_secs(300),
            biomes: BiomeConfig::stock_set(),
            lighting: LightingCorrectorConfig::default(),
            meshing: MeshSchedulerConfig::default(),
        }
    }
}

/// Point-in-time scheduler depths, for diagnostics overlays.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueueDepths {
    pub generation_pending: usize,
    pub generation_in_flight: usize,
    pub meshing_queued: usize,
    pub meshing_in_flight: usize,
    pub mesh_results_buffered: usize,
    pub lighting_active_columns: usize,
    pub loaded_columns: usize,
}

/// Running totals for diagnostics.
#[derive(Debug, Default, Clone)]
pub struct EngineStats {
    pub sub_chunks_generated: u64,
    pub sub_chunks_loaded_from_store: u64,
    pub sub_chunks_meshed: u64,
    pub lighting_corrections: u64,
    pub trees_placed: u64,
    pub worker_errors: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObserverKind {
    MeshAdded,
    MeshRemoved,
    ColumnLightingStarted,
    OrePositionsGenerated,
}

/// Handle returned by `subscribe_*`; pass back to unsubscribe.
#[derive(Debug, Clone, Copy)]
pub struct ObserverHandle {
    kind: ObserverKind,
    index: usize,
}

/// Observer lists are indexed; unsubscribing blanks a slot so other
/// handles stay valid.
#[derive(Default)]
struct Observers {
    mesh_added: Vec<Option<Box<dyn FnMut(SubChunkPos, &SubChunkMesh)>>>,
    mesh_removed: Vec<Option<Box<dyn FnMut(SubChunkPos)>>>,
    column_lighting_started: Vec<Option<Box<dyn FnMut(ColumnPos)>>>,
    ore_positions_generated: Vec<Option<Box<dyn FnMut(&[OrePosition])>>>,
}

/// The streaming world engine. One instance owns everything; `tick` must
/// be called once per frame from the host loop.
pub struct Engine {
    config: EngineConfig,
    seed: u64,
    registry: Arc<BlockRegistry>,
    chunks: ChunkManager,
    biomes: BiomeProvider,
    gen_scheduler: GenerationScheduler,
    mesh_scheduler: MeshScheduler,
    corrector: LightingCorrector,
    budget: TaskBudget,
    gen_pool: WorkerPool<GenerationJob, GenerationResult>,
    light_pool: WorkerPool<LightingJob, LightingResult>,
    mesh_pool: WorkerPool<MeshJob, MeshResult>,
    store: Option<WorldStore>,
    meshes: FxHashMap<SubChunkPos, SubChunkMesh>,
    observers: Observers,
    scene_sink: Option<Box<dyn SceneSink>>,
    opacity_cache: Option<Box<dyn OpacityCache>>,
    stats: EngineStats,
    metadata: WorldMetadata,
    /// Opaque inventory blob owned by an external collaborator; persisted
    /// with every checkpoint.
    inventory: Option<Vec<u8>>,
    player: DVec3,
    last_autosave: Instant,
    disposed: bool,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let registry = Arc::new(BlockRegistry::with_stock_blocks());

        let gen_registry = registry.clone();
        let gen_pool = WorkerPool::new("generation", config.generation_workers, move |job| {
            run_generation_job(job, &gen_registry)
        });
        let light_registry = registry.clone();
        let light_pool = WorkerPool::new("lighting", config.lighting_workers, move |job| {
            run_lighting_job(job, &light_registry)
        });
        let mesh_workers = if config.mesh_workers == 0 {
            num_cpus::get().min(4)
        } else {
            config.mesh_workers
        };
        let mesh_tables = Arc::new(MeshTables::new(registry.clone()));
        let mesh_pool = WorkerPool::new("meshing", mesh_workers, move |job| {
            run_mesh_job(job, &mesh_tables)
        });

        log::info!(
            "[Engine::new] seed {} · distance {} · workers {}/{}/{}",
            config.seed,
            config.chunk_distance,
            config.generation_workers,
            config.lighting_workers,
            mesh_workers
        );

        Self {
            seed: config.seed,
            registry,
            chunks: ChunkManager::new(config.max_loaded_columns),
            biomes: BiomeProvider::new(config.seed, config.biomes.clone()),
            gen_scheduler: GenerationScheduler::new(GenerationSchedulerConfig {
                chunk_distance: config.chunk_distance,
                ..GenerationSchedulerConfig::default()
            }),
            mesh_scheduler: MeshScheduler::new(config.meshing.clone()),
            corrector: LightingCorrector::new(config.lighting.clone(), config.seed),
            budget: TaskBudget::new(config.frame_budget),
            gen_pool,
            light_pool,
            mesh_pool,
            store: Some(WorldStore::new(Box::new(MemoryStore::new()))),
            meshes: FxHashMap::default(),
            observers: Observers::default(),
            scene_sink: None,
            opacity_cache: None,
            stats: EngineStats::default(),
            metadata: WorldMetadata::new(config.seed),
            inventory: None,
            player: DVec3::ZERO,
            last_autosave: Instant::now(),
            config,
            disposed: false,
        }
    }

    // --- collaborator injection -----------------------------------------

    /// Swap the persistence backend. The previous store is shut down.
    pub fn set_persistence(&mut self, backend: Box<dyn KeyValueStore>) {
        if let Some(old) = self.store.take() {
            old.shutdown();
        }
        self.store = Some(WorldStore::new(backend));
    }

    /// Detach persistence entirely; the engine runs without saves.
    pub fn clear_persistence(&mut self) {
        if let Some(old) = self.store.take() {
            old.shutdown();
        }
    }

    pub fn set_scene_sink(&mut self, sink: Box<dyn SceneSink>) {
        self.scene_sink = Some(sink);
    }

    pub fn set_opacity_cache(&mut self, cache: Box<dyn OpacityCache>) {
        self.opacity_cache = Some(cache);
    }

    /// Stage the host's serialized inventory; it rides along with every
    /// checkpoint (auto-save included) from here on.
    pub fn set_inventory(&mut self, bytes: Vec<u8>) {
        self.inventory = Some(bytes);
    }

    /// Push a sub-chunk's current opacity flag into the injected cache.
    fn publish_opacity(&mut self, position: SubChunkPos) {
        let Some(cache) = self.opacity_cache.as_mut() else {
            return;
        };
        let flag = self
            .chunks
            .get(position.column)
            .and_then(|c| c.sub_chunk(position.sub_y as usize))
            .map(|s| s.is_fully_opaque());
        match flag {
            Some(fully_opaque) => cache.set_opacity(position, fully_opaque),
            None => cache.remove(position),
        }
    }

    // --- host API -------------------------------------------------------

    pub fn set_player(&mut self, x: f64, y: f64, z: f64) {
        self.player = DVec3::new(x, y, z);
    }

    pub fn player(&self) -> DVec3 {
        self.player
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Point-in-time queue depths across the schedulers.
    pub fn queue_depths(&self) -> QueueDepths {
        QueueDepths {
            generation_pending: self.gen_scheduler.queue_len(),
            generation_in_flight: self.gen_pool.outstanding_jobs(),
            meshing_queued: self.mesh_scheduler.queued_len(),
            meshing_in_flight: self.mesh_scheduler.pending_len(),
            mesh_results_buffered: self.mesh_scheduler.buffered_results(),
            lighting_active_columns: self.corrector.active_len(),
            loaded_columns: self.chunks.len(),
        }
    }

    pub fn loaded_column_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_sub_chunk_generated(&self, position: SubChunkPos) -> bool {
        self.gen_scheduler.is_generated(position)
    }

    pub fn mesh(&self, position: SubChunkPos) -> Option<&SubChunkMesh> {
        self.meshes.get(&position)
    }

    /// Block at world coordinates; air outside loaded space.
    pub fn get_block(&self, x: i64, y: i64, z: i64) -> BlockId {
        let (lx, lz) = world_to_local(x, z);
        self.chunks
            .get(ColumnPos::from_world(x, z))
            .map(|col| col.get_block_world(lx, y, lz))
            .unwrap_or(BlockId::AIR)
    }

    /// Combined light level 0..=15; unloaded space reads as open sky.
    pub fn get_light_level_at_world(&self, x: i64, y: i64, z: i64) -> u8 {
        let (lx, lz) = world_to_local(x, z);
        self.chunks
            .get(ColumnPos::from_world(x, z))
            .map(|col| col.get_light_level_world(lx, y, lz))
            .unwrap_or(15)
    }

    /// Place or remove one block. Returns true iff the world changed; a
    /// change queues a high-priority remesh and the lighting fast path.
    pub fn set_block(&mut self, x: i64, y: i64, z: i64, id: BlockId) -> bool {
        if self.disposed || sub_y_of_world_y(y).is_none() {
            return false;
        }
        let column_pos = ColumnPos::from_world(x, z);
        let (lx, lz) = world_to_local(x, z);
        let sub_y = y as usize / SUB_CHUNK_HEIGHT;

        let was_removed = id.is_air();
        let (changed, evicted) = {
            let (col, evicted) = self.chunks.load_column(column_pos);
            let changed = col.set_block_world(lx, y, lz, id);
            if changed {
                if let Some(sub) = col.sub_chunk_mut(sub_y) {
                    sub.mark_modified_by_player();
                    sub.recompute_fully_opaque(&self.registry);
                }
            }
            (changed, evicted)
        };
        for col in evicted {
            self.unload_column(col);
        }
        if !changed {
            return false;
        }

        let position = SubChunkPos::from_column(column_pos, sub_y as u8);
        self.publish_opacity(position);
        self.mesh_scheduler
            .queue_for_meshing(position, MeshPriority::High, true);
        for neighbor in self.boundary_neighbors(position, lx, y, lz) {
            self.mesh_scheduler
                .queue_for_meshing(neighbor, MeshPriority::High, true);
        }
        self.corrector
            .queue_block_change(column_pos, lx, y, lz, was_removed);
        true
    }

    /// Sub-chunks whose meshes share a face with the edited cell.
    fn boundary_neighbors(
        &self,
        position: SubChunkPos,
        lx: usize,
        world_y: i64,
        lz: usize,
    ) -> Vec<SubChunkPos> {
        let ly = world_y as usize % SUB_CHUNK_HEIGHT;
        let mut out = Vec::new();
        if lx == 0 {
            out.push(position.offset(-1, 0));
        }
        if lx == CHUNK_SIZE_X - 1 {
            out.push(position.offset(1, 0));
        }
        if lz == 0 {
            out.push(position.offset(0, -1));
        }
        if lz == CHUNK_SIZE_Z - 1 {
            out.push(position.offset(0, 1));
        }
        if ly == 0 {
            if let Some(below) = position.below() {
                out.push(below);
            }
        }
        if ly == SUB_CHUNK_HEIGHT - 1 {
            if let Some(above) = position.above() {
                out.push(above);
            }
        }
        out.retain(|p| {
            self.chunks
                .get(p.column)
                .and_then(|c| c.sub_chunk(p.sub_y as usize))
                .is_some()
        });
        out
    }

    /// Fill an axis-aligned region. Lighting is corrected per column
    /// rather than per block.
    pub fn fill_region(&mut self, min: VoxelPos, max: VoxelPos, id: BlockId) {
        let mut touched_subs: Vec<SubChunkPos> = Vec::new();
        let mut touched_columns: Vec<ColumnPos> = Vec::new();
        for x in min.x..=max.x {
            for z in min.z..=max.z {
                let column_pos = ColumnPos::from_world(x, z);
                let (lx, lz) = world_to_local(x, z);
                let evicted = {
                    let (col, evicted) = self.chunks.load_column(column_pos);
                    for y in min.y..=max.y {
                        let Some(sub_y) = sub_y_of_world_y(y) else {
                            continue;
                        };
                        if col.set_block_world(lx, y, lz, id) {
                            if let Some(sub) = col.sub_chunk_mut(sub_y) {
                                sub.mark_modified_by_player();
                            }
                            let pos = SubChunkPos::from_column(column_pos, sub_y as u8);
                            if !touched_subs.contains(&pos) {
                                touched_subs.push(pos);
                            }
                        }
                    }
                    evicted
                };
                for col in evicted {
                    self.unload_column(col);
                }
                if !touched_columns.contains(&column_pos) {
                    touched_columns.push(column_pos);
                }
            }
        }
        for pos in &touched_subs {
            if let Some(col) = self.chunks.get_mut(pos.column) {
                if let Some(sub) = col.sub_chunk_mut(pos.sub_y as usize) {
                    sub.recompute_fully_opaque(&self.registry);
                }
            }
            self.mesh_scheduler
                .queue_for_meshing(*pos, MeshPriority::High, true);
        }
        for column in touched_columns {
            self.corrector.enqueue_column(column);
        }
    }

    /// Visit every block in a region; the callback sees world coordinates
    /// and the block id (air outside loaded space).
    pub fn for_each_block_in_region(
        &self,
        min: VoxelPos,
        max: VoxelPos,
        mut callback: impl FnMut(i64, i64, i64, BlockId),
    ) {
        for x in min.x..=max.x {
            for z in min.z..=max.z {
                for y in min.y..=max.y {
                    callback(x, y, z, self.get_block(x, y, z));
                }
            }
        }
    }

    pub fn queue_sub_chunk_for_meshing(
        &mut self,
        position: SubChunkPos,
        priority: MeshPriority,
        force_requeue: bool,
    ) {
        self.mesh_scheduler
            .queue_for_meshing(position, priority, force_requeue);
    }

    // --- observers ------------------------------------------------------

    pub fn subscribe_sub_chunk_mesh_added(
        &mut self,
        callback: Box<dyn FnMut(SubChunkPos, &SubChunkMesh)>,
    ) -> ObserverHandle {
        self.observers.mesh_added.push(Some(callback));
        ObserverHandle {
            kind: ObserverKind::MeshAdded,
            index: self.observers.mesh_added.len() - 1,
        }
    }

    pub fn subscribe_sub_chunk_mesh_removed(
        &mut self,
        callback: Box<dyn FnMut(SubChunkPos)>,
    ) -> ObserverHandle {
        self.observers.mesh_removed.push(Some(callback));
        ObserverHandle {
            kind: ObserverKind::MeshRemoved,
            index: self.observers.mesh_removed.len() - 1,
        }
    }

    pub fn subscribe_column_lighting_started(
        &mut self,
        callback: Box<dyn FnMut(ColumnPos)>,
    ) -> ObserverHandle {
        self.observers.column_lighting_started.push(Some(callback));
        ObserverHandle {
            kind: ObserverKind::ColumnLightingStarted,
            index: self.observers.column_lighting_started.len() - 1,
        }
    }

    pub fn subscribe_ore_positions_generated(
        &mut self,
        callback: Box<dyn FnMut(&[OrePosition])>,
    ) -> ObserverHandle {
        self.observers.ore_positions_generated.push(Some(callback));
        ObserverHandle {
            kind: ObserverKind::OrePositionsGenerated,
            index: self.observers.ore_positions_generated.len() - 1,
        }
    }

    pub fn unsubscribe(&mut self, handle: ObserverHandle) {
        match handle.kind {
            ObserverKind::MeshAdded => {
                if let Some(slot) = self.observers.mesh_added.get_mut(handle.index) {
                    *slot = None;
                }
            }
            ObserverKind::MeshRemoved => {
                if let Some(slot) = self.observers.mesh_removed.get_mut(handle.index) {
                    *slot = None;
                }
            }
            ObserverKind::ColumnLightingStarted => {
                if let Some(slot) = self.observers.column_lighting_started.get_mut(handle.index) {
                    *slot = None;
                }
            }
            ObserverKind::OrePositionsGenerated => {
                if let Some(slot) = self.observers.ore_positions_generated.get_mut(handle.index) {
                    *slot = None;
                }
            }
        }
    }

    // --- frame advance --------------------------------------------------

    /// Advance every scheduler by one frame.
    pub fn tick(&mut self) {
        if self.disposed {
            return;
        }
        self.budget.begin_frame();
        self.update_streaming_window();
        self.dispatch_generation_work();
        self.drain_store_events();
        self.apply_generation_results();
        self.run_lighting();
        self.process_water_reprocessing();
        self.run_meshing();
        self.maybe_autosave();
    }

    fn player_cell(&self) -> (i64, i64, i64) {
        let wx = self.player.x.floor() as i64;
        let wz = self.player.z.floor() as i64;
        let wy = self.player.y.floor() as i64;
        (
            wx.div_euclid(CHUNK_SIZE_X as i64),
            wz.div_euclid(CHUNK_SIZE_Z as i64),
            wy.div_euclid(SUB_CHUNK_HEIGHT as i64),
        )
    }

    fn update_streaming_window(&mut self) {
        let (cx, cz, sub_y) = self.player_cell();
        if !self.gen_scheduler.set_player_cell(cx, cz, sub_y) {
            return;
        }
        let loaded = self.chunks.positions();
        for column_pos in self.gen_scheduler.columns_to_unload(&loaded) {
            if let Some(col) = self.chunks.remove(column_pos) {
                self.unload_column(col);
            }
        }
        self.gen_scheduler.drop_far_generated();
    }

    /// Release a column that left the window or fell off the LRU: save it
    /// best-effort, then purge its keys from every scheduler and cache.
    fn unload_column(&mut self, mut column: ChunkColumn) {
        let column_pos = column.position();
        if let Some(store) = self.store.as_mut() {
            for sub in column.modified_sub_chunks() {
                let (blocks, light) = sub.clone_buffers();
                store.save(&SubChunkRecord {
                    position: sub.position(),
                    blocks,
                    light,
                });
            }
        }
        for sub_y in column.populated_sub_ys() {
            let pos = SubChunkPos::from_column(column_pos, sub_y as u8);
            self.mesh_scheduler.purge(pos);
            if let Some(cache) = self.opacity_cache.as_mut() {
                cache.remove(pos);
            }
            if self.meshes.remove(&pos).is_some() {
                for callback in self.observers.mesh_removed.iter_mut().flatten() {
                    callback(pos);
                }
                if let Some(sink) = self.scene_sink.as_mut() {
                    sink.mesh_removed(pos);
                }
            }
        }
        self.gen_scheduler.purge_column(column_pos);
        self.corrector.purge_column(column_pos);
        column.dispose();
    }

    fn dispatch_generation_work(&mut self) {
        for _ in 0..self.gen_scheduler.dispatches_per_tick() {
            let Some(position) = self.gen_scheduler.pop_next() else {
                break;
            };
            let saved = self
                .store
                .as_ref()
                .map(|s| s.has(position))
                .unwrap_or(false);
            if saved {
                if let Some(store) = self.store.as_mut() {
                    let request_id = store.request_load(position);
                    self.gen_scheduler.track_load_request(request_id, position);
                    let evicted = {
                        let (col, evicted) = self.chunks.load_column(position.column);
                        col.sub_chunk_or_create(position.sub_y as usize)
                            .set_state(SubChunkState::Loading);
                        evicted
                    };
                    for col in evicted {
                        self.unload_column(col);
                    }
                }
            } else {
                self.dispatch_generation_job(position);
            }
        }
    }

    fn dispatch_generation_job(&mut self, position: SubChunkPos) {
        let blend = self.biomes.blend_data_for_chunk(position.column);
        let job = GenerationJob {
            position,
            seed: self.seed,
            sea_level: self.config.sea_level,
            blend,
            blocks: vec![0; SUB_CHUNK_VOLUME],
            light: vec![0; SUB_CHUNK_VOLUME],
        };
        self.gen_pool.dispatch_round_robin(job);
        self.gen_scheduler.mark_generating(position);
    }

    fn drain_store_events(&mut self) {
        let events = match self.store.as_mut() {
            Some(store) => store.poll(),
            None => return,
        };
        for event in events {
            match event {
                StoreEvent::Loaded {
                    request_id,
                    position,
                    record,
                } => {
                    if self.gen_scheduler.take_load_request(request_id).is_none() {
                        continue; // cancelled by a reset or unload
                    }
                    match record {
                        Some(record) => self.apply_loaded_record(record),
                        None => {
                            // Cache said present but the load missed;
                            // regenerate instead.
                            self.gen_scheduler.clear_generating(position);
                            self.dispatch_generation_job(position);
                        }
                    }
                }
                StoreEvent::MetadataLoaded { metadata, .. } => {
                    if let Some(meta) = metadata {
                        self.metadata = meta;
                    }
                }
            }
        }
    }

    fn apply_loaded_record(&mut self, record: SubChunkRecord) {
        let position = record.position;
        let evicted = {
            let (col, evicted) = self.chunks.load_column(position.column);
            let sub = col.sub_chunk_or_create(position.sub_y as usize);
            sub.apply_worker_data(record.blocks, record.light, &self.registry);
            evicted
        };
        for col in evicted {
            self.unload_column(col);
        }
        self.gen_scheduler.mark_generated(position);
        self.publish_opacity(position);
        self.stats.sub_chunks_loaded_from_store += 1;
        self.mesh_scheduler
            .queue_for_meshing(position, MeshPriority::Normal, false);
        self.enqueue_column_lighting(position.column);
    }

    fn enqueue_column_lighting(&mut self, column: ColumnPos) {
        self.corrector.enqueue_column(column);
        for callback in self.observers.column_lighting_started.iter_mut().flatten() {
            callback(column);
        }
    }

    fn apply_generation_results(&mut self) {
        loop {
            if !self.budget.should_run("apply-generation") {
                break;
            }
            let Some(result) = self.gen_pool.try_recv() else {
                break;
            };
            let started = Instant::now();
            match result {
                GenerationResult::Completed(output) => self.apply_generation_output(*output),
                GenerationResult::Failed { position, message } => {
                    log::warn!(
                        "[Engine] generation of ({}, {}, sub {}) failed: {}",
                        position.column.x,
                        position.column.z,
                        position.sub_y,
                        message
                    );
                    self.stats.worker_errors += 1;
                    // Cleared so the distance refresh can requeue it.
                    self.gen_scheduler.clear_generating(position);
                }
            }
            self.budget.note_unit("apply-generation", started.elapsed());
        }
    }

    fn apply_generation_output(&mut self, output: GenerationOutput) {
        let position = output.position;
        if !self.gen_scheduler.is_generating(position) {
            return; // stale result after a reset or unload
        }

        let evicted = {
            let (col, evicted) = self.chunks.load_column(position.column);
            let sub = col.sub_chunk_or_create(position.sub_y as usize);
            sub.apply_worker_data(output.blocks, output.light, &self.registry);
            evicted
        };
        for col in evicted {
            self.unload_column(col);
        }
        self.gen_scheduler.mark_generated(position);
        self.publish_opacity(position);
        self.stats.sub_chunks_generated += 1;

        self.mesh_scheduler
            .queue_for_meshing(position, MeshPriority::Normal, false);
        // Neighbors meshed against open air now have a real neighbor.
        for face in FaceDirection::ALL {
            let neighbor = match face {
                FaceDirection::PosY => position.above(),
                FaceDirection::NegY => position.below(),
                _ => {
                    let (dx, _, dz) = face.offset();
                    Some(position.offset(dx, dz))
                }
            };
            if let Some(neighbor) = neighbor {
                if self.gen_scheduler.is_generated(neighbor) {
                    self.mesh_scheduler
                        .queue_for_meshing(neighbor, MeshPriority::Normal, true);
                }
            }
        }

        self.enqueue_column_lighting(position.column);

        // Outgoing water: wake flooded neighbors.
        let edges = [
            (output.water_edges.pos_x, FaceDirection::PosX),
            (output.water_edges.neg_x, FaceDirection::NegX),
            (output.water_edges.pos_z, FaceDirection::PosZ),
            (output.water_edges.neg_z, FaceDirection::NegZ),
        ];
        for (flagged, dir) in edges {
            if !flagged {
                continue;
            }
            let (dx, _, dz) = dir.offset();
            let neighbor = position.offset(dx, dz);
            if self.gen_scheduler.is_generated(neighbor) {
                self.gen_scheduler
                    .queue_water_reprocess(neighbor, Some(dir.opposite()));
            }
        }
        // Incoming water: an already-generated neighbor may hold water
        // against our shared edge.
        for dir in FaceDirection::HORIZONTAL {
            let (dx, _, dz) = dir.offset();
            let neighbor_pos = position.offset(dx, dz);
            if !self.gen_scheduler.is_generated(neighbor_pos) {
                continue;
            }
            let has_water = self
                .chunks
                .get(neighbor_pos.column)
                .and_then(|c| c.sub_chunk(neighbor_pos.sub_y as usize))
                .map(|sub| {
                    sub.boundary_blocks(dir.opposite())
                        .iter()
                        .any(|&b| self.registry.get(BlockId(b)).is_liquid)
                })
                .unwrap_or(false);
            if has_water {
                self.gen_scheduler.queue_water_reprocess(position, Some(dir));
            }
        }

        // Trees span sub-chunks, so they are placed here on the main task.
        let mut tree_touched: Vec<SubChunkPos> = Vec::new();
        for seed in &output.tree_seeds {
            // Pre-load every column the canopy can reach so LRU evictions
            // are handled here, not silently inside placement.
            for dz in [-2i64, 2] {
                for dx in [-2i64, 2] {
                    let column_pos = ColumnPos::from_world(seed.world_x + dx, seed.world_z + dz);
                    let evicted = {
                        let (_, evicted) = self.chunks.load_column(column_pos);
                        evicted
                    };
                    for col in evicted {
                        self.unload_column(col);
                    }
                }
            }
            for touched in place_tree(&mut self.chunks, seed) {
                if !tree_touched.contains(&touched) {
                    tree_touched.push(touched);
                }
            }
            self.stats.trees_placed += 1;
        }
        for touched in tree_touched {
            if let Some(col) = self.chunks.get_mut(touched.column) {
                if let Some(sub) = col.sub_chunk_mut(touched.sub_y as usize) {
                    sub.recompute_fully_opaque(&self.registry);
                }
            }
            self.publish_opacity(touched);
            self.mesh_scheduler
                .queue_for_meshing(touched, MeshPriority::Normal, true);
            self.corrector.enqueue_column(touched.column);
        }

        if !output.ore_positions.is_empty() {
            for callback in self
                .observers
                .ore_positions_generated
                .iter_mut()
                .flatten()
            {
                callback(&output.ore_positions);
            }
        }
    }

    fn run_lighting(&mut self) {
        let player_column = ColumnPos::from_world(
            self.player.x.floor() as i64,
            self.player.z.floor() as i64,
        );
        let now = Instant::now();
        let remesh = self.corrector.update(
            &mut self.chunks,
            self.registry.as_ref(),
            &mut self.light_pool,
            player_column,
            now,
        );
        for position in remesh {
            self.mesh_scheduler
                .queue_for_meshing(position, MeshPriority::Normal, true);
        }
        while let Some(result) = self.light_pool.try_recv() {
            if matches!(result, LightingResult::Failed { .. }) {
                self.stats.worker_errors += 1;
            } else {
                self.stats.lighting_corrections += 1;
            }
            let remesh = self.corrector.on_result(result, &mut self.chunks, now);
            for position in remesh {
                self.mesh_scheduler
                    .queue_for_meshing(position, MeshPriority::Normal, true);
            }
        }
    }

    fn process_water_reprocessing(&mut self) {
        for _ in 0..self.gen_scheduler.reprocess_per_tick() {
            if !self.budget.should_run("water-reprocess") {
                break;
            }
            let Some((position, came_from)) = self.gen_scheduler.pop_water_reprocess() else {
                break;
            };
            let started = Instant::now();
            if self.gen_scheduler.is_generated(position) {
                self.reflood(position, came_from);
            }
            self.budget.note_unit("water-reprocess", started.elapsed());
        }
    }

    fn reflood(&mut self, position: SubChunkPos, came_from: Option<FaceDirection>) {
        // Biome blending is not reproducible here, so the reflood works on
        // actual blocks with the chunk's own water parameters.
        let water = self
            .biomes
            .blend_data_for_chunk(position.column)
            .primary
            .water;
        let (water_level, liquid) = match water {
            Some(w) => (w.water_level, w.liquid_block),
            None => (self.config.sea_level, BlockId::WATER),
        };
        let result = {
            let Some(col) = self.chunks.get_mut(position.column) else {
                return;
            };
            if col.sub_chunk(position.sub_y as usize).is_none() {
                return;
            }
            reflood_sub_chunk(col, &self.registry, position.sub_y as usize, water_level, liquid)
        };
        let (changed, effects) = result;
        if !changed {
            return;
        }
        if let Some(col) = self.chunks.get_mut(position.column) {
            if let Some(sub) = col.sub_chunk_mut(position.sub_y as usize) {
                sub.recompute_fully_opaque(&self.registry);
            }
        }
        self.publish_opacity(position);
        self.mesh_scheduler
            .queue_for_meshing(position, MeshPriority::Normal, true);
        self.corrector.enqueue_column(position.column);
        let edges = [
            (effects.pos_x, FaceDirection::PosX),
            (effects.neg_x, FaceDirection::NegX),
            (effects.pos_z, FaceDirection::PosZ),
            (effects.neg_z, FaceDirection::NegZ),
        ];
        for (flagged, dir) in edges {
            // Never propagate back toward where the water came from.
            if !flagged || Some(dir) == came_from {
                continue;
            }
            let (dx, _, dz) = dir.offset();
            let neighbor = position.offset(dx, dz);
            if self.gen_scheduler.is_generated(neighbor) {
                self.gen_scheduler
                    .queue_water_reprocess(neighbor, Some(dir.opposite()));
            }
        }
    }

    fn run_meshing(&mut self) {
        self.mesh_scheduler
            .dispatch(&mut self.chunks, &mut self.mesh_pool);
        self.mesh_scheduler.collect_results(&mut self.mesh_pool);
        let applied = self.mesh_scheduler.apply_results(&mut self.chunks);
        for entry in applied {
            match entry {
                MeshApplied::Replaced(position, mesh) => {
                    self.meshes.insert(position, *mesh);
                    self.stats.sub_chunks_meshed += 1;
                    if let Some(mesh) = self.meshes.get(&position) {
                        for callback in self.observers.mesh_added.iter_mut().flatten() {
                            callback(position, mesh);
                        }
                        if let Some(sink) = self.scene_sink.as_mut() {
                            sink.mesh_added(position, mesh);
                        }
                    }
                }
                MeshApplied::Discarded(_) => {}
            }
        }
    }

    fn maybe_autosave(&mut self) {
        if self.store.is_none() {
            return;
        }
        if self.last_autosave.elapsed() < self.config.autosave_interval {
            return;
        }
        self.last_autosave = Instant::now();
        self.checkpoint();
    }

    /// Persist every player-modified sub-chunk plus the world metadata.
    pub fn checkpoint(&mut self) {
        let player = self.player;
        self.metadata.touch([player.x, player.y, player.z]);
        let Some(store) = self.store.as_mut() else {
            return;
        };
        let mut saved = 0usize;
        for (_, column) in self.chunks.iter_mut() {
            for sub in column.iter_sub_chunks_mut() {
                if !sub.is_modified_by_player() {
                    continue;
                }
                let (blocks, light) = sub.clone_buffers();
                store.save(&SubChunkRecord {
                    position: sub.position(),
                    blocks,
                    light,
                });
                sub.clear_modified_by_player();
                saved += 1;
            }
        }
        store.save_metadata(&self.metadata);
        if let Some(inventory) = self.inventory.as_ref() {
            store.save_inventory(inventory.clone());
        }
        if saved > 0 {
            log::info!("[Engine::checkpoint] saved {saved} modified sub-chunks");
        }
    }

    /// Clear all queues, sets, and loaded state. A new seed also reseeds
    /// biome assignment and lighting jitter.
    pub fn reset(&mut self, seed: Option<u64>) {
        let positions: Vec<SubChunkPos> = self.meshes.keys().copied().collect();
        for position in positions {
            self.meshes.remove(&position);
            for callback in self.observers.mesh_removed.iter_mut().flatten() {
                callback(position);
            }
            if let Some(sink) = self.scene_sink.as_mut() {
                sink.mesh_removed(position);
            }
        }
        self.chunks.clear();
        if let Some(cache) = self.opacity_cache.as_mut() {
            cache.clear();
        }
        self.gen_scheduler.reset();
        self.mesh_scheduler.clear();
        self.corrector.clear();
        self.budget.reset_stats();
        if let Some(seed) = seed {
            self.seed = seed;
            self.biomes.set_seed(seed);
            self.corrector.set_seed(seed);
            self.metadata = WorldMetadata::new(seed);
            log::info!("[Engine::reset] reseeded to {seed}");
        }
    }

    /// Final checkpoint, then shut down every worker.
    pub fn dispose(mut self) {
        self.checkpoint();
        self.disposed = true;
        self.gen_pool.shutdown();
        self.light_pool.shutdown();
        self.mesh_pool.shutdown();
        if let Some(store) = self.store.take() {
            store.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observer_unsubscribe_blanks_slot() {
        let mut engine = Engine::new(EngineConfig {
            generation_workers: 1,
            lighting_workers: 1,
            mesh_workers: 1,
            ..EngineConfig::default()
        });
        let handle = engine.subscribe_column_lighting_started(Box::new(|_| {}));
        let second = engine.subscribe_column_lighting_started(Box::new(|_| {}));
        engine.unsubscribe(handle);
        assert!(engine.observers.column_lighting_started[0].is_none());
        assert!(engine.observers.column_lighting_started[second.index].is_some());
        engine.dispose();
    }

    #[test]
    fn set_block_out_of_world_is_ignored() {
        let mut engine = Engine::new(EngineConfig {
            generation_workers: 1,
            lighting_workers: 1,
            mesh_workers: 1,
            ..EngineConfig::default()
        });
        assert!(!engine.set_block(0, -1, 0, BlockId::STONE));
        assert!(!engine.set_block(0, 5000, 0, BlockId::STONE));
        assert!(engine.set_block(0, 70, 0, BlockId::STONE));
        assert_eq!(engine.get_block(0, 70, 0), BlockId::STONE);
        engine.dispose();
    }
}
