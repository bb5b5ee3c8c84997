//! Strata: the streaming world engine of a voxel sandbox.
//!
//! Given a player position, the engine generates, stores, lights, and
//! meshes a window of sub-chunks around them, and keeps that window
//! consistent as the player moves and edits blocks.
//!
//! # Architecture
//!
//! - **world::core** — coordinates, block ids, the block registry
//! - **world::storage** — sub-chunks, columns, the LRU chunk manager
//! - **world::generation** — deterministic terrain, caves, ores, water,
//!   trees, executed on generation workers
//! - **world::lighting** — the skylight propagator and the background
//!   lighting corrector
//! - **meshing** — the greedy mesher and its scheduler
//! - **streaming** — the ellipsoidal generation window and the per-frame
//!   task budget
//! - **workers** — message-passing worker pools with owned-buffer handoff
//! - **persistence** — sub-chunk records over an opaque key-value store
//!
//! All mutable world state lives on the main task; workers receive owned
//! buffer copies (or transferred pre-allocated buffers) and hand results
//! back over channels. [`Engine::tick`] advances every scheduler once per
//! frame within a wall-clock budget.

pub mod constants;
pub mod engine;
pub mod meshing;
pub mod persistence;
pub mod streaming;
pub mod workers;
pub mod world;

pub use engine::{
    Engine, EngineConfig, EngineStats, ObserverHandle, OpacityCache, QueueDepths, SceneSink,
};
pub use meshing::{MeshGroup, MeshPriority, NonGreedyBlocks, SubChunkMesh};
pub use persistence::{KeyValueStore, MemoryStore, SubChunkRecord, WorldMetadata};
pub use world::{
    BlockId, BlockProperties, BlockRegistry, ChunkColumn, ChunkManager, ColumnPos, FaceDirection,
    SubChunk, SubChunkPos, SubChunkState, TextureId, VoxelPos,
};
pub use world::generation::{BiomeConfig, BiomeProvider, TerrainNoise};
