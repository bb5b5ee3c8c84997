//! The voxel world: core types, storage, generation, and lighting.

pub mod core;
pub mod generation;
pub mod lighting;
pub mod storage;

pub use core::{
    BlockId, BlockProperties, BlockRegistry, ColumnPos, FaceDirection, SubChunkPos, TextureId,
    VoxelPos,
};
pub use storage::{ChunkColumn, ChunkManager, SubChunk, SubChunkState};
