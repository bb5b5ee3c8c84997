//! Fundamental world data types: positions, block ids, the block registry.

pub mod block;
pub mod position;
pub mod registry;

pub use block::{BlockId, BlockProperties, FaceDirection, TextureId};
pub use position::{
    index_to_local, local_in_bounds, local_index, local_to_world, sub_y_of_world_y,
    world_to_local, ColumnPos, SubChunkPos, VoxelPos,
};
pub use registry::BlockRegistry;
