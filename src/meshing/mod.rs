//! Greedy meshing of sub-chunks into textured quad groups, plus the mesh
//! scheduler that paces jobs and result application.

pub mod greedy;
pub mod mesh;
pub mod scheduler;

pub use greedy::{mesh_sub_chunk, run_mesh_job, MeshJob, MeshResult, MeshTables, NeighborLayers};
pub use mesh::{brightness, MeshGroup, NonGreedyBlocks, SubChunkMesh, FLOATS_PER_VERTEX};
pub use scheduler::{
    build_mesh_job, MeshApplied, MeshPriority, MeshScheduler, MeshSchedulerConfig,
};
