//! Deterministic sub-chunk generation: noise, biomes, terrain, caves,
//! ores, water, and tree seeding. Everything here except tree placement
//! runs inside generation workers against worker-owned buffers.

pub mod biome;
pub mod caves;
pub mod noise;
pub mod ores;
pub mod terrain;
pub mod trees;
pub mod water;
pub mod worker;

pub use biome::{BiomeBlendData, BiomeConfig, BiomeProvider};
pub use noise::{position_random, TerrainNoise};
pub use ores::OrePosition;
pub use trees::{place_tree, TreeSeed};
pub use water::WaterEdgeEffects;
pub use worker::{
    generate_sub_chunk, run_generation_job, GenerationJob, GenerationOutput, GenerationResult,
};
