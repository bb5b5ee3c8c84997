use serde::{Deserialize, Serialize};

use crate::constants::BIOME_REGION_CHUNKS;
use crate::world::core::{BlockId, ColumnPos};
use crate::world::generation::noise::position_random;

/// Spaghetti tunnel and cheese chamber parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaveSettings {
    pub frequency: f64,
    /// Carve where `n1² + n2² − layer_bonus` falls below this.
    pub threshold: f64,
    pub min_y: i64,
    pub max_y: i64,
    /// Center of the most cave-dense layer.
    pub layer_peak_y: f64,
    /// Vertical spacing between cave-dense layers.
    pub layer_spacing: f64,
    /// Peak density bonus at a layer center.
    pub layer_strength: f64,
    pub cheese_enabled: bool,
    pub cheese_frequency: f64,
    pub cheese_threshold: f64,
}

impl Default for CaveSettings {
    fn default() -> Self {
        Self {
            frequency: 0.02,
            threshold: 0.04,
            min_y: 4,
            max_y: 200,
            layer_peak_y: 40.0,
            layer_spacing: 48.0,
            layer_strength: 0.02,
            cheese_enabled: true,
            cheese_frequency: 0.008,
            cheese_threshold: 0.62,
        }
    }
}

/// Cliff uplift parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliffSettings {
    pub frequency: f64,
    pub threshold: f64,
    /// Maximum uplift in blocks at full intensity.
    pub max_height: i64,
    pub block: BlockId,
}

/// One ore type's distribution parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OreSettings {
    pub block: BlockId,
    /// Placement attempts per chunk.
    pub frequency: u32,
    /// Maximum blocks per vein.
    pub vein_size: u32,
    pub peak_y: i64,
    /// Standard deviation of the vertical distribution.
    pub y_spread: f64,
    pub min_y: i64,
    pub max_y: i64,
    pub replaceable: Vec<BlockId>,
    /// Decorrelates this ore's attempts from other ores.
    pub salt: u64,
}

/// Water flood parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterSettings {
    pub water_level: i64,
    /// Frequency of the low-frequency water-region noise.
    pub region_frequency: f64,
    /// Chunks whose region sample exceeds this carry water.
    pub region_threshold: f64,
    /// Minimum region depth sample for the flood to apply.
    pub min_depth: f64,
    pub liquid_block: BlockId,
}

/// Plain data record describing one biome; there is no biome class
/// hierarchy, generators switch on the settings present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiomeConfig {
    pub name: String,
    pub surface_block: BlockId,
    pub subsurface_block: BlockId,
    pub base_block: BlockId,
    pub subsurface_depth: i64,
    pub height_offset: f64,
    pub height_amplitude: f64,
    pub caves: Option<CaveSettings>,
    pub cliff: Option<CliffSettings>,
    pub ores: Vec<OreSettings>,
    pub water: Option<WaterSettings>,
    /// Expected trees per chunk; acceptance per grid cell is density / 64.
    pub tree_density: f64,
    pub tree_trunk_block: BlockId,
    pub tree_leaf_block: BlockId,
}

impl BiomeConfig {
    fn stock_ores() -> Vec<OreSettings> {
        vec![
            OreSettings {
                block: BlockId::COAL_ORE,
                frequency: 14,
                vein_size: 12,
                peak_y: 90,
                y_spread: 40.0,
                min_y: 8,
                max_y: 250,
                replaceable: vec![BlockId::STONE],
                salt: 101,
            },
            OreSettings {
                block: BlockId::IRON_ORE,
                frequency: 9,
                vein_size: 8,
                peak_y: 48,
                y_spread: 28.0,
                min_y: 4,
                max_y: 128,
                replaceable: vec![BlockId::STONE],
                salt: 102,
            },
            OreSettings {
                block: BlockId::GOLD_ORE,
                frequency: 3,
                vein_size: 6,
                peak_y: 28,
                y_spread: 14.0,
                min_y: 2,
                max_y: 64,
                replaceable: vec![BlockId::STONE],
                salt: 103,
            },
            OreSettings {
                block: BlockId::DIAMOND_ORE,
                frequency: 2,
                vein_size: 5,
                peak_y: 12,
                y_spread: 8.0,
                min_y: 1,
                max_y: 32,
                replaceable: vec![BlockId::STONE],
                salt: 104,
            },
        ]
    }

    pub fn plains() -> Self {
        Self {
            name: "plains".to_string(),
            surface_block: BlockId::GRASS,
            subsurface_block: BlockId::DIRT,
            base_block: BlockId::STONE,
            subsurface_depth: 4,
            height_offset: 4.0,
            height_amplitude: 10.0,
            caves: Some(CaveSettings::default()),
            cliff: None,
            ores: Self::stock_ores(),
            water: Some(WaterSettings {
                water_level: 64,
                region_frequency: 0.004,
                region_threshold: 0.25,
                min_depth: 0.05,
                liquid_block: BlockId::WATER,
            }),
            tree_density: 3.0,
            tree_trunk_block: BlockId::OAK_LOG,
            tree_leaf_block: BlockId::OAK_LEAVES,
        }
    }

    pub fn highlands() -> Self {
        Self {
            name: "highlands".to_string(),
            surface_block: BlockId::GRASS,
            subsurface_block: BlockId::DIRT,
            base_block: BlockId::STONE,
            subsurface_depth: 3,
            height_offset: 28.0,
            height_amplitude: 34.0,
            caves: Some(CaveSettings::default()),
            cliff: Some(CliffSettings {
                frequency: 0.006,
                threshold: 0.45,
                max_height: 22,
                block: BlockId::SLATE,
            }),
            ores: Self::stock_ores(),
            water: None,
            tree_density: 1.0,
            tree_trunk_block: BlockId::OAK_LOG,
            tree_leaf_block: BlockId::OAK_LEAVES,
        }
    }

    pub fn desert() -> Self {
        Self {
            name: "desert".to_string(),
            surface_block: BlockId::SAND,
            subsurface_block: BlockId::SAND,
            base_block: BlockId::STONE,
            subsurface_depth: 6,
            height_offset: 2.0,
            height_amplitude: 7.0,
            caves: Some(CaveSettings {
                cheese_enabled: false,
                ..CaveSettings::default()
            }),
            cliff: None,
            ores: Self::stock_ores(),
            water: None,
            tree_density: 0.0,
            tree_trunk_block: BlockId::OAK_LOG,
            tree_leaf_block: BlockId::OAK_LEAVES,
        }
    }

    /// The default biome roster for a new world.
    pub fn stock_set() -> Vec<BiomeConfig> {
        vec![Self::plains(), Self::highlands(), Self::desert()]
    }
}

/// Neighbor slots around a biome region, in the order N, S, E, W, NE, NW,
/// SE, SW (N = +Z, E = +X).
pub const NEIGHBOR_OFFSETS: [(i64, i64); 8] = [
    (0, 1),
    (0, -1),
    (1, 0),
    (-1, 0),
    (1, 1),
    (-1, 1),
    (1, -1),
    (-1, -1),
];

/// Primary biome plus up to eight neighbor configs and the chunk's local
/// position inside its 16×16-chunk biome region. Shipped to generation
/// workers; blending happens worker-side so results stay deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiomeBlendData {
    pub primary: BiomeConfig,
    pub neighbors: [Option<BiomeConfig>; 8],
    /// Chunk position within the region, 0..16 on each axis.
    pub local_x: u32,
    pub local_z: u32,
}

impl BiomeBlendData {
    /// Blend weights for primary + 8 neighbors, normalized to sum 1.
    ///
    /// A neighbor gains weight as the chunk approaches its region edge,
    /// with a linear ramp over the outer quarter of the region; corner
    /// weights are the product of the two edge ramps.
    pub fn weights(&self) -> [f64; 9] {
        let band = BIOME_REGION_CHUNKS as f64 / 4.0;
        let last = BIOME_REGION_CHUNKS as f64 - 1.0;
        let lx = self.local_x as f64;
        let lz = self.local_z as f64;

        let east = ((lx - (last - band)) / band).clamp(0.0, 1.0) * 0.5;
        let west = (((band - 1.0) - lx + 1.0) / band).clamp(0.0, 1.0) * 0.5;
        let north = ((lz - (last - band)) / band).clamp(0.0, 1.0) * 0.5;
        let south = (((band - 1.0) - lz + 1.0) / band).clamp(0.0, 1.0) * 0.5;

        let mut weights = [0.0; 9];
        weights[0] = 1.0;
        let edge = [north, south, east, west];
        for (i, w) in edge.iter().enumerate() {
            if self.neighbors[i].is_some() {
                weights[i + 1] = *w;
            }
        }
        // Corners: NE, NW, SE, SW.
        let corners = [east * north, west * north, east * south, west * south];
        for (i, w) in corners.iter().enumerate() {
            if self.neighbors[i + 4].is_some() {
                weights[i + 5] = *w * 2.0;
            }
        }
        let total: f64 = weights.iter().sum();
        for w in weights.iter_mut() {
            *w /= total;
        }
        weights
    }

    /// Distance-weighted height parameters (offset, amplitude). Block
    /// choices are never blended; they come from the primary config.
    pub fn blended_height_params(&self) -> (f64, f64) {
        let weights = self.weights();
        let mut offset = self.primary.height_offset * weights[0];
        let mut amplitude = self.primary.height_amplitude * weights[0];
        for (i, neighbor) in self.neighbors.iter().enumerate() {
            if let Some(cfg) = neighbor {
                offset += cfg.height_offset * weights[i + 1];
                amplitude += cfg.height_amplitude * weights[i + 1];
            }
        }
        (offset, amplitude)
    }
}

/// Deterministic biome assignment: one config per 16×16-chunk region,
/// chosen by positional hash over the roster.
#[derive(Debug)]
pub struct BiomeProvider {
    seed: u64,
    biomes: Vec<BiomeConfig>,
}

const BIOME_PICK_SALT: u64 = 7001;

impl BiomeProvider {
    pub fn new(seed: u64, biomes: Vec<BiomeConfig>) -> Self {
        debug_assert!(!biomes.is_empty());
        Self { seed, biomes }
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    fn region_biome(&self, region_x: i64, region_z: i64) -> &BiomeConfig {
        let r = position_random(self.seed, region_x, region_z, BIOME_PICK_SALT);
        let idx = ((r * self.biomes.len() as f64) as usize).min(self.biomes.len() - 1);
        &self.biomes[idx]
    }

    /// Blend data for one chunk: its region's biome plus the eight
    /// neighboring regions' biomes (slots collapse to `None` when a
    /// neighbor matches the primary, which keeps worker payloads small).
    pub fn blend_data_for_chunk(&self, column: ColumnPos) -> BiomeBlendData {
        let region_x = column.x.div_euclid(BIOME_REGION_CHUNKS);
        let region_z = column.z.div_euclid(BIOME_REGION_CHUNKS);
        let local_x = column.x.rem_euclid(BIOME_REGION_CHUNKS) as u32;
        let local_z = column.z.rem_euclid(BIOME_REGION_CHUNKS) as u32;

        let primary = self.region_biome(region_x, region_z).clone();
        let mut neighbors: [Option<BiomeConfig>; 8] = Default::default();
        for (i, (dx, dz)) in NEIGHBOR_OFFSETS.iter().enumerate() {
            let cfg = self.region_biome(region_x + dx, region_z + dz);
            if cfg.name != primary.name {
                neighbors[i] = Some(cfg.clone());
            }
        }
        BiomeBlendData {
            primary,
            neighbors,
            local_x,
            local_z,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_one() {
        let mut blend = BiomeBlendData {
            primary: BiomeConfig::plains(),
            neighbors: Default::default(),
            local_x: 15,
            local_z: 0,
        };
        blend.neighbors[2] = Some(BiomeConfig::highlands()); // east
        let weights = blend.weights();
        let total: f64 = weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        // At the far east edge the east neighbor carries real weight.
        assert!(weights[3] > 0.2);
    }

    #[test]
    fn region_interior_is_pure_primary() {
        let mut blend = BiomeBlendData {
            primary: BiomeConfig::plains(),
            neighbors: Default::default(),
            local_x: 8,
            local_z: 8,
        };
        blend.neighbors[0] = Some(BiomeConfig::highlands());
        let (offset, amplitude) = blend.blended_height_params();
        assert_eq!(offset, BiomeConfig::plains().height_offset);
        assert_eq!(amplitude, BiomeConfig::plains().height_amplitude);
    }

    #[test]
    fn provider_is_deterministic_per_region() {
        let provider = BiomeProvider::new(9, BiomeConfig::stock_set());
        let a = provider.blend_data_for_chunk(ColumnPos::new(3, 3));
        let b = provider.blend_data_for_chunk(ColumnPos::new(4, 3));
        // Same region, same primary.
        assert_eq!(a.primary.name, b.primary.name);
        assert_eq!(a.local_x, 3);
        assert_eq!(b.local_x, 4);
    }
}
