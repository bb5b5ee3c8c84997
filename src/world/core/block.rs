use serde::{Deserialize, Serialize};

/// Numeric block identifier. Id 0 is always air.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u16);

impl BlockId {
    pub const AIR: BlockId = BlockId(0);
    pub const STONE: BlockId = BlockId(1);
    pub const DIRT: BlockId = BlockId(2);
    pub const GRASS: BlockId = BlockId(3);
    pub const SAND: BlockId = BlockId(4);
    pub const GRAVEL: BlockId = BlockId(5);
    pub const SNOW: BlockId = BlockId(6);
    pub const WATER: BlockId = BlockId(7);
    pub const OAK_LOG: BlockId = BlockId(8);
    pub const OAK_LEAVES: BlockId = BlockId(9);
    pub const COAL_ORE: BlockId = BlockId(10);
    pub const IRON_ORE: BlockId = BlockId(11);
    pub const GOLD_ORE: BlockId = BlockId(12);
    pub const DIAMOND_ORE: BlockId = BlockId(13);
    pub const TORCH: BlockId = BlockId(14);
    pub const GLASS: BlockId = BlockId(15);
    pub const SLATE: BlockId = BlockId(16);

    #[inline(always)]
    pub fn is_air(&self) -> bool {
        self.0 == 0
    }
}

/// Identifier of a unique face texture in the host's atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureId(pub u16);

/// One of the six axis-aligned face directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaceDirection {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl FaceDirection {
    pub const ALL: [FaceDirection; 6] = [
        FaceDirection::PosX,
        FaceDirection::NegX,
        FaceDirection::PosY,
        FaceDirection::NegY,
        FaceDirection::PosZ,
        FaceDirection::NegZ,
    ];

    /// The four horizontal directions, in +X, -X, +Z, -Z order.
    pub const HORIZONTAL: [FaceDirection; 4] = [
        FaceDirection::PosX,
        FaceDirection::NegX,
        FaceDirection::PosZ,
        FaceDirection::NegZ,
    ];

    /// Stable index 0..6 used by texture and cull tables.
    #[inline(always)]
    pub fn index(&self) -> usize {
        match self {
            FaceDirection::PosX => 0,
            FaceDirection::NegX => 1,
            FaceDirection::PosY => 2,
            FaceDirection::NegY => 3,
            FaceDirection::PosZ => 4,
            FaceDirection::NegZ => 5,
        }
    }

    /// Unit normal for this face.
    pub fn normal(&self) -> [f32; 3] {
        match self {
            FaceDirection::PosX => [1.0, 0.0, 0.0],
            FaceDirection::NegX => [-1.0, 0.0, 0.0],
            FaceDirection::PosY => [0.0, 1.0, 0.0],
            FaceDirection::NegY => [0.0, -1.0, 0.0],
            FaceDirection::PosZ => [0.0, 0.0, 1.0],
            FaceDirection::NegZ => [0.0, 0.0, -1.0],
        }
    }

    /// Integer cell offset toward the face.
    pub fn offset(&self) -> (i64, i64, i64) {
        match self {
            FaceDirection::PosX => (1, 0, 0),
            FaceDirection::NegX => (-1, 0, 0),
            FaceDirection::PosY => (0, 1, 0),
            FaceDirection::NegY => (0, -1, 0),
            FaceDirection::PosZ => (0, 0, 1),
            FaceDirection::NegZ => (0, 0, -1),
        }
    }

    pub fn opposite(&self) -> FaceDirection {
        match self {
            FaceDirection::PosX => FaceDirection::NegX,
            FaceDirection::NegX => FaceDirection::PosX,
            FaceDirection::PosY => FaceDirection::NegY,
            FaceDirection::NegY => FaceDirection::PosY,
            FaceDirection::PosZ => FaceDirection::NegZ,
            FaceDirection::NegZ => FaceDirection::PosZ,
        }
    }

    /// Axis index: 0 = X, 1 = Y, 2 = Z.
    pub fn axis(&self) -> usize {
        match self {
            FaceDirection::PosX | FaceDirection::NegX => 0,
            FaceDirection::PosY | FaceDirection::NegY => 1,
            FaceDirection::PosZ | FaceDirection::NegZ => 2,
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(
            self,
            FaceDirection::PosX | FaceDirection::PosY | FaceDirection::PosZ
        )
    }

    pub fn is_horizontal(&self) -> bool {
        !matches!(self, FaceDirection::PosY | FaceDirection::NegY)
    }
}

/// Static, data-only description of a block type.
///
/// Behavior lives in tables built by the registry (face culling, textures);
/// there is no per-block dispatch.
#[derive(Debug, Clone)]
pub struct BlockProperties {
    pub name: &'static str,
    pub is_opaque: bool,
    pub is_solid: bool,
    pub is_liquid: bool,
    /// Skylight attenuation 0..=15 when passing through this block.
    pub light_blocking: u8,
    /// Blocklight emission 0..=15.
    pub light_level: u8,
    pub hardness: f32,
    pub tags: &'static [&'static str],
    /// Texture per face, indexed by [`FaceDirection::index`].
    pub textures: [TextureId; 6],
    /// Custom-geometry blocks skipped by the greedy mesher and returned as
    /// instances (torches and the like).
    pub non_greedy: bool,
    /// Rendered in the transparent pass (leaves, glass, water).
    pub transparent_render: bool,
}

impl BlockProperties {
    /// The properties of air; also the fallback for unknown ids.
    pub fn air() -> Self {
        Self {
            name: "air",
            is_opaque: false,
            is_solid: false,
            is_liquid: false,
            light_blocking: 0,
            light_level: 0,
            hardness: 0.0,
            tags: &[],
            textures: [TextureId(0); 6],
            non_greedy: false,
            transparent_render: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_indices_are_stable() {
        for (i, face) in FaceDirection::ALL.iter().enumerate() {
            assert_eq!(face.index(), i);
            assert_eq!(face.opposite().opposite(), *face);
        }
    }

    #[test]
    fn air_is_zero() {
        assert!(BlockId::AIR.is_air());
        assert!(!BlockId::STONE.is_air());
    }
}
