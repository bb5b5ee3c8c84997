//! World grid constants.
//!
//! Every component agrees on these values; generation Y-ranges, lighting
//! boundary layers, and persistence record sizes all derive from them.

/// Horizontal chunk footprint along X, in blocks.
pub const CHUNK_SIZE_X: usize = 32;

/// Horizontal chunk footprint along Z, in blocks.
pub const CHUNK_SIZE_Z: usize = 32;

/// Height of one sub-chunk, in blocks.
pub const SUB_CHUNK_HEIGHT: usize = 64;

/// Sub-chunks stacked in one column.
pub const SUB_CHUNK_COUNT: usize = 16;

/// Full world height in blocks.
pub const WORLD_HEIGHT: usize = SUB_CHUNK_HEIGHT * SUB_CHUNK_COUNT;

/// Cells in one sub-chunk.
pub const SUB_CHUNK_VOLUME: usize = CHUNK_SIZE_X * CHUNK_SIZE_Z * SUB_CHUNK_HEIGHT;

/// Cells in one horizontal layer of a sub-chunk.
pub const LAYER_AREA: usize = CHUNK_SIZE_X * CHUNK_SIZE_Z;

/// Cells in one vertical face slice of a sub-chunk (32 wide, 64 tall).
pub const FACE_AREA: usize = CHUNK_SIZE_X * SUB_CHUNK_HEIGHT;

/// Maximum stored light level for either channel.
pub const MAX_LIGHT: u8 = 15;

/// Maximum skylight on the doubled internal propagation scale.
pub const MAX_LIGHT_INTERNAL: u8 = 30;

/// Side length of a biome region, in chunks.
pub const BIOME_REGION_CHUNKS: i64 = 16;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_constants_are_consistent() {
        assert_eq!(WORLD_HEIGHT, 1024);
        assert_eq!(SUB_CHUNK_VOLUME, 65_536);
        assert_eq!(LAYER_AREA, 1024);
        assert_eq!(FACE_AREA, 2048);
    }
}
