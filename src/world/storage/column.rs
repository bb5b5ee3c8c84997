use crate::constants::{SUB_CHUNK_COUNT, SUB_CHUNK_HEIGHT, WORLD_HEIGHT};
use crate::world::core::{BlockId, BlockRegistry, ColumnPos, SubChunkPos};
use crate::world::storage::{SubChunk, SubChunkState};

/// A 32×32 footprint extending the full world height, as sixteen optional
/// sub-chunks. The column uniquely owns its sub-chunks.
#[derive(Debug)]
pub struct ChunkColumn {
    position: ColumnPos,
    sub_chunks: [Option<SubChunk>; SUB_CHUNK_COUNT],
}

impl ChunkColumn {
    pub fn new(position: ColumnPos) -> Self {
        Self {
            position,
            sub_chunks: Default::default(),
        }
    }

    pub fn position(&self) -> ColumnPos {
        self.position
    }

    pub fn sub_chunk(&self, sub_y: usize) -> Option<&SubChunk> {
        self.sub_chunks.get(sub_y).and_then(|s| s.as_ref())
    }

    pub fn sub_chunk_mut(&mut self, sub_y: usize) -> Option<&mut SubChunk> {
        self.sub_chunks.get_mut(sub_y).and_then(|s| s.as_mut())
    }

    /// Sub-chunk at the slot, created empty if missing. Writes auto-create.
    pub fn sub_chunk_or_create(&mut self, sub_y: usize) -> &mut SubChunk {
        debug_assert!(sub_y < SUB_CHUNK_COUNT);
        let slot = &mut self.sub_chunks[sub_y];
        if slot.is_none() {
            *slot = Some(SubChunk::new(SubChunkPos::from_column(
                self.position,
                sub_y as u8,
            )));
        }
        slot.as_mut().expect("slot populated above")
    }

    /// Replace a slot wholesale, returning the previous occupant.
    pub fn replace_sub_chunk(&mut self, sub_y: usize, sub: SubChunk) -> Option<SubChunk> {
        self.sub_chunks[sub_y].replace(sub)
    }

    pub fn iter_sub_chunks(&self) -> impl Iterator<Item = &SubChunk> {
        self.sub_chunks.iter().filter_map(|s| s.as_ref())
    }

    pub fn iter_sub_chunks_mut(&mut self) -> impl Iterator<Item = &mut SubChunk> {
        self.sub_chunks.iter_mut().filter_map(|s| s.as_mut())
    }

    fn split_y(world_y: i64) -> Option<(usize, usize)> {
        if world_y < 0 || world_y >= WORLD_HEIGHT as i64 {
            return None;
        }
        Some((
            world_y as usize / SUB_CHUNK_HEIGHT,
            world_y as usize % SUB_CHUNK_HEIGHT,
        ))
    }

    /// Block at (local x, world y, local z); air when the sub-chunk is
    /// missing or y is outside the world.
    pub fn get_block_world(&self, local_x: usize, world_y: i64, local_z: usize) -> BlockId {
        match Self::split_y(world_y) {
            Some((sub_y, ly)) => self
                .sub_chunk(sub_y)
                .map(|s| s.get_block(local_x, ly, local_z))
                .unwrap_or(BlockId::AIR),
            None => BlockId::AIR,
        }
    }

    /// Set a block at world Y, creating the sub-chunk if needed. Returns
    /// true iff the value changed.
    pub fn set_block_world(
        &mut self,
        local_x: usize,
        world_y: i64,
        local_z: usize,
        id: BlockId,
    ) -> bool {
        match Self::split_y(world_y) {
            Some((sub_y, ly)) => {
                // Avoid materializing a sub-chunk just to write air into it.
                if id.is_air() && self.sub_chunk(sub_y).is_none() {
                    return false;
                }
                self.sub_chunk_or_create(sub_y)
                    .set_block(local_x, ly, local_z, id)
            }
            None => false,
        }
    }

    /// Skylight at world Y; missing sub-chunks read as full sky (15).
    pub fn get_skylight_world(&self, local_x: usize, world_y: i64, local_z: usize) -> u8 {
        match Self::split_y(world_y) {
            Some((sub_y, ly)) => self
                .sub_chunk(sub_y)
                .map(|s| s.get_skylight(local_x, ly, local_z))
                .unwrap_or(15),
            None => 15,
        }
    }

    pub fn set_skylight_world(&mut self, local_x: usize, world_y: i64, local_z: usize, level: u8) {
        if let Some((sub_y, ly)) = Self::split_y(world_y) {
            self.sub_chunk_or_create(sub_y)
                .set_skylight(local_x, ly, local_z, level);
        }
    }

    pub fn get_blocklight_world(&self, local_x: usize, world_y: i64, local_z: usize) -> u8 {
        match Self::split_y(world_y) {
            Some((sub_y, ly)) => self
                .sub_chunk(sub_y)
                .map(|s| s.get_blocklight(local_x, ly, local_z))
                .unwrap_or(0),
            None => 0,
        }
    }

    /// Combined light level at world Y.
    pub fn get_light_level_world(&self, local_x: usize, world_y: i64, local_z: usize) -> u8 {
        match Self::split_y(world_y) {
            Some((sub_y, ly)) => self
                .sub_chunk(sub_y)
                .map(|s| s.get_light_level(local_x, ly, local_z))
                .unwrap_or(15),
            None => 15,
        }
    }

    /// World Y of the highest non-air block in the (x, z) column, scanning
    /// sub-chunks top-down. `None` for an empty column.
    pub fn highest_block_at(&self, local_x: usize, local_z: usize) -> Option<i64> {
        for sub_y in (0..SUB_CHUNK_COUNT).rev() {
            let Some(sub) = self.sub_chunk(sub_y) else {
                continue;
            };
            for ly in (0..SUB_CHUNK_HEIGHT).rev() {
                if !sub.get_block(local_x, ly, local_z).is_air() {
                    return Some((sub_y * SUB_CHUNK_HEIGHT + ly) as i64);
                }
            }
        }
        None
    }

    /// World Y of the top of the grounded stack at (x, z): scans bottom-up
    /// and stops at the first air gap. `None` if y = 0 is air.
    pub fn grounded_height_at(&self, local_x: usize, local_z: usize) -> Option<i64> {
        if self.get_block_world(local_x, 0, local_z).is_air() {
            return None;
        }
        let mut top = 0i64;
        for y in 1..WORLD_HEIGHT as i64 {
            if self.get_block_world(local_x, y, local_z).is_air() {
                break;
            }
            top = y;
        }
        Some(top)
    }

    /// True iff no opaque block exists at or above the given world Y in the
    /// (x, z) column. Missing sub-chunks are treated as transparent.
    pub fn has_sky_access(
        &self,
        registry: &BlockRegistry,
        local_x: usize,
        world_y: i64,
        local_z: usize,
    ) -> bool {
        let start = world_y.max(0);
        for y in start..WORLD_HEIGHT as i64 {
            let block = self.get_block_world(local_x, y, local_z);
            if registry.light_blocking(block) >= 15 {
                return false;
            }
        }
        true
    }

    /// Sub-Y slots that currently hold generated data.
    pub fn populated_sub_ys(&self) -> Vec<usize> {
        (0..SUB_CHUNK_COUNT)
            .filter(|&i| self.sub_chunks[i].is_some())
            .collect()
    }

    /// Sub-chunks flagged as modified by the player, for checkpointing.
    pub fn modified_sub_chunks(&self) -> impl Iterator<Item = &SubChunk> {
        self.iter_sub_chunks().filter(|s| s.is_modified_by_player())
    }

    /// Drop sub-chunk contents prior to unload.
    pub fn dispose(&mut self) {
        for slot in self.sub_chunks.iter_mut() {
            if let Some(sub) = slot.as_mut() {
                sub.set_state(SubChunkState::Unloaded);
            }
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column() -> ChunkColumn {
        ChunkColumn::new(ColumnPos::new(0, 0))
    }

    #[test]
    fn world_y_addressing_delegates() {
        let mut col = column();
        assert!(col.set_block_world(5, 100, 6, BlockId::STONE));
        // y = 100 lives in sub-chunk 1 at local y 36.
        assert_eq!(
            col.sub_chunk(1)
                .map(|s| s.get_block(5, 36, 6)),
            Some(BlockId::STONE)
        );
        assert_eq!(col.get_block_world(5, 100, 6), BlockId::STONE);
        assert_eq!(col.get_block_world(5, -5, 6), BlockId::AIR);
        assert_eq!(col.get_block_world(5, 5000, 6), BlockId::AIR);
    }

    #[test]
    fn missing_sub_chunks_read_defaults() {
        let col = column();
        assert_eq!(col.get_block_world(0, 500, 0), BlockId::AIR);
        assert_eq!(col.get_skylight_world(0, 500, 0), 15);
        assert_eq!(col.get_blocklight_world(0, 500, 0), 0);
    }

    #[test]
    fn writing_air_does_not_materialize() {
        let mut col = column();
        assert!(!col.set_block_world(0, 10, 0, BlockId::AIR));
        assert!(col.sub_chunk(0).is_none());
    }

    #[test]
    fn highest_block_scans_top_down() {
        let mut col = column();
        col.set_block_world(3, 10, 3, BlockId::STONE);
        col.set_block_world(3, 200, 3, BlockId::DIRT);
        assert_eq!(col.highest_block_at(3, 3), Some(200));
        assert_eq!(col.highest_block_at(0, 0), None);
    }

    #[test]
    fn grounded_height_stops_at_first_gap() {
        let mut col = column();
        for y in 0..=5 {
            col.set_block_world(1, y, 1, BlockId::STONE);
        }
        // Floating block above the gap must not count.
        col.set_block_world(1, 10, 1, BlockId::STONE);
        assert_eq!(col.grounded_height_at(1, 1), Some(5));
        assert_eq!(col.grounded_height_at(2, 2), None);
    }

    #[test]
    fn sky_access_sees_through_missing_sub_chunks() {
        let registry = BlockRegistry::with_stock_blocks();
        let mut col = column();
        assert!(col.has_sky_access(&registry, 0, 0, 0));
        col.set_block_world(0, 700, 0, BlockId::STONE);
        assert!(!col.has_sky_access(&registry, 0, 0, 0));
        assert!(col.has_sky_access(&registry, 0, 701, 0));
    }
}
