use serde::{Deserialize, Serialize};

use crate::constants::{
    CHUNK_SIZE_X, CHUNK_SIZE_Z, LAYER_AREA, SUB_CHUNK_COUNT, SUB_CHUNK_HEIGHT, WORLD_HEIGHT,
};

/// Position of a chunk column in the world (chunk coordinates).
///
/// Coordinates are 64-bit: the world is large enough that 32-bit chunk
/// coordinates could plausibly overflow, and negative coordinates must
/// round toward negative infinity everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnPos {
    pub x: i64,
    pub z: i64,
}

impl ColumnPos {
    pub fn new(x: i64, z: i64) -> Self {
        Self { x, z }
    }

    /// Column containing the given world position. Floor division, not a
    /// bit-shift: chunk coordinates can be negative.
    pub fn from_world(world_x: i64, world_z: i64) -> Self {
        Self {
            x: world_x.div_euclid(CHUNK_SIZE_X as i64),
            z: world_z.div_euclid(CHUNK_SIZE_Z as i64),
        }
    }

    /// World coordinate of this column's minimum corner.
    pub fn min_world(&self) -> (i64, i64) {
        (self.x * CHUNK_SIZE_X as i64, self.z * CHUNK_SIZE_Z as i64)
    }

    pub fn offset(&self, dx: i64, dz: i64) -> Self {
        Self::new(self.x + dx, self.z + dz)
    }

    /// Squared horizontal distance in chunks.
    pub fn distance_squared_to(&self, other: ColumnPos) -> i64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        dx * dx + dz * dz
    }

    /// Horizontal distance in chunks.
    pub fn distance_to(&self, other: ColumnPos) -> f64 {
        (self.distance_squared_to(other) as f64).sqrt()
    }

    /// The four horizontally adjacent columns, in +X, -X, +Z, -Z order.
    pub fn neighbors(&self) -> [ColumnPos; 4] {
        [
            self.offset(1, 0),
            self.offset(-1, 0),
            self.offset(0, 1),
            self.offset(0, -1),
        ]
    }
}

/// Position of a sub-chunk: a column plus a vertical slot 0..16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubChunkPos {
    pub column: ColumnPos,
    pub sub_y: u8,
}

impl SubChunkPos {
    pub fn new(chunk_x: i64, chunk_z: i64, sub_y: u8) -> Self {
        debug_assert!((sub_y as usize) < SUB_CHUNK_COUNT);
        Self {
            column: ColumnPos::new(chunk_x, chunk_z),
            sub_y,
        }
    }

    pub fn from_column(column: ColumnPos, sub_y: u8) -> Self {
        Self { column, sub_y }
    }

    /// Lowest world Y covered by this sub-chunk.
    pub fn min_world_y(&self) -> i64 {
        self.sub_y as i64 * SUB_CHUNK_HEIGHT as i64
    }

    /// Highest world Y covered by this sub-chunk.
    pub fn max_world_y(&self) -> i64 {
        self.min_world_y() + SUB_CHUNK_HEIGHT as i64 - 1
    }

    /// Same slot in a horizontally adjacent column.
    pub fn offset(&self, dx: i64, dz: i64) -> Self {
        Self {
            column: self.column.offset(dx, dz),
            sub_y: self.sub_y,
        }
    }

    /// The sub-chunk directly above, if any.
    pub fn above(&self) -> Option<Self> {
        if (self.sub_y as usize) + 1 < SUB_CHUNK_COUNT {
            Some(Self {
                column: self.column,
                sub_y: self.sub_y + 1,
            })
        } else {
            None
        }
    }

    /// The sub-chunk directly below, if any.
    pub fn below(&self) -> Option<Self> {
        if self.sub_y > 0 {
            Some(Self {
                column: self.column,
                sub_y: self.sub_y - 1,
            })
        } else {
            None
        }
    }
}

/// A block position in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoxelPos {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl VoxelPos {
    pub fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    pub fn column(&self) -> ColumnPos {
        ColumnPos::from_world(self.x, self.z)
    }

    /// Sub-chunk containing this voxel, or `None` outside the world's
    /// vertical range.
    pub fn sub_chunk(&self) -> Option<SubChunkPos> {
        let sub_y = sub_y_of_world_y(self.y)?;
        Some(SubChunkPos::from_column(self.column(), sub_y as u8))
    }

    pub fn offset(&self, dx: i64, dy: i64, dz: i64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

/// Local horizontal coordinates within a column, via Euclidean modulus.
pub fn world_to_local(world_x: i64, world_z: i64) -> (usize, usize) {
    (
        world_x.rem_euclid(CHUNK_SIZE_X as i64) as usize,
        world_z.rem_euclid(CHUNK_SIZE_Z as i64) as usize,
    )
}

/// World coordinates of a local cell in the given column.
pub fn local_to_world(column: ColumnPos, local_x: usize, local_z: usize) -> (i64, i64) {
    (
        column.x * CHUNK_SIZE_X as i64 + local_x as i64,
        column.z * CHUNK_SIZE_Z as i64 + local_z as i64,
    )
}

/// Vertical slot of a world Y coordinate, or `None` outside [0, WORLD_HEIGHT).
pub fn sub_y_of_world_y(world_y: i64) -> Option<usize> {
    if world_y < 0 || world_y >= WORLD_HEIGHT as i64 {
        return None;
    }
    Some(world_y as usize / SUB_CHUNK_HEIGHT)
}

/// Flat Y-major index of a local cell within a sub-chunk.
#[inline(always)]
pub fn local_index(x: usize, y: usize, z: usize) -> usize {
    y * LAYER_AREA + z * CHUNK_SIZE_X + x
}

/// Inverse of [`local_index`].
#[inline(always)]
pub fn index_to_local(index: usize) -> (usize, usize, usize) {
    let y = index / LAYER_AREA;
    let rem = index % LAYER_AREA;
    (rem % CHUNK_SIZE_X, y, rem / CHUNK_SIZE_X)
}

/// True iff the local coordinates address a cell inside one sub-chunk.
#[inline(always)]
pub fn local_in_bounds(x: usize, y: usize, z: usize) -> bool {
    x < CHUNK_SIZE_X && y < SUB_CHUNK_HEIGHT && z < CHUNK_SIZE_Z
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_world_coordinates_floor() {
        assert_eq!(ColumnPos::from_world(-1, -1), ColumnPos::new(-1, -1));
        assert_eq!(ColumnPos::from_world(-32, -33), ColumnPos::new(-1, -2));
        assert_eq!(ColumnPos::from_world(31, 32), ColumnPos::new(0, 1));
        assert_eq!(world_to_local(-1, -33), (31, 31));
    }

    #[test]
    fn index_round_trip() {
        for &(x, y, z) in &[(0, 0, 0), (31, 63, 31), (5, 17, 23)] {
            let idx = local_index(x, y, z);
            assert_eq!(index_to_local(idx), (x, y, z));
        }
        assert_eq!(local_index(1, 2, 3), 2 * 1024 + 3 * 32 + 1);
    }

    #[test]
    fn sub_y_ranges() {
        assert_eq!(sub_y_of_world_y(-1), None);
        assert_eq!(sub_y_of_world_y(0), Some(0));
        assert_eq!(sub_y_of_world_y(63), Some(0));
        assert_eq!(sub_y_of_world_y(64), Some(1));
        assert_eq!(sub_y_of_world_y(1023), Some(15));
        assert_eq!(sub_y_of_world_y(1024), None);

        let pos = SubChunkPos::new(2, -3, 4);
        assert_eq!(pos.min_world_y(), 256);
        assert_eq!(pos.max_world_y(), 319);
    }

    #[test]
    fn local_world_round_trip() {
        let col = ColumnPos::new(-2, 5);
        let (wx, wz) = local_to_world(col, 7, 31);
        assert_eq!(ColumnPos::from_world(wx, wz), col);
        assert_eq!(world_to_local(wx, wz), (7, 31));
    }
}
