use crate::world::core::{BlockId, FaceDirection, TextureId};

/// Floats per vertex: position, uv, normal, color.
pub const FLOATS_PER_VERTEX: usize = 11;

/// One run of quads sharing a texture, face direction, and render pass.
/// Vertices are tightly packed `[x, y, z, u, v, nx, ny, nz, r, g, b]`.
#[derive(Debug, Clone)]
pub struct MeshGroup {
    pub texture: TextureId,
    pub face: FaceDirection,
    pub transparent: bool,
    pub vertices: Vec<f32>,
    pub indices: Vec<u16>,
}

impl MeshGroup {
    pub fn new(texture: TextureId, face: FaceDirection, transparent: bool) -> Self {
        Self {
            texture,
            face,
            transparent,
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / FLOATS_PER_VERTEX
    }

    pub fn quad_count(&self) -> usize {
        self.indices.len() / 6
    }
}

/// Custom-geometry block instances the renderer draws itself.
#[derive(Debug, Clone)]
pub struct NonGreedyBlocks {
    pub block: BlockId,
    /// World-space positions, three floats each.
    pub positions: Vec<[f32; 3]>,
    /// Max surrounding light per instance, parallel to `positions`.
    pub light_levels: Vec<u8>,
}

/// Complete mesh output for one sub-chunk.
#[derive(Debug, Clone, Default)]
pub struct SubChunkMesh {
    pub opaque: Vec<MeshGroup>,
    pub transparent: Vec<MeshGroup>,
    pub non_greedy: Vec<NonGreedyBlocks>,
}

impl SubChunkMesh {
    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty() && self.transparent.is_empty() && self.non_greedy.is_empty()
    }

    pub fn quad_count(&self) -> usize {
        self.opaque
            .iter()
            .chain(self.transparent.iter())
            .map(|g| g.quad_count())
            .sum()
    }
}

/// Perceptual brightness for a 0–15 light level, written into the vertex
/// color channel. Gamma 2.2 with a small floor so nothing renders pitch
/// black.
pub fn brightness(light: u8) -> f32 {
    let normalized = (light.min(15) as f32) / 15.0;
    0.02 + normalized.powf(2.2) * 0.98
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brightness_curve_endpoints() {
        assert!((brightness(0) - 0.02).abs() < 1e-6);
        assert!((brightness(15) - 1.0).abs() < 1e-6);
        assert!(brightness(8) > brightness(7));
    }

    #[test]
    fn group_counts() {
        let mut group = MeshGroup::new(TextureId(1), FaceDirection::PosY, false);
        group.vertices.extend(std::iter::repeat(0.0).take(FLOATS_PER_VERTEX * 4));
        group.indices.extend([0, 1, 2, 0, 2, 3]);
        assert_eq!(group.vertex_count(), 4);
        assert_eq!(group.quad_count(), 1);
    }
}
