use crate::world::core::{BlockId, BlockProperties, FaceDirection, TextureId};

/// Block registry: a context object built once at startup and shared with
/// worker pools. Holds the properties table plus the precomputed tables the
/// hot paths read (face culling, per-face textures).
///
/// Not a process-wide singleton; the engine owns one and hands `Arc` clones
/// to workers.
#[derive(Debug)]
pub struct BlockRegistry {
    props: Vec<BlockProperties>,
    /// `cull[(block * n + neighbor) * 6 + face]` — true iff the face of
    /// `block` against `neighbor` should be emitted.
    cull: Vec<bool>,
}

impl BlockRegistry {
    /// Registry with the engine's stock block set.
    pub fn with_stock_blocks() -> Self {
        let mut reg = Self {
            props: Vec::new(),
            cull: Vec::new(),
        };
        reg.register_stock_blocks();
        reg.build_cull_table();
        reg
    }

    /// Empty registry containing only air. Callers must register blocks and
    /// then rebuild the cull table.
    pub fn empty() -> Self {
        let mut reg = Self {
            props: vec![BlockProperties::air()],
            cull: Vec::new(),
        };
        reg.build_cull_table();
        reg
    }

    /// Register a block at the next free id.
    pub fn register(&mut self, props: BlockProperties) -> BlockId {
        let id = BlockId(self.props.len() as u16);
        self.props.push(props);
        id
    }

    pub fn block_count(&self) -> usize {
        self.props.len()
    }

    /// Properties for an id; unknown ids read as air.
    #[inline(always)]
    pub fn get(&self, id: BlockId) -> &BlockProperties {
        self.props.get(id.0 as usize).unwrap_or(&self.props[0])
    }

    #[inline(always)]
    pub fn is_opaque(&self, id: BlockId) -> bool {
        self.get(id).is_opaque
    }

    #[inline(always)]
    pub fn is_solid(&self, id: BlockId) -> bool {
        self.get(id).is_solid
    }

    #[inline(always)]
    pub fn light_blocking(&self, id: BlockId) -> u8 {
        self.get(id).light_blocking
    }

    #[inline(always)]
    pub fn light_emission(&self, id: BlockId) -> u8 {
        self.get(id).light_level
    }

    #[inline(always)]
    pub fn texture_for_face(&self, id: BlockId, face: FaceDirection) -> TextureId {
        self.get(id).textures[face.index()]
    }

    /// Face-cull lookup. Out-of-range ids cull like air.
    #[inline(always)]
    pub fn should_render_face(
        &self,
        block: BlockId,
        neighbor: BlockId,
        face: FaceDirection,
    ) -> bool {
        let n = self.props.len();
        let (b, nb) = (block.0 as usize, neighbor.0 as usize);
        if b >= n || nb >= n {
            return !block.is_air();
        }
        self.cull[(b * n + nb) * 6 + face.index()]
    }

    /// Ids of all fully opaque blocks, for worker payloads.
    pub fn opaque_ids(&self) -> Vec<BlockId> {
        self.ids_where(|p| p.is_opaque)
    }

    /// Ids the greedy mesher must skip.
    pub fn non_greedy_ids(&self) -> Vec<BlockId> {
        self.ids_where(|p| p.non_greedy)
    }

    /// Ids rendered in the transparent pass.
    pub fn transparent_ids(&self) -> Vec<BlockId> {
        self.ids_where(|p| p.transparent_render)
    }

    /// Serialized `block_id * 6 + face -> texture` pairs, the form mesh
    /// workers cache after their first job.
    pub fn face_texture_map(&self) -> Vec<(u32, TextureId)> {
        let mut map = Vec::with_capacity(self.props.len() * 6);
        for (id, props) in self.props.iter().enumerate() {
            for face in FaceDirection::ALL {
                map.push((id as u32 * 6 + face.index() as u32, props.textures[face.index()]));
            }
        }
        map
    }

    fn ids_where(&self, pred: impl Fn(&BlockProperties) -> bool) -> Vec<BlockId> {
        self.props
            .iter()
            .enumerate()
            .filter(|(_, p)| pred(p))
            .map(|(i, _)| BlockId(i as u16))
            .collect()
    }

    /// Flatten the face-cull policy into a table so the mesher never
    /// consults properties per cell.
    ///
    /// A face is emitted when the block is not air, the neighbor is not
    /// opaque, and the neighbor is not the same transparent/liquid block
    /// (adjacent water cells share no internal faces).
    pub fn build_cull_table(&mut self) {
        let n = self.props.len();
        let mut cull = vec![false; n * n * 6];
        for b in 0..n {
            let bp = &self.props[b];
            if b == 0 {
                continue;
            }
            for nb in 0..n {
                let np = &self.props[nb];
                let mut visible = !np.is_opaque;
                if visible && b == nb && (bp.is_liquid || bp.transparent_render) {
                    visible = false;
                }
                for face in 0..6 {
                    cull[(b * n + nb) * 6 + face] = visible;
                }
            }
        }
        self.cull = cull;
    }

    fn register_stock_blocks(&mut self) {
        let opaque = |name, tex: u16, hardness, tags| BlockProperties {
            name,
            is_opaque: true,
            is_solid: true,
            is_liquid: false,
            light_blocking: 15,
            light_level: 0,
            hardness,
            tags,
            textures: [TextureId(tex); 6],
            non_greedy: false,
            transparent_render: false,
        };

        self.register(BlockProperties::air());
        self.register(opaque("stone", 1, 1.5, &["mineable"]));
        debug_assert_eq!(self.props.len() - 1, BlockId::STONE.0 as usize);
        self.register(opaque("dirt", 2, 0.5, &["diggable"]));

        // Grass has a distinct top and bottom.
        let mut grass = opaque("grass", 3, 0.6, &["diggable"]);
        grass.textures[FaceDirection::PosY.index()] = TextureId(4);
        grass.textures[FaceDirection::NegY.index()] = TextureId(2);
        self.register(grass);

        self.register(opaque("sand", 5, 0.5, &["diggable", "falling"]));
        self.register(opaque("gravel", 6, 0.6, &["diggable", "falling"]));
        self.register(opaque("snow", 7, 0.2, &["diggable"]));

        self.register(BlockProperties {
            name: "water",
            is_opaque: false,
            is_solid: false,
            is_liquid: true,
            light_blocking: 1,
            light_level: 0,
            hardness: 100.0,
            tags: &["liquid"],
            textures: [TextureId(8); 6],
            non_greedy: false,
            transparent_render: true,
        });

        let mut log = opaque("oak_log", 9, 2.0, &["mineable", "wood"]);
        log.textures[FaceDirection::PosY.index()] = TextureId(10);
        log.textures[FaceDirection::NegY.index()] = TextureId(10);
        self.register(log);

        self.register(BlockProperties {
            name: "oak_leaves",
            is_opaque: false,
            is_solid: true,
            is_liquid: false,
            light_blocking: 1,
            light_level: 0,
            hardness: 0.2,
            tags: &["diggable", "wood"],
            textures: [TextureId(11); 6],
            non_greedy: false,
            transparent_render: true,
        });

        self.register(opaque("coal_ore", 12, 3.0, &["mineable", "ore"]));
        self.register(opaque("iron_ore", 13, 3.0, &["mineable", "ore"]));
        self.register(opaque("gold_ore", 14, 3.0, &["mineable", "ore"]));
        self.register(opaque("diamond_ore", 15, 3.0, &["mineable", "ore"]));

        self.register(BlockProperties {
            name: "torch",
            is_opaque: false,
            is_solid: false,
            is_liquid: false,
            light_blocking: 0,
            light_level: 14,
            hardness: 0.0,
            tags: &["light_source"],
            textures: [TextureId(16); 6],
            non_greedy: true,
            transparent_render: false,
        });

        self.register(BlockProperties {
            name: "glass",
            is_opaque: false,
            is_solid: true,
            is_liquid: false,
            light_blocking: 0,
            light_level: 0,
            hardness: 0.3,
            tags: &[],
            textures: [TextureId(17); 6],
            non_greedy: false,
            transparent_render: true,
        });

        self.register(opaque("slate", 18, 2.5, &["mineable"]));
        debug_assert_eq!(self.props.len() - 1, BlockId::SLATE.0 as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_ids_match_constants() {
        let reg = BlockRegistry::with_stock_blocks();
        assert_eq!(reg.get(BlockId::STONE).name, "stone");
        assert_eq!(reg.get(BlockId::WATER).name, "water");
        assert_eq!(reg.get(BlockId::TORCH).name, "torch");
        assert_eq!(reg.get(BlockId::SLATE).name, "slate");
        assert_eq!(reg.get(BlockId(999)).name, "air");
    }

    #[test]
    fn cull_table_matches_policy() {
        let reg = BlockRegistry::with_stock_blocks();
        // Stone face against air is visible; against stone it is not.
        assert!(reg.should_render_face(BlockId::STONE, BlockId::AIR, FaceDirection::PosX));
        assert!(!reg.should_render_face(BlockId::STONE, BlockId::STONE, FaceDirection::PosX));
        // Water against water shares no internal faces, water against air does.
        assert!(!reg.should_render_face(BlockId::WATER, BlockId::WATER, FaceDirection::PosY));
        assert!(reg.should_render_face(BlockId::WATER, BlockId::AIR, FaceDirection::PosY));
        // Air never renders.
        assert!(!reg.should_render_face(BlockId::AIR, BlockId::AIR, FaceDirection::PosY));
        // Stone behind leaves is still visible.
        assert!(reg.should_render_face(BlockId::STONE, BlockId::OAK_LEAVES, FaceDirection::NegZ));
    }

    #[test]
    fn id_lists_cover_stock_set() {
        let reg = BlockRegistry::with_stock_blocks();
        assert!(reg.opaque_ids().contains(&BlockId::STONE));
        assert!(!reg.opaque_ids().contains(&BlockId::WATER));
        assert_eq!(reg.non_greedy_ids(), vec![BlockId::TORCH]);
        assert!(reg.transparent_ids().contains(&BlockId::OAK_LEAVES));
        assert_eq!(reg.face_texture_map().len(), reg.block_count() * 6);
    }
}
