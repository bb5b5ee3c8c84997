// Persistence integration: player edits survive a checkpoint, and a new
// engine over the same backend streams the saved sub-chunk back in
// instead of regenerating it.

use std::time::Duration;

use strata_engine::world::generation::BiomeConfig;
use strata_engine::{BlockId, Engine, EngineConfig, MemoryStore, SubChunkPos};

fn flat_config(seed: u64) -> EngineConfig {
    let mut biome = BiomeConfig::plains();
    biome.height_offset = 0.0;
    biome.height_amplitude = 0.0;
    biome.caves = None;
    biome.water = None;
    biome.tree_density = 0.0;
    biome.ores.clear();
    EngineConfig {
        seed,
        chunk_distance: 2,
        generation_workers: 2,
        lighting_workers: 2,
        mesh_workers: 2,
        biomes: vec![biome],
        ..EngineConfig::default()
    }
}

fn pump_until(engine: &mut Engine, mut done: impl FnMut(&Engine) -> bool, max_ticks: usize) -> bool {
    for _ in 0..max_ticks {
        engine.tick();
        if done(engine) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    false
}

#[test]
fn edited_world_reloads_from_the_store() {
    let backend = MemoryStore::new();
    let surface_sub = SubChunkPos::new(0, 0, 1);

    // First session: generate, edit, checkpoint.
    {
        let mut engine = Engine::new(flat_config(11));
        engine.set_persistence(Box::new(backend.clone()));
        engine.set_player(16.0, 80.0, 16.0);
        assert!(
            pump_until(&mut engine, |e| e.is_sub_chunk_generated(surface_sub), 4000),
            "first session never generated the surface"
        );
        assert!(engine.set_block(7, 70, 7, BlockId::GLASS));
        assert!(engine.set_block(9, 72, 9, BlockId::TORCH));
        engine.checkpoint();
        engine.dispose();
    }
    assert!(!backend.is_empty());

    // Second session over the same backend: the edited sub-chunk must come
    // back from storage, edits intact, counted as a load rather than a
    // generation of fresh terrain that would erase them.
    {
        let mut engine = Engine::new(flat_config(11));
        engine.set_persistence(Box::new(backend.clone()));
        engine.set_player(16.0, 80.0, 16.0);
        assert!(
            pump_until(&mut engine, |e| e.is_sub_chunk_generated(surface_sub), 4000),
            "second session never loaded the surface"
        );
        assert_eq!(engine.get_block(7, 70, 7), BlockId::GLASS);
        assert_eq!(engine.get_block(9, 72, 9), BlockId::TORCH);
        assert!(engine.stats().sub_chunks_loaded_from_store >= 1);
        engine.dispose();
    }
}

#[test]
fn checkpoint_persists_the_staged_inventory() {
    use strata_engine::persistence::INVENTORY_KEY;
    use strata_engine::KeyValueStore;

    let backend = MemoryStore::new();
    let mut engine = Engine::new(flat_config(13));
    engine.set_persistence(Box::new(backend.clone()));
    engine.set_player(16.0, 80.0, 16.0);
    engine.set_inventory(b"hotbar:stone,torch".to_vec());
    engine.checkpoint();
    engine.dispose();

    let mut backend = backend;
    let stored = backend
        .get(INVENTORY_KEY)
        .expect("memory store never fails")
        .expect("inventory record written");
    assert_eq!(stored, b"hotbar:stone,torch");
}

#[test]
fn corrupted_records_fall_back_to_generation() {
    use strata_engine::KeyValueStore;

    let mut backend = MemoryStore::new();
    // Plant garbage where a sub-chunk record would live.
    backend
        .put("subchunk:0:0:1", b"definitely not a record")
        .expect("memory store never fails");

    let mut engine = Engine::new(flat_config(5));
    engine.set_persistence(Box::new(backend));
    engine.set_player(16.0, 80.0, 16.0);

    let surface_sub = SubChunkPos::new(0, 0, 1);
    assert!(
        pump_until(&mut engine, |e| e.is_sub_chunk_generated(surface_sub), 4000),
        "engine must degrade to generation on corrupted data"
    );
    // Fresh flat terrain, not garbage.
    assert_eq!(engine.get_block(10, 64, 10), BlockId::GRASS);
    engine.dispose();
}
