//! Async persistence facade over an opaque key-value store.
//!
//! All storage traffic runs on one IO worker thread; the main task talks
//! to it through channels. Every request carries a monotonic id and the
//! reply echoes it back, so concurrent loads can never be mis-assigned.

use std::collections::HashMap;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::persistence::metadata::{WorldMetadata, INVENTORY_KEY, METADATA_KEY};
use crate::persistence::serializer::{
    decode_record, encode_record, sub_chunk_key, SubChunkRecord,
};
use crate::world::core::SubChunkPos;

/// The opaque store the host injects. Values are byte blobs; failures are
/// reported but never fatal to the engine.
pub trait KeyValueStore: Send + 'static {
    fn get(&mut self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    fn put(&mut self, key: &str, value: &[u8]) -> anyhow::Result<()>;
    fn delete(&mut self, key: &str) -> anyhow::Result<()>;
    fn clear(&mut self) -> anyhow::Result<()>;
    fn keys(&mut self) -> anyhow::Result<Vec<String>>;
}

/// In-memory store: the default backend and the one tests use.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: std::sync::Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&mut self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> anyhow::Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn clear(&mut self) -> anyhow::Result<()> {
        self.entries.lock().clear();
        Ok(())
    }

    fn keys(&mut self) -> anyhow::Result<Vec<String>> {
        Ok(self.entries.lock().keys().cloned().collect())
    }
}

enum StoreJob {
    Load { id: u64, position: SubChunkPos },
    Save { position: SubChunkPos, bytes: Vec<u8> },
    SaveRaw { key: String, bytes: Vec<u8> },
    LoadMetadata { id: u64 },
    ClearAll,
    Shutdown,
}

/// Replies surfaced to the engine each tick.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Loaded {
        request_id: u64,
        position: SubChunkPos,
        record: Option<SubChunkRecord>,
    },
    MetadataLoaded {
        request_id: u64,
        metadata: Option<WorldMetadata>,
    },
}

/// Persistence facade owned by the main task.
pub struct WorldStore {
    jobs: Sender<StoreJob>,
    events: Receiver<StoreEvent>,
    next_request_id: u64,
    /// Sub-chunks known to exist in storage; consulted synchronously so
    /// the scheduler can skip the load round-trip for fresh terrain.
    existence: FxHashSet<SubChunkPos>,
    handle: Option<JoinHandle<()>>,
}

impl WorldStore {
    pub fn new(mut backend: Box<dyn KeyValueStore>) -> Self {
        // Warm the existence cache before the IO thread takes the backend.
        let mut existence = FxHashSet::default();
        match backend.keys() {
            Ok(keys) => {
                for key in keys {
                    if let Some(pos) = parse_sub_chunk_key(&key) {
                        existence.insert(pos);
                    }
                }
            }
            Err(e) => {
                log::warn!("[WorldStore::new] listing keys failed, cache cold: {e:#}");
            }
        }
        log::info!(
            "[WorldStore::new] existence cache warmed with {} sub-chunks",
            existence.len()
        );

        let (job_tx, job_rx) = unbounded::<StoreJob>();
        let (event_tx, event_rx) = unbounded::<StoreEvent>();
        let handle = std::thread::Builder::new()
            .name("persistence-io".to_string())
            .spawn(move || io_thread(backend, job_rx, event_tx))
            .expect("spawning the persistence thread is infallible on supported targets");

        Self {
            jobs: job_tx,
            events: event_rx,
            next_request_id: 1,
            existence,
            handle: Some(handle),
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    /// Synchronous existence check, backed by the cache only.
    pub fn has(&self, position: SubChunkPos) -> bool {
        self.existence.contains(&position)
    }

    /// Kick off an async load; the reply arrives via [`WorldStore::poll`]
    /// tagged with the returned request id.
    pub fn request_load(&mut self, position: SubChunkPos) -> u64 {
        let id = self.next_id();
        let _ = self.jobs.send(StoreJob::Load { id, position });
        id
    }

    /// Fire-and-forget save. The existence cache is updated immediately so
    /// a following `has` sees the record.
    pub fn save(&mut self, record: &SubChunkRecord) {
        match encode_record(record) {
            Ok(bytes) => {
                self.existence.insert(record.position);
                let _ = self.jobs.send(StoreJob::Save {
                    position: record.position,
                    bytes,
                });
            }
            Err(e) => log::warn!(
                "[WorldStore::save] encoding ({}, {}, sub {}) failed: {e}",
                record.position.column.x,
                record.position.column.z,
                record.position.sub_y
            ),
        }
    }

    pub fn save_batch<'a>(&mut self, records: impl Iterator<Item = &'a SubChunkRecord>) {
        for record in records {
            self.save(record);
        }
    }

    pub fn save_metadata(&mut self, metadata: &WorldMetadata) {
        match metadata.encode() {
            Ok(bytes) => {
                let _ = self.jobs.send(StoreJob::SaveRaw {
                    key: METADATA_KEY.to_string(),
                    bytes,
                });
            }
            Err(e) => log::warn!("[WorldStore::save_metadata] encoding failed: {e}"),
        }
    }

    pub fn request_metadata(&mut self) -> u64 {
        let id = self.next_id();
        let _ = self.jobs.send(StoreJob::LoadMetadata { id });
        id
    }

    /// Persist the externally-owned inventory blob as-is.
    pub fn save_inventory(&mut self, bytes: Vec<u8>) {
        let _ = self.jobs.send(StoreJob::SaveRaw {
            key: INVENTORY_KEY.to_string(),
            bytes,
        });
    }

    pub fn clear_all(&mut self) {
        self.existence.clear();
        let _ = self.jobs.send(StoreJob::ClearAll);
    }

    /// Drain every reply that has arrived since the last poll.
    pub fn poll(&mut self) -> Vec<StoreEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    pub fn shutdown(mut self) {
        let _ = self.jobs.send(StoreJob::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn io_thread(
    mut backend: Box<dyn KeyValueStore>,
    jobs: Receiver<StoreJob>,
    events: Sender<StoreEvent>,
) {
    for job in jobs.iter() {
        match job {
            StoreJob::Load { id, position } => {
                let record = match backend.get(&sub_chunk_key(position)) {
                    Ok(Some(bytes)) => match decode_record(&bytes) {
                        Ok(record) => Some(record),
                        Err(e) => {
                            log::warn!(
                                "[persistence-io] corrupted record at ({}, {}, sub {}): {e}",
                                position.column.x,
                                position.column.z,
                                position.sub_y
                            );
                            None
                        }
                    },
                    Ok(None) => None,
                    Err(e) => {
                        log::warn!("[persistence-io] load failed: {e:#}");
                        None
                    }
                };
                if events
                    .send(StoreEvent::Loaded {
                        request_id: id,
                        position,
                        record,
                    })
                    .is_err()
                {
                    break;
                }
            }
            StoreJob::Save { position, bytes } => {
                if let Err(e) = backend.put(&sub_chunk_key(position), &bytes) {
                    log::warn!("[persistence-io] save failed, continuing without: {e:#}");
                }
            }
            StoreJob::SaveRaw { key, bytes } => {
                if let Err(e) = backend.put(&key, &bytes) {
                    log::warn!("[persistence-io] save of '{key}' failed: {e:#}");
                }
            }
            StoreJob::LoadMetadata { id } => {
                let metadata = match backend.get(METADATA_KEY) {
                    Ok(Some(bytes)) => WorldMetadata::decode(&bytes).ok(),
                    _ => None,
                };
                if events
                    .send(StoreEvent::MetadataLoaded {
                        request_id: id,
                        metadata,
                    })
                    .is_err()
                {
                    break;
                }
            }
            StoreJob::ClearAll => {
                if let Err(e) = backend.clear() {
                    log::warn!("[persistence-io] clear failed: {e:#}");
                }
            }
            StoreJob::Shutdown => break,
        }
    }
}

fn parse_sub_chunk_key(key: &str) -> Option<SubChunkPos> {
    let rest = key.strip_prefix("subchunk:")?;
    let mut parts = rest.splitn(3, ':');
    let x = parts.next()?.parse::<i64>().ok()?;
    let z = parts.next()?.parse::<i64>().ok()?;
    let sub_y = parts.next()?.parse::<u8>().ok()?;
    if sub_y as usize >= crate::constants::SUB_CHUNK_COUNT {
        return None;
    }
    Some(SubChunkPos::new(x, z, sub_y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SUB_CHUNK_VOLUME;
    use std::time::Duration;

    fn record(pos: SubChunkPos) -> SubChunkRecord {
        let mut blocks = vec![0u16; SUB_CHUNK_VOLUME];
        blocks[0] = 1;
        SubChunkRecord {
            position: pos,
            blocks,
            light: vec![0; SUB_CHUNK_VOLUME],
        }
    }

    /// Polls until an event matching `pick` arrives, keeping any
    /// non-matching events in `backlog` so later `wait_for` calls on the
    /// same store can still observe them.
    fn wait_for<T>(
        store: &mut WorldStore,
        backlog: &mut Vec<StoreEvent>,
        mut pick: impl FnMut(&StoreEvent) -> Option<T>,
    ) -> T {
        for _ in 0..500 {
            backlog.extend(store.poll());
            if let Some(idx) = backlog.iter().position(|e| pick(e).is_some()) {
                let event = backlog.remove(idx);
                return pick(&event).expect("index was located by this same predicate");
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("store event did not arrive");
    }

    #[test]
    fn save_then_load_round_trips() {
        let backend = MemoryStore::new();
        let mut store = WorldStore::new(Box::new(backend.clone()));
        let pos = SubChunkPos::new(2, -7, 3);
        assert!(!store.has(pos));
        store.save(&record(pos));
        assert!(store.has(pos), "existence cache updates synchronously");

        let id = store.request_load(pos);
        let mut backlog = Vec::new();
        let loaded = wait_for(&mut store, &mut backlog, |e| match e {
            StoreEvent::Loaded {
                request_id, record, ..
            } if *request_id == id => Some(record.clone()),
            _ => None,
        });
        assert_eq!(loaded.expect("record exists").blocks[0], 1);
        store.shutdown();
    }

    #[test]
    fn request_ids_disambiguate_concurrent_loads() {
        let mut store = WorldStore::new(Box::new(MemoryStore::new()));
        let a = SubChunkPos::new(0, 0, 0);
        let b = SubChunkPos::new(1, 0, 0);
        store.save(&record(a));
        let id_a = store.request_load(a);
        let id_b = store.request_load(b);
        let mut backlog = Vec::new();
        let mut seen = 0;
        while seen < 2 {
            let (rid, pos, rec) = wait_for(&mut store, &mut backlog, |e| match e {
                StoreEvent::Loaded {
                    request_id,
                    position,
                    record,
                } => Some((*request_id, *position, record.clone())),
                _ => None,
            });
            if rid == id_a {
                assert_eq!(pos, a);
                assert!(rec.is_some());
            } else {
                assert_eq!(rid, id_b);
                assert_eq!(pos, b);
                assert!(rec.is_none());
            }
            seen += 1;
        }
        store.shutdown();
    }

    #[test]
    fn existence_cache_warms_from_backend() {
        let backend = MemoryStore::new();
        {
            let mut store = WorldStore::new(Box::new(backend.clone()));
            store.save(&record(SubChunkPos::new(5, 5, 5)));
            store.shutdown();
        }
        let store = WorldStore::new(Box::new(backend));
        assert!(store.has(SubChunkPos::new(5, 5, 5)));
        assert!(!store.has(SubChunkPos::new(5, 5, 6)));
    }

    #[test]
    fn metadata_round_trips_through_store() {
        let mut store = WorldStore::new(Box::new(MemoryStore::new()));
        let meta = WorldMetadata::new(123);
        store.save_metadata(&meta);
        let id = store.request_metadata();
        let mut backlog = Vec::new();
        let loaded = wait_for(&mut store, &mut backlog, |e| match e {
            StoreEvent::MetadataLoaded {
                request_id,
                metadata,
            } if *request_id == id => Some(metadata.clone()),
            _ => None,
        });
        assert_eq!(loaded.expect("metadata saved").seed, 123);
        store.shutdown();
    }
}
