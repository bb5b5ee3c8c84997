//! Persistence: sub-chunk records, world metadata, and the async facade
//! over an opaque key-value store.

pub mod error;
pub mod metadata;
pub mod serializer;
pub mod store;

pub use error::{PersistenceError, PersistenceResult};
pub use metadata::{WorldMetadata, INVENTORY_KEY, METADATA_KEY};
pub use serializer::{decode_record, encode_record, sub_chunk_key, SubChunkRecord};
pub use store::{KeyValueStore, MemoryStore, StoreEvent, WorldStore};
