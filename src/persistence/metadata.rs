use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::persistence::error::PersistenceResult;

/// Version of the metadata record.
pub const METADATA_VERSION: u32 = 2;

/// World-level save metadata, stored as its own record beside the
/// sub-chunks. Timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldMetadata {
    pub version: u32,
    pub seed: u64,
    pub created_at: i64,
    pub last_saved_at: i64,
    pub player_position: [f64; 3],
}

impl WorldMetadata {
    pub fn new(seed: u64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            version: METADATA_VERSION,
            seed,
            created_at: now,
            last_saved_at: now,
            player_position: [0.0, 0.0, 0.0],
        }
    }

    pub fn touch(&mut self, player_position: [f64; 3]) {
        self.last_saved_at = Utc::now().timestamp();
        self.player_position = player_position;
    }

    pub fn encode(&self) -> PersistenceResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> PersistenceResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// KV key of the metadata record.
pub const METADATA_KEY: &str = "metadata";

/// KV key of the externally-owned inventory blob.
pub const INVENTORY_KEY: &str = "inventory";
