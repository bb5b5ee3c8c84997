use serde::{Deserialize, Serialize};

use crate::constants::SUB_CHUNK_VOLUME;
use crate::persistence::error::{PersistenceError, PersistenceResult};
use crate::world::core::SubChunkPos;

/// Magic bytes identifying a sub-chunk record.
const RECORD_MAGIC: [u8; 4] = *b"SSCK";

/// Version of the record format.
const RECORD_FORMAT_VERSION: u32 = 1;

/// One persisted sub-chunk: block ids plus packed light.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubChunkRecord {
    pub position: SubChunkPos,
    pub blocks: Vec<u16>,
    pub light: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordHeader {
    magic: [u8; 4],
    version: u32,
    position: SubChunkPos,
    checksum: u32,
}

/// FNV-1a over the payload; cheap and stable across platforms.
fn checksum(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811C_9DC5;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Encode a record: bincode header, then blocks as little-endian u16,
/// then the light bytes.
pub fn encode_record(record: &SubChunkRecord) -> PersistenceResult<Vec<u8>> {
    if record.blocks.len() != SUB_CHUNK_VOLUME || record.light.len() != SUB_CHUNK_VOLUME {
        return Err(PersistenceError::CorruptedData(format!(
            "record buffers have wrong size: {} blocks, {} light",
            record.blocks.len(),
            record.light.len()
        )));
    }
    let mut payload = Vec::with_capacity(SUB_CHUNK_VOLUME * 3);
    for &block in &record.blocks {
        payload.extend_from_slice(&block.to_le_bytes());
    }
    payload.extend_from_slice(&record.light);

    let header = RecordHeader {
        magic: RECORD_MAGIC,
        version: RECORD_FORMAT_VERSION,
        position: record.position,
        checksum: checksum(&payload),
    };
    let mut out = bincode::serialize(&header)?;
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode and validate a record produced by [`encode_record`].
pub fn decode_record(data: &[u8]) -> PersistenceResult<SubChunkRecord> {
    let header: RecordHeader = bincode::deserialize(data)?;
    if header.magic != RECORD_MAGIC {
        return Err(PersistenceError::CorruptedData(
            "bad record magic".to_string(),
        ));
    }
    if header.version != RECORD_FORMAT_VERSION {
        return Err(PersistenceError::VersionMismatch {
            expected: RECORD_FORMAT_VERSION,
            found: header.version,
        });
    }
    let header_size = bincode::serialized_size(&header)? as usize;
    let payload = data
        .get(header_size..)
        .ok_or_else(|| PersistenceError::CorruptedData("record truncated".to_string()))?;
    if payload.len() != SUB_CHUNK_VOLUME * 3 {
        return Err(PersistenceError::CorruptedData(format!(
            "payload is {} bytes, expected {}",
            payload.len(),
            SUB_CHUNK_VOLUME * 3
        )));
    }
    if checksum(payload) != header.checksum {
        return Err(PersistenceError::CorruptedData(
            "record checksum mismatch".to_string(),
        ));
    }

    let mut blocks = Vec::with_capacity(SUB_CHUNK_VOLUME);
    for pair in payload[..SUB_CHUNK_VOLUME * 2].chunks_exact(2) {
        blocks.push(u16::from_le_bytes([pair[0], pair[1]]));
    }
    let light = payload[SUB_CHUNK_VOLUME * 2..].to_vec();
    Ok(SubChunkRecord {
        position: header.position,
        blocks,
        light,
    })
}

/// KV key for a sub-chunk record.
pub fn sub_chunk_key(position: SubChunkPos) -> String {
    format!(
        "subchunk:{}:{}:{}",
        position.column.x, position.column.z, position.sub_y
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SubChunkRecord {
        let mut blocks = vec![0u16; SUB_CHUNK_VOLUME];
        blocks[17] = 3;
        blocks[40_000] = 260;
        let mut light = vec![0u8; SUB_CHUNK_VOLUME];
        light[17] = 0xF2;
        SubChunkRecord {
            position: SubChunkPos::new(-9, 4, 7),
            blocks,
            light,
        }
    }

    #[test]
    fn round_trip_preserves_everything() {
        let original = record();
        let bytes = encode_record(&original).expect("encode");
        let decoded = decode_record(&bytes).expect("decode");
        assert_eq!(decoded, original);
    }

    #[test]
    fn corruption_is_detected() {
        let mut bytes = encode_record(&record()).expect("encode");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            decode_record(&bytes),
            Err(PersistenceError::CorruptedData(_))
        ));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = encode_record(&record()).expect("encode");
        bytes[0] = b'X';
        assert!(decode_record(&bytes).is_err());
    }

    #[test]
    fn keys_are_unique_per_sub_chunk() {
        assert_ne!(
            sub_chunk_key(SubChunkPos::new(1, 2, 3)),
            sub_chunk_key(SubChunkPos::new(1, 2, 4))
        );
        assert_eq!(
            sub_chunk_key(SubChunkPos::new(-1, -2, 0)),
            "subchunk:-1:-2:0"
        );
    }
}
