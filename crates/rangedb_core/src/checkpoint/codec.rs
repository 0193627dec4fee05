//! Checkpoint image encoding.
//!
//! ## Image Format
//!
//! ```text
//! | magic (4) | version (2) | created_ms (8) | sequence (8) | payload_len (8) | payload | sha256 (32) |
//! ```
//!
//! The payload is the CBOR encoding of a [`CheckpointImage`]. The digest
//! covers everything before it.

use super::image::CheckpointImage;
use crate::error::{CoreError, CoreResult};
use sha2::{Digest, Sha256};

/// Magic bytes for checkpoint files.
const CHECKPOINT_MAGIC: [u8; 4] = *b"RDBC";
/// Current checkpoint format version.
const CHECKPOINT_VERSION: u16 = 1;
/// Header size (magic + version + created_ms + sequence + payload_len).
const HEADER_SIZE: usize = 4 + 2 + 8 + 8 + 8;
/// Footer size (SHA-256 digest).
const FOOTER_SIZE: usize = 32;

/// Header fields readable without decoding the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    /// Format version.
    pub version: u16,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_ms: u64,
    /// Checkpoint sequence number.
    pub sequence: u64,
    /// Total encoded size in bytes.
    pub size: usize,
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

/// Encodes an image.
pub fn encode(image: &CheckpointImage) -> CoreResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(image, &mut payload)
        .map_err(|e| CoreError::codec(format!("encoding checkpoint {}: {e}", image.name)))?;

    let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + FOOTER_SIZE);
    data.extend_from_slice(&CHECKPOINT_MAGIC);
    data.extend_from_slice(&CHECKPOINT_VERSION.to_le_bytes());
    data.extend_from_slice(&image.created_ms.to_le_bytes());
    data.extend_from_slice(&image.sequence.to_le_bytes());
    data.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    data.extend_from_slice(&payload);
    let digest = Sha256::digest(&data);
    data.extend_from_slice(&digest);
    Ok(data)
}

/// Validates framing and digest and returns the header.
pub fn verify(data: &[u8]) -> CoreResult<ImageHeader> {
    if data.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(CoreError::corrupt_checkpoint("image too small"));
    }
    if data[0..4] != CHECKPOINT_MAGIC {
        return Err(CoreError::corrupt_checkpoint("invalid checkpoint magic"));
    }
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != CHECKPOINT_VERSION {
        return Err(CoreError::corrupt_checkpoint(format!(
            "unsupported checkpoint version: {version}"
        )));
    }
    let payload_len = read_u64(data, 22);
    let expected = (HEADER_SIZE + FOOTER_SIZE) as u64 + payload_len;
    if expected != data.len() as u64 {
        return Err(CoreError::corrupt_checkpoint(format!(
            "payload length mismatch: header says {payload_len}, image holds {}",
            data.len() - HEADER_SIZE - FOOTER_SIZE
        )));
    }
    let digest_offset = data.len() - FOOTER_SIZE;
    let computed = Sha256::digest(&data[..digest_offset]);
    if computed.as_slice() != &data[digest_offset..] {
        return Err(CoreError::corrupt_checkpoint("checksum mismatch"));
    }
    Ok(ImageHeader {
        version,
        created_ms: read_u64(data, 6),
        sequence: read_u64(data, 14),
        size: data.len(),
    })
}

/// Decodes an image, validating it first.
pub fn decode(data: &[u8]) -> CoreResult<CheckpointImage> {
    let header = verify(data)?;
    let payload = &data[HEADER_SIZE..data.len() - FOOTER_SIZE];
    let image: CheckpointImage = ciborium::from_reader(payload)
        .map_err(|e| CoreError::codec(format!("decoding checkpoint: {e}")))?;
    if image.sequence != header.sequence {
        return Err(CoreError::corrupt_checkpoint(format!(
            "header sequence {} does not match payload sequence {}",
            header.sequence, image.sequence
        )));
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::PreparedJournal;
    use crate::types::{Timestamp, TxnId};
    use uuid::Uuid;

    fn image() -> CheckpointImage {
        CheckpointImage {
            id: Uuid::new_v4(),
            name: "nightly".to_string(),
            sequence: 7,
            created_ms: 1_700_000_000_000,
            oldest: Timestamp::new(5),
            stable: Timestamp::new(10),
            next_txn_id: TxnId::new(33),
            tables: Vec::new(),
            journal: PreparedJournal::default(),
        }
    }

    #[test]
    fn header_is_readable_without_payload() {
        let original = image();
        let data = encode(&original).unwrap();
        let header = verify(&data).unwrap();
        assert_eq!(header.sequence, 7);
        assert_eq!(header.created_ms, 1_700_000_000_000);
        assert_eq!(header.size, data.len());
        assert_eq!(decode(&data).unwrap(), original);
    }

    #[test]
    fn flipped_byte_fails_checksum() {
        let mut data = encode(&image()).unwrap();
        let mid = data.len() / 2;
        data[mid] ^= 0x40;
        assert!(matches!(
            decode(&data),
            Err(CoreError::CorruptCheckpoint { .. })
        ));
    }

    #[test]
    fn truncated_and_foreign_data_are_rejected() {
        let data = encode(&image()).unwrap();
        assert!(verify(&data[..data.len() - 1]).is_err());
        assert!(verify(b"RDBC").is_err());
        let mut foreign = data.clone();
        foreign[0..4].copy_from_slice(b"ENDB");
        assert!(verify(&foreign).is_err());
    }
}
