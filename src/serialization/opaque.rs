//! Opaque payload codec
//!
//! Binary fallback for documents the structured codec cannot represent.
//! Covers the same wrapper categories as the structured form, but is only
//! readable by this crate.
//!
//! ```text
//! ┌────────────┬──────────────────────────────┐
//! │ crc32 (4B) │ bincode(Document)            │
//! │ LE         │                              │
//! └────────────┴──────────────────────────────┘
//! ```

use crate::error::SerializationError;

use super::value::Document;

const CRC_SIZE: usize = 4;

/// Encode a document as checksum + bincode body
pub fn encode(doc: &Document) -> Result<Vec<u8>, SerializationError> {
    let body = bincode::serialize(doc).map_err(|e| SerializationError::Opaque(e.to_string()))?;
    let crc = crc32fast::hash(&body);

    let mut out = Vec::with_capacity(CRC_SIZE + body.len());
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Verify the checksum and decode the body
pub fn decode(payload: &[u8]) -> Result<Document, SerializationError> {
    if payload.len() < CRC_SIZE {
        return Err(SerializationError::Opaque(format!(
            "payload of {} bytes is shorter than its checksum",
            payload.len()
        )));
    }

    let (crc_bytes, body) = payload.split_at(CRC_SIZE);
    let mut raw = [0u8; CRC_SIZE];
    raw.copy_from_slice(crc_bytes);
    let stored = u32::from_le_bytes(raw);
    let computed = crc32fast::hash(body);

    if stored != computed {
        return Err(SerializationError::ChecksumMismatch { stored, computed });
    }

    bincode::deserialize(body).map_err(|e| SerializationError::Opaque(e.to_string()))
}
