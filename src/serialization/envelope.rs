//! Envelope framing
//!
//! ```text
//! ┌──────────┬─────┬─────────────────────────┐
//! │ tag      │ ':' │ payload                 │
//! │ json|bin │     │ structured | opaque     │
//! └──────────┴─────┴─────────────────────────┘
//! ```
//!
//! Envelopes written before tagging carry a bare payload. Those are probed:
//! opaque first (its checksum makes false positives unlikely), then
//! structured.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::SerializationError;

use super::value::Document;
use super::{opaque, structured, Encoding};

pub const STRUCTURED_TAG: &[u8] = b"json";
pub const OPAQUE_TAG: &[u8] = b"bin";
pub const TAG_SEPARATOR: u8 = b':';

impl Encoding {
    pub fn tag(&self) -> &'static [u8] {
        match self {
            Encoding::Structured => STRUCTURED_TAG,
            Encoding::Opaque => OPAQUE_TAG,
        }
    }

    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            STRUCTURED_TAG => Some(Encoding::Structured),
            OPAQUE_TAG => Some(Encoding::Opaque),
            _ => None,
        }
    }
}

/// Encode `doc` with `encoding` and frame it
pub fn seal(doc: &Document, encoding: Encoding) -> Result<Bytes, SerializationError> {
    let payload = match encoding {
        Encoding::Structured => structured::encode(doc)?,
        Encoding::Opaque => opaque::encode(doc)?,
    };

    let tag = encoding.tag();
    let mut buf = BytesMut::with_capacity(tag.len() + 1 + payload.len());
    buf.put_slice(tag);
    buf.put_u8(TAG_SEPARATOR);
    buf.put_slice(&payload);
    Ok(buf.freeze())
}

/// Split an envelope into its encoding and payload, if it is tagged
pub fn split(bytes: &[u8]) -> Option<(Encoding, &[u8])> {
    let sep = bytes.iter().take(8).position(|&b| b == TAG_SEPARATOR)?;
    let encoding = Encoding::from_tag(&bytes[..sep])?;
    Some((encoding, &bytes[sep + 1..]))
}

/// Decode any envelope, tagged or legacy, into a document
pub fn open(bytes: &[u8]) -> Result<(Encoding, Document), SerializationError> {
    if let Some((encoding, payload)) = split(bytes) {
        let doc = match encoding {
            Encoding::Structured => structured::decode(payload)?,
            Encoding::Opaque => opaque::decode(payload)?,
        };
        return Ok((encoding, doc));
    }

    if let Ok(doc) = opaque::decode(bytes) {
        tracing::debug!("decoded untagged envelope as opaque");
        return Ok((Encoding::Opaque, doc));
    }
    if let Ok(doc) = structured::decode(bytes) {
        tracing::debug!("decoded untagged envelope as structured");
        return Ok((Encoding::Structured, doc));
    }

    Err(SerializationError::UnknownFormat)
}
