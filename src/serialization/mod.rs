//! Serialization Engine
//!
//! Lossless, type-preserving conversion between aggregates and byte
//! envelopes.
//!
//! ## Responsibilities
//! - Lower aggregates into a discriminated [`FieldValue`] tree
//! - Resolve nested type names through the [`TypeRegistry`]
//! - Encode documents as structured (JSON) or opaque (bincode) payloads
//! - Frame payloads as `tag:payload` and probe untagged legacy envelopes
//!
//! ## Encode path
//! ```text
//! Aggregate ──to_fields──► Fields ──► Document ──┬─ structured ─┐
//!                                                └─ opaque ─────┴─► tag:payload
//!                               (fallback when structured is not applicable)
//! ```

mod codec;
mod envelope;
pub mod opaque;
mod registry;
mod serializer;
pub mod structured;
mod value;

use serde::{Deserialize, Serialize};

pub use codec::{
    decode_aggregate, decode_value_object, encode_aggregate, encode_value_object, Aggregate, Blob,
    DecodeContext, EncodeContext, FieldCodec, ValueObject, MAX_NESTING_DEPTH,
};
pub use envelope::{split as split_envelope, OPAQUE_TAG, STRUCTURED_TAG, TAG_SEPARATOR};
pub use registry::{TypeKind, TypeRegistry};
pub use serializer::{decode_document, EntitySerializer};
pub use value::{Document, FieldValue, Fields, Primitive};

/// Payload codec of an envelope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    /// Self-describing JSON (default)
    #[default]
    Structured,
    /// Checksummed bincode, readable only by this crate
    Opaque,
}
