//! Tests for envelope framing and format selection
//!
//! These tests verify:
//! - Envelopes carry a format tag that is honoured on decode
//! - Documents the structured format cannot represent fall back to opaque
//! - Aggregates can pin their encoding
//! - Untagged legacy payloads are still readable
//! - Corrupt envelopes fail instead of decoding to garbage

use std::collections::BTreeMap;

use atlas_persist::serialization::{
    split_envelope, Aggregate, DecodeContext, EncodeContext, Encoding, EntitySerializer,
    FieldValue, Fields,
};
use atlas_persist::SerializationError;

use crate::common::*;

type CodecResult<T> = Result<T, SerializationError>;

// =============================================================================
// Helper Types
// =============================================================================

/// Aggregate with a field name the structured format reserves
#[derive(Debug, Clone, PartialEq)]
struct Legacy {
    kind: String,
}

impl Aggregate for Legacy {
    const TYPE_NAME: &'static str = "Legacy";

    fn to_fields(&self, cx: &EncodeContext<'_>) -> CodecResult<Fields> {
        let mut fields = Fields::new();
        fields.put("__type__", &self.kind, cx)?;
        Ok(fields)
    }

    fn from_fields(mut fields: Fields, cx: &DecodeContext<'_>) -> CodecResult<Self> {
        Ok(Self {
            kind: fields.take("__type__", cx)?,
        })
    }
}

/// Aggregate that always persists opaquely
#[derive(Debug, Clone, PartialEq)]
struct Snapshot {
    counters: BTreeMap<String, i64>,
}

impl Aggregate for Snapshot {
    const TYPE_NAME: &'static str = "Snapshot";
    const ENCODING: Option<Encoding> = Some(Encoding::Opaque);

    fn to_fields(&self, cx: &EncodeContext<'_>) -> CodecResult<Fields> {
        let mut fields = Fields::new();
        fields.put("counters", &self.counters, cx)?;
        Ok(fields)
    }

    fn from_fields(mut fields: Fields, cx: &DecodeContext<'_>) -> CodecResult<Self> {
        Ok(Self {
            counters: fields.take("counters", cx)?,
        })
    }
}

/// Aggregate holding a user mapping whose keys collide with reserved names
#[derive(Debug, Clone, PartialEq)]
struct Labels {
    labels: BTreeMap<String, String>,
}

impl Aggregate for Labels {
    const TYPE_NAME: &'static str = "Labels";

    fn to_fields(&self, cx: &EncodeContext<'_>) -> CodecResult<Fields> {
        let mut fields = Fields::new();
        fields.put("labels", &self.labels, cx)?;
        Ok(fields)
    }

    fn from_fields(mut fields: Fields, cx: &DecodeContext<'_>) -> CodecResult<Self> {
        Ok(Self {
            labels: fields.take("labels", cx)?,
        })
    }
}

fn envelope_serializer() -> EntitySerializer {
    let serializer = EntitySerializer::new();
    register_fixtures(&serializer);
    serializer.register_aggregate::<Legacy>();
    serializer.register_aggregate::<Snapshot>();
    serializer.register_aggregate::<Labels>();
    serializer
}

/// Strip the `tag:` prefix, leaving what an untagged writer would have stored
fn strip_tag(bytes: &[u8]) -> Vec<u8> {
    let (_, payload) = split_envelope(bytes).unwrap();
    payload.to_vec()
}

// =============================================================================
// Framing
// =============================================================================

#[test]
fn test_split_recognises_tags() {
    let serializer = envelope_serializer();
    let widget = Widget::new("w", "bolt", 1);

    let structured = serializer.serialize_with(&widget, Encoding::Structured).unwrap();
    let opaque = serializer.serialize_with(&widget, Encoding::Opaque).unwrap();

    assert_eq!(split_envelope(&structured).unwrap().0, Encoding::Structured);
    assert_eq!(split_envelope(&opaque).unwrap().0, Encoding::Opaque);
    assert!(split_envelope(b"{\"__type__\":\"Widget\"}").is_none());
    assert!(split_envelope(b"xml:<a/>").is_none());
}

// =============================================================================
// Format Selection
// =============================================================================

#[test]
fn test_reserved_field_name_falls_back_to_opaque() {
    let serializer = envelope_serializer();
    let legacy = Legacy {
        kind: "v1".to_string(),
    };

    let bytes = serializer.serialize(&legacy).unwrap();
    assert!(bytes.starts_with(b"bin:"));

    let decoded: Legacy = serializer.deserialize(&bytes).unwrap();
    assert_eq!(decoded, legacy);
}

#[test]
fn test_reserved_mapping_keys_stay_structured() {
    let serializer = envelope_serializer();
    let mut labels = BTreeMap::new();
    labels.insert("__type__".to_string(), "shadow".to_string());
    labels.insert("plain".to_string(), "ok".to_string());
    let entity = Labels { labels };

    let bytes = serializer.serialize(&entity).unwrap();
    assert!(bytes.starts_with(b"json:"));

    let decoded: Labels = serializer.deserialize(&bytes).unwrap();
    assert_eq!(decoded, entity);
}

#[test]
fn test_pinned_encoding_overrides_default() {
    let serializer = envelope_serializer();
    assert_eq!(serializer.default_encoding(), Encoding::Structured);

    let mut counters = BTreeMap::new();
    counters.insert("hits".to_string(), 42);
    let snapshot = Snapshot { counters };

    let bytes = serializer.serialize(&snapshot).unwrap();
    assert_eq!(serializer.detect_encoding(&bytes).unwrap(), Encoding::Opaque);
    assert_eq!(serializer.deserialize::<Snapshot>(&bytes).unwrap(), snapshot);
}

// =============================================================================
// Legacy Payloads
// =============================================================================

#[test]
fn test_untagged_structured_payload_is_readable() {
    let serializer = envelope_serializer();
    let invoice = sample_invoice();
    let bare = strip_tag(&serializer.serialize_with(&invoice, Encoding::Structured).unwrap());

    assert_eq!(serializer.detect_encoding(&bare).unwrap(), Encoding::Structured);
    let decoded: Invoice = serializer.deserialize(&bare).unwrap();
    assert_eq!(decoded, invoice);
}

#[test]
fn test_untagged_opaque_payload_is_readable() {
    let serializer = envelope_serializer();
    let invoice = sample_invoice();
    let bare = strip_tag(&serializer.serialize_with(&invoice, Encoding::Opaque).unwrap());

    assert_eq!(serializer.detect_encoding(&bare).unwrap(), Encoding::Opaque);
    let decoded: Invoice = serializer.deserialize(&bare).unwrap();
    assert_eq!(decoded, invoice);
}

// =============================================================================
// Corruption
// =============================================================================

#[test]
fn test_garbage_is_unknown_format() {
    let serializer = envelope_serializer();

    let err = serializer.deserialize::<Widget>(b"definitely not an envelope").unwrap_err();
    assert!(matches!(err, SerializationError::UnknownFormat), "{:?}", err);

    let err = serializer.decode_document(b"").unwrap_err();
    assert!(matches!(err, SerializationError::UnknownFormat), "{:?}", err);
}

#[test]
fn test_malformed_structured_payload_fails() {
    let serializer = envelope_serializer();

    let err = serializer.deserialize::<Widget>(b"json:{\"__type__\":").unwrap_err();
    assert!(matches!(err, SerializationError::Structured(_)), "{:?}", err);
}

#[test]
fn test_corrupted_opaque_payload_fails() {
    let serializer = envelope_serializer();
    let mut bytes = serializer
        .serialize_with(&Widget::new("w", "bolt", 1), Encoding::Opaque)
        .unwrap()
        .to_vec();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    let err = serializer.deserialize::<Widget>(&bytes).unwrap_err();
    assert!(
        matches!(err, SerializationError::ChecksumMismatch { .. }),
        "{:?}",
        err
    );
}

#[test]
fn test_decode_document_needs_no_registration() {
    let writer = envelope_serializer();
    let bytes = writer.serialize(&Widget::new("w", "bolt", 7)).unwrap();

    let doc = atlas_persist::serialization::decode_document(&bytes).unwrap();
    assert_eq!(doc.type_name, "Widget");
    assert_eq!(doc.fields.get("price"), Some(&FieldValue::int(7)));

    // A serializer that knows nothing can still read the raw document
    let reader = EntitySerializer::new();
    assert!(reader.decode_document(&bytes).is_ok());
    assert!(matches!(
        reader.deserialize::<Widget>(&bytes),
        Err(SerializationError::UnresolvedType(_))
    ));
}
