//! Tests for the type registry and decode-time checks
//!
//! These tests verify:
//! - Unregistered types fail to encode, naming the type
//! - The embedded type name must match the requested type
//! - Unknown nested type names fail, naming the unresolved type
//! - Missing required fields fail
//! - Pathologically deep graphs are rejected instead of recursing forever

use atlas_persist::serialization::{
    structured, Aggregate, DecodeContext, EncodeContext, EntitySerializer, FieldValue, Fields,
    TypeKind, MAX_NESTING_DEPTH,
};
use atlas_persist::SerializationError;

use crate::common::*;

// =============================================================================
// Registration
// =============================================================================

#[test]
fn test_registration_is_visible() {
    let serializer = fixture_serializer();

    assert!(serializer.is_registered("Money"));
    assert!(serializer.is_registered("Invoice"));
    assert!(!serializer.is_registered("Nope"));
    assert_eq!(serializer.registry().kind_of("Email"), Some(TypeKind::ValueObject));
    assert_eq!(serializer.registry().kind_of("Address"), Some(TypeKind::Aggregate));
}

#[test]
fn test_unregistered_top_level_type_fails() {
    let serializer = EntitySerializer::new();

    let err = serializer.serialize(&Widget::new("w", "n", 1)).unwrap_err();
    match err {
        SerializationError::Encode { type_name, reason } => {
            assert_eq!(type_name, "Widget");
            assert!(reason.contains("Widget"), "reason: {}", reason);
        }
        other => panic!("expected Encode error, got {:?}", other),
    }
}

#[test]
fn test_unregistered_nested_value_object_fails() {
    let serializer = EntitySerializer::new();
    serializer.register_aggregate::<Invoice>();
    serializer.register_aggregate::<Address>();
    serializer.register_aggregate::<LineItem>();
    serializer.register_value_object::<Money>();
    // Email deliberately missing

    let err = serializer.serialize(&sample_invoice()).unwrap_err();
    match err {
        SerializationError::Encode { type_name, reason } => {
            assert_eq!(type_name, "Invoice");
            assert!(reason.contains("Email"), "reason: {}", reason);
        }
        other => panic!("expected Encode error, got {:?}", other),
    }
}

#[test]
fn test_custom_constructor_registration() {
    let serializer = EntitySerializer::new();
    serializer.register_aggregate::<Widget>();
    // A constructor that normalises names on the way in
    serializer.register_type::<Widget, _>("Widget", TypeKind::Aggregate, |value, cx: &DecodeContext<'_>| {
        match value {
            FieldValue::Aggregate { mut fields, .. } => {
                let name: String = fields.take("name", cx)?;
                Ok(Widget {
                    id: fields.take("id", cx)?,
                    name: name.to_uppercase(),
                    price: fields.take("price", cx)?,
                    tags: fields.take_or_default("tags", cx)?,
                })
            }
            other => Err(SerializationError::shape("aggregate", &other)),
        }
    });

    let bytes = serializer.serialize(&Widget::new("w", "bolt", 1)).unwrap();
    let decoded: Widget = serializer.deserialize(&bytes).unwrap();
    assert_eq!(decoded.name, "BOLT");
}

// =============================================================================
// Decode Checks
// =============================================================================

#[test]
fn test_type_mismatch_detected() {
    let serializer = fixture_serializer();
    let bytes = serializer.serialize(&Widget::new("w", "bolt", 1)).unwrap();

    let err = serializer.deserialize::<Invoice>(&bytes).unwrap_err();
    match err {
        SerializationError::TypeMismatch { expected, found } => {
            assert_eq!(expected, "Invoice");
            assert_eq!(found, "Widget");
        }
        other => panic!("expected TypeMismatch, got {:?}", other),
    }
}

#[test]
fn test_unknown_nested_type_name_fails() {
    let serializer = fixture_serializer();
    let mut doc = serializer
        .decode_document(&serializer.serialize(&sample_invoice()).unwrap())
        .unwrap();

    // Rename the nested value object to something never registered
    doc.fields.insert(
        "total",
        FieldValue::value_object("Currency", FieldValue::int(1)),
    );
    let payload = structured::encode(&doc).unwrap();
    let mut envelope = b"json:".to_vec();
    envelope.extend_from_slice(&payload);

    let err = serializer.deserialize::<Invoice>(&envelope).unwrap_err();
    match err {
        SerializationError::UnresolvedType(name) => assert_eq!(name, "Currency"),
        other => panic!("expected UnresolvedType, got {:?}", other),
    }
}

#[test]
fn test_nested_type_swap_is_mismatch() {
    let serializer = fixture_serializer();
    let mut doc = serializer
        .decode_document(&serializer.serialize(&sample_invoice()).unwrap())
        .unwrap();

    // A registered but different value object where Money is expected
    doc.fields.insert(
        "total",
        FieldValue::value_object("Email", FieldValue::text("x@y")),
    );
    let mut envelope = b"json:".to_vec();
    envelope.extend_from_slice(&structured::encode(&doc).unwrap());

    let err = serializer.deserialize::<Invoice>(&envelope).unwrap_err();
    assert!(matches!(err, SerializationError::TypeMismatch { .. }), "{:?}", err);
}

#[test]
fn test_missing_required_field_fails() {
    let serializer = fixture_serializer();
    let mut fields = Fields::new();
    fields.insert("id", FieldValue::text("w"));
    fields.insert("price", FieldValue::int(1));
    let doc = atlas_persist::serialization::Document::new("Widget", fields);

    let err = serializer.from_document::<Widget>(doc).unwrap_err();
    match err {
        SerializationError::MissingField { type_name, field } => {
            assert_eq!(type_name, "Widget");
            assert_eq!(field, "name");
        }
        other => panic!("expected MissingField, got {:?}", other),
    }
}

#[test]
fn test_wrong_shape_names_field() {
    let serializer = fixture_serializer();
    let mut fields = Fields::new();
    fields.insert("id", FieldValue::text("w"));
    fields.insert("name", FieldValue::text("bolt"));
    fields.insert("price", FieldValue::text("cheap"));
    let doc = atlas_persist::serialization::Document::new("Widget", fields);

    let err = serializer.from_document::<Widget>(doc).unwrap_err();
    match err {
        SerializationError::UnexpectedShape { field, .. } => assert_eq!(field, "price"),
        other => panic!("expected UnexpectedShape, got {:?}", other),
    }
}

// =============================================================================
// Depth Limit
// =============================================================================

#[test]
fn test_excessive_nesting_rejected() {
    let serializer = fixture_serializer();
    let deep = Node::chain(MAX_NESTING_DEPTH + 10);

    let err = serializer.serialize(&deep).unwrap_err();
    match err {
        SerializationError::Encode { type_name, reason } => {
            assert_eq!(type_name, "Node");
            assert!(reason.contains("nesting"), "reason: {}", reason);
        }
        other => panic!("expected Encode error, got {:?}", other),
    }
}

/// Aggregate carrying an arbitrary pre-built value tree
#[derive(Debug, Clone, PartialEq)]
struct Raw {
    payload: FieldValue,
}

impl Aggregate for Raw {
    const TYPE_NAME: &'static str = "Raw";

    fn to_fields(&self, cx: &EncodeContext<'_>) -> Result<Fields, SerializationError> {
        let mut fields = Fields::new();
        fields.put("payload", &self.payload, cx)?;
        Ok(fields)
    }

    fn from_fields(mut fields: Fields, cx: &DecodeContext<'_>) -> Result<Self, SerializationError> {
        Ok(Self {
            payload: fields.take("payload", cx)?,
        })
    }
}

fn nested_sequences(depth: usize) -> FieldValue {
    (0..depth).fold(FieldValue::int(1), |inner, _| FieldValue::Sequence(vec![inner]))
}

#[test]
fn test_deep_raw_value_tree_rejected_at_encode() {
    let serializer = EntitySerializer::new();
    serializer.register_aggregate::<Raw>();

    let deep = Raw {
        payload: nested_sequences(200),
    };
    match serializer.serialize(&deep).unwrap_err() {
        SerializationError::Encode { type_name, reason } => {
            assert_eq!(type_name, "Raw");
            assert!(reason.contains("nesting"), "reason: {}", reason);
        }
        other => panic!("expected Encode error, got {:?}", other),
    }

    // Whatever is accepted must read back
    let shallow = Raw {
        payload: nested_sequences(MAX_NESTING_DEPTH - 2),
    };
    let bytes = serializer.serialize(&shallow).unwrap();
    assert_eq!(serializer.deserialize::<Raw>(&bytes).unwrap(), shallow);
}

#[test]
fn test_nesting_at_limit_roundtrips() {
    let serializer = fixture_serializer();
    let node = Node::chain(MAX_NESTING_DEPTH);

    let bytes = serializer.serialize(&node).unwrap();
    let decoded: Node = serializer.deserialize(&bytes).unwrap();
    assert_eq!(decoded, node);
}
