//! Field value tree
//!
//! Every persisted field is lowered to a [`FieldValue`] before it reaches a
//! codec. The variant is the wrapper category, so decoders dispatch on it and
//! never guess a shape.

use std::collections::btree_map;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SerializationError;

use super::codec::{DecodeContext, EncodeContext, FieldCodec};

/// Discriminated field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Unique identifier
    Identifier(Uuid),

    /// Point in time, UTC, nanosecond precision
    Timestamp(DateTime<Utc>),

    /// Registered value object: its type name and wrapped value
    ValueObject {
        type_name: String,
        inner: Box<FieldValue>,
    },

    /// Nested aggregate: its type name and named fields
    Aggregate { type_name: String, fields: Fields },

    Sequence(Vec<FieldValue>),

    /// String-keyed mapping
    Mapping(BTreeMap<String, FieldValue>),

    Primitive(Primitive),
}

/// Leaf values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Primitive {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub const NULL: FieldValue = FieldValue::Primitive(Primitive::Null);

    /// Shape name used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Identifier(_) => "identifier",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::ValueObject { .. } => "value object",
            FieldValue::Aggregate { .. } => "aggregate",
            FieldValue::Sequence(_) => "sequence",
            FieldValue::Mapping(_) => "mapping",
            FieldValue::Primitive(p) => p.kind(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Primitive(Primitive::Null))
    }

    /// Registered type name for value objects and aggregates
    pub fn type_name(&self) -> Option<&str> {
        match self {
            FieldValue::ValueObject { type_name, .. } | FieldValue::Aggregate { type_name, .. } => {
                Some(type_name)
            }
            _ => None,
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Primitive(Primitive::Text(value.into()))
    }

    pub fn int(value: i64) -> Self {
        FieldValue::Primitive(Primitive::Int(value))
    }

    pub fn float(value: f64) -> Self {
        FieldValue::Primitive(Primitive::Float(value))
    }

    pub fn bool(value: bool) -> Self {
        FieldValue::Primitive(Primitive::Bool(value))
    }

    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        FieldValue::Primitive(Primitive::Bytes(value.into()))
    }

    pub fn value_object(type_name: impl Into<String>, inner: FieldValue) -> Self {
        FieldValue::ValueObject {
            type_name: type_name.into(),
            inner: Box::new(inner),
        }
    }
}

impl Primitive {
    pub fn kind(&self) -> &'static str {
        match self {
            Primitive::Null => "null",
            Primitive::Bool(_) => "bool",
            Primitive::Int(_) => "integer",
            Primitive::Float(_) => "float",
            Primitive::Text(_) => "text",
            Primitive::Bytes(_) => "bytes",
        }
    }
}

impl From<Primitive> for FieldValue {
    fn from(p: Primitive) -> Self {
        FieldValue::Primitive(p)
    }
}

// =============================================================================
// Fields
// =============================================================================

/// Named fields of one aggregate, kept in name order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fields(BTreeMap<String, FieldValue>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        self.0.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, FieldValue> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    // -------------------------------------------------------------------------
    // Typed access
    // -------------------------------------------------------------------------

    /// Encode `value` and store it under `name`
    pub fn put<T: FieldCodec>(
        &mut self,
        name: &str,
        value: &T,
        cx: &EncodeContext<'_>,
    ) -> Result<(), SerializationError> {
        let encoded = value.encode_field(cx).map_err(|e| e.in_field(name))?;
        self.0.insert(name.to_string(), encoded);
        Ok(())
    }

    /// Remove and decode a required field
    pub fn take<T: FieldCodec>(
        &mut self,
        name: &str,
        cx: &DecodeContext<'_>,
    ) -> Result<T, SerializationError> {
        match self.0.remove(name) {
            Some(value) => T::decode_field(value, cx).map_err(|e| e.in_field(name)),
            None => Err(SerializationError::MissingField {
                type_name: cx.type_name().to_string(),
                field: name.to_string(),
            }),
        }
    }

    /// Remove and decode a field; absent or null yields `None`
    pub fn take_optional<T: FieldCodec>(
        &mut self,
        name: &str,
        cx: &DecodeContext<'_>,
    ) -> Result<Option<T>, SerializationError> {
        match self.0.remove(name) {
            Some(value) if !value.is_null() => {
                T::decode_field(value, cx).map(Some).map_err(|e| e.in_field(name))
            }
            _ => Ok(None),
        }
    }

    /// Remove and decode a field, falling back to `T::default()` when absent
    pub fn take_or_default<T: FieldCodec + Default>(
        &mut self,
        name: &str,
        cx: &DecodeContext<'_>,
    ) -> Result<T, SerializationError> {
        Ok(self.take_optional(name, cx)?.unwrap_or_default())
    }
}

impl FromIterator<(String, FieldValue)> for Fields {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Fields {
    type Item = (String, FieldValue);
    type IntoIter = btree_map::IntoIter<String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// =============================================================================
// Document
// =============================================================================

/// A decoded envelope: the top-level aggregate's type name and fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub type_name: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(type_name: impl Into<String>, fields: Fields) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }
}
