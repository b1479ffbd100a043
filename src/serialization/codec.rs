//! Field codecs
//!
//! [`FieldCodec`] lowers a Rust value into a [`FieldValue`] and raises it back.
//! Primitives, identifiers, timestamps, options, sequences and string-keyed
//! maps are covered here. Domain types plug in through [`ValueObject`] and
//! [`Aggregate`], wired up with the [`value_object_codec!`] and
//! [`aggregate_codec!`] macros.
//!
//! Nesting is bounded by [`MAX_NESTING_DEPTH`]. An owned value graph cannot
//! be cyclic, but a graph built through shared pointers can expand without
//! end; such graphs are rejected instead of recursing forever.

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use chrono::{DateTime, Datelike, Utc};
use uuid::Uuid;

use crate::error::SerializationError;

use super::registry::TypeRegistry;
use super::value::{FieldValue, Fields, Primitive};
use super::Encoding;

/// Deepest nesting of value objects, aggregates and containers
pub const MAX_NESTING_DEPTH: usize = 48;

type CodecResult<T> = std::result::Result<T, SerializationError>;

// =============================================================================
// Contexts
// =============================================================================

/// State threaded through an encode: the registry, the aggregate or value
/// object being encoded, and the current depth.
#[derive(Clone, Copy)]
pub struct EncodeContext<'a> {
    registry: &'a TypeRegistry,
    type_name: &'a str,
    depth: usize,
}

impl<'a> EncodeContext<'a> {
    pub fn new(registry: &'a TypeRegistry, type_name: &'a str) -> Self {
        Self {
            registry,
            type_name,
            depth: 0,
        }
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }

    pub fn type_name(&self) -> &'a str {
        self.type_name
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// One level down into a container
    pub fn descend(&self) -> CodecResult<Self> {
        check_depth(self.depth + 1)?;
        Ok(Self {
            depth: self.depth + 1,
            ..*self
        })
    }

    /// One level down into a nested value object or aggregate
    pub fn enter<'b>(&self, type_name: &'b str) -> CodecResult<EncodeContext<'b>>
    where
        'a: 'b,
    {
        check_depth(self.depth + 1)?;
        Ok(EncodeContext {
            registry: self.registry,
            type_name,
            depth: self.depth + 1,
        })
    }
}

/// Decode-side counterpart of [`EncodeContext`]
#[derive(Clone, Copy)]
pub struct DecodeContext<'a> {
    registry: &'a TypeRegistry,
    type_name: &'a str,
    depth: usize,
}

impl<'a> DecodeContext<'a> {
    pub fn new(registry: &'a TypeRegistry, type_name: &'a str) -> Self {
        Self {
            registry,
            type_name,
            depth: 0,
        }
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }

    pub fn type_name(&self) -> &'a str {
        self.type_name
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn descend(&self) -> CodecResult<Self> {
        check_depth(self.depth + 1)?;
        Ok(Self {
            depth: self.depth + 1,
            ..*self
        })
    }

    pub fn enter<'b>(&self, type_name: &'b str) -> CodecResult<DecodeContext<'b>>
    where
        'a: 'b,
    {
        check_depth(self.depth + 1)?;
        Ok(DecodeContext {
            registry: self.registry,
            type_name,
            depth: self.depth + 1,
        })
    }
}

fn check_depth(depth: usize) -> CodecResult<()> {
    if depth > MAX_NESTING_DEPTH {
        return Err(SerializationError::NestingTooDeep {
            limit: MAX_NESTING_DEPTH,
        });
    }
    Ok(())
}

// =============================================================================
// Traits
// =============================================================================

/// Conversion between a Rust value and a [`FieldValue`]
pub trait FieldCodec: Sized {
    fn encode_field(&self, cx: &EncodeContext<'_>) -> CodecResult<FieldValue>;

    fn decode_field(value: FieldValue, cx: &DecodeContext<'_>) -> CodecResult<Self>;
}

/// Immutable, identity-less type persisted as `{type name, inner value}`
///
/// ```ignore
/// struct Money(i64);
///
/// impl ValueObject for Money {
///     const TYPE_NAME: &'static str = "Money";
///
///     fn to_inner(&self, cx: &EncodeContext<'_>) -> Result<FieldValue, SerializationError> {
///         self.0.encode_field(cx)
///     }
///
///     fn from_inner(inner: FieldValue, cx: &DecodeContext<'_>) -> Result<Self, SerializationError> {
///         i64::decode_field(inner, cx).map(Money)
///     }
/// }
///
/// value_object_codec!(Money);
/// ```
pub trait ValueObject: Sized + Send + 'static {
    const TYPE_NAME: &'static str;

    fn to_inner(&self, cx: &EncodeContext<'_>) -> CodecResult<FieldValue>;

    fn from_inner(inner: FieldValue, cx: &DecodeContext<'_>) -> CodecResult<Self>;
}

/// Entity with named fields, persisted as one envelope
pub trait Aggregate: Sized + Send + 'static {
    const TYPE_NAME: &'static str;

    /// Codec for envelopes of this type; `None` defers to the serializer's
    /// configured default.
    const ENCODING: Option<Encoding> = None;

    fn to_fields(&self, cx: &EncodeContext<'_>) -> CodecResult<Fields>;

    fn from_fields(fields: Fields, cx: &DecodeContext<'_>) -> CodecResult<Self>;
}

// =============================================================================
// Value Object / Aggregate Helpers
// =============================================================================

pub fn encode_value_object<T: ValueObject>(
    value: &T,
    cx: &EncodeContext<'_>,
) -> CodecResult<FieldValue> {
    cx.registry().ensure_registered::<T>(T::TYPE_NAME)?;
    let inner = value.to_inner(&cx.enter(T::TYPE_NAME)?)?;
    Ok(FieldValue::ValueObject {
        type_name: T::TYPE_NAME.to_string(),
        inner: Box::new(inner),
    })
}

pub fn decode_value_object<T: ValueObject>(
    value: FieldValue,
    cx: &DecodeContext<'_>,
) -> CodecResult<T> {
    let found = match &value {
        FieldValue::ValueObject { type_name, .. } => type_name.clone(),
        other => return Err(SerializationError::shape("value object", other)),
    };
    cx.registry().construct::<T>(T::TYPE_NAME, &found, value, cx)
}

pub fn encode_aggregate<T: Aggregate>(value: &T, cx: &EncodeContext<'_>) -> CodecResult<FieldValue> {
    cx.registry().ensure_registered::<T>(T::TYPE_NAME)?;
    let fields = value.to_fields(&cx.enter(T::TYPE_NAME)?)?;
    Ok(FieldValue::Aggregate {
        type_name: T::TYPE_NAME.to_string(),
        fields,
    })
}

pub fn decode_aggregate<T: Aggregate>(value: FieldValue, cx: &DecodeContext<'_>) -> CodecResult<T> {
    let found = match &value {
        FieldValue::Aggregate { type_name, .. } => type_name.clone(),
        other => return Err(SerializationError::shape("aggregate", other)),
    };
    cx.registry().construct::<T>(T::TYPE_NAME, &found, value, cx)
}

/// Implement [`FieldCodec`] for [`ValueObject`] types so they can appear as
/// fields of an aggregate.
#[macro_export]
macro_rules! value_object_codec {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::serialization::FieldCodec for $ty {
                fn encode_field(
                    &self,
                    cx: &$crate::serialization::EncodeContext<'_>,
                ) -> ::std::result::Result<$crate::serialization::FieldValue, $crate::SerializationError> {
                    $crate::serialization::encode_value_object(self, cx)
                }

                fn decode_field(
                    value: $crate::serialization::FieldValue,
                    cx: &$crate::serialization::DecodeContext<'_>,
                ) -> ::std::result::Result<Self, $crate::SerializationError> {
                    $crate::serialization::decode_value_object(value, cx)
                }
            }
        )+
    };
}

/// Implement [`FieldCodec`] for [`Aggregate`] types nested inside another
/// aggregate.
#[macro_export]
macro_rules! aggregate_codec {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::serialization::FieldCodec for $ty {
                fn encode_field(
                    &self,
                    cx: &$crate::serialization::EncodeContext<'_>,
                ) -> ::std::result::Result<$crate::serialization::FieldValue, $crate::SerializationError> {
                    $crate::serialization::encode_aggregate(self, cx)
                }

                fn decode_field(
                    value: $crate::serialization::FieldValue,
                    cx: &$crate::serialization::DecodeContext<'_>,
                ) -> ::std::result::Result<Self, $crate::SerializationError> {
                    $crate::serialization::decode_aggregate(value, cx)
                }
            }
        )+
    };
}

// =============================================================================
// Built-in Codecs
// =============================================================================

/// Pre-built trees count their levels the way the typed codecs would and
/// carry the same timestamp range
impl FieldCodec for FieldValue {
    fn encode_field(&self, cx: &EncodeContext<'_>) -> CodecResult<FieldValue> {
        check_tree(self, cx.depth())?;
        Ok(self.clone())
    }

    fn decode_field(value: FieldValue, cx: &DecodeContext<'_>) -> CodecResult<Self> {
        check_tree(&value, cx.depth())?;
        Ok(value)
    }
}

fn check_tree(value: &FieldValue, depth: usize) -> CodecResult<()> {
    let below = depth + 1;
    match value {
        FieldValue::ValueObject { inner, .. } => {
            check_depth(below)?;
            check_tree(inner, below)
        }
        FieldValue::Aggregate { fields, .. } => {
            check_depth(below)?;
            fields.iter().try_for_each(|(_, v)| check_tree(v, below))
        }
        FieldValue::Sequence(items) => {
            check_depth(below)?;
            items.iter().try_for_each(|v| check_tree(v, below))
        }
        FieldValue::Mapping(entries) => {
            check_depth(below)?;
            entries.values().try_for_each(|v| check_tree(v, below))
        }
        FieldValue::Timestamp(ts) => check_timestamp(ts),
        FieldValue::Identifier(_) | FieldValue::Primitive(_) => Ok(()),
    }
}

impl FieldCodec for bool {
    fn encode_field(&self, _cx: &EncodeContext<'_>) -> CodecResult<FieldValue> {
        Ok(FieldValue::bool(*self))
    }

    fn decode_field(value: FieldValue, _cx: &DecodeContext<'_>) -> CodecResult<Self> {
        match value {
            FieldValue::Primitive(Primitive::Bool(b)) => Ok(b),
            other => Err(SerializationError::shape("bool", &other)),
        }
    }
}

macro_rules! integer_codec {
    ($($ty:ty),+) => {
        $(
            impl FieldCodec for $ty {
                fn encode_field(&self, cx: &EncodeContext<'_>) -> CodecResult<FieldValue> {
                    i64::try_from(*self)
                        .map(FieldValue::int)
                        .map_err(|_| SerializationError::Encode {
                            type_name: cx.type_name().to_string(),
                            reason: format!("{} does not fit in a 64-bit signed integer", self),
                        })
                }

                fn decode_field(value: FieldValue, _cx: &DecodeContext<'_>) -> CodecResult<Self> {
                    match value {
                        FieldValue::Primitive(Primitive::Int(i)) => <$ty>::try_from(i).map_err(|_| {
                            SerializationError::UnexpectedShape {
                                field: String::new(),
                                expected: stringify!($ty),
                                found: "out-of-range integer",
                            }
                        }),
                        other => Err(SerializationError::shape(stringify!($ty), &other)),
                    }
                }
            }
        )+
    };
}

integer_codec!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl FieldCodec for f64 {
    fn encode_field(&self, _cx: &EncodeContext<'_>) -> CodecResult<FieldValue> {
        Ok(FieldValue::float(*self))
    }

    fn decode_field(value: FieldValue, _cx: &DecodeContext<'_>) -> CodecResult<Self> {
        match value {
            FieldValue::Primitive(Primitive::Float(f)) => Ok(f),
            FieldValue::Primitive(Primitive::Int(i)) => Ok(i as f64),
            other => Err(SerializationError::shape("float", &other)),
        }
    }
}

impl FieldCodec for f32 {
    fn encode_field(&self, _cx: &EncodeContext<'_>) -> CodecResult<FieldValue> {
        Ok(FieldValue::float(f64::from(*self)))
    }

    fn decode_field(value: FieldValue, cx: &DecodeContext<'_>) -> CodecResult<Self> {
        f64::decode_field(value, cx).map(|f| f as f32)
    }
}

impl FieldCodec for String {
    fn encode_field(&self, _cx: &EncodeContext<'_>) -> CodecResult<FieldValue> {
        Ok(FieldValue::text(self.clone()))
    }

    fn decode_field(value: FieldValue, _cx: &DecodeContext<'_>) -> CodecResult<Self> {
        match value {
            FieldValue::Primitive(Primitive::Text(s)) => Ok(s),
            other => Err(SerializationError::shape("text", &other)),
        }
    }
}

/// Raw bytes stored as a byte primitive
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Blob(pub Vec<u8>);

impl FieldCodec for Blob {
    fn encode_field(&self, _cx: &EncodeContext<'_>) -> CodecResult<FieldValue> {
        Ok(FieldValue::bytes(self.0.clone()))
    }

    fn decode_field(value: FieldValue, _cx: &DecodeContext<'_>) -> CodecResult<Self> {
        match value {
            FieldValue::Primitive(Primitive::Bytes(b)) => Ok(Blob(b)),
            other => Err(SerializationError::shape("bytes", &other)),
        }
    }
}

impl FieldCodec for Uuid {
    fn encode_field(&self, _cx: &EncodeContext<'_>) -> CodecResult<FieldValue> {
        Ok(FieldValue::Identifier(*self))
    }

    fn decode_field(value: FieldValue, _cx: &DecodeContext<'_>) -> CodecResult<Self> {
        match value {
            FieldValue::Identifier(id) => Ok(id),
            other => Err(SerializationError::shape("identifier", &other)),
        }
    }
}

/// RFC 3339 only spells four-digit years
fn check_timestamp(ts: &DateTime<Utc>) -> CodecResult<()> {
    if (0..=9999).contains(&ts.year()) {
        Ok(())
    } else {
        Err(SerializationError::TimestampOutOfRange(ts.to_string()))
    }
}

impl FieldCodec for DateTime<Utc> {
    fn encode_field(&self, _cx: &EncodeContext<'_>) -> CodecResult<FieldValue> {
        check_timestamp(self)?;
        Ok(FieldValue::Timestamp(*self))
    }

    fn decode_field(value: FieldValue, _cx: &DecodeContext<'_>) -> CodecResult<Self> {
        match value {
            FieldValue::Timestamp(ts) => Ok(ts),
            other => Err(SerializationError::shape("timestamp", &other)),
        }
    }
}

impl<T: FieldCodec> FieldCodec for Option<T> {
    fn encode_field(&self, cx: &EncodeContext<'_>) -> CodecResult<FieldValue> {
        match self {
            Some(value) => value.encode_field(cx),
            None => Ok(FieldValue::NULL),
        }
    }

    fn decode_field(value: FieldValue, cx: &DecodeContext<'_>) -> CodecResult<Self> {
        if value.is_null() {
            return Ok(None);
        }
        T::decode_field(value, cx).map(Some)
    }
}

impl<T: FieldCodec> FieldCodec for Box<T> {
    fn encode_field(&self, cx: &EncodeContext<'_>) -> CodecResult<FieldValue> {
        (**self).encode_field(cx)
    }

    fn decode_field(value: FieldValue, cx: &DecodeContext<'_>) -> CodecResult<Self> {
        T::decode_field(value, cx).map(Box::new)
    }
}

// Shared pointers are written out by value; sharing is not preserved.
impl<T: FieldCodec> FieldCodec for std::sync::Arc<T> {
    fn encode_field(&self, cx: &EncodeContext<'_>) -> CodecResult<FieldValue> {
        (**self).encode_field(cx)
    }

    fn decode_field(value: FieldValue, cx: &DecodeContext<'_>) -> CodecResult<Self> {
        T::decode_field(value, cx).map(std::sync::Arc::new)
    }
}

impl<T: FieldCodec> FieldCodec for Vec<T> {
    fn encode_field(&self, cx: &EncodeContext<'_>) -> CodecResult<FieldValue> {
        let cx = cx.descend()?;
        let items = self
            .iter()
            .map(|item| item.encode_field(&cx))
            .collect::<CodecResult<Vec<_>>>()?;
        Ok(FieldValue::Sequence(items))
    }

    fn decode_field(value: FieldValue, cx: &DecodeContext<'_>) -> CodecResult<Self> {
        match value {
            FieldValue::Sequence(items) => {
                let cx = cx.descend()?;
                items
                    .into_iter()
                    .map(|item| T::decode_field(item, &cx))
                    .collect()
            }
            other => Err(SerializationError::shape("sequence", &other)),
        }
    }
}

impl<T: FieldCodec> FieldCodec for BTreeMap<String, T> {
    fn encode_field(&self, cx: &EncodeContext<'_>) -> CodecResult<FieldValue> {
        let cx = cx.descend()?;
        let entries = self
            .iter()
            .map(|(k, v)| -> CodecResult<(String, FieldValue)> {
                Ok((k.clone(), v.encode_field(&cx)?))
            })
            .collect::<CodecResult<BTreeMap<_, _>>>()?;
        Ok(FieldValue::Mapping(entries))
    }

    fn decode_field(value: FieldValue, cx: &DecodeContext<'_>) -> CodecResult<Self> {
        match value {
            FieldValue::Mapping(entries) => {
                let cx = cx.descend()?;
                entries
                    .into_iter()
                    .map(|(k, v)| -> CodecResult<(String, T)> { Ok((k, T::decode_field(v, &cx)?)) })
                    .collect()
            }
            other => Err(SerializationError::shape("mapping", &other)),
        }
    }
}

impl<T: FieldCodec, S: BuildHasher + Default> FieldCodec for HashMap<String, T, S> {
    fn encode_field(&self, cx: &EncodeContext<'_>) -> CodecResult<FieldValue> {
        let cx = cx.descend()?;
        let entries = self
            .iter()
            .map(|(k, v)| -> CodecResult<(String, FieldValue)> {
                Ok((k.clone(), v.encode_field(&cx)?))
            })
            .collect::<CodecResult<BTreeMap<_, _>>>()?;
        Ok(FieldValue::Mapping(entries))
    }

    fn decode_field(value: FieldValue, cx: &DecodeContext<'_>) -> CodecResult<Self> {
        match value {
            FieldValue::Mapping(entries) => {
                let cx = cx.descend()?;
                entries
                    .into_iter()
                    .map(|(k, v)| -> CodecResult<(String, T)> { Ok((k, T::decode_field(v, &cx)?)) })
                    .collect()
            }
            other => Err(SerializationError::shape("mapping", &other)),
        }
    }
}
