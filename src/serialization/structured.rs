//! Structured payload codec
//!
//! Maps a [`Document`] onto a JSON object. The top-level object carries the
//! aggregate's type name under `__type__` next to its fields; every value
//! that JSON cannot express on its own is wrapped in an object with exactly
//! one reserved dispatch key:
//!
//! ```text
//! identifier    {"__uuid__": "6f1c…"}
//! timestamp     {"__datetime__": "2024-05-01T12:00:00.123456789Z"}
//! value object  {"__value_object__": "Money", "value": 1250}
//! aggregate     {"__aggregate__": "Address", "fields": {...}}
//! mapping       {...}  or  {"__mapping__": {...}} when a key is reserved
//! bytes         {"__bytes__": "<base64>"}
//! float         1.5  or  {"__float__": "NaN" | "inf" | "-inf"}
//! ```
//!
//! Sequences, text, integers, booleans and null map onto their JSON
//! counterparts.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};
use uuid::Uuid;

use crate::error::SerializationError;

use super::value::{Document, FieldValue, Fields, Primitive};

pub const TYPE_KEY: &str = "__type__";
pub const UUID_KEY: &str = "__uuid__";
pub const DATETIME_KEY: &str = "__datetime__";
pub const VALUE_OBJECT_KEY: &str = "__value_object__";
pub const AGGREGATE_KEY: &str = "__aggregate__";
pub const MAPPING_KEY: &str = "__mapping__";
pub const BYTES_KEY: &str = "__bytes__";
pub const FLOAT_KEY: &str = "__float__";

const RESERVED_KEYS: [&str; 8] = [
    TYPE_KEY,
    UUID_KEY,
    DATETIME_KEY,
    VALUE_OBJECT_KEY,
    AGGREGATE_KEY,
    MAPPING_KEY,
    BYTES_KEY,
    FLOAT_KEY,
];

const INNER_VALUE_KEY: &str = "value";
const INNER_FIELDS_KEY: &str = "fields";

type CodecResult<T> = std::result::Result<T, SerializationError>;

pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

// =============================================================================
// Encode
// =============================================================================

/// Encode a document as a JSON payload
pub fn encode(doc: &Document) -> CodecResult<Vec<u8>> {
    let value = to_json(doc)?;
    serde_json::to_vec(&value).map_err(|e| SerializationError::Structured(e.to_string()))
}

/// Lower a document into its JSON object form
pub fn to_json(doc: &Document) -> CodecResult<Value> {
    let mut object = Map::new();
    object.insert(TYPE_KEY.to_string(), Value::String(doc.type_name.clone()));

    for (name, value) in doc.fields.iter() {
        // Top-level field names share the object with `__type__`
        if is_reserved(name) {
            return Err(SerializationError::ReservedFieldName(name.clone()));
        }
        object.insert(name.clone(), encode_value(value)?);
    }

    Ok(Value::Object(object))
}

fn encode_value(value: &FieldValue) -> CodecResult<Value> {
    let encoded = match value {
        FieldValue::Identifier(id) => wrapper(UUID_KEY, Value::String(id.to_string())),
        FieldValue::Timestamp(ts) => wrapper(
            DATETIME_KEY,
            Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        ),
        FieldValue::ValueObject { type_name, inner } => {
            let mut object = Map::new();
            object.insert(VALUE_OBJECT_KEY.to_string(), Value::String(type_name.clone()));
            object.insert(INNER_VALUE_KEY.to_string(), encode_value(inner)?);
            Value::Object(object)
        }
        FieldValue::Aggregate { type_name, fields } => {
            let mut object = Map::new();
            object.insert(AGGREGATE_KEY.to_string(), Value::String(type_name.clone()));
            object.insert(INNER_FIELDS_KEY.to_string(), encode_fields(fields)?);
            Value::Object(object)
        }
        FieldValue::Sequence(items) => Value::Array(
            items
                .iter()
                .map(encode_value)
                .collect::<CodecResult<Vec<_>>>()?,
        ),
        FieldValue::Mapping(entries) => {
            let mut object = Map::new();
            for (key, item) in entries {
                object.insert(key.clone(), encode_value(item)?);
            }
            if entries.keys().any(|k| is_reserved(k)) {
                wrapper(MAPPING_KEY, Value::Object(object))
            } else {
                Value::Object(object)
            }
        }
        FieldValue::Primitive(p) => encode_primitive(p),
    };
    Ok(encoded)
}

fn encode_fields(fields: &Fields) -> CodecResult<Value> {
    let mut object = Map::new();
    for (name, value) in fields.iter() {
        object.insert(name.clone(), encode_value(value)?);
    }
    Ok(Value::Object(object))
}

fn encode_primitive(p: &Primitive) -> Value {
    match p {
        Primitive::Null => Value::Null,
        Primitive::Bool(b) => Value::Bool(*b),
        Primitive::Int(i) => Value::Number(Number::from(*i)),
        Primitive::Float(f) => match Number::from_f64(*f) {
            Some(n) => Value::Number(n),
            None => {
                let label = if f.is_nan() {
                    "NaN"
                } else if f.is_sign_positive() {
                    "inf"
                } else {
                    "-inf"
                };
                wrapper(FLOAT_KEY, Value::String(label.to_string()))
            }
        },
        Primitive::Text(s) => Value::String(s.clone()),
        Primitive::Bytes(b) => wrapper(BYTES_KEY, Value::String(BASE64.encode(b))),
    }
}

fn wrapper(key: &str, value: Value) -> Value {
    let mut object = Map::with_capacity(1);
    object.insert(key.to_string(), value);
    Value::Object(object)
}

// =============================================================================
// Decode
// =============================================================================

/// Decode a JSON payload into a document
pub fn decode(payload: &[u8]) -> CodecResult<Document> {
    let value: Value =
        serde_json::from_slice(payload).map_err(|e| SerializationError::Structured(e.to_string()))?;
    from_json(value)
}

/// Raise a JSON object produced by [`to_json`] back into a document
pub fn from_json(value: Value) -> CodecResult<Document> {
    let mut object = match value {
        Value::Object(object) => object,
        other => return Err(malformed("top-level object", &other)),
    };

    let type_name = match object.remove(TYPE_KEY) {
        Some(Value::String(name)) => name,
        Some(other) => return Err(malformed("type name string", &other)),
        None => {
            return Err(SerializationError::Structured(format!(
                "missing '{}' key",
                TYPE_KEY
            )))
        }
    };

    let fields = object
        .into_iter()
        .map(|(name, value)| -> CodecResult<(String, FieldValue)> { Ok((name, decode_value(value)?)) })
        .collect::<CodecResult<Fields>>()?;

    Ok(Document::new(type_name, fields))
}

fn decode_value(value: Value) -> CodecResult<FieldValue> {
    match value {
        Value::Null => Ok(FieldValue::NULL),
        Value::Bool(b) => Ok(FieldValue::bool(b)),
        Value::Number(n) => decode_number(&n),
        Value::String(s) => Ok(FieldValue::text(s)),
        Value::Array(items) => Ok(FieldValue::Sequence(
            items
                .into_iter()
                .map(decode_value)
                .collect::<CodecResult<Vec<_>>>()?,
        )),
        Value::Object(object) => decode_object(object),
    }
}

fn decode_number(n: &Number) -> CodecResult<FieldValue> {
    if let Some(i) = n.as_i64() {
        return Ok(FieldValue::int(i));
    }
    if n.is_u64() {
        return Err(SerializationError::Structured(format!(
            "integer {} exceeds the signed 64-bit range",
            n
        )));
    }
    n.as_f64()
        .map(FieldValue::float)
        .ok_or_else(|| SerializationError::Structured(format!("unrepresentable number {}", n)))
}

fn decode_object(mut object: Map<String, Value>) -> CodecResult<FieldValue> {
    let tag = match object.keys().find(|k| is_reserved(k)) {
        Some(tag) => tag.clone(),
        None => return decode_mapping(object),
    };

    let payload = object.remove(&tag).unwrap_or(Value::Null);

    match tag.as_str() {
        UUID_KEY => {
            let text = expect_string(payload, "identifier string")?;
            Uuid::parse_str(&text)
                .map(FieldValue::Identifier)
                .map_err(|e| SerializationError::Structured(format!("bad identifier '{}': {}", text, e)))
        }
        DATETIME_KEY => {
            let text = expect_string(payload, "timestamp string")?;
            DateTime::parse_from_rfc3339(&text)
                .map(|ts| FieldValue::Timestamp(ts.with_timezone(&Utc)))
                .map_err(|e| SerializationError::Structured(format!("bad timestamp '{}': {}", text, e)))
        }
        VALUE_OBJECT_KEY => {
            let type_name = expect_string(payload, "value object type name")?;
            let inner = object.remove(INNER_VALUE_KEY).ok_or_else(|| {
                SerializationError::Structured(format!("value object '{}' has no value", type_name))
            })?;
            Ok(FieldValue::value_object(type_name, decode_value(inner)?))
        }
        AGGREGATE_KEY => {
            let type_name = expect_string(payload, "aggregate type name")?;
            let fields = match object.remove(INNER_FIELDS_KEY) {
                Some(Value::Object(fields)) => fields
                    .into_iter()
                    .map(|(name, value)| -> CodecResult<(String, FieldValue)> {
                        Ok((name, decode_value(value)?))
                    })
                    .collect::<CodecResult<Fields>>()?,
                Some(other) => return Err(malformed("aggregate fields object", &other)),
                None => {
                    return Err(SerializationError::Structured(format!(
                        "aggregate '{}' has no fields",
                        type_name
                    )))
                }
            };
            Ok(FieldValue::Aggregate { type_name, fields })
        }
        MAPPING_KEY => match payload {
            Value::Object(entries) => decode_mapping(entries),
            other => Err(malformed("escaped mapping object", &other)),
        },
        BYTES_KEY => {
            let text = expect_string(payload, "base64 string")?;
            BASE64
                .decode(text.as_bytes())
                .map(FieldValue::bytes)
                .map_err(|e| SerializationError::Structured(format!("bad base64 payload: {}", e)))
        }
        FLOAT_KEY => match expect_string(payload, "float label")?.as_str() {
            "NaN" => Ok(FieldValue::float(f64::NAN)),
            "inf" => Ok(FieldValue::float(f64::INFINITY)),
            "-inf" => Ok(FieldValue::float(f64::NEG_INFINITY)),
            other => Err(SerializationError::Structured(format!(
                "unknown float label '{}'",
                other
            ))),
        },
        // `__type__` only belongs at the top level
        _ => Err(SerializationError::Structured(format!(
            "unexpected reserved key '{}' in nested value",
            tag
        ))),
    }
}

fn decode_mapping(object: Map<String, Value>) -> CodecResult<FieldValue> {
    let entries = object
        .into_iter()
        .map(|(key, value)| -> CodecResult<(String, FieldValue)> { Ok((key, decode_value(value)?)) })
        .collect::<CodecResult<_>>()?;
    Ok(FieldValue::Mapping(entries))
}

fn expect_string(value: Value, what: &str) -> CodecResult<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(malformed(what, &other)),
    }
}

fn malformed(expected: &str, found: &Value) -> SerializationError {
    let kind = match found {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    SerializationError::Structured(format!("expected {}, found {}", expected, kind))
}
