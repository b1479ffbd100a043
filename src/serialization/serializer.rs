//! Entity serializer
//!
//! Front door of the serialization engine: owns the [`TypeRegistry`] and
//! turns aggregates into framed envelopes and back.

use bytes::Bytes;

use crate::config::StoreConfig;
use crate::error::SerializationError;

use super::codec::{Aggregate, DecodeContext, EncodeContext, ValueObject};
use super::envelope;
use super::registry::{TypeKind, TypeRegistry};
use super::value::{Document, FieldValue, Fields};
use super::Encoding;

/// Converts registered aggregates to and from tagged byte envelopes
#[derive(Debug, Default)]
pub struct EntitySerializer {
    registry: TypeRegistry,
    default_encoding: Encoding,
}

impl EntitySerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializer whose aggregates default to `encoding` unless they pin one
    pub fn with_encoding(encoding: Encoding) -> Self {
        Self {
            registry: TypeRegistry::new(),
            default_encoding: encoding,
        }
    }

    /// Serializer using the store's configured encoding
    pub fn for_config(config: &StoreConfig) -> Self {
        Self::with_encoding(config.encoding)
    }

    pub fn default_encoding(&self) -> Encoding {
        self.default_encoding
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    // =========================================================================
    // Registration
    // =========================================================================

    pub fn register_value_object<T: ValueObject>(&self) {
        self.registry.register_value_object::<T>();
    }

    pub fn register_aggregate<T: Aggregate>(&self) {
        self.registry.register_aggregate::<T>();
    }

    /// Register a custom constructor under `name`
    pub fn register_type<T, F>(&self, name: &str, kind: TypeKind, constructor: F)
    where
        T: Send + 'static,
        F: Fn(FieldValue, &DecodeContext<'_>) -> Result<T, SerializationError>
            + Send
            + Sync
            + 'static,
    {
        self.registry.register_type(name, kind, constructor);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.is_registered(name)
    }

    // =========================================================================
    // Encode
    // =========================================================================

    /// Lower an entity to its named fields
    pub fn to_fields<T: Aggregate>(&self, entity: &T) -> Result<Fields, SerializationError> {
        self.registry.ensure_registered::<T>(T::TYPE_NAME)?;
        let root = EncodeContext::new(&self.registry, T::TYPE_NAME);
        entity.to_fields(&root.enter(T::TYPE_NAME)?)
    }

    pub fn to_document<T: Aggregate>(&self, entity: &T) -> Result<Document, SerializationError> {
        Ok(Document::new(T::TYPE_NAME, self.to_fields(entity)?))
    }

    /// Serialize with the type's pinned encoding, or the serializer default
    pub fn serialize<T: Aggregate>(&self, entity: &T) -> Result<Bytes, SerializationError> {
        self.serialize_with(entity, T::ENCODING.unwrap_or(self.default_encoding))
    }

    /// Serialize preferring `encoding`
    ///
    /// A structured encode that cannot represent the document falls back to
    /// the opaque codec. Every failure names the offending type.
    pub fn serialize_with<T: Aggregate>(
        &self,
        entity: &T,
        encoding: Encoding,
    ) -> Result<Bytes, SerializationError> {
        let encode_error = |e: SerializationError| SerializationError::Encode {
            type_name: T::TYPE_NAME.to_string(),
            reason: e.to_string(),
        };

        let doc = self.to_document(entity).map_err(encode_error)?;

        match encoding {
            Encoding::Opaque => envelope::seal(&doc, Encoding::Opaque).map_err(encode_error),
            Encoding::Structured => match envelope::seal(&doc, Encoding::Structured) {
                Ok(bytes) => Ok(bytes),
                Err(
                    e @ (SerializationError::ReservedFieldName(_)
                    | SerializationError::Structured(_)),
                ) => {
                    tracing::debug!(
                        type_name = T::TYPE_NAME,
                        reason = %e,
                        "structured encoding not applicable, falling back to opaque"
                    );
                    envelope::seal(&doc, Encoding::Opaque).map_err(encode_error)
                }
                Err(e) => Err(encode_error(e)),
            },
        }
    }

    // =========================================================================
    // Decode
    // =========================================================================

    /// Decode an envelope into a `T`, failing if it holds another type
    pub fn deserialize<T: Aggregate>(&self, bytes: &[u8]) -> Result<T, SerializationError> {
        let (_, doc) = envelope::open(bytes)?;
        self.from_document(doc)
    }

    pub fn from_document<T: Aggregate>(&self, doc: Document) -> Result<T, SerializationError> {
        if doc.type_name != T::TYPE_NAME {
            return Err(SerializationError::TypeMismatch {
                expected: T::TYPE_NAME.to_string(),
                found: doc.type_name,
            });
        }

        let Document { type_name, fields } = doc;
        let cx = DecodeContext::new(&self.registry, T::TYPE_NAME);
        self.registry.construct::<T>(
            T::TYPE_NAME,
            &type_name,
            FieldValue::Aggregate {
                type_name: type_name.clone(),
                fields,
            },
            &cx,
        )
    }

    /// Decode an envelope without resolving any registered types
    pub fn decode_document(&self, bytes: &[u8]) -> Result<Document, SerializationError> {
        decode_document(bytes)
    }

    /// Encoding an envelope was written with
    pub fn detect_encoding(&self, bytes: &[u8]) -> Result<Encoding, SerializationError> {
        envelope::open(bytes).map(|(encoding, _)| encoding)
    }
}

/// Registry-free decode of any envelope, tagged or legacy
pub fn decode_document(bytes: &[u8]) -> Result<Document, SerializationError> {
    envelope::open(bytes).map(|(_, doc)| doc)
}
