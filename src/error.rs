//! Error types for atlas-persist
//!
//! Every failure crossing the public API is a [`RepositoryError`]. Storage
//! engine errors are wrapped at the transaction boundary and codec failures at
//! the serialization boundary, so no raw engine error reaches callers.

use thiserror::Error;

/// Result type alias using RepositoryError
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Unified error type for repository and storage operations
#[derive(Debug, Error)]
pub enum RepositoryError {
    // -------------------------------------------------------------------------
    // Storage Engine Errors
    // -------------------------------------------------------------------------
    #[error("Storage engine error: {0}")]
    Engine(#[from] redb::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Capacity exhausted: {0}")]
    Capacity(CapacityError),

    #[error("Database '{database}' was opened read-only")]
    ReadOnly { database: String },

    #[error("Transaction already committed or aborted")]
    TransactionClosed,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    // -------------------------------------------------------------------------
    // Entity Errors
    // -------------------------------------------------------------------------
    #[error("Entity '{id}' not found in collection '{collection}'")]
    EntityNotFound { collection: String, id: String },

    #[error("Entity '{id}' already exists in collection '{collection}'")]
    EntityAlreadyExists { collection: String, id: String },

    // -------------------------------------------------------------------------
    // Key Space Errors
    // -------------------------------------------------------------------------
    #[error("Invalid workspace name: {0}")]
    InvalidWorkspace(String),

    #[error("Invalid entity key: {0}")]
    InvalidKey(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Background task failed: {0}")]
    TaskJoin(String),
}

impl RepositoryError {
    /// True for hard limits of the backing file (map size, sub-database count).
    pub fn is_capacity(&self) -> bool {
        matches!(self, RepositoryError::Capacity(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::EntityNotFound { .. })
    }

    pub fn is_serialization(&self) -> bool {
        matches!(self, RepositoryError::Serialization(_))
    }
}

/// Hard limits fixed at manager construction. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapacityError {
    #[error("map full: {used} bytes would exceed the {limit} byte map size")]
    MapFull { used: u64, limit: u64 },

    #[error("sub-database limit of {limit} reached while creating '{name}'")]
    SubDatabaseLimit { name: String, limit: u32 },
}

// The engine splits its errors across several types; fold them all into the
// umbrella `redb::Error` so `?` works on every engine call.
macro_rules! engine_error_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for RepositoryError {
                fn from(e: $ty) -> Self {
                    RepositoryError::Engine(redb::Error::from(e))
                }
            }
        )*
    };
}

engine_error_from!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

/// Encode/decode failures
///
/// Surfaced to callers wrapped in [`RepositoryError::Serialization`].
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("type '{0}' is not registered")]
    UnregisteredType(String),

    #[error("cannot resolve type '{0}': no registration under that name")]
    UnresolvedType(String),

    #[error("type mismatch: expected '{expected}', found '{found}'")]
    TypeMismatch { expected: String, found: String },

    #[error("missing required field '{field}' on '{type_name}'")]
    MissingField { type_name: String, field: String },

    #[error("field '{field}': expected {expected}, found {found}")]
    UnexpectedShape {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("field name '{0}' is reserved")]
    ReservedFieldName(String),

    #[error("value nesting exceeds {limit} levels (cyclic or pathological graph)")]
    NestingTooDeep { limit: usize },

    #[error("timestamp {0} is outside the years 0000-9999")]
    TimestampOutOfRange(String),

    #[error("failed to encode '{type_name}': {reason}")]
    Encode { type_name: String, reason: String },

    #[error("malformed structured payload: {0}")]
    Structured(String),

    #[error("malformed opaque payload: {0}")]
    Opaque(String),

    #[error("opaque payload checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("envelope matches no known format")]
    UnknownFormat,
}

impl SerializationError {
    /// A value had the wrong wrapper category; the field is filled in by the
    /// enclosing field accessor.
    pub fn shape(expected: &'static str, found: &crate::serialization::FieldValue) -> Self {
        SerializationError::UnexpectedShape {
            field: String::new(),
            expected,
            found: found.kind(),
        }
    }

    /// Attach a field name to a shape error raised below it
    pub fn in_field(self, name: &str) -> Self {
        match self {
            SerializationError::UnexpectedShape {
                field,
                expected,
                found,
            } if field.is_empty() => SerializationError::UnexpectedShape {
                field: name.to_string(),
                expected,
                found,
            },
            other => other,
        }
    }
}
