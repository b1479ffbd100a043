//! Type registry
//!
//! Maps a logical type name to the Rust type registered under it and a
//! reconstruction function. Encoding checks that every value object and
//! aggregate in a graph is registered; decoding resolves each nested type
//! name through the registry, so an envelope naming an unknown or different
//! type fails instead of being forced into the expected shape.
//!
//! ## Concurrency:
//! - `entries`: RwLock; registration is rare, lookups are constant. The
//!   lock is released before a constructor runs, so constructors may
//!   recurse into the registry.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::SerializationError;

use super::codec::{Aggregate, DecodeContext, ValueObject};
use super::value::FieldValue;

/// Category of a registered type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    ValueObject,
    Aggregate,
}

type Constructor = Arc<
    dyn Fn(FieldValue, &DecodeContext<'_>) -> Result<Box<dyn Any + Send>, SerializationError>
        + Send
        + Sync,
>;

#[derive(Clone)]
struct Registration {
    kind: TypeKind,
    type_id: TypeId,
    rust_type: &'static str,
    construct: Constructor,
}

/// Name-keyed registry of reconstructible types
#[derive(Default)]
pub struct TypeRegistry {
    entries: RwLock<HashMap<String, Registration>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register `constructor` as the way to rebuild `T` from a wrapper value
    /// carrying `name`.
    ///
    /// Registering the same type again is a no-op in effect; registering a
    /// different type under a taken name replaces the old entry.
    pub fn register_type<T, F>(&self, name: &str, kind: TypeKind, constructor: F)
    where
        T: Send + 'static,
        F: Fn(FieldValue, &DecodeContext<'_>) -> Result<T, SerializationError>
            + Send
            + Sync
            + 'static,
    {
        let construct: Constructor = Arc::new(move |value: FieldValue, cx: &DecodeContext<'_>| {
            constructor(value, cx).map(|v| Box::new(v) as Box<dyn Any + Send>)
        });

        let registration = Registration {
            kind,
            type_id: TypeId::of::<T>(),
            rust_type: std::any::type_name::<T>(),
            construct,
        };

        let mut entries = self.entries.write();
        if let Some(previous) = entries.get(name) {
            if previous.type_id != registration.type_id {
                tracing::warn!(
                    name,
                    previous = previous.rust_type,
                    replacement = registration.rust_type,
                    "type name re-registered for a different type"
                );
            }
        }
        entries.insert(name.to_string(), registration);
    }

    pub fn register_value_object<T: ValueObject>(&self) {
        self.register_type::<T, _>(T::TYPE_NAME, TypeKind::ValueObject, |value, cx| match value {
            FieldValue::ValueObject { inner, .. } => T::from_inner(*inner, cx),
            other => Err(SerializationError::shape("value object", &other)),
        });
    }

    pub fn register_aggregate<T: Aggregate>(&self) {
        self.register_type::<T, _>(T::TYPE_NAME, TypeKind::Aggregate, |value, cx| match value {
            FieldValue::Aggregate { fields, .. } => T::from_fields(fields, cx),
            other => Err(SerializationError::shape("aggregate", &other)),
        });
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn kind_of(&self, name: &str) -> Option<TypeKind> {
        self.entries.read().get(name).map(|r| r.kind)
    }

    /// Registered names, sorted
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Fails unless `name` is registered for `T`
    pub fn ensure_registered<T: 'static>(&self, name: &str) -> Result<(), SerializationError> {
        let entries = self.entries.read();
        match entries.get(name) {
            Some(r) if r.type_id == TypeId::of::<T>() => Ok(()),
            Some(r) => Err(SerializationError::TypeMismatch {
                expected: std::any::type_name::<T>().to_string(),
                found: r.rust_type.to_string(),
            }),
            None => Err(SerializationError::UnregisteredType(name.to_string())),
        }
    }

    /// Rebuild a `T` from a wrapper value whose embedded name is `found`
    ///
    /// `expected` is the logical name the caller asked for and only appears
    /// in errors.
    pub fn construct<T: 'static>(
        &self,
        expected: &str,
        found: &str,
        value: FieldValue,
        cx: &DecodeContext<'_>,
    ) -> Result<T, SerializationError> {
        let registration = self
            .entries
            .read()
            .get(found)
            .cloned()
            .ok_or_else(|| SerializationError::UnresolvedType(found.to_string()))?;

        let mismatch = || SerializationError::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        };

        if registration.type_id != TypeId::of::<T>() {
            return Err(mismatch());
        }

        let child = cx.enter(found)?;
        let built = (registration.construct)(value, &child)?;
        built.downcast::<T>().map(|b| *b).map_err(|_| mismatch())
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.registered_names())
            .finish()
    }
}
