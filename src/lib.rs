//! # atlas-persist
//!
//! Embedded persistence engine for multi-tenant, local-first applications:
//! - Workspace-isolated key space inside shared copy-on-write store files
//! - Scoped read/write transactions (single writer, MVCC snapshot readers)
//! - Type-tagged entity envelopes with a structured and an opaque codec
//! - Generic repository with composable in-memory specifications
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Domain repositories / handlers              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  CRUD + Specification
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   Repository<C>                             │
//! │        ("ws:" + workspace + ":" + id key derivation)        │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │                                  │
//!            ▼                                  ▼
//!   ┌──────────────────┐              ┌──────────────────┐
//!   │ EntitySerializer │              │  StorageManager  │
//!   │ (TypeRegistry,   │              │ (HandleRegistry, │
//!   │  json | bin)     │              │  scoped txns)    │
//!   └──────────────────┘              └────────┬─────────┘
//!                                              │
//!                                              ▼
//!                                     ┌──────────────────┐
//!                                     │ <root>/<db>.redb │
//!                                     │  sub-databases   │
//!                                     └──────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod repository;
pub mod serialization;
pub mod storage;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::StoreConfig;
pub use error::{CapacityError, RepositoryError, Result, SerializationError};
pub use repository::{AsyncRepository, Collection, Repository, Specification, SpecificationExt};
pub use serialization::{Aggregate, EntitySerializer, FieldValue, Fields, ValueObject};
pub use storage::StorageManager;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of atlas-persist
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
