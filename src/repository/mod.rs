//! Repository Module
//!
//! Per-collection CRUD and query surface with workspace isolation.
//!
//! ## Responsibilities
//! - Workspace-prefixed key derivation ([`keys`])
//! - CRUD, scans and in-memory queries ([`Repository`])
//! - Composable predicates ([`Specification`])
//! - `async` entry points over the blocking pool ([`AsyncRepository`])
//!
//! ## Request Flow
//! ```text
//! Repository::save(entity)
//!     │ C::entity_id(entity) ──► "ws:" + workspace + ":" + id
//!     │ EntitySerializer::serialize(entity) ──► tag:payload
//!     ▼
//! StorageManager::write(C::DATABASE, workspace, C::SUB_DATABASE)
//!     │ WriteScope::put(key, envelope)
//!     ▼
//! commit (or abort on error)
//! ```

mod base;
pub mod keys;
mod nonblocking;
pub mod specification;

pub use base::{Collection, Repository};
pub use nonblocking::AsyncRepository;
pub use specification::{
    filter, spec_fn, AllOf, AndSpecification, AnyOf, BoxedSpecification, FieldEquals,
    NotSpecification, OrSpecification, PredicateSpecification, Specification, SpecificationExt,
};
