//! Specification algebra
//!
//! A [`Specification`] is a predicate over entities. Specifications compose
//! into a tree with [`SpecificationExt::and`], [`SpecificationExt::or`] and
//! [`SpecificationExt::not`] and are evaluated in memory; nothing is pushed
//! down to storage.
//!
//! For any set `S`:
//! ```text
//! filter(S, p AND q) = filter(S, p) ∩ filter(S, q)
//! filter(S, p OR q)  = filter(S, p) ∪ filter(S, q)
//! filter(S, NOT p)   = S − filter(S, p)
//! ```

use std::fmt;
use std::sync::Arc;

use crate::serialization::{Document, FieldValue, Fields};

/// Predicate over candidates of type `T`
pub trait Specification<T: ?Sized> {
    fn is_satisfied_by(&self, candidate: &T) -> bool;
}

/// Combinators available on every specification
pub trait SpecificationExt<T: ?Sized>: Specification<T> + Sized {
    fn and<S: Specification<T>>(self, other: S) -> AndSpecification<Self, S> {
        AndSpecification::new(self, other)
    }

    fn or<S: Specification<T>>(self, other: S) -> OrSpecification<Self, S> {
        OrSpecification::new(self, other)
    }

    fn not(self) -> NotSpecification<Self> {
        NotSpecification::new(self)
    }

    /// Erase the concrete type, e.g. to collect into [`AllOf`]
    fn boxed(self) -> BoxedSpecification<T>
    where
        Self: Send + Sync + 'static,
    {
        Box::new(self)
    }
}

impl<T: ?Sized, S: Specification<T>> SpecificationExt<T> for S {}

pub type BoxedSpecification<T> = Box<dyn Specification<T> + Send + Sync>;

/// Keep the items satisfying `spec`, preserving order
pub fn filter<T, S>(items: impl IntoIterator<Item = T>, spec: &S) -> Vec<T>
where
    S: Specification<T> + ?Sized,
{
    items
        .into_iter()
        .filter(|item| spec.is_satisfied_by(item))
        .collect()
}

// =============================================================================
// Composites
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct AndSpecification<A, B> {
    left: A,
    right: B,
}

impl<A, B> AndSpecification<A, B> {
    pub fn new(left: A, right: B) -> Self {
        Self { left, right }
    }
}

impl<T: ?Sized, A: Specification<T>, B: Specification<T>> Specification<T>
    for AndSpecification<A, B>
{
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        self.left.is_satisfied_by(candidate) && self.right.is_satisfied_by(candidate)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OrSpecification<A, B> {
    left: A,
    right: B,
}

impl<A, B> OrSpecification<A, B> {
    pub fn new(left: A, right: B) -> Self {
        Self { left, right }
    }
}

impl<T: ?Sized, A: Specification<T>, B: Specification<T>> Specification<T>
    for OrSpecification<A, B>
{
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        self.left.is_satisfied_by(candidate) || self.right.is_satisfied_by(candidate)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NotSpecification<A> {
    inner: A,
}

impl<A> NotSpecification<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }
}

impl<T: ?Sized, A: Specification<T>> Specification<T> for NotSpecification<A> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        !self.inner.is_satisfied_by(candidate)
    }
}

/// Conjunction of any number of specifications; empty is always satisfied
pub struct AllOf<T: ?Sized> {
    specs: Vec<BoxedSpecification<T>>,
}

impl<T: ?Sized> AllOf<T> {
    pub fn new(specs: Vec<BoxedSpecification<T>>) -> Self {
        Self { specs }
    }

    pub fn with<S>(mut self, spec: S) -> Self
    where
        S: Specification<T> + Send + Sync + 'static,
    {
        self.specs.push(Box::new(spec));
        self
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl<T: ?Sized> Default for AllOf<T> {
    fn default() -> Self {
        Self { specs: Vec::new() }
    }
}

impl<T: ?Sized> Specification<T> for AllOf<T> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        self.specs.iter().all(|s| s.is_satisfied_by(candidate))
    }
}

/// Disjunction of any number of specifications; empty is never satisfied
pub struct AnyOf<T: ?Sized> {
    specs: Vec<BoxedSpecification<T>>,
}

impl<T: ?Sized> AnyOf<T> {
    pub fn new(specs: Vec<BoxedSpecification<T>>) -> Self {
        Self { specs }
    }

    pub fn with<S>(mut self, spec: S) -> Self
    where
        S: Specification<T> + Send + Sync + 'static,
    {
        self.specs.push(Box::new(spec));
        self
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl<T: ?Sized> Default for AnyOf<T> {
    fn default() -> Self {
        Self { specs: Vec::new() }
    }
}

impl<T: ?Sized> Specification<T> for AnyOf<T> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        self.specs.iter().any(|s| s.is_satisfied_by(candidate))
    }
}

// =============================================================================
// Leaves
// =============================================================================

/// Specification backed by a closure
#[derive(Clone, Copy)]
pub struct PredicateSpecification<F> {
    predicate: F,
}

impl<T: ?Sized, F: Fn(&T) -> bool> Specification<T> for PredicateSpecification<F> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        (self.predicate)(candidate)
    }
}

impl<F> fmt::Debug for PredicateSpecification<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PredicateSpecification")
    }
}

/// Wrap a closure as a specification
///
/// ```ignore
/// let expensive = spec_fn(|w: &Widget| w.price > 100);
/// ```
pub fn spec_fn<T: ?Sized, F: Fn(&T) -> bool>(predicate: F) -> PredicateSpecification<F> {
    PredicateSpecification { predicate }
}

/// Top-level field of a stored document equals a value
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEquals {
    field: String,
    expected: FieldValue,
}

impl FieldEquals {
    pub fn new(field: impl Into<String>, expected: FieldValue) -> Self {
        Self {
            field: field.into(),
            expected,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn expected(&self) -> &FieldValue {
        &self.expected
    }
}

impl Specification<Fields> for FieldEquals {
    fn is_satisfied_by(&self, candidate: &Fields) -> bool {
        candidate.get(&self.field) == Some(&self.expected)
    }
}

impl Specification<Document> for FieldEquals {
    fn is_satisfied_by(&self, candidate: &Document) -> bool {
        <Self as Specification<Fields>>::is_satisfied_by(self, &candidate.fields)
    }
}

// =============================================================================
// Pointer Impls
// =============================================================================

impl<T: ?Sized, S: Specification<T> + ?Sized> Specification<T> for &S {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        (**self).is_satisfied_by(candidate)
    }
}

impl<T: ?Sized, S: Specification<T> + ?Sized> Specification<T> for Box<S> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        (**self).is_satisfied_by(candidate)
    }
}

impl<T: ?Sized, S: Specification<T> + ?Sized> Specification<T> for Arc<S> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        (**self).is_satisfied_by(candidate)
    }
}
