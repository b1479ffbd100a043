//! Query tests
//!
//! These tests verify:
//! - Field queries match on stored field values, including value objects
//! - Specification results follow boolean algebra over repository contents
//! - Specification queries never leave the repository's workspace

use atlas_persist::repository::{spec_fn, AllOf, AnyOf, BoxedSpecification};
use atlas_persist::{FieldValue, Specification, SpecificationExt};

use crate::common::*;
use crate::repository;

// =============================================================================
// Helper Functions
// =============================================================================

fn seed_widgets(repo: &atlas_persist::Repository<Widgets>) {
    let widgets = vec![
        Widget::new("w1", "bolt", 5).tagged("metal"),
        Widget::new("w2", "nut", 2).tagged("metal"),
        Widget::new("w3", "washer", 1),
        Widget::new("w4", "gear", 40).tagged("metal").tagged("heavy"),
        Widget::new("w5", "spring", 8),
    ];
    repo.batch_save(&widgets).unwrap();
}

fn ids(widgets: Vec<Widget>) -> Vec<String> {
    widgets.into_iter().map(|w| w.id).collect()
}

fn cheap() -> impl Specification<Widget> + Send + Sync + 'static {
    spec_fn(|w: &Widget| w.price < 10)
}

fn metal() -> impl Specification<Widget> + Send + Sync + 'static {
    spec_fn(|w: &Widget| w.tags.iter().any(|t| t == "metal"))
}

// =============================================================================
// Field Queries
// =============================================================================

#[test]
fn test_find_by_field_value() {
    let (_temp, storage) = setup_temp_storage();
    let repo = repository::<Widgets>(&storage, "demo");
    seed_widgets(&repo);

    let found = repo.find_by_field_value("name", &FieldValue::text("gear")).unwrap();
    assert_eq!(ids(found), vec!["w4"]);

    let none = repo.find_by_field_value("name", &FieldValue::text("sprocket")).unwrap();
    assert!(none.is_empty());

    let missing_field = repo.find_by_field_value("colour", &FieldValue::text("red")).unwrap();
    assert!(missing_field.is_empty());
}

#[test]
fn test_find_by_typed_field() {
    let (_temp, storage) = setup_temp_storage();
    let repo = repository::<Widgets>(&storage, "demo");
    seed_widgets(&repo);
    repo.save(&Widget::new("w6", "bolt", 7)).unwrap();

    let bolts = repo.find_by_field("name", &"bolt".to_string()).unwrap();
    assert_eq!(ids(bolts), vec!["w1", "w6"]);

    let priced = repo.find_by_field("price", &40i64).unwrap();
    assert_eq!(ids(priced), vec!["w4"]);
}

#[test]
fn test_find_by_value_object_field() {
    let (_temp, storage) = setup_temp_storage();
    let repo = repository::<Invoices>(&storage, "acme");

    let mut small = sample_invoice();
    small.total = Money(100);
    let large = sample_invoice();
    repo.save(&small).unwrap();
    repo.save(&large).unwrap();

    let found = repo.find_by_field("total", &Money(100)).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, small.id);

    let found = repo
        .find_by_field("contact", &Email("billing@example.com".to_string()))
        .unwrap();
    assert_eq!(found.len(), 2);
}

#[test]
fn test_field_query_skips_undecodable_records() {
    let (_temp, storage) = setup_temp_storage();
    let repo = repository::<Widgets>(&storage, "demo");
    seed_widgets(&repo);
    storage
        .write("catalog", Some("demo"), "widgets", |scope| {
            scope.put("ws:demo:zz", b"garbage")
        })
        .unwrap();

    let found = repo.find_by_field_value("name", &FieldValue::text("nut")).unwrap();
    assert_eq!(ids(found), vec!["w2"]);
}

// =============================================================================
// Specification Queries
// =============================================================================

#[test]
fn test_find_by_specification() {
    let (_temp, storage) = setup_temp_storage();
    let repo = repository::<Widgets>(&storage, "demo");
    seed_widgets(&repo);

    assert_eq!(ids(repo.find_by_specification(&cheap()).unwrap()), vec!["w1", "w2", "w3", "w5"]);
    assert_eq!(ids(repo.find_by_specification(&metal()).unwrap()), vec!["w1", "w2", "w4"]);
}

#[test]
fn test_and_is_intersection() {
    let (_temp, storage) = setup_temp_storage();
    let repo = repository::<Widgets>(&storage, "demo");
    seed_widgets(&repo);

    let both = ids(repo.find_by_specification(&cheap().and(metal())).unwrap());
    let a = ids(repo.find_by_specification(&cheap()).unwrap());
    let b = ids(repo.find_by_specification(&metal()).unwrap());
    let expected: Vec<String> = a.into_iter().filter(|id| b.contains(id)).collect();

    assert_eq!(both, expected);
    assert_eq!(both, vec!["w1", "w2"]);
}

#[test]
fn test_or_is_union() {
    let (_temp, storage) = setup_temp_storage();
    let repo = repository::<Widgets>(&storage, "demo");
    seed_widgets(&repo);

    let either = ids(repo.find_by_specification(&cheap().or(metal())).unwrap());
    assert_eq!(either, vec!["w1", "w2", "w3", "w4", "w5"]);

    let heavy = spec_fn(|w: &Widget| w.tags.iter().any(|t| t == "heavy"));
    let washer = spec_fn(|w: &Widget| w.name == "washer");
    assert_eq!(ids(repo.find_by_specification(&heavy.or(washer)).unwrap()), vec!["w3", "w4"]);
}

#[test]
fn test_not_is_complement() {
    let (_temp, storage) = setup_temp_storage();
    let repo = repository::<Widgets>(&storage, "demo");
    seed_widgets(&repo);

    let not_cheap = ids(repo.find_by_specification(&cheap().not()).unwrap());
    assert_eq!(not_cheap, vec!["w4"]);

    let total = repo.count().unwrap();
    let cheap_count = repo.count_by_specification(&cheap()).unwrap();
    assert_eq!(not_cheap.len() + cheap_count, total);
}

#[test]
fn test_one_count_exists_by_specification() {
    let (_temp, storage) = setup_temp_storage();
    let repo = repository::<Widgets>(&storage, "demo");
    seed_widgets(&repo);

    let first_metal = repo.find_one_by_specification(&metal()).unwrap().unwrap();
    assert_eq!(first_metal.id, "w1");
    assert_eq!(repo.count_by_specification(&metal()).unwrap(), 3);
    assert!(repo.exists_by_specification(&metal()).unwrap());

    let nothing = spec_fn(|w: &Widget| w.price > 1_000);
    assert!(repo.find_one_by_specification(&nothing).unwrap().is_none());
    assert!(!repo.exists_by_specification(&nothing).unwrap());
}

#[test]
fn test_composite_specifications() {
    let (_temp, storage) = setup_temp_storage();
    let repo = repository::<Widgets>(&storage, "demo");
    seed_widgets(&repo);

    let all = AllOf::default().with(cheap()).with(metal());
    assert_eq!(ids(repo.find_by_specification(&all).unwrap()), vec!["w1", "w2"]);

    let any = AnyOf::default()
        .with(spec_fn(|w: &Widget| w.name == "gear"))
        .with(spec_fn(|w: &Widget| w.name == "spring"));
    assert_eq!(ids(repo.find_by_specification(&any).unwrap()), vec!["w4", "w5"]);

    // Empty conjunction keeps everything, empty disjunction nothing
    assert_eq!(repo.count_by_specification(&AllOf::<Widget>::default()).unwrap(), 5);
    assert_eq!(repo.count_by_specification(&AnyOf::<Widget>::default()).unwrap(), 0);
}

#[test]
fn test_boxed_specification_as_trait_object() {
    let (_temp, storage) = setup_temp_storage();
    let repo = repository::<Widgets>(&storage, "demo");
    seed_widgets(&repo);

    let specs: Vec<BoxedSpecification<Widget>> = vec![cheap().boxed(), metal().boxed()];
    let counts: Vec<usize> = specs
        .iter()
        .map(|spec| repo.count_by_specification(spec.as_ref()).unwrap())
        .collect();
    assert_eq!(counts, vec![4, 3]);
}

#[test]
fn test_specification_respects_workspace() {
    let (_temp, storage) = setup_temp_storage();
    let demo = repository::<Widgets>(&storage, "demo");
    let other = repository::<Widgets>(&storage, "other");
    seed_widgets(&demo);
    other.save(&Widget::new("x1", "bolt", 1).tagged("metal")).unwrap();

    assert_eq!(ids(other.find_by_specification(&metal()).unwrap()), vec!["x1"]);
    assert_eq!(demo.count_by_specification(&metal()).unwrap(), 3);
}
