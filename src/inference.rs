//! Sibling-merging inference engine.
//!
//! Example documents are folded into a `Population`: a bounded set of arms,
//! at most one per kind (each scalar kind, list, set, tuple-of-arity-n,
//! associative map, record), plus a nullable bit. Observing a value yields a
//! one-arm population; `join` merges populations arm by arm, so repeated
//! instances of one logical record collapse into a single `ResultSet` whose
//! entries carry the union of observed types.
//!
//! Design goals:
//! - Detection runs top-down on every mapping before it is folded, so an
//!   associative mapping never contributes field names.
//! - Join is associative/commutative/idempotent on type content; the only
//!   order-sensitive output is arm order (first observed), which fixes union
//!   order downstream.
//! - Nothing here names types; that is `lower`'s job.
pub mod detect;
pub mod obj;
pub mod seq;

use indexmap::IndexMap;

use crate::raw::{RawValue, ScalarKind, SeqKind};

pub use detect::{detect, DetectorPolicy};
pub use obj::{Entry, ResultSet};
pub use seq::{Columns, Items, MapC};

// ------------------------------ State ------------------------------------- //

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Population {
    pub nullable: bool,
    pub arms: IndexMap<ArmKey, Arm>,
}

/// One arm per key; the key fixes which `Arm` variant lives under it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArmKey {
    Scalar(ScalarKind),
    List,
    Set,
    Tuple(usize),
    Map,
    Record,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Arm {
    Scalar,
    Items(Items),
    Columns(Columns),
    Map(MapC),
    Record(ResultSet),
}

impl ArmKey {
    pub fn name(&self) -> &'static str {
        match self {
            ArmKey::Scalar(kind) => kind.name(),
            ArmKey::List => "list",
            ArmKey::Set => "set",
            ArmKey::Tuple(_) => "tuple",
            ArmKey::Map => "dict",
            ArmKey::Record => "record",
        }
    }
}

impl Population {
    pub fn empty() -> Self { Self::default() }

    pub fn is_bottom(&self) -> bool { !self.nullable && self.arms.is_empty() }

    fn single(key: ArmKey, arm: Arm) -> Self {
        let mut arms = IndexMap::with_capacity(1);
        arms.insert(key, arm);
        Population { nullable: false, arms }
    }

    /// Merged record arm, if any mapping was observed here.
    pub fn record(&self) -> Option<&ResultSet> {
        match self.arms.get(&ArmKey::Record) {
            Some(Arm::Record(rs)) => Some(rs),
            _ => None,
        }
    }

    /// Arm names in first-observed order (`None` excluded).
    pub fn kinds(&self) -> Vec<&'static str> {
        self.arms.keys().map(ArmKey::name).collect()
    }
}

// ------------------------------ Observe ----------------------------------- //

impl Population {
    pub fn observe(v: &RawValue, policy: &DetectorPolicy) -> Self {
        match v {
            RawValue::Scalar(lit) => match lit.kind() {
                ScalarKind::None => Population { nullable: true, ..Population::default() },
                kind => Population::single(ArmKey::Scalar(kind), Arm::Scalar),
            },
            RawValue::Sequence(SeqKind::List, xs) => {
                Population::single(ArmKey::List, Arm::Items(Items::observe(xs, policy)))
            }
            RawValue::Sequence(SeqKind::Set, xs) => {
                Population::single(ArmKey::Set, Arm::Items(Items::observe(xs, policy)))
            }
            RawValue::Sequence(SeqKind::Tuple, xs) => Population::single(
                ArmKey::Tuple(xs.len()),
                Arm::Columns(Columns::observe(xs, policy)),
            ),
            RawValue::Mapping(m) if detect(m, policy) => {
                Population::single(ArmKey::Map, Arm::Map(MapC::observe(m, policy)))
            }
            RawValue::Mapping(m) => {
                Population::single(ArmKey::Record, Arm::Record(ResultSet::observe(m, policy)))
            }
        }
    }

    pub fn observe_all<'a, I>(values: I, policy: &DetectorPolicy) -> Self
    where
        I: IntoIterator<Item = &'a RawValue>,
    {
        let mut out = Population::empty();
        for v in values {
            out.absorb(Population::observe(v, policy));
        }
        out
    }
}

// ------------------------------ Join (⊔) ---------------------------------- //

impl Population {
    pub fn join(a: &Self, b: &Self) -> Self {
        let mut out = a.clone();
        out.absorb(b.clone());
        out
    }

    /// In-place join; arms new to `self` are appended, keeping first-observed order.
    pub fn absorb(&mut self, other: Population) {
        self.nullable |= other.nullable;
        for (key, arm) in other.arms {
            match self.arms.get_mut(&key) {
                Some(mine) => mine.absorb(arm),
                None => {
                    self.arms.insert(key, arm);
                }
            }
        }
    }
}

impl Arm {
    fn absorb(&mut self, other: Arm) {
        match (self, other) {
            (Arm::Scalar, Arm::Scalar) => {}
            (Arm::Items(a), Arm::Items(b)) => a.absorb(b),
            (Arm::Columns(a), Arm::Columns(b)) => a.absorb(b),
            (Arm::Map(a), Arm::Map(b)) => a.absorb(b),
            (Arm::Record(a), Arm::Record(b)) => a.absorb(b),
            // arm keys fix the variant, so mixed pairs never meet
            _ => {}
        }
    }
}

// ------------------------------- Reduce ----------------------------------- //

/// Outcome of reducing a sibling list: the consolidated record plus every
/// sibling that is not part of it, in input order.
#[derive(Clone, Debug, PartialEq)]
pub struct Reduced<'a> {
    pub record: ResultSet,
    pub remainder: Vec<&'a RawValue>,
}

/// Collapse the non-associative mappings among `siblings` into one
/// `ResultSet`. Total over any input: no mappings gives an empty set.
pub fn reduce<'a>(siblings: &'a [RawValue], policy: &DetectorPolicy) -> Reduced<'a> {
    let mut record = ResultSet::empty();
    let mut remainder = Vec::new();
    for v in siblings {
        match v {
            RawValue::Mapping(m) if !detect(m, policy) => record.absorb(ResultSet::observe(m, policy)),
            other => remainder.push(other),
        }
    }
    Reduced { record, remainder }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_list(v: serde_json::Value) -> Vec<RawValue> {
        match RawValue::from(v) {
            RawValue::Sequence(_, xs) => xs,
            other => vec![other],
        }
    }

    /// (key, kinds, optional) per field, sorted; the type content of a record.
    fn summary(rs: &ResultSet) -> Vec<(String, Vec<&'static str>, bool)> {
        let mut out: Vec<_> = rs
            .entries
            .iter()
            .map(|(k, e)| {
                let mut kinds = e.population.kinds();
                kinds.sort_unstable();
                (k.to_string(), kinds, e.is_optional(rs.instances))
            })
            .collect();
        out.sort();
        out
    }

    #[test]
    fn siblings_merge_into_one_record() {
        let xs = raw_list(json!([
            {"hello": 1},
            {"hello": "one", "world": "two"},
            {"hello": 3, "world": null}
        ]));
        let reduced = reduce(&xs, &DetectorPolicy::default());
        let rs = reduced.record;
        assert!(reduced.remainder.is_empty());
        assert_eq!(rs.instances, 3);

        let hello = rs.entry("hello").unwrap();
        assert_eq!(hello.population.kinds(), ["int", "str"]);
        assert!(!hello.is_optional(rs.instances));

        // absent once, null once: both fold into optionality
        let world = rs.entry("world").unwrap();
        assert_eq!(world.population.kinds(), ["str"]);
        assert!(world.population.nullable);
        assert_eq!(world.present_in, 2);
        assert!(world.is_optional(rs.instances));
    }

    #[test]
    fn absent_key_is_optional_without_null() {
        let xs = raw_list(json!([{"a": "x", "b": "y"}, {"a": "z"}]));
        let rs = reduce(&xs, &DetectorPolicy::default()).record;
        let b = rs.entry("b").unwrap();
        assert_eq!(b.population.kinds(), ["str"]);
        assert!(!b.population.nullable);
        assert!(b.is_optional(rs.instances));
        assert!(!rs.entry("a").unwrap().is_optional(rs.instances));
    }

    #[test]
    fn non_mapping_siblings_pass_through() {
        let xs = raw_list(json!([1, {"a": 1}, "two", {"b": 2}]));
        let reduced = reduce(&xs, &DetectorPolicy::default());
        assert_eq!(reduced.remainder.len(), 2);
        assert_eq!(reduced.remainder[0].kind_name(), "int");
        assert_eq!(reduced.remainder[1].kind_name(), "str");
        assert_eq!(reduced.record.entries.len(), 2);
    }

    #[test]
    fn empty_sibling_list_reduces_to_empty_set() {
        let reduced = reduce(&[], &DetectorPolicy::default());
        assert_eq!(reduced.record.instances, 0);
        assert!(reduced.record.entries.is_empty());
    }

    #[test]
    fn reduction_is_idempotent_on_type_content() {
        let xs = raw_list(json!([
            {"a": 1, "b": [1, "x"]},
            {"a": "s", "c": {"d": null}},
        ]));
        let once = reduce(&xs, &DetectorPolicy::default()).record;
        let twice = ResultSet::join(&once, &once);
        assert_eq!(summary(&once), summary(&twice));
    }

    #[test]
    fn union_is_independent_of_partition() {
        let policy = DetectorPolicy::default();
        let xs = raw_list(json!([
            {"a": 1, "b": "x"},
            {"a": "one", "c": true},
            {"b": null, "c": 2.5, "d": [1]},
        ]));
        let ab = reduce(&xs[..2], &policy).record;
        let c = reduce(&xs[2..], &policy).record;
        let a = reduce(&xs[..1], &policy).record;
        let bc = reduce(&xs[1..], &policy).record;

        let left = ResultSet::join(&ab, &c);
        let right = ResultSet::join(&a, &bc);
        assert_eq!(summary(&left), summary(&right));
        assert_eq!(summary(&left), summary(&reduce(&xs, &policy).record));
    }

    #[test]
    fn join_laws_on_populations() {
        let policy = DetectorPolicy::default();
        let a = Population::observe(&RawValue::from(json!([1, "a"])), &policy);
        let b = Population::observe(&RawValue::from(json!({"k": 2})), &policy);
        let c = Population::observe(&RawValue::from(json!(null)), &policy);

        // commutative (IndexMap equality ignores order)
        assert_eq!(Population::join(&a, &b), Population::join(&b, &a));
        // associative
        assert_eq!(
            Population::join(&Population::join(&a, &b), &c),
            Population::join(&a, &Population::join(&b, &c)),
        );
        // bottom is the identity
        assert_eq!(Population::join(&a, &Population::empty()), a);
    }

    #[test]
    fn nested_records_in_lists_merge_across_instances() {
        let xs = raw_list(json!([
            {"items": [{"id": 1}]},
            {"items": [{"id": 2, "label": "x"}, {"id": 3}]},
        ]));
        let rs = reduce(&xs, &DetectorPolicy::default()).record;
        let items = rs.entry("items").unwrap();
        let Some(Arm::Items(list)) = items.population.arms.get(&ArmKey::List) else {
            panic!("expected a list arm");
        };
        let inner = list.items.record().unwrap();
        assert_eq!(inner.instances, 3);
        assert!(inner.entry("label").unwrap().is_optional(inner.instances));
        assert!(!inner.entry("id").unwrap().is_optional(inner.instances));
    }

    #[test]
    fn associative_values_are_pooled_not_named() {
        let policy = DetectorPolicy::default().with_min_size(3);
        let doc = RawValue::from(json!({
            "groups": {
                "g00": {"name": "a"},
                "g01": {"name": "b", "size": 2},
                "g02": {"name": "c"}
            }
        }));
        let rs = ResultSet::observe(doc.as_mapping().unwrap(), &policy);
        let groups = rs.entry("groups").unwrap();
        assert_eq!(groups.population.kinds(), ["dict"]);
        let Some(Arm::Map(map)) = groups.population.arms.get(&ArmKey::Map) else {
            panic!("expected a map arm");
        };
        let values = map.values.record().unwrap();
        assert_eq!(values.instances, 3);
        assert!(values.entry("g00").is_none());
        assert!(values.entry("size").unwrap().is_optional(values.instances));
    }
}
