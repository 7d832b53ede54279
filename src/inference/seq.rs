use indexmap::{IndexMap, IndexSet};

use super::{DetectorPolicy, Population};
use crate::raw::{Key, RawValue, ScalarKind};

/// List or set: every element is pooled into one population.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Items {
    pub samples: u64,
    pub items: Population,
}

impl Items {
    pub fn observe(xs: &[RawValue], policy: &DetectorPolicy) -> Self {
        Items { samples: 1, items: Population::observe_all(xs, policy) }
    }

    pub(super) fn absorb(&mut self, other: Items) {
        self.samples += other.samples;
        self.items.absorb(other.items);
    }
}

/// Tuple of a fixed arity, merged column-wise.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Columns {
    pub samples: u64,
    pub cols: Vec<Population>,
}

impl Columns {
    pub fn observe(xs: &[RawValue], policy: &DetectorPolicy) -> Self {
        Columns {
            samples: 1,
            cols: xs.iter().map(|x| Population::observe(x, policy)).collect(),
        }
    }

    pub(super) fn absorb(&mut self, other: Columns) {
        self.samples += other.samples;
        // same arity is guaranteed by the arm key
        for (mine, theirs) in self.cols.iter_mut().zip(other.cols) {
            mine.absorb(theirs);
        }
    }
}

/// Associative mapping: keys are data, so only their kinds survive, and every
/// value lands in one shared population.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MapC {
    pub samples: u64,
    pub key_kinds: IndexSet<ScalarKind>,
    pub values: Population,
}

impl MapC {
    pub fn observe(m: &IndexMap<Key, RawValue>, policy: &DetectorPolicy) -> Self {
        let key_kinds = m
            .keys()
            .map(|k| match k {
                Key::Int(_) => ScalarKind::Int,
                Key::Str(_) => ScalarKind::Str,
            })
            .collect();
        MapC { samples: 1, key_kinds, values: Population::observe_all(m.values(), policy) }
    }

    pub(super) fn absorb(&mut self, other: MapC) {
        self.samples += other.samples;
        self.key_kinds.extend(other.key_kinds);
        self.values.absorb(other.values);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_elements_pool_in_first_seen_order() {
        let policy = DetectorPolicy::default();
        let RawValue::Sequence(_, xs) = RawValue::from(json!(["a", 1, null, "b", 2.0])) else {
            panic!("expected list");
        };
        let items = Items::observe(&xs, &policy);
        assert_eq!(items.items.kinds(), ["str", "int", "float"]);
        assert!(items.items.nullable);
    }

    #[test]
    fn tuple_columns_merge_positionally() {
        let policy = DetectorPolicy::default();
        let mut a = Columns::observe(&[RawValue::from(json!("x")), RawValue::from(json!(1))], &policy);
        let b = Columns::observe(&[RawValue::from(json!(true)), RawValue::from(json!(2))], &policy);
        a.absorb(b);
        assert_eq!(a.samples, 2);
        assert_eq!(a.cols[0].kinds(), ["str", "bool"]);
        assert_eq!(a.cols[1].kinds(), ["int"]);
    }
}
