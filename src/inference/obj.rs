use indexmap::IndexMap;

use super::{DetectorPolicy, Population};
use crate::raw::{Key, RawValue};

/// Consolidated view of every mapping folded into one logical record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultSet {
    pub instances: u64,
    pub entries: IndexMap<Key, Entry>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Entry {
    pub population: Population,
    pub present_in: u64, // instances that carried the key at all (null included)
}

impl Entry {
    /// Optional = seen null somewhere, or missing from some instance.
    pub fn is_optional(&self, instances: u64) -> bool {
        self.population.nullable || self.present_in < instances
    }
}

impl ResultSet {
    pub fn empty() -> Self { Self::default() }

    pub fn observe(m: &IndexMap<Key, RawValue>, policy: &DetectorPolicy) -> Self {
        let entries = m
            .iter()
            .map(|(k, v)| {
                let entry = Entry { population: Population::observe(v, policy), present_in: 1 };
                (k.clone(), entry)
            })
            .collect();
        ResultSet { instances: 1, entries }
    }

    pub fn entry(&self, key: &str) -> Option<&Entry> {
        self.entries.get(&Key::from(key))
    }

    pub fn join(a: &Self, b: &Self) -> Self {
        let mut out = a.clone();
        out.absorb(b.clone());
        out
    }

    /// Keys already present keep their position; new keys are appended.
    pub fn absorb(&mut self, other: ResultSet) {
        self.instances += other.instances;
        for (k, theirs) in other.entries {
            match self.entries.get_mut(&k) {
                Some(mine) => {
                    mine.population.absorb(theirs.population);
                    mine.present_in += theirs.present_in;
                }
                None => {
                    self.entries.insert(k, theirs);
                }
            }
        }
    }
}
