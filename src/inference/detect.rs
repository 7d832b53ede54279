//! Associative-container detection.
//!
//! Decides whether a mapping is a lookup table (keys are data, values share a
//! shape) rather than a record (keys are field names). Pure and total.
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::raw::{Key, RawValue};

static TRAILING_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+$").unwrap());

static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
});

/// Knobs for `detect`. `loose()` is the default; `strict()` also insists the
/// values share a runtime kind and accepts maps from two keys up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorPolicy {
    pub min_size: usize,
    pub same_value_kind: bool,
}

impl DetectorPolicy {
    pub const DEFAULT_MIN_SIZE: usize = 10;

    pub fn loose() -> Self {
        DetectorPolicy { min_size: Self::DEFAULT_MIN_SIZE, same_value_kind: false }
    }

    pub fn strict() -> Self {
        DetectorPolicy { min_size: 2, same_value_kind: true }
    }

    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }
}

impl Default for DetectorPolicy {
    fn default() -> Self { Self::loose() }
}

pub fn detect(m: &IndexMap<Key, RawValue>, policy: &DetectorPolicy) -> bool {
    // a single key never makes a table, whatever the threshold says
    if m.len() < policy.min_size.max(2) {
        return false;
    }
    if policy.same_value_kind && !values_share_kind(m) {
        return false;
    }

    let keys: Vec<String> = m.keys().map(Key::to_string).collect();

    m.keys().all(|k| matches!(k, Key::Int(_)))
        || !common_prefix(&keys).is_empty()
        || keys.iter().all(|k| TRAILING_DIGITS.is_match(k))
        || keys.iter().all(|k| UUID.is_match(k))
}

fn values_share_kind(m: &IndexMap<Key, RawValue>) -> bool {
    let mut kinds = m.values().map(RawValue::kind_name);
    match kinds.next() {
        Some(first) => kinds.all(|k| k == first),
        None => true,
    }
}

/// Longest common character-wise prefix of all keys.
fn common_prefix(keys: &[String]) -> String {
    let Some((first, rest)) = keys.split_first() else { return String::new() };
    let mut len = first.len();
    for k in rest {
        len = first
            .char_indices()
            .zip(k.chars())
            .take_while(|((_, a), b)| a == b)
            .map(|((i, a), _)| i + a.len_utf8())
            .last()
            .unwrap_or(0)
            .min(len);
        if len == 0 {
            break;
        }
    }
    first[..len].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping(v: serde_json::Value) -> IndexMap<Key, RawValue> {
        match RawValue::from(v) {
            RawValue::Mapping(m) => m,
            _ => panic!("expected mapping"),
        }
    }

    fn numbered(n: usize, prefix: &str) -> IndexMap<Key, RawValue> {
        (0..n).map(|i| (Key::Str(format!("{prefix}{i}")), RawValue::from(json!(i)))).collect()
    }

    #[test]
    fn threshold_boundary() {
        let policy = DetectorPolicy::default();
        // shared prefix "key_" in both cases; only size differs
        assert!(!detect(&numbered(9, "key_"), &policy));
        assert!(detect(&numbered(10, "key_"), &policy));
    }

    #[test]
    fn digit_string_keys_at_the_threshold() {
        let policy = DetectorPolicy::default();
        // "0".."9" share no prefix; the trailing-digit rule decides
        assert!(common_prefix(&(0..10).map(|i| i.to_string()).collect::<Vec<_>>()).is_empty());
        assert!(!detect(&numbered(DetectorPolicy::DEFAULT_MIN_SIZE - 1, ""), &policy));
        assert!(detect(&numbered(DetectorPolicy::DEFAULT_MIN_SIZE, ""), &policy));

        let policy = DetectorPolicy::default().with_min_size(4);
        assert!(!detect(&numbered(3, ""), &policy));
        assert!(detect(&numbered(4, ""), &policy));
    }

    #[test]
    fn records_with_distinct_names_are_not_tables() {
        let policy = DetectorPolicy::default().with_min_size(2);
        let m = mapping(json!({"hello": 1, "world": 2, "name": "x"}));
        assert!(!detect(&m, &policy));
    }

    #[test]
    fn integer_keys() {
        let policy = DetectorPolicy::default().with_min_size(3);
        let m: IndexMap<Key, RawValue> =
            [(Key::Int(7), RawValue::null()), (Key::Int(1), RawValue::null()), (Key::Int(40), RawValue::null())]
                .into_iter()
                .collect();
        assert!(detect(&m, &policy));
    }

    #[test]
    fn trailing_digits_without_common_prefix() {
        let policy = DetectorPolicy::default().with_min_size(3);
        let m = mapping(json!({"a1": 1, "b22": 2, "c333": 3}));
        assert!(detect(&m, &policy));
    }

    #[test]
    fn uuid_keys() {
        let policy = DetectorPolicy::default().with_min_size(2);
        let m = mapping(json!({
            "0b7e2b6a-64c3-4cd5-9b7a-0d1f9e3c0a1b": {"n": 1},
            "F3A1C2D4-1111-4222-8333-94445555666f": {"n": 2},
        }));
        assert!(detect(&m, &policy));
    }

    #[test]
    fn single_key_is_never_a_table() {
        let policy = DetectorPolicy::default().with_min_size(0);
        assert!(!detect(&numbered(1, "x"), &policy));
    }

    #[test]
    fn strict_requires_same_value_kind() {
        let m = mapping(json!({"k1": 1, "k2": "two"}));
        assert!(!detect(&m, &DetectorPolicy::strict()));
        let m = mapping(json!({"k1": 1, "k2": 2}));
        assert!(detect(&m, &DetectorPolicy::strict()));
    }

    #[test]
    fn common_prefix_is_char_wise() {
        let keys = vec!["héllo".to_string(), "hélp".to_string()];
        assert_eq!(common_prefix(&keys), "hél");
        let keys = vec!["abc".to_string(), "xyz".to_string()];
        assert_eq!(common_prefix(&keys), "");
    }
}
