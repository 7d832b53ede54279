//! Input tree handed to the inference pipeline.
//!
//! One closed tagged union for every shape an example document can take, built
//! once from whatever the front end parsed (JSON or YAML) and never mutated.
use std::fmt;

use base64::Engine;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use ordered_float::OrderedFloat;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{InferenceError, Result};

// ------------------------------- Scalars ---------------------------------- //

/// Runtime type of a scalar, named the way the generated code spells it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ScalarKind {
    None,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
}

impl ScalarKind {
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::None => "None",
            ScalarKind::Bool => "bool",
            ScalarKind::Int => "int",
            ScalarKind::Float => "float",
            ScalarKind::Str => "str",
            ScalarKind::Bytes => "bytes",
        }
    }
}

/// A hashable scalar value. Floats go through `OrderedFloat` so literals can be
/// compared and used as defaults.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(String),
    Bytes(Vec<u8>),
}

impl Literal {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Literal::None => ScalarKind::None,
            Literal::Bool(_) => ScalarKind::Bool,
            Literal::Int(_) => ScalarKind::Int,
            Literal::Float(_) => ScalarKind::Float,
            Literal::Str(_) => ScalarKind::Str,
            Literal::Bytes(_) => ScalarKind::Bytes,
        }
    }
}

// ------------------------------- Keys ------------------------------------- //

/// Mapping key. YAML allows integer keys, which feed the "all keys are
/// integers" associative rule.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{i}"),
            Key::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self { Key::Str(s.to_string()) }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self { Key::Int(i) }
}

// ------------------------------- Tree ------------------------------------- //

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeqKind {
    List,
    Set,
    Tuple,
}

impl SeqKind {
    pub fn name(self) -> &'static str {
        match self {
            SeqKind::List => "list",
            SeqKind::Set => "set",
            SeqKind::Tuple => "tuple",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(from = "serde_json::Value")]
pub enum RawValue {
    Scalar(Literal),
    Sequence(SeqKind, Vec<RawValue>),
    Mapping(IndexMap<Key, RawValue>),
}

impl RawValue {
    pub fn null() -> Self { RawValue::Scalar(Literal::None) }

    pub fn list(items: Vec<RawValue>) -> Self { RawValue::Sequence(SeqKind::List, items) }

    pub fn as_mapping(&self) -> Option<&IndexMap<Key, RawValue>> {
        match self {
            RawValue::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// Coarse runtime kind, used where values only need to be told apart
    /// (the strict detector's same-value-kind check).
    pub fn kind_name(&self) -> &'static str {
        match self {
            RawValue::Scalar(lit) => lit.kind().name(),
            RawValue::Sequence(kind, _) => kind.name(),
            RawValue::Mapping(_) => "dict",
        }
    }

    /// Parse a JSON document.
    pub fn from_json_str(src: &str) -> Result<Self> {
        let value = serde_json::from_str::<serde_json::Value>(src)
            .map_err(|error| InferenceError::malformed(format!("invalid JSON: {error}")))?;
        Ok(RawValue::from(value))
    }

    /// Parse a YAML document.
    pub fn from_yaml_str(src: &str) -> Result<Self> {
        let src = CORE_TAGS.replace_all(src, "${1}!${2}");
        let value = serde_yaml::from_str::<serde_yaml::Value>(&src)
            .map_err(|error| InferenceError::malformed(format!("invalid YAML: {error}")))?;
        RawValue::try_from(value)
    }
}

// ------------------------------- JSON ------------------------------------- //

impl From<serde_json::Value> for RawValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => RawValue::null(),
            Value::Bool(b) => RawValue::Scalar(Literal::Bool(b)),
            Value::Number(n) => {
                // integers that do not fit i64 degrade to float
                if let Some(i) = n.as_i64() {
                    RawValue::Scalar(Literal::Int(i))
                } else {
                    RawValue::Scalar(Literal::Float(OrderedFloat(n.as_f64().unwrap_or(f64::NAN))))
                }
            }
            Value::String(s) => RawValue::Scalar(Literal::Str(s)),
            Value::Array(xs) => RawValue::list(xs.into_iter().map(RawValue::from).collect()),
            Value::Object(map) => RawValue::Mapping(
                map.into_iter().map(|(k, v)| (Key::Str(k), RawValue::from(v))).collect(),
            ),
        }
    }
}

impl From<&serde_json::Value> for RawValue {
    fn from(value: &serde_json::Value) -> Self { RawValue::from(value.clone()) }
}

// ------------------------------- YAML ------------------------------------- //

impl TryFrom<serde_yaml::Value> for RawValue {
    type Error = InferenceError;

    fn try_from(value: serde_yaml::Value) -> Result<Self> {
        use serde_yaml::Value;
        match value {
            Value::Null => Ok(RawValue::null()),
            Value::Bool(b) => Ok(RawValue::Scalar(Literal::Bool(b))),
            Value::Number(n) => Ok(RawValue::Scalar(yaml_number(&n))),
            Value::String(s) => Ok(RawValue::Scalar(Literal::Str(s))),
            Value::Sequence(xs) => Ok(RawValue::list(
                xs.into_iter().map(RawValue::try_from).collect::<Result<Vec<_>>>()?,
            )),
            Value::Mapping(map) => {
                let mut out = IndexMap::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(yaml_key(k)?, RawValue::try_from(v)?);
                }
                Ok(RawValue::Mapping(out))
            }
            Value::Tagged(tagged) => yaml_tagged(*tagged),
        }
    }
}

fn yaml_number(n: &serde_yaml::Number) -> Literal {
    if let Some(i) = n.as_i64() {
        Literal::Int(i)
    } else {
        Literal::Float(OrderedFloat(n.as_f64().unwrap_or(f64::NAN)))
    }
}

fn yaml_key(key: serde_yaml::Value) -> Result<Key> {
    use serde_yaml::Value;
    match key {
        Value::String(s) => Ok(Key::Str(s)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Key::Int(i)),
            None => Err(InferenceError::malformed(format!("unsupported numeric mapping key `{n}`"))),
        },
        other => Err(InferenceError::malformed(format!(
            "unsupported mapping key `{}`",
            serde_yaml::to_string(&other).unwrap_or_default().trim()
        ))),
    }
}

/// `!!set` and `!!binary` resolve to plain maps and strings in the YAML
/// parser; spelled as local tags they reach `yaml_tagged` intact. Only string
/// contents can be touched by the rewrite, and those never affect inference.
static CORE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)(^|[\s:,\[{?-])!!(binary|set)\b").unwrap());

fn yaml_tagged(tagged: serde_yaml::value::TaggedValue) -> Result<RawValue> {
    use serde_yaml::Value;
    let tag = tagged.tag.to_string();
    // `!tuple`, `!!set` and `tag:yaml.org,2002:set` all name the same thing
    let name = tag.rsplit(['!', ':']).next().unwrap_or_default();
    match (name, tagged.value) {
        ("set", Value::Sequence(xs)) => Ok(RawValue::Sequence(
            SeqKind::Set,
            xs.into_iter().map(RawValue::try_from).collect::<Result<Vec<_>>>()?,
        )),
        // canonical YAML sets are mappings with null values
        ("set", Value::Mapping(map)) => Ok(RawValue::Sequence(
            SeqKind::Set,
            map.into_iter()
                .map(|(k, _)| RawValue::try_from(k))
                .collect::<Result<Vec<_>>>()?,
        )),
        ("tuple", Value::Sequence(xs)) => Ok(RawValue::Sequence(
            SeqKind::Tuple,
            xs.into_iter().map(RawValue::try_from).collect::<Result<Vec<_>>>()?,
        )),
        ("binary", Value::String(s)) => {
            let compact: String = s.split_whitespace().collect();
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(compact)
                .map_err(|error| InferenceError::malformed(format!("invalid !!binary scalar: {error}")))?;
            Ok(RawValue::Scalar(Literal::Bytes(bytes)))
        }
        (_, _) => Err(InferenceError::malformed(format!("unsupported YAML tag `{tag}`"))),
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_objects_keep_key_order() {
        let raw = RawValue::from(json!({"zeta": 1, "alpha": "a", "mid": null}));
        let keys: Vec<String> = raw.as_mapping().unwrap().keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn json_numbers_split_int_and_float() {
        let raw = RawValue::from(json!([1, 1.5, 18446744073709551615u64]));
        let RawValue::Sequence(SeqKind::List, xs) = raw else { panic!("expected list") };
        assert_eq!(xs[0], RawValue::Scalar(Literal::Int(1)));
        assert_eq!(xs[1].kind_name(), "float");
        assert_eq!(xs[2].kind_name(), "float");
    }

    #[test]
    fn yaml_integer_keys_and_tags() {
        let src = "
counts:
  1: one
  2: two
pair: !tuple [a, 1]
tags: !set [x, y]
";
        let raw = RawValue::from_yaml_str(src).unwrap();
        let root = raw.as_mapping().unwrap();
        let counts = root[&Key::from("counts")].as_mapping().unwrap();
        assert!(counts.keys().all(|k| matches!(k, Key::Int(_))));
        assert!(matches!(root[&Key::from("pair")], RawValue::Sequence(SeqKind::Tuple, ref xs) if xs.len() == 2));
        assert!(matches!(root[&Key::from("tags")], RawValue::Sequence(SeqKind::Set, ref xs) if xs.len() == 2));
    }

    #[test]
    fn yaml_core_set_and_binary_tags() {
        let src = "b: !!binary aGVsbG8=\ns: !!set {a: null, b: null}\nl: !!set [x]\nsettings: '!!settle'\n";
        let raw = RawValue::from_yaml_str(src).unwrap();
        let root = raw.as_mapping().unwrap();
        assert_eq!(root[&Key::from("b")], RawValue::Scalar(Literal::Bytes(b"hello".to_vec())));
        let RawValue::Sequence(SeqKind::Set, members) = &root[&Key::from("s")] else { panic!("expected set") };
        assert_eq!(members, &[RawValue::Scalar(Literal::Str("a".into())), RawValue::Scalar(Literal::Str("b".into()))]);
        assert!(matches!(root[&Key::from("l")], RawValue::Sequence(SeqKind::Set, ref xs) if xs.len() == 1));
        assert_eq!(root[&Key::from("settings")], RawValue::Scalar(Literal::Str("!!settle".into())));

        let err = RawValue::from_yaml_str("b: !!binary not*base64").unwrap_err();
        assert!(matches!(err, InferenceError::MalformedInput { .. }));
    }

    #[test]
    fn yaml_rejects_unknown_tags_and_composite_keys() {
        let err = RawValue::from_yaml_str("a: !color red").unwrap_err();
        assert!(matches!(err, InferenceError::MalformedInput { .. }));

        let err = RawValue::from_yaml_str("? [a, b]\n: 1").unwrap_err();
        assert!(matches!(err, InferenceError::MalformedInput { .. }));
    }

    #[test]
    fn malformed_json_is_reported_before_inference() {
        let err = RawValue::from_json_str("{\"a\": ").unwrap_err();
        assert!(err.to_string().starts_with("malformed input"));
    }
}
