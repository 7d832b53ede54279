// Strongly-typed record model handed to the renderer. No population
// counters here: only names, types and per-field expression decisions.
use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use indexmap::IndexSet;
use serde::Serialize;

use crate::raw::{Literal, ScalarKind, SeqKind};

// ——— TYPES ———

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    Any,
    Scalar(ScalarKind),
    /// `elements` is a set for list/set and positional for tuple.
    Sequence { kind: SeqKind, elements: Vec<TypeTag> },
    Map { key: Box<TypeTag>, values: Vec<TypeTag> },
    Union(Vec<TypeTag>),
    Record(RecordRef),
}

/// A use of a record type. The definition rides along only at the first use
/// site; every later use is a bare reference by name.
#[derive(Debug, Clone, Serialize)]
pub struct RecordRef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<Box<Record>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub source_key: String,
    pub attribute: String,
    pub types: Vec<TypeTag>,     // first-observed order, never contains None
    pub nullable: bool,          // null observed or declared
    pub allow_missing: bool,     // absent from some merged instance
    pub default: Option<Literal>,
    pub serializer: Option<String>,
    pub expression: Expression,
}

/// Right-hand side of a field line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Bare(Literal),
    Field { default: DefaultExpr, metadata: Option<FieldMetadata> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultExpr {
    Value(Literal),
    /// Zero-argument constructor of the field's primary type.
    Factory(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldMetadata {
    pub missing: Option<DefaultExpr>,
    pub data_key: Option<String>,
    pub serializer: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Import {
    Any,
    Dict,
    List,
    Optional,
    Set,
    Tuple,
    Union,
}

impl Import {
    pub fn name(self) -> &'static str {
        match self {
            Import::Any => "Any",
            Import::Dict => "Dict",
            Import::List => "List",
            Import::Optional => "Optional",
            Import::Set => "Set",
            Import::Tuple => "Tuple",
            Import::Union => "Union",
        }
    }
}

/// Everything one generation run produced.
#[derive(Debug, Clone, Serialize)]
pub struct Model {
    pub root: Record,
    pub imports: BTreeSet<Import>,
    pub serializers: IndexSet<String>,
    pub preamble: Option<String>,
    pub class_body: Option<String>,
}

// ——— EQUALITY ———
// Structural for scalars/sequences/maps, by name for records.

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        use TypeTag::*;
        match (self, other) {
            (Any, Any) => true,
            (Scalar(a), Scalar(b)) => a == b,
            (Sequence { kind: ka, elements: ea }, Sequence { kind: kb, elements: eb }) => {
                ka == kb
                    && match ka {
                        SeqKind::Tuple => ea == eb,
                        SeqKind::List | SeqKind::Set => same_members(ea, eb),
                    }
            }
            (Map { key: ka, values: va }, Map { key: kb, values: vb }) => ka == kb && same_members(va, vb),
            (Union(a), Union(b)) => same_members(a, b),
            (Record(a), Record(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            TypeTag::Any => {}
            TypeTag::Scalar(kind) => kind.hash(state),
            TypeTag::Sequence { kind, elements } => {
                kind.hash(state);
                match kind {
                    SeqKind::Tuple => elements.hash(state),
                    SeqKind::List | SeqKind::Set => unordered_hash(elements).hash(state),
                }
            }
            TypeTag::Map { key, values } => {
                key.hash(state);
                unordered_hash(values).hash(state);
            }
            TypeTag::Union(members) => unordered_hash(members).hash(state),
            TypeTag::Record(r) => r.hash(state),
        }
    }
}

impl PartialEq for RecordRef {
    fn eq(&self, other: &Self) -> bool { self.name == other.name }
}

impl Eq for RecordRef {}

impl Hash for RecordRef {
    fn hash<H: Hasher>(&self, state: &mut H) { self.name.hash(state) }
}

fn same_members(a: &[TypeTag], b: &[TypeTag]) -> bool {
    a.iter().all(|x| b.contains(x)) && b.iter().all(|y| a.contains(y))
}

fn unordered_hash(members: &[TypeTag]) -> Vec<u64> {
    let mut hashes: Vec<u64> = members
        .iter()
        .map(|m| {
            let mut h = DefaultHasher::new();
            m.hash(&mut h);
            h.finish()
        })
        .collect();
    hashes.sort_unstable();
    hashes.dedup();
    hashes
}

// ——— UTILITIES ———

impl TypeTag {
    pub const NONE: TypeTag = TypeTag::Scalar(ScalarKind::None);

    /// Any for nothing, the member itself for one, a union otherwise.
    pub fn union(mut members: Vec<TypeTag>) -> TypeTag {
        match members.len() {
            0 => TypeTag::Any,
            1 => members.remove(0),
            _ => TypeTag::Union(members),
        }
    }

    pub fn is_none(&self) -> bool { matches!(self, TypeTag::Scalar(ScalarKind::None)) }

    /// Name of the zero-argument constructor for this type; `None` for types
    /// with no natural zero value (`Any`, `None`, unions).
    pub fn constructor_name(&self) -> Option<String> {
        match self {
            TypeTag::Scalar(ScalarKind::None) | TypeTag::Any | TypeTag::Union(_) => None,
            TypeTag::Scalar(kind) => Some(kind.name().to_string()),
            TypeTag::Sequence { kind, .. } => Some(kind.name().to_string()),
            TypeTag::Map { .. } => Some("dict".to_string()),
            TypeTag::Record(r) => Some(r.name.clone()),
        }
    }

    /// Typing names this tag needs, not descending into record definitions.
    pub fn collect_imports(&self, out: &mut BTreeSet<Import>) {
        match self {
            TypeTag::Any => {
                out.insert(Import::Any);
            }
            TypeTag::Scalar(_) | TypeTag::Record(_) => {}
            TypeTag::Sequence { kind, elements } => {
                out.insert(match kind {
                    SeqKind::List => Import::List,
                    SeqKind::Set => Import::Set,
                    SeqKind::Tuple => Import::Tuple,
                });
                match kind {
                    SeqKind::Tuple => elements.iter().for_each(|e| e.collect_imports(out)),
                    SeqKind::List | SeqKind::Set => collect_union_imports(elements, out),
                }
            }
            TypeTag::Map { key, values } => {
                out.insert(Import::Dict);
                key.collect_imports(out);
                collect_union_imports(values, out);
            }
            TypeTag::Union(members) => collect_union_imports(members, out),
        }
    }
}

/// Imports for a set of alternatives rendered as one type (None folded into Optional).
pub fn collect_union_imports(members: &[TypeTag], out: &mut BTreeSet<Import>) {
    let rest: Vec<&TypeTag> = members.iter().filter(|t| !t.is_none()).collect();
    let has_none = rest.len() != members.len();
    match rest.len() {
        0 if has_none => {}
        0 => {
            out.insert(Import::Any);
        }
        1 => rest[0].collect_imports(out),
        _ => {
            out.insert(Import::Union);
            rest.iter().for_each(|t| t.collect_imports(out));
        }
    }
    if has_none && !rest.is_empty() {
        out.insert(Import::Optional);
    }
}

/// Append `t` unless an equal tag is already present.
pub fn push_unique(members: &mut Vec<TypeTag>, t: TypeTag) {
    if !members.contains(&t) {
        members.push(t);
    }
}

impl Field {
    /// `types` may contain `None`; it is stripped and folded into `nullable`.
    pub fn new(source_key: impl Into<String>, attribute: impl Into<String>, types: Vec<TypeTag>) -> Self {
        let mut nullable = false;
        let mut kept = Vec::with_capacity(types.len());
        for t in types {
            if t.is_none() {
                nullable = true;
            } else {
                push_unique(&mut kept, t);
            }
        }
        Field {
            source_key: source_key.into(),
            attribute: attribute.into(),
            types: kept,
            nullable,
            allow_missing: false,
            default: None,
            serializer: None,
            expression: Expression::Bare(Literal::None),
        }
    }

    pub fn is_optional(&self) -> bool { self.nullable || self.allow_missing }

    /// First observed non-None type.
    pub fn primary_type(&self) -> Option<&TypeTag> { self.types.first() }

    pub fn collect_imports(&self, out: &mut BTreeSet<Import>) {
        match self.types.as_slice() {
            [] => {
                out.insert(Import::Any);
            }
            [only] => only.collect_imports(out),
            many => {
                out.insert(Import::Union);
                many.iter().for_each(|t| t.collect_imports(out));
            }
        }
        if self.nullable && !self.types.is_empty() {
            out.insert(Import::Optional);
        }
    }
}

// ——— TESTS ———
