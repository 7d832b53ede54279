//! Record Model Builder: merged populations → named, deduplicated records.
//!
//! All run-scoped state (name registry, required imports, serializer names)
//! lives in a `GenerationContext` created per call, so independent runs never
//! share anything.
use std::collections::BTreeSet;

use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::annotate::{self, child_path, Annotation, WILDCARD};
use crate::config::Options;
use crate::error::{InferenceError, Result};
use crate::inference::{reduce, Arm, ArmKey, Entry, Population, ResultSet};
use crate::ir::{
    push_unique, DefaultExpr, Expression, Field, FieldMetadata, Import, Model, Record, RecordRef, TypeTag,
};
use crate::raw::{Key, Literal, RawValue, SeqKind};

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

// ------------------------------- Entry points ----------------------------- //

/// Build the model for one example document.
pub fn build_model(doc: &RawValue, options: &Options) -> Result<Model> {
    build_model_from_documents(std::slice::from_ref(doc), options)
}

/// Several documents are instances of the same root record.
pub fn build_model_from_documents(docs: &[RawValue], options: &Options) -> Result<Model> {
    let mut root = ResultSet::empty();
    for doc in docs {
        match doc {
            // the root is a record even when its keys look like table keys
            RawValue::Mapping(m) => root.absorb(ResultSet::observe(m, &options.detector)),
            RawValue::Sequence(_, xs) => {
                let reduced = reduce(xs, &options.detector);
                if reduced.record.instances == 0 {
                    return Err(InferenceError::malformed("top-level sequence contains no mapping"));
                }
                root.absorb(reduced.record);
            }
            RawValue::Scalar(_) => {
                return Err(InferenceError::malformed(format!(
                    "document root is a {}, expected a mapping or a sequence of mappings",
                    doc.kind_name()
                )));
            }
        }
    }
    GenerationContext::new(options).build(&root)
}

// ------------------------------- Context ---------------------------------- //

pub struct GenerationContext<'o> {
    options: &'o Options,
    registry: NameRegistry,
    imports: BTreeSet<Import>,
    serializers: IndexSet<String>,
}

impl<'o> GenerationContext<'o> {
    pub fn new(options: &'o Options) -> Self {
        GenerationContext {
            options,
            registry: NameRegistry::default(),
            imports: BTreeSet::new(),
            serializers: IndexSet::new(),
        }
    }

    pub fn build(mut self, root: &ResultSet) -> Result<Model> {
        let options = self.options;
        let root_ref = self.build_record(root, &options.root_name, "")?;
        let root = match root_ref.definition {
            Some(def) => *def,
            // the registry is empty when the root is named
            None => Record { name: root_ref.name, fields: Vec::new() },
        };
        Ok(Model {
            root,
            imports: self.imports,
            serializers: self.serializers,
            preamble: self.options.preamble.clone(),
            class_body: self.options.class_body.clone(),
        })
    }

    /// Name first, children second: the definition is attached only when the
    /// name is new; a reuse returns a bare reference and skips the subtree.
    /// Annotations below `path` are part of the shape, so a reused subtree
    /// carries exactly the annotations already applied to its definition.
    fn build_record(&mut self, rs: &ResultSet, hint: &str, path: &str) -> Result<RecordRef> {
        let candidate = type_name(hint);
        if candidate.is_empty() {
            return Err(InferenceError::invalid_identifier(path, hint, "no alphabetic character for a type name"));
        }
        let shape = RecordShape {
            field_names: rs.entries.keys().map(Key::to_string).collect(),
            annotations: annotate::under(&self.options.annotations, path),
        };
        let (name, fresh) = self.registry.assign(&candidate, &shape);
        if !fresh {
            return Ok(RecordRef { name, definition: None });
        }

        let mut fields = Vec::with_capacity(rs.entries.len());
        let mut attributes: IndexMap<String, String> = IndexMap::new();
        for (key, entry) in &rs.entries {
            let field = self.build_field(key, entry, rs.instances, path)?;
            if let Some(other) = attributes.insert(field.attribute.clone(), field.source_key.clone()) {
                return Err(InferenceError::invalid_identifier(
                    child_path(path, &field.source_key),
                    &field.source_key,
                    format!("attribute `{}` already used by key '{other}'", field.attribute),
                ));
            }
            fields.push(field);
        }
        let definition = Record { name: name.clone(), fields };
        Ok(RecordRef { name, definition: Some(Box::new(definition)) })
    }

    fn build_field(&mut self, key: &Key, entry: &Entry, instances: u64, path: &str) -> Result<Field> {
        let source_key = key.to_string();
        let field_path = child_path(path, &source_key);
        let attribute = attribute_name(&source_key, &field_path)?;

        let types = self.lower_population(&entry.population, &source_key, &field_path)?;
        let mut field = Field::new(source_key, attribute, types);
        field.nullable |= entry.population.nullable;
        field.allow_missing = entry.present_in < instances;

        if let Some(ann) = annotate::lookup(&self.options.annotations, &field_path) {
            self.apply_annotation(&mut field, &ann, &field_path)?;
        }
        field.collect_imports(&mut self.imports);
        field.expression = expression(&field);
        Ok(field)
    }

    fn apply_annotation(&mut self, field: &mut Field, ann: &Annotation, path: &str) -> Result<()> {
        field.nullable |= ann.optional;
        if let Some(name) = &ann.serializer {
            if !IDENTIFIER.is_match(name) {
                return Err(InferenceError::invalid_identifier(path, name, "not a valid serializer name"));
            }
            self.serializers.insert(name.clone());
            field.serializer = Some(name.clone());
        }
        if let Some(value) = &ann.default {
            field.default = Some(literal_default(path, &field.attribute, value)?);
        }
        Ok(())
    }

    /// Alternatives in first-observed arm order, then `None` if null was seen.
    fn lower_population(&mut self, pop: &Population, hint: &str, path: &str) -> Result<Vec<TypeTag>> {
        let mut out = Vec::with_capacity(pop.arms.len() + 1);
        for (key, arm) in &pop.arms {
            let tag = match (key, arm) {
                (ArmKey::Scalar(kind), _) => TypeTag::Scalar(*kind),
                (ArmKey::List | ArmKey::Set, Arm::Items(items)) => TypeTag::Sequence {
                    kind: if *key == ArmKey::Set { SeqKind::Set } else { SeqKind::List },
                    elements: self.lower_population(&items.items, hint, path)?,
                },
                (ArmKey::Tuple(_), Arm::Columns(columns)) => {
                    let mut elements = Vec::with_capacity(columns.cols.len());
                    for col in &columns.cols {
                        let alternatives = self.lower_population(col, hint, path)?;
                        elements.push(TypeTag::union(alternatives));
                    }
                    TypeTag::Sequence { kind: SeqKind::Tuple, elements }
                }
                (ArmKey::Map, Arm::Map(map)) => {
                    let keys = map.key_kinds.iter().map(|k| TypeTag::Scalar(*k)).collect();
                    TypeTag::Map {
                        key: Box::new(TypeTag::union(keys)),
                        values: self.lower_population(&map.values, hint, &child_path(path, WILDCARD))?,
                    }
                }
                (ArmKey::Record, Arm::Record(rs)) if rs.entries.is_empty() => TypeTag::Any,
                (ArmKey::Record, Arm::Record(rs)) => TypeTag::Record(self.build_record(rs, hint, path)?),
                // arm keys fix the variant
                _ => continue,
            };
            push_unique(&mut out, tag);
        }
        if pop.nullable {
            push_unique(&mut out, TypeTag::NONE);
        }
        Ok(out)
    }
}

// ------------------------------- Naming ----------------------------------- //

/// What two records must agree on to share a type name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordShape {
    pub field_names: BTreeSet<String>,
    /// Annotations below the record, keyed by path relative to it.
    pub annotations: Vec<(String, Annotation)>,
}

impl<const N: usize> From<[&str; N]> for RecordShape {
    fn from(names: [&str; N]) -> Self {
        RecordShape { field_names: names.iter().map(|n| n.to_string()).collect(), annotations: Vec::new() }
    }
}

/// Type names handed out during one run, each with the shape of the record
/// it was first given to.
#[derive(Debug, Default)]
pub struct NameRegistry {
    names: IndexMap<String, RecordShape>,
}

impl NameRegistry {
    /// Returns the final name and whether a new definition must be emitted.
    pub fn assign(&mut self, candidate: &str, shape: &RecordShape) -> (String, bool) {
        let mut name = candidate.to_string();
        loop {
            match self.names.get(&name) {
                None => {
                    self.names.insert(name.clone(), shape.clone());
                    return (name, true);
                }
                Some(known) if known == shape => return (name, false),
                Some(_) => name = next_candidate(&name),
            }
        }
    }

    pub fn len(&self) -> usize { self.names.len() }

    pub fn is_empty(&self) -> bool { self.names.is_empty() }
}

/// `Item` → `Item1`, `Item1` → `Item2`, `Item09` → `Item10`.
fn next_candidate(name: &str) -> String {
    let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
    let digits = &name[stem.len()..];
    match digits.parse::<u64>().ok().and_then(|n| n.checked_add(1)) {
        Some(n) => format!("{stem}{n:0width$}", width = digits.len()),
        None => format!("{name}1"),
    }
}

/// Leading non-letters dropped, then title-case words split on any
/// non-alphanumeric, joined.
pub fn type_name(raw: &str) -> String {
    raw.trim_start_matches(|c: char| !c.is_alphabetic())
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

pub fn attribute_name(source_key: &str, path: &str) -> Result<String> {
    let lowered = source_key.to_lowercase().replace([' ', '-'], "_");
    let trimmed = lowered.trim_start_matches(|c: char| !c.is_alphabetic());
    if trimmed.is_empty() {
        return Err(InferenceError::invalid_identifier(path, source_key, "no alphabetic character"));
    }
    if !trimmed.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(InferenceError::invalid_identifier(
            path,
            source_key,
            format!("`{trimmed}` is not a valid attribute name"),
        ));
    }
    Ok(trimmed.to_string())
}

// ------------------------------- Defaults --------------------------------- //

/// Explicit defaults must be immutable scalars.
pub fn literal_default(path: &str, field: &str, value: &serde_json::Value) -> Result<Literal> {
    match RawValue::from(value) {
        RawValue::Scalar(lit) => Ok(lit),
        other => Err(InferenceError::invalid_default(
            path,
            field,
            format!("a {} is mutable; only scalar defaults are supported", other.kind_name()),
        )),
    }
}

/// Decide the right-hand side of the field line.
///
/// A bare literal is used whenever nothing else needs saying; otherwise a
/// `field(...)` with a default value or a factory of the primary type, plus
/// metadata for optionality, a renamed key, or a custom serializer.
pub fn expression(f: &Field) -> Expression {
    let factory = f.primary_type().and_then(TypeTag::constructor_name);
    let value = match (&f.default, &factory) {
        (Some(lit), _) => Some(lit.clone()),
        (None, _) if f.nullable => Some(Literal::None),
        (None, Some(_)) => None,
        (None, None) => Some(Literal::None),
    };
    let default = match (&value, factory) {
        (Some(lit), _) => DefaultExpr::Value(lit.clone()),
        (None, Some(ctor)) => DefaultExpr::Factory(ctor),
        (None, None) => DefaultExpr::Value(Literal::None),
    };

    let metadata = FieldMetadata {
        missing: f.is_optional().then(|| default.clone()),
        data_key: (f.attribute != f.source_key).then(|| f.source_key.clone()),
        serializer: f.serializer.clone(),
    };
    let metadata = (metadata != FieldMetadata::default()).then_some(metadata);

    match (value, metadata) {
        (Some(lit), None) => Expression::Bare(lit),
        (_, metadata) => Expression::Field { default, metadata },
    }
}

// ------------------------------- Tests ------------------------------------ //
