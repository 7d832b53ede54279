//! Python `marshmallow_dataclass` renderer.
//!
//! Consumes a finished `Model`; makes no type decisions of its own. Nested
//! record definitions are emitted inside the owning class, pre-order, right
//! before the first field that uses them. A record referenced again by name
//! elsewhere is lifted to module level instead, since Python class bodies do
//! not see each other's nested classes.
use std::collections::{BTreeSet, HashSet};

use crate::ir::{DefaultExpr, Expression, Field, FieldMetadata, Model, Record, TypeTag};
use crate::raw::{Literal, SeqKind};

const INDENT: &str = "    ";

#[derive(Debug, Default)]
pub struct Codegen {
    out: String,
    uses_field: bool,
    /// Records emitted at module level.
    shared: HashSet<String>,
}

impl Codegen {
    pub fn new() -> Self { Self::default() }

    pub fn emit(&mut self, model: &Model) {
        self.shared = reused_names(&model.root);
        self.shared.remove(&model.root.name);

        // blocks first: they decide whether `field` must be imported
        let mut hoisted = Vec::new();
        self.hoist(&model.root, model.class_body.as_deref(), &mut hoisted);
        let root = self.walk(&model.root, model.class_body.as_deref()).join("\n");

        let mut sections = vec![self.import_block(model)];
        sections.extend(model.serializers.iter().map(|name| serializer_class(name)));
        if let Some(preamble) = model.preamble.as_deref().map(str::trim_end).filter(|p| !p.is_empty()) {
            sections.push(preamble.to_string());
        }
        sections.extend(hoisted);
        sections.push(root);

        self.out.push_str(&sections.join("\n\n\n"));
        self.out.push('\n');
    }

    pub fn into_string(self) -> String { self.out }

    /// Lines of one record block, nested definitions included.
    pub fn walk(&mut self, record: &Record, class_body: Option<&str>) -> Vec<String> {
        let mut body = Vec::new();
        for f in &record.fields {
            let mut nested = Vec::new();
            f.types.iter().for_each(|t| embedded_definitions(t, &mut nested));
            nested.retain(|d| !self.shared.contains(&d.name));
            for def in nested {
                body.push(String::new());
                body.extend(self.walk(def, class_body));
                body.push(String::new());
            }
            body.push(self.field_line(f));
        }
        body.push("Schema: ClassVar[Type[Schema]] = Schema".to_string());
        if let Some(extra) = class_body {
            body.extend(extra.trim_end().lines().map(str::to_string));
        }

        let mut lines = vec!["@dataclass".to_string(), format!("class {}:", record.name)];
        lines.extend(body.into_iter().map(|l| if l.is_empty() { l } else { format!("{INDENT}{l}") }));
        lines
    }

    /// Module-level blocks for shared records below `record`, dependencies
    /// first.
    fn hoist(&mut self, record: &Record, class_body: Option<&str>, out: &mut Vec<String>) {
        for f in &record.fields {
            let mut nested = Vec::new();
            f.types.iter().for_each(|t| embedded_definitions(t, &mut nested));
            for def in nested {
                self.hoist(def, class_body, out);
                if self.shared.contains(&def.name) {
                    let block = self.walk(def, class_body).join("\n");
                    out.push(block);
                }
            }
        }
    }

    fn field_line(&mut self, f: &Field) -> String {
        format!("{}: {} = {}", f.attribute, field_type(f), self.expression(&f.expression))
    }

    fn expression(&mut self, e: &Expression) -> String {
        match e {
            Expression::Bare(lit) => py_literal(lit),
            Expression::Field { default, metadata } => {
                self.uses_field = true;
                let mut args = vec![match default {
                    DefaultExpr::Value(lit) => format!("default={}", py_literal(lit)),
                    DefaultExpr::Factory(ctor) => format!("default_factory={ctor}"),
                }];
                if let Some(meta) = metadata {
                    args.push(format!("metadata=dict({})", metadata_items(meta).join(", ")));
                }
                format!("field({})", args.join(", "))
            }
        }
    }

    fn import_block(&self, model: &Model) -> String {
        let typing: BTreeSet<&str> = model
            .imports
            .iter()
            .map(|i| i.name())
            .chain(["ClassVar", "Type"])
            .collect();

        let mut lines = Vec::new();
        if self.uses_field {
            lines.push("from dataclasses import field".to_string());
        }
        lines.push(format!("from typing import {}", typing.into_iter().collect::<Vec<_>>().join(", ")));
        lines.push(String::new());
        lines.push("from marshmallow import Schema".to_string());
        if !model.serializers.is_empty() {
            lines.push("from marshmallow.fields import Field".to_string());
        }
        lines.push("from marshmallow_dataclass import dataclass".to_string());
        lines.join("\n")
    }
}

// ------------------------------- Types ------------------------------------ //

pub fn field_type(f: &Field) -> String {
    if f.types.is_empty() {
        return "Any".to_string();
    }
    let inner = union_expr(&f.types);
    if f.nullable { format!("Optional[{inner}]") } else { inner }
}

pub fn type_expr(t: &TypeTag) -> String {
    match t {
        TypeTag::Any => "Any".to_string(),
        TypeTag::Scalar(kind) => kind.name().to_string(),
        TypeTag::Sequence { kind: SeqKind::List, elements } => format!("List[{}]", alternatives(elements)),
        TypeTag::Sequence { kind: SeqKind::Set, elements } => format!("Set[{}]", alternatives(elements)),
        TypeTag::Sequence { kind: SeqKind::Tuple, elements } if elements.is_empty() => "Tuple[()]".to_string(),
        TypeTag::Sequence { kind: SeqKind::Tuple, elements } => {
            format!("Tuple[{}]", elements.iter().map(type_expr).collect::<Vec<_>>().join(", "))
        }
        TypeTag::Map { key, values } => format!("Dict[{}, {}]", type_expr(key), alternatives(values)),
        TypeTag::Union(members) => alternatives(members),
        TypeTag::Record(r) => r.name.clone(),
    }
}

/// A set of alternatives as one type; `None` folds into `Optional`.
fn alternatives(members: &[TypeTag]) -> String {
    let rest: Vec<TypeTag> = members.iter().filter(|t| !t.is_none()).cloned().collect();
    let has_none = rest.len() != members.len();
    match (rest.is_empty(), has_none) {
        (true, true) => "None".to_string(),
        (true, false) => "Any".to_string(),
        (false, true) => format!("Optional[{}]", union_expr(&rest)),
        (false, false) => union_expr(&rest),
    }
}

fn union_expr(members: &[TypeTag]) -> String {
    match members {
        [only] => type_expr(only),
        many => format!("Union[{}]", many.iter().map(type_expr).collect::<Vec<_>>().join(", ")),
    }
}

/// Record definitions reachable from `t` without entering another record.
fn embedded_definitions<'a>(t: &'a TypeTag, out: &mut Vec<&'a Record>) {
    match t {
        TypeTag::Record(r) => out.extend(r.definition.as_deref()),
        TypeTag::Sequence { elements, .. } => elements.iter().for_each(|e| embedded_definitions(e, out)),
        TypeTag::Map { key, values } => {
            embedded_definitions(key, out);
            values.iter().for_each(|v| embedded_definitions(v, out));
        }
        TypeTag::Union(members) => members.iter().for_each(|m| embedded_definitions(m, out)),
        TypeTag::Any | TypeTag::Scalar(_) => {}
    }
}

/// Names of records that also appear as bare references somewhere.
fn reused_names(root: &Record) -> HashSet<String> {
    fn visit(t: &TypeTag, out: &mut HashSet<String>) {
        match t {
            TypeTag::Record(r) => match r.definition.as_deref() {
                Some(def) => def.fields.iter().flat_map(|f| &f.types).for_each(|t| visit(t, out)),
                None => {
                    out.insert(r.name.clone());
                }
            },
            TypeTag::Sequence { elements: members, .. } | TypeTag::Union(members) => {
                members.iter().for_each(|m| visit(m, out))
            }
            TypeTag::Map { key, values } => {
                visit(key, out);
                values.iter().for_each(|v| visit(v, out));
            }
            TypeTag::Any | TypeTag::Scalar(_) => {}
        }
    }
    let mut out = HashSet::new();
    root.fields.iter().flat_map(|f| &f.types).for_each(|t| visit(t, &mut out));
    out
}

// ------------------------------- Values ----------------------------------- //

fn metadata_items(meta: &FieldMetadata) -> Vec<String> {
    let mut items = Vec::new();
    if let Some(missing) = &meta.missing {
        let d = match missing {
            DefaultExpr::Value(lit) => py_literal(lit),
            DefaultExpr::Factory(ctor) => ctor.clone(),
        };
        items.push(format!("default={d}"));
        items.push(format!("missing={d}"));
        items.push("required=False".to_string());
    }
    if let Some(key) = &meta.data_key {
        items.push(format!("data_key={}", py_str(key)));
    }
    if let Some(name) = &meta.serializer {
        items.push(format!("marshmallow_field={name}()"));
    }
    items
}

pub fn py_literal(lit: &Literal) -> String {
    match lit {
        Literal::None => "None".to_string(),
        Literal::Bool(true) => "True".to_string(),
        Literal::Bool(false) => "False".to_string(),
        Literal::Int(i) => i.to_string(),
        Literal::Float(f) if f.is_nan() => "float('nan')".to_string(),
        Literal::Float(f) if f.is_infinite() && f.is_sign_positive() => "float('inf')".to_string(),
        Literal::Float(f) if f.is_infinite() => "float('-inf')".to_string(),
        Literal::Float(f) => format!("{:?}", f.0),
        Literal::Str(s) => py_str(s),
        Literal::Bytes(bytes) => {
            let mut out = String::from("b'");
            for b in bytes {
                match b {
                    b'\\' => out.push_str("\\\\"),
                    b'\'' => out.push_str("\\'"),
                    0x20..=0x7e => out.push(*b as char),
                    _ => out.push_str(&format!("\\x{b:02x}")),
                }
            }
            out.push('\'');
            out
        }
    }
}

fn py_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn serializer_class(name: &str) -> String {
    [
        format!("class {name}(Field):"),
        format!("{INDENT}def _serialize(self, value, attr, obj, **kwargs):"),
        format!("{INDENT}{INDENT}return value"),
        String::new(),
        format!("{INDENT}def _deserialize(self, value, attr, data, **kwargs):"),
        format!("{INDENT}{INDENT}return value"),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::Annotation;
    use crate::config::Options;
    use crate::lower::build_model;
    use crate::raw::RawValue;
    use ordered_float::OrderedFloat;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn render(v: serde_json::Value, options: &Options) -> String {
        let model = build_model(&RawValue::from(v), options).unwrap();
        let mut cg = Codegen::new();
        cg.emit(&model);
        cg.into_string()
    }

    #[test]
    fn sibling_scenario() {
        let src = render(
            json!([
                {"hello": 1},
                {"hello": "one", "world": "two"},
                {"hello": 3, "world": null}
            ]),
            &Options::default(),
        );
        let expected = "\
from dataclasses import field
from typing import ClassVar, Optional, Type, Union

from marshmallow import Schema
from marshmallow_dataclass import dataclass


@dataclass
class Root:
    hello: Union[int, str] = field(default_factory=int)
    world: Optional[str] = field(default=None, metadata=dict(default=None, missing=None, required=False))
    Schema: ClassVar[Type[Schema]] = Schema
";
        assert_eq!(src, expected);
    }

    #[test]
    fn nested_records_and_renamed_keys() {
        let src = render(
            json!({
                "Attribute 8": "x",
                "items": [{"id": 1}, {"id": 2, "tags": ["a"]}]
            }),
            &Options::default(),
        );
        let expected = "\
from dataclasses import field
from typing import ClassVar, List, Type

from marshmallow import Schema
from marshmallow_dataclass import dataclass


@dataclass
class Root:
    attribute_8: str = field(default_factory=str, metadata=dict(data_key='Attribute 8'))

    @dataclass
    class Items:
        id: int = field(default_factory=int)
        tags: List[str] = field(default_factory=list, metadata=dict(default=list, missing=list, required=False))
        Schema: ClassVar[Type[Schema]] = Schema

    items: List[Items] = field(default_factory=list)
    Schema: ClassVar[Type[Schema]] = Schema
";
        assert_eq!(src, expected);
    }

    #[test]
    fn reused_record_is_lifted_to_module_level() {
        let src = render(
            json!({
                "billing": {"address": {"street": "a", "zip": "1"}},
                "shipping": {"address": {"street": "b", "zip": "2"}}
            }),
            &Options::default(),
        );
        let expected = "\
from dataclasses import field
from typing import ClassVar, Type

from marshmallow import Schema
from marshmallow_dataclass import dataclass


@dataclass
class Address:
    street: str = field(default_factory=str)
    zip: str = field(default_factory=str)
    Schema: ClassVar[Type[Schema]] = Schema


@dataclass
class Root:

    @dataclass
    class Billing:
        address: Address = field(default_factory=Address)
        Schema: ClassVar[Type[Schema]] = Schema

    billing: Billing = field(default_factory=Billing)

    @dataclass
    class Shipping:
        address: Address = field(default_factory=Address)
        Schema: ClassVar[Type[Schema]] = Schema

    shipping: Shipping = field(default_factory=Shipping)
    Schema: ClassVar[Type[Schema]] = Schema
";
        assert_eq!(src, expected);
    }

    #[test]
    fn serializers_preamble_and_class_body() {
        let mut options = Options {
            preamble: Some("import datetime\n".into()),
            class_body: Some("def describe(self):\n    return 'x'".into()),
            ..Options::default()
        };
        options.annotations.insert(
            "when".into(),
            Annotation { serializer: Some("IsoDate".into()), ..Annotation::default() },
        );
        options.annotations.insert(
            "level".into(),
            Annotation { default: Some(json!("info")), ..Annotation::default() },
        );
        let src = render(json!({"when": "2020-01-01", "level": "debug"}), &options);
        let expected = "\
from dataclasses import field
from typing import ClassVar, Type

from marshmallow import Schema
from marshmallow.fields import Field
from marshmallow_dataclass import dataclass


class IsoDate(Field):
    def _serialize(self, value, attr, obj, **kwargs):
        return value

    def _deserialize(self, value, attr, data, **kwargs):
        return value


import datetime


@dataclass
class Root:
    when: str = field(default_factory=str, metadata=dict(marshmallow_field=IsoDate()))
    level: str = 'info'
    Schema: ClassVar[Type[Schema]] = Schema
    def describe(self):
        return 'x'
";
        assert_eq!(src, expected);
    }

    #[test]
    fn container_type_expressions() {
        let model = build_model(
            &RawValue::from_yaml_str(
                "pair: !tuple [a, 1]\nempty: !tuple []\nnums: [1, null]\nmixed: [1, a]\nnone: []\n",
            )
            .unwrap(),
            &Options::default(),
        )
        .unwrap();
        let types: Vec<String> = model.root.fields.iter().map(field_type).collect();
        assert_eq!(types, ["Tuple[str, int]", "Tuple[()]", "List[Optional[int]]", "List[Union[int, str]]", "List[Any]"]);
    }

    #[test]
    fn python_literals() {
        assert_eq!(py_literal(&Literal::Str("it's\n".into())), r"'it\'s\n'");
        assert_eq!(py_literal(&Literal::Bool(false)), "False");
        assert_eq!(py_literal(&Literal::Float(OrderedFloat(1.0))), "1.0");
        assert_eq!(py_literal(&Literal::Float(OrderedFloat(f64::INFINITY))), "float('inf')");
        assert_eq!(py_literal(&Literal::Bytes(vec![b'a', 0, b'\''])), r"b'a\x00\''");
    }
}
