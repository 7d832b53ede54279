//! Per-key side-channel annotations.
//!
//! A trailing comment on a YAML key line can carry two tokens:
//!
//! ```yaml
//! middle_name: Ann   # Optional
//! created: 2020-01-01 # f:IsoDate
//! ```
//!
//! `Optional` declares the field nullable even if no null was sampled, and
//! `f:<ident>` names a hand-written serializer for it. Annotations are keyed
//! by the dotted path of enclosing mapping keys; sequence items add no
//! segment, since every item of a sequence is merged into one record anyway.
//! Values of an associative map are one record too: the model builder spells
//! their map-key segment as `*`, which matches any single segment here.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Annotation {
    pub optional: bool,
    pub serializer: Option<String>,
    /// Explicit default; only scalars are accepted when the model is built.
    pub default: Option<serde_json::Value>,
}

pub type Annotations = IndexMap<String, Annotation>;

impl Annotation {
    /// Extract recognized tokens from free comment text; anything else is prose.
    pub fn parse(comment: &str) -> Self {
        let mut out = Annotation::default();
        for token in comment.split_whitespace() {
            if token == "Optional" {
                out.optional = true;
            } else if let Some(name) = token.strip_prefix("f:") {
                out.serializer = Some(name.to_string());
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        !self.optional && self.serializer.is_none() && self.default.is_none()
    }

    /// Settings present in `other` win.
    pub fn overlay(&mut self, other: &Annotation) {
        self.optional |= other.optional;
        if other.serializer.is_some() {
            self.serializer = other.serializer.clone();
        }
        if other.default.is_some() {
            self.default = other.default.clone();
        }
    }
}

/// Merge `overrides` over `base`, path by path.
pub fn merge(mut base: Annotations, overrides: &Annotations) -> Annotations {
    for (path, ann) in overrides {
        base.entry(path.clone()).or_default().overlay(ann);
    }
    base
}

/// Join a parent path and a key the way annotation paths are spelled.
pub fn child_path(parent: &str, key: &str) -> String {
    if parent.is_empty() { key.to_string() } else { format!("{parent}.{key}") }
}

/// Path segment standing for every key of an associative map.
pub const WILDCARD: &str = "*";

fn segments(path: &str) -> Vec<&str> {
    if path.is_empty() { Vec::new() } else { path.split('.').collect() }
}

fn segment_matches(pattern: &str, segment: &str) -> bool {
    pattern == WILDCARD || segment == WILDCARD || pattern == segment
}

/// Everything recorded for `path`, with `*` segments on either side matching
/// any key. Matches overlay in insertion order.
pub fn lookup(annotations: &Annotations, path: &str) -> Option<Annotation> {
    let wanted = segments(path);
    let mut found: Option<Annotation> = None;
    for (key, ann) in annotations {
        let have = segments(key);
        if have.len() == wanted.len() && wanted.iter().zip(&have).all(|(w, h)| segment_matches(w, h)) {
            found.get_or_insert_with(Annotation::default).overlay(ann);
        }
    }
    found
}

/// Annotations strictly below `path`, keyed relative to it and sorted by
/// that relative path.
pub fn under(annotations: &Annotations, path: &str) -> Vec<(String, Annotation)> {
    let prefix = segments(path);
    let mut out: Vec<(String, Annotation)> = annotations
        .iter()
        .filter_map(|(key, ann)| {
            let have = segments(key);
            let inside = have.len() > prefix.len()
                && prefix.iter().zip(&have).all(|(p, h)| segment_matches(p, h));
            inside.then(|| (have[prefix.len()..].join("."), ann.clone()))
        })
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

// ------------------------------- Scanner ---------------------------------- //

/// Collect annotations from trailing comments of block-style YAML.
///
/// This is a line scanner, not a parser: it tracks mapping keys by
/// indentation, skips block scalars, and ignores flow collections. It runs on
/// text the YAML parser has already accepted.
pub fn scan_yaml(src: &str) -> Annotations {
    let mut out = Annotations::new();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut block_indent: Option<usize> = None;

    for line in src.lines() {
        let line = line.trim_end_matches('\r');
        let mut content = line.trim_start();
        let mut indent = line.len() - content.len();

        if let Some(owner) = block_indent {
            if content.is_empty() || indent > owner {
                continue;
            }
            block_indent = None;
        }
        if content.is_empty() || content.starts_with('#') || content == "---" || content == "..." {
            continue;
        }

        while let Some(rest) = content.strip_prefix('-').filter(|r| r.is_empty() || r.starts_with(' ')) {
            let item = rest.trim_start();
            indent += content.len() - item.len();
            content = item;
        }

        let Some((key, value)) = split_key(content) else { continue };

        while stack.last().is_some_and(|(i, _)| *i >= indent) {
            stack.pop();
        }
        let parent = stack.last().map(|(_, p)| p.as_str()).unwrap_or_default();
        let path = child_path(parent, &key);

        let (value, comment) = match find_comment(value) {
            Some(at) => (&value[..at], Some(&value[at + 1..])),
            None => (value, None),
        };
        if let Some(comment) = comment {
            let ann = Annotation::parse(comment);
            if !ann.is_empty() {
                out.insert(path.clone(), ann);
            }
        }
        if value.trim_start().starts_with(['|', '>']) {
            block_indent = Some(indent);
        }
        stack.push((indent, path));
    }
    out
}

/// Split `key: value` (plain or quoted key). `None` for lines without a key.
fn split_key(content: &str) -> Option<(String, &str)> {
    if let Some(quote) = content.chars().next().filter(|c| *c == '"' || *c == '\'') {
        let body = &content[1..];
        let end = body.find(quote)?;
        let value = body[end + 1..].trim_start().strip_prefix(':')?;
        return Some((body[..end].to_string(), value));
    }
    let colon = content
        .find(": ")
        .or_else(|| content.strip_suffix(':').map(str::len))?;
    let key = content[..colon].trim_end();
    if key.is_empty() || key.starts_with(['{', '[', '#', '?', '&', '*']) {
        return None;
    }
    Some((key.to_string(), &content[colon + 1..]))
}

/// Byte offset of a `#` that starts a comment (outside quotes, after blank).
fn find_comment(value: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut prev_blank = true;
    for (i, c) in value.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') if prev_blank => quote = Some(c),
            (None, '#') if prev_blank => return Some(i),
            _ => {}
        }
        prev_blank = c.is_whitespace();
    }
    None
}
