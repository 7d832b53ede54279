//! Infer record definitions from example data.
//!
//! Pipeline: example documents ([`raw::RawValue`]) → merged populations
//! ([`inference`]) → named, deduplicated records ([`lower`], [`ir::Model`]) →
//! Python `marshmallow_dataclass` source ([`codegen`]).
//!
//! ```no_run
//! let options = auto_class::config::Options::default();
//! let src = auto_class::from_yaml("name: x  # Optional\n", &options)?;
//! print!("{src}");
//! # Ok::<(), auto_class::error::InferenceError>(())
//! ```
pub mod annotate;
pub mod codegen;
pub mod config;
pub mod error;
pub mod inference;
pub mod ir;
pub mod lower;
pub mod raw;

use crate::config::Options;
use crate::error::Result;
use crate::ir::Model;
use crate::raw::RawValue;

/// Build and render; several documents are instances of one root record.
pub fn generate(docs: &[RawValue], options: &Options) -> Result<String> {
    let model = lower::build_model_from_documents(docs, options)?;
    Ok(render(&model))
}

pub fn render(model: &Model) -> String {
    let mut cg = codegen::Codegen::new();
    cg.emit(model);
    cg.into_string()
}

/// YAML source, with trailing-comment annotations picked up.
pub fn from_yaml(src: &str, options: &Options) -> Result<String> {
    let doc = RawValue::from_yaml_str(src)?;
    generate(std::slice::from_ref(&doc), &with_comment_annotations(src, options))
}

pub fn from_json(src: &str, options: &Options) -> Result<String> {
    let doc = RawValue::from_json_str(src)?;
    generate(std::slice::from_ref(&doc), options)
}

/// `options` with annotations scanned from YAML comments underneath its own.
pub fn with_comment_annotations(src: &str, options: &Options) -> Options {
    let mut out = options.clone();
    out.annotations = annotate::merge(annotate::scan_yaml(src), &options.annotations);
    out
}
