//! Generation options.
//!
//! One `Options` value drives one run. It is built from defaults, an optional
//! JSON config file, and CLI flags, in that order of precedence (lowest first).
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::annotate::Annotations;
use crate::inference::DetectorPolicy;

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Name given to the root record.
    pub root_name: String,

    /// Associative-container detection policy.
    pub detector: DetectorPolicy,

    /// Text emitted verbatim after the imports.
    pub preamble: Option<String>,

    /// Text appended verbatim (indented) to every record body.
    pub class_body: Option<String>,

    /// Per-path annotations; these win over comment-derived ones.
    pub annotations: Annotations,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            root_name: default_root_name(),
            detector: DetectorPolicy::default(),
            preamble: None,
            class_body: None,
            annotations: Annotations::new(),
        }
    }
}

fn default_root_name() -> String {
    "Root".to_string()
}

impl Options {
    pub fn with_root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = name.into();
        self
    }

    pub fn with_detector(mut self, detector: DetectorPolicy) -> Self {
        self.detector = detector;
        self
    }

    /// Load from a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let src = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        from_str_with_path(&src).with_context(|| format!("invalid config file {}", path.display()))
    }
}

// ============================================================================
// Path-aware deserialization
// ============================================================================

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(|err| {
        let path = err.path().to_string();
        anyhow::anyhow!("at JSON path {path} → {}", err.into_inner())
    })
}
