//! CLI: infer → (dataclass | model)
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use rayon::prelude::*;
use tracing::{debug, info};

use auto_class::annotate::{self, Annotations};
use auto_class::config::Options;
use auto_class::inference::DetectorPolicy;
use auto_class::ir::Model;
use auto_class::lower::build_model_from_documents;
use auto_class::raw::RawValue;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// infer record types from example YAML/JSON and emit Python dataclasses or the inferred model
#[derive(Parser, Debug)]
#[command(name = "auto-class", version)]
pub struct CommandLineInterface {
    /// more logging (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// infer and emit marshmallow_dataclass definitions
    Dataclass(DataclassOut),
    /// infer and print the record model as JSON
    Model(ModelOut),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Json,
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// input format (default: from the file extension, YAML otherwise)
    #[arg(long, value_enum)]
    format: Option<Format>,

    /// JSON Pointer to select a subnode in each JSON document (e.g. /data/items)
    #[arg(long)]
    json_pointer: Option<String>,

    /// JQ pre-process filter for each JSON document.
    #[arg(long)]
    jq_expr: Option<String>,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(Args, Debug, Clone)]
struct GenerationSettings {
    /// top-level type name
    #[arg(long)]
    root_type: Option<String>,

    /// JSON config file (detector policy, preamble, class body, annotations)
    #[arg(long)]
    config: Option<PathBuf>,

    /// minimum key count before a mapping may be treated as a lookup table
    #[arg(long)]
    min_size: Option<usize>,

    /// strict detection: two keys suffice but all values must share one kind
    #[arg(long, default_value_t = false)]
    strict: bool,

    /// file whose text is emitted verbatim after the imports
    #[arg(long)]
    preamble_file: Option<PathBuf>,

    /// file whose text is appended to every class body
    #[arg(long)]
    class_body_file: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct DataclassOut {
    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    generation: GenerationSettings,

    /// output .py file (stdout if omitted)
    #[arg(short, long, conflicts_with = "each")]
    out: Option<PathBuf>,

    /// one independent run per input file, written to --out-dir/<stem>.py
    #[arg(long, default_value_t = false, requires = "out_dir")]
    each: bool,

    /// output directory for --each
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct ModelOut {
    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    generation: GenerationSettings,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

/// Every document read from one input file.
struct SourceFile {
    path: PathBuf,
    documents: Vec<RawValue>,
    annotations: Annotations,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn verbosity(&self) -> u8 {
        self.verbose
    }

    pub fn run(&self) -> Result<()> {
        match &self.cmd {
            Command::Dataclass(target) => {
                let options = target.generation.options()?;
                let files = target.input_settings.load()?;

                if target.each {
                    let out_dir = target.out_dir.as_deref().context("--each requires --out-dir")?;
                    return run_each(&files, &options, out_dir);
                }

                let model = build_combined(&files, &options)?;
                write_output(target.out.as_deref(), &auto_class::render(&model))
            }
            Command::Model(target) => {
                let options = target.generation.options()?;
                let files = target.input_settings.load()?;
                let model = build_combined(&files, &options)?;
                let json = serde_json::to_string_pretty(&model).context("failed to serialize model")?;
                write_output(target.out.as_deref(), &json)
            }
        }
    }
}

impl GenerationSettings {
    /// Defaults, then the config file, then flags.
    fn options(&self) -> Result<Options> {
        let mut options = match &self.config {
            Some(path) => Options::load(path)?,
            None => Options::default(),
        };
        if self.strict {
            options.detector = DetectorPolicy::strict();
        }
        if let Some(min_size) = self.min_size {
            options.detector.min_size = min_size;
        }
        if let Some(root_type) = &self.root_type {
            options.root_name = root_type.clone();
        }
        if let Some(path) = &self.preamble_file {
            options.preamble = Some(read_text(path)?);
        }
        if let Some(path) = &self.class_body_file {
            options.class_body = Some(read_text(path)?);
        }
        debug!(?options.detector, root = %options.root_name, "generation options");
        Ok(options)
    }
}

impl InputSettings {
    fn load(&self) -> Result<Vec<SourceFile>> {
        let source_paths = resolve_file_path_patterns(&self.input)?;
        info!(count = source_paths.len(), "resolved inputs");
        source_paths.into_iter().map(|path| self.load_file(path)).collect()
    }

    fn format_of(&self, path: &Path) -> Format {
        self.format.unwrap_or_else(|| match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Format::Json,
            _ => Format::Yaml,
        })
    }

    fn load_file(&self, path: PathBuf) -> Result<SourceFile> {
        let source = read_text(&path)?;
        let display = path.display().to_string();

        let file = match self.format_of(&path) {
            Format::Yaml => {
                if self.json_pointer.is_some() || self.jq_expr.is_some() {
                    bail!("--json-pointer and --jq-expr apply to JSON input only ({display})");
                }
                let document = RawValue::from_yaml_str(&source)
                    .with_context(|| format!("failed to parse YAML source file ({display})"))?;
                SourceFile {
                    documents: vec![document],
                    annotations: annotate::scan_yaml(&source),
                    path,
                }
            }
            Format::Json => {
                let mut json_value = serde_json::from_str::<serde_json::Value>(&source)
                    .with_context(|| format!("failed to parse JSON source file ({display})"))?;
                if let Some(pointer) = self.json_pointer.as_deref() {
                    json_value = json_value
                        .pointer(pointer)
                        .cloned()
                        .with_context(|| format!("JSON pointer {pointer} matched nothing in {display}"))?;
                }
                let values = match self.jq_expr.as_ref() {
                    None => vec![json_value],
                    Some(jq_expr) => crate::jq_exec::filter_documents(jq_expr, &json_value).with_context(|| {
                        format!("failed to apply jq expression to source file ({display})")
                    })?,
                };
                SourceFile {
                    documents: values.into_iter().map(RawValue::from).collect(),
                    annotations: Annotations::new(),
                    path,
                }
            }
        };
        debug!(path = %file.path.display(), documents = file.documents.len(), "loaded");
        Ok(file)
    }
}

impl SourceFile {
    /// Comment annotations of this file underneath the configured ones.
    fn options(&self, base: &Options) -> Options {
        let mut options = base.clone();
        options.annotations = annotate::merge(self.annotations.clone(), &base.annotations);
        options
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

/// All documents of all files are instances of one root record.
fn build_combined(files: &[SourceFile], base: &Options) -> Result<Model> {
    let mut annotations = Annotations::new();
    for file in files {
        annotations = annotate::merge(annotations, &file.annotations);
    }
    let mut options = base.clone();
    options.annotations = annotate::merge(annotations, &base.annotations);

    let documents: Vec<RawValue> = files.iter().flat_map(|f| f.documents.iter().cloned()).collect();
    let model = build_model_from_documents(&documents, &options)?;
    info!(documents = documents.len(), root = %model.root.name, "inferred model");
    Ok(model)
}

fn run_each(files: &[SourceFile], base: &Options, out_dir: &Path) -> Result<()> {
    let written = files
        .par_iter()
        .map(|file| -> Result<PathBuf> {
            let model = build_model_from_documents(&file.documents, &file.options(base))
                .with_context(|| format!("inference failed for {}", file.path.display()))?;
            let stem = file
                .path
                .file_stem()
                .with_context(|| format!("input has no file name: {}", file.path.display()))?;
            let dest = out_dir.join(stem).with_extension("py");
            write_output(Some(dest.as_path()), &auto_class::render(&model))?;
            Ok(dest)
        })
        .collect::<Result<Vec<_>>>()?;

    for dest in &written {
        eprintln!("{} {}", "wrote".green().bold(), dest.display());
    }
    Ok(())
}

fn write_output(out: Option<&Path>, text: &str) -> Result<()> {
    match out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(out, text).with_context(|| format!("failed to write {}", out.display()))?;
            info!(path = %out.display(), "written");
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read source file {}", path.display()))
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'['))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                // Pattern was explicitly a glob but matched nothing -> surface as an error
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = CommandLineInterface::parse_from([
            "auto-class", "-v", "dataclass", "-i", "a.yaml", "--strict", "--min-size", "4", "--root-type", "Config",
        ]);
        assert_eq!(cli.verbosity(), 1);
        let Command::Dataclass(target) = &cli.cmd else { panic!("expected dataclass") };
        let options = target.generation.options().unwrap();
        assert_eq!(options.root_name, "Config");
        assert_eq!(options.detector.min_size, 4);
        assert!(options.detector.same_value_kind);
    }

    #[test]
    fn each_requires_out_dir() {
        let parsed = CommandLineInterface::try_parse_from(["auto-class", "dataclass", "-i", "a.yaml", "--each"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn format_sniffing() {
        let cli = CommandLineInterface::parse_from(["auto-class", "model", "-i", "x"]);
        let Command::Model(target) = &cli.cmd else { panic!("expected model") };
        assert_eq!(target.input_settings.format_of(Path::new("a.json")), Format::Json);
        assert_eq!(target.input_settings.format_of(Path::new("a.yml")), Format::Yaml);
    }

    #[test]
    fn literal_paths_pass_through() {
        let paths = resolve_file_path_patterns(["does/not/exist.yaml"]).unwrap();
        assert_eq!(paths, vec![PathBuf::from("does/not/exist.yaml")]);
        assert!(resolve_file_path_patterns(["no-such-dir-*/x.yaml"]).is_err());
    }
}
