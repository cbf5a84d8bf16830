//! # generator: per-subject YAML to design and wiki Markdown
//!
//! One render merges a per-subject YAML file with the Shared Bundle, converts
//! its ASCII diagram fields to Mermaid, renders the category template once per
//! variant, injects a table of contents and writes each result atomically.
//!
//! ## Merge rule
//! Shared `metadata` fields land at the top level, every other shared group
//! is exposed as `shared_<group>`, and subject fields override both.
//!
//! ## Error Handling
//! Unreadable or malformed input fails the document ([`GenerateError`]). A
//! template or write failure fails only the affected variant; the other
//! variant is still attempted and the failure is recorded in [`DocResult`].

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::atomic::{write_if_changed, WriteError, WriteOutcome};
use crate::contract::Variant;
use crate::md_parser::STATUS_DIMENSIONS;
use crate::mermaid::convert_mapping;
use crate::schema::{is_yaml, SchemaError, SchemaRegistry};
use crate::sources::{SourcesError, SourcesIndex};
use crate::templates::{TemplateEngine, TemplateError};
use crate::toc::add_toc;

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid shared data {path}: {source}")]
    SharedData {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{path} is not a YAML mapping")]
    NotAMapping { path: PathBuf },
    #[error("{} failed schema validation: {}", path.display(), errors.join("; "))]
    Schema { path: PathBuf, errors: Vec<String> },
    #[error("{path} cannot be used as a render context: {source}")]
    Context {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Sources(#[from] SourcesError),
    #[error(transparent)]
    Schemas(#[from] SchemaError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Absolute locations the generator reads from and writes to.
#[derive(Debug, Clone)]
pub struct GeneratorPaths {
    pub data_dir: PathBuf,
    pub shared_data_file: PathBuf,
    pub design_dir: PathBuf,
    pub wiki_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedOutput {
    pub variant: Variant,
    pub path: PathBuf,
    pub outcome: WriteOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantFailure {
    pub variant: Variant,
    pub message: String,
}

/// Outcome of one per-subject render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocResult {
    pub data_file: PathBuf,
    pub template: String,
    pub outputs: Vec<RenderedOutput>,
    pub failures: Vec<VariantFailure>,
}

impl DocResult {
    pub fn ok(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn output(&self, variant: Variant) -> Option<&Path> {
        self.outputs
            .iter()
            .find(|o| o.variant == variant)
            .map(|o| o.path.as_path())
    }

    /// One summary line for the batch report.
    pub fn summary_line(&self) -> String {
        let outcomes: Vec<String> = self
            .outputs
            .iter()
            .map(|o| format!("{} {}", o.variant.as_str(), o.outcome.as_str()))
            .collect();
        let mut line = format!("{} [{}]", self.data_file.display(), outcomes.join(", "));
        for f in &self.failures {
            line.push_str(&format!(" FAILED {}: {}", f.variant.as_str(), f.message));
        }
        line
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub apply: bool,
    /// Render the wiki variant as well as the design variant.
    pub render_both: bool,
    /// Only render subjects with this `doc_category`.
    pub category: Option<String>,
}

/// Results of a [`DocGenerator::generate_all`] run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub documents: Vec<DocResult>,
    /// Documents that failed before any render (unreadable, malformed or
    /// schema-invalid).
    pub rejected: Vec<(PathBuf, String)>,
}

impl BatchReport {
    pub fn passed(&self) -> usize {
        self.documents.iter().filter(|d| d.ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.rejected.len() + self.documents.iter().filter(|d| !d.ok()).count()
    }

    pub fn changed(&self) -> usize {
        self.documents
            .iter()
            .flat_map(|d| &d.outputs)
            .filter(|o| o.outcome.is_change())
            .count()
    }
}

/// Loads the Shared Bundle as a JSON object. A missing file is an empty bundle.
pub fn load_shared_data(path: &Path) -> Result<Map<String, Value>, GenerateError> {
    if !path.exists() {
        warn!(path = %path.display(), "[GENERATE] Shared data file not found, using empty bundle");
        return Ok(Map::new());
    }
    let text = std::fs::read_to_string(path).map_err(|source| GenerateError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_yaml::from_str(&text).map_err(|source| GenerateError::SharedData {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        _ => Err(GenerateError::NotAMapping {
            path: path.to_path_buf(),
        }),
    }
}

/// Shared metadata at top level, other groups as `shared_<group>`, subject
/// fields last so they win.
pub fn merge_data(shared: &Map<String, Value>, doc: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = Map::new();
    for (group, value) in shared {
        if group == "metadata" {
            if let Value::Object(fields) = value {
                merged.extend(fields.clone());
            }
        } else {
            merged.insert(format!("shared_{group}"), value.clone());
        }
    }
    merged.extend(doc.clone());
    merged
}

/// Directory levels between the design root and an output sub-path.
pub fn output_depth(subpath: &Path) -> usize {
    subpath
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count()
}

/// The seven status dimensions as `{label, glyph, notes}` rows. Missing
/// values default to `🔴` and `-`.
pub fn status_rows(ctx: &Map<String, Value>) -> Value {
    let rows: Vec<Value> = STATUS_DIMENSIONS
        .iter()
        .map(|(key, label)| {
            let text = |k: String, default: &str| {
                ctx.get(&k)
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .unwrap_or(default)
                    .to_string()
            };
            serde_json::json!({
                "label": label,
                "glyph": text(format!("status_{key}"), "🔴"),
                "notes": text(format!("status_{key}_notes"), "-"),
            })
        })
        .collect();
    Value::Array(rows)
}

pub struct DocGenerator {
    paths: GeneratorPaths,
    shared: Map<String, Value>,
    engine: TemplateEngine,
    schemas: SchemaRegistry,
}

impl std::fmt::Debug for DocGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocGenerator")
            .field("paths", &self.paths)
            .field("shared_groups", &self.shared.len())
            .field("engine", &self.engine)
            .field("schemas", &self.schemas)
            .finish()
    }
}

impl DocGenerator {
    pub fn new(
        paths: GeneratorPaths,
        templates_dir: Option<&Path>,
        sources: Arc<SourcesIndex>,
        sources_prefix: &str,
    ) -> Result<DocGenerator, GenerateError> {
        let shared = load_shared_data(&paths.shared_data_file)?;
        let engine = TemplateEngine::new(templates_dir, sources, sources_prefix)?;
        let schemas = SchemaRegistry::builtin()?;
        info!(
            data_dir = %paths.data_dir.display(),
            shared_groups = shared.len(),
            "[GENERATE] Generator ready"
        );
        Ok(DocGenerator {
            paths,
            shared,
            engine,
            schemas,
        })
    }

    /// Replaces the built-in schemas, e.g. with a registry that has overrides.
    pub fn with_schemas(mut self, schemas: SchemaRegistry) -> Self {
        self.schemas = schemas;
        self
    }

    pub fn paths(&self) -> &GeneratorPaths {
        &self.paths
    }

    pub fn shared_data(&self) -> &Map<String, Value> {
        &self.shared
    }

    pub fn engine(&self) -> &TemplateEngine {
        &self.engine
    }

    /// Checks a loaded subject against its category schema. All violations
    /// are carried in [`GenerateError::Schema`].
    pub fn check_subject(
        &self,
        data_file: &Path,
        doc: &Map<String, Value>,
    ) -> Result<(), GenerateError> {
        let errors = self.schemas.validate_value(&Value::Object(doc.clone()));
        if errors.is_empty() {
            return Ok(());
        }
        warn!(path = %data_file.display(), errors = errors.len(), "[GENERATE] Schema violations, skipping");
        Err(GenerateError::Schema {
            path: data_file.to_path_buf(),
            errors,
        })
    }

    /// Reads a per-subject YAML file, converting its diagram fields.
    pub fn load_subject(&self, data_file: &Path) -> Result<Map<String, Value>, GenerateError> {
        let text = std::fs::read_to_string(data_file).map_err(|source| GenerateError::Read {
            path: data_file.to_path_buf(),
            source,
        })?;
        let mut doc: serde_yaml::Value =
            serde_yaml::from_str(&text).map_err(|source| GenerateError::Yaml {
                path: data_file.to_path_buf(),
                source,
            })?;
        let Some(mapping) = doc.as_mapping_mut() else {
            return Err(GenerateError::NotAMapping {
                path: data_file.to_path_buf(),
            });
        };
        let converted = convert_mapping(mapping);
        if !converted.is_empty() {
            debug!(path = %data_file.display(), fields = ?converted, "[GENERATE] Converted diagram fields");
        }
        match serde_json::to_value(&doc) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(GenerateError::NotAMapping {
                path: data_file.to_path_buf(),
            }),
            Err(source) => Err(GenerateError::Context {
                path: data_file.to_path_buf(),
                source,
            }),
        }
    }

    /// Merged render context for one subject.
    pub fn build_context(&self, doc: &Map<String, Value>) -> Value {
        let mut ctx = merge_data(&self.shared, doc);
        let rows = status_rows(&ctx);
        ctx.entry("status_rows").or_insert(rows);
        Value::Object(ctx)
    }

    /// Renders one subject to `<subpath>/<stem>.md` under the design tree
    /// (and the wiki tree when `render_both`). `template` defaults to the
    /// template for the subject's `doc_category`. A subject that violates its
    /// category schema is not rendered.
    pub fn generate_doc(
        &self,
        data_file: &Path,
        template: Option<&str>,
        output_subpath: &Path,
        render_both: bool,
        apply: bool,
    ) -> Result<DocResult, GenerateError> {
        let doc = self.load_subject(data_file)?;
        self.check_subject(data_file, &doc)?;
        let template = match template {
            Some(name) => name.to_string(),
            None => {
                let category = doc.get("doc_category").and_then(Value::as_str).unwrap_or("");
                self.engine.template_for(category)
            }
        };
        let ctx = self.build_context(&doc);
        let depth = output_depth(output_subpath);
        let stem = data_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index".to_string());
        let file_name = format!("{stem}.md");

        let mut targets = vec![(
            Variant::Design,
            self.paths.design_dir.join(output_subpath).join(&file_name),
        )];
        if render_both {
            targets.push((
                Variant::Wiki,
                self.paths.wiki_dir.join(output_subpath).join(&file_name),
            ));
        }

        let mut result = DocResult {
            data_file: data_file.to_path_buf(),
            template: template.clone(),
            outputs: Vec::new(),
            failures: Vec::new(),
        };
        for (variant, target) in targets {
            let written = self
                .engine
                .render(&template, &ctx, variant, depth)
                .map_err(GenerateError::from)
                .and_then(|rendered| {
                    let content = add_toc(&rendered);
                    write_if_changed(&target, &content, apply).map_err(GenerateError::from)
                });
            match written {
                Ok(outcome) => {
                    debug!(path = %target.display(), variant = variant.as_str(), outcome = outcome.as_str(), "[GENERATE] Rendered");
                    result.outputs.push(RenderedOutput {
                        variant,
                        path: target,
                        outcome,
                    });
                }
                Err(e) => {
                    error!(path = %data_file.display(), variant = variant.as_str(), error = %e, "[GENERATE][ERROR] Render failed");
                    result.failures.push(VariantFailure {
                        variant,
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(result)
    }

    /// Renders every per-subject YAML under the data directory except the
    /// Shared Bundle. The output sub-path mirrors the data file's directory.
    pub fn generate_all(&self, options: &GenerateOptions) -> BatchReport {
        let mut report = BatchReport::default();
        let shared_name = self.paths.shared_data_file.file_name();

        for entry in WalkDir::new(&self.paths.data_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if !is_yaml(path) || path.file_name() == shared_name {
                continue;
            }
            if let Some(wanted) = &options.category {
                match self.load_subject(path) {
                    Ok(doc) => {
                        let category = doc.get("doc_category").and_then(Value::as_str);
                        if category != Some(wanted.as_str()) {
                            continue;
                        }
                    }
                    Err(e) => {
                        report.rejected.push((path.to_path_buf(), e.to_string()));
                        continue;
                    }
                }
            }
            let subpath = path
                .parent()
                .and_then(|p| p.strip_prefix(&self.paths.data_dir).ok())
                .map(Path::to_path_buf)
                .unwrap_or_default();
            match self.generate_doc(path, None, &subpath, options.render_both, options.apply) {
                Ok(doc) => report.documents.push(doc),
                Err(e) => {
                    error!(path = %path.display(), error = %e, "[GENERATE][ERROR] Document rejected");
                    report.rejected.push((path.to_path_buf(), e.to_string()));
                }
            }
        }

        info!(
            documents = report.documents.len(),
            passed = report.passed(),
            failed = report.failed(),
            changed = report.changed(),
            apply = options.apply,
            "[GENERATE] Batch complete"
        );
        report
    }
}
