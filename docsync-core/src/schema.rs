//! # schema: category-dispatched JSON-Schema validation of per-subject YAML
//!
//! One Draft-07 schema per category plus a `generic` fallback, loaded once.
//! Built-in schemas ship with the crate; a schema directory can override
//! them file by file (`<name>.schema.json`).
//!
//! Every violation in a file is reported (the validator's error iterator is
//! drained), each as `<dotted.path>: <message>`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use jsonschema::{Draft, Validator};
use serde_json::Value;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::contract::DocCategory;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to read schema {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("schema {name} is not valid JSON: {source}")]
    Json {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("schema {name} failed to compile: {message}")]
    Compile { name: String, message: String },
    #[error("no generic schema registered")]
    MissingGeneric,
}

const BUILTIN_SCHEMAS: [(&str, &str); 4] = [
    ("generic", include_str!("../schemas/generic.schema.json")),
    ("feature", include_str!("../schemas/feature.schema.json")),
    ("service", include_str!("../schemas/service.schema.json")),
    ("integration", include_str!("../schemas/integration.schema.json")),
];

/// Name of the Shared Bundle file, which is not a subject.
pub const SHARED_DATA_FILE: &str = "shared-sot.yaml";

/// Outcome for one validated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl FileReport {
    fn from_errors(errors: Vec<String>) -> FileReport {
        FileReport {
            valid: errors.is_empty(),
            errors,
        }
    }
}

pub struct SchemaRegistry {
    generic: Validator,
    validators: HashMap<String, Validator>,
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.validators.keys().map(String::as_str).collect();
        names.push("generic");
        names.sort();
        f.debug_struct("SchemaRegistry").field("schemas", &names).finish()
    }
}

impl SchemaRegistry {
    pub fn builtin() -> Result<SchemaRegistry, SchemaError> {
        SchemaRegistry::load(None)
    }

    /// Built-in schemas, overridden by any `<name>.schema.json` in `dir`.
    pub fn load(dir: Option<&Path>) -> Result<SchemaRegistry, SchemaError> {
        let mut sources: BTreeMap<String, String> = BUILTIN_SCHEMAS
            .iter()
            .map(|(name, text)| (name.to_string(), text.to_string()))
            .collect();

        if let Some(dir) = dir.filter(|d| d.is_dir()) {
            let entries = std::fs::read_dir(dir).map_err(|source| SchemaError::Read {
                path: dir.to_path_buf(),
                source,
            })?;
            for entry in entries.flatten() {
                let path = entry.path();
                let Some(name) = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_suffix(".schema.json"))
                else {
                    continue;
                };
                let text = std::fs::read_to_string(&path).map_err(|source| SchemaError::Read {
                    path: path.clone(),
                    source,
                })?;
                debug!(schema = name, path = %path.display(), "Schema override");
                sources.insert(name.to_string(), text);
            }
        }

        let mut validators = HashMap::new();
        for (name, text) in sources {
            let schema: Value = serde_json::from_str(&text).map_err(|source| SchemaError::Json {
                name: name.clone(),
                source,
            })?;
            let validator = jsonschema::options()
                .with_draft(Draft::Draft7)
                .build(&schema)
                .map_err(|e| SchemaError::Compile {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
            validators.insert(name, validator);
        }
        let generic = validators
            .remove("generic")
            .ok_or(SchemaError::MissingGeneric)?;
        info!(schemas = validators.len() + 1, "Loaded schema registry");
        Ok(SchemaRegistry {
            generic,
            validators,
        })
    }

    pub fn has_schema(&self, name: &str) -> bool {
        name == "generic" || self.validators.contains_key(name)
    }

    /// Validator for a `doc_category` value. Unknown or schema-less
    /// categories get the generic validator.
    fn validator_for(&self, category: &str) -> &Validator {
        let name = category
            .parse::<DocCategory>()
            .map(|c| c.schema_name())
            .unwrap_or("generic");
        self.validators
            .get(name)
            .or_else(|| self.validators.get(category))
            .unwrap_or(&self.generic)
    }

    /// Every violation in an already-parsed document.
    pub fn validate_value(&self, doc: &Value) -> Vec<String> {
        let Some(map) = doc.as_object() else {
            return vec!["Top-level YAML value must be a mapping".to_string()];
        };
        let Some(category) = map.get("doc_category") else {
            return vec!["Missing 'doc_category' field".to_string()];
        };
        let category = category.as_str().unwrap_or_default();
        self.validator_for(category)
            .iter_errors(doc)
            .map(|e| format!("{}: {}", dotted_path(&e.instance_path.to_string()), e))
            .collect()
    }

    /// Parses YAML text and validates it.
    pub fn validate_text(&self, text: &str) -> FileReport {
        if text
            .lines()
            .all(|l| l.trim().is_empty() || l.trim_start().starts_with('#'))
        {
            return FileReport::from_errors(vec!["Empty YAML file".to_string()]);
        }
        let doc: Value = match serde_yaml::from_str(text) {
            Ok(Value::Null) => return FileReport::from_errors(vec!["Empty YAML file".to_string()]),
            Ok(doc) => doc,
            Err(e) => return FileReport::from_errors(vec![format!("YAML parsing error: {e}")]),
        };
        FileReport::from_errors(self.validate_value(&doc))
    }

    pub fn validate_file(&self, path: &Path) -> FileReport {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let report = self.validate_text(&text);
                if report.valid {
                    debug!(path = %path.display(), "Valid");
                } else {
                    warn!(path = %path.display(), errors = report.errors.len(), "Schema violations");
                }
                report
            }
            Err(e) => FileReport::from_errors(vec![format!("Failed to read file: {e}")]),
        }
    }

    /// Validates every `*.yaml` / `*.yml` below `dir` except the Shared Bundle.
    /// Keys are paths relative to `dir`.
    pub fn validate_dir(&self, dir: &Path) -> BTreeMap<PathBuf, FileReport> {
        let mut results = BTreeMap::new();
        for entry in WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if !is_yaml(path) || path.file_name().is_some_and(|n| n == SHARED_DATA_FILE) {
                continue;
            }
            let rel = path.strip_prefix(dir).unwrap_or(path).to_path_buf();
            results.insert(rel, self.validate_file(path));
        }
        let invalid = results.values().filter(|r| !r.valid).count();
        info!(dir = %dir.display(), files = results.len(), invalid, "Validated directory");
        results
    }
}

pub fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// `/a/0/b` becomes `a.0.b`; the document root is `(root)`.
fn dotted_path(pointer: &str) -> String {
    let trimmed = pointer.trim_start_matches('/');
    if trimmed.is_empty() {
        "(root)".to_string()
    } else {
        trimmed
            .split('/')
            .map(|seg| seg.replace("~1", "/").replace("~0", "~"))
            .collect::<Vec<_>>()
            .join(".")
    }
}
