//! # sot_parser: SOURCE_OF_TRUTH.md into the typed Shared Bundle
//!
//! The Source of Truth is a hand-maintained Markdown file. Its `##` section
//! headings are the interface contract: each known heading is followed by a
//! pipe table that becomes a sequence of typed records. Bold-labelled
//! `**Key**: value` lines above the first section become the metadata map.
//!
//! ## Major Types
//! - [`SharedBundle`]: the whole parse result, serialisable to the on-disk
//!   `shared-sot.yaml` and back without loss.
//! - [`DeploySpec`]: the deployment sections consumed by [`crate::deploy`].
//!
//! ## Error Handling
//! - Missing sections are tolerated and yield empty sequences.
//! - Short rows are skipped silently.
//! - A row with the right cell count but an unusable status glyph or design
//!   doc path is a hard [`SotError`].

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::contract::StatusGlyph;
use crate::markdown::{extract_link, fenced_block_after, section_body, strip_backticks, table_rows};

#[derive(Debug, thiserror::Error)]
pub enum SotError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{section} row {row}: '{value}' is not a status glyph (✅ 🟡 🔴 ⚪)")]
    InvalidStatus {
        section: &'static str,
        row: usize,
        value: String,
    },
    #[error("{section} row {row}: '{value}' is not a relative design doc path")]
    InvalidDesignPath {
        section: &'static str,
        row: usize,
        value: String,
    },
    #[error("invalid shared bundle YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedBundle {
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub content_modules: Vec<ContentModule>,
    #[serde(default)]
    pub backend_services: Vec<BackendService>,
    #[serde(default)]
    pub infrastructure: Vec<InfraComponent>,
    #[serde(default)]
    pub go_dependencies: GoDependencies,
    #[serde(default)]
    pub design_principles: DesignPrinciples,
    #[serde(default, skip_serializing_if = "DeploySpec::is_empty")]
    pub deploy: DeploySpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentModule {
    pub name: String,
    pub schema: String,
    pub status: StatusGlyph,
    pub primary_metadata: String,
    pub secondary_integration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendService {
    pub name: String,
    pub package: String,
    pub fx_module: String,
    pub status: StatusGlyph,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfraComponent {
    pub name: String,
    pub package: String,
    pub version: String,
    pub purpose: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoDependency {
    pub package: String,
    pub version: String,
    pub purpose: String,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoDependencies {
    #[serde(default)]
    pub core: Vec<GoDependency>,
    #[serde(default)]
    pub security: Vec<GoDependency>,
    #[serde(default)]
    pub observability: Vec<GoDependency>,
    #[serde(default)]
    pub resilience: Vec<GoDependency>,
    #[serde(default)]
    pub distributed: Vec<GoDependency>,
}

impl GoDependencies {
    pub fn len(&self) -> usize {
        self.core.len()
            + self.security.len()
            + self.observability.len()
            + self.resilience.len()
            + self.distributed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn group_mut(&mut self, key: &str) -> Option<&mut Vec<GoDependency>> {
        match key {
            "core" => Some(&mut self.core),
            "security" => Some(&mut self.security),
            "observability" => Some(&mut self.observability),
            "resilience" => Some(&mut self.resilience),
            "distributed" => Some(&mut self.distributed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignPattern {
    pub pattern: String,
    pub decision: String,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesignPrinciples {
    /// principle name -> description
    #[serde(default)]
    pub principles: BTreeMap<String, String>,
    #[serde(default)]
    pub design_patterns: Vec<DesignPattern>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingRule {
    pub component: String,
    pub min: String,
    pub max: String,
    pub trigger: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthEndpoint {
    pub endpoint: String,
    pub purpose: String,
    pub status_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSetting {
    pub key: String,
    pub env: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub default: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_example: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swarm_example: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm_structure: Option<String>,
    #[serde(default)]
    pub scaling: Vec<ScalingRule>,
    #[serde(default)]
    pub health_endpoints: Vec<HealthEndpoint>,
    #[serde(default)]
    pub server_config: Vec<ServerSetting>,
}

impl DeploySpec {
    pub fn is_empty(&self) -> bool {
        self == &DeploySpec::default()
    }
}

static METADATA_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("last_updated", r"\*\*Last Updated\*\*:[ \t]*(\S+)"),
        ("go_version", r"\*\*Go Version\*\*:[ \t]*(\S+)"),
        ("nodejs_version", r"\*\*Node\.js\*\*:[ \t]*([^\n]+)"),
        ("python_version", r"\*\*Python\*\*:[ \t]*(\S+)"),
        ("postgresql_version", r"\*\*PostgreSQL\*\*:[ \t]*([^\n]+)"),
        ("build_command", r"\*\*Build Command\*\*:[ \t]*`([^`]+)`"),
    ]
    .into_iter()
    .map(|(key, pattern)| (key, Regex::new(pattern).expect("static regex")))
    .collect()
});

static PRINCIPLE_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("database_strategy", r"(?s)\*\*PostgreSQL ONLY\*\* - (.+?)(?:\n\n|\z)"),
        ("package_update_policy", r"(?s)\*\*1 Minor Behind\*\* - (.+?)(?:\n\n|\z)"),
        ("test_coverage", r"(?s)\*\*80% minimum\*\* - (.+?)(?:\n\n|\z)"),
    ]
    .into_iter()
    .map(|(key, pattern)| (key, Regex::new(pattern).expect("static regex")))
    .collect()
});

const GO_DEPENDENCY_SECTIONS: [(&str, &str); 5] = [
    ("Go Dependencies (Core)", "core"),
    ("Go Dependencies (Security & RBAC)", "security"),
    ("Go Dependencies (Observability)", "observability"),
    ("Go Dependencies (Resilience)", "resilience"),
    ("Go Dependencies (Distributed/Clustering)", "distributed"),
];

/// Reads and parses the SOT file at `path`.
pub fn parse_sot_file(path: &Path) -> Result<SharedBundle, SotError> {
    let content = std::fs::read_to_string(path).map_err(|source| SotError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "[SOT] Parsing Source of Truth");
    parse_sot(&content)
}

pub fn parse_sot(content: &str) -> Result<SharedBundle, SotError> {
    let bundle = SharedBundle {
        metadata: parse_metadata(content),
        content_modules: parse_content_modules(content)?,
        backend_services: parse_backend_services(content)?,
        infrastructure: parse_infrastructure(content)?,
        go_dependencies: parse_go_dependencies(content),
        design_principles: parse_design_principles(content),
        deploy: parse_deploy(content),
    };
    info!(
        metadata = bundle.metadata.len(),
        content_modules = bundle.content_modules.len(),
        backend_services = bundle.backend_services.len(),
        infrastructure = bundle.infrastructure.len(),
        go_dependencies = bundle.go_dependencies.len(),
        "[SOT] Parsed shared bundle"
    );
    Ok(bundle)
}

fn parse_metadata(content: &str) -> BTreeMap<String, String> {
    METADATA_PATTERNS
        .iter()
        .filter_map(|(key, re)| {
            re.captures(content)
                .and_then(|c| c.get(1))
                .map(|m| (key.to_string(), m.as_str().trim().to_string()))
        })
        .collect()
}

fn section_rows(content: &str, title: &str) -> Vec<Vec<String>> {
    match section_body(content, title, &[2]) {
        Some(body) => table_rows(body),
        None => {
            warn!(section = title, "[SOT] Section not found");
            Vec::new()
        }
    }
}

fn status_cell(section: &'static str, row: usize, value: &str) -> Result<StatusGlyph, SotError> {
    StatusGlyph::parse_cell(value).ok_or_else(|| SotError::InvalidStatus {
        section,
        row,
        value: value.to_string(),
    })
}

fn design_doc_cell(
    section: &'static str,
    row: usize,
    value: &str,
) -> Result<Option<String>, SotError> {
    let link = extract_link(value);
    if matches!(link.as_str(), "" | "-" | "—" | "N/A" | "n/a") {
        return Ok(None);
    }
    if is_relative_doc_path(&link) {
        Ok(Some(link))
    } else {
        Err(SotError::InvalidDesignPath {
            section,
            row,
            value: link,
        })
    }
}

/// A path is acceptable when it is relative, carries no URL scheme and
/// never climbs above the design root.
pub fn is_relative_doc_path(link: &str) -> bool {
    let path = link.split('#').next().unwrap_or_default();
    if path.is_empty() || path.contains("://") || path.starts_with('/') || path.starts_with('\\') {
        return false;
    }
    let mut depth: i64 = 0;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

fn parse_content_modules(content: &str) -> Result<Vec<ContentModule>, SotError> {
    const SECTION: &str = "Content Modules";
    let mut modules = Vec::new();
    for (i, cells) in section_rows(content, SECTION).into_iter().enumerate() {
        if cells.len() < 6 {
            continue;
        }
        let row = i + 1;
        modules.push(ContentModule {
            name: cells[0].clone(),
            schema: cells[1].clone(),
            status: status_cell(SECTION, row, &cells[2])?,
            primary_metadata: cells[3].clone(),
            secondary_integration: cells[4].clone(),
            design_doc: design_doc_cell(SECTION, row, &cells[5])?,
        });
    }
    debug!(count = modules.len(), "[SOT] Content modules");
    Ok(modules)
}

fn parse_backend_services(content: &str) -> Result<Vec<BackendService>, SotError> {
    const SECTION: &str = "Backend Services";
    let mut services = Vec::new();
    for (i, cells) in section_rows(content, SECTION).into_iter().enumerate() {
        if cells.len() < 5 {
            continue;
        }
        let row = i + 1;
        services.push(BackendService {
            name: cells[0].clone(),
            package: strip_backticks(&cells[1]),
            fx_module: strip_backticks(&cells[2]),
            status: status_cell(SECTION, row, &cells[3])?,
            design_doc: design_doc_cell(SECTION, row, &cells[4])?,
        });
    }
    debug!(count = services.len(), "[SOT] Backend services");
    Ok(services)
}

fn parse_infrastructure(content: &str) -> Result<Vec<InfraComponent>, SotError> {
    const SECTION: &str = "Infrastructure Components";
    let mut components = Vec::new();
    for (i, cells) in section_rows(content, SECTION).into_iter().enumerate() {
        if cells.len() < 5 {
            continue;
        }
        components.push(InfraComponent {
            name: cells[0].clone(),
            package: strip_backticks(&cells[1]),
            version: cells[2].clone(),
            purpose: cells[3].clone(),
            design_doc: design_doc_cell(SECTION, i + 1, &cells[4])?,
        });
    }
    debug!(count = components.len(), "[SOT] Infrastructure components");
    Ok(components)
}

fn parse_go_dependencies(content: &str) -> GoDependencies {
    let mut deps = GoDependencies::default();
    for (title, key) in GO_DEPENDENCY_SECTIONS {
        let Some(body) = section_body(content, title, &[2, 3]) else {
            continue;
        };
        let Some(group) = deps.group_mut(key) else {
            continue;
        };
        group.extend(
            table_rows(body)
                .into_iter()
                .filter(|cells| cells.len() >= 4)
                .map(|cells| GoDependency {
                    package: strip_backticks(&cells[0]),
                    version: cells[1].clone(),
                    purpose: cells[2].clone(),
                    notes: cells[3].clone(),
                }),
        );
    }
    deps
}

fn parse_design_principles(content: &str) -> DesignPrinciples {
    let principles = PRINCIPLE_PATTERNS
        .iter()
        .filter_map(|(key, re)| {
            re.captures(content)
                .and_then(|c| c.get(1))
                .map(|m| (key.to_string(), m.as_str().trim().to_string()))
        })
        .collect();
    let design_patterns = section_body(content, "Design Patterns", &[3])
        .map(table_rows)
        .unwrap_or_default()
        .into_iter()
        .filter(|cells| cells.len() >= 3)
        .map(|cells| DesignPattern {
            pattern: cells[0].clone(),
            decision: cells[1].clone(),
            notes: cells[2].clone(),
        })
        .collect();
    DesignPrinciples {
        principles,
        design_patterns,
    }
}

fn parse_deploy(content: &str) -> DeploySpec {
    let rows = |title: &str| {
        section_body(content, title, &[3])
            .map(table_rows)
            .unwrap_or_default()
    };
    DeploySpec {
        kubernetes_example: fenced_block_after(content, "Kubernetes Resources", "yaml"),
        swarm_example: fenced_block_after(content, "Docker Swarm Stack", "yaml"),
        helm_structure: fenced_block_after(content, "Helm Chart Structure", "")
            .map(|s| s.trim().to_string()),
        scaling: rows("Scaling Strategy")
            .into_iter()
            .filter(|c| c.len() >= 4)
            .map(|c| ScalingRule {
                component: c[0].clone(),
                min: c[1].clone(),
                max: c[2].clone(),
                trigger: c[3].clone(),
            })
            .collect(),
        health_endpoints: rows("Health Endpoints")
            .into_iter()
            .filter(|c| c.len() >= 3)
            .map(|c| HealthEndpoint {
                endpoint: strip_backticks(&c[0]),
                purpose: c[1].clone(),
                status_code: c[2].clone(),
            })
            .collect(),
        server_config: rows("Server Configuration")
            .into_iter()
            .filter(|c| c.len() >= 4)
            .map(|c| ServerSetting {
                key: strip_backticks(&c[0]),
                env: strip_backticks(&c[1]),
                kind: c[2].clone(),
                default: c[3].clone(),
            })
            .collect(),
    }
}

const BUNDLE_HEADER: &str = "# Auto-generated from SOURCE_OF_TRUTH.md by `docsync parse-sot`.\n# Do not edit directly.\n\n";

impl SharedBundle {
    pub fn to_yaml(&self) -> Result<String, SotError> {
        Ok(format!("{BUNDLE_HEADER}{}", serde_yaml::to_string(self)?))
    }

    pub fn from_yaml(text: &str) -> Result<SharedBundle, SotError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// The bundle as a generic value, for template contexts.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
