//! # md_parser: hand-written design docs into seed YAML records
//!
//! Reads one per-subject Markdown file and extracts what can be recovered
//! mechanically: title, `SOURCES:` / `DESIGN:` breadcrumb comments, the
//! seven-dimension status table, the category implied by the file's place in
//! the design tree, and the top-level `##` sections. The result is a
//! [`SeedRecord`] whose YAML form is the starting point for a subject's data
//! file; placeholder fields are left for a human to complete.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::contract::{DocCategory, StatusGlyph};
use crate::markdown::{first_title, split_row};
use crate::sources::{ResolvedSource, SourcesIndex};

#[derive(Debug, thiserror::Error)]
pub enum MdParseError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialise seed record: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// The seven readiness axes, in table order.
pub const STATUS_DIMENSIONS: [(&str, &str); 7] = [
    ("design", "Design"),
    ("sources", "Sources"),
    ("instructions", "Instructions"),
    ("code", "Code"),
    ("linting", "Linting"),
    ("unit_testing", "Unit Testing"),
    ("integration_testing", "Integration Testing"),
];

const GENERATED_SECTIONS: [&str; 3] = [
    "Table of Contents",
    "Related Design Docs",
    "Sources & Cross-References",
];

static SOURCES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<!--\s*SOURCES:\s*(.+?)\s*-->").expect("static regex"));
static DESIGN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<!--\s*DESIGN:\s*(.+?)\s*-->").expect("static regex"));
static SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^##\s+(.+?)\s*$").expect("static regex"));
static NUMBERED_DOC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}_[A-Z_]+$").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionStatus {
    pub glyph: String,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignRef {
    pub title: String,
    pub path: String,
}

/// Everything recovered from one Markdown file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDoc {
    pub doc_title: Option<String>,
    pub doc_category: DocCategory,
    pub source_ids: Vec<String>,
    pub design_ids: Vec<String>,
    /// In [`STATUS_DIMENSIONS`] order; `None` when the doc has no status table.
    pub statuses: Option<Vec<DimensionStatus>>,
    pub sections: Vec<Section>,
}

impl ParsedDoc {
    pub fn status(&self, dimension: &str) -> Option<&DimensionStatus> {
        let idx = STATUS_DIMENSIONS.iter().position(|(key, _)| *key == dimension)?;
        self.statuses.as_ref().and_then(|s| s.get(idx))
    }

    /// Mirrors the design dimension.
    pub fn overall_status(&self) -> Option<&str> {
        self.status("design").map(|s| s.glyph.as_str())
    }
}

/// Seed YAML record. Field order here is the order written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedRecord {
    pub doc_title: String,
    pub doc_category: DocCategory,
    pub created_date: String,
    pub overall_status: String,
    pub status_design: String,
    pub status_design_notes: String,
    pub status_sources: String,
    pub status_sources_notes: String,
    pub status_instructions: String,
    pub status_instructions_notes: String,
    pub status_code: String,
    pub status_code_notes: String,
    pub status_linting: String,
    pub status_linting_notes: String,
    pub status_unit_testing: String,
    pub status_unit_testing_notes: String,
    pub status_integration_testing: String,
    pub status_integration_testing_notes: String,
    pub technical_summary: String,
    pub wiki_tagline: String,
    pub wiki_overview: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<ResolvedSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub design_refs: Vec<DesignRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<Section>,
}

pub fn parse_file(path: &Path, design_root: &Path) -> Result<ParsedDoc, MdParseError> {
    let content = std::fs::read_to_string(path).map_err(|source| MdParseError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let rel = path.strip_prefix(design_root).unwrap_or(path);
    info!(path = %path.display(), "Parsing design doc");
    Ok(parse_markdown(&content, rel))
}

/// Parses Markdown text; `rel_path` is the file's path relative to the design root.
pub fn parse_markdown(content: &str, rel_path: &Path) -> ParsedDoc {
    ParsedDoc {
        doc_title: first_title(content),
        doc_category: DocCategory::from_design_path(rel_path),
        source_ids: comment_ids(&SOURCES_RE, content),
        design_ids: comment_ids(&DESIGN_RE, content),
        statuses: parse_status_table(content),
        sections: extract_sections(content),
    }
}

fn comment_ids(re: &Regex, content: &str) -> Vec<String> {
    re.captures(content)
        .and_then(|c| c.get(1))
        .map(|m| {
            m.as_str()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn is_status_header(cells: &[String]) -> bool {
    cells.len() >= 2
        && cells[0].eq_ignore_ascii_case("Dimension")
        && cells[1].eq_ignore_ascii_case("Status")
}

/// Locates the `| Dimension | Status |` table and reads its rows.
///
/// Rows are matched to dimensions by label; an unlabelled row falls back to
/// its position. Dimensions missing from the table default to not-started.
pub fn parse_status_table(content: &str) -> Option<Vec<DimensionStatus>> {
    let lines: Vec<&str> = content.lines().collect();
    let header = lines
        .iter()
        .position(|l| l.trim_start().starts_with('|') && is_status_header(&split_row(l)))?;
    let separator = lines.get(header + 1)?;
    if !separator.trim_start().starts_with("|-") && !separator.trim_start().starts_with("| -") {
        return None;
    }

    let mut statuses: Vec<DimensionStatus> = STATUS_DIMENSIONS
        .iter()
        .map(|_| DimensionStatus {
            glyph: StatusGlyph::NotStarted.to_string(),
            notes: "-".to_string(),
        })
        .collect();

    let rows = lines[header + 2..]
        .iter()
        .take_while(|l| l.trim_start().starts_with('|'))
        .take(STATUS_DIMENSIONS.len());
    for (position, line) in rows.enumerate() {
        let cells = split_row(line);
        if cells.len() < 2 {
            continue;
        }
        let label = cells[0].trim_matches('*').trim();
        let idx = STATUS_DIMENSIONS
            .iter()
            .position(|(_, name)| name.eq_ignore_ascii_case(label))
            .unwrap_or(position);
        let notes = cells
            .get(2)
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .unwrap_or("-");
        statuses[idx] = DimensionStatus {
            glyph: cells[1].clone(),
            notes: notes.to_string(),
        };
    }
    Some(statuses)
}

/// Top-level `##` sections, minus the auto-generated ones.
pub fn extract_sections(content: &str) -> Vec<Section> {
    let matches: Vec<_> = SECTION_RE.captures_iter(content).collect();
    let mut sections = Vec::new();
    for (i, caps) in matches.iter().enumerate() {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let name = name.as_str().trim();
        let end = matches
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(content.len());
        if GENERATED_SECTIONS.contains(&name) {
            continue;
        }
        sections.push(Section {
            name: name.to_string(),
            content: content[whole.end()..end].trim().to_string(),
        });
    }
    sections
}

/// Maps a `DESIGN:` id to a path under the design root.
pub fn resolve_design_path(design_id: &str) -> String {
    let upper = design_id.to_uppercase();
    if matches!(
        upper.as_str(),
        "OPERATIONS" | "ARCHITECTURE" | "SERVICES" | "FEATURES"
    ) {
        format!("{}/INDEX.md", design_id.to_lowercase())
    } else if NUMBERED_DOC_RE.is_match(design_id) {
        format!("architecture/{design_id}.md")
    } else {
        format!("{design_id}.md")
    }
}

impl ParsedDoc {
    /// Builds the seed record, resolving source ids against `sources`.
    pub fn to_seed(&self, sources: &SourcesIndex, created_date: &str) -> SeedRecord {
        if self.statuses.is_none() {
            warn!(title = ?self.doc_title, "No status table found, defaulting every dimension");
        }
        let status = |dim: &str| {
            self.status(dim).cloned().unwrap_or(DimensionStatus {
                glyph: StatusGlyph::NotStarted.to_string(),
                notes: "-".to_string(),
            })
        };
        let design = status("design");
        let sources_list = status("sources");
        let instructions = status("instructions");
        let code = status("code");
        let linting = status("linting");
        let unit = status("unit_testing");
        let integration = status("integration_testing");

        SeedRecord {
            doc_title: self
                .doc_title
                .clone()
                .unwrap_or_else(|| "PLACEHOLDER".to_string()),
            doc_category: self.doc_category,
            created_date: created_date.to_string(),
            overall_status: design.glyph.clone(),
            status_design: design.glyph,
            status_design_notes: design.notes,
            status_sources: sources_list.glyph,
            status_sources_notes: sources_list.notes,
            status_instructions: instructions.glyph,
            status_instructions_notes: instructions.notes,
            status_code: code.glyph,
            status_code_notes: code.notes,
            status_linting: linting.glyph,
            status_linting_notes: linting.notes,
            status_unit_testing: unit.glyph,
            status_unit_testing_notes: unit.notes,
            status_integration_testing: integration.glyph,
            status_integration_testing_notes: integration.notes,
            technical_summary: "PLACEHOLDER: Brief technical summary".to_string(),
            wiki_tagline: "PLACEHOLDER: User-friendly tagline".to_string(),
            wiki_overview: "PLACEHOLDER: User-friendly overview".to_string(),
            sources: self.source_ids.iter().map(|id| sources.resolve(id)).collect(),
            design_refs: self
                .design_ids
                .iter()
                .map(|id| DesignRef {
                    title: id.clone(),
                    path: resolve_design_path(id),
                })
                .collect(),
            sections: self.sections.clone(),
        }
    }
}

impl SeedRecord {
    pub fn to_yaml(&self, source_file: &str) -> Result<String, MdParseError> {
        let header = format!(
            "# Seed YAML extracted from {source_file}\n# Created: {}\n#\n# Complete the PLACEHOLDER fields and review auto-resolved sources.\n\n",
            self.created_date
        );
        Ok(format!("{header}{}", serde_yaml::to_string(self)?))
    }
}
