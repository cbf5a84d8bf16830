//! # contract: shared vocabulary and the external-command seam
//!
//! This module holds the closed enumerations every component agrees on
//! (status glyphs, document categories, render variants) and the single
//! trait through which the pipeline talks to external CLIs (`git`, `gh`).
//!
//! ## Interface & Extensibility
//! - Implement [`CommandRunner`] to plug in a different process launcher.
//!   [`crate::runner::ProcessRunner`] is the production implementation.
//! - The trait is annotated for `mockall`, so PR automation can be tested
//!   with [`MockCommandRunner`] and without touching a real repository.
//!
//! ## Category dispatch
//! - [`DocCategory`] maps a category to its schema and template name.
//!   Categories without a dedicated schema or template fall back to `generic`.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// One of the four readiness markers used in status tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusGlyph {
    #[serde(rename = "✅")]
    Complete,
    #[serde(rename = "🟡")]
    Partial,
    #[serde(rename = "🔴")]
    NotStarted,
    #[serde(rename = "⚪")]
    NotApplicable,
}

impl StatusGlyph {
    pub const ALL: [StatusGlyph; 4] = [
        StatusGlyph::Complete,
        StatusGlyph::Partial,
        StatusGlyph::NotStarted,
        StatusGlyph::NotApplicable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusGlyph::Complete => "✅",
            StatusGlyph::Partial => "🟡",
            StatusGlyph::NotStarted => "🔴",
            StatusGlyph::NotApplicable => "⚪",
        }
    }

    /// Accepts a bare glyph or a cell that starts with one (`✅ Complete`).
    pub fn parse_cell(cell: &str) -> Option<StatusGlyph> {
        let cell = cell.trim();
        StatusGlyph::ALL
            .into_iter()
            .find(|glyph| cell.starts_with(glyph.as_str()))
    }
}

impl fmt::Display for StatusGlyph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of per-subject document categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocCategory {
    Feature,
    Service,
    Integration,
    Architecture,
    Operations,
    Technical,
    Pattern,
    Research,
    Other,
}

impl DocCategory {
    pub const ALL: [DocCategory; 9] = [
        DocCategory::Feature,
        DocCategory::Service,
        DocCategory::Integration,
        DocCategory::Architecture,
        DocCategory::Operations,
        DocCategory::Technical,
        DocCategory::Pattern,
        DocCategory::Research,
        DocCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocCategory::Feature => "feature",
            DocCategory::Service => "service",
            DocCategory::Integration => "integration",
            DocCategory::Architecture => "architecture",
            DocCategory::Operations => "operations",
            DocCategory::Technical => "technical",
            DocCategory::Pattern => "pattern",
            DocCategory::Research => "research",
            DocCategory::Other => "other",
        }
    }

    /// Infers the category from the first component of a path relative to the design root.
    pub fn from_design_path(rel: &Path) -> DocCategory {
        let first = rel
            .components()
            .next()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .unwrap_or_default();
        match first.as_str() {
            "features" => DocCategory::Feature,
            "services" => DocCategory::Service,
            "integrations" => DocCategory::Integration,
            "architecture" => DocCategory::Architecture,
            "operations" => DocCategory::Operations,
            "technical" => DocCategory::Technical,
            "design_patterns" | "patterns" => DocCategory::Pattern,
            "research" => DocCategory::Research,
            _ => DocCategory::Other,
        }
    }

    /// Schema key; only categories with a dedicated schema return their own name.
    pub fn schema_name(&self) -> &'static str {
        match self {
            DocCategory::Feature | DocCategory::Service | DocCategory::Integration => {
                self.as_str()
            }
            _ => "generic",
        }
    }

    pub fn template_name(&self) -> String {
        format!("{}.md.jinja", self.schema_name())
    }
}

impl std::str::FromStr for DocCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown doc_category '{s}'"))
    }
}

impl fmt::Display for DocCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the two rendered outputs a template pass produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Internal design doc: every technical detail.
    Design,
    /// Public wiki page.
    Wiki,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Design => "design",
            Variant::Wiki => "wiki",
        }
    }
}

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` timed out after {secs}s")]
    Timeout { program: String, secs: u64 },
}

/// Runs an external program and captures its output.
///
/// A non-zero exit is not an error at this level: callers inspect
/// [`CommandOutput::status`] and decide whether the step is a hard gate.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandOutput, CommandError>;
}
