//! # index: per-directory `INDEX.md` for the design tree
//!
//! Every directory below the design root that directly holds documents gets
//! an index listing its subdirectories and documents. Each document carries
//! a status glyph inferred from its content. Known category paths contribute
//! curated titles, descriptions and "related" links.
//!
//! Writes are diff-aware: an index whose content is unchanged is not touched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::atomic::{write_if_changed, WriteError, WriteOutcome};
use crate::docs_tree::{
    doc_title, first_blockquote, first_paragraph, is_index_file, markdown_files, relative_path,
    title_case,
};

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Curated title, description and related categories for a design path.
#[derive(Debug, Clone, Copy)]
pub struct CategoryMeta {
    pub title: &'static str,
    pub description: &'static str,
    pub related: &'static [&'static str],
}

const CATEGORY_META: &[(&str, CategoryMeta)] = &[
    ("architecture", CategoryMeta {
        title: "Architecture Documentation",
        description: "Core system design and architectural decisions",
        related: &["technical", "features"],
    }),
    ("features", CategoryMeta {
        title: "Features Documentation",
        description: "Content modules and feature specifications",
        related: &["architecture", "integrations"],
    }),
    ("features/shared", CategoryMeta {
        title: "Shared Features",
        description: "Features that apply across all modules",
        related: &["features", "architecture"],
    }),
    ("features/playback", CategoryMeta {
        title: "Playback Features",
        description: "Media playback and streaming features",
        related: &["features/shared", "integrations/transcoding"],
    }),
    ("features/video", CategoryMeta {
        title: "Video Module",
        description: "Movies and TV Shows features",
        related: &["integrations/metadata/video", "integrations/servarr"],
    }),
    ("integrations", CategoryMeta {
        title: "External Integrations",
        description: "Third-party services and APIs",
        related: &["architecture", "technical"],
    }),
    ("integrations/metadata", CategoryMeta {
        title: "Metadata Providers",
        description: "External sources for media metadata",
        related: &["features"],
    }),
    ("integrations/metadata/video", CategoryMeta {
        title: "Video Metadata Providers",
        description: "TMDB, TVDB, OMDB, Fanart.tv",
        related: &["features/video"],
    }),
    ("integrations/auth", CategoryMeta {
        title: "Authentication Providers",
        description: "OIDC/SSO providers",
        related: &["architecture", "features/shared"],
    }),
    ("integrations/servarr", CategoryMeta {
        title: "Servarr Stack",
        description: "Media management automation (Radarr, Sonarr, etc.)",
        related: &["features/video", "operations"],
    }),
    ("integrations/infrastructure", CategoryMeta {
        title: "Infrastructure Components",
        description: "Core stack: PostgreSQL, Dragonfly, Typesense, River",
        related: &["architecture", "operations"],
    }),
    ("integrations/transcoding", CategoryMeta {
        title: "Transcoding Services",
        description: "External transcoding",
        related: &["features/playback"],
    }),
    ("operations", CategoryMeta {
        title: "Operations Documentation",
        description: "Deployment, setup, and operational guides",
        related: &["architecture", "integrations/infrastructure"],
    }),
    ("technical", CategoryMeta {
        title: "Technical Documentation",
        description: "API specs, frontend architecture, tech stack",
        related: &["architecture", "features"],
    }),
    ("research", CategoryMeta {
        title: "Research Documentation",
        description: "Technology research and evaluations",
        related: &["architecture"],
    }),
    ("services", CategoryMeta {
        title: "Services Documentation",
        description: "Internal service specifications",
        related: &["architecture", "technical"],
    }),
    ("planning", CategoryMeta {
        title: "Planning Documentation",
        description: "Project planning and roadmap",
        related: &["architecture"],
    }),
];

pub fn category_meta(dir: &str) -> Option<&'static CategoryMeta> {
    CATEGORY_META
        .iter()
        .find(|(key, _)| *key == dir)
        .map(|(_, meta)| meta)
}

static SQL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```sql|CREATE TABLE").expect("static regex"));
static GO_STRUCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"type \w+ struct").expect("static regex"));
static CHECKBOX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"- \[[ xX]\]").expect("static regex"));
static EXTERNAL_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]+\]\(https?://").expect("static regex"));

/// Content-derived document status; the first matching rule wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocStatus {
    Designed,
    Partial,
    Planned,
    Draft,
}

impl DocStatus {
    pub fn infer(content: &str, description: &str) -> DocStatus {
        let has_schema = SQL_RE.is_match(content);
        let has_go_struct = content.contains("```go") && GO_STRUCT_RE.is_match(content);
        if has_schema || has_go_struct {
            return DocStatus::Designed;
        }
        if content.contains("## Implementation") && CHECKBOX_RE.find_iter(content).count() >= 3 {
            return DocStatus::Partial;
        }
        if EXTERNAL_LINK_RE.find_iter(content).count() >= 2 || !description.is_empty() {
            return DocStatus::Planned;
        }
        DocStatus::Draft
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocStatus::Designed => "✅ Designed",
            DocStatus::Partial => "🟡 Partial",
            DocStatus::Planned => "🟡 Planned",
            DocStatus::Draft => "🔴 Draft",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocInfo {
    pub file_name: String,
    pub title: String,
    pub description: String,
    pub status: DocStatus,
}

impl DocInfo {
    pub fn from_content(path: &Path, content: &str) -> DocInfo {
        let description = first_blockquote(content)
            .or_else(|| first_paragraph(content))
            .unwrap_or_default();
        DocInfo {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            title: doc_title(content, path),
            status: DocStatus::infer(content, &description),
            description,
        }
    }
}

/// Repository-relative locations used for links in generated indexes.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    /// Filesystem location of the design root.
    pub design_dir: PathBuf,
    /// Design root relative to the repository root.
    pub design_rel: PathBuf,
    pub sot_rel: PathBuf,
    pub sources_md_rel: PathBuf,
}

#[derive(Debug, Default)]
pub struct IndexReport {
    pub outcomes: Vec<(PathBuf, WriteOutcome)>,
}

impl IndexReport {
    pub fn changed(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_change()).count()
    }

    pub fn unchanged(&self) -> usize {
        self.outcomes.len() - self.changed()
    }
}

/// Documents grouped by directory relative to the design root. Files directly
/// in the root, index files and dot-directories are excluded.
pub fn directories_with_docs(design_dir: &Path) -> BTreeMap<PathBuf, Vec<PathBuf>> {
    let mut dirs: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    for path in markdown_files(design_dir) {
        if is_index_file(&path) {
            continue;
        }
        let Some(rel_dir) = path
            .parent()
            .and_then(|p| p.strip_prefix(design_dir).ok())
            .filter(|p| !p.as_os_str().is_empty())
        else {
            continue;
        };
        dirs.entry(rel_dir.to_path_buf()).or_default().push(path);
    }
    dirs
}

fn rel_key(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn subdirectories(abs_dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(abs_dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|n| !n.starts_with('.'))
        .filter(|n| {
            let sub = abs_dir.join(n);
            sub.join("INDEX.md").exists()
                || std::fs::read_dir(&sub).is_ok_and(|mut it| {
                    it.any(|e| {
                        e.is_ok_and(|e| e.path().extension().is_some_and(|x| x == "md"))
                    })
                })
        })
        .collect();
    names.sort();
    names
}

/// `INDEX.md` content for one directory.
pub fn render_index(paths: &IndexPaths, rel_dir: &Path, docs: &[DocInfo]) -> String {
    let key = rel_key(rel_dir);
    let fallback = CategoryMeta {
        title: "",
        description: "",
        related: &[],
    };
    let meta = category_meta(&key).unwrap_or(&fallback);
    let title = if meta.title.is_empty() {
        title_case(&key.replace('/', " - ").replace('_', " "))
    } else {
        meta.title.to_string()
    };

    let abs_rel = paths.design_rel.join(rel_dir);
    let sot_link = relative_path(&abs_rel, &paths.sot_rel);
    let sot_name = sot_link.rsplit('/').next().unwrap_or(&sot_link).to_string();
    let parent_link = if key.contains('/') { ".." } else { "../" };
    let sources_link = relative_path(&abs_rel, &paths.sources_md_rel);

    let mut lines: Vec<String> = vec![
        format!("# {title}"),
        String::new(),
        format!("← Back to [Design Docs]({parent_link})"),
        String::new(),
    ];
    if !meta.description.is_empty() {
        lines.push(format!("> {}", meta.description));
        lines.push(String::new());
    }
    lines.extend([
        format!("**Source of Truth**: [{sot_name}]({sot_link})"),
        String::new(),
        "---".to_string(),
        String::new(),
    ]);

    let subdirs = subdirectories(&paths.design_dir.join(rel_dir));
    if !subdirs.is_empty() {
        lines.push("## Subdirectories".to_string());
        lines.push(String::new());
        for name in &subdirs {
            let sub_meta = category_meta(&format!("{key}/{name}"));
            let sub_title = sub_meta
                .map(|m| m.title.to_string())
                .unwrap_or_else(|| title_case(&name.replace('_', " ")));
            match sub_meta.map(|m| m.description).filter(|d| !d.is_empty()) {
                Some(desc) => lines.push(format!("- [{sub_title}]({name}/INDEX.md) - {desc}")),
                None => lines.push(format!("- [{sub_title}]({name}/INDEX.md)")),
            }
        }
        lines.extend([String::new(), "---".to_string(), String::new()]);
    }

    if !docs.is_empty() {
        lines.push("## Documents".to_string());
        lines.push(String::new());
        lines.push("| Document | Description | Status |".to_string());
        lines.push("|----------|-------------|--------|".to_string());
        let mut sorted: Vec<&DocInfo> = docs.iter().collect();
        sorted.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        for doc in sorted {
            let mut desc: String = doc.description.chars().take(60).collect();
            if doc.description.chars().count() > 60 {
                desc.push_str("...");
            }
            lines.push(format!(
                "| [{}]({}) | {} | {} |",
                doc.title,
                doc.file_name,
                desc,
                doc.status.label()
            ));
        }
        lines.extend([String::new(), "---".to_string(), String::new()]);
    }

    lines.push(format!("**Sources**: [External Sources Index]({sources_link})"));
    lines.push(String::new());

    if !meta.related.is_empty() {
        lines.push("## Related".to_string());
        lines.push(String::new());
        for related in meta.related {
            let rel_title = category_meta(related)
                .map(|m| m.title.to_string())
                .unwrap_or_else(|| title_case(&related.replace('/', " - ")));
            let link = relative_path(&abs_rel, &paths.design_rel.join(related));
            lines.push(format!("- [{rel_title}]({link}/)"));
        }
        lines.push(String::new());
    }

    lines.extend([
        "---".to_string(),
        String::new(),
        "## Status Legend".to_string(),
        String::new(),
        format!("> See [{sot_name}]({sot_link}#status-system) for full status definitions"),
        String::new(),
        "Quick reference: ✅ Complete | 🟡 Partial | 🔴 Not Started | ⚪ N/A".to_string(),
        String::new(),
    ]);
    lines.join("\n")
}

/// Regenerates every directory index; writes only when `apply` is set.
pub fn generate_indexes(paths: &IndexPaths, apply: bool) -> Result<IndexReport, IndexError> {
    let mut report = IndexReport::default();
    for (rel_dir, files) in directories_with_docs(&paths.design_dir) {
        let abs_dir = paths.design_dir.join(&rel_dir);
        let mut docs = Vec::new();
        for file in files.iter().filter(|f| f.parent() == Some(abs_dir.as_path())) {
            let content = std::fs::read_to_string(file).map_err(|source| IndexError::Read {
                path: file.clone(),
                source,
            })?;
            docs.push(DocInfo::from_content(file, &content));
        }
        let content = render_index(paths, &rel_dir, &docs);
        let target = abs_dir.join("INDEX.md");
        let outcome = write_if_changed(&target, &content, apply)?;
        debug!(path = %target.display(), outcome = outcome.as_str(), "[INDEX] Directory index");
        report.outcomes.push((target, outcome));
    }
    info!(
        indexes = report.outcomes.len(),
        changed = report.changed(),
        unchanged = report.unchanged(),
        apply,
        "[INDEX] Indexes generated"
    );
    Ok(report)
}
