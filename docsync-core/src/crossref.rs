//! # crossref: link graph over the design docs and `DESIGN_INDEX.md`
//!
//! Every internal `[text](path.md)` link between design documents becomes an
//! edge. Cycles between documents are ordinary data; the reachability walk
//! from the Source of Truth keeps a visited set.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::atomic::{write_if_changed, WriteError, WriteOutcome};
use crate::docs_tree::{doc_title, is_index_file, markdown_files, normalize, title_case};

pub const DESIGN_INDEX_FILE: &str = "DESIGN_INDEX.md";
const MOST_CONNECTED_LIMIT: usize = 20;

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)#\s]+\.md)(?:#[^)]*)?\)").expect("static regex"));

#[derive(Debug, thiserror::Error)]
pub enum CrossrefError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Write(#[from] WriteError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocNode {
    pub title: String,
    /// Parent directory relative to the design root, `root` for top-level docs.
    pub category: String,
    pub links_to: BTreeSet<String>,
    pub linked_from: BTreeSet<String>,
}

impl DocNode {
    pub fn connections(&self) -> usize {
        self.links_to.len() + self.linked_from.len()
    }
}

/// Design docs keyed by `/`-separated path relative to the design root.
#[derive(Debug, Default)]
pub struct LinkGraph {
    pub docs: BTreeMap<String, DocNode>,
    /// Documents linked directly from the Source of Truth.
    pub sot_links: BTreeSet<String>,
}

fn rel_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Internal links of one document, resolved to design-root-relative paths.
/// Only targets that exist inside the design tree are kept.
pub fn internal_links(design_dir: &Path, doc_rel: &Path, content: &str) -> BTreeSet<String> {
    let base = doc_rel.parent().unwrap_or(Path::new(""));
    LINK_RE
        .captures_iter(content)
        .filter_map(|c| c.get(2).map(|m| m.as_str()))
        .filter(|link| !link.starts_with("http") && !link.contains("sources/"))
        .filter_map(|link| normalize(&base.join(link)))
        .filter(|target| design_dir.join(target).is_file())
        .map(|target| rel_string(&target))
        .collect()
}

fn is_skipped(rel: &Path, sot_rel: &Path) -> bool {
    is_index_file(rel)
        || rel == sot_rel
        || rel
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n == DESIGN_INDEX_FILE || n.starts_with("INDEX") || n.starts_with("00_INDEX"))
}

fn read(path: &Path) -> Result<String, CrossrefError> {
    std::fs::read_to_string(path).map_err(|source| CrossrefError::Read {
        path: path.to_path_buf(),
        source,
    })
}

impl LinkGraph {
    /// Scans `design_dir`. `sot_file` is excluded from the documents but its
    /// links seed the reachability walk.
    pub fn build(design_dir: &Path, sot_file: &Path) -> Result<LinkGraph, CrossrefError> {
        let sot_rel = sot_file
            .strip_prefix(design_dir)
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let mut graph = LinkGraph::default();

        for path in markdown_files(design_dir) {
            let Ok(rel) = path.strip_prefix(design_dir) else {
                continue;
            };
            if is_skipped(rel, &sot_rel) {
                continue;
            }
            let content = read(&path)?;
            let category = rel
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(rel_string)
                .unwrap_or_else(|| "root".to_string());
            let node = DocNode {
                title: doc_title(&content, &path),
                category,
                links_to: internal_links(design_dir, rel, &content),
                linked_from: BTreeSet::new(),
            };
            graph.docs.insert(rel_string(rel), node);
        }

        let edges: Vec<(String, String)> = graph
            .docs
            .iter()
            .flat_map(|(from, node)| node.links_to.iter().map(move |to| (from.clone(), to.clone())))
            .collect();
        for (from, to) in edges {
            if let Some(target) = graph.docs.get_mut(&to) {
                target.linked_from.insert(from);
            }
        }

        if sot_file.is_file() {
            let content = read(sot_file)?;
            graph.sot_links = internal_links(design_dir, &sot_rel, &content)
                .into_iter()
                .filter(|t| graph.docs.contains_key(t))
                .collect();
        }
        debug!(docs = graph.docs.len(), sot_links = graph.sot_links.len(), "[CROSSREF] Graph built");
        Ok(graph)
    }

    pub fn edge_count(&self) -> usize {
        self.docs.values().map(|d| d.links_to.len()).sum()
    }

    /// Documents reachable from the Source of Truth, following links
    /// breadth-first.
    pub fn reachable_from_sot(&self) -> BTreeSet<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = self.sot_links.iter().map(String::as_str).collect();
        while let Some(doc) = queue.pop_front() {
            if !seen.insert(doc) {
                continue;
            }
            if let Some(node) = self.docs.get(doc) {
                queue.extend(
                    node.links_to
                        .iter()
                        .map(String::as_str)
                        .filter(|t| !seen.contains(t)),
                );
            }
        }
        seen.into_iter()
            .filter(|d| self.docs.contains_key(*d))
            .map(str::to_string)
            .collect()
    }

    pub fn categories(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut out: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (path, node) in &self.docs {
            out.entry(node.category.as_str()).or_default().push(path);
        }
        out
    }

    pub fn orphans(&self) -> Vec<&str> {
        self.docs
            .iter()
            .filter(|(_, n)| n.connections() == 0)
            .map(|(p, _)| p.as_str())
            .collect()
    }

    /// Up to twenty connected documents, most connections first, ties by path.
    pub fn most_connected(&self) -> Vec<(&str, &DocNode)> {
        let mut ranked: Vec<(&str, &DocNode)> = self
            .docs
            .iter()
            .filter(|(_, n)| n.connections() > 0)
            .map(|(p, n)| (p.as_str(), n))
            .collect();
        ranked.sort_by(|a, b| b.1.connections().cmp(&a.1.connections()).then(a.0.cmp(b.0)));
        ranked.truncate(MOST_CONNECTED_LIMIT);
        ranked
    }

    /// `DESIGN_INDEX.md` content. `sot_name` is the SOT file name in the
    /// design root.
    pub fn render(&self, sot_name: &str) -> String {
        let categories = self.categories();
        let reachable = self.reachable_from_sot().len();
        let mut lines: Vec<String> = vec![
            "# Design Documentation Index".into(),
            String::new(),
            "> Auto-generated cross-reference index for all design documents".into(),
            String::new(),
            format!("**Source of Truth**: [{sot_name}]({sot_name})"),
            String::new(),
            "---".into(),
            String::new(),
            "## Quick Stats".into(),
            String::new(),
            format!("- **Total Documents**: {}", self.docs.len()),
            format!("- **Categories**: {}", categories.len()),
            format!("- **Internal Links**: {}", self.edge_count()),
            format!("- **Reachable from Source of Truth**: {reachable}"),
            String::new(),
            "---".into(),
            String::new(),
            "## By Category".into(),
            String::new(),
        ];

        for (category, paths) in &categories {
            let heading = title_case(&category.replace('/', " → ").replace('_', " "));
            lines.push(format!("### {heading}"));
            lines.push(String::new());
            lines.push("| Document | Links |".into());
            lines.push("|----------|-------|".into());
            for path in paths {
                let node = &self.docs[*path];
                lines.push(format!("| [{}]({path}) | {} |", node.title, node.connections()));
            }
            lines.push(String::new());
        }

        lines.extend([
            "---".into(),
            String::new(),
            "## Most Connected Documents".into(),
            String::new(),
            "> Documents with the most internal cross-references".into(),
            String::new(),
            "| Document | Links To | Linked From | Total |".into(),
            "|----------|----------|-------------|-------|".into(),
        ]);
        for (path, node) in self.most_connected() {
            lines.push(format!(
                "| [{}]({path}) | {} | {} | {} |",
                node.title,
                node.links_to.len(),
                node.linked_from.len(),
                node.connections()
            ));
        }
        lines.push(String::new());

        let orphans = self.orphans();
        if !orphans.is_empty() {
            lines.extend([
                "---".into(),
                String::new(),
                "## Orphan Documents".into(),
                String::new(),
                "> Documents with no internal cross-references (may need linking)".into(),
                String::new(),
            ]);
            for path in orphans {
                lines.push(format!("- [{}]({path})", self.docs[path].title));
            }
            lines.push(String::new());
        }

        lines.extend(["---".into(), String::new(), "*Generated by `docsync crossref`*".into(), String::new()]);
        lines.join("\n")
    }
}

#[derive(Debug)]
pub struct CrossrefReport {
    pub documents: usize,
    pub links: usize,
    pub reachable: usize,
    pub orphans: usize,
    pub target: PathBuf,
    pub outcome: WriteOutcome,
}

/// Builds the graph and writes `DESIGN_INDEX.md` into the design root when
/// `apply` is set and the content changed.
pub fn generate_crossref(
    design_dir: &Path,
    sot_file: &Path,
    apply: bool,
) -> Result<CrossrefReport, CrossrefError> {
    let graph = LinkGraph::build(design_dir, sot_file)?;
    let sot_name = sot_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let target = design_dir.join(DESIGN_INDEX_FILE);
    let outcome = write_if_changed(&target, &graph.render(&sot_name), apply)?;
    let report = CrossrefReport {
        documents: graph.docs.len(),
        links: graph.edge_count(),
        reachable: graph.reachable_from_sot().len(),
        orphans: graph.orphans().len(),
        target,
        outcome,
    };
    info!(
        documents = report.documents,
        links = report.links,
        reachable = report.reachable,
        orphans = report.orphans,
        outcome = report.outcome.as_str(),
        "[CROSSREF] Design index generated"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let d = dir.path();
        for sub in ["features", "architecture", ".archive"] {
            std::fs::create_dir_all(d.join(sub)).unwrap();
        }
        std::fs::write(
            d.join("00_SOURCE_OF_TRUTH.md"),
            "# SOT\n[Movie](features/MOVIE.md)\n",
        )
        .unwrap();
        std::fs::write(
            d.join("features/MOVIE.md"),
            "# Movie\n[Arch](../architecture/01_ARCH.md) [src](../../sources/x.md) [ext](https://a.io/b.md) [gone](MISSING.md)\n",
        )
        .unwrap();
        std::fs::write(
            d.join("architecture/01_ARCH.md"),
            "# Architecture\n[Movie](../features/MOVIE.md#schema)\n",
        )
        .unwrap();
        std::fs::write(d.join("architecture/LONELY.md"), "# Lonely\n").unwrap();
        std::fs::write(d.join("architecture/INDEX.md"), "[x](01_ARCH.md)").unwrap();
        std::fs::write(d.join(".archive/OLD.md"), "[x](../features/MOVIE.md)").unwrap();
        dir
    }

    #[test]
    fn links_are_resolved_and_filtered() {
        let dir = tree();
        let graph = LinkGraph::build(dir.path(), &dir.path().join("00_SOURCE_OF_TRUTH.md")).unwrap();
        assert_eq!(
            graph.docs.keys().cloned().collect::<Vec<_>>(),
            vec!["architecture/01_ARCH.md", "architecture/LONELY.md", "features/MOVIE.md"]
        );
        let movie = &graph.docs["features/MOVIE.md"];
        assert_eq!(movie.links_to.iter().collect::<Vec<_>>(), vec!["architecture/01_ARCH.md"]);
        assert_eq!(movie.linked_from.iter().collect::<Vec<_>>(), vec!["architecture/01_ARCH.md"]);
        assert_eq!(movie.category, "features");
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn reachability_survives_cycles() {
        let dir = tree();
        let graph = LinkGraph::build(dir.path(), &dir.path().join("00_SOURCE_OF_TRUTH.md")).unwrap();
        let reachable = graph.reachable_from_sot();
        assert_eq!(reachable.len(), 2);
        assert!(!reachable.contains("architecture/LONELY.md"));
        assert_eq!(graph.orphans(), vec!["architecture/LONELY.md"]);
    }

    #[test]
    fn design_index_is_diff_aware() {
        let dir = tree();
        let sot = dir.path().join("00_SOURCE_OF_TRUTH.md");
        let dry = generate_crossref(dir.path(), &sot, false).unwrap();
        assert_eq!(dry.outcome, WriteOutcome::WouldCreate);
        assert!(!dir.path().join(DESIGN_INDEX_FILE).exists());

        generate_crossref(dir.path(), &sot, true).unwrap();
        let text = std::fs::read_to_string(dir.path().join(DESIGN_INDEX_FILE)).unwrap();
        assert!(text.contains("- **Total Documents**: 3"));
        assert!(text.contains("- **Reachable from Source of Truth**: 2"));
        assert!(text.contains("### Architecture\n"));
        assert!(text.contains("| [Movie](features/MOVIE.md) | 1 | 1 | 2 |"));
        assert!(text.contains("## Orphan Documents"));
        assert!(text.contains("- [Lonely](architecture/LONELY.md)"));

        let again = generate_crossref(dir.path(), &sot, true).unwrap();
        assert_eq!(again.outcome, WriteOutcome::Unchanged);
        assert_eq!(again.documents, 3);
    }
}
