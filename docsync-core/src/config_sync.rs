//! # config_sync: one-way version sync from the Shared Bundle into repo configs
//!
//! Each [`SyncSite`] is a family of files plus targeted substitutions that
//! rewrite only a version token. Surrounding text, image suffixes such as
//! `-alpine` and quoting are left as they are.
//!
//! ## Error Handling
//! A missing file is skipped. A missing fact is counted as an error for
//! every existing file that needs it, and the file is left untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::{debug, info, warn};

use crate::atomic::{write_if_changed, WriteError};
use crate::config::SyncConfig;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Version facts taken from the SOT metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionFacts {
    pub go: Option<String>,
    pub node: Option<String>,
    pub python: Option<String>,
    pub postgres: Option<String>,
}

static GO_FACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.\d+)").expect("static regex"));
static DOTTED_FACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)*)").expect("static regex"));
static MAJOR_FACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)").expect("static regex"));

fn capture(re: &Regex, value: Option<&String>) -> Option<String> {
    value
        .and_then(|v| re.captures(v))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

impl VersionFacts {
    pub fn from_metadata(metadata: &BTreeMap<String, String>) -> VersionFacts {
        VersionFacts {
            go: capture(&GO_FACT_RE, metadata.get("go_version")),
            node: capture(&DOTTED_FACT_RE, metadata.get("nodejs_version")),
            python: capture(&DOTTED_FACT_RE, metadata.get("python_version")),
            postgres: capture(&MAJOR_FACT_RE, metadata.get("postgresql_version")),
        }
    }

    fn get(&self, fact: Fact) -> Option<&str> {
        match fact {
            Fact::Go => self.go.as_deref(),
            Fact::Node => self.node.as_deref(),
            Fact::Python => self.python.as_deref(),
            Fact::Postgres => self.postgres.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fact {
    Go,
    Node,
    Python,
    Postgres,
}

impl Fact {
    fn label(&self) -> &'static str {
        match self {
            Fact::Go => "Go version",
            Fact::Node => "Node.js version",
            Fact::Python => "Python version",
            Fact::Postgres => "PostgreSQL version",
        }
    }
}

/// One substitution: group 1 is kept, the version after it is replaced.
struct Rule {
    fact: Fact,
    /// Rules that are not required are skipped when their fact is missing.
    required: bool,
    pattern: &'static LazyLock<Regex>,
}

static TOOL_GO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(golang )\d+\.\d+(?:\.\d+)?").expect("static regex"));
static TOOL_NODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(nodejs )\d+(?:\.\d+)*").expect("static regex"));
static TOOL_PYTHON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(python )\d+(?:\.\d+)*").expect("static regex"));
static GO_MOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(go )\d+\.\d+$").expect("static regex"));
static WORKFLOW_GO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(go-version:\s*['"]?)\d+\.\d+(?:\.\d+)?"#).expect("static regex")
});
static DOCKER_GO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(FROM golang:)\d+\.\d+(?:\.\d+)?").expect("static regex"));
static POSTGRES_IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(postgres:)\d+(?:\.\d+)*").expect("static regex"));

static TOOL_VERSIONS_RULES: &[Rule] = &[
    Rule { fact: Fact::Go, required: true, pattern: &TOOL_GO_RE },
    Rule { fact: Fact::Node, required: false, pattern: &TOOL_NODE_RE },
    Rule { fact: Fact::Python, required: false, pattern: &TOOL_PYTHON_RE },
];
static GO_MOD_RULES: &[Rule] = &[Rule { fact: Fact::Go, required: true, pattern: &GO_MOD_RE }];
static WORKFLOW_RULES: &[Rule] =
    &[Rule { fact: Fact::Go, required: true, pattern: &WORKFLOW_GO_RE }];
static DOCKERFILE_RULES: &[Rule] =
    &[Rule { fact: Fact::Go, required: true, pattern: &DOCKER_GO_RE }];
static POSTGRES_RULES: &[Rule] =
    &[Rule { fact: Fact::Postgres, required: true, pattern: &POSTGRES_IMAGE_RE }];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SyncSite {
    ToolVersions,
    GoMod,
    Workflows,
    Dockerfiles,
    Compose,
    HelmValues,
}

impl SyncSite {
    pub const ALL: [SyncSite; 6] = [
        SyncSite::ToolVersions,
        SyncSite::GoMod,
        SyncSite::Workflows,
        SyncSite::Dockerfiles,
        SyncSite::Compose,
        SyncSite::HelmValues,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncSite::ToolVersions => ".tool-versions",
            SyncSite::GoMod => "go.mod",
            SyncSite::Workflows => "workflows",
            SyncSite::Dockerfiles => "dockerfiles",
            SyncSite::Compose => "compose",
            SyncSite::HelmValues => "helm-values",
        }
    }

    fn rules(&self) -> &'static [Rule] {
        match self {
            SyncSite::ToolVersions => TOOL_VERSIONS_RULES,
            SyncSite::GoMod => GO_MOD_RULES,
            SyncSite::Workflows => WORKFLOW_RULES,
            SyncSite::Dockerfiles => DOCKERFILE_RULES,
            SyncSite::Compose | SyncSite::HelmValues => POSTGRES_RULES,
        }
    }

    /// Candidate files for this site, relative paths resolved against `root`.
    fn files(&self, root: &Path, cfg: &SyncConfig) -> Vec<PathBuf> {
        match self {
            SyncSite::ToolVersions => vec![root.join(".tool-versions")],
            SyncSite::GoMod => vec![root.join("go.mod")],
            SyncSite::Workflows => {
                let dir = root.join(&cfg.workflows_dir);
                let Ok(entries) = std::fs::read_dir(&dir) else {
                    return Vec::new();
                };
                let mut files: Vec<PathBuf> = entries
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| p.extension().is_some_and(|x| x == "yml" || x == "yaml"))
                    .collect();
                files.sort();
                files
            }
            SyncSite::Dockerfiles => cfg.dockerfiles.iter().map(|p| root.join(p)).collect(),
            SyncSite::Compose => cfg.compose_files.iter().map(|p| root.join(p)).collect(),
            SyncSite::HelmValues if cfg.helm_values.is_empty() => {
                let Ok(entries) = std::fs::read_dir(root.join("charts")) else {
                    return Vec::new();
                };
                let mut files: Vec<PathBuf> = entries
                    .flatten()
                    .map(|e| e.path().join("values.yaml"))
                    .collect();
                files.sort();
                files
            }
            SyncSite::HelmValues => cfg.helm_values.iter().map(|p| root.join(p)).collect(),
        }
    }
}

impl fmt::Display for SyncSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub updated: usize,
    pub unchanged: usize,
    pub errors: usize,
}

impl SyncStats {
    fn add(&mut self, other: SyncStats) {
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.errors += other.errors;
    }
}

/// One rewritten line, for the diff summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub site: SyncSite,
    pub from_line: String,
    pub to_line: String,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub sites: BTreeMap<SyncSite, SyncStats>,
    pub changes: Vec<FileChange>,
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn total(&self) -> SyncStats {
        let mut total = SyncStats::default();
        for stats in self.sites.values() {
            total.add(*stats);
        }
        total
    }

    pub fn has_errors(&self) -> bool {
        self.total().errors > 0
    }
}

/// Applies `rules` to `content`. Returns the new text, or the label of the
/// first required fact that is missing.
fn apply_rules(content: &str, rules: &[Rule], facts: &VersionFacts) -> Result<String, &'static str> {
    let mut text = content.to_string();
    for rule in rules {
        let Some(version) = facts.get(rule.fact) else {
            if rule.required {
                return Err(rule.fact.label());
            }
            continue;
        };
        text = rule
            .pattern
            .replace_all(&text, |caps: &Captures| format!("{}{version}", &caps[1]))
            .into_owned();
    }
    Ok(text)
}

fn line_changes(path: &Path, site: SyncSite, old: &str, new: &str) -> Vec<FileChange> {
    old.lines()
        .zip(new.lines())
        .filter(|(a, b)| a != b)
        .map(|(a, b)| FileChange {
            path: path.to_path_buf(),
            site,
            from_line: a.to_string(),
            to_line: b.to_string(),
        })
        .collect()
}

/// Rewrites every site under `root`; with `apply == false` only reports.
pub fn sync_configs(
    root: &Path,
    cfg: &SyncConfig,
    facts: &VersionFacts,
    apply: bool,
) -> Result<SyncReport, SyncError> {
    let mut report = SyncReport::default();
    for site in SyncSite::ALL {
        let mut stats = SyncStats::default();
        for path in site.files(root, cfg) {
            if !path.is_file() {
                info!(site = %site, path = %path.display(), "[SYNC] File not present, skipping");
                continue;
            }
            let content = std::fs::read_to_string(&path).map_err(|source| SyncError::Read {
                path: path.clone(),
                source,
            })?;
            let updated = match apply_rules(&content, site.rules(), facts) {
                Ok(text) => text,
                Err(missing) => {
                    warn!(site = %site, path = %path.display(), fact = missing, "[SYNC][ERROR] Fact missing from SOT");
                    report
                        .errors
                        .push(format!("{}: {missing} not found in SOT", path.display()));
                    stats.errors += 1;
                    continue;
                }
            };
            if updated == content {
                debug!(site = %site, path = %path.display(), "[SYNC] Up to date");
                stats.unchanged += 1;
                continue;
            }
            report.changes.extend(line_changes(&path, site, &content, &updated));
            let outcome = write_if_changed(&path, &updated, apply)?;
            info!(site = %site, path = %path.display(), outcome = outcome.as_str(), "[SYNC] Config rewritten");
            stats.updated += 1;
        }
        report.sites.insert(site, stats);
    }
    let total = report.total();
    info!(
        updated = total.updated,
        unchanged = total.unchanged,
        errors = total.errors,
        apply,
        "[SYNC] Config sync complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn facts() -> VersionFacts {
        let metadata: BTreeMap<String, String> = [
            ("go_version", "1.25+"),
            ("nodejs_version", "20.x LTS"),
            ("postgresql_version", "18+ (ONLY)"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        VersionFacts::from_metadata(&metadata)
    }

    #[test]
    fn facts_are_extracted_from_metadata() {
        let f = facts();
        assert_eq!(f.go.as_deref(), Some("1.25"));
        assert_eq!(f.node.as_deref(), Some("20"));
        assert_eq!(f.python, None);
        assert_eq!(f.postgres.as_deref(), Some("18"));
    }

    #[test]
    fn substitutions_touch_only_the_version() {
        struct TestCase {
            site: SyncSite,
            input: &'static str,
            expected: &'static str,
        }
        let cases = [
            TestCase {
                site: SyncSite::ToolVersions,
                input: "golang 1.23.4\nnodejs 18.2.0\npython 3.11\n",
                expected: "golang 1.25\nnodejs 20\npython 3.11\n",
            },
            TestCase {
                site: SyncSite::GoMod,
                input: "module example.com/app\n\ngo 1.23\n\ntoolchain go1.23.4\n",
                expected: "module example.com/app\n\ngo 1.25\n\ntoolchain go1.23.4\n",
            },
            TestCase {
                site: SyncSite::Workflows,
                input: "      - uses: actions/setup-go@v5\n        with:\n          go-version: '1.22.1'\n",
                expected: "      - uses: actions/setup-go@v5\n        with:\n          go-version: '1.25'\n",
            },
            TestCase {
                site: SyncSite::Dockerfiles,
                input: "FROM golang:1.23-alpine AS build\nFROM alpine:3.20\n",
                expected: "FROM golang:1.25-alpine AS build\nFROM alpine:3.20\n",
            },
            TestCase {
                site: SyncSite::Compose,
                input: "services:\n  db:\n    image: postgres:17-alpine\n",
                expected: "services:\n  db:\n    image: postgres:18-alpine\n",
            },
        ];
        for case in cases {
            let out = apply_rules(case.input, case.site.rules(), &facts()).unwrap();
            assert_eq!(out, case.expected, "site {}", case.site);
        }
    }

    #[test]
    fn missing_required_fact_is_reported() {
        let f = VersionFacts::default();
        assert_eq!(apply_rules("go 1.23\n", GO_MOD_RULES, &f), Err("Go version"));
        let only_go = VersionFacts {
            go: Some("1.25".into()),
            ..Default::default()
        };
        assert_eq!(
            apply_rules("golang 1.24\nnodejs 18\n", TOOL_VERSIONS_RULES, &only_go).unwrap(),
            "golang 1.25\nnodejs 18\n"
        );
    }

    #[test]
    fn dry_run_reports_and_leaves_files_alone() {
        let dir = tempfile::tempdir().unwrap();
        let go_mod = dir.path().join("go.mod");
        let original = "module example.com/app\n\ngo 1.23\n";
        std::fs::write(&go_mod, original).unwrap();

        let report = sync_configs(dir.path(), &SyncConfig::default(), &facts(), false).unwrap();
        assert_eq!(report.sites[&SyncSite::GoMod].updated, 1);
        assert_eq!(report.total(), SyncStats { updated: 1, unchanged: 0, errors: 0 });
        assert_eq!(
            report.changes,
            vec![FileChange {
                path: go_mod.clone(),
                site: SyncSite::GoMod,
                from_line: "go 1.23".into(),
                to_line: "go 1.25".into(),
            }]
        );
        assert_eq!(std::fs::read_to_string(&go_mod).unwrap(), original);
    }

    #[test]
    fn apply_writes_and_second_run_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("charts/app")).unwrap();
        std::fs::write(dir.path().join("charts/app/values.yaml"), "image: postgres:16.4\n").unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM golang:1.25-alpine\n").unwrap();

        let first = sync_configs(dir.path(), &SyncConfig::default(), &facts(), true).unwrap();
        assert_eq!(first.sites[&SyncSite::HelmValues].updated, 1);
        assert_eq!(first.sites[&SyncSite::Dockerfiles].unchanged, 1);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("charts/app/values.yaml")).unwrap(),
            "image: postgres:18\n"
        );

        let second = sync_configs(dir.path(), &SyncConfig::default(), &facts(), true).unwrap();
        assert_eq!(second.total().updated, 0);
        assert!(second.changes.is_empty());
    }

    #[test]
    fn missing_fact_counts_an_error_per_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("go.mod"), "go 1.23\n").unwrap();
        let report =
            sync_configs(dir.path(), &SyncConfig::default(), &VersionFacts::default(), true).unwrap();
        assert_eq!(report.total().errors, 1);
        assert!(report.has_errors());
        assert_eq!(std::fs::read_to_string(dir.path().join("go.mod")).unwrap(), "go 1.23\n");
    }
}
