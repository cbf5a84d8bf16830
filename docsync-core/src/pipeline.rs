//! # pipeline: one regeneration run over the whole repository
//!
//! Steps run in dependency order: SOT parse, document generation, indexes,
//! cross-references, config sync, deployment files and, strictly last, the
//! optional pull request.
//!
//! ## Error Handling
//! A failing step is recorded in the [`RunSummary`] and the run goes on.
//! Config sync and deploy need the Shared Bundle, so they are skipped (and
//! counted as failed) when the SOT cannot be parsed. A blocked PR gate is
//! not a failure.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::atomic::write_if_changed;
use crate::config::DocsyncConfig;
use crate::config_sync::{sync_configs, VersionFacts};
use crate::contract::CommandRunner;
use crate::crossref::generate_crossref;
use crate::deploy::{generate_deploy, DeployPaths};
use crate::generator::{DocGenerator, GenerateError, GenerateOptions, GeneratorPaths};
use crate::index::{generate_indexes, IndexPaths};
use crate::pr::{PrCreator, PrOutcome, Trigger};
use crate::schema::SchemaRegistry;
use crate::sot_parser::{parse_sot_file, SharedBundle};
use crate::sources::SourcesIndex;

/// Pass/fail counts of one component, with the lines worth printing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentResult {
    pub name: &'static str,
    pub passed: usize,
    pub failed: usize,
    pub details: Vec<String>,
}

impl ComponentResult {
    pub fn new(name: &'static str) -> Self {
        ComponentResult {
            name,
            ..Default::default()
        }
    }

    fn pass(mut self, detail: impl Into<String>) -> Self {
        self.passed += 1;
        self.details.push(detail.into());
        self
    }

    fn fail(mut self, detail: impl Into<String>) -> Self {
        self.failed += 1;
        self.details.push(detail.into());
        self
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub components: Vec<ComponentResult>,
    /// One line per failed document or file.
    pub failures: Vec<String>,
    pub pr: Option<PrOutcome>,
}

impl RunSummary {
    pub fn record(&mut self, result: ComponentResult) {
        info!(
            component = result.name,
            passed = result.passed,
            failed = result.failed,
            "[PIPELINE] Component finished"
        );
        self.components.push(result);
    }

    pub fn component(&self, name: &str) -> Option<&ComponentResult> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn passed(&self) -> usize {
        self.components.iter().map(|c| c.passed).sum()
    }

    pub fn failed(&self) -> usize {
        self.components.iter().map(|c| c.failed).sum()
    }

    pub fn hard_failure(&self) -> bool {
        self.failed() > 0
    }

    pub fn exit_code(&self) -> i32 {
        i32::from(self.hard_failure())
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.components {
            writeln!(f, "{:<12} {} passed, {} failed", c.name, c.passed, c.failed)?;
            for line in &c.details {
                writeln!(f, "  {line}")?;
            }
        }
        if !self.failures.is_empty() {
            writeln!(f, "\nFailures:")?;
            for line in &self.failures {
                writeln!(f, "  {line}")?;
            }
        }
        let verdict = if self.hard_failure() { "FAILED" } else { "OK" };
        writeln!(f, "\nResult: {verdict} ({} passed, {} failed)", self.passed(), self.failed())
    }
}

/// Human-readable form of a PR step result.
pub fn describe_pr(outcome: &PrOutcome) -> String {
    match outcome {
        PrOutcome::Blocked { reason } => format!("skipped: {reason}"),
        PrOutcome::NothingToCommit => "no changes to commit".to_string(),
        PrOutcome::DryRun { plan } => format!(
            "would open '{}' from {} with {} file(s){}",
            plan.title,
            plan.branch,
            plan.files.len(),
            if plan.docs_only { ", auto-merge" } else { "" }
        ),
        PrOutcome::Created { url, auto_merge } => {
            let merge = if *auto_merge { " (auto-merge enabled)" } else { "" };
            format!("created {url}{merge}")
        }
    }
}

/// Every step of a run, each usable on its own by the CLI.
pub struct Pipeline {
    cfg: DocsyncConfig,
    runner: Arc<dyn CommandRunner>,
}

impl Pipeline {
    pub fn new(cfg: DocsyncConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Pipeline { cfg, runner }
    }

    pub fn config(&self) -> &DocsyncConfig {
        &self.cfg
    }

    /// Parses the SOT without writing anything.
    pub fn load_bundle(&self, summary: &mut RunSummary, step: &'static str) -> Option<SharedBundle> {
        let sot = self.cfg.sot_path();
        match parse_sot_file(&sot) {
            Ok(bundle) => Some(bundle),
            Err(e) => {
                error!(path = %sot.display(), error = %e, "[PIPELINE][ERROR] SOT parse failed");
                summary.failures.push(format!("{}: {e}", sot.display()));
                summary.record(ComponentResult::new(step).fail(format!("{}: {e}", sot.display())));
                None
            }
        }
    }

    /// Parses the SOT and writes the Shared Bundle file.
    pub fn parse_sot(&self, apply: bool, summary: &mut RunSummary) -> Option<SharedBundle> {
        let bundle = self.load_bundle(summary, "parse-sot")?;
        let target = self.cfg.shared_data_path();
        let written = bundle
            .to_yaml()
            .map_err(|e| e.to_string())
            .and_then(|yaml| write_if_changed(&target, &yaml, apply).map_err(|e| e.to_string()));
        let result = match written {
            Ok(outcome) => ComponentResult::new("parse-sot")
                .pass(format!("{}: {}", target.display(), outcome.as_str())),
            Err(e) => {
                summary.failures.push(format!("{}: {e}", target.display()));
                ComponentResult::new("parse-sot").fail(format!("{}: {e}", target.display()))
            }
        };
        summary.record(result);
        Some(bundle)
    }

    pub fn generator_paths(&self) -> GeneratorPaths {
        GeneratorPaths {
            data_dir: self.cfg.data_path(),
            shared_data_file: self.cfg.shared_data_path(),
            design_dir: self.cfg.design_path(),
            wiki_dir: self.cfg.wiki_path(),
        }
    }

    pub fn doc_generator(&self) -> Result<DocGenerator, GenerateError> {
        let sources = SourcesIndex::load(&self.cfg.sources_index_path())?;
        let schemas = SchemaRegistry::load(self.cfg.schemas_path().as_deref())?;
        let generator = DocGenerator::new(
            self.generator_paths(),
            self.cfg.templates_path().as_deref(),
            Arc::new(sources),
            &self.cfg.sources_prefix,
        )?;
        Ok(generator.with_schemas(schemas))
    }

    pub fn generate(&self, options: &GenerateOptions, summary: &mut RunSummary) {
        let generator = match self.doc_generator() {
            Ok(g) => g,
            Err(e) => {
                error!(error = %e, "[PIPELINE][ERROR] Generator setup failed");
                summary.record(ComponentResult::new("generate").fail(e.to_string()));
                return;
            }
        };
        let report = generator.generate_all(options);
        let mut result = ComponentResult::new("generate");
        result.passed = report.passed();
        result.failed = report.failed();
        for doc in &report.documents {
            let changed = doc.outputs.iter().any(|o| o.outcome.is_change());
            if !doc.ok() {
                summary.failures.push(doc.summary_line());
            } else if changed {
                result.details.push(doc.summary_line());
            }
        }
        for (path, message) in &report.rejected {
            summary.failures.push(format!("{}: {message}", path.display()));
        }
        summary.record(result);
    }

    pub fn indexes(&self, apply: bool, summary: &mut RunSummary) {
        let paths = IndexPaths {
            design_dir: self.cfg.design_path(),
            design_rel: self.cfg.design_dir.clone(),
            sot_rel: self.cfg.sot_file.clone(),
            sources_md_rel: self.cfg.sources_md(),
        };
        let result = match generate_indexes(&paths, apply) {
            Ok(report) => {
                let mut result = ComponentResult::new("index");
                result.passed = report.outcomes.len();
                for (path, outcome) in report.outcomes.iter().filter(|(_, o)| o.is_change()) {
                    result.details.push(format!("{}: {}", path.display(), outcome.as_str()));
                }
                result
            }
            Err(e) => {
                summary.failures.push(e.to_string());
                ComponentResult::new("index").fail(e.to_string())
            }
        };
        summary.record(result);
    }

    pub fn crossref(&self, apply: bool, summary: &mut RunSummary) {
        let result = match generate_crossref(&self.cfg.design_path(), &self.cfg.sot_path(), apply) {
            Ok(report) => ComponentResult::new("crossref").pass(format!(
                "{}: {} ({} docs, {} links, {} reachable, {} orphans)",
                report.target.display(),
                report.outcome.as_str(),
                report.documents,
                report.links,
                report.reachable,
                report.orphans
            )),
            Err(e) => {
                summary.failures.push(e.to_string());
                ComponentResult::new("crossref").fail(e.to_string())
            }
        };
        summary.record(result);
    }

    pub fn sync_config(&self, bundle: Option<&SharedBundle>, apply: bool, summary: &mut RunSummary) {
        let Some(bundle) = bundle else {
            warn!("[PIPELINE] Config sync skipped, no Shared Bundle");
            summary.record(ComponentResult::new("sync-config").fail("skipped: SOT not parsed"));
            return;
        };
        let facts = VersionFacts::from_metadata(&bundle.metadata);
        let result = match sync_configs(&self.cfg.root, &self.cfg.sync, &facts, apply) {
            Ok(report) => {
                let total = report.total();
                let mut result = ComponentResult::new("sync-config");
                result.passed = total.updated + total.unchanged;
                result.failed = total.errors;
                for (site, stats) in &report.sites {
                    result.details.push(format!(
                        "{site}: {} updated, {} unchanged, {} errors",
                        stats.updated, stats.unchanged, stats.errors
                    ));
                }
                for change in &report.changes {
                    result.details.push(format!(
                        "{}: {} -> {}",
                        change.path.display(),
                        change.from_line.trim(),
                        change.to_line.trim()
                    ));
                }
                summary.failures.extend(report.errors.iter().cloned());
                result
            }
            Err(e) => {
                summary.failures.push(e.to_string());
                ComponentResult::new("sync-config").fail(e.to_string())
            }
        };
        summary.record(result);
    }

    pub fn deploy(&self, bundle: Option<&SharedBundle>, apply: bool, summary: &mut RunSummary) {
        let Some(bundle) = bundle else {
            warn!("[PIPELINE] Deploy skipped, no Shared Bundle");
            summary.record(ComponentResult::new("deploy").fail("skipped: SOT not parsed"));
            return;
        };
        let paths = DeployPaths {
            charts_dir: self.cfg.resolve(&self.cfg.charts_dir),
            deploy_dir: self.cfg.resolve(&self.cfg.deploy_dir),
        };
        let result = match generate_deploy(&self.cfg.deploy, bundle, &paths, apply) {
            Ok(report) => {
                let mut result = ComponentResult::new("deploy");
                result.passed = report.outcomes.len();
                for (path, outcome) in report.outcomes.iter().filter(|(_, o)| o.is_change()) {
                    result.details.push(format!("{}: {}", path.display(), outcome.as_str()));
                }
                result
            }
            Err(e) => {
                summary.failures.push(e.to_string());
                ComponentResult::new("deploy").fail(e.to_string())
            }
        };
        summary.record(result);
    }

    pub fn pr_creator(&self) -> PrCreator {
        PrCreator::new(self.runner.clone(), &self.cfg.root, self.cfg.pr.clone())
    }

    pub async fn pull_request(
        &self,
        trigger: Trigger,
        apply: bool,
        now: DateTime<Utc>,
        summary: &mut RunSummary,
    ) {
        let result = match self.pr_creator().create(trigger, apply, now).await {
            Ok(outcome) => {
                let result = ComponentResult::new("pr").pass(describe_pr(&outcome));
                summary.pr = Some(outcome);
                result
            }
            Err(e) => {
                error!(error = %e, "[PIPELINE][ERROR] PR step failed");
                summary.failures.push(e.to_string());
                ComponentResult::new("pr").fail(e.to_string())
            }
        };
        summary.record(result);
    }

    /// Runs every step; the PR step only when a trigger is given.
    pub async fn run(&self, apply: bool, pr: Option<Trigger>, now: DateTime<Utc>) -> RunSummary {
        info!(apply, pr = ?pr, root = %self.cfg.root.display(), "[PIPELINE] Run started");
        let mut summary = RunSummary::default();

        let bundle = self.parse_sot(apply, &mut summary);
        let options = GenerateOptions {
            apply,
            render_both: true,
            category: None,
        };
        self.generate(&options, &mut summary);
        self.indexes(apply, &mut summary);
        self.crossref(apply, &mut summary);
        self.sync_config(bundle.as_ref(), apply, &mut summary);
        self.deploy(bundle.as_ref(), apply, &mut summary);
        if let Some(trigger) = pr {
            self.pull_request(trigger, apply, now, &mut summary).await;
        }

        info!(
            passed = summary.passed(),
            failed = summary.failed(),
            "[PIPELINE] Run finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{CommandOutput, MockCommandRunner};
    use std::path::Path;

    const SOT: &str = "# Source of Truth\n\n**Last Updated**: 2026-02-01\n**Go Version**: 1.25+\n**PostgreSQL**: 18.1\n\n## Content Modules\n\n| Module | Schema | Status | Primary Metadata | Arr Integration | Design Doc |\n|--------|--------|--------|------------------|-----------------|------------|\n| Movie | `public` | ✅ | TMDb | Radarr | [MOVIE](features/MOVIE.md) |\n";

    const MOVIE_YAML: &str = "doc_title: Movie Module\ndoc_category: other\ncreated_date: \"2026-02-01\"\noverall_status: \"✅\"\nstatus_design: \"✅\"\nstatus_sources: \"🔴\"\nstatus_instructions: \"🔴\"\nstatus_code: \"🔴\"\nstatus_linting: \"🔴\"\nstatus_unit_testing: \"🔴\"\nstatus_integration_testing: \"🔴\"\ntechnical_summary: Movies.\n";

    fn repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let design = dir.path().join("docs/dev/design");
        std::fs::create_dir_all(design.join("features")).unwrap();
        std::fs::write(design.join("00_SOURCE_OF_TRUTH.md"), SOT).unwrap();
        std::fs::write(
            design.join("features/MOVIE.md"),
            "# Movie Module\n\n> Movie library\n\nSee [SOT](../00_SOURCE_OF_TRUTH.md).\n",
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("data/features")).unwrap();
        std::fs::write(
            dir.path().join("data/features/MOVIE.yaml"),
            MOVIE_YAML,
        )
        .unwrap();
        std::fs::write(dir.path().join("go.mod"), "module example\n\ngo 1.24\n").unwrap();
        dir
    }

    fn pipeline(root: &Path, mock: MockCommandRunner) -> Pipeline {
        let cfg = DocsyncConfig {
            root: root.to_path_buf(),
            ..Default::default()
        };
        Pipeline::new(cfg, Arc::new(mock))
    }

    fn names(summary: &RunSummary) -> Vec<&str> {
        summary.components.iter().map(|c| c.name).collect()
    }

    #[tokio::test]
    async fn dry_run_touches_nothing() {
        let dir = repo();
        let summary = pipeline(dir.path(), MockCommandRunner::new())
            .run(false, None, Utc::now())
            .await;
        assert_eq!(
            names(&summary),
            vec!["parse-sot", "generate", "index", "crossref", "sync-config", "deploy"]
        );
        assert!(!summary.hard_failure(), "{summary}");
        assert!(!dir.path().join("data/shared-sot.yaml").exists());
        assert!(!dir.path().join("docs/wiki").exists());
        assert!(!dir.path().join("charts").exists());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("go.mod")).unwrap(),
            "module example\n\ngo 1.24\n"
        );
    }

    #[tokio::test]
    async fn apply_writes_every_output_and_second_run_is_quiet() {
        let dir = repo();
        let p = pipeline(dir.path(), MockCommandRunner::new());
        let first = p.run(true, None, Utc::now()).await;
        assert_eq!(first.exit_code(), 0, "{first}");

        let root = dir.path();
        assert!(root.join("data/shared-sot.yaml").exists());
        assert!(root.join("docs/dev/design/features/MOVIE.md").exists());
        assert!(root.join("docs/wiki/features/MOVIE.md").exists());
        assert!(root.join("docs/dev/design/features/INDEX.md").exists());
        assert!(root.join("docs/dev/design/DESIGN_INDEX.md").exists());
        assert!(root.join("deploy/docker-compose.yml").exists());
        assert!(std::fs::read_to_string(root.join("go.mod")).unwrap().contains("go 1.25"));

        let second = p.run(true, None, Utc::now()).await;
        assert_eq!(second.exit_code(), 0, "{second}");
        for name in ["generate", "index", "deploy"] {
            let c = second.component(name).unwrap();
            assert!(c.details.is_empty(), "{name}: {:?}", c.details);
        }
    }

    #[tokio::test]
    async fn missing_sot_fails_dependent_steps() {
        let dir = tempfile::tempdir().unwrap();
        let summary = pipeline(dir.path(), MockCommandRunner::new())
            .run(false, None, Utc::now())
            .await;
        assert!(summary.hard_failure());
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(summary.component("parse-sot").unwrap().failed, 1);
        assert_eq!(summary.component("sync-config").unwrap().failed, 1);
        assert_eq!(summary.component("deploy").unwrap().failed, 1);
        assert_eq!(summary.component("generate").unwrap().failed, 0);
    }

    #[tokio::test]
    async fn blocked_pr_runs_last_and_is_not_a_failure() {
        let dir = repo();
        let mut mock = MockCommandRunner::new();
        mock.expect_run().times(1).returning(|_, _, _| {
            Ok(CommandOutput {
                status: 0,
                stdout: "docsync-bot\n".to_string(),
                stderr: String::new(),
            })
        });
        let summary = pipeline(dir.path(), mock)
            .run(false, Some(Trigger::SotUpdate), Utc::now())
            .await;
        assert_eq!(names(&summary).last(), Some(&"pr"));
        assert!(!summary.hard_failure(), "{summary}");
        assert!(matches!(summary.pr, Some(PrOutcome::Blocked { .. })));
        assert!(summary.to_string().contains("skipped: Last commit was by docsync-bot"));
    }
}
