use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

const SOT: &str = "# Source of Truth\n\n**Last Updated**: 2026-02-01\n**Go Version**: 1.25+\n**PostgreSQL**: 18.1\n\n## Content Modules\n\n| Module | Schema | Status | Primary Metadata | Arr Integration | Design Doc |\n|--------|--------|--------|------------------|-----------------|------------|\n| Movie | `public` | ✅ | TMDb | Radarr | [MOVIE](features/MOVIE.md) |\n";

const MOVIE_YAML: &str = "doc_title: Movie Module\ndoc_category: other\ncreated_date: \"2026-02-01\"\noverall_status: \"✅\"\nstatus_design: \"✅\"\nstatus_sources: \"🔴\"\nstatus_instructions: \"🔴\"\nstatus_code: \"🔴\"\nstatus_linting: \"🔴\"\nstatus_unit_testing: \"🔴\"\nstatus_integration_testing: \"🔴\"\ntechnical_summary: Movies.\n";

/// A small repository with a SOT, one design doc and one data file.
fn create_repo() -> TempDir {
    let dir = tempdir().expect("Creating temp repo failed");
    let design = dir.path().join("docs/dev/design/features");
    fs::create_dir_all(&design).unwrap();
    fs::write(dir.path().join("docs/dev/design/00_SOURCE_OF_TRUTH.md"), SOT).unwrap();
    fs::write(
        design.join("MOVIE.md"),
        "# Movie Module\n\n> Movie library\n\n## Overview\n\nMovies.\n\n## Storage\n\nPostgreSQL.\n",
    )
    .unwrap();
    fs::create_dir_all(dir.path().join("data/features")).unwrap();
    fs::write(
        dir.path().join("data/features/MOVIE.yaml"),
        MOVIE_YAML,
    )
    .unwrap();
    dir
}

fn docsync(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("docsync").expect("Binary exists");
    cmd.current_dir(root)
        .env_remove("DOCSYNC_BOT_NAME")
        .env_remove("DOCSYNC_COOLDOWN_MINUTES")
        .env_remove("DOCSYNC_BASE_BRANCH")
        .env("RUST_LOG", "warn");
    cmd
}

#[test]
fn help_lists_every_subcommand() {
    let dir = tempdir().unwrap();
    let output = docsync(dir.path()).arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for sub in [
        "parse-sot", "parse-md", "validate", "generate", "toc", "mermaid", "index", "crossref",
        "sync-config", "deploy", "pr", "pipeline",
    ] {
        assert!(stdout.contains(sub), "missing {sub} in:\n{stdout}");
    }
}

#[test]
fn pipeline_dry_run_reports_and_writes_nothing() {
    let repo = create_repo();
    docsync(repo.path())
        .arg("pipeline")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("parse-sot")
                .and(predicate::str::contains("would create"))
                .and(predicate::str::contains("Result: OK")),
        );
    assert!(!repo.path().join("data/shared-sot.yaml").exists());
    assert!(!repo.path().join("docs/wiki").exists());
}

#[test]
fn pipeline_apply_regenerates_outputs() {
    let repo = create_repo();
    docsync(repo.path())
        .args(["pipeline", "--apply"])
        .assert()
        .success();
    let root = repo.path();
    assert!(root.join("data/shared-sot.yaml").exists());
    assert!(root.join("docs/wiki/features/MOVIE.md").exists());
    assert!(root.join("docs/dev/design/features/INDEX.md").exists());
    assert!(root.join("docs/dev/design/DESIGN_INDEX.md").exists());
    assert!(root.join("charts/app/Chart.yaml").exists());
}

#[test]
fn missing_sot_exits_nonzero() {
    let dir = tempdir().unwrap();
    docsync(dir.path())
        .arg("parse-sot")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Result: FAILED"));
}

#[test]
fn root_flag_and_config_file_are_honoured() {
    let repo = create_repo();
    let elsewhere = tempdir().unwrap();
    fs::write(
        repo.path().join("docsync.yaml"),
        "shared_data_file: data/bundle.yaml\n",
    )
    .unwrap();
    docsync(elsewhere.path())
        .args(["--root"])
        .arg(repo.path())
        .args(["parse-sot", "--apply"])
        .assert()
        .success();
    assert!(repo.path().join("data/bundle.yaml").exists());
    assert!(!repo.path().join("data/shared-sot.yaml").exists());
}

#[test]
fn validate_flags_incomplete_records() {
    let repo = create_repo();
    fs::write(
        repo.path().join("data/features/BROKEN.yaml"),
        "doc_title: Broken\ndoc_category: feature\n",
    )
    .unwrap();
    docsync(repo.path())
        .arg("validate")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("✗ features/BROKEN.yaml").and(predicate::str::contains("invalid")));
}

#[test]
fn toc_apply_is_idempotent() {
    let repo = create_repo();
    let doc = repo.path().join("docs/dev/design/features/MOVIE.md");
    docsync(repo.path())
        .args(["toc", "--apply"])
        .arg(&doc)
        .assert()
        .success()
        .stdout(predicate::str::contains("updated"));
    let first = fs::read_to_string(&doc).unwrap();
    assert!(first.contains("## Table of Contents"));

    docsync(repo.path())
        .args(["toc", "--apply"])
        .arg(&doc)
        .assert()
        .success()
        .stdout(predicate::str::contains("unchanged"));
    assert_eq!(fs::read_to_string(&doc).unwrap(), first);
}

#[test]
fn parse_md_dry_run_prints_seed() {
    let repo = create_repo();
    fs::remove_file(repo.path().join("data/features/MOVIE.yaml")).unwrap();
    docsync(repo.path())
        .args(["parse-md", "docs/dev/design/features/MOVIE.md"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("doc_title: Movie Module")
                .and(predicate::str::contains("doc_category: feature"))
                .and(predicate::str::contains("would create")),
        );
    assert!(!repo.path().join("data/features/MOVIE.yaml").exists());
}

#[test]
fn unknown_trigger_is_rejected_by_the_parser() {
    let dir = tempdir().unwrap();
    docsync(dir.path())
        .args(["pr", "--trigger", "nightly"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown trigger"));
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{event:?}"));
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use docsync::cli::{run, Cli, Commands};

    let dir = tempdir().unwrap();
    let cli = Cli {
        config: None,
        root: Some(dir.path().to_path_buf()),
        command: Commands::Index { apply: false },
    };

    let code = run(cli).await.expect("index on an empty tree succeeds");
    assert_eq!(code, 0);

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
