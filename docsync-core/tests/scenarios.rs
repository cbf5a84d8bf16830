use chrono::{Duration, Utc};
use docsync_core::config::{PrConfig, SyncConfig};
use docsync_core::config_sync::{sync_configs, SyncSite, VersionFacts};
use docsync_core::contract::{CommandOutput, MockCommandRunner};
use docsync_core::generator::{DocGenerator, GenerateError, GenerateOptions, GeneratorPaths};
use docsync_core::md_parser::parse_file;
use docsync_core::mermaid::rewrite_yaml_file;
use docsync_core::pr::{PrCreator, PrOutcome, Trigger};
use docsync_core::schema::SchemaRegistry;
use docsync_core::sources::SourcesIndex;
use docsync_core::toc::{extract_headers, toc_bullet_count};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

const MOVIE_YAML: &str = r#"doc_title: "Movie Module"
doc_category: feature
created_date: "2026-01-31"
overall_status: "🔴"
status_design: "🔴"
status_design_notes: "-"
status_sources: "🔴"
status_sources_notes: "-"
status_instructions: "🔴"
status_instructions_notes: "-"
status_code: "🔴"
status_code_notes: "-"
status_linting: "🔴"
status_linting_notes: "-"
status_unit_testing: "🔴"
status_unit_testing_notes: "-"
status_integration_testing: "🔴"
status_integration_testing_notes: "-"
feature_name: "Movie Module"
module_name: movie
schema_name: public
content_types: [Movies]
technical_summary: "Movie content management"
wiki_tagline: "Manage your movies"
"#;

fn generator(root: &Path) -> DocGenerator {
    let paths = GeneratorPaths {
        data_dir: root.join("data"),
        shared_data_file: root.join("data/shared-sot.yaml"),
        design_dir: root.join("design"),
        wiki_dir: root.join("wiki"),
    };
    DocGenerator::new(paths, None, Arc::new(SourcesIndex::default()), "../sources").unwrap()
}

fn git_log(author: &'static str) -> MockCommandRunner {
    let mut mock = MockCommandRunner::new();
    mock.expect_run()
        .withf(|program: &str, args: &[String], _: &Path| {
            program == "git" && args.first().map(String::as_str) == Some("log")
        })
        .times(1)
        .returning(move |_, _, _| {
            Ok(CommandOutput {
                status: 0,
                stdout: format!("{author}\n"),
                stderr: String::new(),
            })
        });
    mock
}

#[test]
fn minimal_feature_renders_both_variants() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data/features/video/MOVIE_MODULE.yaml");
    fs::create_dir_all(data.parent().unwrap()).unwrap();
    fs::write(&data, MOVIE_YAML).unwrap();

    let result = generator(dir.path())
        .generate_doc(&data, None, Path::new("features/video"), true, true)
        .unwrap();
    assert!(result.ok(), "{}", result.summary_line());
    assert_eq!(result.template, "feature.md.jinja");

    let design =
        fs::read_to_string(dir.path().join("design/features/video/MOVIE_MODULE.md")).unwrap();
    assert!(design.contains("Movie Module"));
    assert!(design.contains("Table of Contents"));
    assert!(design.contains("internal/content/movie/"));
    assert_eq!(design.matches("- [Status](#status)").count(), 1);
    assert_eq!(toc_bullet_count(&design), extract_headers(&design).len());

    let wiki = fs::read_to_string(dir.path().join("wiki/features/video/MOVIE_MODULE.md")).unwrap();
    assert!(wiki.contains("Manage your movies"));
    assert!(!wiki.contains("internal/content/movie/"));
    assert_eq!(toc_bullet_count(&wiki), extract_headers(&wiki).len());

    let frontmatter = |text: &str| text.split("\n---\n").next().map(str::to_string);
    assert_eq!(frontmatter(&design), frontmatter(&wiki));
}

#[test]
fn schema_invalid_subject_is_skipped_and_counted_failed() {
    let dir = tempdir().unwrap();
    let features = dir.path().join("data/features");
    fs::create_dir_all(&features).unwrap();
    fs::write(features.join("MOVIE_MODULE.yaml"), MOVIE_YAML).unwrap();
    let broken = features.join("BROKEN.yaml");
    fs::write(&broken, "doc_title: Broken\ndoc_category: feature\n").unwrap();

    let expected = SchemaRegistry::builtin().unwrap().validate_file(&broken).errors;
    assert!(!expected.is_empty());

    let generator = generator(dir.path());
    match generator.generate_doc(&broken, None, Path::new("features"), true, true) {
        Err(GenerateError::Schema { errors, .. }) => assert_eq!(errors, expected),
        other => panic!("expected a schema error, got {other:?}"),
    }

    let report = generator.generate_all(&GenerateOptions {
        apply: true,
        render_both: true,
        category: None,
    });
    assert_eq!(report.passed(), 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.rejected.len(), 1);
    let (path, message) = &report.rejected[0];
    assert_eq!(path, &broken);
    assert!(message.contains("created_date"), "{message}");
    assert!(dir.path().join("design/features/MOVIE_MODULE.md").exists());
    assert!(!dir.path().join("design/features/BROKEN.md").exists());
    assert!(!dir.path().join("wiki/features/BROKEN.md").exists());
}

#[test]
fn status_glyphs_are_parsed_from_the_table() {
    let dir = tempdir().unwrap();
    let design = dir.path().join("design");
    let doc = design.join("features/MOVIE.md");
    fs::create_dir_all(doc.parent().unwrap()).unwrap();
    fs::write(
        &doc,
        "# Movie\n\n## Status\n\n| Dimension | Status |\n|-----------|--------|\n| Design | ✅ |\n| Sources | 🔴 |\n| Instructions | 🔴 |\n| Code | 🟡 |\n| Linting | 🔴 |\n| Unit Testing | 🔴 |\n| Integration Testing | 🔴 |\n",
    )
    .unwrap();

    let seed = parse_file(&doc, &design)
        .unwrap()
        .to_seed(&SourcesIndex::default(), "2026-02-01");
    assert_eq!(seed.status_design, "✅");
    assert_eq!(seed.status_code, "🟡");
    assert_eq!(seed.status_linting, "🔴");
    assert_eq!(seed.overall_status, "✅");
}

#[tokio::test]
async fn bot_authored_commit_prevents_a_pr() {
    let dir = tempdir().unwrap();
    let creator = PrCreator::new(Arc::new(git_log("docsync-bot")), dir.path(), PrConfig::default());
    let reason = creator.can_proceed(Utc::now()).await.unwrap_err();
    assert!(reason.contains("bot"), "{reason}");
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn recent_lock_prevents_a_pr_and_survives() {
    let dir = tempdir().unwrap();
    let now = Utc::now();
    let lock = dir.path().join(".automation-lock");
    fs::write(&lock, (now - Duration::minutes(30)).to_rfc3339()).unwrap();

    let creator = PrCreator::new(Arc::new(git_log("Jane Developer")), dir.path(), PrConfig::default());
    let outcome = creator.create(Trigger::SotUpdate, true, now).await.unwrap();
    match outcome {
        PrOutcome::Blocked { reason } => assert!(reason.contains("30 minutes remaining"), "{reason}"),
        other => panic!("expected Blocked, got {other:?}"),
    }
    assert!(lock.exists());
}

#[test]
fn two_row_ascii_diagram_becomes_mermaid() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("feature.yaml");
    fs::write(
        &data,
        "doc_title: Flow\narchitecture_diagram: |\n  ┌──────────┐\n  │  Client  │\n  └──────────┘\n       │\n       ▼\n  ┌──────────┐  ┌──────────┐\n  │   API    │  │  Worker  │\n  └──────────┘  └──────────┘\n",
    )
    .unwrap();

    let (fields, _) = rewrite_yaml_file(&data, true).unwrap();
    assert_eq!(fields, vec!["architecture_diagram"]);

    let doc: serde_yaml::Value = serde_yaml::from_str(&fs::read_to_string(&data).unwrap()).unwrap();
    let out = doc["architecture_diagram"].as_str().unwrap();
    assert_eq!(out.matches("flowchart LR").count(), 1);
    assert_eq!(out.matches("subgraph ").count(), 2);
    assert_eq!(out.lines().filter(|l| l.trim() == "end").count(), 2);
    assert_eq!(out.matches(" --> ").count(), 2);
    assert!(out.contains("node1 --> node2"));
    assert!(out.contains("node2 --> node3"));
}

#[test]
fn config_sync_dry_run_reports_without_writing() {
    let dir = tempdir().unwrap();
    let go_mod = dir.path().join("go.mod");
    let before = "module example.com/app\n\ngo 1.23\n";
    fs::write(&go_mod, before).unwrap();

    let metadata: BTreeMap<String, String> =
        [("go_version".to_string(), "1.25+".to_string())].into_iter().collect();
    let facts = VersionFacts::from_metadata(&metadata);

    let report = sync_configs(dir.path(), &SyncConfig::default(), &facts, false).unwrap();
    assert_eq!(report.total().updated, 1);
    assert_eq!(report.sites[&SyncSite::GoMod].updated, 1);
    assert_eq!(report.changes.len(), 1);
    assert_eq!(report.changes[0].to_line, "go 1.25");
    assert_eq!(fs::read_to_string(&go_mod).unwrap(), before);

    sync_configs(dir.path(), &SyncConfig::default(), &facts, true).unwrap();
    let again = sync_configs(dir.path(), &SyncConfig::default(), &facts, true).unwrap();
    assert_eq!(again.total().updated, 0);
    assert_eq!(again.total().unchanged, 1);
}
