/// # docsync CLI Interface (Module)
///
/// Command parsing and orchestration for the `docsync` binary. All parsing,
/// rendering, syncing and PR logic lives in [`docsync_core`]; this module maps
/// subcommands onto it, prints summaries to stdout and turns the outcome into
/// an exit code.
///
/// Every mutating subcommand is a dry run unless `--apply` is given.
///
/// ## How To Use
/// - From a shell: `docsync --help`.
/// - From tests: build a [`Cli`] and call [`run`], which returns the exit code.
use crate::load_config::load_config;
use anyhow::{Context, Result};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use docsync_core::atomic::write_if_changed;
use docsync_core::config::DocsyncConfig;
use docsync_core::generator::GenerateOptions;
use docsync_core::md_parser::parse_file;
use docsync_core::mermaid::rewrite_yaml_file;
use docsync_core::pipeline::{Pipeline, RunSummary};
use docsync_core::pr::Trigger;
use docsync_core::runner::ProcessRunner;
use docsync_core::schema::SchemaRegistry;
use docsync_core::sources::SourcesIndex;
use docsync_core::toc::{add_toc, toc_bullet_count};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// CLI for docsync: regenerate docs, configs and manifests from the Source of Truth.
#[derive(Parser, Debug)]
#[clap(
    name = "docsync",
    version,
    about = "Regenerate design docs, wiki pages, config files and deploy manifests from a Source of Truth"
)]
pub struct Cli {
    /// Path to the YAML config file (default: docsync.yaml in the repository root, if present)
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Repository root; overrides the config file
    #[clap(long, global = true)]
    pub root: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse the Source of Truth into the shared data file
    ParseSot {
        #[clap(long)]
        apply: bool,
    },
    /// Extract a seed YAML record from a hand-written design doc
    ParseMd {
        file: PathBuf,
        #[clap(long)]
        apply: bool,
        /// Target file (default: the mirrored path under the data directory)
        #[clap(long)]
        output: Option<PathBuf>,
    },
    /// Validate per-subject YAML files against their category schema
    Validate {
        /// Directory to scan (default: the data directory)
        dir: Option<PathBuf>,
    },
    /// Render design and wiki docs from per-subject YAML
    Generate {
        #[clap(long)]
        apply: bool,
        /// Only render subjects of this doc_category
        #[clap(long)]
        category: Option<String>,
        /// Skip the wiki variant
        #[clap(long)]
        design_only: bool,
        /// Render a single data file instead of the whole data directory
        #[clap(long)]
        data: Option<PathBuf>,
        /// Output directory below the design/wiki roots for --data
        #[clap(long, requires = "data")]
        subpath: Option<PathBuf>,
        /// Template name for --data (default: by doc_category)
        #[clap(long, requires = "data")]
        template: Option<String>,
    },
    /// Insert or refresh the table of contents of Markdown files
    Toc {
        #[clap(required = true)]
        files: Vec<PathBuf>,
        #[clap(long)]
        apply: bool,
    },
    /// Convert ASCII box diagrams in per-subject YAML files to Mermaid
    Mermaid {
        #[clap(required = true)]
        files: Vec<PathBuf>,
        #[clap(long)]
        apply: bool,
    },
    /// Regenerate INDEX.md in every design directory
    Index {
        #[clap(long)]
        apply: bool,
    },
    /// Regenerate the design cross-reference index
    Crossref {
        #[clap(long)]
        apply: bool,
    },
    /// Propagate SOT versions into tool, build and deploy configs
    SyncConfig {
        #[clap(long)]
        apply: bool,
    },
    /// Regenerate Helm chart, compose and swarm files
    Deploy {
        #[clap(long)]
        apply: bool,
    },
    /// Open a pull request for pending automated changes
    Pr {
        /// sot_update, config_sync or manual
        #[clap(long, default_value = "manual")]
        trigger: Trigger,
        #[clap(long)]
        apply: bool,
    },
    /// Run every step in order, optionally ending with a pull request
    Pipeline {
        #[clap(long)]
        apply: bool,
        /// Open a PR with this trigger once all other steps ran
        #[clap(long)]
        pr: Option<Trigger>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::ParseSot { .. } => "parse-sot",
            Commands::ParseMd { .. } => "parse-md",
            Commands::Validate { .. } => "validate",
            Commands::Generate { .. } => "generate",
            Commands::Toc { .. } => "toc",
            Commands::Mermaid { .. } => "mermaid",
            Commands::Index { .. } => "index",
            Commands::Crossref { .. } => "crossref",
            Commands::SyncConfig { .. } => "sync-config",
            Commands::Deploy { .. } => "deploy",
            Commands::Pr { .. } => "pr",
            Commands::Pipeline { .. } => "pipeline",
        }
    }
}

fn pipeline(cfg: DocsyncConfig) -> Pipeline {
    let timeout = Duration::from_secs(cfg.pr.command_timeout_secs);
    Pipeline::new(cfg, Arc::new(ProcessRunner::new(timeout)))
}

fn finish(summary: &RunSummary) -> i32 {
    println!("{summary}");
    summary.exit_code()
}

/// Extracted async CLI logic entrypoint for integration tests and main().
/// Returns the process exit code: 0 on success, 1 on any hard failure.
pub async fn run(cli: Cli) -> Result<i32> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    let command = cli.command.name();
    let cfg = load_config(cli.config.as_deref(), cli.root.as_deref())?;
    tracing::info!(command, apply = is_apply(&cli.command), "Starting command");

    let result = match cli.command {
        Commands::ParseSot { apply } => {
            let mut summary = RunSummary::default();
            pipeline(cfg).parse_sot(apply, &mut summary);
            Ok(finish(&summary))
        }
        Commands::ParseMd {
            file,
            apply,
            output,
        } => parse_md(&cfg, &file, apply, output),
        Commands::Validate { dir } => validate(&cfg, dir),
        Commands::Generate {
            apply,
            category,
            design_only,
            data,
            subpath,
            template,
        } => {
            let p = pipeline(cfg);
            match data {
                Some(data) => {
                    let generator = p.doc_generator().context("Failed to set up the generator")?;
                    let doc = generator
                        .generate_doc(
                            &data,
                            template.as_deref(),
                            subpath.as_deref().unwrap_or(Path::new("")),
                            !design_only,
                            apply,
                        )
                        .with_context(|| format!("Failed to generate {}", data.display()))?;
                    println!("{}", doc.summary_line());
                    Ok(i32::from(!doc.ok()))
                }
                None => {
                    let mut summary = RunSummary::default();
                    let options = GenerateOptions {
                        apply,
                        render_both: !design_only,
                        category,
                    };
                    p.generate(&options, &mut summary);
                    Ok(finish(&summary))
                }
            }
        }
        Commands::Toc { files, apply } => Ok(toc(&files, apply)),
        Commands::Mermaid { files, apply } => Ok(mermaid(&files, apply)),
        Commands::Index { apply } => {
            let mut summary = RunSummary::default();
            pipeline(cfg).indexes(apply, &mut summary);
            Ok(finish(&summary))
        }
        Commands::Crossref { apply } => {
            let mut summary = RunSummary::default();
            pipeline(cfg).crossref(apply, &mut summary);
            Ok(finish(&summary))
        }
        Commands::SyncConfig { apply } => {
            let p = pipeline(cfg);
            let mut summary = RunSummary::default();
            if let Some(bundle) = p.load_bundle(&mut summary, "sync-config") {
                p.sync_config(Some(&bundle), apply, &mut summary);
            }
            Ok(finish(&summary))
        }
        Commands::Deploy { apply } => {
            let p = pipeline(cfg);
            let mut summary = RunSummary::default();
            if let Some(bundle) = p.load_bundle(&mut summary, "deploy") {
                p.deploy(Some(&bundle), apply, &mut summary);
            }
            Ok(finish(&summary))
        }
        Commands::Pr { trigger, apply } => {
            let mut summary = RunSummary::default();
            pipeline(cfg)
                .pull_request(trigger, apply, Utc::now(), &mut summary)
                .await;
            Ok(finish(&summary))
        }
        Commands::Pipeline { apply, pr } => {
            let summary = pipeline(cfg).run(apply, pr, Utc::now()).await;
            Ok(finish(&summary))
        }
    };

    match &result {
        Ok(0) => tracing::info!(command, "Command completed successfully"),
        Ok(code) => tracing::warn!(command, exit_code = code, "Command completed with failures"),
        Err(e) => tracing::error!(command, error = %e, "Command failed"),
    }
    result
}

fn is_apply(command: &Commands) -> bool {
    match command {
        Commands::ParseSot { apply }
        | Commands::ParseMd { apply, .. }
        | Commands::Generate { apply, .. }
        | Commands::Toc { apply, .. }
        | Commands::Mermaid { apply, .. }
        | Commands::Index { apply }
        | Commands::Crossref { apply }
        | Commands::SyncConfig { apply }
        | Commands::Deploy { apply }
        | Commands::Pr { apply, .. }
        | Commands::Pipeline { apply, .. } => *apply,
        Commands::Validate { .. } => false,
    }
}

/// Seed target for a design doc: its path below the design root, mirrored
/// under the data directory with a `.yaml` extension.
pub fn seed_target(cfg: &DocsyncConfig, file: &Path) -> PathBuf {
    let design = canonical(&cfg.design_path());
    let file = canonical(file);
    let rel = file
        .strip_prefix(&design)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| file.file_name().map(PathBuf::from).unwrap_or_default());
    cfg.data_path().join(rel.with_extension("yaml"))
}

/// Resolved path when it exists, so prefix checks work for `./x` and `x` alike.
fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn parse_md(cfg: &DocsyncConfig, file: &Path, apply: bool, output: Option<PathBuf>) -> Result<i32> {
    let design = canonical(&cfg.design_path());
    let parsed = parse_file(&canonical(file), &design)
        .with_context(|| format!("Failed to parse {}", file.display()))?;
    let sources = SourcesIndex::load(&cfg.sources_index_path())
        .context("Failed to load the sources index")?;
    let today = Local::now().format("%Y-%m-%d").to_string();
    let abs_file = canonical(file);
    let root = canonical(&cfg.root);
    let source_file = abs_file.strip_prefix(&root).unwrap_or(file).display().to_string();
    let yaml = parsed
        .to_seed(&sources, &today)
        .to_yaml(&source_file)
        .context("Failed to serialise the seed record")?;

    let explicit = output.is_some();
    let target = output.unwrap_or_else(|| seed_target(cfg, file));
    if target.exists() && !explicit {
        tracing::warn!(path = %target.display(), "Seed target exists, not overwriting");
        println!("{}: exists, skipped (pass --output to write elsewhere)", target.display());
        return Ok(0);
    }
    if !apply {
        println!("{yaml}");
    }
    let outcome = write_if_changed(&target, &yaml, apply)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    println!("{}: {}", target.display(), outcome.as_str());
    Ok(0)
}

fn validate(cfg: &DocsyncConfig, dir: Option<PathBuf>) -> Result<i32> {
    let registry =
        SchemaRegistry::load(cfg.schemas_path().as_deref()).context("Failed to load schemas")?;
    let dir = dir.unwrap_or_else(|| cfg.data_path());
    let reports = registry.validate_dir(&dir);
    let mut invalid = 0;
    for (path, report) in &reports {
        if report.valid {
            println!("✓ {}", path.display());
            continue;
        }
        invalid += 1;
        println!("✗ {}", path.display());
        for error in &report.errors {
            println!("    {error}");
        }
    }
    println!(
        "\n{} file(s) checked, {} valid, {} invalid",
        reports.len(),
        reports.len() - invalid,
        invalid
    );
    Ok(i32::from(invalid > 0))
}

fn toc(files: &[PathBuf], apply: bool) -> i32 {
    let mut failed = false;
    for file in files {
        let written = std::fs::read_to_string(file)
            .map_err(anyhow::Error::from)
            .and_then(|content| {
                let updated = add_toc(&content);
                let entries = toc_bullet_count(&updated);
                Ok((write_if_changed(file, &updated, apply)?, entries))
            });
        match written {
            Ok((outcome, entries)) => {
                println!("{}: {} ({entries} entries)", file.display(), outcome.as_str())
            }
            Err(e) => {
                tracing::error!(path = %file.display(), error = %e, "TOC update failed");
                println!("{}: FAILED {e}", file.display());
                failed = true;
            }
        }
    }
    i32::from(failed)
}

fn mermaid(files: &[PathBuf], apply: bool) -> i32 {
    let mut failed = false;
    for file in files {
        match rewrite_yaml_file(file, apply) {
            Ok((fields, _)) if fields.is_empty() => {
                println!("{}: no diagrams to convert", file.display())
            }
            Ok((fields, outcome)) => println!(
                "{}: {} ({})",
                file.display(),
                outcome.as_str(),
                fields.join(", ")
            ),
            Err(e) => {
                tracing::error!(path = %file.display(), error = %e, "Diagram conversion failed");
                println!("{}: FAILED {e}", file.display());
                failed = true;
            }
        }
    }
    i32::from(failed)
}
