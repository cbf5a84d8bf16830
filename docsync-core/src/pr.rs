//! # pr: batched pull requests for automated updates, with loop prevention
//!
//! A run passes three gates before anything is touched:
//! 1. the last commit is not by the automation's own bot identity,
//! 2. no cooldown lock younger than the configured window exists,
//! 3. `gh` is installed and authenticated.
//!
//! A failed gate yields [`PrOutcome::Blocked`]. That is the normal
//! "nothing to do this cycle" result, and the working tree, the lock file
//! and the remote are left exactly as they were.
//!
//! ## Error Handling
//! Once gates pass, a failing `git` step is a [`PrError::Step`]. The auto-merge
//! request is the one call whose failure is tolerated: the PR already exists.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeDelta, TimeZone, Utc};
use tracing::{error, info, warn};

use crate::config::PrConfig;
use crate::contract::{CommandError, CommandOutput, CommandRunner};

const MAX_LISTED_FILES: usize = 20;

/// Longest honoured cooldown window (100 years); larger settings are capped.
pub const MAX_COOLDOWN_MINUTES: i64 = 100 * 365 * 24 * 60;

/// The configured cooldown as a window, capped at [`MAX_COOLDOWN_MINUTES`].
pub fn cooldown_window(minutes: u64) -> TimeDelta {
    let minutes = i64::try_from(minutes)
        .unwrap_or(MAX_COOLDOWN_MINUTES)
        .min(MAX_COOLDOWN_MINUTES);
    TimeDelta::try_minutes(minutes).unwrap_or(TimeDelta::zero())
}

#[derive(Debug, thiserror::Error)]
pub enum PrError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("{step} failed (exit {status}): {stderr}")]
    Step {
        step: &'static str,
        status: i32,
        stderr: String,
    },
    #[error("failed to write lock file {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What caused the automated change-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    SotUpdate,
    ConfigSync,
    Manual,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::SotUpdate => "sot_update",
            Trigger::ConfigSync => "config_sync",
            Trigger::Manual => "manual",
        }
    }

    pub fn branch(&self, now: DateTime<Utc>) -> String {
        let ts = now.format("%Y%m%d-%H%M%S");
        match self {
            Trigger::SotUpdate => format!("docs/sot-update-{ts}"),
            Trigger::ConfigSync => format!("config/sync-{ts}"),
            Trigger::Manual => format!("docs/manual-update-{ts}"),
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Trigger::SotUpdate => "docs: update from SOURCE_OF_TRUTH changes",
            Trigger::ConfigSync => "config: sync configs from SOURCE_OF_TRUTH",
            Trigger::Manual => "docs: manual documentation update",
        }
    }

    fn heading(&self) -> &'static str {
        match self {
            Trigger::SotUpdate => "Documentation Update",
            Trigger::ConfigSync => "Configuration Sync",
            Trigger::Manual => "Manual Documentation Update",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Trigger::SotUpdate => "SOURCE_OF_TRUTH.md update",
            Trigger::ConfigSync => "Automatic config synchronization",
            Trigger::Manual => "Manual run",
        }
    }
}

impl FromStr for Trigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sot_update" => Ok(Trigger::SotUpdate),
            "config_sync" => Ok(Trigger::ConfigSync),
            "manual" => Ok(Trigger::Manual),
            other => Err(format!(
                "unknown trigger '{other}' (expected sot_update, config_sync or manual)"
            )),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to open the PR, computed before any mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrPlan {
    pub trigger: Trigger,
    pub branch: String,
    pub title: String,
    pub body: String,
    pub commit_message: String,
    pub files: Vec<String>,
    pub docs_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrOutcome {
    Blocked { reason: String },
    NothingToCommit,
    DryRun { plan: PrPlan },
    Created { url: String, auto_merge: bool },
}

/// State of the cooldown lock at gate time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cooldown {
    Clear,
    /// Expired or unparseable; removed once every gate has passed in an
    /// applying run.
    Stale,
    Active { minutes_remaining: i64 },
}

/// Parses a lock timestamp: RFC 3339, or a naive ISO-8601 local time.
pub fn parse_lock_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .single()
        .map(|t| t.with_timezone(&Utc))
}

/// `git status --porcelain` paths; the rename form yields the new path.
pub fn parse_porcelain(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| l.get(3..))
        .map(|p| match p.split_once(" -> ") {
            Some((_, new)) => new,
            None => p,
        })
        .map(|p| p.trim_matches('"').to_string())
        .collect()
}

pub fn is_docs_only(files: &[String], safe_prefixes: &[String]) -> bool {
    files
        .iter()
        .all(|f| safe_prefixes.iter().any(|p| f.starts_with(p.as_str())))
}

pub fn render_body(trigger: Trigger, files: &[String], docs_only: bool) -> String {
    let mut body = format!(
        "## {}\n\n**Trigger**: {}\n\n**Changes**: {} file(s)\n\n**Files Updated**:\n",
        trigger.heading(),
        trigger.description(),
        files.len()
    );
    for file in files.iter().take(MAX_LISTED_FILES) {
        body.push_str(&format!("- {file}\n"));
    }
    if files.len() > MAX_LISTED_FILES {
        body.push_str(&format!("- ... and {} more\n", files.len() - MAX_LISTED_FILES));
    }
    let merge = if docs_only {
        "Yes"
    } else {
        "No (non-docs changes detected)"
    };
    body.push_str(&format!(
        "\n**Can auto-merge**: {merge}\n\n---\n\nGenerated by the docsync documentation pipeline\n"
    ));
    body
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub struct PrCreator {
    runner: Arc<dyn CommandRunner>,
    root: PathBuf,
    cfg: PrConfig,
}

impl PrCreator {
    pub fn new(runner: Arc<dyn CommandRunner>, root: &Path, cfg: PrConfig) -> Self {
        PrCreator {
            runner,
            root: root.to_path_buf(),
            cfg,
        }
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(&self.cfg.lock_file)
    }

    async fn run(&self, program: &str, argv: Vec<String>) -> Result<CommandOutput, CommandError> {
        self.runner.run(program, &argv, &self.root).await
    }

    async fn step(&self, step: &'static str, program: &str, argv: Vec<String>) -> Result<CommandOutput, PrError> {
        let out = self.run(program, argv).await?;
        if !out.success() {
            error!(step, status = out.status, stderr = %out.stderr.trim(), "[PR][ERROR] Step failed");
            return Err(PrError::Step {
                step,
                status: out.status,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(out)
    }

    /// A failing or unlaunchable `git log` counts as "not a bot commit".
    pub async fn is_bot_commit(&self) -> bool {
        match self.run("git", args(&["log", "-1", "--pretty=%an"])).await {
            Ok(out) if out.success() => out.stdout.trim() == self.cfg.bot_name,
            _ => false,
        }
    }

    /// Reads the lock without modifying it.
    pub fn cooldown(&self, now: DateTime<Utc>) -> Cooldown {
        let Ok(text) = std::fs::read_to_string(self.lock_path()) else {
            return Cooldown::Clear;
        };
        let Some(locked_at) = parse_lock_time(&text) else {
            return Cooldown::Stale;
        };
        let window = cooldown_window(self.cfg.cooldown_minutes);
        let remaining = window - (now - locked_at);
        if remaining <= Duration::zero() {
            return Cooldown::Stale;
        }
        let secs = remaining.num_seconds().max(1);
        Cooldown::Active {
            minutes_remaining: (secs + 59) / 60,
        }
    }

    async fn toolchain_problem(&self) -> Option<String> {
        match self.run("gh", args(&["--version"])).await {
            Ok(out) if out.success() => {}
            _ => return Some("gh CLI not installed (https://cli.github.com/)".to_string()),
        }
        match self.run("gh", args(&["auth", "status"])).await {
            Ok(out) if out.success() => None,
            _ => Some("gh CLI not authenticated (run: gh auth login)".to_string()),
        }
    }

    /// Runs the gates in order. `Err` carries the human-readable reason.
    /// Nothing is written by this call.
    pub async fn can_proceed(&self, now: DateTime<Utc>) -> Result<Cooldown, String> {
        if self.is_bot_commit().await {
            return Err(format!(
                "Last commit was by {} (bot loop prevention)",
                self.cfg.bot_name
            ));
        }
        let cooldown = self.cooldown(now);
        if let Cooldown::Active { minutes_remaining } = cooldown {
            return Err(format!("Cooldown active ({minutes_remaining} minutes remaining)"));
        }
        if let Some(problem) = self.toolchain_problem().await {
            return Err(problem);
        }
        Ok(cooldown)
    }

    pub async fn changed_files(&self) -> Result<Vec<String>, PrError> {
        let out = self.step("git status", "git", args(&["status", "--porcelain"])).await?;
        Ok(parse_porcelain(&out.stdout))
    }

    pub fn plan(&self, trigger: Trigger, files: Vec<String>, now: DateTime<Utc>) -> PrPlan {
        let docs_only = is_docs_only(&files, &self.cfg.safe_prefixes);
        let title = trigger.title().to_string();
        PrPlan {
            trigger,
            branch: trigger.branch(now),
            commit_message: format!("{title}\n\n{}", self.cfg.commit_trailer),
            body: render_body(trigger, &files, docs_only),
            title,
            files,
            docs_only,
        }
    }

    fn write_lock(&self, now: DateTime<Utc>) -> Result<(), PrError> {
        let path = self.lock_path();
        std::fs::write(&path, now.to_rfc3339()).map_err(|source| PrError::Lock { path, source })
    }

    /// Gates, then the change-set, then (with `apply`) branch, commit, push,
    /// PR and lock.
    pub async fn create(&self, trigger: Trigger, apply: bool, now: DateTime<Utc>) -> Result<PrOutcome, PrError> {
        let cooldown = match self.can_proceed(now).await {
            Ok(c) => c,
            Err(reason) => {
                info!(%trigger, reason = %reason, "[PR] Blocked by loop prevention");
                return Ok(PrOutcome::Blocked { reason });
            }
        };
        if cooldown == Cooldown::Stale {
            let lock = self.lock_path();
            if !apply {
                info!(path = %lock.display(), "[PR] Would remove stale cooldown lock");
            } else if let Err(e) = std::fs::remove_file(&lock) {
                warn!(path = %lock.display(), error = %e, "[PR] Could not remove stale lock");
            } else {
                info!(path = %lock.display(), "[PR] Removed stale cooldown lock");
            }
        }

        let files = self.changed_files().await?;
        if files.is_empty() {
            info!(%trigger, "[PR] No changes to commit");
            return Ok(PrOutcome::NothingToCommit);
        }
        let plan = self.plan(trigger, files, now);
        info!(
            %trigger,
            branch = %plan.branch,
            files = plan.files.len(),
            docs_only = plan.docs_only,
            apply,
            "[PR] Planned pull request"
        );
        if !apply {
            return Ok(PrOutcome::DryRun { plan });
        }

        self.step("git checkout", "git", args(&["checkout", "-b", plan.branch.as_str()])).await?;
        self.step("git add", "git", args(&["add", "-A"])).await?;
        self.step("git commit", "git", args(&["commit", "-m", plan.commit_message.as_str()])).await?;
        self.step("git push", "git", args(&["push", "-u", self.cfg.remote.as_str(), plan.branch.as_str()])).await?;

        let mut create = args(&[
            "pr",
            "create",
            "--base",
            self.cfg.base_branch.as_str(),
            "--head",
            plan.branch.as_str(),
            "--title",
            plan.title.as_str(),
            "--body",
            plan.body.as_str(),
        ]);
        if plan.docs_only {
            create.extend(args(&["--label", self.cfg.automerge_label.as_str()]));
        }
        let url = self.step("gh pr create", "gh", create).await?.stdout.trim().to_string();

        let mut auto_merge = false;
        if plan.docs_only {
            match self.run("gh", args(&["pr", "merge", url.as_str(), "--auto", "--squash"])).await {
                Ok(out) if out.success() => auto_merge = true,
                Ok(out) => warn!(url = %url, stderr = %out.stderr.trim(), "[PR] Auto-merge not enabled"),
                Err(e) => warn!(url = %url, error = %e, "[PR] Auto-merge not enabled"),
            }
        }

        self.write_lock(now)?;
        info!(url = %url, auto_merge, "[PR] Pull request created");
        Ok(PrOutcome::Created { url, auto_merge })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockCommandRunner;
    use pretty_assertions::assert_eq;

    fn ok(stdout: &str) -> Result<CommandOutput, CommandError> {
        Ok(CommandOutput {
            status: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        })
    }

    fn is(
        program: &'static str,
        first: &'static str,
    ) -> impl Fn(&str, &[String], &Path) -> bool + Send + 'static {
        move |p: &str, a: &[String], _: &Path| p == program && a.first().map(String::as_str) == Some(first)
    }

    fn creator(mock: MockCommandRunner, root: &Path) -> PrCreator {
        PrCreator::new(Arc::new(mock), root, PrConfig::default())
    }

    #[test]
    fn porcelain_paths() {
        let out = " M docs/wiki/x.md\n?? data/new.yaml\nR  docs/old.md -> docs/new.md\n\n";
        assert_eq!(
            parse_porcelain(out),
            vec!["docs/wiki/x.md", "data/new.yaml", "docs/new.md"]
        );
    }

    #[test]
    fn docs_only_and_body_truncation() {
        let prefixes = PrConfig::default().safe_prefixes;
        let docs: Vec<String> = (0..25).map(|i| format!("docs/f{i}.md")).collect();
        assert!(is_docs_only(&docs, &prefixes));
        assert!(is_docs_only(&[".github/workflows/doc-check.yml".to_string()], &prefixes));
        assert!(!is_docs_only(&["go.mod".to_string(), "docs/a.md".to_string()], &prefixes));

        let body = render_body(Trigger::SotUpdate, &docs, true);
        assert!(body.contains("**Changes**: 25 file(s)"));
        assert!(body.contains("- docs/f19.md\n- ... and 5 more\n"));
        assert!(!body.contains("docs/f20.md"));
        assert!(body.contains("**Can auto-merge**: Yes"));
    }

    #[test]
    fn trigger_table() {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 9, 5, 7).unwrap();
        assert_eq!(Trigger::SotUpdate.branch(now), "docs/sot-update-20260201-090507");
        assert_eq!(Trigger::ConfigSync.branch(now), "config/sync-20260201-090507");
        assert_eq!(Trigger::Manual.branch(now), "docs/manual-update-20260201-090507");
        assert_eq!("config_sync".parse::<Trigger>(), Ok(Trigger::ConfigSync));
        assert!("nightly".parse::<Trigger>().is_err());
    }

    #[tokio::test]
    async fn bot_commit_blocks_without_further_calls() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockCommandRunner::new();
        mock.expect_run()
            .withf(is("git", "log"))
            .times(1)
            .returning(|_, _, _| ok("docsync-bot\n"));
        let outcome = creator(mock, dir.path())
            .create(Trigger::SotUpdate, true, Utc::now())
            .await
            .unwrap();
        match outcome {
            PrOutcome::Blocked { reason } => assert!(reason.contains("bot"), "{reason}"),
            other => panic!("expected Blocked, got {other:?}"),
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn active_cooldown_blocks_and_keeps_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let lock = dir.path().join(".automation-lock");
        let stamp = (now - Duration::minutes(30)).to_rfc3339();
        std::fs::write(&lock, &stamp).unwrap();

        let mut mock = MockCommandRunner::new();
        mock.expect_run()
            .withf(is("git", "log"))
            .times(1)
            .returning(|_, _, _| ok("Jane Developer\n"));
        let outcome = creator(mock, dir.path())
            .create(Trigger::Manual, true, now)
            .await
            .unwrap();
        match outcome {
            PrOutcome::Blocked { reason } => {
                assert!(reason.contains("30 minutes remaining"), "{reason}")
            }
            other => panic!("expected Blocked, got {other:?}"),
        }
        assert_eq!(std::fs::read_to_string(&lock).unwrap(), stamp);
    }

    #[test]
    fn cooldown_states() {
        let dir = tempfile::tempdir().unwrap();
        let c = creator(MockCommandRunner::new(), dir.path());
        let now = Utc::now();
        assert_eq!(c.cooldown(now), Cooldown::Clear);

        std::fs::write(c.lock_path(), "not a timestamp").unwrap();
        assert_eq!(c.cooldown(now), Cooldown::Stale);

        std::fs::write(c.lock_path(), (now - Duration::minutes(61)).to_rfc3339()).unwrap();
        assert_eq!(c.cooldown(now), Cooldown::Stale);

        std::fs::write(c.lock_path(), (now - Duration::seconds(90)).to_rfc3339()).unwrap();
        assert_eq!(c.cooldown(now), Cooldown::Active { minutes_remaining: 59 });
        assert!(c.lock_path().exists());

        let naive = (now - Duration::minutes(10))
            .with_timezone(&Local)
            .naive_local()
            .format("%Y-%m-%dT%H:%M:%S%.6f")
            .to_string();
        std::fs::write(c.lock_path(), naive).unwrap();
        assert_eq!(c.cooldown(now), Cooldown::Active { minutes_remaining: 50 });
    }

    #[tokio::test]
    async fn missing_gh_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockCommandRunner::new();
        mock.expect_run()
            .withf(is("git", "log"))
            .returning(|_, _, _| ok("Jane Developer\n"));
        mock.expect_run()
            .withf(is("gh", "--version"))
            .returning(|program, _, _| {
                Err(CommandError::Spawn {
                    program: program.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                })
            });
        let outcome = creator(mock, dir.path())
            .create(Trigger::Manual, true, Utc::now())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PrOutcome::Blocked {
                reason: "gh CLI not installed (https://cli.github.com/)".into()
            }
        );
    }

    fn gates_pass(mock: &mut MockCommandRunner) {
        mock.expect_run()
            .withf(is("git", "log"))
            .returning(|_, _, _| ok("Jane Developer\n"));
        mock.expect_run()
            .withf(is("gh", "--version"))
            .returning(|_, _, _| ok("gh version 2.60.0\n"));
        mock.expect_run()
            .withf(is("gh", "auth"))
            .returning(|_, _, _| ok(""));
    }

    #[tokio::test]
    async fn dry_run_plans_without_mutating() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockCommandRunner::new();
        gates_pass(&mut mock);
        mock.expect_run()
            .withf(is("git", "status"))
            .returning(|_, _, _| ok(" M docs/wiki/movie.md\n M go.mod\n"));
        let outcome = creator(mock, dir.path())
            .create(Trigger::ConfigSync, false, Utc::now())
            .await
            .unwrap();
        let PrOutcome::DryRun { plan } = outcome else {
            panic!("expected DryRun");
        };
        assert!(plan.branch.starts_with("config/sync-"));
        assert!(!plan.docs_only);
        assert_eq!(
            plan.commit_message,
            "config: sync configs from SOURCE_OF_TRUTH\n\nAutomated-By: docsync"
        );
        assert!(!dir.path().join(".automation-lock").exists());
    }

    #[tokio::test]
    async fn dry_run_leaves_a_stale_lock_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join(".automation-lock");
        std::fs::write(&lock, "garbage").unwrap();
        let mut mock = MockCommandRunner::new();
        gates_pass(&mut mock);
        mock.expect_run()
            .withf(is("git", "status"))
            .returning(|_, _, _| ok(" M docs/wiki/movie.md\n"));
        let outcome = creator(mock, dir.path())
            .create(Trigger::Manual, false, Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, PrOutcome::DryRun { .. }), "{outcome:?}");
        assert_eq!(std::fs::read_to_string(&lock).unwrap(), "garbage");
    }

    #[test]
    fn huge_cooldown_settings_are_capped() {
        assert_eq!(cooldown_window(60), Duration::minutes(60));
        assert_eq!(cooldown_window(u64::MAX), Duration::minutes(MAX_COOLDOWN_MINUTES));
        assert_eq!(cooldown_window(i64::MAX as u64 + 1), Duration::minutes(MAX_COOLDOWN_MINUTES));

        let dir = tempfile::tempdir().unwrap();
        let cfg = PrConfig {
            cooldown_minutes: u64::MAX,
            ..PrConfig::default()
        };
        let c = PrCreator::new(Arc::new(MockCommandRunner::new()), dir.path(), cfg);
        let now = Utc::now();
        std::fs::write(c.lock_path(), (now - Duration::days(365)).to_rfc3339()).unwrap();
        assert!(matches!(c.cooldown(now), Cooldown::Active { .. }));
    }

    #[tokio::test]
    async fn clean_tree_is_nothing_to_commit() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockCommandRunner::new();
        gates_pass(&mut mock);
        mock.expect_run()
            .withf(is("git", "status"))
            .returning(|_, _, _| ok(""));
        let outcome = creator(mock, dir.path())
            .create(Trigger::Manual, true, Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, PrOutcome::NothingToCommit);
    }

    #[tokio::test]
    async fn docs_only_pr_is_created_with_automerge_and_lock() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".automation-lock"), "garbage").unwrap();
        let mut mock = MockCommandRunner::new();
        gates_pass(&mut mock);
        mock.expect_run()
            .withf(is("git", "status"))
            .returning(|_, _, _| ok(" M docs/wiki/movie.md\n"));
        for step in ["checkout", "add", "commit", "push"] {
            mock.expect_run().withf(is("git", step)).times(1).returning(|_, _, _| ok(""));
        }
        mock.expect_run()
            .withf(|p, a, _| p == "gh" && a.starts_with(&["pr".to_string(), "create".to_string()]))
            .times(1)
            .returning(|_, a, _| {
                assert!(a.contains(&"automerge".to_string()));
                ok("https://github.com/o/r/pull/7\n")
            });
        mock.expect_run()
            .withf(|p, a, _| p == "gh" && a.starts_with(&["pr".to_string(), "merge".to_string()]))
            .times(1)
            .returning(|_, _, _| {
                Ok(CommandOutput {
                    status: 1,
                    stdout: String::new(),
                    stderr: "auto-merge is not allowed".into(),
                })
            });

        let now = Utc::now();
        let outcome = creator(mock, dir.path())
            .create(Trigger::SotUpdate, true, now)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PrOutcome::Created {
                url: "https://github.com/o/r/pull/7".into(),
                auto_merge: false
            }
        );
        let lock = std::fs::read_to_string(dir.path().join(".automation-lock")).unwrap();
        assert_eq!(parse_lock_time(&lock), Some(now));
    }

    #[tokio::test]
    async fn failed_push_is_an_error_and_no_lock_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockCommandRunner::new();
        gates_pass(&mut mock);
        mock.expect_run()
            .withf(is("git", "status"))
            .returning(|_, _, _| ok(" M docs/a.md\n"));
        for step in ["checkout", "add", "commit"] {
            mock.expect_run().withf(is("git", step)).returning(|_, _, _| ok(""));
        }
        mock.expect_run().withf(is("git", "push")).returning(|_, _, _| {
            Ok(CommandOutput {
                status: 128,
                stdout: String::new(),
                stderr: "remote rejected".into(),
            })
        });
        let err = creator(mock, dir.path())
            .create(Trigger::Manual, true, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, PrError::Step { step: "git push", status: 128, .. }));
        assert!(!dir.path().join(".automation-lock").exists());
    }
}
