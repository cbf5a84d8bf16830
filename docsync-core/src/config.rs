//! Repository layout and automation settings.
//!
//! Every field carries a serde default, so an empty YAML document (or no
//! config file at all) describes the conventional layout. Paths are relative
//! to `root` unless absolute.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_sot_file() -> PathBuf {
    PathBuf::from("docs/dev/design/00_SOURCE_OF_TRUTH.md")
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_shared_data_file() -> PathBuf {
    PathBuf::from("data/shared-sot.yaml")
}
fn default_design_dir() -> PathBuf {
    PathBuf::from("docs/dev/design")
}
fn default_wiki_dir() -> PathBuf {
    PathBuf::from("docs/wiki")
}
fn default_sources_index() -> PathBuf {
    PathBuf::from("docs/dev/sources/SOURCES.yaml")
}
fn default_sources_prefix() -> String {
    "../sources".to_string()
}
fn default_deploy_dir() -> PathBuf {
    PathBuf::from("deploy")
}
fn default_charts_dir() -> PathBuf {
    PathBuf::from("charts")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocsyncConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_sot_file")]
    pub sot_file: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_shared_data_file")]
    pub shared_data_file: PathBuf,
    #[serde(default = "default_design_dir")]
    pub design_dir: PathBuf,
    #[serde(default = "default_wiki_dir")]
    pub wiki_dir: PathBuf,
    #[serde(default = "default_sources_index")]
    pub sources_index: PathBuf,
    /// Prefix of local source links, relative to the design root.
    #[serde(default = "default_sources_prefix")]
    pub sources_prefix: String,
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,
    #[serde(default)]
    pub schemas_dir: Option<PathBuf>,
    #[serde(default = "default_deploy_dir")]
    pub deploy_dir: PathBuf,
    #[serde(default = "default_charts_dir")]
    pub charts_dir: PathBuf,
    #[serde(default)]
    pub pr: PrConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
}

impl Default for DocsyncConfig {
    fn default() -> Self {
        DocsyncConfig {
            root: default_root(),
            sot_file: default_sot_file(),
            data_dir: default_data_dir(),
            shared_data_file: default_shared_data_file(),
            design_dir: default_design_dir(),
            wiki_dir: default_wiki_dir(),
            sources_index: default_sources_index(),
            sources_prefix: default_sources_prefix(),
            templates_dir: None,
            schemas_dir: None,
            deploy_dir: default_deploy_dir(),
            charts_dir: default_charts_dir(),
            pr: PrConfig::default(),
            sync: SyncConfig::default(),
            deploy: DeployConfig::default(),
        }
    }
}

impl DocsyncConfig {
    /// `path` joined onto `root`; absolute paths pass through.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn sot_path(&self) -> PathBuf {
        self.resolve(&self.sot_file)
    }

    pub fn data_path(&self) -> PathBuf {
        self.resolve(&self.data_dir)
    }

    pub fn shared_data_path(&self) -> PathBuf {
        self.resolve(&self.shared_data_file)
    }

    pub fn design_path(&self) -> PathBuf {
        self.resolve(&self.design_dir)
    }

    pub fn wiki_path(&self) -> PathBuf {
        self.resolve(&self.wiki_dir)
    }

    pub fn sources_index_path(&self) -> PathBuf {
        self.resolve(&self.sources_index)
    }

    /// `SOURCES.md` next to the sources index, relative to `root`.
    pub fn sources_md(&self) -> PathBuf {
        self.sources_index.with_file_name("SOURCES.md")
    }

    pub fn templates_path(&self) -> Option<PathBuf> {
        self.templates_dir.as_deref().map(|p| self.resolve(p))
    }

    pub fn schemas_path(&self) -> Option<PathBuf> {
        self.schemas_dir.as_deref().map(|p| self.resolve(p))
    }

    pub fn trace_loaded(&self) {
        info!(
            root = %self.root.display(),
            sot_file = %self.sot_file.display(),
            data_dir = %self.data_dir.display(),
            design_dir = %self.design_dir.display(),
            wiki_dir = %self.wiki_dir.display(),
            bot_name = %self.pr.bot_name,
            cooldown_minutes = self.pr.cooldown_minutes,
            base_branch = %self.pr.base_branch,
            "Loaded DocsyncConfig"
        );
        debug!(?self, "DocsyncConfig loaded (full debug)");
    }
}

fn default_bot_name() -> String {
    "docsync-bot".to_string()
}
fn default_cooldown_minutes() -> u64 {
    60
}
fn default_lock_file() -> PathBuf {
    PathBuf::from(".automation-lock")
}
fn default_base_branch() -> String {
    "develop".to_string()
}
fn default_remote() -> String {
    "origin".to_string()
}
fn default_command_timeout_secs() -> u64 {
    60
}
fn default_safe_prefixes() -> Vec<String> {
    ["docs/", "data/", "templates/", "schemas/", ".github/workflows/doc-"]
        .into_iter()
        .map(str::to_string)
        .collect()
}
fn default_automerge_label() -> String {
    "automerge".to_string()
}
fn default_commit_trailer() -> String {
    "Automated-By: docsync".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrConfig {
    /// Commit author name used by the automation; its commits never trigger a PR.
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u64,
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_safe_prefixes")]
    pub safe_prefixes: Vec<String>,
    #[serde(default = "default_automerge_label")]
    pub automerge_label: String,
    #[serde(default = "default_commit_trailer")]
    pub commit_trailer: String,
}

impl Default for PrConfig {
    fn default() -> Self {
        PrConfig {
            bot_name: default_bot_name(),
            cooldown_minutes: default_cooldown_minutes(),
            lock_file: default_lock_file(),
            base_branch: default_base_branch(),
            remote: default_remote(),
            command_timeout_secs: default_command_timeout_secs(),
            safe_prefixes: default_safe_prefixes(),
            automerge_label: default_automerge_label(),
            commit_trailer: default_commit_trailer(),
        }
    }
}

fn default_workflows_dir() -> PathBuf {
    PathBuf::from(".github/workflows")
}
fn default_dockerfiles() -> Vec<PathBuf> {
    vec![PathBuf::from("Dockerfile")]
}
fn default_compose_files() -> Vec<PathBuf> {
    vec![
        PathBuf::from("deploy/docker-compose.yml"),
        PathBuf::from("deploy/docker-stack.yml"),
    ]
}

/// Files rewritten by config sync, relative to the repository root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_workflows_dir")]
    pub workflows_dir: PathBuf,
    #[serde(default = "default_dockerfiles")]
    pub dockerfiles: Vec<PathBuf>,
    #[serde(default = "default_compose_files")]
    pub compose_files: Vec<PathBuf>,
    /// Helm values files; empty means every `charts/*/values.yaml`.
    #[serde(default)]
    pub helm_values: Vec<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            workflows_dir: default_workflows_dir(),
            dockerfiles: default_dockerfiles(),
            compose_files: default_compose_files(),
            helm_values: Vec::new(),
        }
    }
}

fn default_app_name() -> String {
    "app".to_string()
}
fn default_image() -> String {
    "ghcr.io/example/app".to_string()
}
fn default_port() -> u16 {
    8096
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Chart and service name.
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for DeployConfig {
    fn default() -> Self {
        DeployConfig {
            app_name: default_app_name(),
            image: default_image(),
            port: default_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let cfg: DocsyncConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg, DocsyncConfig::default());
        assert_eq!(cfg.pr.cooldown_minutes, 60);
        assert_eq!(cfg.pr.safe_prefixes.len(), 5);
        assert_eq!(cfg.sources_md(), PathBuf::from("docs/dev/sources/SOURCES.md"));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg: DocsyncConfig = serde_yaml::from_str(
            "root: /repo\npr:\n  bot_name: revision-bot\ndeploy:\n  app_name: revenge\n",
        )
        .unwrap();
        assert_eq!(cfg.pr.bot_name, "revision-bot");
        assert_eq!(cfg.pr.base_branch, "develop");
        assert_eq!(cfg.deploy.app_name, "revenge");
        assert_eq!(cfg.deploy.port, 8096);
        assert_eq!(cfg.design_path(), PathBuf::from("/repo/docs/dev/design"));
        assert_eq!(cfg.resolve(Path::new("/abs/x")), PathBuf::from("/abs/x"));
    }
}
