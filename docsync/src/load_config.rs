/// `load_config` module: reads the optional `docsync.yaml`, applies the
/// `--root` override and the `DOCSYNC_*` environment overrides.
///
/// Every field of [`DocsyncConfig`] has a serde default, so no file at all is
/// a valid configuration. A relative `root` inside a config file is taken
/// relative to the directory holding that file.
///
/// # Errors
/// All errors use `anyhow::Error` with the offending path or variable in the
/// context, and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use docsync_core::config::DocsyncConfig;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

pub const DEFAULT_CONFIG_FILE: &str = "docsync.yaml";

pub const ENV_BOT_NAME: &str = "DOCSYNC_BOT_NAME";
pub const ENV_COOLDOWN_MINUTES: &str = "DOCSYNC_COOLDOWN_MINUTES";
pub const ENV_BASE_BRANCH: &str = "DOCSYNC_BASE_BRANCH";

/// Loads the configuration. `path` is the explicit `--config`; without it,
/// `docsync.yaml` in `root` (or the working directory) is used when present.
pub fn load_config(path: Option<&Path>, root: Option<&Path>) -> Result<DocsyncConfig> {
    let candidate = match path {
        Some(p) => Some(p.to_path_buf()),
        None => {
            let default = root.unwrap_or(Path::new(".")).join(DEFAULT_CONFIG_FILE);
            default.is_file().then_some(default)
        }
    };

    let mut config = match candidate {
        Some(file) => read_config_file(&file)?,
        None => {
            info!("No config file found, using defaults");
            DocsyncConfig::default()
        }
    };

    if let Some(root) = root {
        info!(root = %root.display(), "Repository root overridden from command line");
        config.root = root.to_path_buf();
    }
    apply_env_overrides(&mut config)?;
    config.trace_loaded();
    Ok(config)
}

fn read_config_file(file: &Path) -> Result<DocsyncConfig> {
    info!(config_path = %file.display(), "Loading configuration from file");
    let content = match fs::read_to_string(file) {
        Ok(content) => {
            info!(config_path = %file.display(), "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = %e, config_path = %file.display(), "Failed to read config file");
            return Err(anyhow::Error::new(e)
                .context(format!("Failed to read config file {}", file.display())));
        }
    };

    let mut config: DocsyncConfig = match serde_yaml::from_str::<Option<DocsyncConfig>>(&content) {
        Ok(conf) => {
            info!(config_path = %file.display(), "Parsed config YAML successfully");
            conf.unwrap_or_default()
        }
        Err(e) => {
            error!(error = %e, config_path = %file.display(), "Failed to parse config YAML");
            return Err(anyhow::anyhow!(
                "Failed to parse config YAML {}: {e}",
                file.display()
            ));
        }
    };

    if config.root.is_relative() {
        if let Some(base) = file.parent().filter(|b| !b.as_os_str().is_empty()) {
            config.root = base.join(&config.root);
        }
    }
    Ok(config)
}

/// Environment (and `.env`) values win over the file.
pub fn apply_env_overrides(config: &mut DocsyncConfig) -> Result<()> {
    if let Ok(bot) = std::env::var(ENV_BOT_NAME) {
        info!(bot_name = %bot, "Bot name overridden from environment");
        config.pr.bot_name = bot;
    }
    if let Ok(raw) = std::env::var(ENV_COOLDOWN_MINUTES) {
        config.pr.cooldown_minutes = raw
            .trim()
            .parse()
            .with_context(|| format!("{ENV_COOLDOWN_MINUTES} must be a whole number of minutes, got '{raw}'"))?;
        info!(cooldown_minutes = config.pr.cooldown_minutes, "Cooldown overridden from environment");
    }
    if let Ok(branch) = std::env::var(ENV_BASE_BRANCH) {
        if branch.trim().is_empty() {
            warn!("{ENV_BASE_BRANCH} is empty, keeping configured base branch");
        } else {
            info!(base_branch = %branch, "Base branch overridden from environment");
            config.pr.base_branch = branch;
        }
    }
    Ok(())
}
