use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct UpdaterConfig {
    pub wait_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub bundle_suffix: String,
    pub backup_suffix: String,
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    /// Program plus leading arguments used to open a bundle. The bundle path
    /// is appended as the final argument.
    pub launch_command: Option<Vec<String>>,
    /// Existing directory that holds the per-session scratch directory.
    /// Defaults to the system temp directory.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            wait_timeout_secs: 30,
            poll_interval_ms: 500,
            bundle_suffix: "app".to_string(),
            backup_suffix: "backup".to_string(),
            user_agent: format!("appswap/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout_secs: 30,
            launch_command: None,
            scratch_dir: None,
        }
    }
}

impl UpdaterConfig {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let mut config: Self = toml::from_str(input).context("failed to parse appswap config")?;
        config.bundle_suffix = normalize_suffix(&config.bundle_suffix);
        config.backup_suffix = normalize_suffix(&config.backup_suffix);
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bundle_suffix.is_empty() {
            return Err(anyhow!("bundle_suffix must not be empty"));
        }
        if self.backup_suffix.is_empty() {
            return Err(anyhow!("backup_suffix must not be empty"));
        }
        if self.backup_suffix.eq_ignore_ascii_case(&self.bundle_suffix) {
            return Err(anyhow!(
                "backup_suffix must differ from bundle_suffix ('{}')",
                self.bundle_suffix
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(anyhow!("poll_interval_ms must be greater than zero"));
        }
        if let Some(command) = &self.launch_command {
            let named = command
                .first()
                .is_some_and(|program| !program.trim().is_empty());
            if !named {
                return Err(anyhow!("launch_command must name a program"));
            }
        }
        Ok(())
    }

    pub fn with_bundle_suffix(mut self, suffix: &str) -> anyhow::Result<Self> {
        self.bundle_suffix = normalize_suffix(suffix);
        self.validate()?;
        Ok(self)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn normalize_suffix(suffix: &str) -> String {
    suffix.trim().trim_start_matches('.').to_string()
}
