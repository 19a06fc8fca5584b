use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_NAME: &str = "plan-tracker";
const CONFIG_FILE: &str = "config.json";
const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// SQLite file. Defaults to the platform data directory.
    pub database_path: Option<PathBuf>,
    /// Target repository as `owner/name`.
    pub repo: Option<String>,
    pub api_url: String,
    /// Never written back to disk.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// Plan documents, read and concatenated in order.
    pub plan_files: Vec<PathBuf>,
    /// Minimum gap between remote calls, in milliseconds.
    pub sync_delay_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            repo: None,
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            plan_files: Vec::new(),
            sync_delay_ms: 1000,
        }
    }
}

impl TrackerConfig {
    /// Defaults, then the config file, then environment overrides.
    ///
    /// `path` replaces the default `<config dir>/plan-tracker/config.json`.
    /// A missing file is not an error; an unreadable or malformed one is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => get_config_path()?,
        };
        let mut config = Self::from_file(&path)?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(config)
    }

    /// Apply `TRACKER_*` and `GITHUB_TOKEN` overrides read through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(db) = var("TRACKER_DB") {
            self.database_path = Some(PathBuf::from(db));
        }
        if let Some(repo) = var("TRACKER_REPO") {
            self.repo = Some(repo);
        }
        if let Some(url) = var("TRACKER_API_URL") {
            self.api_url = url;
        }
        if let Some(token) = var("GITHUB_TOKEN").filter(|t| !t.is_empty()) {
            self.token = Some(token);
        }
        if let Some(files) = var("TRACKER_PLAN_FILES") {
            self.plan_files = std::env::split_paths(&files).collect();
        }
        if let Some(delay) = var("TRACKER_SYNC_DELAY_MS") {
            self.sync_delay_ms = delay
                .trim()
                .parse()
                .with_context(|| format!("Invalid TRACKER_SYNC_DELAY_MS: {:?}", delay))?;
        }
        Ok(())
    }

    pub fn sync_delay(&self) -> Duration {
        Duration::from_millis(self.sync_delay_ms)
    }
}

fn get_config_path() -> Result<PathBuf> {
    let mut path =
        config_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    path.push(APP_NAME);
    path.push(CONFIG_FILE);
    Ok(path)
}
