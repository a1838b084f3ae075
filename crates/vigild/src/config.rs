//! Configuration management for vigild.
//!
//! Loads settings from /etc/vigil/config.toml (or $VIGIL_CONFIG) or uses
//! defaults. These are process-start settings; thresholds and the per-run
//! auto-remediate flag live in the settings table instead.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::action_map::ActionProfile;

/// Config file path
pub const CONFIG_PATH: &str = "/etc/vigil/config.toml";

/// Default config file path for fallback
pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/vigil/config.toml";

/// Environment variable overriding the config path
pub const CONFIG_ENV: &str = "VIGIL_CONFIG";

/// Deployment environment. Anything that is not clearly production is dev.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Environment {
    Prod,
    #[default]
    Dev,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Prod => "prod",
            Environment::Dev => "dev",
        }
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Environment::Prod)
    }
}

impl From<String> for Environment {
    fn from(value: String) -> Self {
        Environment::from(value.as_str())
    }
}

impl From<&str> for Environment {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Environment::Prod,
            _ => Environment::Dev,
        }
    }
}

/// Which executor the operator asked for. Only honored in prod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    #[default]
    DryRun,
    Live,
}

/// Daemon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub environment: Environment,

    /// Seconds between health checks (valid: 5-3600)
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// SQLite database holding events, actions, audit and settings
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_check_interval() -> u64 {
    30
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/vigil/vigil.db")
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            check_interval_secs: default_check_interval(),
            db_path: default_db_path(),
        }
    }
}

/// Remediation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationConfig {
    /// Global kill switch; prod needs both this and the per-run setting
    #[serde(default)]
    pub auto_remediate_enabled: bool,

    #[serde(default)]
    pub executor: ExecutorKind,

    #[serde(default)]
    pub action_profile: ActionProfile,

    /// Hard timeout for every external command (valid: 1-300)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Process/service names authorized for destructive remediation
    #[serde(default)]
    pub whitelist: Vec<String>,

    /// Names added to the built-in deny-list
    #[serde(default)]
    pub deny_extra: Vec<String>,

    /// Directories cleaned by free_disk_space
    #[serde(default = "default_temp_dirs")]
    pub temp_dirs: Vec<PathBuf>,

    /// Size passed to journalctl --vacuum-size
    #[serde(default = "default_journal_vacuum_size")]
    pub journal_vacuum_size: String,

    /// Service restarted by handle_updates_pending
    #[serde(default = "default_update_service")]
    pub update_service: String,
}

fn default_command_timeout() -> u64 {
    30
}

fn default_temp_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("/tmp"), PathBuf::from("/var/tmp")]
}

fn default_journal_vacuum_size() -> String {
    "200M".to_string()
}

fn default_update_service() -> String {
    "packagekit".to_string()
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            auto_remediate_enabled: false,
            executor: ExecutorKind::default(),
            action_profile: ActionProfile::default(),
            command_timeout_secs: default_command_timeout(),
            whitelist: Vec::new(),
            deny_extra: Vec::new(),
            temp_dirs: default_temp_dirs(),
            journal_vacuum_size: default_journal_vacuum_size(),
            update_service: default_update_service(),
        }
    }
}

/// Monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Services whose state is sampled each cycle
    #[serde(default = "default_watched_services")]
    pub watched_services: Vec<String>,

    /// Mount point whose usage is reported as disk_percent
    #[serde(default = "default_disk_mount")]
    pub disk_mount: PathBuf,
}

fn default_watched_services() -> Vec<String> {
    vec![
        "bluetooth".to_string(),
        "cups".to_string(),
        "NetworkManager".to_string(),
    ]
}

fn default_disk_mount() -> PathBuf {
    PathBuf::from("/")
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            watched_services: default_watched_services(),
            disk_mount: default_disk_mount(),
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub remediation: RemediationConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl Config {
    /// Load config from $VIGIL_CONFIG, the system path, or return defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            match Self::load_from_path(&path) {
                Ok(config) => return config,
                Err(e) => warn!("{}={} unusable: {:#}", CONFIG_ENV, path, e),
            }
        }

        Self::load_from_path(CONFIG_PATH)
            .or_else(|_| Self::load_from_path(DEFAULT_CONFIG_PATH))
            .unwrap_or_else(|e| {
                warn!("Config not found, using defaults: {}", e);
                Config::default()
            })
    }

    /// Load config from specific path
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save default config to path (for init)
    pub fn save_default(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(&Config::default())?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        info!("Saved default config to {}", path.display());
        Ok(())
    }

    /// Check interval clamped to 5-3600 seconds
    pub fn effective_check_interval(&self) -> u64 {
        self.daemon.check_interval_secs.clamp(5, 3600)
    }

    /// Command timeout clamped to 1-300 seconds
    pub fn effective_command_timeout(&self) -> u64 {
        self.remediation.command_timeout_secs.clamp(1, 300)
    }
}
