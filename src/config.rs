//! Production configuration system
//!
//! Provides centralized configuration management with:
//! - Config file loading (optional, TOML)
//! - Environment variable overrides
//! - Runtime defaults
//! - Validation before any log I/O happens

use crate::plan::{Plan, QuotaTracker, DEFAULT_WINDOW_DIVISOR};
use crate::period::ReportZone;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Longest accepted quota window: one leap year.
pub const MAX_WINDOW_HOURS: i64 = 24 * 366;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Paths configuration
    pub paths: PathsConfig,

    /// Parsed-file cache configuration
    pub cache: CacheConfig,

    /// Plan and quota configuration
    pub quota: QuotaConfig,

    /// Output configuration
    pub display: DisplayConfig,

    /// Additional named plans
    pub plans: BTreeMap<String, PlanConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Claude config directory; its `projects/` child holds the logs.
    pub claude_home: Option<PathBuf>,
    pub log_directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub plan: String,
    pub window_divisor: f64,
    pub window_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub timezone: String,
    pub refresh_secs: u64,
    pub json_pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanConfig {
    pub window_limit: u32,
    pub daily_limit: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "WARN".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            claude_home: None,
            log_directory: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("claude-quota")
                .join("logs"),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { timeout_secs: 300 }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            plan: "pro".to_string(),
            window_divisor: DEFAULT_WINDOW_DIVISOR,
            window_hours: 5,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            timezone: "local".to_string(),
            refresh_secs: 3,
            json_pretty: true,
        }
    }
}

impl Config {
    /// Load configuration from file, environment, and defaults.
    ///
    /// Not validated here: callers apply CLI overrides first, then call
    /// [`Config::validate`].
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        let config_paths = [
            Some(PathBuf::from("claude-quota.toml")),
            Some(PathBuf::from(".claude-quota.toml")),
            dirs::config_dir().map(|d| d.join("claude-quota").join("config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                info!(config_file = %path.display(), "Loading configuration from file");
                config = Self::load_from_file(path)?;
                break;
            }
        }

        config.apply_env_overrides()?;

        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }

        if let Ok(val) = env::var("CLAUDE_HOME") {
            self.paths.claude_home = Some(PathBuf::from(val));
        }
        if let Ok(val) = env::var("CLAUDE_QUOTA_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }

        if let Ok(val) = env::var("CLAUDE_QUOTA_CACHE_TIMEOUT_SECS") {
            self.cache.timeout_secs = val
                .parse()
                .context("Invalid CLAUDE_QUOTA_CACHE_TIMEOUT_SECS")?;
        }

        if let Ok(val) = env::var("CLAUDE_QUOTA_PLAN") {
            self.quota.plan = val;
        }
        if let Ok(val) = env::var("CLAUDE_QUOTA_WINDOW_DIVISOR") {
            self.quota.window_divisor = val
                .parse()
                .context("Invalid CLAUDE_QUOTA_WINDOW_DIVISOR")?;
        }

        if let Ok(val) = env::var("CLAUDE_QUOTA_TIMEZONE") {
            self.display.timezone = val;
        }
        if let Ok(val) = env::var("CLAUDE_QUOTA_REFRESH_SECS") {
            self.display.refresh_secs = val
                .parse()
                .context("Invalid CLAUDE_QUOTA_REFRESH_SECS")?;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.logging.output.as_str(), "console" | "file" | "both") {
            return Err(anyhow::anyhow!(
                "Log output must be one of console, file, both; got '{}'",
                self.logging.output
            ));
        }

        if self.display.refresh_secs == 0 {
            return Err(anyhow::anyhow!("Refresh interval must be greater than 0"));
        }

        if !(1..=MAX_WINDOW_HOURS).contains(&self.quota.window_hours) {
            return Err(anyhow::anyhow!(
                "Window hours must be between 1 and {}, got {}",
                MAX_WINDOW_HOURS,
                self.quota.window_hours
            ));
        }

        self.quota_tracker()?;
        self.report_zone()?;
        self.plan()?;

        Ok(())
    }

    /// The configured plan. Unknown names are a configuration error.
    pub fn plan(&self) -> Result<Plan> {
        Plan::resolve(&self.quota.plan, &self.plans)
    }

    pub fn report_zone(&self) -> Result<ReportZone> {
        self.display.timezone.parse()
    }

    pub fn quota_tracker(&self) -> Result<QuotaTracker> {
        QuotaTracker::new(self.quota.window_divisor)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_secs(self.cache.timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.display.refresh_secs)
    }

    /// Save current configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        info!(path = %path.display(), "Configuration saved to file");

        Ok(())
    }
}
