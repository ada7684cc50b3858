//! Planner configuration, persisted as TOML in `$XDG_CONFIG_HOME/lifeplan/config.toml`.
//!
//! Every field has a default so a missing or partial file is valid. The
//! thresholds section holds all the numeric constants the load analyzer and
//! the suggestion generator use; nothing is hard-coded elsewhere.

use std::path::Path;

use chrono::NaiveTime;
use chrono_tz::Tz;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or validating configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(lifeplan::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(lifeplan::config::parse),
        help("Check the TOML syntax in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(lifeplan::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config value `{key}`: {message}")]
    #[diagnostic(
        code(lifeplan::config::invalid),
        help(
            "daily_budget_minutes must be positive, day_start uses HH:MM, timezone is \
             an IANA name, and burnout_medium < burnout_high."
        )
    )]
    Invalid { key: String, message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level planner configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlannerConfig {
    #[serde(default)]
    pub planning: PlanningDefaults,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Per-user defaults used until a user saves their own settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanningDefaults {
    /// Working-time budget per day in minutes.
    #[serde(default = "default_budget")]
    pub daily_budget_minutes: u32,
    /// Local wall-clock time the first task starts, `HH:MM`.
    #[serde(default = "default_day_start")]
    pub day_start: String,
    /// IANA timezone name.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Fill leftover budget with a partial block of the best skipped task.
    #[serde(default = "default_true")]
    pub allow_partial: bool,
    /// Smallest leftover (minutes) worth a partial block.
    #[serde(default = "default_min_partial")]
    pub min_partial_minutes: u32,
}

fn default_budget() -> u32 {
    480
}
fn default_day_start() -> String {
    "09:00".into()
}
fn default_timezone() -> String {
    "UTC".into()
}
fn default_true() -> bool {
    true
}
fn default_min_partial() -> u32 {
    15
}

impl Default for PlanningDefaults {
    fn default() -> Self {
        Self {
            daily_budget_minutes: default_budget(),
            day_start: default_day_start(),
            timezone: default_timezone(),
            allow_partial: true,
            min_partial_minutes: default_min_partial(),
        }
    }
}

/// Numeric thresholds for load, burnout, regret and suggestion behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Thresholds {
    /// Load percentage at or above which a day counts as overloaded.
    #[serde(default = "default_overload")]
    pub overload_percent: f64,
    /// Load percentage at which burnout risk becomes medium.
    #[serde(default = "default_burnout_medium")]
    pub burnout_medium: f64,
    /// Load percentage at which burnout risk becomes high.
    #[serde(default = "default_burnout_high")]
    pub burnout_high: f64,
    /// Risk level at or above which a task is "high risk".
    #[serde(default = "default_regret_risk")]
    pub high_risk: u8,
    /// Days of history the burnout analyzer looks back over.
    #[serde(default = "default_window")]
    pub history_window_days: u32,
    /// Overloaded days within the window that count as sustained overload.
    #[serde(default = "default_sustained")]
    pub sustained_overload_days: u32,
    /// Hours a dismissed cause stays hidden even if its parameters change.
    #[serde(default = "default_cooldown")]
    pub retrigger_cooldown_hours: u32,
    /// Days an in-progress task may go without updates before it is stalled.
    #[serde(default = "default_stalled")]
    pub stalled_after_days: u32,
}

fn default_overload() -> f64 {
    100.0
}
fn default_burnout_medium() -> f64 {
    50.0
}
fn default_burnout_high() -> f64 {
    90.0
}
fn default_regret_risk() -> u8 {
    70
}
fn default_window() -> u32 {
    7
}
fn default_sustained() -> u32 {
    3
}
fn default_cooldown() -> u32 {
    24
}
fn default_stalled() -> u32 {
    5
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            overload_percent: default_overload(),
            burnout_medium: default_burnout_medium(),
            burnout_high: default_burnout_high(),
            high_risk: default_regret_risk(),
            history_window_days: default_window(),
            sustained_overload_days: default_sustained(),
            retrigger_cooldown_hours: default_cooldown(),
            stalled_after_days: default_stalled(),
        }
    }
}

/// AI text-generation collaborator (Ollama-compatible `/api/generate`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiConfig {
    /// When false, rule-based recommendation text is used.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_ai_url")]
    pub base_url: String,
    #[serde(default = "default_ai_model")]
    pub model: String,
    #[serde(default = "default_ai_timeout")]
    pub timeout_secs: u64,
}

fn default_ai_url() -> String {
    "http://localhost:11434".into()
}
fn default_ai_model() -> String {
    "llama3:8b".into()
}
fn default_ai_timeout() -> u64 {
    20
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_ai_url(),
            model: default_ai_model(),
            timeout_secs: default_ai_timeout(),
        }
    }
}

/// Listen address of `lifeplanned`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8210
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl PlannerConfig {
    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Apply `LIFEPLAN_BIND` / `LIFEPLAN_PORT` overrides.
    pub fn apply_env(&mut self) -> ConfigResult<()> {
        if let Ok(bind) = std::env::var("LIFEPLAN_BIND") {
            self.server.bind = bind;
        }
        if let Ok(port) = std::env::var("LIFEPLAN_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::Invalid {
                key: "LIFEPLAN_PORT".into(),
                message: format!("not a port number: {port}"),
            })?;
        }
        Ok(())
    }

    /// Reject values the planner cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.planning.daily_budget_minutes == 0 {
            return Err(ConfigError::Invalid {
                key: "planning.daily_budget_minutes".into(),
                message: "must be greater than zero".into(),
            });
        }
        parse_day_start(&self.planning.day_start)?;
        parse_timezone(&self.planning.timezone)?;
        let t = &self.thresholds;
        if !(t.burnout_medium < t.burnout_high) {
            return Err(ConfigError::Invalid {
                key: "thresholds.burnout_medium".into(),
                message: format!(
                    "must be below burnout_high ({} >= {})",
                    t.burnout_medium, t.burnout_high
                ),
            });
        }
        if t.overload_percent <= 0.0 {
            return Err(ConfigError::Invalid {
                key: "thresholds.overload_percent".into(),
                message: "must be positive".into(),
            });
        }
        if t.high_risk > 100 {
            return Err(ConfigError::Invalid {
                key: "thresholds.high_risk".into(),
                message: "must be within 0-100".into(),
            });
        }
        Ok(())
    }
}

/// Parse an `HH:MM` (or `HH:MM:SS`) wall-clock time.
pub fn parse_day_start(s: &str) -> ConfigResult<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| ConfigError::Invalid {
            key: "day_start".into(),
            message: format!("expected HH:MM, got {s:?}"),
        })
}

/// Parse an IANA timezone name.
pub fn parse_timezone(s: &str) -> ConfigResult<Tz> {
    s.parse::<Tz>().map_err(|_| ConfigError::Invalid {
        key: "timezone".into(),
        message: format!("unknown timezone {s:?}"),
    })
}
