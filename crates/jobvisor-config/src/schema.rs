//! Configuration schema definitions.

use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.jobs.validate()?;
        self.logging.validate()
    }
}

/// Job subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Whether the job subsystem runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// IANA time zone used to evaluate cron expressions.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Wait after each termination signal before checking the child again (ms).
    #[serde(default = "default_kill_wait_ms")]
    pub kill_wait_ms: u64,

    /// Interval between health sweeps over all workers (seconds).
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,

    /// Interval of the parent liveness probe run inside child processes (seconds).
    #[serde(default = "default_parent_probe_interval")]
    pub parent_probe_interval_secs: u64,

    /// Applications allowed to register jobs. `None` allows all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applications_enabled: Option<Vec<String>>,

    /// Apps allowed to register jobs. `None` allows all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apps_enabled: Option<Vec<String>>,

    /// Controllers allowed to register jobs. `None` allows all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controllers_enabled: Option<Vec<String>>,

    /// Executable spawned for job processes. Defaults to the running binary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_kill_wait_ms() -> u64 {
    5000
}

fn default_health_check_interval() -> u64 {
    30
}

fn default_parent_probe_interval() -> u64 {
    10
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            timezone: default_timezone(),
            kill_wait_ms: default_kill_wait_ms(),
            health_check_interval_secs: default_health_check_interval(),
            parent_probe_interval_secs: default_parent_probe_interval(),
            applications_enabled: None,
            apps_enabled: None,
            controllers_enabled: None,
            program: None,
        }
    }
}

impl JobsConfig {
    /// Get the kill wait as a Duration.
    pub fn kill_wait(&self) -> Duration {
        Duration::from_millis(self.kill_wait_ms)
    }

    /// Get the health check interval as a Duration.
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    /// Get the parent probe interval as a Duration.
    pub fn parent_probe_interval(&self) -> Duration {
        Duration::from_secs(self.parent_probe_interval_secs)
    }

    /// Resolve the configured time zone.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::invalid("jobs.timezone", e.to_string()))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kill_wait_ms == 0 {
            return Err(ConfigError::invalid("jobs.kill_wait_ms", "must be > 0"));
        }

        if self.health_check_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "jobs.health_check_interval_secs",
                "must be > 0",
            ));
        }

        if self.parent_probe_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "jobs.parent_probe_interval_secs",
                "must be > 0",
            ));
        }

        self.tz()?;
        Ok(())
    }
}

/// Logging configuration for the binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set.
    #[serde(default = "default_level")]
    pub level: String,

    /// Directory for rolling log files (`~` is expanded).
    #[serde(default = "default_directory")]
    pub directory: String,

    /// Number of daily log files kept.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Colored console output.
    #[serde(default = "default_true")]
    pub ansi: bool,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_directory() -> String {
    "~/.jobvisor/logs".to_string()
}

fn default_max_files() -> usize {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            directory: default_directory(),
            max_files: default_max_files(),
            ansi: default_true(),
        }
    }
}

impl LoggingConfig {
    /// Log directory with `~` expanded.
    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.directory).to_string())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_files == 0 {
            return Err(ConfigError::invalid("logging.max_files", "must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
