//! Configuration loader.

use std::fs;
use std::path::Path;

use regex::Regex;
use toml::{Table, Value};

use crate::error::ConfigError;
use crate::schema::Config;

/// Prefix of environment variables that override file values.
///
/// `JOBVISOR__JOBS__KILL_WAIT_MS=1000` sets `jobs.kill_wait_ms`.
pub const ENV_OVERRIDE_PREFIX: &str = "JOBVISOR__";

/// Configuration loader with environment variable substitution and overrides.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::load_with_overrides(&content, std::env::vars())
    }

    /// Load configuration from a file if it exists, otherwise start from defaults.
    ///
    /// Environment overrides apply in both cases.
    pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Self::load_with_overrides("", std::env::vars())
        }
    }

    /// Load configuration from a string. No environment overrides are applied.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        Self::load_with_overrides(content, std::iter::empty())
    }

    /// Load configuration from a string and apply the given override variables.
    ///
    /// Variables without the [`ENV_OVERRIDE_PREFIX`] are ignored.
    pub fn load_with_overrides<I>(content: &str, vars: I) -> Result<Config, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let expanded = Self::expand_env_vars(content)?;
        let mut table: Table = toml::from_str(&expanded)?;
        Self::apply_overrides(&mut table, vars)?;
        let config: Config = Value::Table(table).try_into()?;
        Ok(config)
    }

    /// Merge `JOBVISOR__SECTION__KEY` variables into a parsed table.
    pub fn apply_overrides<I>(table: &mut Table, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, raw) in vars {
            let Some(path) = key.strip_prefix(ENV_OVERRIDE_PREFIX) else {
                continue;
            };
            let segments: Vec<String> = path
                .split("__")
                .map(|s| s.to_ascii_lowercase())
                .collect();
            if segments.iter().any(|s| s.is_empty()) {
                return Err(ConfigError::InvalidFormat(format!(
                    "malformed override variable: {key}"
                )));
            }
            insert_path(table, &segments, parse_override(&raw));
        }
        Ok(())
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        let mut result = content.to_string();

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    /// Expand shell-style paths (e.g., `~/.config`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}

/// Interpret an override as a TOML value, falling back to a plain string.
fn parse_override(raw: &str) -> Value {
    toml::from_str::<Table>(&format!("v = {raw}"))
        .ok()
        .and_then(|mut t| t.remove("v"))
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

fn insert_path(table: &mut Table, segments: &[String], value: Value) {
    let (last, parents) = match segments.split_last() {
        Some(split) => split,
        None => return,
    };

    let mut current = table;
    for segment in parents {
        let entry = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Table(Table::new()));
        if !entry.is_table() {
            *entry = Value::Table(Table::new());
        }
        current = match entry {
            Value::Table(t) => t,
            _ => return,
        };
    }
    current.insert(last.clone(), value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_load_empty_config() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.jobs.kill_wait_ms, 5000);
        assert!(config.jobs.enabled);
    }

    #[test]
    fn test_load_basic_config() {
        let content = r#"
            [jobs]
            timezone = "Europe/Lisbon"
            kill_wait_ms = 250
            controllers_enabled = ["Reports"]
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.jobs.timezone, "Europe/Lisbon");
        assert_eq!(config.jobs.kill_wait_ms, 250);
        assert_eq!(
            config.jobs.controllers_enabled,
            Some(vec!["Reports".to_string()])
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[jobs]").unwrap();
        writeln!(file, "health_check_interval_secs = 7").unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.jobs.health_check_interval_secs, 7);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ConfigLoader::load(Path::new("/nonexistent/path/jobvisor.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigLoader::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.jobs.timezone, "UTC");
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = ConfigLoader::load_str("invalid = [unclosed");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_override_integer() {
        let config = ConfigLoader::load_with_overrides(
            "[jobs]\nkill_wait_ms = 100",
            vars(&[("JOBVISOR__JOBS__KILL_WAIT_MS", "900")]),
        )
        .unwrap();
        assert_eq!(config.jobs.kill_wait_ms, 900);
    }

    #[test]
    fn test_override_creates_missing_section() {
        let config = ConfigLoader::load_with_overrides(
            "",
            vars(&[
                ("JOBVISOR__JOBS__ENABLED", "false"),
                ("JOBVISOR__LOGGING__LEVEL", "debug"),
            ]),
        )
        .unwrap();
        assert!(!config.jobs.enabled);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_override_array_value() {
        let config = ConfigLoader::load_with_overrides(
            "",
            vars(&[("JOBVISOR__JOBS__APPS_ENABLED", r#"["billing", "crm"]"#)]),
        )
        .unwrap();
        assert_eq!(
            config.jobs.apps_enabled,
            Some(vec!["billing".to_string(), "crm".to_string()])
        );
    }

    #[test]
    fn test_override_bare_string() {
        let config = ConfigLoader::load_with_overrides(
            "",
            vars(&[("JOBVISOR__JOBS__TIMEZONE", "America/Sao_Paulo")]),
        )
        .unwrap();
        assert_eq!(config.jobs.timezone, "America/Sao_Paulo");
    }

    #[test]
    fn test_unprefixed_variables_ignored() {
        let config = ConfigLoader::load_with_overrides(
            "",
            vars(&[("PATH", "/usr/bin"), ("JOBVISOR_CONFIG", "x.toml")]),
        )
        .unwrap();
        assert_eq!(config.jobs.kill_wait_ms, 5000);
    }

    #[test]
    fn test_malformed_override_rejected() {
        let result = ConfigLoader::load_with_overrides(
            "",
            vars(&[("JOBVISOR__JOBS____KILL_WAIT_MS", "1")]),
        );
        assert!(matches!(result, Err(ConfigError::InvalidFormat(_))));
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: This test runs in isolation and sets a unique test-only env var
        unsafe {
            std::env::set_var("JOBVISOR_TEST_TZ_VAR", "Asia/Tokyo");
        }
        let content = "[jobs]\ntimezone = \"${JOBVISOR_TEST_TZ_VAR}\"";
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.jobs.timezone, "Asia/Tokyo");
        unsafe {
            std::env::remove_var("JOBVISOR_TEST_TZ_VAR");
        }
    }

    #[test]
    fn test_expand_env_vars_not_set() {
        let content = "value = \"${NONEXISTENT_TEST_VAR_12345}\"";
        let result = ConfigLoader::expand_env_vars(content);
        assert!(matches!(result, Err(ConfigError::EnvVarNotSet(_))));
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = ConfigLoader::expand_path("~/test");
        assert!(!expanded.starts_with('~'));
        assert!(expanded.ends_with("/test"));
    }

    #[test]
    fn test_expand_path_no_tilde() {
        assert_eq!(ConfigLoader::expand_path("/usr/local/bin"), "/usr/local/bin");
    }
}
