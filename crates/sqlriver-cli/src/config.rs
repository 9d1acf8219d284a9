//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use sqlriver_core::{
    ConnectParams, CycleErrorPolicy, IndexTarget, OverloadPolicy, RetryPolicy, RiverSettings,
    WriterSettings,
};
use sqlriver_elastic::ElasticSettings;

/// Global configuration for sqlriver
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub index: IndexConfig,
    pub elasticsearch: ElasticConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub driver: String,
    /// Connection string; empty or `:memory:` opens an in-memory database
    pub url: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub username: Option<String>,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub password: Option<String>,
    pub sql: String,
    /// 0 = start the next cycle immediately
    pub poll_interval_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            driver: "duckdb".to_string(),
            url: ":memory:".to_string(),
            username: None,
            password: None,
            sql: String::new(),
            poll_interval_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub bulk_size: usize,
    pub max_bulk_requests: usize,
    pub bulk_timeout_ms: u64,
    pub overload: OverloadPolicy,
    pub submit_retries: u32,
    pub retry_backoff_ms: u64,
    pub fail_on_submission_error: bool,
    pub on_cycle_error: CycleErrorPolicy,
    pub shutdown_timeout_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: "jdbc".to_string(),
            doc_type: "jdbc".to_string(),
            bulk_size: 100,
            max_bulk_requests: 30,
            bulk_timeout_ms: 60_000,
            overload: OverloadPolicy::default(),
            submit_retries: 0,
            retry_backoff_ms: 1000,
            fail_on_submission_error: false,
            on_cycle_error: CycleErrorPolicy::default(),
            shutdown_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElasticConfig {
    pub url: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub username: Option<String>,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub password: Option<String>,
    pub legacy_types: bool,
    pub timeout_secs: u64,
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            username: None,
            password: None,
            legacy_types: false,
            timeout_secs: 60,
        }
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./sqlriver.toml (current directory)
    /// 2. ~/.config/sqlriver/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("sqlriver.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "sqlriver") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Reject settings the river cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.source.sql.trim().is_empty() {
            anyhow::bail!("[source] sql is required");
        }
        if self.index.name.is_empty() {
            anyhow::bail!("[index] name must not be empty");
        }
        Ok(())
    }

    pub fn river_settings(&self) -> RiverSettings {
        let source = &self.source;
        let index = &self.index;
        RiverSettings {
            name: index.name.clone(),
            source: ConnectParams {
                driver: source.driver.clone(),
                url: source.url.clone(),
                username: source.username.clone(),
                password: source.password.clone(),
            },
            sql: source.sql.clone(),
            target: IndexTarget::new(index.name.as_str(), index.doc_type.as_str()),
            poll_interval: Duration::from_secs(source.poll_interval_secs),
            writer: WriterSettings {
                bulk_size: index.bulk_size,
                max_active_requests: index.max_bulk_requests,
                max_wait: Duration::from_millis(index.bulk_timeout_ms),
                overload: index.overload,
                retry: RetryPolicy {
                    max_retries: index.submit_retries,
                    base: Duration::from_millis(index.retry_backoff_ms),
                },
            },
            on_cycle_error: index.on_cycle_error,
            fail_on_submission_error: index.fail_on_submission_error,
            shutdown_timeout: Duration::from_millis(index.shutdown_timeout_ms),
        }
    }

    pub fn elastic_settings(&self) -> ElasticSettings {
        let es = &self.elasticsearch;
        ElasticSettings {
            url: es.url.clone(),
            username: es.username.clone(),
            password: es.password.clone(),
            legacy_types: es.legacy_types,
            timeout: Duration::from_secs(es.timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.source.driver, "duckdb");
        assert_eq!(config.source.poll_interval_secs, 3600);
        assert_eq!(config.index.name, "jdbc");
        assert_eq!(config.index.doc_type, "jdbc");
        assert_eq!(config.index.bulk_size, 100);
        assert_eq!(config.index.max_bulk_requests, 30);
        assert_eq!(config.index.bulk_timeout_ms, 60_000);
        assert_eq!(config.index.overload, OverloadPolicy::Proceed);
        assert_eq!(config.index.on_cycle_error, CycleErrorPolicy::Stop);
    }

    #[test]
    fn expand_env_var_simple() {
        std::env::set_var("SQLRIVER_TEST_VAR", "test_value");
        assert_eq!(
            expand_env_var("${SQLRIVER_TEST_VAR}"),
            Some("test_value".to_string())
        );
        std::env::remove_var("SQLRIVER_TEST_VAR");
    }

    #[test]
    fn expand_env_var_literal() {
        assert_eq!(expand_env_var("literal"), Some("literal".to_string()));
    }

    #[test]
    fn expand_env_var_missing() {
        assert_eq!(expand_env_var("${NONEXISTENT_VAR_12345}"), None);
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[source]
url = "data/app.duckdb"
sql = "SELECT id AS _id, name FROM people"
poll_interval_secs = 0

[index]
name = "people"
type = "person"
bulk_size = 500
overload = "block"
submit_retries = 3
on_cycle_error = "retry"

[elasticsearch]
url = "http://es:9200"
legacy_types = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        config.validate().unwrap();

        let settings = config.river_settings();
        assert_eq!(settings.target, IndexTarget::new("people", "person"));
        assert_eq!(settings.poll_interval, Duration::ZERO);
        assert_eq!(settings.writer.bulk_size, 500);
        assert_eq!(settings.writer.max_active_requests, 30);
        assert_eq!(settings.writer.overload, OverloadPolicy::Block);
        assert_eq!(settings.writer.retry.max_retries, 3);
        assert_eq!(settings.on_cycle_error, CycleErrorPolicy::Retry);
        assert_eq!(settings.source.driver, "duckdb");

        let es = config.elastic_settings();
        assert_eq!(es.url, "http://es:9200");
        assert!(es.legacy_types);
        assert_eq!(es.timeout, Duration::from_secs(60));
    }

    #[test]
    fn unknown_overload_policy_rejected() {
        let toml = "[index]\noverload = \"drop\"\n";
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn missing_sql_fails_validation() {
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sqlriver.toml");
        std::fs::write(&path, "[source]\nsql = \"SELECT 1\"\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.source.sql, "SELECT 1");
        assert!(Config::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
