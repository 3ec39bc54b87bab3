//! Configuration loading from TOML files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// File-level configuration for sharegen.
///
/// Every setting is optional; unset values fall through to the built-in
/// defaults. CLI flags and environment variables take precedence.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub run: RunConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: Option<String>,
    pub client_id: Option<String>,
    pub ttl_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub app_token: Option<String>,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Admissions per window
    pub capacity: Option<usize>,
    pub window_secs: Option<f64>,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub factor: Option<f64>,
    pub max_delay_secs: Option<f64>,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(default)]
pub struct RunConfig {
    pub workers: Option<usize>,
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
    /// 1. ./sharegen.toml (current directory)
    /// 2. ~/.config/sharegen/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("sharegen.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "sharegen") {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.provider.base_url.is_none());
        assert!(config.provider.secret.is_none());
        assert!(config.rate_limit.capacity.is_none());
        assert!(config.run.workers.is_none());
    }

    #[test]
    fn expand_env_var_simple() {
        std::env::set_var("SHAREGEN_TEST_VAR", "test_value");
        assert_eq!(
            expand_env_var("${SHAREGEN_TEST_VAR}"),
            Some("test_value".to_string())
        );
        std::env::remove_var("SHAREGEN_TEST_VAR");
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
[provider]
base_url = "https://api.sumsub.example"
client_id = "partner_1"
ttl_secs = 3600
secret = "${NONEXISTENT_VAR_12345}"

[rate_limit]
capacity = 20
window_secs = 2.5

[retry]
max_attempts = 5
base_delay_ms = 250

[run]
workers = 4
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.provider.base_url.as_deref(),
            Some("https://api.sumsub.example")
        );
        assert_eq!(config.provider.client_id.as_deref(), Some("partner_1"));
        assert_eq!(config.provider.ttl_secs, Some(3600));
        assert_eq!(config.provider.secret, None);
        assert_eq!(config.rate_limit.capacity, Some(20));
        assert_eq!(config.rate_limit.window_secs, Some(2.5));
        assert_eq!(config.retry.max_attempts, Some(5));
        assert_eq!(config.retry.base_delay_ms, Some(250));
        assert_eq!(config.retry.factor, None);
        assert_eq!(config.run.workers, Some(4));
    }

    #[test]
    fn from_file_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sharegen.toml");
        std::fs::write(&path, "[rate_limit]\ncapacity = \"many\"\n").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("sharegen.toml"));
    }
}
