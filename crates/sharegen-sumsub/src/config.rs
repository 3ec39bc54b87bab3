//! Runtime configuration for a share-token run

use std::path::PathBuf;
use std::time::Duration;

use sharegen_core::RetryPolicy;
use sharegen_core::rate_limit::{DEFAULT_CAPACITY, DEFAULT_WINDOW};

use crate::api::{ClientConfig, Credentials};
use crate::state::RunMode;

/// Resolved settings from every source, before defaults (plain struct, no clap derive).
///
/// The binary fills this from CLI flags, environment and config file in
/// that order of precedence; `None` falls through to the built-in default.
#[derive(Debug, Default)]
pub struct RunArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    pub app_token: Option<String>,
    pub secret: Option<String>,
    pub base_url: Option<String>,
    pub client_id: Option<String>,
    pub ttl_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub rate_limit: Option<usize>,
    pub rate_window_secs: Option<f64>,
    pub max_attempts: Option<u32>,
    pub base_delay: Option<Duration>,
    pub backoff_factor: Option<f64>,
    pub max_delay_secs: Option<f64>,
    pub workers: Option<usize>,
    pub resume: bool,
    pub dry_run: bool,
}

/// Missing or invalid setting; always fatal before any record is read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Required credential variable absent or empty
    MissingCredential(&'static str),
    Invalid { field: &'static str, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCredential(var) => write!(f, "{var} is not set"),
            Self::Invalid { field, reason } => write!(f, "invalid {field}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Runtime configuration for sharegen
#[derive(Debug, Clone)]
pub struct Config {
    pub input: PathBuf,
    pub output: PathBuf,
    pub credentials: Credentials,
    pub client: ClientConfig,
    pub rate_limit: usize,
    pub rate_window: Duration,
    pub retry: RetryPolicy,
    pub workers: usize,
    pub mode: RunMode,
}

impl TryFrom<RunArgs> for Config {
    type Error = ConfigError;

    fn try_from(args: RunArgs) -> Result<Self, Self::Error> {
        let app_token = required(args.app_token, "SUMSUB_APP_TOKEN")?;
        let secret = required(args.secret, "SUMSUB_SECRET")?;

        let defaults = ClientConfig::default();
        let base_url = args.base_url.unwrap_or(defaults.base_url);
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "base URL",
                reason: format!("{base_url:?} is not an http(s) URL"),
            });
        }
        let client = ClientConfig {
            base_url,
            client_id: args.client_id.unwrap_or(defaults.client_id),
            ttl_secs: positive(args.ttl_secs.unwrap_or(defaults.ttl_secs), "ttl")?,
            request_timeout: match args.request_timeout_secs {
                Some(secs) => Duration::from_secs(positive(secs, "request timeout")?),
                None => defaults.request_timeout,
            },
        };

        let policy = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: positive(
                args.max_attempts.unwrap_or(policy.max_attempts),
                "max attempts",
            )?,
            base_delay: args.base_delay.unwrap_or(policy.base_delay),
            factor: args.backoff_factor.unwrap_or(policy.factor),
            max_delay: match args.max_delay_secs {
                Some(secs) => Some(seconds(secs, "max delay")?),
                None => policy.max_delay,
            },
        };
        if !(retry.factor.is_finite() && retry.factor >= 1.0) {
            return Err(ConfigError::Invalid {
                field: "backoff factor",
                reason: format!("{} must be at least 1.0", retry.factor),
            });
        }

        let rate_window = match args.rate_window_secs {
            Some(secs) => seconds(secs, "rate window")?,
            None => DEFAULT_WINDOW,
        };

        Ok(Self {
            input: args.input,
            output: args.output,
            credentials: Credentials { app_token, secret },
            client,
            rate_limit: positive(args.rate_limit.unwrap_or(DEFAULT_CAPACITY), "rate limit")?,
            rate_window,
            retry,
            workers: positive(args.workers.unwrap_or(1), "workers")?,
            mode: RunMode {
                resume: args.resume,
                dry_run: args.dry_run,
            },
        })
    }
}

fn required(value: Option<String>, var: &'static str) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingCredential(var))
}

/// Fractional seconds as a nonzero duration
fn seconds(secs: f64, field: &'static str) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
        .ok_or_else(|| ConfigError::Invalid {
            field,
            reason: format!("{secs} is not a positive number of seconds"),
        })
}

fn positive<T>(value: T, field: &'static str) -> Result<T, ConfigError>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{value} must be greater than zero"),
        })
    }
}
