//! Configuration loading for harvest.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `HARVEST_`, producing a typed [`AppConfig`]. Provider credentials also
//! fall back to their conventional unprefixed names (`GITHUB_TOKEN`, ...).

use std::{collections::BTreeMap, env, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const ENV_PREFIX: &str = "HARVEST_";
const REDACTED: &str = "[REDACTED]";

/// Unprefixed variable names accepted for credentials, keyed by the
/// stripped `HARVEST_*` name they stand in for.
const CREDENTIAL_FALLBACKS: &[(&str, &str)] = &[
    ("GITHUB_TOKEN", "GITHUB_TOKEN"),
    ("READWISE_TOKEN", "READWISE_TOKEN"),
    ("RAINDROP_TOKEN", "RAINDROP_ACCESS_TOKEN"),
    ("TWITTER_BEARER_TOKEN", "TWITTER_BEARER_TOKEN"),
    ("PAYPAL_CLIENT_ID", "PAYPAL_CLIENT_ID"),
    ("PAYPAL_CLIENT_SECRET", "PAYPAL_CLIENT_SECRET"),
    ("ANTHROPIC_API_KEY", "ANTHROPIC_API_KEY"),
];

/// Application configuration derived from `HARVEST_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Directory holding progress stores and digests
    #[serde(default = "default_progress_dir")]
    pub progress_dir: PathBuf,
    /// Per-request timeout; `0` disables it
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<usize>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub api_bases: ApiBases,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub anthropic: AnthropicSettings,
}

/// Retry schedule for transient provider failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RetryConfig {
    /// Environment variable: `HARVEST_RETRY_MAX_RETRIES`
    #[serde(default = "default_retry_max_retries")]
    pub max_retries: u32,
    /// Delay before retry n is `base_delay_seconds * n`.
    ///
    /// Environment variable: `HARVEST_RETRY_BASE_DELAY_SECONDS`
    #[serde(default = "default_retry_base_delay_seconds")]
    pub base_delay_seconds: u64,
}

/// Rate limit handling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RateLimitConfig {
    /// Seconds added after the advertised reset time
    ///
    /// Environment variable: `HARVEST_RATE_LIMIT_BUFFER_SECONDS`
    #[serde(default = "default_rate_limit_buffer_seconds")]
    pub buffer_seconds: u64,
    /// Upper bound on a single wait
    ///
    /// Environment variable: `HARVEST_RATE_LIMIT_MAX_WAIT_SECONDS`
    #[serde(default = "default_rate_limit_max_wait_seconds")]
    pub max_wait_seconds: u64,
    /// Waits allowed for one request before giving up
    ///
    /// Environment variable: `HARVEST_RATE_LIMIT_MAX_WAITS`
    #[serde(default = "default_rate_limit_max_waits")]
    pub max_waits: u32,
}

/// Base URLs of the remote APIs. Overridable for testing against mock servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ApiBases {
    #[serde(default = "default_github_api_base")]
    pub github: String,
    #[serde(default = "default_readwise_api_base")]
    pub readwise: String,
    #[serde(default = "default_raindrop_api_base")]
    pub raindrop: String,
    #[serde(default = "default_hn_api_base")]
    pub hn: String,
    #[serde(default = "default_twitter_api_base")]
    pub twitter: String,
    #[serde(default = "default_paypal_api_base")]
    pub paypal: String,
    #[serde(default = "default_anthropic_api_base")]
    pub anthropic: String,
}

/// Provider credentials. Never printed unredacted.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readwise_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raindrop_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter_bearer_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paypal_client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paypal_client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mark = |value: &Option<String>| value.as_ref().map(|_| REDACTED);
        f.debug_struct("Credentials")
            .field("github_token", &mark(&self.github_token))
            .field("readwise_token", &mark(&self.readwise_token))
            .field("raindrop_token", &mark(&self.raindrop_token))
            .field("twitter_bearer_token", &mark(&self.twitter_bearer_token))
            .field("paypal_client_id", &mark(&self.paypal_client_id))
            .field("paypal_client_secret", &mark(&self.paypal_client_secret))
            .field("anthropic_api_key", &mark(&self.anthropic_api_key))
            .finish()
    }
}

/// Anthropic Messages API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AnthropicSettings {
    #[serde(default = "default_anthropic_model")]
    pub model: String,
    #[serde(default = "default_anthropic_max_tokens")]
    pub max_tokens: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            progress_dir: default_progress_dir(),
            http_timeout_secs: default_http_timeout_secs(),
            user_agent: default_user_agent(),
            max_pages: None,
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            api_bases: ApiBases::default(),
            credentials: Credentials::default(),
            anthropic: AnthropicSettings::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_retry_max_retries(),
            base_delay_seconds: default_retry_base_delay_seconds(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            buffer_seconds: default_rate_limit_buffer_seconds(),
            max_wait_seconds: default_rate_limit_max_wait_seconds(),
            max_waits: default_rate_limit_max_waits(),
        }
    }
}

impl Default for ApiBases {
    fn default() -> Self {
        Self {
            github: default_github_api_base(),
            readwise: default_readwise_api_base(),
            raindrop: default_raindrop_api_base(),
            hn: default_hn_api_base(),
            twitter: default_twitter_api_base(),
            paypal: default_paypal_api_base(),
            anthropic: default_anthropic_api_base(),
        }
    }
}

impl Default for AnthropicSettings {
    fn default() -> Self {
        Self {
            model: default_anthropic_model(),
            max_tokens: default_anthropic_max_tokens(),
        }
    }
}

impl RetryConfig {
    /// Validate retry bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries > 20 {
            return Err(ConfigError::InvalidRetryCount {
                value: self.max_retries,
            });
        }
        if self.base_delay_seconds > 600 {
            return Err(ConfigError::InvalidRetryDelay {
                value: self.base_delay_seconds,
            });
        }
        Ok(())
    }
}

impl RateLimitConfig {
    /// Validate rate limit bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_seconds > 300 {
            return Err(ConfigError::InvalidRateLimitBuffer {
                value: self.buffer_seconds,
            });
        }
        if self.max_wait_seconds == 0 || self.max_wait_seconds > 86_400 {
            return Err(ConfigError::InvalidRateLimitMaxWait {
                value: self.max_wait_seconds,
            });
        }
        if self.max_waits == 0 || self.max_waits > 100 {
            return Err(ConfigError::InvalidRateLimitMaxWaits {
                value: self.max_waits,
            });
        }
        Ok(())
    }
}

impl ApiBases {
    fn entries(&self) -> [(&'static str, &str); 7] {
        [
            ("GITHUB_API_BASE", &self.github),
            ("READWISE_API_BASE", &self.readwise),
            ("RAINDROP_API_BASE", &self.raindrop),
            ("HN_API_BASE", &self.hn),
            ("TWITTER_API_BASE", &self.twitter),
            ("PAYPAL_API_BASE", &self.paypal),
            ("ANTHROPIC_API_BASE", &self.anthropic),
        ]
    }

    /// Every base must be an absolute http(s) URL
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in self.entries() {
            match Url::parse(value) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                _ => {
                    return Err(ConfigError::InvalidApiBase {
                        name: format!("{}{}", ENV_PREFIX, name),
                        value: value.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Credentials {
    fn require<'a>(value: &'a Option<String>, var: &'static str) -> Result<&'a str, ConfigError> {
        value
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingCredential { var })
    }

    pub fn github_token(&self) -> Result<&str, ConfigError> {
        Self::require(&self.github_token, "HARVEST_GITHUB_TOKEN or GITHUB_TOKEN")
    }

    pub fn readwise_token(&self) -> Result<&str, ConfigError> {
        Self::require(&self.readwise_token, "HARVEST_READWISE_TOKEN or READWISE_TOKEN")
    }

    pub fn raindrop_token(&self) -> Result<&str, ConfigError> {
        Self::require(
            &self.raindrop_token,
            "HARVEST_RAINDROP_TOKEN or RAINDROP_ACCESS_TOKEN",
        )
    }

    pub fn twitter_bearer_token(&self) -> Result<&str, ConfigError> {
        Self::require(
            &self.twitter_bearer_token,
            "HARVEST_TWITTER_BEARER_TOKEN or TWITTER_BEARER_TOKEN",
        )
    }

    pub fn paypal_client_id(&self) -> Result<&str, ConfigError> {
        Self::require(
            &self.paypal_client_id,
            "HARVEST_PAYPAL_CLIENT_ID or PAYPAL_CLIENT_ID",
        )
    }

    pub fn paypal_client_secret(&self) -> Result<&str, ConfigError> {
        Self::require(
            &self.paypal_client_secret,
            "HARVEST_PAYPAL_CLIENT_SECRET or PAYPAL_CLIENT_SECRET",
        )
    }

    pub fn anthropic_api_key(&self) -> Result<&str, ConfigError> {
        Self::require(
            &self.anthropic_api_key,
            "HARVEST_ANTHROPIC_API_KEY or ANTHROPIC_API_KEY",
        )
    }

    fn redact(&mut self) {
        for secret in [
            &mut self.github_token,
            &mut self.readwise_token,
            &mut self.raindrop_token,
            &mut self.twitter_bearer_token,
            &mut self.paypal_client_id,
            &mut self.paypal_client_secret,
            &mut self.anthropic_api_key,
        ] {
            if secret.is_some() {
                *secret = Some(REDACTED.to_string());
            }
        }
    }
}

impl AppConfig {
    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        config.credentials.redact();
        serde_json::to_string_pretty(&config)
    }

    /// Validates every numeric bound and URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.log_format.as_str(), "compact" | "pretty" | "json") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        if self.http_timeout_secs > 600 {
            return Err(ConfigError::InvalidHttpTimeout {
                value: self.http_timeout_secs,
            });
        }

        if self.max_pages == Some(0) {
            return Err(ConfigError::InvalidMaxPages);
        }

        if self.progress_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyProgressDir);
        }

        self.retry.validate()?;
        self.rate_limit.validate()?;
        self.api_bases.validate()?;

        if self.anthropic.model.trim().is_empty() {
            return Err(ConfigError::EmptyAnthropicModel);
        }
        if self.anthropic.max_tokens == 0 || self.anthropic.max_tokens > 64_000 {
            return Err(ConfigError::InvalidAnthropicMaxTokens {
                value: self.anthropic.max_tokens,
            });
        }

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_progress_dir() -> PathBuf {
    PathBuf::from("caches")
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("harvest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_retry_max_retries() -> u32 {
    5
}

fn default_retry_base_delay_seconds() -> u64 {
    10
}

fn default_rate_limit_buffer_seconds() -> u64 {
    1
}

fn default_rate_limit_max_wait_seconds() -> u64 {
    3600 // 1 hour
}

fn default_rate_limit_max_waits() -> u32 {
    10
}

fn default_github_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_readwise_api_base() -> String {
    "https://readwise.io".to_string()
}

fn default_raindrop_api_base() -> String {
    "https://api.raindrop.io".to_string()
}

fn default_hn_api_base() -> String {
    "https://hn.algolia.com".to_string()
}

fn default_twitter_api_base() -> String {
    "https://api.twitter.com".to_string()
}

fn default_paypal_api_base() -> String {
    "https://api-m.sandbox.paypal.com".to_string()
}

fn default_anthropic_api_base() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-sonnet-latest".to_string()
}

fn default_anthropic_max_tokens() -> u32 {
    1000
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid value '{value}' for HARVEST_{key}: expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },
    #[error("log format must be one of compact, pretty, json; got '{value}'")]
    InvalidLogFormat { value: String },
    #[error("HTTP timeout must not exceed 600 seconds, got {value}")]
    InvalidHttpTimeout { value: u64 },
    #[error("HARVEST_MAX_PAGES must be at least 1")]
    InvalidMaxPages,
    #[error("HARVEST_PROGRESS_DIR must not be empty")]
    EmptyProgressDir,
    #[error("retry count must not exceed 20, got {value}")]
    InvalidRetryCount { value: u32 },
    #[error("retry base delay must not exceed 600 seconds, got {value}")]
    InvalidRetryDelay { value: u64 },
    #[error("rate limit buffer must not exceed 300 seconds, got {value}")]
    InvalidRateLimitBuffer { value: u64 },
    #[error("rate limit max wait must be between 1 and 86400 seconds, got {value}")]
    InvalidRateLimitMaxWait { value: u64 },
    #[error("rate limit max waits must be between 1 and 100, got {value}")]
    InvalidRateLimitMaxWaits { value: u32 },
    #[error("{name} must be an absolute http(s) URL, got '{value}'")]
    InvalidApiBase { name: String, value: String },
    #[error("Anthropic model must not be empty")]
    EmptyAnthropicModel,
    #[error("Anthropic max tokens must be between 1 and 64000, got {value}")]
    InvalidAnthropicMaxTokens { value: u32 },
    #[error("credential is missing; set {var} environment variable")]
    MissingCredential { var: &'static str },
}

/// Loads configuration using layered `.env` files and `HARVEST_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

/// Values gathered from env files and the process environment
#[derive(Default)]
struct Layered {
    /// `HARVEST_*` keys with the prefix stripped
    prefixed: BTreeMap<String, String>,
    /// Unprefixed credential fallbacks
    fallback: BTreeMap<String, String>,
}

impl Layered {
    fn insert(&mut self, key: &str, value: String) {
        if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
            self.prefixed.insert(stripped.to_string(), value);
        } else if CREDENTIAL_FALLBACKS.iter().any(|(_, name)| *name == key) {
            self.fallback.insert(key.to_string(), value);
        }
    }

    fn string(&mut self, key: &str) -> Option<String> {
        self.prefixed.remove(key).filter(|v| !v.trim().is_empty())
    }

    fn parsed<T: std::str::FromStr>(
        &mut self,
        key: &str,
        expected: &'static str,
    ) -> Result<Option<T>, ConfigError> {
        match self.string(key) {
            None => Ok(None),
            Some(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value,
                    expected,
                }),
        }
    }

    fn credential(&mut self, key: &str) -> Option<String> {
        self.string(key).or_else(|| {
            let (_, fallback) = CREDENTIAL_FALLBACKS.iter().find(|(name, _)| *name == key)?;
            self.fallback
                .remove(*fallback)
                .filter(|v| !v.trim().is_empty())
        })
    }
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Load and validate configuration. The process environment wins over
    /// every env file.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        for (key, value) in env::vars() {
            layered.insert(&key, value);
        }

        let profile = layered.string("PROFILE").unwrap_or(profile_hint);
        let log_level = layered.string("LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format = layered
            .string("LOG_FORMAT")
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_else(default_log_format);
        let progress_dir = layered
            .string("PROGRESS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_progress_dir);
        let http_timeout_secs = layered
            .parsed("HTTP_TIMEOUT_SECS", "a number of seconds")?
            .unwrap_or_else(default_http_timeout_secs);
        let user_agent = layered
            .string("USER_AGENT")
            .unwrap_or_else(default_user_agent);
        let max_pages = layered.parsed("MAX_PAGES", "a positive page count")?;

        let retry = RetryConfig {
            max_retries: layered
                .parsed("RETRY_MAX_RETRIES", "a retry count")?
                .unwrap_or_else(default_retry_max_retries),
            base_delay_seconds: layered
                .parsed("RETRY_BASE_DELAY_SECONDS", "a number of seconds")?
                .unwrap_or_else(default_retry_base_delay_seconds),
        };

        let rate_limit = RateLimitConfig {
            buffer_seconds: layered
                .parsed("RATE_LIMIT_BUFFER_SECONDS", "a number of seconds")?
                .unwrap_or_else(default_rate_limit_buffer_seconds),
            max_wait_seconds: layered
                .parsed("RATE_LIMIT_MAX_WAIT_SECONDS", "a number of seconds")?
                .unwrap_or_else(default_rate_limit_max_wait_seconds),
            max_waits: layered
                .parsed("RATE_LIMIT_MAX_WAITS", "a wait count")?
                .unwrap_or_else(default_rate_limit_max_waits),
        };

        let api_bases = ApiBases {
            github: layered
                .string("GITHUB_API_BASE")
                .unwrap_or_else(default_github_api_base),
            readwise: layered
                .string("READWISE_API_BASE")
                .unwrap_or_else(default_readwise_api_base),
            raindrop: layered
                .string("RAINDROP_API_BASE")
                .unwrap_or_else(default_raindrop_api_base),
            hn: layered
                .string("HN_API_BASE")
                .unwrap_or_else(default_hn_api_base),
            twitter: layered
                .string("TWITTER_API_BASE")
                .unwrap_or_else(default_twitter_api_base),
            paypal: layered
                .string("PAYPAL_API_BASE")
                .unwrap_or_else(default_paypal_api_base),
            anthropic: layered
                .string("ANTHROPIC_API_BASE")
                .unwrap_or_else(default_anthropic_api_base),
        };

        let credentials = Credentials {
            github_token: layered.credential("GITHUB_TOKEN"),
            readwise_token: layered.credential("READWISE_TOKEN"),
            raindrop_token: layered.credential("RAINDROP_TOKEN"),
            twitter_bearer_token: layered.credential("TWITTER_BEARER_TOKEN"),
            paypal_client_id: layered.credential("PAYPAL_CLIENT_ID"),
            paypal_client_secret: layered.credential("PAYPAL_CLIENT_SECRET"),
            anthropic_api_key: layered.credential("ANTHROPIC_API_KEY"),
        };

        let anthropic = AnthropicSettings {
            model: layered
                .string("ANTHROPIC_MODEL")
                .unwrap_or_else(default_anthropic_model),
            max_tokens: layered
                .parsed("ANTHROPIC_MAX_TOKENS", "a token count")?
                .unwrap_or_else(default_anthropic_max_tokens),
        };

        let config = AppConfig {
            profile,
            log_level,
            log_format,
            progress_dir,
            http_timeout_secs,
            user_agent,
            max_pages,
            retry,
            rate_limit,
            api_bases,
            credentials,
            anthropic,
        };

        config.validate()?;
        Ok(config)
    }

    fn collect_layered_env(&self) -> Result<(Layered, String), ConfigError> {
        let mut values = Layered::default();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("HARVEST_PROFILE")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| values.prefixed.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(&self, path: PathBuf, values: &mut Layered) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    values.insert(&key, value);
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_seconds, 10);
        assert_eq!(config.rate_limit.buffer_seconds, 1);
        assert_eq!(config.progress_dir, PathBuf::from("caches"));
        assert!(config.user_agent.starts_with("harvest/"));
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        let config = AppConfig {
            log_format: "xml".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogFormat { .. })
        ));
    }

    #[test]
    fn test_rate_limit_bounds() {
        let valid = RateLimitConfig::default();
        assert!(valid.validate().is_ok());

        let zero_wait = RateLimitConfig {
            max_wait_seconds: 0,
            ..RateLimitConfig::default()
        };
        assert!(zero_wait.validate().is_err());

        let too_many_waits = RateLimitConfig {
            max_waits: 1000,
            ..RateLimitConfig::default()
        };
        assert!(too_many_waits.validate().is_err());
    }

    #[test]
    fn test_retry_bounds() {
        let config = RetryConfig {
            max_retries: 50,
            base_delay_seconds: 10,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRetryCount { value: 50 })
        ));
    }

    #[test]
    fn test_api_base_must_be_url() {
        let config = AppConfig {
            api_bases: ApiBases {
                github: "not a url".to_string(),
                ..ApiBases::default()
            },
            ..AppConfig::default()
        };
        match config.validate() {
            Err(ConfigError::InvalidApiBase { name, .. }) => {
                assert_eq!(name, "HARVEST_GITHUB_API_BASE")
            }
            other => panic!("expected InvalidApiBase, got {:?}", other),
        }
    }

    #[test]
    fn test_max_pages_zero_is_rejected() {
        let config = AppConfig {
            max_pages: Some(0),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMaxPages)
        ));
    }

    #[test]
    fn test_missing_credential_names_variable() {
        let credentials = Credentials::default();
        let err = credentials.readwise_token().unwrap_err();
        assert!(err.to_string().contains("READWISE_TOKEN"));
    }

    #[test]
    fn test_redacted_json_hides_secrets() {
        let config = AppConfig {
            credentials: Credentials {
                github_token: Some("ghp_secret".to_string()),
                anthropic_api_key: Some("sk-ant-secret".to_string()),
                ..Credentials::default()
            },
            ..AppConfig::default()
        };
        let json = config.redacted_json().unwrap();
        assert!(!json.contains("ghp_secret"));
        assert!(!json.contains("sk-ant-secret"));
        assert!(json.contains(REDACTED));

        let debug = format!("{:?}", config);
        assert!(!debug.contains("ghp_secret"));
    }
}
