use serde::{Deserialize, Serialize};

use std::{env, fmt, fs, path::Path, str::FromStr, time::Duration};

use crate::repository::RetryPolicy;

pub const DEFAULT_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("invalid value for {name}: {reason}")]
    InvalidVar { name: &'static str, reason: String },

    #[error("store backend is postgres but no pg_dsn is configured")]
    MissingDsn,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub pg_dsn: Option<String>,
    #[serde(with = "humantime_serde", default = "default_call_timeout")]
    pub call_timeout: Duration,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(with = "humantime_serde", default = "default_retry_backoff")]
    pub retry_backoff: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub google_client_id: Option<String>,
    #[serde(default = "default_tokeninfo_url")]
    pub tokeninfo_url: String,
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,
}

/// Per-client request quotas. `max_requests` covers every request,
/// `max_writes` only note mutations; both refill over `window`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    #[serde(with = "humantime_serde", default = "default_rate_limit_window")]
    pub window: Duration,
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_max_writes")]
    pub max_writes: u32,
    /// Key clients by the first `X-Forwarded-For` address instead of the
    /// peer address. Only safe behind a proxy that sets the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

const fn default_port() -> u16 {
    3000
}

fn default_allowed_origin() -> String {
    "*".to_string()
}

const fn default_call_timeout() -> Duration {
    Duration::from_secs(5)
}

const fn default_max_retries() -> u32 {
    2
}

const fn default_retry_backoff() -> Duration {
    Duration::from_millis(100)
}

fn default_tokeninfo_url() -> String {
    DEFAULT_TOKENINFO_URL.to_string()
}

const fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

const fn default_rate_limit_enabled() -> bool {
    true
}

const fn default_rate_limit_window() -> Duration {
    Duration::from_secs(15 * 60)
}

const fn default_max_requests() -> u32 {
    100
}

const fn default_max_writes() -> u32 {
    20
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            environment: Environment::default(),
            allowed_origin: default_allowed_origin(),
            store: StoreConfig::default(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            pg_dsn: None,
            call_timeout: default_call_timeout(),
            max_retries: default_max_retries(),
            retry_backoff: default_retry_backoff(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            google_client_id: None,
            tokeninfo_url: default_tokeninfo_url(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            window: default_rate_limit_window(),
            max_requests: default_max_requests(),
            max_writes: default_max_writes(),
            trust_forwarded_for: false,
        }
    }
}

impl StoreConfig {
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            call_timeout: self.call_timeout,
            max_retries: self.max_retries,
            backoff: self.retry_backoff,
        }
    }
}

impl Config {
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.store.backend == StoreBackend::Postgres && self.store.pg_dsn.is_none() {
            return Err(ConfigError::MissingDsn);
        }
        Ok(self)
    }

    /// Builds a config from variables returned by `lookup`, starting from
    /// defaults for anything unset.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().with_vars(lookup)
    }

    /// Overrides fields with the variables `lookup` returns. Unset variables
    /// keep the current value.
    pub fn with_vars<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.port = parse_var("PORT", &port)?;
        }
        if let Some(environment) = lookup("APP_ENV") {
            self.environment = parse_var("APP_ENV", &environment)?;
        }
        if let Some(origin) = lookup("ALLOWED_ORIGIN") {
            self.allowed_origin = origin;
        }
        if let Some(backend) = lookup("STORE_BACKEND") {
            self.store.backend = parse_var("STORE_BACKEND", &backend)?;
        }
        if let Some(dsn) = lookup("PG_DSN") {
            self.store.pg_dsn = Some(dsn);
        }
        if let Some(timeout) = lookup("STORE_CALL_TIMEOUT") {
            self.store.call_timeout = parse_duration("STORE_CALL_TIMEOUT", &timeout)?;
        }
        if let Some(retries) = lookup("STORE_MAX_RETRIES") {
            self.store.max_retries = parse_var("STORE_MAX_RETRIES", &retries)?;
        }
        if let Some(backoff) = lookup("STORE_RETRY_BACKOFF") {
            self.store.retry_backoff = parse_duration("STORE_RETRY_BACKOFF", &backoff)?;
        }
        if let Some(client_id) = lookup("GOOGLE_CLIENT_ID") {
            self.auth.google_client_id = Some(client_id);
        }
        if let Some(url) = lookup("GOOGLE_TOKENINFO_URL") {
            self.auth.tokeninfo_url = url;
        }
        if let Some(timeout) = lookup("AUTH_REQUEST_TIMEOUT") {
            self.auth.request_timeout = parse_duration("AUTH_REQUEST_TIMEOUT", &timeout)?;
        }
        if let Some(enabled) = lookup("RATE_LIMIT_ENABLED") {
            self.rate_limit.enabled = parse_var("RATE_LIMIT_ENABLED", &enabled)?;
        }
        if let Some(window) = lookup("RATE_LIMIT_WINDOW") {
            self.rate_limit.window = parse_duration("RATE_LIMIT_WINDOW", &window)?;
        }
        if let Some(max) = lookup("RATE_LIMIT_MAX_REQUESTS") {
            self.rate_limit.max_requests = parse_var("RATE_LIMIT_MAX_REQUESTS", &max)?;
        }
        if let Some(max) = lookup("RATE_LIMIT_MAX_WRITES") {
            self.rate_limit.max_writes = parse_var("RATE_LIMIT_MAX_WRITES", &max)?;
        }
        if let Some(trust) = lookup("RATE_LIMIT_TRUST_FORWARDED_FOR") {
            self.rate_limit.trust_forwarded_for =
                parse_var("RATE_LIMIT_TRUST_FORWARDED_FOR", &trust)?;
        }

        Ok(self)
    }
}

fn parse_var<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::InvalidVar {
        name,
        reason: e.to_string(),
    })
}

fn parse_duration(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| ConfigError::InvalidVar {
        name,
        reason: e.to_string(),
    })
}

fn read_config(path: &str) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })
}

fn read_file_config() -> Result<Config, ConfigError> {
    // Retrieve env variable
    let config_path = env::var("NOTES_API_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());

    // Try env path
    if Path::new(&config_path).exists() {
        return read_config(&config_path);
    }

    // Fallback to config.example.yaml
    if Path::new("config.example.yaml").exists() {
        tracing::warn!(
            "Config file '{}' not found, falling back to 'config.example.yaml'\
             \n This file should not be used and should be replaced with actual data",
            config_path
        );
        return read_config("config.example.yaml");
    }

    tracing::info!("No config file found, using defaults and environment variables");
    Ok(Config::default())
}

/// Loads the config file (or the example file, or defaults), then applies
/// environment variable overrides on top.
pub fn load_config() -> Result<Config, ConfigError> {
    read_file_config()?
        .with_vars(|name| env::var(name).ok())?
        .validate()
}
