use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    // Storage; in-memory stores and queue when unset
    pub database_url: Option<String>,
    pub redis_url: Option<String>,

    // JWT
    pub jwt_secret: String,

    // Server
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,

    // Execution
    pub max_concurrent_tests: usize,
    pub worker_concurrency: usize,
    pub test_timeout_seconds: u64,
    pub accept_invalid_certs: bool,
    pub embedded_worker: bool,

    // Housekeeping
    pub temp_var_max_age_hours: u64,
    pub cleanup_interval_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if exists

        let defaults = Self::with_defaults("");

        Ok(Self {
            // Storage
            database_url: optional("DATABASE_URL"),
            redis_url: optional("REDIS_URL"),

            // JWT
            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?,

            // Server
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parse_or("PORT", defaults.port)?,
            log_format: match env::var("LOG_FORMAT").as_deref() {
                Ok("pretty") | Ok("text") => LogFormat::Pretty,
                Ok("json") | Err(_) => LogFormat::Json,
                Ok(_) => return Err(ConfigError::Invalid("LOG_FORMAT")),
            },

            // Execution
            max_concurrent_tests: parse_or("MAX_CONCURRENT_TESTS", defaults.max_concurrent_tests)?,
            worker_concurrency: parse_or("WORKER_CONCURRENCY", defaults.worker_concurrency)?,
            test_timeout_seconds: parse_or("TEST_TIMEOUT_SECONDS", defaults.test_timeout_seconds)?,
            accept_invalid_certs: parse_or("ACCEPT_INVALID_CERTS", defaults.accept_invalid_certs)?,
            embedded_worker: parse_or("EMBEDDED_WORKER", defaults.embedded_worker)?,

            // Housekeeping
            temp_var_max_age_hours: parse_or(
                "TEMP_VAR_MAX_AGE_HOURS",
                defaults.temp_var_max_age_hours,
            )?,
            cleanup_interval_seconds: parse_nonzero(
                "CLEANUP_INTERVAL_SECONDS",
                defaults.cleanup_interval_seconds,
            )?,
        })
    }

    /// Defaults for everything but the secret; no database or Redis
    pub fn with_defaults(jwt_secret: impl Into<String>) -> Self {
        Self {
            database_url: None,
            redis_url: None,
            jwt_secret: jwt_secret.into(),
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_format: LogFormat::Json,
            max_concurrent_tests: 10,
            worker_concurrency: 4,
            test_timeout_seconds: 30,
            accept_invalid_certs: true,
            embedded_worker: true,
            temp_var_max_age_hours: 24,
            cleanup_interval_seconds: 3600,
        }
    }

    /// A process without its own API only sees executions through Postgres and Redis
    pub fn require_shared_backends(&self) -> Result<(), ConfigError> {
        if self.database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }
        if self.redis_url.is_none() {
            return Err(ConfigError::Missing("REDIS_URL"));
        }
        Ok(())
    }

    /// Get server address as "host:port"
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

fn parse_nonzero(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match parse_or(key, default)? {
        0 => Err(ConfigError::Invalid(key)),
        value => Ok(value),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid environment variable: {0}")]
    Invalid(&'static str),
}
