use std::{env, fmt, net::SocketAddr, str::FromStr};

use super::{database_url, server_bind_address};

const DEFAULT_SSE_RING_MAX: usize = 512;
const DEFAULT_SSE_HEARTBEAT_SECS: u64 = 25;
const DEFAULT_CHANGE_LOG_TTL_HOURS: u64 = 72;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Production logs are emitted as JSON lines.
    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    /// Number of change events kept in memory for stream reconnects.
    pub sse_ring_max: usize,
    pub sse_heartbeat_secs: u64,
    pub change_log_ttl_hours: u64,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;
        let sse_ring_max = numeric_var("SSE_RING_MAX", DEFAULT_SSE_RING_MAX)?;
        let sse_heartbeat_secs = numeric_var("SSE_HEARTBEAT_SECS", DEFAULT_SSE_HEARTBEAT_SECS)?;
        let change_log_ttl_hours =
            numeric_var("CHANGE_LOG_TTL_HOURS", DEFAULT_CHANGE_LOG_TTL_HOURS)?;

        if sse_ring_max == 0 {
            return Err(ConfigError::InvalidNumber {
                name: "SSE_RING_MAX",
                value: "0".to_string(),
            });
        }
        if sse_heartbeat_secs == 0 {
            return Err(ConfigError::InvalidNumber {
                name: "SSE_HEARTBEAT_SECS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            bind_addr,
            environment,
            database_url: database_url(),
            sse_ring_max,
            sse_heartbeat_secs,
            change_log_ttl_hours,
        })
    }
}

fn numeric_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
        Err(_) => Ok(default),
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    InvalidNumber { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::InvalidNumber { name, value } => {
                write!(f, "{name} must be a positive integer (got {value})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DEFAULT_BIND_ADDR, DEFAULT_DATABASE_URL, ENV_GUARD};

    fn clear_env() {
        for name in [
            "APP_ENV",
            "APP_BIND_ADDR",
            "DATABASE_URL",
            "SSE_RING_MAX",
            "SSE_HEARTBEAT_SECS",
            "CHANGE_LOG_TTL_HOURS",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn loads_defaults_in_development() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();

        let config = AppConfig::from_env().expect("config should load with defaults");
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.sse_ring_max, 512);
        assert_eq!(config.sse_heartbeat_secs, 25);
        assert_eq!(config.change_log_ttl_hours, 72);
    }

    #[test]
    fn rejects_invalid_environment() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("APP_ENV", "invalid");

        let err = AppConfig::from_env().expect_err("invalid env should error");
        assert!(matches!(err, ConfigError::InvalidEnvironment(value) if value == "invalid"));

        clear_env();
    }

    #[test]
    fn parses_production_environment() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("APP_ENV", "production");
        env::set_var("APP_BIND_ADDR", "0.0.0.0:9000");
        env::set_var("SSE_RING_MAX", "64");

        let config = AppConfig::from_env().expect("config should load");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:9000");
        assert_eq!(config.sse_ring_max, 64);

        clear_env();
    }

    #[test]
    fn rejects_non_numeric_ring_size() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("SSE_RING_MAX", "lots");

        let err = AppConfig::from_env().expect_err("non-numeric value should error");
        assert!(matches!(err, ConfigError::InvalidNumber { name: "SSE_RING_MAX", .. }));

        clear_env();
    }
}
