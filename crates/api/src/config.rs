//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; the in-memory ledger is used when unset
/// - `REDIS_URL`: Redis URL; the in-memory keyspace is used when unset
/// - `DB_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `EXPIRY_SWEEP_INTERVAL_SECS`: sweep period, `0` disables (default: `30`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub db_max_connections: u32,
    pub expiry_sweep_interval_secs: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match non_empty("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => defaults.log_format,
            },
            database_url: non_empty("DATABASE_URL"),
            redis_url: non_empty("REDIS_URL"),
            db_max_connections: non_empty("DB_MAX_CONNECTIONS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.db_max_connections),
            expiry_sweep_interval_secs: non_empty("EXPIRY_SWEEP_INTERVAL_SECS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.expiry_sweep_interval_secs),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Period of the expiry sweeper, or `None` when disabled.
    pub fn expiry_sweep_interval(&self) -> Option<Duration> {
        (self.expiry_sweep_interval_secs > 0)
            .then(|| Duration::from_secs(self.expiry_sweep_interval_secs))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            redis_url: None,
            db_max_connections: 10,
            expiry_sweep_interval_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert!(config.redis_url.is_none());
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(
            config.expiry_sweep_interval(),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_values_from_environment() {
        let config = from_pairs(&[
            ("PORT", "8081"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/stock"),
            ("REDIS_URL", "redis://localhost:6379"),
            ("DB_MAX_CONNECTIONS", "25"),
            ("EXPIRY_SWEEP_INTERVAL_SECS", "0"),
        ]);
        assert_eq!(config.port, 8081);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/stock")
        );
        assert_eq!(config.redis_url.as_deref(), Some("redis://localhost:6379"));
        assert_eq!(config.db_max_connections, 25);
        assert_eq!(config.expiry_sweep_interval(), None);
    }

    #[test]
    fn test_invalid_and_blank_values_fall_back() {
        let config = from_pairs(&[("PORT", "not-a-port"), ("DATABASE_URL", "  ")]);
        assert_eq!(config.port, 3000);
        assert!(config.database_url.is_none());
    }
}
