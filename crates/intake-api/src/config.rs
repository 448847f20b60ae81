//! Configuration loaded from environment variables.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Deployment environment. Development responses carry internal error detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn is_development(&self) -> bool {
        matches!(self, AppEnv::Development)
    }
}

/// Which triage strategy backs the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriageStrategy {
    /// Keyword rules, no network.
    Local,
    /// OpenAI-compatible chat completions, configured from `OPENAI_*`.
    OpenAi,
}

/// Intake server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address.
    pub addr: SocketAddr,
    /// SQLite database URL.
    pub database_url: String,
    pub app_env: AppEnv,
    /// Directory uploaded files are written to and served from.
    pub upload_dir: PathBuf,
    /// Upper bound on handling one request.
    pub request_timeout: Duration,
    pub triage_strategy: TriageStrategy,
    /// Upper bound on one triage call.
    pub triage_timeout: Duration,
    /// Recipient of staff notifications.
    pub admin_email: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `CARECONNECT_ADDR` | Server bind address | `127.0.0.1:3000` |
    /// | `SQLITE_PATH` | SQLite database URL | `sqlite:careconnect.db?mode=rwc` |
    /// | `APP_ENV` | `development` or `production` | `production` |
    /// | `UPLOAD_DIR` | Upload directory | `uploads` |
    /// | `REQUEST_TIMEOUT_SECS` | Request timeout | `30` |
    /// | `TRIAGE_STRATEGY` | `local` or `openai` | `local` |
    /// | `TRIAGE_TIMEOUT_SECS` | Triage call timeout | `10` |
    /// | `ADMIN_EMAIL` | Staff notification recipient | `admin@careconnect.local` |
    ///
    /// The remote strategy reads its own `OPENAI_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let addr = lookup("CARECONNECT_ADDR")
            .unwrap_or_else(|| "127.0.0.1:3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidAddr)?;

        let database_url = lookup("SQLITE_PATH")
            .unwrap_or_else(|| "sqlite:careconnect.db?mode=rwc".to_string());

        let app_env = match lookup("APP_ENV").as_deref().map(str::trim) {
            Some("development") | Some("dev") => AppEnv::Development,
            _ => AppEnv::Production,
        };

        let upload_dir = lookup("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("uploads"));

        let request_timeout = seconds(&lookup, "REQUEST_TIMEOUT_SECS", 30)?;
        let triage_timeout = seconds(&lookup, "TRIAGE_TIMEOUT_SECS", 10)?;

        let triage_strategy = match lookup("TRIAGE_STRATEGY") {
            None => TriageStrategy::Local,
            Some(value) => match value.trim().to_lowercase().as_str() {
                "local" | "keyword" => TriageStrategy::Local,
                "openai" | "remote" => TriageStrategy::OpenAi,
                _ => return Err(ConfigError::UnknownStrategy(value)),
            },
        };

        let admin_email = lookup("ADMIN_EMAIL")
            .unwrap_or_else(|| "admin@careconnect.local".to_string());

        Ok(Self {
            addr,
            database_url,
            app_env,
            upload_dir,
            request_timeout,
            triage_strategy,
            triage_timeout,
            admin_email,
        })
    }
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    match lookup(key) {
        None => Ok(Duration::from_secs(default)),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or(ConfigError::InvalidNumber(key)),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid CARECONNECT_ADDR format")]
    InvalidAddr,

    #[error("{0} must be a positive number of seconds")]
    InvalidNumber(&'static str),

    #[error("Unknown TRIAGE_STRATEGY '{0}' (expected local or openai)")]
    UnknownStrategy(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.addr.to_string(), "127.0.0.1:3000");
        assert_eq!(config.app_env, AppEnv::Production);
        assert_eq!(config.triage_strategy, TriageStrategy::Local);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.triage_timeout, Duration::from_secs(10));
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("APP_ENV", "development"),
            ("TRIAGE_STRATEGY", "OpenAI"),
            ("TRIAGE_TIMEOUT_SECS", "3"),
        ])
        .unwrap();
        assert!(config.app_env.is_development());
        assert_eq!(config.triage_strategy, TriageStrategy::OpenAi);
        assert_eq!(config.triage_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            load(&[("CARECONNECT_ADDR", "nowhere")]),
            Err(ConfigError::InvalidAddr)
        ));
        assert!(matches!(
            load(&[("REQUEST_TIMEOUT_SECS", "0")]),
            Err(ConfigError::InvalidNumber("REQUEST_TIMEOUT_SECS"))
        ));
        assert!(matches!(
            load(&[("TRIAGE_STRATEGY", "oracle")]),
            Err(ConfigError::UnknownStrategy(_))
        ));
    }
}
