//! Client configuration loaded from environment variables.
//!
//! Only the API base URL is required; every timing knob has a default
//! matching the behavior the UI layer expects.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Session client configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL every endpoint path is appended to
    pub api_base_url: String,
    /// Health probe path
    pub health_path: String,
    /// Token refresh path
    pub refresh_path: String,
    /// Timeout for ordinary API calls
    pub http_timeout: Duration,
    /// Timeout for a single health probe
    pub probe_timeout: Duration,
    /// How long a cached availability result is trusted
    pub availability_ttl: Duration,
    /// Interval of the background health probe
    pub probe_interval: Duration,
    /// Delay before the forced re-check after a transport failure
    pub recheck_delay: Duration,
    /// Minimum spacing between login attempts
    pub login_min_interval: Duration,
    /// Location of the persisted session file
    pub store_path: PathBuf,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000/api".to_string(),
            health_path: "/health".to_string(),
            refresh_path: "/auth/refresh-token".to_string(),
            http_timeout: Duration::from_secs(15),
            probe_timeout: Duration::from_secs(3),
            availability_ttl: Duration::from_secs(30),
            probe_interval: Duration::from_secs(60),
            recheck_delay: Duration::from_millis(1000),
            login_min_interval: Duration::from_millis(2000),
            store_path: PathBuf::from("session.json"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let defaults = Self::default();

        let api_base_url = env::var("SESSION_API_BASE_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .map_err(|_| ConfigError::Missing("SESSION_API_BASE_URL"))?;

        if api_base_url.is_empty() {
            return Err(ConfigError::Invalid("SESSION_API_BASE_URL"));
        }

        Ok(Self {
            api_base_url,
            health_path: env::var("SESSION_HEALTH_PATH").unwrap_or(defaults.health_path),
            refresh_path: env::var("SESSION_REFRESH_PATH").unwrap_or(defaults.refresh_path),
            http_timeout: secs_var("SESSION_HTTP_TIMEOUT_SECS", defaults.http_timeout),
            probe_timeout: secs_var("SESSION_PROBE_TIMEOUT_SECS", defaults.probe_timeout),
            availability_ttl: secs_var("SESSION_AVAILABILITY_TTL_SECS", defaults.availability_ttl),
            probe_interval: secs_var("SESSION_PROBE_INTERVAL_SECS", defaults.probe_interval),
            recheck_delay: millis_var("SESSION_RECHECK_DELAY_MS", defaults.recheck_delay),
            login_min_interval: millis_var(
                "SESSION_LOGIN_MIN_INTERVAL_MS",
                defaults.login_min_interval,
            ),
            store_path: env::var("SESSION_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.store_path),
        })
    }

    /// Absolute URL for an endpoint path.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn secs_var(name: &str, fallback: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(fallback)
}

fn millis_var(name: &str, fallback: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(fallback)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("SESSION_API_BASE_URL", "https://api.example.com/v1/");
        env::set_var("SESSION_AVAILABILITY_TTL_SECS", "45");
        env::set_var("SESSION_LOGIN_MIN_INTERVAL_MS", "not-a-number");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.api_base_url, "https://api.example.com/v1");
        assert_eq!(config.availability_ttl, Duration::from_secs(45));
        assert_eq!(config.login_min_interval, Duration::from_millis(2000));
        assert_eq!(config.health_path, "/health");
    }

    #[test]
    fn url_joins_without_double_slash() {
        let config = Config::default();
        assert_eq!(
            config.url("/auth/login"),
            "http://localhost:5000/api/auth/login"
        );
        assert_eq!(config.url("posts"), "http://localhost:5000/api/posts");
    }
}
