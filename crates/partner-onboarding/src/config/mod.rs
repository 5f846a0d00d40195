use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use chrono::Duration;

const DEFAULT_ACTIVATION_BASE_URL: &str = "http://127.0.0.1:3000/partner/set-password";
const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;
const DEFAULT_NOTIFY_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_NOTIFY_POLL_SECS: u64 = 30;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub onboarding: OnboardingConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let activation_base_url = env::var("APP_ACTIVATION_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_ACTIVATION_BASE_URL.to_string());
        let token_ttl_hours = match env::var("APP_TOKEN_TTL_HOURS") {
            Ok(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|hours| *hours > 0)
                .ok_or(ConfigError::InvalidTokenTtl)?,
            Err(_) => DEFAULT_TOKEN_TTL_HOURS,
        };
        let notification_max_attempts = match env::var("APP_NOTIFY_MAX_ATTEMPTS") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|attempts| *attempts > 0)
                .ok_or(ConfigError::InvalidNotifyAttempts)?,
            Err(_) => DEFAULT_NOTIFY_MAX_ATTEMPTS,
        };
        let notification_poll_secs = match env::var("APP_NOTIFY_POLL_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidNotifyPoll)?,
            Err(_) => DEFAULT_NOTIFY_POLL_SECS,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            onboarding: OnboardingConfig {
                activation_base_url,
                token_ttl_hours,
                notification_max_attempts,
                notification_poll_secs,
            },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Knobs for account provisioning and partner notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingConfig {
    pub activation_base_url: String,
    pub token_ttl_hours: i64,
    pub notification_max_attempts: u32,
    pub notification_poll_secs: u64,
}

impl OnboardingConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::hours(self.token_ttl_hours)
    }

    /// How often the notification worker re-scans the outbox without being woken.
    pub fn notification_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.notification_poll_secs)
    }
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            activation_base_url: DEFAULT_ACTIVATION_BASE_URL.to_string(),
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            notification_max_attempts: DEFAULT_NOTIFY_MAX_ATTEMPTS,
            notification_poll_secs: DEFAULT_NOTIFY_POLL_SECS,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidTokenTtl,
    InvalidNotifyAttempts,
    InvalidNotifyPoll,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidTokenTtl => {
                write!(f, "APP_TOKEN_TTL_HOURS must be a positive number of hours")
            }
            ConfigError::InvalidNotifyAttempts => {
                write!(f, "APP_NOTIFY_MAX_ATTEMPTS must be a positive integer")
            }
            ConfigError::InvalidNotifyPoll => {
                write!(f, "APP_NOTIFY_POLL_SECS must be a positive number of seconds")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidTokenTtl
            | ConfigError::InvalidNotifyAttempts
            | ConfigError::InvalidNotifyPoll => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("APP_ACTIVATION_BASE_URL");
        env::remove_var("APP_TOKEN_TTL_HOURS");
        env::remove_var("APP_NOTIFY_MAX_ATTEMPTS");
        env::remove_var("APP_NOTIFY_POLL_SECS");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.onboarding, OnboardingConfig::default());
        assert_eq!(config.onboarding.token_ttl(), Duration::hours(24));
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn rejects_non_positive_token_ttl() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_TOKEN_TTL_HOURS", "0");
        let result = AppConfig::load();
        reset_env();
        assert!(matches!(result, Err(ConfigError::InvalidTokenTtl)));
    }

    #[test]
    fn reads_onboarding_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ACTIVATION_BASE_URL", "https://partners.example/activate");
        env::set_var("APP_TOKEN_TTL_HOURS", "48");
        env::set_var("APP_NOTIFY_MAX_ATTEMPTS", "5");
        env::set_var("APP_NOTIFY_POLL_SECS", "5");
        let config = AppConfig::load().expect("config loads");
        reset_env();
        assert_eq!(
            config.onboarding.activation_base_url,
            "https://partners.example/activate"
        );
        assert_eq!(config.onboarding.token_ttl_hours, 48);
        assert_eq!(config.onboarding.notification_max_attempts, 5);
        assert_eq!(
            config.onboarding.notification_poll_interval(),
            std::time::Duration::from_secs(5)
        );
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_NOTIFY_POLL_SECS", "0");
        let result = AppConfig::load();
        reset_env();
        assert!(matches!(result, Err(ConfigError::InvalidNotifyPoll)));
    }
}
