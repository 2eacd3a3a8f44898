use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::workflows::automation::AutomationConfig;

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
    pub automation: AutomationConfig,
    pub scheduler: SchedulerConfig,
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
        let format = match env::var("APP_LOG_FORMAT") {
            Ok(raw) => LogFormat::parse(&raw)?,
            Err(_) => LogFormat::Compact,
        };

        let automation = load_automation()?;
        let interval_secs: u64 = read_var("AUTOMATION_INTERVAL_SECS", 0)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level, format },
            automation,
            scheduler: SchedulerConfig {
                interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
            },
        })
    }
}

fn load_automation() -> Result<AutomationConfig, ConfigError> {
    let mut config = AutomationConfig::default();

    config.sla_threshold_minutes = read_var("AUTOMATION_SLA_MINUTES", config.sla_threshold_minutes)?;
    config.call_timeout_ms = read_var("AUTOMATION_CALL_TIMEOUT_MS", config.call_timeout_ms)?;
    config.reminder_window_minutes = read_var(
        "AUTOMATION_REMINDER_WINDOW_MINUTES",
        config.reminder_window_minutes,
    )?;
    config.max_error_messages = read_var("AUTOMATION_MAX_ERRORS", config.max_error_messages)?;
    config.scoring.tiers.hot = read_var("AUTOMATION_HOT_THRESHOLD", config.scoring.tiers.hot)?;
    config.scoring.tiers.warm = read_var("AUTOMATION_WARM_THRESHOLD", config.scoring.tiers.warm)?;

    if config.scoring.tiers.warm > config.scoring.tiers.hot {
        return Err(ConfigError::InvalidValue {
            name: "AUTOMATION_WARM_THRESHOLD",
            value: config.scoring.tiers.warm.to_string(),
        });
    }

    Ok(config)
}

fn read_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        Err(_) => Ok(default),
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

/// Log output shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::InvalidValue {
                name: "APP_LOG_FORMAT",
                value: raw.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

/// In-process pass scheduling. `None` leaves passes to manual or external triggers.
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    pub interval: Option<Duration>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("APP_PORT must be a valid u16")]
    InvalidPort,
    #[error("APP_HOST must parse to an IPv4 or IPv6 address")]
    InvalidHost { source: std::net::AddrParseError },
    #[error("{name} has an invalid value '{value}'")]
    InvalidValue { name: &'static str, value: String },
}
