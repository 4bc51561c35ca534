use std::env;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub notifications: NotificationConfig,
    pub push: PushConfig,
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Shared secret the external scheduler signs its trigger requests with.
    pub trigger_secret: String,
    /// Maximum age (either direction) of the signed trigger timestamp.
    pub max_clock_skew_seconds: i64,
    /// Deadline for a single pipeline run; in-flight provider calls and backoff
    /// sleeps are cancelled once it passes.
    pub run_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// How many days ahead a growing crop's expected harvest triggers a reminder.
    pub harvest_days_ahead: u32,
    /// Overdue alerts are only sent once a user has at least this many overdue tasks.
    pub overdue_threshold: usize,
    /// Retries after the first attempt of each provider call.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    /// Lifetime of a delivery log row (and therefore of its dedup marker).
    pub dedup_ttl_hours: i64,
    /// How long a pending reservation holds its key before another run may
    /// take over. Keep it above `SCHEDULER_RUN_TIMEOUT_SECONDS`.
    pub pending_lease_seconds: i64,
    /// How often expired log rows are purged.
    pub log_cleanup_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// Push gateway base URL. Push delivery is disabled when unset.
    pub gateway_url: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// SMTP relay host. Email delivery is disabled when unset.
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or(defaults.server.host),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: parse_or(
                    "DATABASE_MAX_CONNECTIONS",
                    defaults.database.max_connections,
                ),
            },
            scheduler: SchedulerConfig {
                trigger_secret: env::var("SCHEDULER_TRIGGER_SECRET")
                    .map_err(|_| ConfigError::MissingEnv("SCHEDULER_TRIGGER_SECRET".to_string()))?,
                max_clock_skew_seconds: parse_or(
                    "SCHEDULER_MAX_CLOCK_SKEW_SECONDS",
                    defaults.scheduler.max_clock_skew_seconds,
                ),
                run_timeout_seconds: parse_or(
                    "SCHEDULER_RUN_TIMEOUT_SECONDS",
                    defaults.scheduler.run_timeout_seconds,
                ),
            },
            notifications: NotificationConfig {
                harvest_days_ahead: parse_or(
                    "NOTIFICATION_HARVEST_DAYS_AHEAD",
                    defaults.notifications.harvest_days_ahead,
                ),
                overdue_threshold: parse_or(
                    "NOTIFICATION_OVERDUE_THRESHOLD",
                    defaults.notifications.overdue_threshold,
                ),
                max_retries: parse_or(
                    "NOTIFICATION_MAX_RETRIES",
                    defaults.notifications.max_retries,
                ),
                initial_backoff_ms: parse_or(
                    "NOTIFICATION_INITIAL_BACKOFF_MS",
                    defaults.notifications.initial_backoff_ms,
                ),
                dedup_ttl_hours: parse_or(
                    "NOTIFICATION_DEDUP_TTL_HOURS",
                    defaults.notifications.dedup_ttl_hours,
                ),
                pending_lease_seconds: parse_or(
                    "NOTIFICATION_PENDING_LEASE_SECONDS",
                    defaults.notifications.pending_lease_seconds,
                ),
                log_cleanup_interval_seconds: parse_or(
                    "NOTIFICATION_LOG_CLEANUP_INTERVAL_SECONDS",
                    defaults.notifications.log_cleanup_interval_seconds,
                ),
            },
            push: PushConfig {
                gateway_url: env::var("PUSH_GATEWAY_URL").ok(),
                api_key: env::var("PUSH_API_KEY").ok(),
                request_timeout_seconds: parse_or(
                    "PUSH_REQUEST_TIMEOUT_SECONDS",
                    defaults.push.request_timeout_seconds,
                ),
            },
            email: EmailConfig {
                smtp_host: env::var("SMTP_HOST").ok(),
                smtp_port: parse_or("SMTP_PORT", defaults.email.smtp_port),
                from_address: env::var("SMTP_FROM").unwrap_or(defaults.email.from_address),
                smtp_user: env::var("SMTP_USER").ok(),
                smtp_password: env::var("SMTP_PASSWORD").ok(),
            },
        })
    }
}

impl NotificationConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://data/garden.db".to_string(),
                max_connections: 5,
            },
            scheduler: SchedulerConfig {
                trigger_secret: String::new(),
                max_clock_skew_seconds: 300,
                run_timeout_seconds: 600,
            },
            notifications: NotificationConfig {
                harvest_days_ahead: 7,
                overdue_threshold: 3,
                max_retries: 3,
                initial_backoff_ms: 1000,
                dedup_ttl_hours: 24,
                pending_lease_seconds: 900,
                log_cleanup_interval_seconds: 3600,
            },
            push: PushConfig {
                gateway_url: None,
                api_key: None,
                request_timeout_seconds: 10,
            },
            email: EmailConfig {
                smtp_host: None,
                smtp_port: 587,
                from_address: "noreply@garden.local".to_string(),
                smtp_user: None,
                smtp_password: None,
            },
        }
    }
}
