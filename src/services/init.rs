//! Initialization helpers for the application:
//! - database connection + migrations
//! - pipeline wiring against the SQLite store and configured providers
//! - background worker spawn helpers

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::Result;

use crate::config::Config;
use crate::db::{NotificationLogRepository, SqliteStore};
use crate::services::clock::{SystemClock, TokioSleeper};
use crate::services::email::{EmailProvider, SmtpEmailProvider};
use crate::services::pipeline::{NotificationPipeline, PipelineStores, Providers};
use crate::services::push::{HttpPushProvider, PushProvider};

/// Redact potentially sensitive information from a database URL before logging.
///
/// Attempts to parse the URL and remove userinfo (username:password) components.
/// Falls back to removing everything before '@' or returning "(redacted)".
pub fn redact_db_url(db_url: &str) -> String {
    if let Ok(url) = url::Url::parse(db_url) {
        let scheme = url.scheme();
        let host = url.host_str().unwrap_or("");
        let port_part = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
        let path = url.path();
        format!("{}://{}{}{}", scheme, host, port_part, path)
    } else {
        if let Some(at_pos) = db_url.find('@') {
            let without_creds = &db_url[at_pos + 1..];
            return format!("(redacted){}", without_creds);
        }
        "(redacted)".to_string()
    }
}

/// Open the SQLite pool (creating the file and its directory if needed) and
/// run migrations.
pub async fn init_db(config: &Config) -> Result<sqlx::SqlitePool> {
    let db_url = &config.database.url;
    tracing::info!("Connecting to database: {}", redact_db_url(db_url));

    let db_path = db_url.strip_prefix("sqlite://").unwrap_or(db_url);
    let db_file_path = Path::new(db_path);

    if let Some(parent) = db_file_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                )
            })?;
        }
    }

    let connect_options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(connect_options)
        .await?;

    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Build the delivery providers. A channel whose provider is not configured is
/// logged once here and never attempted.
pub fn build_providers(config: &Config) -> Result<Providers> {
    let push: Option<Arc<dyn PushProvider>> = match HttpPushProvider::from_config(&config.push)? {
        Some(provider) => {
            tracing::info!("Push delivery enabled");
            Some(Arc::new(provider))
        }
        None => {
            tracing::warn!("PUSH_GATEWAY_URL not set; push delivery disabled");
            None
        }
    };

    let smtp = SmtpEmailProvider::from_config(&config.email)?;
    let email: Option<Arc<dyn EmailProvider>> = match smtp {
        Some(provider) => {
            tracing::info!("Email delivery enabled");
            Some(Arc::new(provider))
        }
        None => {
            tracing::warn!("SMTP_HOST not set; email delivery disabled");
            None
        }
    };

    Ok(Providers { push, email })
}

pub fn build_pipeline(
    pool: &sqlx::SqlitePool,
    config: &Config,
    providers: Providers,
) -> NotificationPipeline {
    NotificationPipeline::new(
        PipelineStores::shared(Arc::new(SqliteStore::new(pool.clone()))),
        providers,
        Arc::new(SystemClock),
        Arc::new(TokioSleeper),
        &config.notifications,
    )
}

/// Spawn background workers:
/// - periodic purge of expired notification log rows
///
/// Each worker listens for a shutdown notification via a
/// `tokio::sync::broadcast::Sender<()>`; the returned handles can be awaited.
pub fn spawn_background_workers(
    state: Arc<crate::AppState>,
    shutdown: tokio::sync::broadcast::Sender<()>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    // Log cleanup worker
    {
        let mut shutdown_rx = shutdown.subscribe();
        let state = state.clone();
        let interval = Duration::from_secs(state.config.notifications.log_cleanup_interval_seconds);
        handles.push(tokio::spawn(async move {
            loop {
                let now = chrono::Utc::now().naive_utc();
                match NotificationLogRepository::delete_expired(&state.db, now).await {
                    Ok(0) => tracing::debug!("No expired notification logs to purge"),
                    Ok(n) => tracing::info!("Purged {} expired notification logs", n),
                    Err(e) => tracing::warn!("Failed to purge expired notification logs: {:?}", e),
                }

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Log cleanup worker shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }));
    }

    handles
}
