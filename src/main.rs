use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod i18n;
mod middleware;
mod routes;
mod services;

use config::Config;
use services::{init, pipeline::NotificationPipeline};

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub pipeline: NotificationPipeline,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        // Trigger endpoint for the external scheduler (HMAC signed)
        .nest(
            "/internal/notifications",
            routes::scheduler::router().route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::scheduler_auth::require_scheduler_signature,
            )),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "garden_notifications=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting Garden Notifications Service");

    let pool = init::init_db(&config).await?;
    let providers = init::build_providers(&config)?;
    let pipeline = init::build_pipeline(&pool, &config, providers);

    let app_state = Arc::new(AppState {
        db: pool,
        config: config.clone(),
        pipeline,
    });

    let (shutdown_tx, _shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
    let bg_handles = init::spawn_background_workers(app_state.clone(), shutdown_tx.clone());

    let app = build_router(app_state.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let shutdown_tx_clone = shutdown_tx.clone();
    let signal_fut = async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
        };

        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = ctrl_c => {},
                        _ = term.recv() => {},
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to bind SIGTERM: {}", e);
                    ctrl_c.await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await;
        }

        tracing::info!("Shutdown signal received, notifying background workers");
        let _ = shutdown_tx_clone.send(());
    };

    // In-flight trigger requests finish before the server future resolves.
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(signal_fut)
        .await
    {
        tracing::error!("Server error: {}", e);
    }

    let shutdown_wait = Duration::from_secs(15);
    tracing::info!(
        "Waiting up to {}s for background workers to exit",
        shutdown_wait.as_secs()
    );
    let bg_wait = async {
        for h in bg_handles {
            let _ = h.await;
        }
    };
    let _ = tokio::time::timeout(shutdown_wait, bg_wait).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
