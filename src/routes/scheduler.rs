use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, routing::post, Json, Router};
use tokio_util::sync::CancellationToken;

use crate::error::AppResult;
use crate::services::aggregator::ProcessingResult;
use crate::AppState;

/// Routes for `/internal/notifications`; signature checking is layered on in `build_router`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/run", post(run_scheduled_notifications))
}

async fn run_scheduled_notifications(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ProcessingResult>> {
    let cancel = CancellationToken::new();
    let deadline = Duration::from_secs(state.config.scheduler.run_timeout_seconds);

    let timer = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            tracing::warn!(
                "Scheduled notification run exceeded {}s, cancelling",
                deadline.as_secs()
            );
            cancel.cancel();
        })
    };

    // Detached so a dropped connection cannot abandon the run mid-event.
    let run = tokio::spawn(async move {
        let result = state.pipeline.run_scheduled_processing(&cancel).await;
        timer.abort();
        result
    });
    let result = run
        .await
        .map_err(|e| anyhow::anyhow!("scheduled notification run did not complete: {}", e))?;

    Ok(Json(result?))
}
