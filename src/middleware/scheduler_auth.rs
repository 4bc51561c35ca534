use std::sync::Arc;

use axum::{body::Body, extract::State, middleware::Next, response::Response};
use http::{HeaderMap, Request};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AppError, AppResult};
use crate::AppState;

pub const SCHEDULER_TIMESTAMP_HEADER: &str = "x-scheduler-timestamp";
pub const SCHEDULER_SIGNATURE_HEADER: &str = "x-scheduler-signature";

type HmacSha256 = Hmac<Sha256>;

fn get_header<'a>(headers: &'a HeaderMap, name: &str) -> AppResult<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)
}

fn mac_for(secret: &str, timestamp: &str) -> AppResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Failed to create HMAC")))?;
    mac.update(timestamp.as_bytes());
    Ok(mac)
}

/// `sha256=<hex>` signature the scheduler sends for `timestamp`.
#[cfg(test)]
pub(crate) fn sign(secret: &str, timestamp: &str) -> AppResult<String> {
    let mac = mac_for(secret, timestamp)?;
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Check the signature, then that the timestamp is within `max_skew_seconds` of `now`.
pub fn verify_signature(
    secret: &str,
    timestamp: &str,
    signature: &str,
    now: DateTime<Utc>,
    max_skew_seconds: i64,
) -> AppResult<()> {
    if secret.is_empty() {
        return Err(AppError::Config(
            "SCHEDULER_TRIGGER_SECRET is empty".to_string(),
        ));
    }

    let provided = match signature.strip_prefix("sha256=") {
        Some(hex_sig) => hex::decode(hex_sig).map_err(|_| AppError::Unauthorized)?,
        None => return Err(AppError::Unauthorized),
    };

    mac_for(secret, timestamp)?
        .verify_slice(&provided)
        .map_err(|_| AppError::Unauthorized)?;

    let sent_at = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|_| AppError::BadRequest("Invalid scheduler timestamp".to_string()))?;
    let skew = now.signed_duration_since(sent_at).num_seconds().abs();
    if skew > max_skew_seconds {
        return Err(AppError::BadRequest("Scheduler timestamp too old".to_string()));
    }

    Ok(())
}

/// Rejects trigger requests that are not signed with the scheduler secret.
pub async fn require_scheduler_signature(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let headers = req.headers();
    let timestamp = get_header(headers, SCHEDULER_TIMESTAMP_HEADER)?;
    let signature = get_header(headers, SCHEDULER_SIGNATURE_HEADER)?;

    if let Err(e) = verify_signature(
        &state.config.scheduler.trigger_secret,
        timestamp,
        signature,
        Utc::now(),
        state.config.scheduler.max_clock_skew_seconds,
    ) {
        tracing::warn!("Rejected scheduler trigger: {}", e);
        return Err(e);
    }

    Ok(next.run(req).await)
}
