use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::db::{FinalizeNotificationLog, NotificationLog, LOG_STATUS_FAILED, LOG_STATUS_SENT};
use crate::services::dispatcher::DispatchOutcome;
use crate::services::stores::NotificationLogStore;

/// Writes the final outcome onto the log row reserved by the dedup gate.
///
/// Writes are best effort: a failed write is logged and never changes the
/// event's status in the run summary.
pub struct DeliveryLogRecorder {
    logs: Arc<dyn NotificationLogStore>,
}

impl DeliveryLogRecorder {
    pub fn new(logs: Arc<dyn NotificationLogStore>) -> Self {
        Self { logs }
    }

    pub async fn record_dispatch(
        &self,
        reservation: &NotificationLog,
        outcome: &DispatchOutcome,
        now: DateTime<Utc>,
    ) {
        let success = outcome.is_success();
        let update = FinalizeNotificationLog {
            status: if success { LOG_STATUS_SENT } else { LOG_STATUS_FAILED }.to_string(),
            channel: outcome.channel_label(),
            error_message: outcome.error_summary(),
            sent_at: success.then(|| now.naive_utc()),
        };
        self.write(reservation, update).await;
    }

    /// Failure that happened before any channel was tried.
    pub async fn record_failure(&self, reservation: &NotificationLog, error: &str) {
        let update = FinalizeNotificationLog {
            status: LOG_STATUS_FAILED.to_string(),
            channel: String::new(),
            error_message: Some(error.to_string()),
            sent_at: None,
        };
        self.write(reservation, update).await;
    }

    async fn write(&self, reservation: &NotificationLog, update: FinalizeNotificationLog) {
        let status = update.status.clone();
        if let Err(e) = self.logs.finalize(&reservation.id, update).await {
            tracing::warn!(
                "Failed to record {} outcome for {}: {}",
                status,
                reservation.deduplication_key,
                e
            );
        }
    }
}
