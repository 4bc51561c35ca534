use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::db::{CreateNotificationLog, NotificationLog};
use crate::error::AppResult;
use crate::services::events::NotificationEvent;
use crate::services::stores::NotificationLogStore;

#[derive(Debug)]
pub enum DedupDecision {
    /// The key was free; this run now holds it through the pending log row.
    Reserved(NotificationLog),
    /// A delivered or failed row, or a pending row with a live lease, holds the key.
    Duplicate,
}

/// Suppresses repeat (type, user, date) events while their log row is unexpired.
///
/// Lookup and claim are a single store operation, so two overlapping runs can
/// never both deliver the same key. The claim is leased: if the run holding it
/// disappears before recording an outcome, the key is free again after `lease`.
/// `lease` must exceed the run deadline.
pub struct DeduplicationGate {
    logs: Arc<dyn NotificationLogStore>,
    ttl: Duration,
    lease: Duration,
}

impl DeduplicationGate {
    pub fn new(logs: Arc<dyn NotificationLogStore>, ttl: Duration, lease: Duration) -> Self {
        Self { logs, ttl, lease }
    }

    pub async fn check(
        &self,
        event: &NotificationEvent,
        run_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> AppResult<DedupDecision> {
        let key = event.deduplication_key(run_date);
        let now = now.naive_utc();

        // Read first so repeat runs skip the write transaction.
        if self.logs.get_by_deduplication_key(&key, now).await?.is_some() {
            tracing::debug!("Skipping duplicate notification {}", key);
            return Ok(DedupDecision::Duplicate);
        }

        let reservation = CreateNotificationLog {
            user_id: event.user_id().to_string(),
            notification_type: event.notification_type().as_str().to_string(),
            title: event.title.clone(),
            body: event.body.clone(),
            deduplication_key: key.clone(),
            expires_at: now + self.ttl,
            lease_expires_at: now + self.lease,
        };

        match self.logs.reserve(reservation, now).await? {
            Some(row) => Ok(DedupDecision::Reserved(row)),
            None => {
                tracing::debug!("Skipping duplicate notification {}", key);
                Ok(DedupDecision::Duplicate)
            }
        }
    }

    /// Give the key back when the event is dropped before delivery.
    pub async fn release(&self, reservation: &NotificationLog) {
        if let Err(e) = self.logs.release(&reservation.id).await {
            tracing::warn!(
                "Failed to release dedup reservation {}: {}",
                reservation.deduplication_key,
                e
            );
        }
    }
}
