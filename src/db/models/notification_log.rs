use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const LOG_STATUS_PENDING: &str = "pending";
pub const LOG_STATUS_SENT: &str = "sent";
pub const LOG_STATUS_FAILED: &str = "failed";

/// One row per (event, user) that reached delivery. The row doubles as the dedup marker:
/// while it is unexpired, no other event with the same `deduplication_key` is delivered.
///
/// A `pending` row only holds its key until `lease_expires_at`; finalizing clears the
/// lease. A run that dies mid-delivery therefore blocks the key for one lease, not a day.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationLog {
    pub id: String,
    pub user_id: String,
    pub notification_type: String,
    /// Comma separated channels that delivered, e.g. "push,email".
    pub channel: String,
    pub title: String,
    pub body: String,
    pub status: String,
    pub error_message: Option<String>,
    pub deduplication_key: String,
    pub sent_at: Option<NaiveDateTime>,
    pub expires_at: NaiveDateTime,
    pub lease_expires_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

/// Data required to reserve a dedup key; the row starts out `pending`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotificationLog {
    pub user_id: String,
    pub notification_type: String,
    pub title: String,
    pub body: String,
    pub deduplication_key: String,
    pub expires_at: NaiveDateTime,
    pub lease_expires_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeNotificationLog {
    pub status: String,
    pub channel: String,
    pub error_message: Option<String>,
    pub sent_at: Option<NaiveDateTime>,
}
