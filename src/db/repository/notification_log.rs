use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Notification Log Repository
// ============================================================================

const LOG_COLUMNS: &str = r#"
    id, user_id, notification_type, channel, title, body, status,
    error_message, deduplication_key, sent_at, expires_at, lease_expires_at, created_at
"#;

/// A row holds its key while unexpired and, if still pending, while its lease lasts.
const HOLDS_KEY: &str = "expires_at > ? AND (lease_expires_at IS NULL OR lease_expires_at > ?)";

/// Repository for delivery log rows.
///
/// `deduplication_key` is unique. `reserve` is the only way rows are created:
/// it purges an expired row (or a pending row whose lease lapsed) with the same
/// key and inserts with `ON CONFLICT DO NOTHING` inside one transaction, so two
/// overlapping runs cannot both reserve the same key.
pub struct NotificationLogRepository;

impl NotificationLogRepository {
    /// Row currently holding `key` as of `now`, if any.
    pub async fn find_by_deduplication_key(
        pool: &SqlitePool,
        key: &str,
        now: NaiveDateTime,
    ) -> AppResult<Option<NotificationLog>> {
        let sql = format!(
            "SELECT {} FROM notification_logs WHERE deduplication_key = ? AND {}",
            LOG_COLUMNS, HOLDS_KEY
        );
        sqlx::query_as::<_, NotificationLog>(&sql)
            .bind(key)
            .bind(now)
            .bind(now)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Insert a leased `pending` row for the key. Returns `None` when another
    /// row still holds the key.
    pub async fn reserve(
        pool: &SqlitePool,
        log: CreateNotificationLog,
        now: NaiveDateTime,
    ) -> AppResult<Option<NotificationLog>> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        let purge = format!(
            "DELETE FROM notification_logs WHERE deduplication_key = ? AND NOT ({})",
            HOLDS_KEY
        );
        sqlx::query(&purge)
            .bind(&log.deduplication_key)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        let sql = format!(
            r#"
            INSERT INTO notification_logs (
                id, user_id, notification_type, channel, title, body, status,
                error_message, deduplication_key, sent_at, expires_at, lease_expires_at,
                created_at
            )
            VALUES (?, ?, ?, '', ?, ?, ?, NULL, ?, NULL, ?, ?, ?)
            ON CONFLICT(deduplication_key) DO NOTHING
            RETURNING {}
            "#,
            LOG_COLUMNS
        );
        let inserted = sqlx::query_as::<_, NotificationLog>(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(log.user_id)
            .bind(log.notification_type)
            .bind(log.title)
            .bind(log.body)
            .bind(LOG_STATUS_PENDING)
            .bind(log.deduplication_key)
            .bind(log.expires_at)
            .bind(log.lease_expires_at)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(inserted)
    }

    /// Record the final delivery outcome on a reserved row and drop its lease.
    pub async fn finalize(
        pool: &SqlitePool,
        id: &str,
        outcome: FinalizeNotificationLog,
    ) -> AppResult<NotificationLog> {
        let sql = format!(
            r#"
            UPDATE notification_logs
            SET status = ?, channel = ?, error_message = ?, sent_at = ?,
                lease_expires_at = NULL
            WHERE id = ?
            RETURNING {}
            "#,
            LOG_COLUMNS
        );
        sqlx::query_as::<_, NotificationLog>(&sql)
            .bind(outcome.status)
            .bind(outcome.channel)
            .bind(outcome.error_message)
            .bind(outcome.sent_at)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::NotFound(format!("notification log {}", id)))
    }

    /// Drop a reservation that never reached delivery.
    pub async fn delete(pool: &SqlitePool, id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM notification_logs WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    /// Delete every row that no longer holds its key. Returns the number removed.
    pub async fn delete_expired(pool: &SqlitePool, now: NaiveDateTime) -> AppResult<u64> {
        let sql = format!("DELETE FROM notification_logs WHERE NOT ({})", HOLDS_KEY);
        let result = sqlx::query(&sql)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected())
    }
}
