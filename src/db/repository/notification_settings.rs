use sqlx::SqlitePool;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Notification Settings Repository
// ============================================================================

pub struct NotificationSettingsRepository;

impl NotificationSettingsRepository {
    /// Stored preferences, or `None` when the user never saved any.
    pub async fn find_by_user_id(
        pool: &SqlitePool,
        user_id: &str,
    ) -> AppResult<Option<NotificationSettings>> {
        sqlx::query_as::<_, NotificationSettings>(
            r#"
            SELECT
                id, user_id, push_enabled, email_enabled, task_reminders,
                harvest_reminders, growth_record_notifications, created_at, updated_at
            FROM notification_settings
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }
}

// Fixtures for tests; preferences are edited through the planner API.
#[cfg(test)]
impl NotificationSettingsRepository {
    pub async fn save(pool: &SqlitePool, settings: &NotificationSettings) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_settings (
                id, user_id, push_enabled, email_enabled, task_reminders,
                harvest_reminders, growth_record_notifications, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&settings.user_id)
        .bind(settings.push_enabled)
        .bind(settings.email_enabled)
        .bind(settings.task_reminders)
        .bind(settings.harvest_reminders)
        .bind(settings.growth_record_notifications)
        .bind(settings.created_at)
        .bind(settings.updated_at)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(())
    }
}
