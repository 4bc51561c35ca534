use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Device Token Repository
// ============================================================================

/// Tokens are registered by the planner API; this service only reads active
/// ones and retires the ones providers reject.
pub struct DeviceTokenRepository;

impl DeviceTokenRepository {
    pub async fn find_active_by_user_id(
        pool: &SqlitePool,
        user_id: &str,
    ) -> AppResult<Vec<DeviceToken>> {
        sqlx::query_as::<_, DeviceToken>(
            r#"
            SELECT id, user_id, platform, token, is_active, created_at, updated_at
            FROM device_tokens
            WHERE user_id = ? AND is_active = 1
            ORDER BY platform ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn deactivate(pool: &SqlitePool, id: &str) -> AppResult<()> {
        let result =
            sqlx::query("UPDATE device_tokens SET is_active = 0, updated_at = ? WHERE id = ?")
                .bind(Utc::now().naive_utc())
                .bind(id)
                .execute(pool)
                .await
                .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("device token {}", id)));
        }
        Ok(())
    }
}

// Fixtures for tests. Mirrors the planner API's registration: one row per
// (user, platform), updated in place and reactivated on re-registration.
#[cfg(test)]
impl DeviceTokenRepository {
    pub async fn register(
        pool: &SqlitePool,
        user_id: &str,
        platform: DevicePlatform,
        token: &str,
    ) -> AppResult<DeviceToken> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, DeviceToken>(
            r#"
            INSERT INTO device_tokens (id, user_id, platform, token, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(user_id, platform) DO UPDATE SET
                token = excluded.token,
                is_active = 1,
                updated_at = excluded.updated_at
            RETURNING id, user_id, platform, token, is_active, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(platform.as_str())
        .bind(token)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }
}
