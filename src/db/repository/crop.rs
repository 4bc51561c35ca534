use chrono::{Duration, NaiveDate};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::db::repository::UserRepository;
use crate::error::{AppError, AppResult};

// ============================================================================
// Crop Repository
// ============================================================================

pub struct CropRepository;

impl CropRepository {
    /// Growing crops with an expected harvest in `[today, today + days_ahead]` (inclusive).
    pub async fn find_upcoming_harvests(
        pool: &SqlitePool,
        today: NaiveDate,
        days_ahead: u32,
    ) -> AppResult<Vec<OwnedCrop>> {
        let until = today + Duration::days(i64::from(days_ahead));

        let rows = sqlx::query(
            r#"
            SELECT
                c.id, c.user_id, c.name, c.status, c.expected_harvest_date,
                c.created_at, c.updated_at,
                u.id AS owner_id, u.email AS owner_email,
                u.display_name AS owner_display_name, u.lang AS owner_lang,
                u.created_at AS owner_created_at, u.updated_at AS owner_updated_at
            FROM crops c
            JOIN users u ON u.id = c.user_id
            WHERE c.status = ?
              AND c.expected_harvest_date IS NOT NULL
              AND c.expected_harvest_date >= ?
              AND c.expected_harvest_date <= ?
            ORDER BY c.user_id ASC, c.expected_harvest_date ASC
            "#,
        )
        .bind(CROP_STATUS_GROWING)
        .bind(today)
        .bind(until)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        rows.iter()
            .map(Self::owned_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(AppError::Database)
    }

    fn owned_from_row(r: &SqliteRow) -> Result<OwnedCrop, sqlx::Error> {
        Ok(OwnedCrop {
            crop: Crop {
                id: r.try_get("id")?,
                user_id: r.try_get("user_id")?,
                name: r.try_get("name")?,
                status: r.try_get("status")?,
                expected_harvest_date: r.try_get("expected_harvest_date")?,
                created_at: r.try_get("created_at")?,
                updated_at: r.try_get("updated_at")?,
            },
            owner: UserRepository::from_row(r, "owner_")?,
        })
    }
}

// Fixtures for tests; rows are normally written by the planner API.
#[cfg(test)]
impl CropRepository {
    pub async fn create(
        pool: &SqlitePool,
        user_id: &str,
        name: &str,
        expected_harvest_date: Option<NaiveDate>,
    ) -> AppResult<Crop> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().naive_utc();

        sqlx::query_as::<_, Crop>(
            r#"
            INSERT INTO crops (id, user_id, name, status, expected_harvest_date, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id, user_id, name, status, expected_harvest_date, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(name)
        .bind(CROP_STATUS_GROWING)
        .bind(expected_harvest_date)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }
}
