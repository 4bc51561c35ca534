use chrono::{Duration, NaiveDate};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::db::repository::UserRepository;
use crate::error::{AppError, AppResult};

// ============================================================================
// Task Repository
// ============================================================================

const OWNED_TASK_COLUMNS: &str = r#"
    t.id, t.user_id, t.title, t.status, t.priority, t.due_date,
    t.created_at, t.updated_at,
    u.id AS owner_id, u.email AS owner_email, u.display_name AS owner_display_name,
    u.lang AS owner_lang, u.created_at AS owner_created_at, u.updated_at AS owner_updated_at
"#;

pub struct TaskRepository;

impl TaskRepository {
    /// Pending tasks whose due date is before `today`, across all users.
    ///
    /// Ordered by owner, then most urgent first, then oldest due date.
    pub async fn find_overdue(pool: &SqlitePool, today: NaiveDate) -> AppResult<Vec<OwnedTask>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM tasks t
            JOIN users u ON u.id = t.user_id
            WHERE t.status = ? AND t.due_date < ?
            ORDER BY t.user_id ASC, t.priority DESC, t.due_date ASC
            "#,
            OWNED_TASK_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(TASK_STATUS_PENDING)
            .bind(today)
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)?;

        rows.iter()
            .map(Self::owned_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(AppError::Database)
    }

    /// Pending tasks due within `[today, today + 1 day)`.
    pub async fn find_due_on(pool: &SqlitePool, today: NaiveDate) -> AppResult<Vec<OwnedTask>> {
        let tomorrow = today + Duration::days(1);
        let sql = format!(
            r#"
            SELECT {}
            FROM tasks t
            JOIN users u ON u.id = t.user_id
            WHERE t.status = ? AND t.due_date >= ? AND t.due_date < ?
            ORDER BY t.user_id ASC, t.priority DESC, t.due_date ASC
            "#,
            OWNED_TASK_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(TASK_STATUS_PENDING)
            .bind(today)
            .bind(tomorrow)
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)?;

        rows.iter()
            .map(Self::owned_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(AppError::Database)
    }

    fn owned_from_row(r: &SqliteRow) -> Result<OwnedTask, sqlx::Error> {
        Ok(OwnedTask {
            task: Task {
                id: r.try_get("id")?,
                user_id: r.try_get("user_id")?,
                title: r.try_get("title")?,
                status: r.try_get("status")?,
                priority: r.try_get("priority")?,
                due_date: r.try_get("due_date")?,
                created_at: r.try_get("created_at")?,
                updated_at: r.try_get("updated_at")?,
            },
            owner: UserRepository::from_row(r, "owner_")?,
        })
    }
}

// Fixtures for tests; rows are normally written by the planner API.
#[cfg(test)]
impl TaskRepository {
    pub async fn create(
        pool: &SqlitePool,
        user_id: &str,
        title: &str,
        priority: i64,
        due_date: NaiveDate,
    ) -> AppResult<Task> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().naive_utc();

        sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (id, user_id, title, status, priority, due_date, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, user_id, title, status, priority, due_date, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(title)
        .bind(TASK_STATUS_PENDING)
        .bind(priority)
        .bind(due_date)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn update_status(pool: &SqlitePool, id: &str, status: &str) -> AppResult<()> {
        sqlx::query("UPDATE tasks SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(chrono::Utc::now().naive_utc())
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }
}
