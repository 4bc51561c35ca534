use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// User Repository
// ============================================================================

pub struct UserRepository;

impl UserRepository {
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, display_name, lang, created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        row.map(|r| Self::from_row(&r, ""))
            .transpose()
            .map_err(AppError::Database)
    }

    /// Map owner columns out of a joined row. `prefix` is the column alias prefix
    /// used by the join (`"owner_"`), or empty for a plain `users` select.
    pub(crate) fn from_row(r: &SqliteRow, prefix: &str) -> Result<User, sqlx::Error> {
        let col = |name: &str| format!("{}{}", prefix, name);
        Ok(User {
            id: r.try_get(col("id").as_str())?,
            email: r.try_get(col("email").as_str())?,
            display_name: r.try_get(col("display_name").as_str())?,
            lang: r.try_get(col("lang").as_str())?,
            created_at: r.try_get(col("created_at").as_str())?,
            updated_at: r.try_get(col("updated_at").as_str())?,
        })
    }
}

// Fixtures for tests; rows are normally written by the planner API.
#[cfg(test)]
impl UserRepository {
    pub async fn create(
        pool: &SqlitePool,
        email: &str,
        display_name: &str,
        lang: Option<&str>,
    ) -> AppResult<User> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().naive_utc();

        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, display_name, lang, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, email, display_name, lang, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(display_name)
        .bind(lang)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    #[tokio::test]
    async fn create_then_find_by_id() {
        let pool = test_db::pool().await;
        let created = UserRepository::create(&pool, "ann@example.com", "Ann", Some("en"))
            .await
            .unwrap();

        let found = UserRepository::find_by_id(&pool, &created.id)
            .await
            .unwrap()
            .expect("user exists");
        assert_eq!(found.email, "ann@example.com");
        assert_eq!(found.lang.as_deref(), Some("en"));

        assert!(UserRepository::find_by_id(&pool, "missing")
            .await
            .unwrap()
            .is_none());
    }
}
