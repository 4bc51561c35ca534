use std::sync::Arc;

use chrono::NaiveDate;

use crate::db::{OwnedCrop, OwnedTask};
use crate::error::AppError;
use crate::services::stores::{CropStore, TaskStore};

/// A query that feeds the run failed; the whole run is aborted.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("failed to load overdue tasks: {0}")]
    OverdueTasks(#[source] Box<AppError>),

    #[error("failed to load tasks due today: {0}")]
    DueTodayTasks(#[source] Box<AppError>),

    #[error("failed to load upcoming harvests: {0}")]
    UpcomingHarvests(#[source] Box<AppError>),
}

/// Rows selected for one run, each list grouped by owner.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub overdue_tasks: Vec<OwnedTask>,
    pub due_today_tasks: Vec<OwnedTask>,
    pub upcoming_harvests: Vec<OwnedCrop>,
}

pub struct TimeWindowScanner {
    tasks: Arc<dyn TaskStore>,
    crops: Arc<dyn CropStore>,
    harvest_days_ahead: u32,
}

impl TimeWindowScanner {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        crops: Arc<dyn CropStore>,
        harvest_days_ahead: u32,
    ) -> Self {
        Self {
            tasks,
            crops,
            harvest_days_ahead,
        }
    }

    /// Run the three window queries for `today`.
    ///
    /// Stores return rows ordered by owner; the stable sort here keeps that
    /// grouping guaranteed without disturbing the per-owner order.
    pub async fn scan(&self, today: NaiveDate) -> Result<ScanResult, ScanError> {
        let mut overdue_tasks = self
            .tasks
            .get_all_overdue_tasks(today)
            .await
            .map_err(|e| ScanError::OverdueTasks(Box::new(e)))?;

        let mut due_today_tasks = self
            .tasks
            .get_all_today_tasks(today)
            .await
            .map_err(|e| ScanError::DueTodayTasks(Box::new(e)))?;

        let mut upcoming_harvests = self
            .crops
            .get_upcoming_harvests(today, self.harvest_days_ahead)
            .await
            .map_err(|e| ScanError::UpcomingHarvests(Box::new(e)))?;

        overdue_tasks.sort_by(|a, b| a.task.user_id.cmp(&b.task.user_id));
        due_today_tasks.sort_by(|a, b| a.task.user_id.cmp(&b.task.user_id));
        upcoming_harvests.sort_by(|a, b| a.crop.user_id.cmp(&b.crop.user_id));

        tracing::debug!(
            "Scan for {}: {} overdue, {} due today, {} upcoming harvests",
            today,
            overdue_tasks.len(),
            due_today_tasks.len(),
            upcoming_harvests.len()
        );

        Ok(ScanResult {
            overdue_tasks,
            due_today_tasks,
            upcoming_harvests,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_db, SqliteStore, UserRepository};
    use crate::error::AppError;
    use crate::services::testing::{day, InMemoryStore};

    #[tokio::test]
    async fn undecodable_task_row_fails_the_scan() {
        let pool = test_db::pool().await;
        let user = UserRepository::create(&pool, "a@example.com", "A", None)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO tasks (id, user_id, title, status, priority, due_date) \
             VALUES ('t-bad', ?, 'broken', 'pending', 0, '2025-01-32')",
        )
        .bind(&user.id)
        .execute(&pool)
        .await
        .unwrap();

        let store = Arc::new(SqliteStore::new(pool));
        let scanner = TimeWindowScanner::new(store.clone(), store, 7);
        let err = scanner.scan(day(2025, 5, 10)).await.unwrap_err();
        match err {
            ScanError::OverdueTasks(inner) => {
                assert!(matches!(*inner, AppError::Database(_)))
            }
            other => panic!("expected overdue scan failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn selects_each_window() {
        let store = Arc::new(InMemoryStore::new());
        let today = day(2025, 5, 10);
        let alice = store.add_user("alice", "alice@example.com");
        store.add_task(&alice, "Weed beds", 1, day(2025, 5, 8));
        store.add_task(&alice, "Water", 2, today);
        store.add_task(&alice, "Prune", 1, day(2025, 5, 11));
        store.add_crop(&alice, "Tomato", Some(day(2025, 5, 17)));
        store.add_crop(&alice, "Squash", Some(day(2025, 5, 18)));
        store.add_crop(&alice, "Garlic", None);

        let scanner = TimeWindowScanner::new(store.clone(), store.clone(), 7);
        let result = scanner.scan(today).await.unwrap();

        assert_eq!(result.overdue_tasks.len(), 1);
        assert_eq!(result.overdue_tasks[0].task.title, "Weed beds");
        assert_eq!(result.due_today_tasks.len(), 1);
        assert_eq!(result.due_today_tasks[0].task.title, "Water");
        assert_eq!(result.upcoming_harvests.len(), 1);
        assert_eq!(result.upcoming_harvests[0].crop.name, "Tomato");
        assert_eq!(result.upcoming_harvests[0].owner.id, alice.id);
    }

    #[tokio::test]
    async fn query_failure_aborts_the_scan() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_task_queries(true);

        let scanner = TimeWindowScanner::new(store.clone(), store.clone(), 7);
        let err = scanner.scan(day(2025, 5, 10)).await.unwrap_err();
        assert!(matches!(err, ScanError::OverdueTasks(_)));
    }
}
