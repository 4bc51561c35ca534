use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::User;

pub const TASK_STATUS_PENDING: &str = "pending";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub status: String,
    /// Higher means more urgent.
    pub priority: i64,
    pub due_date: NaiveDate,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A task row joined with its owner so the pipeline never looks users up per row.
#[derive(Debug, Clone)]
pub struct OwnedTask {
    pub task: Task,
    pub owner: User,
}
