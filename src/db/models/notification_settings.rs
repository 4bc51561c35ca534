use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub id: String,
    pub user_id: String,
    pub push_enabled: bool,
    pub email_enabled: bool,
    pub task_reminders: bool,
    pub harvest_reminders: bool,
    pub growth_record_notifications: bool,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Users without a stored row get everything enabled.
impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            id: String::new(),
            user_id: String::new(),
            push_enabled: true,
            email_enabled: true,
            task_reminders: true,
            harvest_reminders: true,
            growth_record_notifications: true,
            created_at: Utc::now().naive_utc(),
            updated_at: Utc::now().naive_utc(),
        }
    }
}

impl NotificationSettings {
    pub fn for_user(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            ..Default::default()
        }
    }
}
