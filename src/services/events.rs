use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    TaskDueReminder,
    TaskOverdueAlert,
    HarvestReminder,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::TaskDueReminder => "task_due_reminder",
            NotificationType::TaskOverdueAlert => "task_overdue_alert",
            NotificationType::HarvestReminder => "harvest_reminder",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed payload of an event; the variant determines the notification type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventDetails {
    TaskDue {
        task_count: usize,
        first_task_id: String,
        first_task_title: String,
    },
    TaskOverdue {
        overdue_count: usize,
        oldest_due_date: NaiveDate,
    },
    Harvest {
        crop_id: String,
        crop_name: String,
        days_until_harvest: i64,
        expected_harvest_date: NaiveDate,
    },
}

impl EventDetails {
    pub fn notification_type(&self) -> NotificationType {
        match self {
            EventDetails::TaskDue { .. } => NotificationType::TaskDueReminder,
            EventDetails::TaskOverdue { .. } => NotificationType::TaskOverdueAlert,
            EventDetails::Harvest { .. } => NotificationType::HarvestReminder,
        }
    }

    /// Flat key/value view shipped to clients alongside the message.
    pub fn to_data(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert(
            "type".to_string(),
            Value::from(self.notification_type().as_str()),
        );
        match self {
            EventDetails::TaskDue {
                task_count,
                first_task_id,
                first_task_title,
            } => {
                data.insert("taskCount".to_string(), Value::from(*task_count));
                data.insert("taskId".to_string(), Value::from(first_task_id.as_str()));
                data.insert(
                    "taskTitle".to_string(),
                    Value::from(first_task_title.as_str()),
                );
            }
            EventDetails::TaskOverdue {
                overdue_count,
                oldest_due_date,
            } => {
                data.insert("overdueCount".to_string(), Value::from(*overdue_count));
                data.insert(
                    "oldestDueDate".to_string(),
                    Value::from(oldest_due_date.to_string()),
                );
            }
            EventDetails::Harvest {
                crop_id,
                crop_name,
                days_until_harvest,
                expected_harvest_date,
            } => {
                data.insert("cropId".to_string(), Value::from(crop_id.as_str()));
                data.insert("cropName".to_string(), Value::from(crop_name.as_str()));
                data.insert(
                    "daysUntilHarvest".to_string(),
                    Value::from(*days_until_harvest),
                );
                data.insert(
                    "expectedHarvestDate".to_string(),
                    Value::from(expected_harvest_date.to_string()),
                );
            }
        }
        data
    }
}

/// One notification addressed to one user, with localized copy already resolved.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    /// Owner snapshot taken at scan time.
    pub user: User,
    pub title: String,
    pub body: String,
    pub details: EventDetails,
    pub data: Map<String, Value>,
}

impl NotificationEvent {
    pub fn new(user: User, title: String, body: String, details: EventDetails) -> Self {
        let data = details.to_data();
        Self {
            user,
            title,
            body,
            details,
            data,
        }
    }

    pub fn notification_type(&self) -> NotificationType {
        self.details.notification_type()
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    /// `{type}:{user_id}:{YYYY-MM-DD}` for the run date.
    pub fn deduplication_key(&self, date: NaiveDate) -> String {
        format!(
            "{}:{}:{}",
            self.notification_type().as_str(),
            self.user.id,
            date.format("%Y-%m-%d")
        )
    }
}
