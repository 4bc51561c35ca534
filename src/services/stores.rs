//! Storage seams the pipeline depends on. `crate::db::SqliteStore` implements
//! all of them; tests use in-memory fakes.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use crate::db::{
    CreateNotificationLog, DeviceToken, FinalizeNotificationLog, NotificationLog,
    NotificationSettings, OwnedCrop, OwnedTask, User,
};
use crate::error::AppResult;

#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    async fn get_by_id(&self, id: &str) -> AppResult<Option<User>>;
}

#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    /// Pending tasks due before `today`, owner preloaded, ordered by owner.
    async fn get_all_overdue_tasks(&self, today: NaiveDate) -> AppResult<Vec<OwnedTask>>;

    /// Pending tasks due on `today`, owner preloaded, ordered by owner.
    async fn get_all_today_tasks(&self, today: NaiveDate) -> AppResult<Vec<OwnedTask>>;
}

#[async_trait]
pub trait CropStore: Send + Sync + 'static {
    async fn get_upcoming_harvests(
        &self,
        today: NaiveDate,
        days_ahead: u32,
    ) -> AppResult<Vec<OwnedCrop>>;
}

#[async_trait]
pub trait DeviceTokenStore: Send + Sync + 'static {
    async fn get_active_by_user_id(&self, user_id: &str) -> AppResult<Vec<DeviceToken>>;
    async fn deactivate_token(&self, token_id: &str) -> AppResult<()>;
}

#[async_trait]
pub trait NotificationSettingsStore: Send + Sync + 'static {
    /// `None` when the user never saved preferences.
    async fn get_by_user_id(&self, user_id: &str) -> AppResult<Option<NotificationSettings>>;
}

#[async_trait]
pub trait NotificationLogStore: Send + Sync + 'static {
    async fn get_by_deduplication_key(
        &self,
        key: &str,
        now: NaiveDateTime,
    ) -> AppResult<Option<NotificationLog>>;

    /// Atomically claim the key. `None` means an unexpired row already holds it.
    async fn reserve(
        &self,
        log: CreateNotificationLog,
        now: NaiveDateTime,
    ) -> AppResult<Option<NotificationLog>>;

    async fn finalize(&self, id: &str, outcome: FinalizeNotificationLog) -> AppResult<()>;

    async fn release(&self, id: &str) -> AppResult<()>;
}
