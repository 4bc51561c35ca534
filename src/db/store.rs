use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::db::repository::*;
use crate::error::AppResult;
use crate::services::stores::{
    CropStore, DeviceTokenStore, NotificationLogStore, NotificationSettingsStore, TaskStore,
    UserStore,
};

/// Pool-backed implementation of every pipeline store, delegating to the repositories.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn get_by_id(&self, id: &str) -> AppResult<Option<User>> {
        UserRepository::find_by_id(&self.pool, id).await
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn get_all_overdue_tasks(&self, today: NaiveDate) -> AppResult<Vec<OwnedTask>> {
        TaskRepository::find_overdue(&self.pool, today).await
    }

    async fn get_all_today_tasks(&self, today: NaiveDate) -> AppResult<Vec<OwnedTask>> {
        TaskRepository::find_due_on(&self.pool, today).await
    }
}

#[async_trait]
impl CropStore for SqliteStore {
    async fn get_upcoming_harvests(
        &self,
        today: NaiveDate,
        days_ahead: u32,
    ) -> AppResult<Vec<OwnedCrop>> {
        CropRepository::find_upcoming_harvests(&self.pool, today, days_ahead).await
    }
}

#[async_trait]
impl DeviceTokenStore for SqliteStore {
    async fn get_active_by_user_id(&self, user_id: &str) -> AppResult<Vec<DeviceToken>> {
        DeviceTokenRepository::find_active_by_user_id(&self.pool, user_id).await
    }

    async fn deactivate_token(&self, token_id: &str) -> AppResult<()> {
        DeviceTokenRepository::deactivate(&self.pool, token_id).await
    }
}

#[async_trait]
impl NotificationSettingsStore for SqliteStore {
    async fn get_by_user_id(&self, user_id: &str) -> AppResult<Option<NotificationSettings>> {
        NotificationSettingsRepository::find_by_user_id(&self.pool, user_id).await
    }
}

#[async_trait]
impl NotificationLogStore for SqliteStore {
    async fn get_by_deduplication_key(
        &self,
        key: &str,
        now: NaiveDateTime,
    ) -> AppResult<Option<NotificationLog>> {
        NotificationLogRepository::find_by_deduplication_key(&self.pool, key, now).await
    }

    async fn reserve(
        &self,
        log: CreateNotificationLog,
        now: NaiveDateTime,
    ) -> AppResult<Option<NotificationLog>> {
        NotificationLogRepository::reserve(&self.pool, log, now).await
    }

    async fn finalize(&self, id: &str, outcome: FinalizeNotificationLog) -> AppResult<()> {
        NotificationLogRepository::finalize(&self.pool, id, outcome)
            .await
            .map(|_| ())
    }

    async fn release(&self, id: &str) -> AppResult<()> {
        NotificationLogRepository::delete(&self.pool, id).await
    }
}
