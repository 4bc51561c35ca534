//! In-memory doubles for pipeline tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use crate::db::*;
use crate::error::{AppError, AppResult};
use crate::services::clock::{Clock, Sleeper};
use crate::services::email::EmailProvider;
use crate::services::push::PushProvider;
use crate::services::render::PushMessage;
use crate::services::retry::DeliveryError;
use crate::services::stores::*;

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, hour, 0, 0).unwrap()
}

fn epoch() -> NaiveDateTime {
    at(2025, 1, 1, 0).naive_utc()
}

pub fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        email: format!("{}@example.com", id),
        display_name: id.to_string(),
        lang: None,
        created_at: epoch(),
        updated_at: epoch(),
    }
}

pub fn owned_task(owner: &User, title: &str, priority: i64, due_date: NaiveDate) -> OwnedTask {
    OwnedTask {
        task: Task {
            id: format!("task-{}-{}", owner.id, title),
            user_id: owner.id.clone(),
            title: title.to_string(),
            status: TASK_STATUS_PENDING.to_string(),
            priority,
            due_date,
            created_at: epoch(),
            updated_at: epoch(),
        },
        owner: owner.clone(),
    }
}

pub fn owned_crop(owner: &User, name: &str, expected: Option<NaiveDate>) -> OwnedCrop {
    OwnedCrop {
        crop: Crop {
            id: format!("crop-{}-{}", owner.id, name),
            user_id: owner.id.clone(),
            name: name.to_string(),
            status: CROP_STATUS_GROWING.to_string(),
            expected_harvest_date: expected,
            created_at: epoch(),
            updated_at: epoch(),
        },
        owner: owner.clone(),
    }
}

#[derive(Default)]
struct State {
    users: Vec<User>,
    tasks: Vec<Task>,
    crops: Vec<Crop>,
    tokens: Vec<DeviceToken>,
    settings: HashMap<String, NotificationSettings>,
    logs: Vec<NotificationLog>,
    next_log_id: usize,
    fail_task_queries: bool,
    fail_log_writes: bool,
}

impl State {
    fn owner(&self, user_id: &str) -> Option<User> {
        self.users.iter().find(|u| u.id == user_id).cloned()
    }
}

fn holds_key(log: &NotificationLog, now: NaiveDateTime) -> bool {
    log.expires_at > now && log.lease_expires_at.map_or(true, |lease| lease > now)
}

fn unavailable() -> AppError {
    AppError::ServiceUnavailable("store unavailable".to_string())
}

/// Implements every store trait over plain vectors.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, id: &str, email: &str) -> User {
        let mut u = user(id);
        u.email = email.to_string();
        self.state.lock().unwrap().users.push(u.clone());
        u
    }

    pub fn add_task(&self, owner: &User, title: &str, priority: i64, due_date: NaiveDate) -> Task {
        let task = owned_task(owner, title, priority, due_date).task;
        self.state.lock().unwrap().tasks.push(task.clone());
        task
    }

    pub fn add_crop(&self, owner: &User, name: &str, expected: Option<NaiveDate>) -> Crop {
        let crop = owned_crop(owner, name, expected).crop;
        self.state.lock().unwrap().crops.push(crop.clone());
        crop
    }

    pub fn add_token(&self, owner: &User, platform: DevicePlatform, token: &str) -> DeviceToken {
        let token = DeviceToken {
            id: format!("dt-{}", token),
            user_id: owner.id.clone(),
            platform: platform.as_str().to_string(),
            token: token.to_string(),
            is_active: true,
            created_at: epoch(),
            updated_at: epoch(),
        };
        self.state.lock().unwrap().tokens.push(token.clone());
        token
    }

    pub fn set_email(&self, user_id: &str, email: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(u) = state.users.iter_mut().find(|u| u.id == user_id) {
            u.email = email.to_string();
        }
    }

    pub fn token(&self, id: &str) -> Option<DeviceToken> {
        self.state
            .lock()
            .unwrap()
            .tokens
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    pub fn active_tokens(&self, user_id: &str) -> Vec<DeviceToken> {
        self.state
            .lock()
            .unwrap()
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id && t.is_active)
            .cloned()
            .collect()
    }

    pub fn set_settings(&self, settings: NotificationSettings) {
        self.state
            .lock()
            .unwrap()
            .settings
            .insert(settings.user_id.clone(), settings);
    }

    pub fn logs(&self) -> Vec<NotificationLog> {
        self.state.lock().unwrap().logs.clone()
    }

    pub fn fail_task_queries(&self, fail: bool) {
        self.state.lock().unwrap().fail_task_queries = fail;
    }

    /// Makes finalize and release fail; reservations still succeed.
    pub fn fail_log_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_log_writes = fail;
    }

    fn pending_tasks(&self, keep: impl Fn(&Task) -> bool) -> AppResult<Vec<OwnedTask>> {
        let state = self.state.lock().unwrap();
        if state.fail_task_queries {
            return Err(unavailable());
        }
        let mut out: Vec<OwnedTask> = state
            .tasks
            .iter()
            .filter(|t| t.status == TASK_STATUS_PENDING && keep(t))
            .filter_map(|t| {
                Some(OwnedTask {
                    task: t.clone(),
                    owner: state.owner(&t.user_id)?,
                })
            })
            .collect();
        out.sort_by(|a, b| {
            a.task
                .user_id
                .cmp(&b.task.user_id)
                .then(b.task.priority.cmp(&a.task.priority))
                .then(a.task.due_date.cmp(&b.task.due_date))
        });
        Ok(out)
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn get_by_id(&self, id: &str) -> AppResult<Option<User>> {
        Ok(self.state.lock().unwrap().owner(id))
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn get_all_overdue_tasks(&self, today: NaiveDate) -> AppResult<Vec<OwnedTask>> {
        self.pending_tasks(|t| t.due_date < today)
    }

    async fn get_all_today_tasks(&self, today: NaiveDate) -> AppResult<Vec<OwnedTask>> {
        self.pending_tasks(|t| t.due_date == today)
    }
}

#[async_trait]
impl CropStore for InMemoryStore {
    async fn get_upcoming_harvests(
        &self,
        today: NaiveDate,
        days_ahead: u32,
    ) -> AppResult<Vec<OwnedCrop>> {
        let state = self.state.lock().unwrap();
        let until = today + chrono::Duration::days(i64::from(days_ahead));
        let mut out: Vec<OwnedCrop> = state
            .crops
            .iter()
            .filter(|c| c.status == CROP_STATUS_GROWING)
            .filter(|c| matches!(c.expected_harvest_date, Some(d) if d >= today && d <= until))
            .filter_map(|c| {
                Some(OwnedCrop {
                    crop: c.clone(),
                    owner: state.owner(&c.user_id)?,
                })
            })
            .collect();
        out.sort_by(|a, b| {
            a.crop
                .user_id
                .cmp(&b.crop.user_id)
                .then(a.crop.expected_harvest_date.cmp(&b.crop.expected_harvest_date))
        });
        Ok(out)
    }
}

#[async_trait]
impl DeviceTokenStore for InMemoryStore {
    async fn get_active_by_user_id(&self, user_id: &str) -> AppResult<Vec<DeviceToken>> {
        Ok(self.active_tokens(user_id))
    }

    async fn deactivate_token(&self, token_id: &str) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        let token = state
            .tokens
            .iter_mut()
            .find(|t| t.id == token_id)
            .ok_or_else(|| AppError::NotFound(format!("device token {}", token_id)))?;
        token.is_active = false;
        Ok(())
    }
}

#[async_trait]
impl NotificationSettingsStore for InMemoryStore {
    async fn get_by_user_id(&self, user_id: &str) -> AppResult<Option<NotificationSettings>> {
        Ok(self.state.lock().unwrap().settings.get(user_id).cloned())
    }
}

#[async_trait]
impl NotificationLogStore for InMemoryStore {
    async fn get_by_deduplication_key(
        &self,
        key: &str,
        now: NaiveDateTime,
    ) -> AppResult<Option<NotificationLog>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .logs
            .iter()
            .find(|l| l.deduplication_key == key && holds_key(l, now))
            .cloned())
    }

    async fn reserve(
        &self,
        log: CreateNotificationLog,
        now: NaiveDateTime,
    ) -> AppResult<Option<NotificationLog>> {
        let mut state = self.state.lock().unwrap();
        state
            .logs
            .retain(|l| l.deduplication_key != log.deduplication_key || holds_key(l, now));
        if state
            .logs
            .iter()
            .any(|l| l.deduplication_key == log.deduplication_key)
        {
            return Ok(None);
        }

        state.next_log_id += 1;
        let row = NotificationLog {
            id: format!("log-{}", state.next_log_id),
            user_id: log.user_id,
            notification_type: log.notification_type,
            channel: String::new(),
            title: log.title,
            body: log.body,
            status: LOG_STATUS_PENDING.to_string(),
            error_message: None,
            deduplication_key: log.deduplication_key,
            sent_at: None,
            expires_at: log.expires_at,
            lease_expires_at: Some(log.lease_expires_at),
            created_at: now,
        };
        state.logs.push(row.clone());
        Ok(Some(row))
    }

    async fn finalize(&self, id: &str, outcome: FinalizeNotificationLog) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_log_writes {
            return Err(unavailable());
        }
        let row = state
            .logs
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| AppError::NotFound(format!("notification log {}", id)))?;
        row.status = outcome.status;
        row.channel = outcome.channel;
        row.error_message = outcome.error_message;
        row.sent_at = outcome.sent_at;
        row.lease_expires_at = None;
        Ok(())
    }

    async fn release(&self, id: &str) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_log_writes {
            return Err(unavailable());
        }
        state.logs.retain(|l| l.id != id);
        Ok(())
    }
}

/// Records every publish; endpoints registered with `fail_endpoint` always fail.
#[derive(Default)]
pub struct FakePushProvider {
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, DeliveryError>>,
    hang: Mutex<bool>,
    cancel_after_publish: Mutex<Option<CancellationToken>>,
}

impl FakePushProvider {
    pub fn fail_endpoint(&self, endpoint: &str, err: DeliveryError) {
        self.failures
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), err);
    }

    /// While set, every publish is recorded and then never completes.
    pub fn hang(&self, hang: bool) {
        *self.hang.lock().unwrap() = hang;
    }

    /// Cancel `token` right after the next publish returns.
    pub fn cancel_after_publish(&self, token: CancellationToken) {
        *self.cancel_after_publish.lock().unwrap() = Some(token);
    }

    /// Endpoints in call order, one entry per attempt.
    pub fn endpoints(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushProvider for FakePushProvider {
    async fn publish(
        &self,
        endpoint: &str,
        _message: &PushMessage,
    ) -> Result<String, DeliveryError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(endpoint.to_string());
            calls.len()
        };
        let hang = *self.hang.lock().unwrap();
        if hang {
            std::future::pending::<()>().await;
        }
        if let Some(token) = self.cancel_after_publish.lock().unwrap().take() {
            token.cancel();
        }
        match self.failures.lock().unwrap().get(endpoint) {
            Some(err) => Err(err.clone()),
            None => Ok(format!("push-{}", n)),
        }
    }
}

#[derive(Default)]
pub struct FakeEmailProvider {
    sent: Mutex<Vec<String>>,
    failure: Mutex<Option<DeliveryError>>,
}

impl FakeEmailProvider {
    pub fn fail_with(&self, err: DeliveryError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    /// Recipients of every attempt, including failed ones.
    pub fn recipients(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailProvider for FakeEmailProvider {
    async fn send(
        &self,
        to: &str,
        _subject: &str,
        _html: &str,
        _text: &str,
    ) -> Result<String, DeliveryError> {
        let n = {
            let mut sent = self.sent.lock().unwrap();
            sent.push(to.to_string());
            sent.len()
        };
        match self.failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(format!("<mail-{}@garden.local>", n)),
        }
    }
}

/// Returns immediately and remembers the requested delays.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
