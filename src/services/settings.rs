use std::sync::Arc;

use crate::db::NotificationSettings;
use crate::error::AppResult;
use crate::services::events::{NotificationEvent, NotificationType};
use crate::services::stores::NotificationSettingsStore;

/// Channels the user allows for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPermissions {
    pub push: bool,
    pub email: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    CategoryDisabled,
    AllChannelsDisabled,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::CategoryDisabled => "category disabled",
            SkipReason::AllChannelsDisabled => "all channels disabled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsDecision {
    Deliver(ChannelPermissions),
    Skip(SkipReason),
}

/// Pure decision for one event type against stored preferences.
pub fn decide(settings: &NotificationSettings, kind: NotificationType) -> SettingsDecision {
    let category_enabled = match kind {
        NotificationType::TaskDueReminder | NotificationType::TaskOverdueAlert => {
            settings.task_reminders
        }
        NotificationType::HarvestReminder => settings.harvest_reminders,
    };
    if !category_enabled {
        return SettingsDecision::Skip(SkipReason::CategoryDisabled);
    }
    if !settings.push_enabled && !settings.email_enabled {
        return SettingsDecision::Skip(SkipReason::AllChannelsDisabled);
    }
    SettingsDecision::Deliver(ChannelPermissions {
        push: settings.push_enabled,
        email: settings.email_enabled,
    })
}

/// Applies per-user preferences; users without stored preferences get everything.
pub struct SettingsFilter {
    settings: Arc<dyn NotificationSettingsStore>,
}

impl SettingsFilter {
    pub fn new(settings: Arc<dyn NotificationSettingsStore>) -> Self {
        Self { settings }
    }

    pub async fn evaluate(&self, event: &NotificationEvent) -> AppResult<SettingsDecision> {
        let settings = self
            .settings
            .get_by_user_id(event.user_id())
            .await?
            .unwrap_or_else(|| NotificationSettings::for_user(event.user_id()));
        Ok(decide(&settings, event.notification_type()))
    }
}
