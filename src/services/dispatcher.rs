use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::db::DeviceToken;
use crate::services::email::EmailProvider;
use crate::services::events::NotificationEvent;
use crate::services::push::PushProvider;
use crate::services::render::RenderedNotification;
use crate::services::retry::{RetryError, RetryExecutor};
use crate::services::settings::ChannelPermissions;
use crate::services::stores::{DeviceTokenStore, UserStore};
use crate::services::token_lifecycle::TokenLifecycleManager;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    /// Nothing was sent on this channel, with the reason.
    NotAttempted(&'static str),
    /// At least one send succeeded; `errors` lists the ones that did not.
    Delivered {
        message_ids: Vec<String>,
        errors: Vec<String>,
    },
    Failed {
        errors: Vec<String>,
    },
}

impl ChannelOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ChannelOutcome::Delivered { .. })
    }

    pub fn is_attempted(&self) -> bool {
        !matches!(self, ChannelOutcome::NotAttempted(_))
    }

    pub fn errors(&self) -> &[String] {
        match self {
            ChannelOutcome::NotAttempted(_) => &[],
            ChannelOutcome::Delivered { errors, .. } | ChannelOutcome::Failed { errors } => errors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub push: ChannelOutcome,
    pub email: ChannelOutcome,
    /// The run was cancelled while a send on either channel was in flight.
    pub cancelled: bool,
}

impl DispatchOutcome {
    /// An event counts as sent when any channel delivered.
    pub fn is_success(&self) -> bool {
        self.push.is_delivered() || self.email.is_delivered()
    }

    /// Channels recorded on the log row: delivered ones on success, attempted ones otherwise.
    pub fn channel_label(&self) -> String {
        let pick: fn(&ChannelOutcome) -> bool = if self.is_success() {
            ChannelOutcome::is_delivered
        } else {
            ChannelOutcome::is_attempted
        };
        [("push", &self.push), ("email", &self.email)]
            .into_iter()
            .filter(|(_, outcome)| pick(outcome))
            .map(|(name, _)| name)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn error_summary(&self) -> Option<String> {
        let mut parts: Vec<String> = Vec::new();
        for (name, outcome) in [("push", &self.push), ("email", &self.email)] {
            match outcome {
                ChannelOutcome::NotAttempted(reason) if !self.is_success() => {
                    parts.push(format!("{}: {}", name, reason))
                }
                ChannelOutcome::NotAttempted(_) => {}
                other => parts.extend(other.errors().iter().map(|e| format!("{}: {}", name, e))),
            }
        }
        if self.cancelled {
            parts.push("run cancelled".to_string());
        }
        (!parts.is_empty()).then(|| parts.join("; "))
    }
}

enum TokenSend {
    Sent(String),
    Failed(String),
    Cancelled,
}

/// Fans one rendered event out to every active device token and the user's
/// email address. Channels and tokens fail independently.
pub struct DeliveryDispatcher {
    push: Option<Arc<dyn PushProvider>>,
    email: Option<Arc<dyn EmailProvider>>,
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn DeviceTokenStore>,
    lifecycle: TokenLifecycleManager,
    retry: RetryExecutor,
}

impl DeliveryDispatcher {
    pub fn new(
        push: Option<Arc<dyn PushProvider>>,
        email: Option<Arc<dyn EmailProvider>>,
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn DeviceTokenStore>,
        retry: RetryExecutor,
    ) -> Self {
        Self {
            push,
            email,
            users,
            lifecycle: TokenLifecycleManager::new(tokens.clone()),
            tokens,
            retry,
        }
    }

    pub async fn dispatch(
        &self,
        event: &NotificationEvent,
        rendered: &RenderedNotification,
        permissions: ChannelPermissions,
        cancel: &CancellationToken,
    ) -> DispatchOutcome {
        let ((push, push_cancelled), (email, email_cancelled)) = tokio::join!(
            self.dispatch_push(event, rendered, permissions, cancel),
            self.dispatch_email(event, rendered, permissions, cancel),
        );
        DispatchOutcome {
            push,
            email,
            cancelled: push_cancelled || email_cancelled,
        }
    }

    async fn dispatch_push(
        &self,
        event: &NotificationEvent,
        rendered: &RenderedNotification,
        permissions: ChannelPermissions,
        cancel: &CancellationToken,
    ) -> (ChannelOutcome, bool) {
        if !permissions.push {
            return (ChannelOutcome::NotAttempted("disabled in settings"), false);
        }
        let Some(provider) = self.push.as_deref() else {
            return (ChannelOutcome::NotAttempted("push provider not configured"), false);
        };

        let tokens = match self.tokens.get_active_by_user_id(event.user_id()).await {
            Ok(tokens) => tokens,
            Err(e) => {
                return (
                    ChannelOutcome::Failed {
                        errors: vec![format!("failed to load device tokens: {}", e)],
                    },
                    false,
                )
            }
        };
        if tokens.is_empty() {
            return (ChannelOutcome::NotAttempted("no active device tokens"), false);
        }

        let results = join_all(
            tokens
                .iter()
                .map(|token| self.push_to_token(provider, token, rendered, cancel)),
        )
        .await;

        let mut message_ids = Vec::new();
        let mut errors = Vec::new();
        let mut cancelled = false;
        for result in results {
            match result {
                TokenSend::Sent(id) => message_ids.push(id),
                TokenSend::Failed(e) => errors.push(e),
                TokenSend::Cancelled => cancelled = true,
            }
        }

        let outcome = if message_ids.is_empty() {
            ChannelOutcome::Failed { errors }
        } else {
            ChannelOutcome::Delivered {
                message_ids,
                errors,
            }
        };
        (outcome, cancelled)
    }

    async fn push_to_token(
        &self,
        provider: &dyn PushProvider,
        token: &DeviceToken,
        rendered: &RenderedNotification,
        cancel: &CancellationToken,
    ) -> TokenSend {
        let Some(platform) = token.platform() else {
            return TokenSend::Failed(format!(
                "token {} has unsupported platform '{}'",
                token.id, token.platform
            ));
        };
        let message = rendered.push_for(platform);

        match self
            .retry
            .run(cancel, || provider.publish(&token.token, message))
            .await
        {
            Ok(message_id) => {
                tracing::debug!("Push sent to token {} ({})", token.id, message_id);
                TokenSend::Sent(message_id)
            }
            Err(RetryError::Cancelled) => TokenSend::Cancelled,
            Err(err) => {
                let deactivated = self.lifecycle.handle_push_failure(token, &err).await;
                tracing::warn!(
                    "Push to {} token {} failed{}: {}",
                    platform.as_str(),
                    token.id,
                    if deactivated { " (token deactivated)" } else { "" },
                    err
                );
                TokenSend::Failed(format!("token {}: {}", token.id, err))
            }
        }
    }

    async fn dispatch_email(
        &self,
        event: &NotificationEvent,
        rendered: &RenderedNotification,
        permissions: ChannelPermissions,
        cancel: &CancellationToken,
    ) -> (ChannelOutcome, bool) {
        if !permissions.email {
            return (ChannelOutcome::NotAttempted("disabled in settings"), false);
        }
        let Some(provider) = self.email.as_deref() else {
            return (ChannelOutcome::NotAttempted("email provider not configured"), false);
        };
        // The address may have changed since the scan snapshot.
        let recipient = match self.users.get_by_id(event.user_id()).await {
            Ok(Some(user)) => user.email,
            Ok(None) => return (ChannelOutcome::NotAttempted("user not found"), false),
            Err(e) => {
                return (
                    ChannelOutcome::Failed {
                        errors: vec![format!("failed to load user: {}", e)],
                    },
                    false,
                )
            }
        };
        let to = recipient.trim();
        if to.is_empty() {
            return (ChannelOutcome::NotAttempted("no email address"), false);
        }

        let content = &rendered.email;
        let result = self
            .retry
            .run(cancel, || {
                provider.send(to, &content.subject, &content.html, &content.text)
            })
            .await;

        match result {
            Ok(message_id) => (
                ChannelOutcome::Delivered {
                    message_ids: vec![message_id],
                    errors: Vec::new(),
                },
                false,
            ),
            Err(RetryError::Cancelled) => (
                ChannelOutcome::Failed {
                    errors: vec!["cancelled".to_string()],
                },
                true,
            ),
            Err(err) => {
                tracing::warn!("Email to user {} failed: {}", event.user_id(), err);
                (
                    ChannelOutcome::Failed {
                        errors: vec![err.to_string()],
                    },
                    false,
                )
            }
        }
    }
}
