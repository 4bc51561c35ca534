use std::sync::Arc;

use crate::db::DeviceToken;
use crate::services::retry::{DeliveryError, RetryError};
use crate::services::stores::DeviceTokenStore;

/// Provider error codes meaning the endpoint will never accept deliveries again.
pub const PERMANENT_INVALIDITY_MARKERS: &[&str] = &[
    "InvalidPlatformToken",
    "EndpointDisabled",
    "InvalidRegistration",
    "NotRegistered",
    "BadDeviceToken",
    "Unregistered",
];

pub fn is_permanently_invalid(err: &RetryError) -> bool {
    match err.delivery_error() {
        Some(DeliveryError::Permanent(msg)) => PERMANENT_INVALIDITY_MARKERS
            .iter()
            .any(|marker| msg.contains(marker)),
        _ => false,
    }
}

/// Deactivates device tokens the push provider reports as dead.
pub struct TokenLifecycleManager {
    tokens: Arc<dyn DeviceTokenStore>,
}

impl TokenLifecycleManager {
    pub fn new(tokens: Arc<dyn DeviceTokenStore>) -> Self {
        Self { tokens }
    }

    /// Returns true if the token was deactivated.
    pub async fn handle_push_failure(&self, token: &DeviceToken, err: &RetryError) -> bool {
        if !is_permanently_invalid(err) {
            return false;
        }

        match self.tokens.deactivate_token(&token.id).await {
            Ok(()) => {
                tracing::info!(
                    "Deactivated {} device token {} for user {}: {}",
                    token.platform,
                    token.id,
                    token.user_id,
                    err
                );
                true
            }
            Err(e) => {
                tracing::warn!("Failed to deactivate device token {}: {}", token.id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DevicePlatform;
    use crate::services::testing::InMemoryStore;

    #[test]
    fn only_permanent_errors_with_markers_count() {
        assert!(is_permanently_invalid(&RetryError::Permanent(
            DeliveryError::Permanent("push gateway error (400): EndpointDisabled".to_string())
        )));
        assert!(!is_permanently_invalid(&RetryError::Permanent(
            DeliveryError::Permanent("payload too large".to_string())
        )));
        assert!(!is_permanently_invalid(&RetryError::Exhausted {
            attempts: 4,
            last: DeliveryError::Transient("InvalidPlatformToken".to_string()),
        }));
        assert!(!is_permanently_invalid(&RetryError::Cancelled));
    }

    #[tokio::test]
    async fn deactivates_token_on_marker() {
        let store = Arc::new(InMemoryStore::new());
        let alice = store.add_user("alice", "a@example.com");
        let token = store.add_token(&alice, DevicePlatform::Ios, "apns-1");

        let manager = TokenLifecycleManager::new(store.clone());
        let err = RetryError::Permanent(DeliveryError::Permanent(
            "InvalidPlatformToken".to_string(),
        ));
        assert!(manager.handle_push_failure(&token, &err).await);
        assert!(!store.token(&token.id).unwrap().is_active);
    }
}
