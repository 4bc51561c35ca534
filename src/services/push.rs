use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::PushConfig;
use crate::services::render::PushMessage;
use crate::services::retry::{classify_status, DeliveryError};

#[async_trait]
pub trait PushProvider: Send + Sync + 'static {
    /// Publish to one device endpoint; returns the provider message id.
    async fn publish(&self, endpoint: &str, message: &PushMessage) -> Result<String, DeliveryError>;
}

#[derive(Serialize)]
struct PublishRequest<'a> {
    endpoint: &'a str,
    message_structure: &'static str,
    message: String,
}

#[derive(Deserialize)]
struct PublishResponse {
    message_id: String,
}

#[derive(Deserialize)]
struct GatewayErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Push gateway reached over HTTP with a bearer API key.
pub struct HttpPushProvider {
    client: reqwest::Client,
    publish_url: String,
    api_key: Option<String>,
}

impl HttpPushProvider {
    /// `None` when no gateway URL is configured.
    pub fn from_config(config: &PushConfig) -> anyhow::Result<Option<Self>> {
        let Some(base) = config.gateway_url.as_deref() else {
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        Ok(Some(Self {
            client,
            publish_url: format!("{}/v1/publish", base.trim_end_matches('/')),
            api_key: config.api_key.clone(),
        }))
    }
}

#[async_trait]
impl PushProvider for HttpPushProvider {
    async fn publish(
        &self,
        endpoint: &str,
        message: &PushMessage,
    ) -> Result<String, DeliveryError> {
        let envelope = message
            .to_envelope()
            .map_err(|e| DeliveryError::Permanent(e.to_string()))?;
        let body = PublishRequest {
            endpoint,
            message_structure: "json",
            message: envelope,
        };

        let mut request = self.client.post(&self.publish_url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        // Connection-level failures never reached the gateway's validation.
        let response = request.send().await.map_err(|e| {
            DeliveryError::Transient(format!("push gateway request failed: {}", e))
        })?;

        let status = response.status();
        if status.is_success() {
            let parsed: PublishResponse = response.json().await.map_err(|e| {
                DeliveryError::Transient(format!("invalid push gateway response: {}", e))
            })?;
            return Ok(parsed.message_id);
        }

        let text = response.text().await.unwrap_or_default();
        // Keep the gateway error code verbatim; token invalidity is detected from it.
        let detail = match serde_json::from_str::<GatewayErrorBody>(&text) {
            Ok(GatewayErrorBody { code, message }) => format!(
                "push gateway error ({}): {} {}",
                status.as_u16(),
                code.unwrap_or_default(),
                message.unwrap_or_default()
            ),
            Err(_) => format!("push gateway error ({}): {}", status.as_u16(), text),
        };
        Err(classify_status(status.as_u16(), detail.trim_end().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_gateway_yields_no_provider() {
        let config = PushConfig {
            gateway_url: None,
            api_key: None,
            request_timeout_seconds: 5,
        };
        assert!(HttpPushProvider::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn publish_url_is_built_from_base() {
        let config = PushConfig {
            gateway_url: Some("https://push.example.com/".to_string()),
            api_key: Some("k".to_string()),
            request_timeout_seconds: 5,
        };
        let provider = HttpPushProvider::from_config(&config).unwrap().unwrap();
        assert_eq!(provider.publish_url, "https://push.example.com/v1/publish");
    }
}
