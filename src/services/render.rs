use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::db::DevicePlatform;
use crate::i18n;
use crate::services::events::{EventDetails, NotificationEvent};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("data field '{0}' must be a string, number or boolean")]
    NonScalarData(String),

    #[error("failed to encode push payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Push payload for one platform plus the plain-text fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub platform: DevicePlatform,
    pub default: String,
    pub payload: Value,
}

impl PushMessage {
    /// Provider envelope key for the platform payload.
    pub fn platform_key(&self) -> &'static str {
        match self.platform {
            DevicePlatform::Ios => "APNS",
            DevicePlatform::Android | DevicePlatform::Web => "GCM",
        }
    }

    /// `{"default": ..., "<KEY>": "<payload as JSON string>"}`, the structure
    /// push gateways expect for per-platform messages.
    pub fn to_envelope(&self) -> Result<String, RenderError> {
        let mut envelope = Map::new();
        envelope.insert("default".to_string(), Value::from(self.default.as_str()));
        envelope.insert(
            self.platform_key().to_string(),
            Value::from(serde_json::to_string(&self.payload)?),
        );
        Ok(serde_json::to_string(&Value::Object(envelope))?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailContent {
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct RenderedNotification {
    pub ios: PushMessage,
    pub android: PushMessage,
    pub web: PushMessage,
    pub email: EmailContent,
}

impl RenderedNotification {
    pub fn push_for(&self, platform: DevicePlatform) -> &PushMessage {
        match platform {
            DevicePlatform::Ios => &self.ios,
            DevicePlatform::Android => &self.android,
            DevicePlatform::Web => &self.web,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelRenderer;

impl ChannelRenderer {
    pub fn render(&self, event: &NotificationEvent) -> Result<RenderedNotification, RenderError> {
        let data = stringify_data(&event.data)?;
        let default = format!("{}: {}", event.title, event.body);

        let ios = PushMessage {
            platform: DevicePlatform::Ios,
            default: default.clone(),
            payload: json!({
                "aps": {
                    "alert": { "title": event.title, "body": event.body },
                    "sound": "default",
                    "content-available": 1,
                    "mutable-content": 1,
                },
                "data": data,
            }),
        };

        let fcm = |platform: DevicePlatform| PushMessage {
            platform,
            default: default.clone(),
            payload: json!({
                "notification": { "title": event.title, "body": event.body },
                "data": data,
                "priority": "high",
            }),
        };

        Ok(RenderedNotification {
            ios,
            android: fcm(DevicePlatform::Android),
            web: fcm(DevicePlatform::Web),
            email: render_email(event),
        })
    }
}

/// Push data maps only carry strings; nested or null values are malformed.
fn stringify_data(data: &Map<String, Value>) -> Result<BTreeMap<String, String>, RenderError> {
    data.iter()
        .map(|(key, value)| {
            let s = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null | Value::Array(_) | Value::Object(_) => {
                    return Err(RenderError::NonScalarData(key.clone()))
                }
            };
            Ok((key.clone(), s))
        })
        .collect()
}

fn render_email(event: &NotificationEvent) -> EmailContent {
    let lang = i18n::resolve_language(event.user.lang.as_deref());
    let greeting = i18n::tr(
        Some(lang),
        "email.greeting",
        Some(&[("name", &event.user.display_name)]),
    );

    let (accent, badge, detail, cta) = match &event.details {
        EventDetails::TaskDue { task_count, .. } => (
            "#2f855a",
            task_count.to_string(),
            None,
            i18n::tr(Some(lang), "email.task_due.cta", None),
        ),
        EventDetails::TaskOverdue { overdue_count, .. } => (
            "#c05621",
            overdue_count.to_string(),
            None,
            i18n::tr(Some(lang), "email.task_overdue.cta", None),
        ),
        EventDetails::Harvest {
            crop_name,
            expected_harvest_date,
            ..
        } => {
            let date = expected_harvest_date.to_string();
            (
                "#b7791f",
                crop_name.clone(),
                Some(i18n::tr(
                    Some(lang),
                    "email.harvest.expected",
                    Some(&[("date", &date)]),
                )),
                i18n::tr(Some(lang), "email.harvest.cta", None),
            )
        }
    };

    let detail_html = detail
        .as_deref()
        .map(|d| format!(r#"<p style="color:#4a5568;margin:8px 0 0">{}</p>"#, escape_html(d)))
        .unwrap_or_default();

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="{lang}">
<body style="font-family:Helvetica,Arial,sans-serif;background:#f7fafc;padding:24px">
  <div style="max-width:480px;margin:0 auto;background:#ffffff;border-radius:8px;border-top:4px solid {accent};padding:24px">
    <p style="color:#718096;margin:0 0 16px">{greeting}</p>
    <span style="display:inline-block;background:{accent};color:#ffffff;border-radius:12px;padding:2px 10px;font-size:13px">{badge}</span>
    <h2 style="color:#1a202c;margin:12px 0 8px">{title}</h2>
    <p style="color:#2d3748;margin:0">{body}</p>
    {detail}
    <p style="margin:24px 0 0;color:{accent};font-weight:bold">{cta}</p>
  </div>
  <p style="max-width:480px;margin:16px auto 0;color:#a0aec0;font-size:12px">{footer}</p>
</body>
</html>"#,
        lang = lang,
        accent = accent,
        greeting = escape_html(&greeting),
        badge = escape_html(&badge),
        title = escape_html(&event.title),
        body = escape_html(&event.body),
        detail = detail_html,
        cta = escape_html(&cta),
        footer = escape_html(&i18n::tr(Some(lang), "email.footer", None)),
    );

    EmailContent {
        subject: event.title.clone(),
        html,
        text: format!("{}\n\n{}", event.title, event.body),
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
