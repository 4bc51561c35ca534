//! Localized notification copy (embedded `en` and `ru` tables).
//!
//! Messages are looked up by dotted key and may contain `{name}` placeholders;
//! the owning user's stored language tag picks the table via `resolve_language`.

use std::collections::HashMap;
use std::sync::OnceLock;

pub const DEFAULT_LANG: &str = "en";

type Catalog = HashMap<String, String>;

static CATALOGS: OnceLock<HashMap<&'static str, Catalog>> = OnceLock::new();

const EN_JSON: &str = r#"
{
  "app.name": "Garden Planner",
  "notifications.task_due.title": "Today's garden tasks",
  "notifications.task_due.body_single": "{title} is due today.",
  "notifications.task_due.body_multiple": "{title} and {others} more tasks are due today.",
  "notifications.task_overdue.title": "Overdue garden tasks",
  "notifications.task_overdue.body": "You have {count} overdue tasks. The oldest was due on {date}.",
  "notifications.harvest.title": "Harvest time is near",
  "notifications.harvest.body_today": "{crop} is ready to harvest today.",
  "notifications.harvest.body_tomorrow": "{crop} will be ready to harvest tomorrow.",
  "notifications.harvest.body_days": "{crop} will be ready to harvest in {days} days.",
  "email.greeting": "Hi {name},",
  "email.task_due.cta": "Open today's tasks",
  "email.task_overdue.cta": "Review overdue tasks",
  "email.harvest.cta": "View crop",
  "email.harvest.expected": "Expected harvest date: {date}",
  "email.footer": "You receive these emails because garden reminders are enabled in your notification settings."
}
"#;

const RU_JSON: &str = r#"
{
  "app.name": "Планировщик сада",
  "notifications.task_due.title": "Задачи в саду на сегодня",
  "notifications.task_due.body_single": "Сегодня нужно выполнить: {title}.",
  "notifications.task_due.body_multiple": "Сегодня нужно выполнить: {title} и ещё задач: {others}.",
  "notifications.task_overdue.title": "Просроченные задачи в саду",
  "notifications.task_overdue.body": "Просроченных задач: {count}. Самая старая была запланирована на {date}.",
  "notifications.harvest.title": "Скоро урожай",
  "notifications.harvest.body_today": "{crop}: урожай можно собирать сегодня.",
  "notifications.harvest.body_tomorrow": "{crop}: урожай будет готов завтра.",
  "notifications.harvest.body_days": "{crop}: урожай будет готов через {days} дн.",
  "email.greeting": "Здравствуйте, {name}!",
  "email.task_due.cta": "Открыть задачи на сегодня",
  "email.task_overdue.cta": "Посмотреть просроченные задачи",
  "email.harvest.cta": "Открыть культуру",
  "email.harvest.expected": "Ожидаемая дата урожая: {date}",
  "email.footer": "Вы получаете это письмо, потому что в настройках уведомлений включены напоминания о саде."
}
"#;

const TABLES: &[(&str, &str)] = &[("en", EN_JSON), ("ru", RU_JSON)];

fn catalogs() -> &'static HashMap<&'static str, Catalog> {
    CATALOGS.get_or_init(|| {
        TABLES
            .iter()
            .map(|&(lang, raw)| {
                let catalog = serde_json::from_str::<Catalog>(raw).unwrap_or_else(|e| {
                    tracing::error!("Translation table '{}' is malformed: {}", lang, e);
                    Catalog::new()
                });
                (lang, catalog)
            })
            .collect()
    })
}

fn lookup(lang: &str, key: &str) -> Option<&'static str> {
    catalogs()
        .get(lang)
        .and_then(|catalog| catalog.get(key))
        .map(String::as_str)
}

/// Normalize a language tag into a short, lowercase code (e.g. "en-US" -> "en").
pub fn normalize_language(lang: &str) -> String {
    lang.split(['-', '_']).next().unwrap_or(lang).to_lowercase()
}

/// Supported language for a stored user preference, falling back to DEFAULT_LANG.
pub fn resolve_language(lang: Option<&str>) -> &'static str {
    let Some(lang) = lang else {
        return DEFAULT_LANG;
    };
    let normalized = normalize_language(lang);
    catalogs()
        .get_key_value(normalized.as_str())
        .map(|(&code, _)| code)
        .unwrap_or(DEFAULT_LANG)
}

/// Translate `key` for `lang` (DEFAULT_LANG when None), substituting `{name}` params.
///
/// Missing keys fall back to the default language, then to the key itself.
pub fn tr(lang: Option<&str>, key: &str, params: Option<&[(&str, &str)]>) -> String {
    let template = lookup(lang.unwrap_or(DEFAULT_LANG), key)
        .or_else(|| lookup(DEFAULT_LANG, key))
        .unwrap_or(key);

    params
        .unwrap_or_default()
        .iter()
        .fold(template.to_string(), |text, (name, value)| {
            text.replace(&format!("{{{}}}", name), value)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_placeholders() {
        let s = tr(
            Some("en"),
            "notifications.harvest.body_days",
            Some(&[("crop", "Tomatoes"), ("days", "3")]),
        );
        assert_eq!(s, "Tomatoes will be ready to harvest in 3 days.");
    }

    #[test]
    fn unsupported_language_uses_english() {
        let s = tr(Some("fr"), "notifications.task_overdue.title", None);
        assert_eq!(s, "Overdue garden tasks");
    }

    #[test]
    fn missing_key_returns_key() {
        let k = "non.existent.key";
        assert_eq!(tr(None, k, None), k);
    }

    #[test]
    fn every_russian_key_has_an_english_counterpart() {
        let map = catalogs();
        assert!(!map["ru"].is_empty());
        let en = &map["en"];
        for key in map["ru"].keys() {
            assert!(en.contains_key(key), "missing en key {}", key);
        }
    }

    #[test]
    fn stored_tags_resolve_to_supported_languages() {
        assert_eq!(resolve_language(Some("ru-RU")), "ru");
        assert_eq!(resolve_language(Some("EN_us")), "en");
        assert_eq!(resolve_language(Some("fr")), "en");
        assert_eq!(resolve_language(None), "en");
        assert!(catalogs().contains_key("ru"));
        assert!(!catalogs().contains_key("fr"));
    }
}
