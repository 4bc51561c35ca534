use chrono::NaiveDate;

use crate::db::{OwnedCrop, OwnedTask, User};
use crate::i18n;
use crate::services::events::{EventDetails, NotificationEvent};
use crate::services::scanner::ScanResult;

/// Turns scan rows into per-user events with localized copy.
pub struct EventGenerator {
    overdue_threshold: usize,
}

impl EventGenerator {
    pub fn new(overdue_threshold: usize) -> Self {
        Self { overdue_threshold }
    }

    /// Overdue alerts first, then due-today reminders, then harvest reminders.
    pub fn generate(&self, scan: &ScanResult, today: NaiveDate) -> Vec<NotificationEvent> {
        let mut events = Vec::new();
        events.extend(self.overdue_alerts(&scan.overdue_tasks));
        events.extend(self.due_today_reminders(&scan.due_today_tasks));
        events.extend(self.harvest_reminders(&scan.upcoming_harvests, today));
        events
    }

    fn overdue_alerts(&self, tasks: &[OwnedTask]) -> Vec<NotificationEvent> {
        group_by_owner(tasks)
            .into_iter()
            .filter(|group| group.len() >= self.overdue_threshold)
            .filter_map(|group| {
                let owner = &group.first()?.owner;
                let oldest_due_date = group.iter().map(|t| t.task.due_date).min()?;
                let lang = i18n::resolve_language(owner.lang.as_deref());
                let count = group.len().to_string();
                let date = oldest_due_date.to_string();

                Some(NotificationEvent::new(
                    owner.clone(),
                    i18n::tr(Some(lang), "notifications.task_overdue.title", None),
                    i18n::tr(
                        Some(lang),
                        "notifications.task_overdue.body",
                        Some(&[("count", &count), ("date", &date)]),
                    ),
                    EventDetails::TaskOverdue {
                        overdue_count: group.len(),
                        oldest_due_date,
                    },
                ))
            })
            .collect()
    }

    fn due_today_reminders(&self, tasks: &[OwnedTask]) -> Vec<NotificationEvent> {
        group_by_owner(tasks)
            .into_iter()
            .filter_map(|group| {
                // Rows arrive most urgent first, so the head names the reminder.
                let first = group.first()?;
                let lang = i18n::resolve_language(first.owner.lang.as_deref());
                let body = if group.len() == 1 {
                    i18n::tr(
                        Some(lang),
                        "notifications.task_due.body_single",
                        Some(&[("title", &first.task.title)]),
                    )
                } else {
                    let others = (group.len() - 1).to_string();
                    i18n::tr(
                        Some(lang),
                        "notifications.task_due.body_multiple",
                        Some(&[("title", &first.task.title), ("others", &others)]),
                    )
                };

                Some(NotificationEvent::new(
                    first.owner.clone(),
                    i18n::tr(Some(lang), "notifications.task_due.title", None),
                    body,
                    EventDetails::TaskDue {
                        task_count: group.len(),
                        first_task_id: first.task.id.clone(),
                        first_task_title: first.task.title.clone(),
                    },
                ))
            })
            .collect()
    }

    fn harvest_reminders(&self, crops: &[OwnedCrop], today: NaiveDate) -> Vec<NotificationEvent> {
        crops
            .iter()
            .filter_map(|owned| {
                let expected = owned.crop.expected_harvest_date?;
                let days = (expected - today).num_days();
                Some(harvest_event(&owned.owner, &owned.crop.id, &owned.crop.name, expected, days))
            })
            .collect()
    }
}

fn harvest_event(
    owner: &User,
    crop_id: &str,
    crop_name: &str,
    expected_harvest_date: NaiveDate,
    days_until_harvest: i64,
) -> NotificationEvent {
    let lang = i18n::resolve_language(owner.lang.as_deref());
    let days = days_until_harvest.to_string();
    let body = match days_until_harvest {
        0 => i18n::tr(
            Some(lang),
            "notifications.harvest.body_today",
            Some(&[("crop", crop_name)]),
        ),
        1 => i18n::tr(
            Some(lang),
            "notifications.harvest.body_tomorrow",
            Some(&[("crop", crop_name)]),
        ),
        _ => i18n::tr(
            Some(lang),
            "notifications.harvest.body_days",
            Some(&[("crop", crop_name), ("days", &days)]),
        ),
    };

    NotificationEvent::new(
        owner.clone(),
        i18n::tr(Some(lang), "notifications.harvest.title", None),
        body,
        EventDetails::Harvest {
            crop_id: crop_id.to_string(),
            crop_name: crop_name.to_string(),
            days_until_harvest,
            expected_harvest_date,
        },
    )
}

/// Split owner-ordered rows into consecutive per-owner runs.
fn group_by_owner(tasks: &[OwnedTask]) -> Vec<&[OwnedTask]> {
    tasks
        .chunk_by(|a, b| a.task.user_id == b.task.user_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::events::NotificationType;
    use crate::services::testing::{day, owned_crop, owned_task, user};

    #[test]
    fn overdue_alert_needs_threshold_tasks() {
        let generator = EventGenerator::new(3);
        let alice = user("alice");
        let today = day(2025, 5, 10);

        let two = ScanResult {
            overdue_tasks: vec![
                owned_task(&alice, "a", 1, day(2025, 5, 1)),
                owned_task(&alice, "b", 1, day(2025, 5, 2)),
            ],
            ..Default::default()
        };
        assert!(generator.generate(&two, today).is_empty());

        let mut three = two.clone();
        three
            .overdue_tasks
            .push(owned_task(&alice, "c", 1, day(2025, 4, 20)));
        let events = generator.generate(&three, today);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].notification_type(), NotificationType::TaskOverdueAlert);
        assert_eq!(
            events[0].details,
            EventDetails::TaskOverdue {
                overdue_count: 3,
                oldest_due_date: day(2025, 4, 20),
            }
        );
        assert!(events[0].body.contains('3'));
    }

    #[test]
    fn one_due_today_reminder_per_user() {
        let generator = EventGenerator::new(3);
        let alice = user("alice");
        let bob = user("bob");
        let today = day(2025, 5, 10);
        let scan = ScanResult {
            due_today_tasks: vec![
                owned_task(&alice, "Harvest lettuce", 5, today),
                owned_task(&alice, "Turn compost", 1, today),
                owned_task(&bob, "Stake beans", 2, today),
            ],
            ..Default::default()
        };

        let events = generator.generate(&scan, today);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].user_id(), "alice");
        assert_eq!(
            events[0].body,
            "Harvest lettuce and 1 more tasks are due today."
        );
        assert_eq!(events[0].data["taskCount"], 2);
        assert_eq!(events[1].user_id(), "bob");
        assert_eq!(events[1].body, "Stake beans is due today.");
    }

    #[test]
    fn harvest_reminder_per_crop_with_days_until() {
        let generator = EventGenerator::new(3);
        let mut alice = user("alice");
        alice.lang = Some("ru".to_string());
        let today = day(2025, 5, 10);
        let scan = ScanResult {
            upcoming_harvests: vec![
                owned_crop(&alice, "Томаты", Some(day(2025, 5, 13))),
                owned_crop(&alice, "Редис", Some(today)),
            ],
            ..Default::default()
        };

        let events = generator.generate(&scan, today);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data["daysUntilHarvest"], 3);
        assert_eq!(events[0].title, "Скоро урожай");
        assert!(events[0].body.contains("Томаты"));
        assert_eq!(events[1].data["daysUntilHarvest"], 0);
    }

    #[test]
    fn events_are_ordered_by_category() {
        let generator = EventGenerator::new(1);
        let alice = user("alice");
        let today = day(2025, 5, 10);
        let scan = ScanResult {
            overdue_tasks: vec![owned_task(&alice, "late", 1, day(2025, 5, 1))],
            due_today_tasks: vec![owned_task(&alice, "now", 1, today)],
            upcoming_harvests: vec![owned_crop(&alice, "Kale", Some(day(2025, 5, 12)))],
        };

        let kinds: Vec<_> = generator
            .generate(&scan, today)
            .iter()
            .map(|e| e.notification_type())
            .collect();
        assert_eq!(
            kinds,
            vec![
                NotificationType::TaskOverdueAlert,
                NotificationType::TaskDueReminder,
                NotificationType::HarvestReminder,
            ]
        );
    }
}
