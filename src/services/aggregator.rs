use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::events::NotificationEvent;

/// Summary of one scheduled run, returned to the trigger caller.
///
/// `total_events` always equals the sum of the four outcome counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub processed_at: DateTime<Utc>,
    pub total_events: usize,
    pub successful_sends: usize,
    pub failed_sends: usize,
    pub skipped_sends: usize,
    pub deduplicated_count: usize,
    pub errors: Vec<String>,
    /// The run stopped early; counts cover completed events only.
    pub cancelled: bool,
}

pub struct ResultAggregator {
    result: ProcessingResult,
}

impl ResultAggregator {
    pub fn new(processed_at: DateTime<Utc>) -> Self {
        Self {
            result: ProcessingResult {
                processed_at,
                total_events: 0,
                successful_sends: 0,
                failed_sends: 0,
                skipped_sends: 0,
                deduplicated_count: 0,
                errors: Vec::new(),
                cancelled: false,
            },
        }
    }

    /// Sent; `partial_errors` are failures on other tokens or channels.
    pub fn success(&mut self, event: &NotificationEvent, partial_errors: Option<String>) {
        self.result.total_events += 1;
        self.result.successful_sends += 1;
        if let Some(e) = partial_errors {
            self.push_error(event, &e);
        }
    }

    pub fn failure(&mut self, event: &NotificationEvent, error: &str) {
        self.result.total_events += 1;
        self.result.failed_sends += 1;
        self.push_error(event, error);
    }

    pub fn skipped(&mut self) {
        self.result.total_events += 1;
        self.result.skipped_sends += 1;
    }

    pub fn deduplicated(&mut self) {
        self.result.total_events += 1;
        self.result.deduplicated_count += 1;
    }

    pub fn cancelled(&mut self) {
        self.result.cancelled = true;
    }

    pub fn finish(self) -> ProcessingResult {
        self.result
    }

    fn push_error(&mut self, event: &NotificationEvent, error: &str) {
        self.result.errors.push(format!(
            "{} for user {}: {}",
            event.notification_type(),
            event.user_id(),
            error
        ));
    }
}
