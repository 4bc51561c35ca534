use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::NotificationConfig;
use crate::services::aggregator::{ProcessingResult, ResultAggregator};
use crate::services::clock::{Clock, Sleeper};
use crate::services::dedup::{DedupDecision, DeduplicationGate};
use crate::services::dispatcher::DeliveryDispatcher;
use crate::services::email::EmailProvider;
use crate::services::events::NotificationEvent;
use crate::services::generator::EventGenerator;
use crate::services::push::PushProvider;
use crate::services::recorder::DeliveryLogRecorder;
use crate::services::render::ChannelRenderer;
use crate::services::retry::{RetryExecutor, RetryPolicy};
use crate::services::scanner::{ScanError, TimeWindowScanner};
use crate::services::settings::{SettingsDecision, SettingsFilter};
use crate::services::stores::{
    CropStore, DeviceTokenStore, NotificationLogStore, NotificationSettingsStore, TaskStore,
    UserStore,
};

/// Storage collaborators of the pipeline.
#[derive(Clone)]
pub struct PipelineStores {
    pub users: Arc<dyn UserStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub crops: Arc<dyn CropStore>,
    pub tokens: Arc<dyn DeviceTokenStore>,
    pub settings: Arc<dyn NotificationSettingsStore>,
    pub logs: Arc<dyn NotificationLogStore>,
}

impl PipelineStores {
    /// Every seam served by one backing store.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: UserStore
            + TaskStore
            + CropStore
            + DeviceTokenStore
            + NotificationSettingsStore
            + NotificationLogStore,
    {
        Self {
            users: store.clone(),
            tasks: store.clone(),
            crops: store.clone(),
            tokens: store.clone(),
            settings: store.clone(),
            logs: store,
        }
    }
}

/// Delivery providers; a `None` channel is never attempted.
#[derive(Clone, Default)]
pub struct Providers {
    pub push: Option<Arc<dyn PushProvider>>,
    pub email: Option<Arc<dyn EmailProvider>>,
}

enum EventFlow {
    Continue,
    Cancelled,
}

/// Scan, generate, dedup, filter, render, dispatch, record, aggregate.
pub struct NotificationPipeline {
    scanner: TimeWindowScanner,
    generator: EventGenerator,
    dedup: DeduplicationGate,
    settings: SettingsFilter,
    renderer: ChannelRenderer,
    dispatcher: DeliveryDispatcher,
    recorder: DeliveryLogRecorder,
    clock: Arc<dyn Clock>,
}

impl NotificationPipeline {
    pub fn new(
        stores: PipelineStores,
        providers: Providers,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
        config: &NotificationConfig,
    ) -> Self {
        let retry = RetryExecutor::new(
            RetryPolicy {
                max_retries: config.max_retries,
                initial_backoff: config.initial_backoff(),
            },
            sleeper,
        );

        Self {
            scanner: TimeWindowScanner::new(
                stores.tasks,
                stores.crops,
                config.harvest_days_ahead,
            ),
            generator: EventGenerator::new(config.overdue_threshold),
            dedup: DeduplicationGate::new(
                stores.logs.clone(),
                Duration::hours(config.dedup_ttl_hours),
                Duration::seconds(config.pending_lease_seconds),
            ),
            settings: SettingsFilter::new(stores.settings),
            renderer: ChannelRenderer,
            dispatcher: DeliveryDispatcher::new(
                providers.push,
                providers.email,
                stores.users,
                stores.tokens,
                retry,
            ),
            recorder: DeliveryLogRecorder::new(stores.logs),
            clock,
        }
    }

    /// One full pass over today's due work.
    ///
    /// Only a scan failure aborts the run. Once `cancel` fires, no further
    /// events are started and the partial summary is returned.
    pub async fn run_scheduled_processing(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ProcessingResult, ScanError> {
        let started_at = self.clock.now();
        let today = started_at.date_naive();
        tracing::info!("Starting scheduled notification processing for {}", today);

        let scan = self.scanner.scan(today).await?;
        let events = self.generator.generate(&scan, today);
        tracing::debug!("Generated {} notification events", events.len());

        let result = self.process_events(&events, started_at, cancel).await;
        tracing::info!(
            "Notification processing finished: total={} sent={} failed={} skipped={} deduplicated={}{}",
            result.total_events,
            result.successful_sends,
            result.failed_sends,
            result.skipped_sends,
            result.deduplicated_count,
            if result.cancelled { " (cancelled)" } else { "" }
        );
        Ok(result)
    }

    /// Events are handled one at a time; a failed event never stops the ones after it.
    async fn process_events(
        &self,
        events: &[NotificationEvent],
        started_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> ProcessingResult {
        let today = started_at.date_naive();
        let mut aggregator = ResultAggregator::new(started_at);
        for event in events {
            if cancel.is_cancelled() {
                aggregator.cancelled();
                break;
            }
            if let EventFlow::Cancelled = self
                .process_event(event, today, &mut aggregator, cancel)
                .await
            {
                aggregator.cancelled();
                break;
            }
        }
        aggregator.finish()
    }

    async fn process_event(
        &self,
        event: &NotificationEvent,
        today: NaiveDate,
        aggregator: &mut ResultAggregator,
        cancel: &CancellationToken,
    ) -> EventFlow {
        let reservation = match self.dedup.check(event, today, self.clock.now()).await {
            Ok(DedupDecision::Reserved(row)) => row,
            Ok(DedupDecision::Duplicate) => {
                aggregator.deduplicated();
                return EventFlow::Continue;
            }
            Err(e) => {
                aggregator.failure(event, &format!("dedup check failed: {}", e));
                return EventFlow::Continue;
            }
        };

        let permissions = match self.settings.evaluate(event).await {
            Ok(SettingsDecision::Deliver(permissions)) => permissions,
            Ok(SettingsDecision::Skip(reason)) => {
                tracing::debug!(
                    "Skipping {} for user {}: {}",
                    event.notification_type(),
                    event.user_id(),
                    reason.as_str()
                );
                self.dedup.release(&reservation).await;
                aggregator.skipped();
                return EventFlow::Continue;
            }
            Err(e) => {
                self.dedup.release(&reservation).await;
                aggregator.failure(event, &format!("failed to load notification settings: {}", e));
                return EventFlow::Continue;
            }
        };

        let rendered = match self.renderer.render(event) {
            Ok(rendered) => rendered,
            Err(e) => {
                let error = format!("render failed: {}", e);
                self.recorder.record_failure(&reservation, &error).await;
                aggregator.failure(event, &error);
                return EventFlow::Continue;
            }
        };

        let outcome = self
            .dispatcher
            .dispatch(event, &rendered, permissions, cancel)
            .await;
        self.recorder
            .record_dispatch(&reservation, &outcome, self.clock.now())
            .await;

        if outcome.cancelled {
            return EventFlow::Cancelled;
        }

        if outcome.is_success() {
            aggregator.success(event, outcome.error_summary());
        } else {
            let error = outcome
                .error_summary()
                .unwrap_or_else(|| "no channel delivered".to_string());
            aggregator.failure(event, &error);
        }
        EventFlow::Continue
    }
}
