//! Reconciler - periodic sweep that closes the gaps webhook delivery leaves.
//!
//! Webhooks are at-least-once but neither ordered nor guaranteed within any
//! bounded time, so two gaps survive the idempotent pipeline:
//!
//! 1. **Parked events**: a delivery referencing a subscription we have not
//!    stored yet is parked rather than dropped. The sweep replays parked
//!    events through the processor; once the missing row exists they settle.
//! 2. **Stale rows**: a subscription that missed its webhooks outright
//!    drifts from the provider. The sweep reads the provider's current
//!    snapshot and pushes it through the pipeline as a synthesized
//!    `customer.subscription.updated` event, so repairs travel exactly the
//!    path a delivered webhook would have taken.
//!
//! Both phases route through `IdempotentWebhookProcessor`, which keeps
//! replays and repairs deduplicated against real deliveries racing in at
//! the same moment. The sweep itself never writes a subscription row.
//!
//! ## Graceful Shutdown
//!
//! The loop exits as soon as the shutdown signal flips. Nothing needs
//! flushing: parked events and stale rows are durable, and the first sweep
//! after the next startup picks them up immediately.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;

use crate::domain::billing::{
    IdempotentWebhookProcessor, StripeEvent, StripeEventType, Subscription, WebhookError,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{
    GatewaySubscription, GatewaySubscriptionStatus, PaymentGateway, ProcessingOutcome,
    SubscriptionRepository, WebhookEventRepository, WebhookResult,
};

const SECS_PER_DAY: u64 = 86_400;

/// Configuration for the reconciler sweep.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// How often a sweep runs.
    pub sweep_interval: Duration,

    /// Rows not written within this window are re-checked against the
    /// provider. Every webhook the row absorbs refreshes it, so under
    /// normal delivery the sweep touches nothing.
    pub freshness_threshold: Duration,

    /// Maximum parked events and maximum stale rows handled per sweep.
    pub batch_size: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(300),
            freshness_threshold: Duration::from_secs(24 * 60 * 60),
            batch_size: 50,
        }
    }
}

impl ReconcilerConfig {
    /// Create config with custom sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Create config with custom freshness threshold.
    pub fn with_freshness_threshold(mut self, threshold: Duration) -> Self {
        self.freshness_threshold = threshold;
        self
    }

    /// Create config with custom batch size.
    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size;
        self
    }
}

/// Counters from one sweep, for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Parked events that settled on replay.
    pub parked_settled: usize,

    /// Parked events still waiting on local state (or on a racing worker).
    pub parked_waiting: usize,

    /// Stale rows synced against a provider snapshot.
    pub stale_refreshed: usize,

    /// Stale rows whose subscription no longer exists at the provider;
    /// their local rows were converged to canceled.
    pub remote_gone: usize,

    /// Items skipped because a dependency failed; retried next sweep.
    pub failures: usize,
}

impl ReconcileSummary {
    /// True when the sweep found nothing to do.
    pub fn is_idle(&self) -> bool {
        self.parked_settled == 0
            && self.parked_waiting == 0
            && self.stale_refreshed == 0
            && self.remote_gone == 0
            && self.failures == 0
    }
}

/// Outcome of repairing one stale row.
enum RowRepair {
    Refreshed,
    RemoteGone,
    Failed,
}

/// Background service that replays parked events and repairs drifted rows.
pub struct Reconciler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    webhook_events: Arc<dyn WebhookEventRepository>,
    processor: Arc<IdempotentWebhookProcessor>,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new Reconciler with default configuration.
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        gateway: Arc<dyn PaymentGateway>,
        webhook_events: Arc<dyn WebhookEventRepository>,
        processor: Arc<IdempotentWebhookProcessor>,
    ) -> Self {
        Self {
            subscriptions,
            gateway,
            webhook_events,
            processor,
            config: ReconcilerConfig::default(),
        }
    }

    /// Create a new Reconciler with custom configuration.
    pub fn with_config(
        subscriptions: Arc<dyn SubscriptionRepository>,
        gateway: Arc<dyn PaymentGateway>,
        webhook_events: Arc<dyn WebhookEventRepository>,
        processor: Arc<IdempotentWebhookProcessor>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            subscriptions,
            gateway,
            webhook_events,
            processor,
            config,
        }
    }

    /// Run the sweep loop until the shutdown signal flips.
    ///
    /// The first sweep runs immediately, which drains any parked backlog
    /// left over from before a restart.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.sweep_interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }

                _ = interval.tick() => {
                    self.sweep_once().await;
                }
            }
        }
    }

    /// Run one full sweep: parked replay, then drift repair.
    ///
    /// Never fails; per-item problems are counted and retried next sweep.
    /// This method is also the test seam.
    pub async fn sweep_once(&self) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        self.replay_parked(&mut summary).await;
        self.repair_stale(&mut summary).await;

        if summary.is_idle() {
            tracing::debug!("Reconcile sweep found nothing to do");
        } else {
            tracing::info!(
                parked_settled = summary.parked_settled,
                parked_waiting = summary.parked_waiting,
                stale_refreshed = summary.stale_refreshed,
                remote_gone = summary.remote_gone,
                failures = summary.failures,
                "Reconcile sweep finished"
            );
        }

        summary
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Phase 1: Parked Replay
    // ════════════════════════════════════════════════════════════════════════════

    async fn replay_parked(&self, summary: &mut ReconcileSummary) {
        let parked = match self.webhook_events.list_parked(self.config.batch_size).await {
            Ok(parked) => parked,
            Err(error) => {
                tracing::error!(error = %error, "Failed to list parked events");
                summary.failures += 1;
                return;
            }
        };

        for record in parked {
            let event: StripeEvent = match serde_json::from_value(record.payload.clone()) {
                Ok(event) => event,
                Err(error) => {
                    // A payload that never parses can never settle; retrying
                    // it each sweep would spin forever. Settle it as ignored
                    // and keep the reason on the record.
                    tracing::error!(
                        event_id = %record.event_id,
                        error = %error,
                        "Parked payload does not parse as a provider event"
                    );
                    self.settle_unparseable(&record.event_id, &error.to_string())
                        .await;
                    summary.failures += 1;
                    continue;
                }
            };

            match self.processor.process(&event).await {
                Ok(WebhookResult::Processed) | Ok(WebhookResult::AlreadyProcessed) => {
                    tracing::info!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        attempts = record.attempts,
                        "Parked event settled on replay"
                    );
                    summary.parked_settled += 1;
                }
                Ok(WebhookResult::Parked) => {
                    summary.parked_waiting += 1;
                }
                Err(WebhookError::EventInFlight) => {
                    // A live delivery raced us and holds the reservation.
                    summary.parked_waiting += 1;
                }
                Err(error) => {
                    tracing::warn!(
                        event_id = %event.id,
                        error = %error,
                        "Parked replay failed"
                    );
                    // The processor released the record as failed, and the
                    // original delivery was already acknowledged, so nothing
                    // would ever reclaim it. Park it again for the next sweep.
                    let reason = format!("replay failed: {}", error);
                    if let Err(park_error) = self
                        .webhook_events
                        .complete(&event.id, ProcessingOutcome::Parked(reason))
                        .await
                    {
                        tracing::error!(
                            event_id = %event.id,
                            error = %park_error,
                            "Failed to re-park event after replay failure"
                        );
                    }
                    summary.failures += 1;
                }
            }
        }
    }

    async fn settle_unparseable(&self, event_id: &str, error: &str) {
        let reason = format!("unparseable payload: {}", error);
        if let Err(settle_error) = self
            .webhook_events
            .complete(event_id, ProcessingOutcome::Ignored(reason))
            .await
        {
            tracing::error!(
                event_id = %event_id,
                error = %settle_error,
                "Failed to settle unparseable parked event"
            );
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Phase 2: Drift Repair
    // ════════════════════════════════════════════════════════════════════════════

    async fn repair_stale(&self, summary: &mut ReconcileSummary) {
        let cutoff = Timestamp::now().minus_secs(self.config.freshness_threshold.as_secs());
        let stale = match self
            .subscriptions
            .find_stale(cutoff, self.config.batch_size)
            .await
        {
            Ok(stale) => stale,
            Err(error) => {
                tracing::error!(error = %error, "Failed to list stale subscriptions");
                summary.failures += 1;
                return;
            }
        };

        for subscription in stale {
            match self.repair_row(&subscription).await {
                RowRepair::Refreshed => summary.stale_refreshed += 1,
                RowRepair::RemoteGone => summary.remote_gone += 1,
                RowRepair::Failed => summary.failures += 1,
            }
        }
    }

    /// Re-check one stale row against the provider and push the observed
    /// state through the webhook pipeline.
    async fn repair_row(&self, subscription: &Subscription) -> RowRepair {
        let Some(provider_id) = subscription.stripe_subscription_id.as_deref() else {
            // find_stale excludes unlinked rows; reaching here means the
            // repository broke that contract.
            tracing::warn!(
                subscription_id = %subscription.id,
                "Stale row has no provider id, skipping"
            );
            return RowRepair::Failed;
        };

        let remote = match self.gateway.fetch_subscription(provider_id).await {
            Ok(remote) => remote,
            Err(error) => {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    error = %error,
                    "Provider read failed; the row stays stale for the next sweep"
                );
                return RowRepair::Failed;
            }
        };

        let (event, repaired) = match remote {
            Some(snapshot) => {
                let object = match serde_json::to_value(&snapshot) {
                    Ok(object) => object,
                    Err(error) => {
                        tracing::error!(
                            subscription_id = %subscription.id,
                            error = %error,
                            "Failed to serialize provider snapshot"
                        );
                        return RowRepair::Failed;
                    }
                };
                let event = StripeEvent::synthetic(
                    Self::snapshot_event_id(&snapshot),
                    StripeEventType::CustomerSubscriptionUpdated,
                    object,
                );
                (event, RowRepair::Refreshed)
            }
            None => {
                // The provider has no record of this id. Whatever happened
                // remotely, nobody is billing for this row anymore; converge
                // it to canceled through the same pipeline.
                tracing::warn!(
                    subscription_id = %subscription.id,
                    provider_id = %provider_id,
                    "Provider has no such subscription; canceling the local row"
                );
                let ghost = GatewaySubscription {
                    id: provider_id.to_string(),
                    customer: subscription.stripe_customer_id.clone().unwrap_or_default(),
                    status: GatewaySubscriptionStatus::Canceled,
                    current_period_start: subscription.current_period_start.as_unix_secs() as i64,
                    current_period_end: subscription.current_period_end.as_unix_secs() as i64,
                    cancel_at_period_end: false,
                    canceled_at: Some(Timestamp::now().as_unix_secs() as i64),
                };
                let object = match serde_json::to_value(&ghost) {
                    Ok(object) => object,
                    Err(error) => {
                        tracing::error!(
                            subscription_id = %subscription.id,
                            error = %error,
                            "Failed to serialize removal snapshot"
                        );
                        return RowRepair::Failed;
                    }
                };
                let event = StripeEvent::synthetic(
                    format!("rcn_{}_gone", provider_id),
                    StripeEventType::CustomerSubscriptionDeleted,
                    object,
                );
                (event, RowRepair::RemoteGone)
            }
        };

        match self.processor.process(&event).await {
            Ok(WebhookResult::Processed) | Ok(WebhookResult::AlreadyProcessed) => repaired,
            Ok(WebhookResult::Parked) => {
                // The row existed when find_stale listed it but was gone by
                // dispatch time. The parked replay phase owns it from here.
                tracing::warn!(
                    subscription_id = %subscription.id,
                    event_id = %event.id,
                    "Repair event parked; local row disappeared mid-sweep"
                );
                RowRepair::Failed
            }
            Err(error) => {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    event_id = %event.id,
                    error = %error,
                    "Drift repair failed; the row stays stale for the next sweep"
                );
                RowRepair::Failed
            }
        }
    }

    /// Deterministic event id for an observed provider snapshot.
    ///
    /// Re-observing identical provider state maps to the same id, so a sweep
    /// that crashes and restarts deduplicates in the processor instead of
    /// reapplying. The day component lets an unchanged snapshot re-touch its
    /// row once a day rather than tripping the already-processed
    /// short-circuit on every sweep.
    fn snapshot_event_id(snapshot: &GatewaySubscription) -> String {
        let day = Timestamp::now().as_unix_secs() / SECS_PER_DAY;
        format!(
            "rcn_{}_{}_{}_{}_{}",
            snapshot.id,
            snapshot.status.as_str(),
            snapshot.current_period_end,
            u8::from(snapshot.cancel_at_period_end),
            day
        )
    }
}
