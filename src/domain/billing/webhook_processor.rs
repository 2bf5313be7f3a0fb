//! Idempotent webhook event processing.
//!
//! Stripe delivers webhooks at-least-once, so the same event can arrive
//! twice: after a network timeout, after we return a 5xx, or when our 200
//! response is lost in transit. Concurrent deliveries of the same event can
//! even race within milliseconds.
//!
//! The processor reserves the event id BEFORE dispatching any side effect,
//! then settles the reservation with the outcome:
//!
//! 1. begin() the event id (atomic check-and-reserve)
//! 2. Already settled -> return AlreadyProcessed without touching state
//! 3. Reservation held elsewhere -> surface EventInFlight (caller returns 5xx,
//!    Stripe redelivers after the holder settles)
//! 4. Fresh -> dispatch to the registered handler
//! 5. complete() with succeeded/ignored/parked, or release() on failure so
//!    the next delivery reclaims the event
//!
//! Billing effects behind this processor (credit grants, subscription
//! transitions) must therefore run at most once per event id, no matter how
//! many times Stripe retries.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::billing::{StripeEvent, StripeEventType, WebhookError};
use crate::domain::foundation::DomainError;
use crate::ports::{
    BeginOutcome, ProcessingOutcome, WebhookEventRepository, WebhookResult,
};

/// Handler for a specific set of webhook event types.
#[async_trait]
pub trait WebhookEventHandler: Send + Sync {
    /// Event types this handler processes.
    fn handles(&self) -> Vec<StripeEventType>;

    /// Apply the event's billing effects.
    ///
    /// Implementations signal expected conditions through the error type:
    /// `Ignored` for events that need no action, `UnknownSubscription` when
    /// the referenced subscription has no local record yet.
    async fn handle(&self, event: &StripeEvent) -> Result<(), WebhookError>;
}

/// Routes events to their registered handler.
#[async_trait]
pub trait WebhookDispatcher: Send + Sync {
    /// Look up the handler for an event type.
    fn get_handler(&self, event_type: &StripeEventType) -> Option<&dyn WebhookEventHandler>;

    /// Dispatch an event to its handler.
    async fn dispatch(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        match self.get_handler(&event.parsed_type()) {
            Some(handler) => handler.handle(event).await,
            None => Err(WebhookError::Ignored(format!(
                "no handler for event type: {}",
                event.event_type
            ))),
        }
    }
}

/// Webhook processor that guarantees at-most-once effect application.
pub struct IdempotentWebhookProcessor {
    repository: Arc<dyn WebhookEventRepository>,
    dispatcher: Arc<dyn WebhookDispatcher>,
}

impl IdempotentWebhookProcessor {
    pub fn new(
        repository: Arc<dyn WebhookEventRepository>,
        dispatcher: Arc<dyn WebhookDispatcher>,
    ) -> Self {
        Self {
            repository,
            dispatcher,
        }
    }

    /// Process a verified webhook event exactly once.
    pub async fn process(&self, event: &StripeEvent) -> Result<WebhookResult, WebhookError> {
        let payload = serde_json::to_value(event)
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;

        match self
            .repository
            .begin(&event.id, &event.event_type, payload)
            .await?
        {
            BeginOutcome::AlreadyProcessed(_) => return Ok(WebhookResult::AlreadyProcessed),
            BeginOutcome::InProgress => return Err(WebhookError::EventInFlight),
            BeginOutcome::Fresh => {}
        }

        match self.dispatcher.dispatch(event).await {
            Ok(()) => {
                self.repository
                    .complete(&event.id, ProcessingOutcome::Succeeded)
                    .await?;
                Ok(WebhookResult::Processed)
            }
            Err(WebhookError::Ignored(reason)) => {
                self.repository
                    .complete(&event.id, ProcessingOutcome::Ignored(reason))
                    .await?;
                Ok(WebhookResult::Processed)
            }
            Err(WebhookError::UnknownSubscription(remote_id)) => {
                let reason = format!("unknown subscription: {}", remote_id);
                self.repository
                    .complete(&event.id, ProcessingOutcome::Parked(reason))
                    .await?;
                Ok(WebhookResult::Parked)
            }
            Err(error) => {
                self.repository
                    .release(&event.id, &error.to_string())
                    .await?;
                Err(error)
            }
        }
    }
}

impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        WebhookError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::StripeEventData;
    use crate::ports::{WebhookEventRecord, WebhookEventStatus};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::RwLock;

    fn test_event(id: &str, event_type: &str) -> StripeEvent {
        StripeEvent {
            id: id.to_string(),
            event_type: event_type.to_string(),
            created: 1700000000,
            data: StripeEventData {
                object: serde_json::json!({"id": "obj_123"}),
                previous_attributes: None,
            },
            livemode: false,
            api_version: "2023-10-16".to_string(),
        }
    }

    struct MockWebhookRepository {
        records: RwLock<HashMap<String, WebhookEventRecord>>,
    }

    impl MockWebhookRepository {
        fn new() -> Self {
            Self {
                records: RwLock::new(HashMap::new()),
            }
        }

        async fn status_of(&self, event_id: &str) -> Option<WebhookEventStatus> {
            self.records.read().await.get(event_id).map(|r| r.status)
        }
    }

    #[async_trait]
    impl WebhookEventRepository for MockWebhookRepository {
        async fn begin(
            &self,
            event_id: &str,
            event_type: &str,
            payload: serde_json::Value,
        ) -> Result<BeginOutcome, DomainError> {
            let mut records = self.records.write().await;
            match records.get_mut(event_id) {
                None => {
                    records.insert(
                        event_id.to_string(),
                        WebhookEventRecord::processing(event_id, event_type, payload),
                    );
                    Ok(BeginOutcome::Fresh)
                }
                Some(record) if record.status == WebhookEventStatus::Processing => {
                    Ok(BeginOutcome::InProgress)
                }
                Some(record) if record.status.is_settled() => {
                    Ok(BeginOutcome::AlreadyProcessed(record.clone()))
                }
                Some(record) => {
                    record.reclaim();
                    Ok(BeginOutcome::Fresh)
                }
            }
        }

        async fn complete(
            &self,
            event_id: &str,
            outcome: ProcessingOutcome,
        ) -> Result<(), DomainError> {
            let mut records = self.records.write().await;
            if let Some(record) = records.get_mut(event_id) {
                record.settle(&outcome);
            }
            Ok(())
        }

        async fn release(&self, event_id: &str, error: &str) -> Result<(), DomainError> {
            let mut records = self.records.write().await;
            if let Some(record) = records.get_mut(event_id) {
                record.fail(error);
            }
            Ok(())
        }

        async fn find_by_event_id(
            &self,
            event_id: &str,
        ) -> Result<Option<WebhookEventRecord>, DomainError> {
            let records = self.records.read().await;
            Ok(records.get(event_id).cloned())
        }

        async fn list_parked(
            &self,
            limit: u32,
        ) -> Result<Vec<WebhookEventRecord>, DomainError> {
            let records = self.records.read().await;
            let mut parked: Vec<_> = records
                .values()
                .filter(|r| r.status == WebhookEventStatus::Parked)
                .cloned()
                .collect();
            parked.truncate(limit as usize);
            Ok(parked)
        }

        async fn delete_before(
            &self,
            _timestamp: chrono::DateTime<chrono::Utc>,
        ) -> Result<u64, DomainError> {
            Ok(0)
        }
    }

    struct MockHandler {
        handles_types: Vec<StripeEventType>,
        call_count: AtomicU32,
        should_fail: bool,
        should_ignore: bool,
        park_subscription: Option<String>,
    }

    impl MockHandler {
        fn new(handles_types: Vec<StripeEventType>) -> Self {
            Self {
                handles_types,
                call_count: AtomicU32::new(0),
                should_fail: false,
                should_ignore: false,
                park_subscription: None,
            }
        }

        fn failing(handles_types: Vec<StripeEventType>) -> Self {
            Self {
                should_fail: true,
                ..Self::new(handles_types)
            }
        }

        fn ignoring(handles_types: Vec<StripeEventType>) -> Self {
            Self {
                should_ignore: true,
                ..Self::new(handles_types)
            }
        }

        fn parking(handles_types: Vec<StripeEventType>, remote_id: &str) -> Self {
            Self {
                park_subscription: Some(remote_id.to_string()),
                ..Self::new(handles_types)
            }
        }

        fn calls(&self) -> u32 {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WebhookEventHandler for MockHandler {
        fn handles(&self) -> Vec<StripeEventType> {
            self.handles_types.clone()
        }

        async fn handle(&self, _event: &StripeEvent) -> Result<(), WebhookError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if self.should_fail {
                return Err(WebhookError::Database("simulated failure".to_string()));
            }
            if self.should_ignore {
                return Err(WebhookError::Ignored("nothing to do".to_string()));
            }
            if let Some(remote_id) = &self.park_subscription {
                return Err(WebhookError::UnknownSubscription(remote_id.clone()));
            }
            Ok(())
        }
    }

    struct SingleHandlerDispatcher {
        handler: MockHandler,
    }

    impl SingleHandlerDispatcher {
        fn new(handler: MockHandler) -> Arc<Self> {
            Arc::new(Self { handler })
        }
    }

    #[async_trait]
    impl WebhookDispatcher for SingleHandlerDispatcher {
        fn get_handler(&self, event_type: &StripeEventType) -> Option<&dyn WebhookEventHandler> {
            if self.handler.handles().contains(event_type) {
                Some(&self.handler)
            } else {
                None
            }
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Dispatcher Tests
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn dispatch_routes_to_matching_handler() {
        let dispatcher = SingleHandlerDispatcher::new(MockHandler::new(vec![
            StripeEventType::InvoicePaymentSucceeded,
        ]));
        let event = test_event("evt_1", "invoice.payment_succeeded");

        let result = dispatcher.dispatch(&event).await;

        assert!(result.is_ok());
        assert_eq!(dispatcher.handler.calls(), 1);
    }

    #[tokio::test]
    async fn dispatch_without_handler_returns_ignored() {
        let dispatcher = SingleHandlerDispatcher::new(MockHandler::new(vec![
            StripeEventType::InvoicePaymentSucceeded,
        ]));
        let event = test_event("evt_2", "customer.subscription.updated");

        let result = dispatcher.dispatch(&event).await;

        assert!(matches!(result, Err(WebhookError::Ignored(_))));
        assert_eq!(dispatcher.handler.calls(), 0);
    }

    // ══════════════════════════════════════════════════════════════
    // IdempotentWebhookProcessor Tests
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn fresh_event_is_dispatched_and_settled() {
        let repo = Arc::new(MockWebhookRepository::new());
        let dispatcher = SingleHandlerDispatcher::new(MockHandler::new(vec![
            StripeEventType::CheckoutSessionCompleted,
        ]));
        let processor = IdempotentWebhookProcessor::new(repo.clone(), dispatcher.clone());
        let event = test_event("evt_fresh", "checkout.session.completed");

        let result = processor.process(&event).await.unwrap();

        assert_eq!(result, WebhookResult::Processed);
        assert_eq!(dispatcher.handler.calls(), 1);
        assert_eq!(
            repo.status_of("evt_fresh").await,
            Some(WebhookEventStatus::Succeeded)
        );
    }

    #[tokio::test]
    async fn duplicate_event_short_circuits_before_dispatch() {
        let repo = Arc::new(MockWebhookRepository::new());
        let dispatcher = SingleHandlerDispatcher::new(MockHandler::new(vec![
            StripeEventType::CheckoutSessionCompleted,
        ]));
        let processor = IdempotentWebhookProcessor::new(repo.clone(), dispatcher.clone());
        let event = test_event("evt_dup", "checkout.session.completed");

        let first = processor.process(&event).await.unwrap();
        let second = processor.process(&event).await.unwrap();

        assert_eq!(first, WebhookResult::Processed);
        assert_eq!(second, WebhookResult::AlreadyProcessed);
        assert_eq!(dispatcher.handler.calls(), 1);
    }

    #[tokio::test]
    async fn in_flight_event_is_not_dispatched_again() {
        let repo = Arc::new(MockWebhookRepository::new());
        let dispatcher = SingleHandlerDispatcher::new(MockHandler::new(vec![
            StripeEventType::CheckoutSessionCompleted,
        ]));
        let processor = IdempotentWebhookProcessor::new(repo.clone(), dispatcher.clone());
        let event = test_event("evt_inflight", "checkout.session.completed");

        // Another worker holds the reservation.
        repo.begin(&event.id, &event.event_type, serde_json::json!({}))
            .await
            .unwrap();

        let result = processor.process(&event).await;

        assert!(matches!(result, Err(WebhookError::EventInFlight)));
        assert_eq!(dispatcher.handler.calls(), 0);
    }

    #[tokio::test]
    async fn ignored_event_settles_with_reason() {
        let repo = Arc::new(MockWebhookRepository::new());
        let dispatcher = SingleHandlerDispatcher::new(MockHandler::ignoring(vec![
            StripeEventType::CustomerSubscriptionUpdated,
        ]));
        let processor = IdempotentWebhookProcessor::new(repo.clone(), dispatcher);
        let event = test_event("evt_ignored", "customer.subscription.updated");

        let result = processor.process(&event).await.unwrap();

        assert_eq!(result, WebhookResult::Processed);
        let record = repo.find_by_event_id("evt_ignored").await.unwrap().unwrap();
        assert_eq!(record.status, WebhookEventStatus::Ignored);
        assert_eq!(record.last_error, Some("nothing to do".to_string()));
    }

    #[tokio::test]
    async fn unhandled_event_type_is_recorded_as_ignored() {
        let repo = Arc::new(MockWebhookRepository::new());
        let dispatcher = SingleHandlerDispatcher::new(MockHandler::new(vec![
            StripeEventType::CheckoutSessionCompleted,
        ]));
        let processor = IdempotentWebhookProcessor::new(repo.clone(), dispatcher.clone());
        let event = test_event("evt_unhandled", "invoice.payment_failed");

        let result = processor.process(&event).await.unwrap();

        assert_eq!(result, WebhookResult::Processed);
        assert_eq!(dispatcher.handler.calls(), 0);
        assert_eq!(
            repo.status_of("evt_unhandled").await,
            Some(WebhookEventStatus::Ignored)
        );
    }

    #[tokio::test]
    async fn unknown_subscription_parks_the_event() {
        let repo = Arc::new(MockWebhookRepository::new());
        let dispatcher = SingleHandlerDispatcher::new(MockHandler::parking(
            vec![StripeEventType::CustomerSubscriptionUpdated],
            "sub_unseen",
        ));
        let processor = IdempotentWebhookProcessor::new(repo.clone(), dispatcher);
        let event = test_event("evt_parked", "customer.subscription.updated");

        let result = processor.process(&event).await.unwrap();

        assert_eq!(result, WebhookResult::Parked);
        let record = repo.find_by_event_id("evt_parked").await.unwrap().unwrap();
        assert_eq!(record.status, WebhookEventStatus::Parked);
        assert!(record.last_error.unwrap().contains("sub_unseen"));
    }

    #[tokio::test]
    async fn handler_failure_releases_the_reservation() {
        let repo = Arc::new(MockWebhookRepository::new());
        let dispatcher = SingleHandlerDispatcher::new(MockHandler::failing(vec![
            StripeEventType::InvoicePaymentSucceeded,
        ]));
        let processor = IdempotentWebhookProcessor::new(repo.clone(), dispatcher);
        let event = test_event("evt_failed", "invoice.payment_succeeded");

        let result = processor.process(&event).await;

        assert!(matches!(result, Err(WebhookError::Database(_))));
        let record = repo.find_by_event_id("evt_failed").await.unwrap().unwrap();
        assert_eq!(record.status, WebhookEventStatus::Failed);
        assert_eq!(record.last_error, Some("simulated failure".to_string()));
    }

    #[tokio::test]
    async fn redelivery_reclaims_failed_event() {
        let repo = Arc::new(MockWebhookRepository::new());
        let event = test_event("evt_retry", "invoice.payment_succeeded");

        let failing = IdempotentWebhookProcessor::new(
            repo.clone(),
            SingleHandlerDispatcher::new(MockHandler::failing(vec![
                StripeEventType::InvoicePaymentSucceeded,
            ])),
        );
        assert!(failing.process(&event).await.is_err());

        let working = IdempotentWebhookProcessor::new(
            repo.clone(),
            SingleHandlerDispatcher::new(MockHandler::new(vec![
                StripeEventType::InvoicePaymentSucceeded,
            ])),
        );
        let result = working.process(&event).await.unwrap();

        assert_eq!(result, WebhookResult::Processed);
        let record = repo.find_by_event_id("evt_retry").await.unwrap().unwrap();
        assert_eq!(record.status, WebhookEventStatus::Succeeded);
        assert_eq!(record.attempts, 2);
    }

    #[tokio::test]
    async fn parked_event_processes_once_state_arrives() {
        let repo = Arc::new(MockWebhookRepository::new());
        let event = test_event("evt_catchup", "customer.subscription.updated");

        let parking = IdempotentWebhookProcessor::new(
            repo.clone(),
            SingleHandlerDispatcher::new(MockHandler::parking(
                vec![StripeEventType::CustomerSubscriptionUpdated],
                "sub_late",
            )),
        );
        assert_eq!(
            parking.process(&event).await.unwrap(),
            WebhookResult::Parked
        );

        // The subscription record has since been created; replay succeeds.
        let working = IdempotentWebhookProcessor::new(
            repo.clone(),
            SingleHandlerDispatcher::new(MockHandler::new(vec![
                StripeEventType::CustomerSubscriptionUpdated,
            ])),
        );
        let result = working.process(&event).await.unwrap();

        assert_eq!(result, WebhookResult::Processed);
        assert_eq!(
            repo.status_of("evt_catchup").await,
            Some(WebhookEventStatus::Succeeded)
        );
    }
}
