//! Routing table from webhook event types to their handlers.
//!
//! Handlers declare the event types they cover; registration builds the
//! lookup the idempotent processor dispatches through. Event types nobody
//! registered are settled as ignored by the processor, so adding a new
//! webhook subscription at the provider cannot fail deliveries here.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::billing::{StripeEventType, WebhookDispatcher, WebhookEventHandler};

/// Dispatcher over the registered billing webhook handlers.
pub struct BillingEventDispatcher {
    handlers: Vec<Arc<dyn WebhookEventHandler>>,
    routes: HashMap<StripeEventType, usize>,
}

impl BillingEventDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            routes: HashMap::new(),
        }
    }

    /// Register a handler for every event type it declares.
    ///
    /// Last registration wins when two handlers claim the same type; the
    /// wiring in `main` never does that on purpose.
    pub fn register(mut self, handler: Arc<dyn WebhookEventHandler>) -> Self {
        let index = self.handlers.len();
        for event_type in handler.handles() {
            if self.routes.insert(event_type, index).is_some() {
                tracing::warn!(
                    event_type = event_type.as_str(),
                    "Handler registration overrides an earlier one"
                );
            }
        }
        self.handlers.push(handler);
        self
    }

    /// Event types with a registered handler.
    pub fn registered_types(&self) -> Vec<StripeEventType> {
        self.routes.keys().copied().collect()
    }
}

impl Default for BillingEventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookDispatcher for BillingEventDispatcher {
    fn get_handler(&self, event_type: &StripeEventType) -> Option<&dyn WebhookEventHandler> {
        self.routes
            .get(event_type)
            .map(|&index| self.handlers[index].as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::{StripeEvent, StripeEventBuilder, WebhookError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingHandler {
        types: Vec<StripeEventType>,
        calls: AtomicU32,
    }

    impl CountingHandler {
        fn new(types: Vec<StripeEventType>) -> Arc<Self> {
            Arc::new(Self {
                types,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl WebhookEventHandler for CountingHandler {
        fn handles(&self) -> Vec<StripeEventType> {
            self.types.clone()
        }

        async fn handle(&self, _event: &StripeEvent) -> Result<(), WebhookError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn event(event_type: &str) -> StripeEvent {
        StripeEventBuilder::new()
            .id("evt_route")
            .event_type(event_type)
            .object(serde_json::json!({}))
            .build()
    }

    #[tokio::test]
    async fn routes_each_type_to_its_handler() {
        let invoices = CountingHandler::new(vec![
            StripeEventType::InvoicePaymentSucceeded,
            StripeEventType::InvoicePaymentFailed,
        ]);
        let lifecycle = CountingHandler::new(vec![StripeEventType::CustomerSubscriptionUpdated]);
        let dispatcher = BillingEventDispatcher::new()
            .register(invoices.clone())
            .register(lifecycle.clone());

        dispatcher
            .dispatch(&event("invoice.payment_failed"))
            .await
            .unwrap();
        dispatcher
            .dispatch(&event("customer.subscription.updated"))
            .await
            .unwrap();

        assert_eq!(invoices.calls.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unregistered_type_reports_ignored() {
        let dispatcher = BillingEventDispatcher::new().register(CountingHandler::new(vec![
            StripeEventType::CheckoutSessionCompleted,
        ]));

        let result = dispatcher.dispatch(&event("invoice.upcoming")).await;

        assert!(matches!(result, Err(WebhookError::Ignored(_))));
    }

    #[test]
    fn registered_types_reflect_all_registrations() {
        let dispatcher = BillingEventDispatcher::new()
            .register(CountingHandler::new(vec![
                StripeEventType::CheckoutSessionCompleted,
            ]))
            .register(CountingHandler::new(vec![
                StripeEventType::CustomerSubscriptionUpdated,
                StripeEventType::CustomerSubscriptionDeleted,
            ]));

        let mut types = dispatcher.registered_types();
        types.sort_by_key(|t| t.as_str());

        assert_eq!(
            types,
            vec![
                StripeEventType::CheckoutSessionCompleted,
                StripeEventType::CustomerSubscriptionDeleted,
                StripeEventType::CustomerSubscriptionUpdated,
            ]
        );
    }
}
