//! InvoiceUpcomingHandler - sends renewal reminders.
//!
//! The provider announces an upcoming renewal charge a few days before it
//! happens. Nothing about local billing state changes; the event only feeds
//! a `RenewalReminder` notification, and only for subscriptions that are
//! actually going to renew.

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::handlers::billing::payloads::InvoiceObject;
use crate::domain::billing::{
    PlanCatalog, StripeEvent, StripeEventType, SubscriptionStatus, WebhookError,
    WebhookEventHandler,
};
use crate::ports::{Notification, NotificationSender, SubscriptionRepository};

/// Handler for upcoming renewal invoices.
pub struct InvoiceUpcomingHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    notifications: Arc<dyn NotificationSender>,
    catalog: PlanCatalog,
}

impl InvoiceUpcomingHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        notifications: Arc<dyn NotificationSender>,
        catalog: PlanCatalog,
    ) -> Self {
        Self {
            subscriptions,
            notifications,
            catalog,
        }
    }
}

#[async_trait]
impl WebhookEventHandler for InvoiceUpcomingHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![StripeEventType::InvoiceUpcoming]
    }

    async fn handle(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let invoice: InvoiceObject = event
            .deserialize_object()
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;

        let Some(gateway_subscription_id) = invoice.subscription else {
            return Err(WebhookError::Ignored(
                "upcoming invoice without a subscription".to_string(),
            ));
        };

        // Reminders are best-effort; an unknown subscription is not worth
        // parking a no-op event over.
        let Some(subscription) = self
            .subscriptions
            .find_by_stripe_subscription_id(&gateway_subscription_id)
            .await?
        else {
            return Err(WebhookError::Ignored(format!(
                "no local subscription for reminder: {}",
                gateway_subscription_id
            )));
        };

        if subscription.status != SubscriptionStatus::Active {
            return Err(WebhookError::Ignored(format!(
                "subscription is {:?}, not renewing",
                subscription.status
            )));
        }
        if subscription.cancel_at_period_end {
            return Err(WebhookError::Ignored(
                "cancellation scheduled, no renewal coming".to_string(),
            ));
        }

        let plan_name = self
            .catalog
            .by_code(&subscription.plan_code)
            .map(|plan| plan.name.clone())
            .unwrap_or_else(|| subscription.plan_code.clone());

        let reminder = Notification::RenewalReminder {
            user_id: subscription.user_id.clone(),
            plan_name,
            days_until_renewal: subscription.days_remaining(),
        };
        if let Err(err) = self.notifications.send(reminder).await {
            tracing::warn!(
                user_id = %subscription.user_id,
                error = %err,
                "Failed to send renewal reminder"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemorySubscriptionRepository;
    use crate::adapters::notifications::RecordingNotificationSender;
    use crate::domain::billing::{StripeEventBuilder, Subscription};
    use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp, UserId};
    use serde_json::json;

    fn test_user_id() -> UserId {
        UserId::new("user-42").unwrap()
    }

    struct Fixture {
        subscriptions: Arc<InMemorySubscriptionRepository>,
        notifications: Arc<RecordingNotificationSender>,
        handler: InvoiceUpcomingHandler,
    }

    fn fixture() -> Fixture {
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let notifications = Arc::new(RecordingNotificationSender::new());

        let handler = InvoiceUpcomingHandler::new(
            subscriptions.clone(),
            notifications.clone(),
            PlanCatalog::standard(),
        );

        Fixture {
            subscriptions,
            notifications,
            handler,
        }
    }

    /// Activate a subscription whose period ends ten days from now.
    async fn seed_active(fixture: &Fixture) -> Subscription {
        let mut subscription =
            Subscription::create_pending(SubscriptionId::new(), test_user_id(), "pro");
        subscription.current_period_start = Timestamp::from_unix_secs(0);
        subscription.current_period_end = Timestamp::from_unix_secs(0);
        subscription
            .activate(
                Timestamp::now().minus_days(20),
                Timestamp::now().add_days(10),
                Some("cus_123".to_string()),
                Some("sub_456".to_string()),
            )
            .unwrap();
        fixture.subscriptions.save(&subscription).await.unwrap();
        subscription
    }

    fn upcoming_event() -> StripeEvent {
        StripeEventBuilder::new()
            .id("evt_upcoming_1")
            .event_type("invoice.upcoming")
            .object(json!({
                "id": "",
                "customer": "cus_123",
                "subscription": "sub_456",
                "amount_paid": 0,
                "currency": "usd",
                "period_start": Timestamp::now().add_days(10).as_unix_secs(),
                "period_end": Timestamp::now().add_days(40).as_unix_secs(),
            }))
            .build()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Reminder Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn upcoming_renewal_sends_a_reminder() {
        let fixture = fixture();
        seed_active(&fixture).await;

        fixture.handler.handle(&upcoming_event()).await.unwrap();

        let sent = fixture.notifications.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Notification::RenewalReminder {
                user_id,
                plan_name,
                days_until_renewal,
            } => {
                assert_eq!(user_id, &test_user_id());
                assert_eq!(plan_name, "Pro");
                // Period ends ten days out; allow the day boundary to wobble.
                assert!((9..=10).contains(days_until_renewal));
            }
            other => panic!("expected a renewal reminder, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn scheduled_cancellation_suppresses_the_reminder() {
        let fixture = fixture();
        let mut subscription = seed_active(&fixture).await;
        subscription.schedule_cancellation().unwrap();
        fixture.subscriptions.update(&subscription).await.unwrap();

        let result = fixture.handler.handle(&upcoming_event()).await;

        assert!(matches!(result, Err(WebhookError::Ignored(_))));
        assert!(fixture.notifications.sent().is_empty());
    }

    #[tokio::test]
    async fn past_due_subscription_gets_no_reminder() {
        let fixture = fixture();
        let mut subscription = seed_active(&fixture).await;
        subscription.mark_past_due().unwrap();
        fixture.subscriptions.update(&subscription).await.unwrap();

        let result = fixture.handler.handle(&upcoming_event()).await;

        assert!(matches!(result, Err(WebhookError::Ignored(_))));
        assert!(fixture.notifications.sent().is_empty());
    }

    #[tokio::test]
    async fn unknown_subscription_is_quietly_ignored() {
        let fixture = fixture();

        let result = fixture.handler.handle(&upcoming_event()).await;

        assert!(matches!(result, Err(WebhookError::Ignored(_))));
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_the_event() {
        let fixture = fixture();
        seed_active(&fixture).await;
        fixture.notifications.set_error(DomainError::new(
            ErrorCode::InternalError,
            "smtp unavailable",
        ));

        let result = fixture.handler.handle(&upcoming_event()).await;

        assert!(result.is_ok());
    }
}
