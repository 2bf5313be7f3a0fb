//! CheckoutCompletedHandler - applies `checkout.session.completed` events.
//!
//! Two session shapes arrive here:
//!
//! - **Subscription mode**: the first payment for a plan confirmed. The
//!   pending subscription flips to active, provider ids are stamped, and
//!   the signup bonus is granted. Runs the same activation edge as the
//!   first `invoice.payment_succeeded`, so whichever webhook lands first
//!   wins and the other becomes a no-op duplicate.
//! - **Payment mode**: a one-time credit pack purchase. The payment is
//!   recorded and the credits from the session metadata are granted,
//!   keyed by payment intent id.

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::handlers::billing::grants::CreditGrants;
use crate::application::handlers::billing::payloads::{CheckoutMode, CheckoutSessionObject};
use crate::domain::billing::{
    BillingEvent, StripeEvent, StripeEventType, Subscription, SubscriptionStatus, WebhookError,
    WebhookEventHandler,
};
use crate::domain::foundation::{SubscriptionId, Timestamp};
use crate::ports::{
    EventPublisher, Notification, NotificationSender, PaymentRecord, PaymentRecordStore,
    SubscriptionRepository,
};

/// Handler for completed checkout sessions.
pub struct CheckoutCompletedHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    payments: Arc<dyn PaymentRecordStore>,
    publisher: Arc<dyn EventPublisher>,
    notifications: Arc<dyn NotificationSender>,
    grants: CreditGrants,
}

impl CheckoutCompletedHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        payments: Arc<dyn PaymentRecordStore>,
        publisher: Arc<dyn EventPublisher>,
        notifications: Arc<dyn NotificationSender>,
        grants: CreditGrants,
    ) -> Self {
        Self {
            subscriptions,
            payments,
            publisher,
            notifications,
            grants,
        }
    }

    async fn handle_subscription_checkout(
        &self,
        event: &StripeEvent,
        session: &CheckoutSessionObject,
    ) -> Result<(), WebhookError> {
        let user_id = session
            .user_id()
            .ok_or(WebhookError::MissingField("metadata.user_id"))?;
        let gateway_subscription_id = session
            .subscription
            .clone()
            .ok_or(WebhookError::MissingField("subscription"))?;

        let existing = self.subscriptions.find_by_user_id(&user_id).await?;

        let (mut subscription, is_new_row) = match existing {
            Some(sub) if sub.status != SubscriptionStatus::Canceled => (sub, false),
            _ => {
                // The pending row never made it to storage (crash between
                // the provider call and the local commit, or the webhook
                // overtook the commit). Rebuild it from session metadata.
                let plan_code = session
                    .metadata
                    .plan_code
                    .clone()
                    .ok_or(WebhookError::MissingField("metadata.plan_code"))?;
                let rebuilt =
                    Subscription::create_pending(SubscriptionId::new(), user_id.clone(), plan_code);
                (rebuilt, true)
            }
        };

        let was_pending = subscription.status == SubscriptionStatus::Pending;

        // Checkout sessions carry no billing period. Activate with a
        // zero-length period anchored at the event; the first invoice's
        // boundaries are strictly newer and replace it via the period guard.
        let provisional = Timestamp::from_unix_secs(event.created.max(0) as u64);
        subscription
            .activate(
                provisional,
                provisional,
                session.customer.clone(),
                Some(gateway_subscription_id),
            )
            .map_err(|e| WebhookError::InvalidTransition(e.to_string()))?;

        if is_new_row {
            self.subscriptions.save(&subscription).await?;
        } else {
            self.subscriptions.update(&subscription).await?;
        }

        if was_pending {
            self.grants.signup_bonus(&user_id, &event.id).await?;

            let activated = BillingEvent::SubscriptionActivated {
                subscription_id: subscription.id,
                user_id: user_id.clone(),
                plan_code: subscription.plan_code.clone(),
                period_end: subscription.current_period_end,
                occurred_at: Timestamp::now(),
            };
            self.publisher
                .publish(activated.to_envelope().with_correlation_id(&event.id))
                .await?;

            let plan_name = self
                .grants
                .catalog()
                .by_code(&subscription.plan_code)
                .map(|plan| plan.name.clone())
                .unwrap_or_else(|| subscription.plan_code.clone());
            self.notify(Notification::Welcome { user_id, plan_name }).await;
        }

        Ok(())
    }

    async fn handle_credit_pack_checkout(
        &self,
        event: &StripeEvent,
        session: &CheckoutSessionObject,
    ) -> Result<(), WebhookError> {
        let user_id = session
            .user_id()
            .ok_or(WebhookError::MissingField("metadata.user_id"))?;
        let payment_intent = session
            .payment_intent
            .clone()
            .ok_or(WebhookError::MissingField("payment_intent"))?;

        let amount_cents = session.amount_total.unwrap_or(0);
        let currency = session
            .currency
            .clone()
            .unwrap_or_else(|| "usd".to_string());
        let credits = session.credits();

        self.payments
            .record_payment(PaymentRecord {
                payment_intent_id: payment_intent.clone(),
                user_id: user_id.clone(),
                amount_cents,
                currency: currency.clone(),
                description: credits.map(|c| format!("Credit pack ({} credits)", c)),
                occurred_at: Timestamp::from_unix_secs(event.created.max(0) as u64),
            })
            .await?;

        let Some(credits) = credits else {
            if session.metadata.credits.is_some() {
                tracing::warn!(
                    session_id = %session.id,
                    "Payment session carries unusable credits metadata"
                );
            }
            // A one-time payment without credits attached is recorded but
            // grants nothing.
            return Ok(());
        };

        let receipt = self
            .grants
            .pack_purchase(&user_id, credits, &payment_intent, &event.id)
            .await?;

        if receipt.was_applied() {
            self.notify(Notification::PaymentSucceeded {
                user_id,
                amount_cents,
                currency,
            })
            .await;
        }

        Ok(())
    }

    async fn notify(&self, notification: Notification) {
        if let Err(error) = self.notifications.send(notification).await {
            tracing::warn!(error = %error, "Notification delivery failed");
        }
    }
}

#[async_trait]
impl WebhookEventHandler for CheckoutCompletedHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![StripeEventType::CheckoutSessionCompleted]
    }

    async fn handle(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let session: CheckoutSessionObject = event
            .deserialize_object()
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;

        match session.mode {
            CheckoutMode::Subscription => self.handle_subscription_checkout(event, &session).await,
            CheckoutMode::Payment => self.handle_credit_pack_checkout(event, &session).await,
            CheckoutMode::Setup | CheckoutMode::Unknown => Err(WebhookError::Ignored(format!(
                "checkout mode requires no billing action: {:?}",
                session.mode
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::events::InMemoryEventBus;
    use crate::adapters::memory::{
        InMemoryCreditLedger, InMemoryPaymentRecordStore, InMemorySubscriptionRepository,
    };
    use crate::adapters::notifications::RecordingNotificationSender;
    use crate::domain::billing::{PlanCatalog, StripeEventBuilder};
    use crate::domain::foundation::{DomainError, ErrorCode, UserId};
    use crate::ports::CreditLedger;
    use serde_json::json;

    // ════════════════════════════════════════════════════════════════════════════
    // Test Helpers
    // ════════════════════════════════════════════════════════════════════════════

    struct Fixture {
        subscriptions: Arc<InMemorySubscriptionRepository>,
        ledger: Arc<InMemoryCreditLedger>,
        payments: Arc<InMemoryPaymentRecordStore>,
        publisher: Arc<InMemoryEventBus>,
        notifications: Arc<RecordingNotificationSender>,
        handler: CheckoutCompletedHandler,
    }

    fn fixture() -> Fixture {
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let ledger = Arc::new(InMemoryCreditLedger::new());
        let payments = Arc::new(InMemoryPaymentRecordStore::new());
        let publisher = Arc::new(InMemoryEventBus::new());
        let notifications = Arc::new(RecordingNotificationSender::new());

        let handler = CheckoutCompletedHandler::new(
            subscriptions.clone(),
            payments.clone(),
            publisher.clone(),
            notifications.clone(),
            CreditGrants::new(
                ledger.clone(),
                publisher.clone(),
                PlanCatalog::standard(),
                3,
            ),
        );

        Fixture {
            subscriptions,
            ledger,
            payments,
            publisher,
            notifications,
            handler,
        }
    }

    fn test_user_id() -> UserId {
        UserId::new("user-42").unwrap()
    }

    fn subscription_session(user: &str) -> serde_json::Value {
        json!({
            "id": "cs_test_1",
            "mode": "subscription",
            "customer": "cus_123",
            "subscription": "sub_456",
            "metadata": {"user_id": user, "plan_code": "pro"}
        })
    }

    fn checkout_event(object: serde_json::Value) -> StripeEvent {
        StripeEventBuilder::new()
            .id("evt_checkout_1")
            .event_type("checkout.session.completed")
            .created(1704067200)
            .object(object)
            .build()
    }

    async fn seed_pending(fixture: &Fixture) -> Subscription {
        let subscription =
            Subscription::create_pending(SubscriptionId::new(), test_user_id(), "pro");
        fixture.subscriptions.save(&subscription).await.unwrap();
        subscription
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Subscription Mode Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn activates_pending_subscription() {
        let fixture = fixture();
        let pending = seed_pending(&fixture).await;

        let event = checkout_event(subscription_session("user-42"));
        fixture.handler.handle(&event).await.unwrap();

        let stored = fixture
            .subscriptions
            .find_by_id(&pending.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Active);
        assert_eq!(stored.stripe_customer_id.as_deref(), Some("cus_123"));
        assert_eq!(stored.stripe_subscription_id.as_deref(), Some("sub_456"));
    }

    #[tokio::test]
    async fn grants_signup_bonus_on_first_activation() {
        let fixture = fixture();
        seed_pending(&fixture).await;

        let event = checkout_event(subscription_session("user-42"));
        fixture.handler.handle(&event).await.unwrap();

        let balance = fixture.ledger.balance(&test_user_id()).await.unwrap();
        assert_eq!(balance.available(), 3);
        assert!(fixture.publisher.has_event("billing.credits_granted"));
    }

    #[tokio::test]
    async fn publishes_activated_event_and_welcome_notification() {
        let fixture = fixture();
        seed_pending(&fixture).await;

        let event = checkout_event(subscription_session("user-42"));
        fixture.handler.handle(&event).await.unwrap();

        assert!(fixture.publisher.has_event("billing.subscription_activated"));
        let welcomes = fixture.notifications.sent_of_kind("welcome");
        assert_eq!(welcomes.len(), 1);
        assert!(matches!(
            &welcomes[0],
            Notification::Welcome { plan_name, .. } if plan_name == "Pro"
        ));
    }

    #[tokio::test]
    async fn rebuilds_missing_subscription_from_metadata() {
        let fixture = fixture();

        let event = checkout_event(subscription_session("user-42"));
        fixture.handler.handle(&event).await.unwrap();

        let stored = fixture
            .subscriptions
            .find_by_user_id(&test_user_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Active);
        assert_eq!(stored.plan_code, "pro");
        assert_eq!(stored.stripe_subscription_id.as_deref(), Some("sub_456"));
    }

    #[tokio::test]
    async fn second_delivery_does_not_duplicate_activation_effects() {
        let fixture = fixture();
        seed_pending(&fixture).await;

        let event = checkout_event(subscription_session("user-42"));
        fixture.handler.handle(&event).await.unwrap();
        fixture.handler.handle(&event).await.unwrap();

        let balance = fixture.ledger.balance(&test_user_id()).await.unwrap();
        assert_eq!(balance.available(), 3);
        assert_eq!(
            fixture
                .publisher
                .events_of_type("billing.subscription_activated")
                .len(),
            1
        );
        assert_eq!(fixture.notifications.sent_of_kind("welcome").len(), 1);
    }

    #[tokio::test]
    async fn missing_user_metadata_is_rejected() {
        let fixture = fixture();

        let event = checkout_event(json!({
            "id": "cs_test_1",
            "mode": "subscription",
            "subscription": "sub_456"
        }));
        let result = fixture.handler.handle(&event).await;

        assert!(matches!(
            result,
            Err(WebhookError::MissingField("metadata.user_id"))
        ));
        assert_eq!(fixture.subscriptions.count(), 0);
    }

    #[tokio::test]
    async fn missing_subscription_id_is_rejected() {
        let fixture = fixture();

        let event = checkout_event(json!({
            "id": "cs_test_1",
            "mode": "subscription",
            "metadata": {"user_id": "user-42", "plan_code": "pro"}
        }));
        let result = fixture.handler.handle(&event).await;

        assert!(matches!(
            result,
            Err(WebhookError::MissingField("subscription"))
        ));
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_the_event() {
        let fixture = fixture();
        seed_pending(&fixture).await;
        fixture
            .notifications
            .set_error(DomainError::new(ErrorCode::InternalError, "smtp down"));

        let event = checkout_event(subscription_session("user-42"));
        let result = fixture.handler.handle(&event).await;

        assert!(result.is_ok());
        assert_eq!(fixture.notifications.count(), 0);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Payment Mode Tests
    // ════════════════════════════════════════════════════════════════════════════

    fn credit_pack_session(credits: &str) -> serde_json::Value {
        json!({
            "id": "cs_test_pack",
            "mode": "payment",
            "payment_intent": "pi_789",
            "amount_total": 500,
            "currency": "usd",
            "metadata": {"user_id": "user-42", "credits": credits}
        })
    }

    #[tokio::test]
    async fn credit_pack_purchase_grants_credits_and_records_payment() {
        let fixture = fixture();

        let event = checkout_event(credit_pack_session("50"));
        fixture.handler.handle(&event).await.unwrap();

        let balance = fixture.ledger.balance(&test_user_id()).await.unwrap();
        assert_eq!(balance.available(), 50);

        let payments = fixture.payments.payments();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].payment_intent_id, "pi_789");
        assert_eq!(payments[0].amount_cents, 500);

        assert_eq!(fixture.notifications.sent_of_kind("payment_succeeded").len(), 1);
    }

    #[tokio::test]
    async fn duplicate_credit_pack_delivery_grants_once() {
        let fixture = fixture();

        let event = checkout_event(credit_pack_session("50"));
        fixture.handler.handle(&event).await.unwrap();
        fixture.handler.handle(&event).await.unwrap();

        let balance = fixture.ledger.balance(&test_user_id()).await.unwrap();
        assert_eq!(balance.available(), 50);
        assert_eq!(fixture.ledger.transaction_count(), 1);
    }

    #[tokio::test]
    async fn payment_without_credits_metadata_records_payment_only() {
        let fixture = fixture();

        let event = checkout_event(json!({
            "id": "cs_test_pack",
            "mode": "payment",
            "payment_intent": "pi_789",
            "amount_total": 1500,
            "currency": "usd",
            "metadata": {"user_id": "user-42"}
        }));
        fixture.handler.handle(&event).await.unwrap();

        assert_eq!(fixture.payments.payments().len(), 1);
        let balance = fixture.ledger.balance(&test_user_id()).await.unwrap();
        assert_eq!(balance.available(), 0);
    }

    #[tokio::test]
    async fn payment_without_payment_intent_is_rejected() {
        let fixture = fixture();

        let event = checkout_event(json!({
            "id": "cs_test_pack",
            "mode": "payment",
            "metadata": {"user_id": "user-42", "credits": "50"}
        }));
        let result = fixture.handler.handle(&event).await;

        assert!(matches!(
            result,
            Err(WebhookError::MissingField("payment_intent"))
        ));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Other Modes
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn setup_mode_is_ignored() {
        let fixture = fixture();

        let event = checkout_event(json!({"id": "cs_setup", "mode": "setup"}));
        let result = fixture.handler.handle(&event).await;

        assert!(matches!(result, Err(WebhookError::Ignored(_))));
        assert_eq!(fixture.publisher.event_count(), 0);
    }
}
