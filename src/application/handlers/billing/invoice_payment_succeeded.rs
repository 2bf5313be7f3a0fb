//! InvoicePaymentSucceededHandler - applies `invoice.payment_succeeded`.
//!
//! A paid invoice is the authoritative signal that a billing period exists.
//! Depending on where the subscription currently stands this event means
//! three different things:
//!
//! - **Pending**: the first invoice of a new subscription. Completes the
//!   activation the checkout handler may or may not have already run (the
//!   two webhooks race; the signup bonus key dedupes the overlap).
//! - **PastDue**: a retry finally collected. The subscription recovers and
//!   the period the failed attempts were chasing is granted.
//! - **Active / Paused**: a renewal. Periods only move forward, so a
//!   redelivered or reordered invoice can never regress the row.
//!
//! Every path grants the plan's monthly credits keyed by
//! `period-grant:<provider sub>:<period start>`, so each period is granted
//! at most once no matter how deliveries interleave.

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::handlers::billing::grants::CreditGrants;
use crate::application::handlers::billing::payloads::InvoiceObject;
use crate::domain::billing::{
    BillingEvent, StripeEvent, StripeEventType, SubscriptionStatus, WebhookError,
    WebhookEventHandler,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{
    EventPublisher, InvoiceRecord, Notification, NotificationSender, PaymentRecordStore,
    SubscriptionRepository,
};

/// Handler for successful invoice payments.
pub struct InvoicePaymentSucceededHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    payments: Arc<dyn PaymentRecordStore>,
    publisher: Arc<dyn EventPublisher>,
    notifications: Arc<dyn NotificationSender>,
    grants: CreditGrants,
}

impl InvoicePaymentSucceededHandler {
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

    async fn apply(&self, event: &StripeEvent, invoice: &InvoiceObject) -> Result<(), WebhookError> {
        let gateway_subscription_id = invoice
            .subscription
            .clone()
            .ok_or_else(|| WebhookError::Ignored("invoice without a subscription".to_string()))?;

        let mut subscription = self
            .subscriptions
            .find_by_stripe_subscription_id(&gateway_subscription_id)
            .await?
            .ok_or_else(|| WebhookError::UnknownSubscription(gateway_subscription_id.clone()))?;

        let period_start = Timestamp::from_unix_secs(invoice.period_start.max(0) as u64);
        let period_end = Timestamp::from_unix_secs(invoice.period_end.max(0) as u64);
        let user_id = subscription.user_id.clone();

        self.record_invoice(event, invoice, &gateway_subscription_id, &user_id).await?;

        if subscription.status == SubscriptionStatus::Canceled {
            // A final invoice can overtake the deletion event. The money was
            // collected and is recorded, but a terminal row stays terminal.
            tracing::warn!(
                subscription_id = %subscription.id,
                invoice_id = %invoice.id,
                "Paid invoice arrived for a canceled subscription"
            );
            return Ok(());
        }

        let previous_status = subscription.status;
        match previous_status {
            SubscriptionStatus::Pending => subscription
                .activate(
                    period_start,
                    period_end,
                    invoice.customer.clone(),
                    Some(gateway_subscription_id.clone()),
                )
                .map_err(|e| WebhookError::InvalidTransition(e.to_string()))?,
            SubscriptionStatus::PastDue => subscription
                .recover(period_start, period_end)
                .map_err(|e| WebhookError::InvalidTransition(e.to_string()))?,
            _ => subscription
                .renew(period_start, period_end)
                .map_err(|e| WebhookError::InvalidTransition(e.to_string()))?,
        }

        self.subscriptions.update(&subscription).await?;

        self.grants
            .period_allotment(
                &user_id,
                &subscription.plan_code,
                &gateway_subscription_id,
                invoice.period_start,
                &event.id,
            )
            .await?;

        match previous_status {
            SubscriptionStatus::Pending => {
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
            SubscriptionStatus::PastDue => {
                let recovered = BillingEvent::PaymentRecovered {
                    subscription_id: subscription.id,
                    user_id: user_id.clone(),
                    occurred_at: Timestamp::now(),
                };
                self.publisher
                    .publish(recovered.to_envelope().with_correlation_id(&event.id))
                    .await?;

                self.notify(Notification::PaymentSucceeded {
                    user_id,
                    amount_cents: invoice.amount_paid,
                    currency: invoice.currency.clone(),
                })
                .await;
            }
            _ => {
                let renewed = BillingEvent::SubscriptionRenewed {
                    subscription_id: subscription.id,
                    user_id: user_id.clone(),
                    period_end: subscription.current_period_end,
                    occurred_at: Timestamp::now(),
                };
                self.publisher
                    .publish(renewed.to_envelope().with_correlation_id(&event.id))
                    .await?;

                self.notify(Notification::PaymentSucceeded {
                    user_id,
                    amount_cents: invoice.amount_paid,
                    currency: invoice.currency.clone(),
                })
                .await;
            }
        }

        Ok(())
    }

    async fn record_invoice(
        &self,
        event: &StripeEvent,
        invoice: &InvoiceObject,
        gateway_subscription_id: &str,
        user_id: &UserId,
    ) -> Result<(), WebhookError> {
        if invoice.id.is_empty() {
            return Err(WebhookError::MissingField("id"));
        }

        self.payments
            .record_invoice(InvoiceRecord {
                invoice_id: invoice.id.clone(),
                stripe_subscription_id: gateway_subscription_id.to_string(),
                user_id: user_id.clone(),
                amount_paid_cents: invoice.amount_paid,
                currency: invoice.currency.clone(),
                period_start: Timestamp::from_unix_secs(invoice.period_start.max(0) as u64),
                period_end: Timestamp::from_unix_secs(invoice.period_end.max(0) as u64),
                occurred_at: Timestamp::from_unix_secs(event.created.max(0) as u64),
            })
            .await?;
        Ok(())
    }

    async fn notify(&self, notification: Notification) {
        if let Err(error) = self.notifications.send(notification).await {
            tracing::warn!(error = %error, "Notification delivery failed");
        }
    }
}

#[async_trait]
impl WebhookEventHandler for InvoicePaymentSucceededHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![StripeEventType::InvoicePaymentSucceeded]
    }

    async fn handle(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let invoice: InvoiceObject = event
            .deserialize_object()
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;

        self.apply(event, &invoice).await
    }
}
