//! InvoicePaymentFailedHandler - applies `invoice.payment_failed`.
//!
//! A failed renewal charge opens the grace period: the subscription moves
//! to past-due, access continues, and the processor keeps retrying. Credits
//! are never touched here; the grant for the unpaid period happens only
//! when a retry eventually succeeds.
//!
//! Later failures for the same invoice arrive while the row is already
//! past-due. Those deliveries update nobody's state but still surface the
//! new attempt count to subscribers and the user.

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::handlers::billing::payloads::InvoiceObject;
use crate::domain::billing::{
    BillingEvent, StripeEvent, StripeEventType, SubscriptionStatus, WebhookError,
    WebhookEventHandler,
};
use crate::domain::foundation::{SubscriptionId, Timestamp, UserId};
use crate::ports::{EventPublisher, Notification, NotificationSender, SubscriptionRepository};

/// Handler for failed invoice payments.
pub struct InvoicePaymentFailedHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    publisher: Arc<dyn EventPublisher>,
    notifications: Arc<dyn NotificationSender>,
}

impl InvoicePaymentFailedHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        publisher: Arc<dyn EventPublisher>,
        notifications: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            subscriptions,
            publisher,
            notifications,
        }
    }

    async fn publish_failure(
        &self,
        event: &StripeEvent,
        invoice: &InvoiceObject,
        subscription_id: SubscriptionId,
        user_id: UserId,
    ) -> Result<(), WebhookError> {
        let failed = BillingEvent::PaymentFailed {
            subscription_id,
            user_id: user_id.clone(),
            attempt_count: invoice.attempt_count,
            next_retry_at: invoice
                .next_payment_attempt
                .map(|secs| Timestamp::from_unix_secs(secs.max(0) as u64)),
            occurred_at: Timestamp::now(),
        };
        self.publisher
            .publish(failed.to_envelope().with_correlation_id(&event.id))
            .await?;

        if let Err(error) = self
            .notifications
            .send(Notification::PaymentFailed {
                user_id,
                attempt_count: invoice.attempt_count,
            })
            .await
        {
            tracing::warn!(error = %error, "Notification delivery failed");
        }

        Ok(())
    }
}

#[async_trait]
impl WebhookEventHandler for InvoicePaymentFailedHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![StripeEventType::InvoicePaymentFailed]
    }

    async fn handle(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let invoice: InvoiceObject = event
            .deserialize_object()
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;

        let gateway_subscription_id = invoice
            .subscription
            .clone()
            .ok_or_else(|| WebhookError::Ignored("invoice without a subscription".to_string()))?;

        let mut subscription = self
            .subscriptions
            .find_by_stripe_subscription_id(&gateway_subscription_id)
            .await?
            .ok_or_else(|| WebhookError::UnknownSubscription(gateway_subscription_id.clone()))?;

        match subscription.status {
            SubscriptionStatus::Active => {
                subscription
                    .mark_past_due()
                    .map_err(|e| WebhookError::InvalidTransition(e.to_string()))?;
                self.subscriptions.update(&subscription).await?;

                tracing::info!(
                    subscription_id = %subscription.id,
                    attempt_count = invoice.attempt_count,
                    "Renewal charge failed, grace period started"
                );
                self.publish_failure(event, &invoice, subscription.id, subscription.user_id)
                    .await
            }
            SubscriptionStatus::PastDue => {
                // Already in the grace period; the row stays put but the new
                // attempt is still worth announcing.
                self.publish_failure(event, &invoice, subscription.id, subscription.user_id)
                    .await
            }
            SubscriptionStatus::Pending => Err(WebhookError::Ignored(
                "first payment incomplete, checkout stays pending".to_string(),
            )),
            SubscriptionStatus::Paused | SubscriptionStatus::Canceled => {
                Err(WebhookError::Ignored(format!(
                    "payment failure for {:?} subscription needs no action",
                    subscription.status
                )))
            }
        }
    }
}
