//! SubscriptionLifecycleHandler - syncs local rows with the provider's
//! subscription object.
//!
//! `customer.subscription.updated`, `.deleted`, `.paused`, and `.resumed`
//! all carry the full subscription snapshot, and the snapshot — not the
//! event name — is treated as the truth. One sync routine computes the
//! transition from wherever the local row stands to wherever the provider
//! says it should be. That makes this the repair path too: the drift sweep
//! synthesizes `customer.subscription.updated` events from gateway reads
//! and they converge through exactly this code.
//!
//! Convergence covers credits as well: when the sync advances a billing
//! period whose invoice webhook never arrived, the period allotment is
//! granted here under the same idempotency key the invoice path uses.

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::handlers::billing::grants::CreditGrants;
use crate::domain::billing::{
    BillingEvent, StripeEvent, StripeEventType, Subscription, SubscriptionStatus, WebhookError,
    WebhookEventHandler,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{
    EventPublisher, GatewaySubscription, GatewaySubscriptionStatus, Notification,
    NotificationSender, SubscriptionRepository,
};

/// Handler for provider-side subscription lifecycle events.
pub struct SubscriptionLifecycleHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    publisher: Arc<dyn EventPublisher>,
    notifications: Arc<dyn NotificationSender>,
    grants: CreditGrants,
}

impl SubscriptionLifecycleHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        publisher: Arc<dyn EventPublisher>,
        notifications: Arc<dyn NotificationSender>,
        grants: CreditGrants,
    ) -> Self {
        Self {
            subscriptions,
            publisher,
            notifications,
            grants,
        }
    }

    /// Move the local row to the provider's state, forward-only.
    fn apply_remote_status(
        subscription: &mut Subscription,
        remote: &GatewaySubscription,
    ) -> Result<(), WebhookError> {
        let period_start = Timestamp::from_unix_secs(remote.current_period_start.max(0) as u64);
        let period_end = Timestamp::from_unix_secs(remote.current_period_end.max(0) as u64);

        let transition = match remote.status {
            GatewaySubscriptionStatus::Active | GatewaySubscriptionStatus::Trialing => {
                match subscription.status {
                    SubscriptionStatus::Pending => subscription.activate(
                        period_start,
                        period_end,
                        Some(remote.customer.clone()),
                        Some(remote.id.clone()),
                    ),
                    SubscriptionStatus::PastDue => subscription.recover(period_start, period_end),
                    SubscriptionStatus::Paused => subscription
                        .resume()
                        .and_then(|()| subscription.renew(period_start, period_end)),
                    SubscriptionStatus::Active => subscription.renew(period_start, period_end),
                    SubscriptionStatus::Canceled => {
                        // Terminal rows stay terminal; resubscribing creates a
                        // fresh row instead of reviving this one.
                        tracing::warn!(
                            subscription_id = %subscription.id,
                            "Provider reports a live subscription for a canceled row"
                        );
                        Ok(())
                    }
                }
            }
            GatewaySubscriptionStatus::PastDue => match subscription.status {
                SubscriptionStatus::Active => subscription.mark_past_due(),
                _ => Ok(()),
            },
            GatewaySubscriptionStatus::Paused => match subscription.status {
                SubscriptionStatus::Active => subscription.pause(),
                SubscriptionStatus::Paused => Ok(()),
                other => {
                    tracing::warn!(
                        subscription_id = %subscription.id,
                        status = ?other,
                        "Cannot pause from current status, leaving row as-is"
                    );
                    Ok(())
                }
            },
            GatewaySubscriptionStatus::Canceled
            | GatewaySubscriptionStatus::Unpaid
            | GatewaySubscriptionStatus::IncompleteExpired => match subscription.status {
                SubscriptionStatus::Canceled => Ok(()),
                _ => subscription.cancel_now(),
            },
            // First payment still in flight; the local pending row is right.
            GatewaySubscriptionStatus::Incomplete => Ok(()),
            GatewaySubscriptionStatus::Unknown => {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    "Provider reports an unrecognized subscription status"
                );
                Ok(())
            }
        };

        transition.map_err(|e| WebhookError::InvalidTransition(e.to_string()))
    }

    async fn publish_edges(
        &self,
        event: &StripeEvent,
        subscription: &Subscription,
        before_status: SubscriptionStatus,
        period_advanced: bool,
        newly_scheduled: bool,
    ) -> Result<(), WebhookError> {
        let edge = match (before_status, subscription.status) {
            (SubscriptionStatus::Pending, SubscriptionStatus::Active) => {
                Some(BillingEvent::SubscriptionActivated {
                    subscription_id: subscription.id,
                    user_id: subscription.user_id.clone(),
                    plan_code: subscription.plan_code.clone(),
                    period_end: subscription.current_period_end,
                    occurred_at: Timestamp::now(),
                })
            }
            (SubscriptionStatus::PastDue, SubscriptionStatus::Active) => {
                Some(BillingEvent::PaymentRecovered {
                    subscription_id: subscription.id,
                    user_id: subscription.user_id.clone(),
                    occurred_at: Timestamp::now(),
                })
            }
            (SubscriptionStatus::Paused, SubscriptionStatus::Active) => {
                Some(BillingEvent::SubscriptionResumed {
                    subscription_id: subscription.id,
                    user_id: subscription.user_id.clone(),
                    occurred_at: Timestamp::now(),
                })
            }
            (SubscriptionStatus::Active, SubscriptionStatus::Active) if period_advanced => {
                Some(BillingEvent::SubscriptionRenewed {
                    subscription_id: subscription.id,
                    user_id: subscription.user_id.clone(),
                    period_end: subscription.current_period_end,
                    occurred_at: Timestamp::now(),
                })
            }
            (SubscriptionStatus::Active, SubscriptionStatus::Paused) => {
                Some(BillingEvent::SubscriptionPaused {
                    subscription_id: subscription.id,
                    user_id: subscription.user_id.clone(),
                    occurred_at: Timestamp::now(),
                })
            }
            (before, SubscriptionStatus::Canceled) if before != SubscriptionStatus::Canceled => {
                Some(BillingEvent::SubscriptionCanceled {
                    subscription_id: subscription.id,
                    user_id: subscription.user_id.clone(),
                    occurred_at: Timestamp::now(),
                })
            }
            _ => None,
        };

        if let Some(edge) = edge {
            self.publisher
                .publish(edge.to_envelope().with_correlation_id(&event.id))
                .await?;
        }

        if newly_scheduled {
            let scheduled = BillingEvent::CancellationScheduled {
                subscription_id: subscription.id,
                user_id: subscription.user_id.clone(),
                effective_at: subscription.current_period_end,
                occurred_at: Timestamp::now(),
            };
            self.publisher
                .publish(scheduled.to_envelope().with_correlation_id(&event.id))
                .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl WebhookEventHandler for SubscriptionLifecycleHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![
            StripeEventType::CustomerSubscriptionUpdated,
            StripeEventType::CustomerSubscriptionDeleted,
            StripeEventType::CustomerSubscriptionPaused,
            StripeEventType::CustomerSubscriptionResumed,
        ]
    }

    async fn handle(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let remote: GatewaySubscription = event
            .deserialize_object()
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;

        let mut subscription = self
            .subscriptions
            .find_by_stripe_subscription_id(&remote.id)
            .await?
            .ok_or_else(|| WebhookError::UnknownSubscription(remote.id.clone()))?;

        let before_status = subscription.status;
        let before_period_end = subscription.current_period_end;
        let before_scheduled = subscription.cancel_at_period_end;

        Self::apply_remote_status(&mut subscription, &remote)?;

        // Cancellation intent can be set or cleared from the provider's
        // dashboard; mirror it while the row is still live.
        if subscription.status != SubscriptionStatus::Canceled {
            if remote.cancel_at_period_end && !subscription.cancel_at_period_end {
                subscription
                    .schedule_cancellation()
                    .map_err(|e| WebhookError::InvalidTransition(e.to_string()))?;
            } else if !remote.cancel_at_period_end && subscription.cancel_at_period_end {
                subscription.unschedule_cancellation();
            }
        }

        // Even a no-drift snapshot is a fresh observation of the provider's
        // state, which the drift sweep's staleness cutoff relies on.
        subscription.touch();
        self.subscriptions.update(&subscription).await?;

        let period_advanced = subscription.current_period_end.is_after(&before_period_end);
        let newly_scheduled = subscription.cancel_at_period_end && !before_scheduled;

        self.publish_edges(event, &subscription, before_status, period_advanced, newly_scheduled)
            .await?;

        if period_advanced && subscription.status == SubscriptionStatus::Active {
            self.grants
                .period_allotment(
                    &subscription.user_id,
                    &subscription.plan_code,
                    &remote.id,
                    remote.current_period_start,
                    &event.id,
                )
                .await?;
        }

        if before_status == SubscriptionStatus::Pending
            && subscription.status == SubscriptionStatus::Active
        {
            self.grants
                .signup_bonus(&subscription.user_id, &event.id)
                .await?;

            let plan_name = self
                .grants
                .catalog()
                .by_code(&subscription.plan_code)
                .map(|plan| plan.name.clone())
                .unwrap_or_else(|| subscription.plan_code.clone());
            if let Err(error) = self
                .notifications
                .send(Notification::Welcome {
                    user_id: subscription.user_id.clone(),
                    plan_name,
                })
                .await
            {
                tracing::warn!(error = %error, "Notification delivery failed");
            }
        }

        Ok(())
    }
}
