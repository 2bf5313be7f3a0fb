//! CancelSubscriptionHandler - cancels a subscription at the user's request.
//!
//! Two modes: the default schedules cancellation for the end of the paid
//! period (access continues until then), `immediately` ends it now.
//!
//! The provider is called before any local write. A failed gateway call
//! leaves local state untouched and the user can retry; the eventual
//! `customer.subscription.updated` / `.deleted` webhook reconciles whatever
//! the provider actually did.

use std::sync::Arc;

use crate::domain::billing::{BillingError, BillingEvent, Subscription, SubscriptionStatus};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{EventPublisher, GatewayErrorCode, PaymentGateway, SubscriptionRepository};

/// Command to cancel the user's subscription.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    /// User requesting cancellation.
    pub user_id: UserId,

    /// End access now instead of at the period boundary.
    pub immediately: bool,
}

/// Result of a cancellation request.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionResult {
    /// The subscription after the cancellation was applied.
    pub subscription: Subscription,

    /// When access ends.
    pub effective_at: Timestamp,
}

/// Handler for subscription cancellation.
pub struct CancelSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    publisher: Arc<dyn EventPublisher>,
}

impl CancelSubscriptionHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        gateway: Arc<dyn PaymentGateway>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            subscriptions,
            gateway,
            publisher,
        }
    }

    /// Cancel the user's subscription.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::NotFoundForUser` if the user has no
    /// subscription, `BillingError::AlreadyCanceled` if it is already
    /// canceled, and `BillingError::GatewayUnavailable` if the provider
    /// call fails.
    pub async fn handle(
        &self,
        command: CancelSubscriptionCommand,
    ) -> Result<CancelSubscriptionResult, BillingError> {
        // 1. Find the subscription
        let mut subscription = self
            .subscriptions
            .find_by_user_id(&command.user_id)
            .await?
            .ok_or_else(|| BillingError::not_found_for_user(command.user_id.clone()))?;

        // 2. Guard terminal and repeated requests
        if subscription.status == SubscriptionStatus::Canceled {
            return Err(BillingError::already_canceled(subscription.id));
        }
        if subscription.cancel_at_period_end && !command.immediately {
            // Same request again; nothing to change or announce.
            let effective_at = subscription.current_period_end;
            return Ok(CancelSubscriptionResult {
                subscription,
                effective_at,
            });
        }

        // 3. Cancel at the provider first, so a failure here leaves the
        //    local row untouched. A pending row that never reached the
        //    provider has nothing remote to cancel.
        if let Some(provider_id) = subscription.stripe_subscription_id.clone() {
            match self
                .gateway
                .cancel_subscription(&provider_id, !command.immediately)
                .await
            {
                Ok(_) => {}
                Err(err) if err.code == GatewayErrorCode::NotFound => {
                    // The provider already forgot this subscription; finish
                    // the cancellation locally instead of wedging the row.
                    tracing::warn!(
                        subscription_id = %subscription.id,
                        provider_id = %provider_id,
                        "Provider has no such subscription, canceling locally"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        // 4. Apply the local transition
        let effective_at = if command.immediately || subscription.status == SubscriptionStatus::Pending
        {
            // A pending row has no paid period to run out.
            subscription.cancel_now()?;
            Timestamp::now()
        } else {
            subscription.schedule_cancellation()?;
            subscription.current_period_end
        };

        self.subscriptions.update(&subscription).await?;

        // 5. Announce the outcome
        let event = if subscription.status == SubscriptionStatus::Canceled {
            BillingEvent::SubscriptionCanceled {
                subscription_id: subscription.id,
                user_id: command.user_id.clone(),
                occurred_at: Timestamp::now(),
            }
        } else {
            BillingEvent::CancellationScheduled {
                subscription_id: subscription.id,
                user_id: command.user_id.clone(),
                effective_at,
                occurred_at: Timestamp::now(),
            }
        };
        self.publisher.publish(event.to_envelope()).await?;

        tracing::info!(
            user_id = %command.user_id,
            subscription_id = %subscription.id,
            immediately = command.immediately,
            effective_at = %effective_at,
            "Subscription cancellation applied"
        );

        Ok(CancelSubscriptionResult {
            subscription,
            effective_at,
        })
    }
}
