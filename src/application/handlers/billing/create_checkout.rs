//! CreateCheckoutHandler - starts a paid subscription through hosted checkout.
//!
//! Creates the provider checkout session and a local pending subscription
//! row. The row stays pending until `checkout.session.completed` or the
//! first `invoice.payment_succeeded` webhook confirms payment; the session
//! response itself is never trusted as billing state.
//!
//! The session is created before the row is persisted, so a crash between
//! the two leaves a payable session and no local row. That is the gap the
//! completed-checkout handler's rebuild-from-metadata path closes.

use std::sync::Arc;

use crate::domain::billing::{
    BillingError, BillingEvent, PlanCatalog, Subscription, SubscriptionStatus,
};
use crate::domain::foundation::{SubscriptionId, Timestamp, UserId};
use crate::ports::{CreateCheckoutRequest, EventPublisher, PaymentGateway, SubscriptionRepository};

/// Command to start checkout for a subscription plan.
#[derive(Debug, Clone)]
pub struct CreateCheckoutCommand {
    /// User starting checkout.
    pub user_id: UserId,

    /// Email to pre-fill on the hosted page.
    pub email: String,

    /// Code of the plan being purchased.
    pub plan_code: String,

    /// Redirect target after successful payment.
    pub success_url: String,

    /// Redirect target after abandoned checkout.
    pub cancel_url: String,
}

/// Result of starting checkout.
#[derive(Debug, Clone)]
pub struct CreateCheckoutResult {
    /// The pending local subscription awaiting webhook confirmation.
    pub subscription_id: SubscriptionId,

    /// Plan the session was created for.
    pub plan_code: String,

    /// Provider session id.
    pub session_id: String,

    /// Hosted checkout URL to send the customer to.
    pub checkout_url: String,

    /// When the session expires (Unix timestamp).
    pub expires_at: i64,
}

/// Handler for starting subscription checkout.
pub struct CreateCheckoutHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    publisher: Arc<dyn EventPublisher>,
    catalog: PlanCatalog,
}

impl CreateCheckoutHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        gateway: Arc<dyn PaymentGateway>,
        publisher: Arc<dyn EventPublisher>,
        catalog: PlanCatalog,
    ) -> Self {
        Self {
            subscriptions,
            gateway,
            publisher,
            catalog,
        }
    }

    /// Start checkout for a plan.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::PlanNotFound` for an unknown plan code,
    /// `BillingError::AlreadySubscribed` if the user already has a live
    /// subscription, and `BillingError::GatewayUnavailable` if the provider
    /// call fails.
    pub async fn handle(
        &self,
        command: CreateCheckoutCommand,
    ) -> Result<CreateCheckoutResult, BillingError> {
        if command.email.trim().is_empty() {
            return Err(BillingError::validation("email", "must not be empty"));
        }

        // 1. Resolve the plan
        let plan = self
            .catalog
            .by_code(&command.plan_code)
            .ok_or_else(|| BillingError::plan_not_found(&command.plan_code))?
            .clone();

        // 2. Check for an existing subscription. A live one blocks checkout;
        //    an abandoned pending row is reused so retries don't pile up
        //    rows; a canceled row means the user is resubscribing.
        let existing = self.subscriptions.find_by_user_id(&command.user_id).await?;

        let (mut subscription, is_new_row) = match existing {
            Some(sub) if sub.status == SubscriptionStatus::Pending => (sub, false),
            Some(sub) if sub.status != SubscriptionStatus::Canceled => {
                return Err(BillingError::already_subscribed(command.user_id));
            }
            _ => {
                let created = Subscription::create_pending(
                    SubscriptionId::new(),
                    command.user_id.clone(),
                    plan.code.clone(),
                );
                (created, true)
            }
        };

        // A reused pending row may carry the plan from an earlier attempt.
        if subscription.plan_code != plan.code {
            subscription.plan_code = plan.code.clone();
            subscription.updated_at = Timestamp::now();
        }

        // 3. Create the hosted session. The key is stable per (row, plan),
        //    so retrying an abandoned checkout replays the same session
        //    instead of minting a fresh charge attempt.
        let session = self
            .gateway
            .create_checkout_session(CreateCheckoutRequest {
                user_id: command.user_id.clone(),
                email: command.email.clone(),
                plan_code: plan.code.clone(),
                price_id: plan.price_id.clone(),
                success_url: command.success_url.clone(),
                cancel_url: command.cancel_url.clone(),
                idempotency_key: Some(format!("checkout:{}:{}", subscription.id, plan.code)),
            })
            .await?;

        // 4. Persist the pending row
        if is_new_row {
            self.subscriptions.save(&subscription).await?;
        } else {
            self.subscriptions.update(&subscription).await?;
        }

        // 5. Announce the new subscription (reused rows already announced)
        if is_new_row {
            let event = BillingEvent::SubscriptionCreated {
                subscription_id: subscription.id,
                user_id: command.user_id.clone(),
                plan_code: plan.code.clone(),
                occurred_at: Timestamp::now(),
            };
            self.publisher
                .publish(event.to_envelope().with_correlation_id(&session.id))
                .await?;
        }

        tracing::info!(
            user_id = %command.user_id,
            plan_code = %plan.code,
            session_id = %session.id,
            "Checkout session created"
        );

        Ok(CreateCheckoutResult {
            subscription_id: subscription.id,
            plan_code: plan.code,
            session_id: session.id,
            checkout_url: session.url,
            expires_at: session.expires_at,
        })
    }
}
