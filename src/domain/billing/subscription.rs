//! Subscription aggregate entity.
//!
//! Mirrors the processor's view of a user's subscription. The processor is
//! authoritative: webhook events (and the reconciler's synthesized events)
//! drive every state change here.
//!
//! # Design Decisions
//!
//! - **One active subscription per user**: unique partial index at database level
//! - **Money in cents**: plan prices are i64 cents (not floats)
//! - **Canceled is terminal**: resubscribing creates a new row
//! - **Out-of-order safe**: period fields only move forward

use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

use super::SubscriptionStatus;

/// Subscription aggregate.
///
/// # Invariants
///
/// - `id` is globally unique
/// - Status transitions follow the state machine rules
/// - `current_period_start <= current_period_end`
/// - Period fields never move backwards, even when events arrive reordered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Unique identifier for this subscription.
    pub id: SubscriptionId,

    /// User who owns this subscription.
    pub user_id: UserId,

    /// Plan code from the catalog ("pro", "enterprise").
    pub plan_code: String,

    /// Current status in the billing lifecycle.
    pub status: SubscriptionStatus,

    /// Processor customer id, learned at activation.
    pub stripe_customer_id: Option<String>,

    /// Processor subscription id, learned at activation.
    pub stripe_subscription_id: Option<String>,

    /// Start of current billing period.
    pub current_period_start: Timestamp,

    /// End of current billing period.
    pub current_period_end: Timestamp,

    /// True when cancellation is scheduled for period end.
    pub cancel_at_period_end: bool,

    /// When the subscription actually ended (if it has).
    pub canceled_at: Option<Timestamp>,

    /// When the subscription was created.
    pub created_at: Timestamp,

    /// When the subscription was last updated.
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Create a pending subscription when checkout starts.
    ///
    /// Period fields hold the creation instant as a placeholder until the
    /// first payment confirms real period boundaries.
    pub fn create_pending(id: SubscriptionId, user_id: UserId, plan_code: impl Into<String>) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            user_id,
            plan_code: plan_code.into(),
            status: SubscriptionStatus::Pending,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            current_period_start: now,
            current_period_end: now,
            cancel_at_period_end: false,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Activate after the first successful payment.
    ///
    /// Safe to call again when the checkout and invoice webhooks race: the
    /// second activation is an Active -> Active renewal edge and the period
    /// guard keeps older boundaries from overwriting newer ones.
    ///
    /// # Errors
    ///
    /// Returns error if transition from current status is not allowed.
    pub fn activate(
        &mut self,
        period_start: Timestamp,
        period_end: Timestamp,
        stripe_customer_id: Option<String>,
        stripe_subscription_id: Option<String>,
    ) -> Result<(), DomainError> {
        self.transition_to(SubscriptionStatus::Active)?;
        self.update_periods_if_newer(period_start, period_end);
        if let Some(customer_id) = stripe_customer_id {
            self.stripe_customer_id = Some(customer_id);
        }
        if let Some(sub_id) = stripe_subscription_id {
            self.stripe_subscription_id = Some(sub_id);
        }
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Renew for a new billing period.
    ///
    /// # Errors
    ///
    /// Returns error if current status doesn't allow renewal.
    pub fn renew(
        &mut self,
        period_start: Timestamp,
        period_end: Timestamp,
    ) -> Result<(), DomainError> {
        self.transition_to(SubscriptionStatus::Active)?;
        self.update_periods_if_newer(period_start, period_end);
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Mark a failed renewal charge (grace period begins).
    ///
    /// # Errors
    ///
    /// Returns error if transition from current status is not allowed.
    pub fn mark_past_due(&mut self) -> Result<(), DomainError> {
        self.transition_to(SubscriptionStatus::PastDue)?;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Recover from past due after a successful retry.
    ///
    /// # Errors
    ///
    /// Returns error if transition from current status is not allowed.
    pub fn recover(
        &mut self,
        period_start: Timestamp,
        period_end: Timestamp,
    ) -> Result<(), DomainError> {
        self.transition_to(SubscriptionStatus::Active)?;
        self.update_periods_if_newer(period_start, period_end);
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Pause billing collection.
    ///
    /// # Errors
    ///
    /// Returns error if transition from current status is not allowed.
    pub fn pause(&mut self) -> Result<(), DomainError> {
        self.transition_to(SubscriptionStatus::Paused)?;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Resume billing collection.
    ///
    /// # Errors
    ///
    /// Returns error if transition from current status is not allowed.
    pub fn resume(&mut self) -> Result<(), DomainError> {
        self.transition_to(SubscriptionStatus::Active)?;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Flag cancellation for the end of the current period.
    ///
    /// Status is unchanged and access continues until the processor's
    /// deletion event lands; `canceled_at` records when the cancellation
    /// was requested.
    ///
    /// # Errors
    ///
    /// Returns error if the subscription is already canceled.
    pub fn schedule_cancellation(&mut self) -> Result<(), DomainError> {
        if self.status == SubscriptionStatus::Canceled {
            return Err(DomainError::new(
                ErrorCode::SubscriptionCanceled,
                "Subscription is already canceled",
            ));
        }
        self.cancel_at_period_end = true;
        self.canceled_at = Some(Timestamp::now());
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Clear a scheduled cancellation (user changed their mind remotely).
    pub fn unschedule_cancellation(&mut self) {
        self.cancel_at_period_end = false;
        self.canceled_at = None;
        self.updated_at = Timestamp::now();
    }

    /// End the subscription now.
    ///
    /// # Errors
    ///
    /// Returns error if transition from current status is not allowed.
    pub fn cancel_now(&mut self) -> Result<(), DomainError> {
        self.transition_to(SubscriptionStatus::Canceled)?;
        if self.canceled_at.is_none() {
            self.canceled_at = Some(Timestamp::now());
        }
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Record a fresh observation of the provider's state.
    ///
    /// The drift sweep selects rows by `updated_at`; confirming a row
    /// matches the provider must push it out of the stale window even when
    /// nothing else changed.
    pub fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }

    /// Check whether this subscription currently grants plan access.
    pub fn has_access(&self) -> bool {
        self.status.grants_access()
    }

    /// Days remaining in the current period, 0 if it has ended.
    pub fn days_remaining(&self) -> u32 {
        let now = Timestamp::now();
        if now >= self.current_period_end {
            return 0;
        }

        let duration = self.current_period_end.duration_since(&now);
        duration.num_days().max(0) as u32
    }

    /// Apply new period boundaries only when they move forward.
    ///
    /// Redelivered or reordered webhooks may carry periods older than what
    /// is stored; those must never regress the row.
    fn update_periods_if_newer(&mut self, period_start: Timestamp, period_end: Timestamp) {
        if period_end.is_after(&self.current_period_end) {
            self.current_period_start = period_start;
            self.current_period_end = period_end;
        }
    }

    /// Transition to a new status using the state machine.
    fn transition_to(&mut self, target: SubscriptionStatus) -> Result<(), DomainError> {
        use crate::domain::foundation::StateMachine;

        self.status = self.status.transition_to(target).map_err(|_| {
            DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!(
                    "Cannot transition subscription from {:?} to {:?}",
                    self.status, target
                ),
            )
        })?;
        Ok(())
    }
}
