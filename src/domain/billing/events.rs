//! Domain events for the billing lifecycle.
//!
//! Events are published after state changes commit, so subscribers observe
//! facts rather than intentions. Consumers include the notification sender
//! and any future analytics sink.
//!
//! # Design Decisions
//!
//! - **Past tense names**: events record what happened, not commands
//! - **Flat payloads**: each variant carries exactly what subscribers need
//! - **`occurred_at` on every variant**: ordering survives transport delays

use crate::domain::foundation::{EventEnvelope, SubscriptionId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Events emitted by the billing module.
///
/// Serialized with an inline `type` tag so envelope payloads stay flat
/// for consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BillingEvent {
    /// Trigger: user started checkout and a pending subscription row exists.
    SubscriptionCreated {
        subscription_id: SubscriptionId,
        user_id: UserId,
        plan_code: String,
        occurred_at: Timestamp,
    },

    /// State transition: Pending -> Active (first payment confirmed).
    SubscriptionActivated {
        subscription_id: SubscriptionId,
        user_id: UserId,
        plan_code: String,
        period_end: Timestamp,
        occurred_at: Timestamp,
    },

    /// State transition: Active -> Active (new billing period).
    SubscriptionRenewed {
        subscription_id: SubscriptionId,
        user_id: UserId,
        period_end: Timestamp,
        occurred_at: Timestamp,
    },

    /// State transition: Active -> PastDue (renewal charge failed).
    PaymentFailed {
        subscription_id: SubscriptionId,
        user_id: UserId,
        attempt_count: u32,
        next_retry_at: Option<Timestamp>,
        occurred_at: Timestamp,
    },

    /// State transition: PastDue -> Active (retry succeeded).
    PaymentRecovered {
        subscription_id: SubscriptionId,
        user_id: UserId,
        occurred_at: Timestamp,
    },

    /// State transition: Active -> Paused (collection paused remotely).
    SubscriptionPaused {
        subscription_id: SubscriptionId,
        user_id: UserId,
        occurred_at: Timestamp,
    },

    /// State transition: Paused -> Active.
    SubscriptionResumed {
        subscription_id: SubscriptionId,
        user_id: UserId,
        occurred_at: Timestamp,
    },

    /// Trigger: user asked to cancel; access continues until `effective_at`.
    CancellationScheduled {
        subscription_id: SubscriptionId,
        user_id: UserId,
        effective_at: Timestamp,
        occurred_at: Timestamp,
    },

    /// State transition: any -> Canceled (terminal).
    SubscriptionCanceled {
        subscription_id: SubscriptionId,
        user_id: UserId,
        occurred_at: Timestamp,
    },

    /// Trigger: credits added to a ledger (grant, purchase, or bonus).
    CreditsGranted {
        user_id: UserId,
        credits: i64,
        balance_after: i64,
        description: String,
        occurred_at: Timestamp,
    },

    /// Trigger: credits deducted for usage.
    CreditsSpent {
        user_id: UserId,
        credits: i64,
        balance_after: i64,
        occurred_at: Timestamp,
    },

    /// Trigger: previously spent credits returned.
    CreditsRefunded {
        user_id: UserId,
        credits: i64,
        balance_after: i64,
        occurred_at: Timestamp,
    },
}

impl BillingEvent {
    /// Event type string for routing and logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SubscriptionCreated { .. } => "billing.subscription_created",
            Self::SubscriptionActivated { .. } => "billing.subscription_activated",
            Self::SubscriptionRenewed { .. } => "billing.subscription_renewed",
            Self::PaymentFailed { .. } => "billing.payment_failed",
            Self::PaymentRecovered { .. } => "billing.payment_recovered",
            Self::SubscriptionPaused { .. } => "billing.subscription_paused",
            Self::SubscriptionResumed { .. } => "billing.subscription_resumed",
            Self::CancellationScheduled { .. } => "billing.cancellation_scheduled",
            Self::SubscriptionCanceled { .. } => "billing.subscription_canceled",
            Self::CreditsGranted { .. } => "billing.credits_granted",
            Self::CreditsSpent { .. } => "billing.credits_spent",
            Self::CreditsRefunded { .. } => "billing.credits_refunded",
        }
    }

    /// The user this event concerns.
    pub fn user_id(&self) -> &UserId {
        match self {
            Self::SubscriptionCreated { user_id, .. }
            | Self::SubscriptionActivated { user_id, .. }
            | Self::SubscriptionRenewed { user_id, .. }
            | Self::PaymentFailed { user_id, .. }
            | Self::PaymentRecovered { user_id, .. }
            | Self::SubscriptionPaused { user_id, .. }
            | Self::SubscriptionResumed { user_id, .. }
            | Self::CancellationScheduled { user_id, .. }
            | Self::SubscriptionCanceled { user_id, .. }
            | Self::CreditsGranted { user_id, .. }
            | Self::CreditsSpent { user_id, .. }
            | Self::CreditsRefunded { user_id, .. } => user_id,
        }
    }

    /// The subscription this event concerns, if any.
    ///
    /// Credit ledger events are keyed by user only.
    pub fn subscription_id(&self) -> Option<&SubscriptionId> {
        match self {
            Self::SubscriptionCreated {
                subscription_id, ..
            }
            | Self::SubscriptionActivated {
                subscription_id, ..
            }
            | Self::SubscriptionRenewed {
                subscription_id, ..
            }
            | Self::PaymentFailed {
                subscription_id, ..
            }
            | Self::PaymentRecovered {
                subscription_id, ..
            }
            | Self::SubscriptionPaused {
                subscription_id, ..
            }
            | Self::SubscriptionResumed {
                subscription_id, ..
            }
            | Self::CancellationScheduled {
                subscription_id, ..
            }
            | Self::SubscriptionCanceled {
                subscription_id, ..
            } => Some(subscription_id),
            Self::CreditsGranted { .. }
            | Self::CreditsSpent { .. }
            | Self::CreditsRefunded { .. } => None,
        }
    }

    /// When the event occurred.
    pub fn occurred_at(&self) -> &Timestamp {
        match self {
            Self::SubscriptionCreated { occurred_at, .. }
            | Self::SubscriptionActivated { occurred_at, .. }
            | Self::SubscriptionRenewed { occurred_at, .. }
            | Self::PaymentFailed { occurred_at, .. }
            | Self::PaymentRecovered { occurred_at, .. }
            | Self::SubscriptionPaused { occurred_at, .. }
            | Self::SubscriptionResumed { occurred_at, .. }
            | Self::CancellationScheduled { occurred_at, .. }
            | Self::SubscriptionCanceled { occurred_at, .. }
            | Self::CreditsGranted { occurred_at, .. }
            | Self::CreditsSpent { occurred_at, .. }
            | Self::CreditsRefunded { occurred_at, .. } => occurred_at,
        }
    }

    /// Wrap this event in a transport envelope for publishing.
    ///
    /// Subscription lifecycle events are addressed to their Subscription
    /// aggregate; credit events to the user's CreditBalance.
    pub fn to_envelope(&self) -> EventEnvelope {
        let payload = serde_json::to_value(self).unwrap_or_default();
        let (aggregate_id, aggregate_type) = match self.subscription_id() {
            Some(id) => (id.to_string(), "Subscription"),
            None => (self.user_id().to_string(), "CreditBalance"),
        };

        EventEnvelope::new(self.event_type(), aggregate_id, aggregate_type, payload)
            .with_user_id(self.user_id().to_string())
    }
}
