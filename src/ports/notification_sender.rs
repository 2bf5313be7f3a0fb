//! NotificationSender port - Interface for user-facing billing notifications.
//!
//! Billing events that users care about (welcome, payment outcomes, renewal
//! reminders) are handed to this port. Delivery is fire-and-forget from the
//! webhook pipeline's perspective: a notification failure is logged and
//! never fails the event that triggered it, since the billing state change
//! has already committed.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, UserId};

/// A user-facing billing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Subscription activated for the first time.
    Welcome { user_id: UserId, plan_name: String },

    /// A payment went through.
    PaymentSucceeded {
        user_id: UserId,
        amount_cents: i64,
        currency: String,
    },

    /// A payment attempt failed; the provider will retry.
    PaymentFailed {
        user_id: UserId,
        attempt_count: u32,
    },

    /// The next renewal charge is coming up.
    RenewalReminder {
        user_id: UserId,
        plan_name: String,
        days_until_renewal: u32,
    },
}

impl Notification {
    /// Stable kind name, used for routing and logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Welcome { .. } => "welcome",
            Notification::PaymentSucceeded { .. } => "payment_succeeded",
            Notification::PaymentFailed { .. } => "payment_failed",
            Notification::RenewalReminder { .. } => "renewal_reminder",
        }
    }

    /// The user this notification addresses.
    pub fn user_id(&self) -> &UserId {
        match self {
            Notification::Welcome { user_id, .. }
            | Notification::PaymentSucceeded { user_id, .. }
            | Notification::PaymentFailed { user_id, .. }
            | Notification::RenewalReminder { user_id, .. } => user_id,
        }
    }
}

/// Port for sending billing notifications.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Send a notification to its user.
    ///
    /// Callers treat failures as non-fatal; see the module docs.
    async fn send(&self, notification: Notification) -> Result<(), DomainError>;
}
