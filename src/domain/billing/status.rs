//! Subscription status state machine.
//!
//! Defines all possible subscription states and valid transitions
//! according to the billing lifecycle.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};

/// Subscription status.
///
/// Represents the current state of a user's subscription in the
/// payment lifecycle. Canceled is terminal: resubscribing creates
/// a fresh subscription rather than reviving the old row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Checkout started but first payment not yet confirmed.
    /// No credit grants until activation.
    Pending,

    /// Paid subscription in good standing.
    Active,

    /// A renewal charge failed; the processor is retrying.
    /// Access continues during the grace period.
    PastDue,

    /// Billing collection paused at the processor.
    /// No access and no credit grants until resumed.
    Paused,

    /// Subscription ended, either immediately or at period end.
    Canceled,
}

impl SubscriptionStatus {
    /// Returns true if this status grants access to plan features.
    ///
    /// Access is granted for:
    /// - Active: subscription in good standing
    /// - PastDue: grace period during payment retry
    ///
    /// Access is denied for:
    /// - Pending: awaiting first payment
    /// - Paused: collection stopped
    /// - Canceled: subscription over
    pub fn grants_access(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::PastDue
        )
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            // From PENDING
            (Pending, Active)
                | (Pending, Canceled)
            // From ACTIVE
                | (Active, Active) // Renewal
                | (Active, PastDue)
                | (Active, Paused)
                | (Active, Canceled)
            // From PAST_DUE
                | (PastDue, Active)
                | (PastDue, Canceled)
            // From PAUSED
                | (Paused, Active)
                | (Paused, Canceled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Pending => vec![Active, Canceled],
            Active => vec![Active, PastDue, Paused, Canceled],
            PastDue => vec![Active, Canceled],
            Paused => vec![Active, Canceled],
            Canceled => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Unit Tests - State Transitions

    #[test]
    fn pending_can_transition_to_active() {
        let status = SubscriptionStatus::Pending;
        assert!(status.can_transition_to(&SubscriptionStatus::Active));

        let result = status.transition_to(SubscriptionStatus::Active);
        assert_eq!(result, Ok(SubscriptionStatus::Active));
    }

    #[test]
    fn pending_can_transition_to_canceled() {
        let status = SubscriptionStatus::Pending;

        let result = status.transition_to(SubscriptionStatus::Canceled);
        assert_eq!(result, Ok(SubscriptionStatus::Canceled));
    }

    #[test]
    fn pending_cannot_transition_to_past_due() {
        let status = SubscriptionStatus::Pending;
        assert!(!status.can_transition_to(&SubscriptionStatus::PastDue));

        let result = status.transition_to(SubscriptionStatus::PastDue);
        assert!(result.is_err());
    }

    #[test]
    fn active_can_renew_to_active() {
        let status = SubscriptionStatus::Active;

        let result = status.transition_to(SubscriptionStatus::Active);
        assert_eq!(result, Ok(SubscriptionStatus::Active));
    }

    #[test]
    fn active_can_transition_to_past_due() {
        let status = SubscriptionStatus::Active;

        let result = status.transition_to(SubscriptionStatus::PastDue);
        assert_eq!(result, Ok(SubscriptionStatus::PastDue));
    }

    #[test]
    fn active_can_transition_to_paused() {
        let status = SubscriptionStatus::Active;

        let result = status.transition_to(SubscriptionStatus::Paused);
        assert_eq!(result, Ok(SubscriptionStatus::Paused));
    }

    #[test]
    fn active_can_transition_to_canceled() {
        let status = SubscriptionStatus::Active;

        let result = status.transition_to(SubscriptionStatus::Canceled);
        assert_eq!(result, Ok(SubscriptionStatus::Canceled));
    }

    #[test]
    fn past_due_can_recover_to_active() {
        let status = SubscriptionStatus::PastDue;

        let result = status.transition_to(SubscriptionStatus::Active);
        assert_eq!(result, Ok(SubscriptionStatus::Active));
    }

    #[test]
    fn past_due_can_transition_to_canceled() {
        let status = SubscriptionStatus::PastDue;

        let result = status.transition_to(SubscriptionStatus::Canceled);
        assert_eq!(result, Ok(SubscriptionStatus::Canceled));
    }

    #[test]
    fn past_due_cannot_pause() {
        let status = SubscriptionStatus::PastDue;
        assert!(!status.can_transition_to(&SubscriptionStatus::Paused));
    }

    #[test]
    fn paused_can_resume_to_active() {
        let status = SubscriptionStatus::Paused;

        let result = status.transition_to(SubscriptionStatus::Active);
        assert_eq!(result, Ok(SubscriptionStatus::Active));
    }

    #[test]
    fn paused_can_transition_to_canceled() {
        let status = SubscriptionStatus::Paused;

        let result = status.transition_to(SubscriptionStatus::Canceled);
        assert_eq!(result, Ok(SubscriptionStatus::Canceled));
    }

    #[test]
    fn canceled_is_terminal() {
        let status = SubscriptionStatus::Canceled;

        assert!(status.is_terminal());
        assert!(status.valid_transitions().is_empty());
        assert!(status.transition_to(SubscriptionStatus::Active).is_err());
        assert!(status.transition_to(SubscriptionStatus::Pending).is_err());
    }

    // Unit Tests - grants_access

    #[test]
    fn grants_access_true_for_active() {
        assert!(SubscriptionStatus::Active.grants_access());
    }

    #[test]
    fn grants_access_true_for_past_due_in_grace() {
        assert!(SubscriptionStatus::PastDue.grants_access());
    }

    #[test]
    fn grants_access_false_for_pending() {
        assert!(!SubscriptionStatus::Pending.grants_access());
    }

    #[test]
    fn grants_access_false_for_paused() {
        assert!(!SubscriptionStatus::Paused.grants_access());
    }

    #[test]
    fn grants_access_false_for_canceled() {
        assert!(!SubscriptionStatus::Canceled.grants_access());
    }

    // Additional validation tests

    #[test]
    fn valid_transitions_are_consistent_with_can_transition_to() {
        for status in [
            SubscriptionStatus::Pending,
            SubscriptionStatus::Active,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Paused,
            SubscriptionStatus::Canceled,
        ] {
            for valid_target in status.valid_transitions() {
                assert!(
                    status.can_transition_to(&valid_target),
                    "can_transition_to should return true for {:?} -> {:?}",
                    status,
                    valid_target
                );
            }
        }
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&SubscriptionStatus::PastDue).unwrap();
        assert_eq!(json, "\"past_due\"");

        let parsed: SubscriptionStatus = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(parsed, SubscriptionStatus::Paused);
    }
}
