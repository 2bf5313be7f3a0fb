//! State machine trait for status enums.
//!
//! Provides a consistent interface for validating and performing state
//! transitions on lifecycle statuses (subscriptions, invoices, ...).

use super::ValidationError;

/// Trait for status enums that represent state machines.
///
/// Implementors define valid state transitions and get validated
/// transition methods for free.
///
/// # Example
///
/// ```ignore
/// impl StateMachine for SubscriptionStatus {
///     fn can_transition_to(&self, target: &Self) -> bool {
///         matches!(
///             (self, target),
///             (Pending, Active) |
///             (Active, PastDue) |
///             // ... etc
///         )
///     }
///
///     fn valid_transitions(&self) -> Vec<Self> {
///         match self {
///             Pending => vec![Active, Canceled],
///             Active => vec![PastDue, Paused, Canceled],
///             // ... etc
///         }
///     }
/// }
///
/// // Usage:
/// let new_status = current_status.transition_to(SubscriptionStatus::Active)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns all valid target states from current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs transition with validation, returning error if invalid.
    ///
    /// This is the preferred way to change state, as it ensures
    /// the transition is valid according to the state machine rules.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// Checks if current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test enum for StateMachine trait
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TestInvoiceStatus {
        Draft,
        Open,
        Paid,
        Void,
    }

    impl StateMachine for TestInvoiceStatus {
        fn can_transition_to(&self, target: &Self) -> bool {
            use TestInvoiceStatus::*;
            matches!(
                (self, target),
                (Draft, Open) | (Open, Paid) | (Open, Void) | (Draft, Void)
            )
        }

        fn valid_transitions(&self) -> Vec<Self> {
            use TestInvoiceStatus::*;
            match self {
                Draft => vec![Open, Void],
                Open => vec![Paid, Void],
                Paid => vec![],
                Void => vec![],
            }
        }
    }

    #[test]
    fn transition_to_succeeds_for_valid_transition() {
        let status = TestInvoiceStatus::Draft;
        let result = status.transition_to(TestInvoiceStatus::Open);
        assert_eq!(result, Ok(TestInvoiceStatus::Open));
    }

    #[test]
    fn transition_to_fails_for_invalid_transition() {
        let status = TestInvoiceStatus::Draft;
        let result = status.transition_to(TestInvoiceStatus::Paid);
        assert!(result.is_err());
    }

    #[test]
    fn is_terminal_returns_true_for_settled_states() {
        assert!(TestInvoiceStatus::Paid.is_terminal());
        assert!(TestInvoiceStatus::Void.is_terminal());
    }

    #[test]
    fn is_terminal_returns_false_for_non_terminal() {
        assert!(!TestInvoiceStatus::Draft.is_terminal());
        assert!(!TestInvoiceStatus::Open.is_terminal());
    }

    #[test]
    fn valid_transitions_returns_correct_targets() {
        assert_eq!(
            TestInvoiceStatus::Draft.valid_transitions(),
            vec![TestInvoiceStatus::Open, TestInvoiceStatus::Void]
        );
        assert_eq!(
            TestInvoiceStatus::Open.valid_transitions(),
            vec![TestInvoiceStatus::Paid, TestInvoiceStatus::Void]
        );
        assert_eq!(TestInvoiceStatus::Paid.valid_transitions(), vec![]);
    }

    #[test]
    fn can_transition_to_is_consistent_with_valid_transitions() {
        for status in [
            TestInvoiceStatus::Draft,
            TestInvoiceStatus::Open,
            TestInvoiceStatus::Paid,
            TestInvoiceStatus::Void,
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
}
