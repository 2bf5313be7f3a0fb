//! Credit balance aggregate.
//!
//! Tracks a user's lifetime granted and spent credits. Balances are created
//! lazily on first grant; a user with no row simply has zero credits.
//!
//! # Invariants
//!
//! - `available() = total_credits - used_credits`
//! - `available() >= 0` (debits never overdraw)
//! - `used_credits >= 0` (refunds never exceed usage)

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, UserId};

use super::errors::CreditError;
use super::transaction::TransactionType;

/// A user's credit balance.
///
/// Mutation happens through [`CreditBalance::apply`], a pure function of the
/// current balance and one transaction. The caller persists the returned
/// balance together with the transaction row in a single unit of work, which
/// keeps the ledger replayable: folding a user's transactions in order over
/// an empty balance reproduces the stored snapshots exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBalance {
    /// The user this balance belongs to.
    pub user_id: UserId,

    /// Lifetime credits granted (purchases, bonuses, plan allotments).
    pub total_credits: i64,

    /// Lifetime credits spent, net of refunds.
    pub used_credits: i64,

    /// Optimistic concurrency version, bumped on every apply.
    pub version: i64,

    /// When the balance row was created.
    pub created_at: Timestamp,

    /// When the balance was last updated.
    pub updated_at: Timestamp,
}

impl CreditBalance {
    /// Create an empty balance for a user.
    pub fn new(user_id: UserId) -> Self {
        let now = Timestamp::now();
        Self {
            user_id,
            total_credits: 0,
            used_credits: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Credits currently available to spend.
    pub fn available(&self) -> i64 {
        self.total_credits - self.used_credits
    }

    /// Returns true if the user can afford a debit of `credits`.
    pub fn can_spend(&self, credits: i64) -> bool {
        credits <= self.available()
    }

    /// Apply one transaction, returning the updated balance.
    ///
    /// `credits` is a positive magnitude; the direction comes from the
    /// transaction type. The input balance is untouched on error.
    ///
    /// # Errors
    ///
    /// - `InsufficientBalance` if a usage debit exceeds the available balance
    /// - `RefundExceedsUsage` if a refund exceeds lifetime net usage
    pub fn apply(
        &self,
        transaction_type: TransactionType,
        credits: i64,
    ) -> Result<Self, CreditError> {
        let mut next = self.clone();

        match transaction_type {
            TransactionType::Purchase | TransactionType::Bonus => {
                next.total_credits += credits;
            }
            TransactionType::Usage => {
                if !self.can_spend(credits) {
                    return Err(CreditError::insufficient_balance(credits, self.available()));
                }
                next.used_credits += credits;
            }
            TransactionType::Refund => {
                if credits > self.used_credits {
                    return Err(CreditError::refund_exceeds_usage(credits, self.used_credits));
                }
                next.used_credits -= credits;
            }
        }

        next.version += 1;
        next.updated_at = Timestamp::now();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_user_id() -> UserId {
        UserId::new("user-123").unwrap()
    }

    // ============================================================
    // Construction Tests
    // ============================================================

    #[test]
    fn new_balance_starts_empty() {
        let balance = CreditBalance::new(test_user_id());

        assert_eq!(balance.total_credits, 0);
        assert_eq!(balance.used_credits, 0);
        assert_eq!(balance.available(), 0);
        assert_eq!(balance.version, 0);
    }

    // ============================================================
    // Credit Tests
    // ============================================================

    #[test]
    fn purchase_increases_available() {
        let balance = CreditBalance::new(test_user_id());

        let next = balance.apply(TransactionType::Purchase, 200).unwrap();

        assert_eq!(next.total_credits, 200);
        assert_eq!(next.available(), 200);
        assert_eq!(next.version, 1);
    }

    #[test]
    fn bonus_increases_available() {
        let balance = CreditBalance::new(test_user_id());

        let next = balance.apply(TransactionType::Bonus, 3).unwrap();

        assert_eq!(next.available(), 3);
    }

    // ============================================================
    // Debit Tests
    // ============================================================

    #[test]
    fn usage_decreases_available() {
        let balance = CreditBalance::new(test_user_id())
            .apply(TransactionType::Bonus, 3)
            .unwrap();

        let next = balance.apply(TransactionType::Usage, 2).unwrap();

        assert_eq!(next.used_credits, 2);
        assert_eq!(next.available(), 1);
    }

    #[test]
    fn usage_beyond_available_is_rejected() {
        let balance = CreditBalance::new(test_user_id())
            .apply(TransactionType::Bonus, 3)
            .unwrap();

        let result = balance.apply(TransactionType::Usage, 4);

        assert_eq!(
            result,
            Err(CreditError::insufficient_balance(4, 3)),
        );
        // Input balance is untouched
        assert_eq!(balance.available(), 3);
    }

    #[test]
    fn usage_of_exact_balance_reaches_zero() {
        let balance = CreditBalance::new(test_user_id())
            .apply(TransactionType::Purchase, 5)
            .unwrap();

        let next = balance.apply(TransactionType::Usage, 5).unwrap();

        assert_eq!(next.available(), 0);
    }

    #[test]
    fn usage_on_empty_balance_is_rejected() {
        let balance = CreditBalance::new(test_user_id());

        let result = balance.apply(TransactionType::Usage, 1);

        assert_eq!(result, Err(CreditError::insufficient_balance(1, 0)));
    }

    // ============================================================
    // Refund Tests
    // ============================================================

    #[test]
    fn refund_restores_spent_credits() {
        let balance = CreditBalance::new(test_user_id())
            .apply(TransactionType::Purchase, 10)
            .unwrap()
            .apply(TransactionType::Usage, 4)
            .unwrap();

        let next = balance.apply(TransactionType::Refund, 3).unwrap();

        assert_eq!(next.used_credits, 1);
        assert_eq!(next.available(), 9);
    }

    #[test]
    fn refund_beyond_usage_is_rejected() {
        let balance = CreditBalance::new(test_user_id())
            .apply(TransactionType::Purchase, 10)
            .unwrap()
            .apply(TransactionType::Usage, 2)
            .unwrap();

        let result = balance.apply(TransactionType::Refund, 3);

        assert_eq!(result, Err(CreditError::refund_exceeds_usage(3, 2)));
    }

    #[test]
    fn refund_with_no_usage_is_rejected() {
        let balance = CreditBalance::new(test_user_id())
            .apply(TransactionType::Purchase, 10)
            .unwrap();

        let result = balance.apply(TransactionType::Refund, 1);

        assert_eq!(result, Err(CreditError::refund_exceeds_usage(1, 0)));
    }

    // ============================================================
    // Version Tests
    // ============================================================

    #[test]
    fn every_apply_bumps_version() {
        let balance = CreditBalance::new(test_user_id())
            .apply(TransactionType::Bonus, 5)
            .unwrap()
            .apply(TransactionType::Usage, 1)
            .unwrap()
            .apply(TransactionType::Refund, 1)
            .unwrap();

        assert_eq!(balance.version, 3);
    }

    #[test]
    fn failed_apply_does_not_bump_version() {
        let balance = CreditBalance::new(test_user_id());

        let _ = balance.apply(TransactionType::Usage, 1);

        assert_eq!(balance.version, 0);
    }

    // ============================================================
    // Replay Property
    // ============================================================

    fn transaction_type_from(kind: u8) -> TransactionType {
        match kind % 4 {
            0 => TransactionType::Purchase,
            1 => TransactionType::Usage,
            2 => TransactionType::Refund,
            _ => TransactionType::Bonus,
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// Folding the accepted transactions in order over an empty balance
        /// reproduces every intermediate available-balance snapshot, and the
        /// balance invariants hold at every step.
        #[test]
        fn replaying_accepted_transactions_reproduces_snapshots(
            ops in prop::collection::vec((any::<u8>(), 1..500i64), 0..40)
        ) {
            let user_id = UserId::new("user-prop").unwrap();
            let mut balance = CreditBalance::new(user_id.clone());
            let mut accepted = Vec::new();
            let mut snapshots = Vec::new();

            for (kind, credits) in ops {
                let tx_type = transaction_type_from(kind);
                if let Ok(next) = balance.apply(tx_type, credits) {
                    accepted.push((tx_type, credits));
                    snapshots.push(next.available());
                    balance = next;
                }
                prop_assert!(balance.available() >= 0);
                prop_assert!(balance.used_credits >= 0);
                prop_assert!(balance.total_credits >= 0);
            }

            let mut replayed = CreditBalance::new(user_id);
            for (i, (tx_type, credits)) in accepted.iter().enumerate() {
                let next = replayed.apply(*tx_type, *credits);
                prop_assert!(next.is_ok(), "replay rejected accepted transaction {}", i);
                replayed = next.unwrap();
                prop_assert_eq!(replayed.available(), snapshots[i]);
            }

            prop_assert_eq!(replayed.total_credits, balance.total_credits);
            prop_assert_eq!(replayed.used_credits, balance.used_credits);
            prop_assert_eq!(replayed.version, balance.version);
        }
    }
}
