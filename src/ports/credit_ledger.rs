//! CreditLedger port - Interface for posting credit transactions.
//!
//! The ledger is the single write path for user credit balances. Handlers
//! never mutate a balance directly; they build a validated
//! [`NewCreditTransaction`] and ask the ledger to apply it.
//!
//! ## Ledger Contract
//!
//! Implementations must guarantee, per application:
//!
//! - **Atomicity**: the transaction row and the balance update commit
//!   together or not at all
//! - **Serialization**: concurrent applies for the same user are ordered;
//!   two spends cannot both read the same balance snapshot
//! - **Idempotency**: a duplicate `(user_id, idempotency_key)` pair returns
//!   the original row's receipt instead of posting twice
//! - **No overdraft**: a usage that exceeds the available balance is
//!   rejected with `InsufficientBalance` and leaves no row behind
//! - **Refund cap**: a refund must reference the usage transaction it
//!   reverses (via `reference`) and is rejected with `RefundExceedsUsage`
//!   once refunds for that usage would exceed what the usage spent

use async_trait::async_trait;

use crate::domain::credits::{CreditBalance, CreditTransaction, NewCreditTransaction};
use crate::domain::foundation::{DomainError, TransactionId, UserId};

/// Whether an apply posted a new row or hit an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// A new transaction row was posted.
    Applied,
    /// The idempotency key was already posted; no new row.
    Deduplicated,
}

/// Receipt returned from applying a transaction request.
///
/// For deduplicated applies the receipt carries the ORIGINAL row's id and
/// the balance as of that row, so retried operations observe the same
/// result as the first attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerReceipt {
    /// Id of the posted (or previously posted) transaction row.
    pub transaction_id: TransactionId,

    /// Available balance after the row.
    pub balance_after: i64,

    /// Whether this apply posted a new row.
    pub outcome: LedgerOutcome,
}

impl LedgerReceipt {
    /// Receipt for a freshly posted row.
    pub fn applied(row: &CreditTransaction) -> Self {
        Self {
            transaction_id: row.id,
            balance_after: row.balance_after,
            outcome: LedgerOutcome::Applied,
        }
    }

    /// Receipt for a duplicate idempotency key, echoing the original row.
    pub fn deduplicated(row: &CreditTransaction) -> Self {
        Self {
            transaction_id: row.id,
            balance_after: row.balance_after,
            outcome: LedgerOutcome::Deduplicated,
        }
    }

    /// True if this apply posted a new row.
    pub fn was_applied(&self) -> bool {
        self.outcome == LedgerOutcome::Applied
    }
}

/// Port for the credit ledger.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Apply a transaction request to the user's balance.
    ///
    /// # Errors
    ///
    /// - `InsufficientBalance` if a usage exceeds the available balance
    /// - `ValidationFailed` if a refund carries no usage reference
    /// - `TransactionNotFound` if a refund references a missing usage row
    /// - `RefundExceedsUsage` if a refund would exceed the referenced usage
    /// - `LedgerConflict` if a concurrent apply must be retried
    /// - `DatabaseError` on persistence failure
    async fn apply(&self, request: NewCreditTransaction) -> Result<LedgerReceipt, DomainError>;

    /// Current balance for a user.
    ///
    /// Users without any ledger activity have a zero balance.
    async fn balance(&self, user_id: &UserId) -> Result<CreditBalance, DomainError>;

    /// Transaction history for a user, newest first.
    async fn history(
        &self,
        user_id: &UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<CreditTransaction>, DomainError>;

    /// Look up a posted transaction by its idempotency key.
    ///
    /// Returns `None` if the key has not been posted for this user.
    async fn find_by_idempotency_key(
        &self,
        user_id: &UserId,
        idempotency_key: &str,
    ) -> Result<Option<CreditTransaction>, DomainError>;
}
