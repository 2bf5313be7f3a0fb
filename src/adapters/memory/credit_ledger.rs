//! In-memory implementation of the credit ledger.
//!
//! Honors the full ledger contract: idempotent applies, overdraft rejection,
//! and the refund cap, all delegated to the same domain arithmetic the
//! Postgres ledger uses. A single mutex stands in for the per-user row lock,
//! serializing every apply.
//!
//! # Security Note
//!
//! This adapter is for tests and local development runs only. Nothing is
//! persisted and the whole ledger vanishes with the process.

use crate::domain::credits::{
    CreditBalance, CreditTransaction, NewCreditTransaction, TransactionType,
};
use crate::domain::foundation::{DomainError, ErrorCode, TransactionId, UserId};
use crate::ports::{CreditLedger, LedgerReceipt};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<String, CreditBalance>,
    transactions: Vec<CreditTransaction>,
}

/// In-memory implementation of [`CreditLedger`].
#[derive(Debug, Default)]
pub struct InMemoryCreditLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryCreditLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of posted transaction rows (test helper).
    pub fn transaction_count(&self) -> usize {
        self.state
            .lock()
            .expect("InMemoryCreditLedger: state lock poisoned")
            .transactions
            .len()
    }

    /// Remove all balances and rows (test helper).
    pub fn clear(&self) {
        let mut state = self
            .state
            .lock()
            .expect("InMemoryCreditLedger: state lock poisoned");
        state.balances.clear();
        state.transactions.clear();
    }

    /// Validate a refund against the usage row it references.
    ///
    /// Mirrors the Postgres ledger: the referenced transaction must exist,
    /// belong to the same user, and be a usage debit, and the sum of refunds
    /// already posted against it plus this one must not exceed the original
    /// debit.
    fn check_refund_reference(
        state: &LedgerState,
        request: &NewCreditTransaction,
    ) -> Result<(), DomainError> {
        let reference = request.reference.as_deref().ok_or_else(|| {
            DomainError::new(
                ErrorCode::ValidationFailed,
                "Refund requires a reference to the usage transaction being refunded",
            )
        })?;

        let usage_id: TransactionId = reference.parse().map_err(|_| {
            DomainError::new(
                ErrorCode::ValidationFailed,
                format!("Refund reference is not a transaction id: {}", reference),
            )
        })?;

        let usage = state
            .transactions
            .iter()
            .find(|row| row.id == usage_id)
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::TransactionNotFound,
                    format!("Referenced usage transaction not found: {}", usage_id),
                )
            })?;

        if usage.user_id != request.user_id || usage.transaction_type != TransactionType::Usage {
            return Err(DomainError::new(
                ErrorCode::ValidationFailed,
                "Refund must reference a usage transaction belonging to the same user",
            ));
        }

        let already_refunded: i64 = state
            .transactions
            .iter()
            .filter(|row| {
                row.user_id == request.user_id
                    && row.transaction_type == TransactionType::Refund
                    && row.reference.as_deref() == Some(reference)
            })
            .map(|row| row.amount)
            .sum();

        // Usage rows carry a negative amount; refunds are positive.
        let refundable = -usage.amount - already_refunded;
        if request.credits > refundable {
            return Err(DomainError::new(
                ErrorCode::RefundExceedsUsage,
                format!(
                    "Refund of {} credits exceeds the {} still refundable on transaction {}",
                    request.credits, refundable, usage_id
                ),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl CreditLedger for InMemoryCreditLedger {
    async fn apply(&self, request: NewCreditTransaction) -> Result<LedgerReceipt, DomainError> {
        let mut state = self
            .state
            .lock()
            .expect("InMemoryCreditLedger: state lock poisoned");

        // Retried business operation: hand back the original row untouched.
        let existing = state.transactions.iter().find(|row| {
            row.user_id == request.user_id && row.idempotency_key == request.idempotency_key
        });
        if let Some(original) = existing {
            return Ok(LedgerReceipt::deduplicated(original));
        }

        if request.transaction_type == TransactionType::Refund {
            Self::check_refund_reference(&state, &request)?;
        }

        let balance = state
            .balances
            .get(request.user_id.as_str())
            .cloned()
            .unwrap_or_else(|| CreditBalance::new(request.user_id.clone()));

        let updated = balance.apply(request.transaction_type, request.credits)?;
        let record = CreditTransaction::record(&request, balance.available(), updated.available());
        let receipt = LedgerReceipt::applied(&record);

        state
            .balances
            .insert(request.user_id.as_str().to_string(), updated);
        state.transactions.push(record);

        Ok(receipt)
    }

    async fn balance(&self, user_id: &UserId) -> Result<CreditBalance, DomainError> {
        let state = self
            .state
            .lock()
            .expect("InMemoryCreditLedger: state lock poisoned");
        let balance = state
            .balances
            .get(user_id.as_str())
            .cloned()
            .unwrap_or_else(|| CreditBalance::new(user_id.clone()));
        Ok(balance)
    }

    async fn history(
        &self,
        user_id: &UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<CreditTransaction>, DomainError> {
        let state = self
            .state
            .lock()
            .expect("InMemoryCreditLedger: state lock poisoned");
        let rows = state
            .transactions
            .iter()
            .filter(|row| &row.user_id == user_id)
            .rev()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn find_by_idempotency_key(
        &self,
        user_id: &UserId,
        idempotency_key: &str,
    ) -> Result<Option<CreditTransaction>, DomainError> {
        let state = self
            .state
            .lock()
            .expect("InMemoryCreditLedger: state lock poisoned");
        let found = state
            .transactions
            .iter()
            .find(|row| &row.user_id == user_id && row.idempotency_key == idempotency_key)
            .cloned();
        Ok(found)
    }
}
