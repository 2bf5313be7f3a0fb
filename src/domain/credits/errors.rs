//! Credit ledger error types.
//!
//! Errors raised while posting transactions to a user's credit ledger.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | InsufficientBalance | 402 |
//! | RefundExceedsUsage | 400 |
//! | LedgerConflict | 503 |
//! | Storage | 500 |

use crate::domain::foundation::{DomainError, ErrorCode};

/// Credit ledger errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditError {
    /// The debit would overdraw the user's available balance.
    InsufficientBalance {
        requested: i64,
        available: i64,
    },

    /// The refund would return more credits than were ever spent.
    RefundExceedsUsage {
        requested: i64,
        used: i64,
    },

    /// A concurrent writer updated the balance first.
    LedgerConflict(String),

    /// Storage operation failed.
    Storage(String),
}

impl CreditError {
    // Constructor functions for cleaner error creation

    pub fn insufficient_balance(requested: i64, available: i64) -> Self {
        CreditError::InsufficientBalance {
            requested,
            available,
        }
    }

    pub fn refund_exceeds_usage(requested: i64, used: i64) -> Self {
        CreditError::RefundExceedsUsage { requested, used }
    }

    pub fn ledger_conflict(message: impl Into<String>) -> Self {
        CreditError::LedgerConflict(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        CreditError::Storage(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            CreditError::InsufficientBalance { .. } => ErrorCode::InsufficientBalance,
            CreditError::RefundExceedsUsage { .. } => ErrorCode::RefundExceedsUsage,
            CreditError::LedgerConflict(_) => ErrorCode::LedgerConflict,
            CreditError::Storage(_) => ErrorCode::DatabaseError,
        }
    }

    /// Returns a user-friendly error message.
    pub fn message(&self) -> String {
        match self {
            CreditError::InsufficientBalance {
                requested,
                available,
            } => {
                format!(
                    "Insufficient credits: requested {}, available {}",
                    requested, available
                )
            }
            CreditError::RefundExceedsUsage { requested, used } => {
                format!(
                    "Refund of {} credits exceeds total usage of {}",
                    requested, used
                )
            }
            CreditError::LedgerConflict(msg) => format!("Ledger conflict: {}", msg),
            CreditError::Storage(msg) => format!("Error: {}", msg),
        }
    }

    /// Returns true if this error should trigger a retry.
    ///
    /// A lost optimistic-concurrency race leaves the ledger consistent,
    /// so the same request can be retried against the fresh balance.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CreditError::LedgerConflict(_) | CreditError::Storage(_)
        )
    }
}

impl std::fmt::Display for CreditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for CreditError {}

impl From<DomainError> for CreditError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::InsufficientBalance => CreditError::InsufficientBalance {
                requested: 0,
                available: 0,
            },
            ErrorCode::RefundExceedsUsage => CreditError::RefundExceedsUsage {
                requested: 0,
                used: 0,
            },
            ErrorCode::LedgerConflict => CreditError::LedgerConflict(err.to_string()),
            _ => CreditError::Storage(err.to_string()),
        }
    }
}

impl From<CreditError> for DomainError {
    fn from(err: CreditError) -> Self {
        DomainError::new(err.code(), err.message())
    }
}
