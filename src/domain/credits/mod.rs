//! Credits domain module.
//!
//! Tracks plan-granted and purchased credits per user, with an append-only
//! transaction ledger behind every balance change.
//!
//! # Module Structure
//!
//! - `balance` - CreditBalance aggregate with pure apply semantics
//! - `transaction` - CreditTransaction ledger rows and typed requests
//! - `errors` - CreditError taxonomy

mod balance;
mod errors;
mod transaction;

pub use balance::CreditBalance;
pub use errors::CreditError;
pub use transaction::{
    CreditTransaction, NewCreditTransaction, TransactionType, MAX_CREDITS_PER_TRANSACTION,
};
