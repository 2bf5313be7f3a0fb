//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, enums, errors)
//! - `billing` - Subscription lifecycle and webhook processing
//! - `credits` - Credit ledger and balance accounting

pub mod billing;
pub mod credits;
pub mod foundation;
