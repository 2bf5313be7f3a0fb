//! Application handlers.
//!
//! Command and webhook handlers that orchestrate domain operations.

pub mod billing;
