//! ClipMint billing - subscription state and credit ledger service
//!
//! This crate keeps local subscription state and credit balances consistent
//! with the payment provider by processing signed webhooks exactly once and
//! reconciling drift in the background.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
