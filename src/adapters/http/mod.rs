//! HTTP adapters - REST API implementations.
//!
//! The billing module exposes the REST endpoints; middleware holds the
//! identity extractor they share.

pub mod billing;
pub mod middleware;

// Re-export key types for convenience
pub use billing::{billing_routes, webhook_routes, BillingHandlers};
pub use middleware::{AuthenticatedUser, RequireAuth};
