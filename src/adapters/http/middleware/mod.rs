//! HTTP middleware for axum.
//!
//! This module contains extractors for cross-cutting concerns:
//!
//! - `auth` - Gateway-forwarded identity extraction

pub mod auth;

pub use auth::{AuthRejection, AuthenticatedUser, RequireAuth};
