//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `events` - Event publishers (capture bus for tests, tracing for prod)
//! - `http` - Axum route handlers and middleware
//! - `memory` - In-memory persistence adapters (tests, local runs)
//! - `notifications` - Notification senders
//! - `postgres` - PostgreSQL persistence adapters
//! - `stripe` - Stripe payment gateway client and mock

pub mod events;
pub mod http;
pub mod memory;
pub mod notifications;
pub mod postgres;
pub mod stripe;
