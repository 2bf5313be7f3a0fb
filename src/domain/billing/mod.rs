//! Billing domain module.
//!
//! Handles the subscription lifecycle driven by Stripe webhooks: plan
//! catalog, state transitions, idempotent event processing, and signature
//! verification.
//!
//! # Module Structure
//!
//! - `subscription` - Subscription aggregate entity
//! - `status` - SubscriptionStatus state machine
//! - `plan` - Plan definitions and catalog
//! - `events` - Domain events emitted by billing operations
//! - `errors` - Billing error types
//! - `stripe_event` - Stripe webhook event envelope
//! - `webhook_verifier` - HMAC signature verification
//! - `webhook_processor` - Idempotent event dispatch
//! - `webhook_errors` - Webhook processing errors

mod errors;
mod events;
mod plan;
mod status;
mod stripe_event;
mod subscription;
mod webhook_errors;
mod webhook_processor;
mod webhook_verifier;

pub use errors::BillingError;
pub use events::BillingEvent;
pub use plan::{Plan, PlanCatalog};
pub use status::SubscriptionStatus;
pub use stripe_event::{StripeEvent, StripeEventData, StripeEventType};
pub use subscription::Subscription;
pub use webhook_errors::WebhookError;
pub use webhook_processor::{
    IdempotentWebhookProcessor, WebhookDispatcher, WebhookEventHandler,
};
pub use webhook_verifier::{SignatureHeader, StripeWebhookVerifier};

#[cfg(test)]
pub use stripe_event::StripeEventBuilder;
#[cfg(test)]
pub use webhook_verifier::compute_test_signature;
