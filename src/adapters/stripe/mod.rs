//! Stripe payment gateway adapter.
//!
//! Implements the `PaymentGateway` port for Stripe integration:
//! - Hosted checkout session creation
//! - Subscription cancellation
//! - Subscription reads for the drift sweep
//!
//! Webhook signature verification lives in the billing domain
//! (`WebhookVerifier`); this module only covers calls INTO Stripe.
//!
//! # Configuration
//!
//! Required environment variables:
//! - `CLIPMINT_PAYMENT__SECRET_KEY`: Stripe secret API key (sk_...)
//! - `CLIPMINT_PAYMENT__WEBHOOK_SECRET`: Webhook signing secret (whsec_...)

mod gateway;
mod mock_gateway;

pub use gateway::{StripeConfig, StripeGateway};
pub use mock_gateway::{MethodCall, MockPaymentGateway};
