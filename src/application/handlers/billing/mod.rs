//! Billing handlers.
//!
//! Webhook event handlers and command handlers for the billing surface:
//!
//! ## Webhook handlers
//! - Completed checkout sessions (subscription start, credit pack purchase)
//! - Paid and failed invoices
//! - Upcoming renewal notices
//! - Subscription lifecycle snapshots (updated/deleted/paused/resumed and
//!   the drift sweep's synthesized repair events)
//!
//! ## Commands
//! - Starting checkout and canceling subscriptions
//! - Spending and refunding credits
//! - Handling a raw webhook delivery end to end

mod cancel_subscription;
mod checkout_completed;
mod create_checkout;
mod dispatcher;
mod grants;
mod handle_gateway_webhook;
mod invoice_payment_failed;
mod invoice_payment_succeeded;
mod invoice_upcoming;
mod payloads;
mod refund_credits;
mod spend_credits;
mod subscription_lifecycle;

// Webhook handlers
pub use checkout_completed::CheckoutCompletedHandler;
pub use dispatcher::BillingEventDispatcher;
pub use invoice_payment_failed::InvoicePaymentFailedHandler;
pub use invoice_payment_succeeded::InvoicePaymentSucceededHandler;
pub use invoice_upcoming::InvoiceUpcomingHandler;
pub use subscription_lifecycle::SubscriptionLifecycleHandler;

// Shared grant policy
pub use grants::CreditGrants;

// Commands
pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
};
pub use create_checkout::{CreateCheckoutCommand, CreateCheckoutHandler, CreateCheckoutResult};
pub use handle_gateway_webhook::{
    HandleGatewayWebhookCommand, HandleGatewayWebhookHandler, HandleGatewayWebhookResult,
};
pub use refund_credits::{RefundCreditsCommand, RefundCreditsHandler, RefundCreditsResult};
pub use spend_credits::{SpendCreditsCommand, SpendCreditsHandler, SpendCreditsResult};
