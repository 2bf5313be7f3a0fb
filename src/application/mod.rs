//! Application layer - commands, webhook handling, and the drift sweep.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Webhook handlers apply provider events; command handlers serve the HTTP
//! surface; the reconciler repairs rows the webhooks missed.

pub mod handlers;
pub mod reconciler;

pub use handlers::billing::{
    // Commands
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
    CreateCheckoutCommand, CreateCheckoutHandler, CreateCheckoutResult,
    HandleGatewayWebhookCommand, HandleGatewayWebhookHandler, HandleGatewayWebhookResult,
    RefundCreditsCommand, RefundCreditsHandler, RefundCreditsResult,
    SpendCreditsCommand, SpendCreditsHandler, SpendCreditsResult,
};
pub use reconciler::{ReconcileSummary, Reconciler, ReconcilerConfig};
