//! HTTP adapter for billing endpoints.

mod dto;
mod handlers;
mod routes;

pub use dto::{
    BalanceResponse, CancelRequest, CancelResponse, CheckoutRequest, CheckoutResponse,
    ErrorResponse, HistoryParams, HistoryResponse, PlanResponse, PlansResponse,
    SubscriptionResponse, TransactionResponse, WebhookAck,
};
pub use handlers::{health, BillingHandlers};
pub use routes::{billing_routes, webhook_routes};
