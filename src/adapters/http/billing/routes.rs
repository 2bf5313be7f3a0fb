//! HTTP routes for billing endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    cancel_subscription, create_checkout, get_balance, get_history, get_subscription, list_plans,
    stripe_webhook, BillingHandlers,
};

/// Creates the billing router, mounted under `/api/billing`.
pub fn billing_routes(handlers: BillingHandlers) -> Router {
    Router::new()
        .route("/subscription", get(get_subscription))
        .route("/credits", get(get_balance))
        .route("/credits/history", get(get_history))
        .route("/checkout", post(create_checkout))
        .route("/cancel", post(cancel_subscription))
        .route("/plans", get(list_plans))
        .with_state(handlers)
}

/// Creates the webhook router, mounted under `/api/webhooks`.
///
/// Kept separate from the billing routes: webhook deliveries are
/// authenticated by signature, not by gateway identity headers.
pub fn webhook_routes(handlers: BillingHandlers) -> Router {
    Router::new()
        .route("/stripe", post(stripe_webhook))
        .with_state(handlers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billing_routes_compile() {
        // This test just ensures the route definitions compile correctly
        // Actual HTTP testing would require integration tests
    }
}
