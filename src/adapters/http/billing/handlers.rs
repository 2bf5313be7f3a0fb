//! HTTP handlers for billing endpoints.
//!
//! Read endpoints go straight to the repositories; commands go through
//! their application handlers. The webhook endpoint is special: its
//! status code is a protocol signal. 2xx stops the provider's
//! redelivery, 4xx rejects the delivery for good, and 5xx asks the
//! provider to try again later.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::adapters::http::middleware::RequireAuth;
use crate::application::handlers::billing::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CreateCheckoutCommand,
    CreateCheckoutHandler, HandleGatewayWebhookCommand, HandleGatewayWebhookHandler,
};
use crate::domain::billing::{BillingError, PlanCatalog, WebhookError};
use crate::domain::foundation::DomainError;
use crate::ports::{CreditLedger, SubscriptionRepository};

use super::dto::{
    BalanceResponse, CancelRequest, CancelResponse, CheckoutRequest, CheckoutResponse,
    ErrorResponse, HistoryParams, HistoryResponse, PlanResponse, PlansResponse,
    SubscriptionResponse, WebhookAck,
};

/// Hard cap on the history page size.
const MAX_HISTORY_LIMIT: u32 = 200;

/// Default history page size when the client does not ask for one.
const DEFAULT_HISTORY_LIMIT: u32 = 50;

// ════════════════════════════════════════════════════════════════════════════
// Handler state
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct BillingHandlers {
    webhook_handler: Arc<HandleGatewayWebhookHandler>,
    checkout_handler: Arc<CreateCheckoutHandler>,
    cancel_handler: Arc<CancelSubscriptionHandler>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    ledger: Arc<dyn CreditLedger>,
    catalog: PlanCatalog,
}

impl BillingHandlers {
    pub fn new(
        webhook_handler: Arc<HandleGatewayWebhookHandler>,
        checkout_handler: Arc<CreateCheckoutHandler>,
        cancel_handler: Arc<CancelSubscriptionHandler>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        ledger: Arc<dyn CreditLedger>,
        catalog: PlanCatalog,
    ) -> Self {
        Self {
            webhook_handler,
            checkout_handler,
            cancel_handler,
            subscriptions,
            ledger,
            catalog,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Webhook endpoint
// ════════════════════════════════════════════════════════════════════════════

/// POST /api/webhooks/stripe - Receive one webhook delivery
///
/// The body must stay raw bytes; the signature covers them exactly as
/// sent. Parked deliveries are acknowledged with 200 like processed
/// ones, because redelivering them would not help - replay belongs to
/// the reconciler.
pub async fn stripe_webhook(
    State(handlers): State<BillingHandlers>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = match headers.get("Stripe-Signature").and_then(|v| v.to_str().ok()) {
        Some(signature) => signature.to_string(),
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::bad_request("Missing Stripe-Signature header")),
            )
                .into_response();
        }
    };

    let command = HandleGatewayWebhookCommand {
        payload: body.to_vec(),
        signature,
    };

    match handlers.webhook_handler.handle(command).await {
        Ok(_) => (StatusCode::OK, Json(WebhookAck { received: true })).into_response(),
        Err(e) => handle_webhook_error(e),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Read endpoints
// ════════════════════════════════════════════════════════════════════════════

/// GET /api/billing/subscription - The caller's subscription
pub async fn get_subscription(
    State(handlers): State<BillingHandlers>,
    RequireAuth(user): RequireAuth,
) -> Response {
    match handlers.subscriptions.find_by_user_id(&user.user_id).await {
        Ok(Some(subscription)) => {
            let response: SubscriptionResponse = subscription.into();
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::not_found("Subscription", user.user_id.as_str())),
        )
            .into_response(),
        Err(e) => handle_billing_error(e.into()),
    }
}

/// GET /api/billing/credits - The caller's credit balance
pub async fn get_balance(
    State(handlers): State<BillingHandlers>,
    RequireAuth(user): RequireAuth,
) -> Response {
    match handlers.ledger.balance(&user.user_id).await {
        Ok(balance) => {
            let response: BalanceResponse = balance.into();
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => handle_ledger_error(e),
    }
}

/// GET /api/billing/credits/history - Ledger entries, newest first
pub async fn get_history(
    State(handlers): State<BillingHandlers>,
    RequireAuth(user): RequireAuth,
    Query(params): Query<HistoryParams>,
) -> Response {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    let offset = params.offset.unwrap_or(0);

    match handlers.ledger.history(&user.user_id, limit, offset).await {
        Ok(transactions) => {
            let response = HistoryResponse {
                transactions: transactions.into_iter().map(Into::into).collect(),
                limit,
                offset,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => handle_ledger_error(e),
    }
}

/// GET /api/billing/plans - Purchasable plans
pub async fn list_plans(State(handlers): State<BillingHandlers>) -> Response {
    let response = PlansResponse {
        plans: handlers.catalog.plans().iter().map(PlanResponse::from).collect(),
    };
    (StatusCode::OK, Json(response)).into_response()
}

// ════════════════════════════════════════════════════════════════════════════
// Command endpoints
// ════════════════════════════════════════════════════════════════════════════

/// POST /api/billing/checkout - Start hosted checkout for a plan
pub async fn create_checkout(
    State(handlers): State<BillingHandlers>,
    RequireAuth(user): RequireAuth,
    Json(req): Json<CheckoutRequest>,
) -> Response {
    // The gateway forwards the account email; checkout cannot prefill
    // the hosted page without one.
    let email = match user.email {
        Some(email) => email,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::bad_request(
                    "No account email was forwarded for this user",
                )),
            )
                .into_response();
        }
    };

    let command = CreateCheckoutCommand {
        user_id: user.user_id,
        email,
        plan_code: req.plan_code,
        success_url: req.success_url,
        cancel_url: req.cancel_url,
    };

    match handlers.checkout_handler.handle(command).await {
        Ok(result) => {
            let response: CheckoutResponse = result.into();
            (StatusCode::CREATED, Json(response)).into_response()
        }
        Err(e) => handle_billing_error(e),
    }
}

/// POST /api/billing/cancel - Cancel the caller's subscription
pub async fn cancel_subscription(
    State(handlers): State<BillingHandlers>,
    RequireAuth(user): RequireAuth,
    Json(req): Json<CancelRequest>,
) -> Response {
    let command = CancelSubscriptionCommand {
        user_id: user.user_id,
        immediately: req.immediately,
    };

    match handlers.cancel_handler.handle(command).await {
        Ok(result) => {
            let response: CancelResponse = result.into();
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => handle_billing_error(e),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Health endpoint
// ════════════════════════════════════════════════════════════════════════════

/// GET /health - Liveness check
pub async fn health() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({"status": "ok"})),
    )
        .into_response()
}

// ════════════════════════════════════════════════════════════════════════════
// Error handling
// ════════════════════════════════════════════════════════════════════════════

fn handle_billing_error(error: BillingError) -> Response {
    let status = match &error {
        BillingError::NotFound(_) | BillingError::NotFoundForUser(_) => StatusCode::NOT_FOUND,
        BillingError::AlreadySubscribed(_)
        | BillingError::AlreadyCanceled(_)
        | BillingError::InvalidState { .. } => StatusCode::CONFLICT,
        BillingError::PlanNotFound(_) | BillingError::ValidationFailed { .. } => {
            StatusCode::BAD_REQUEST
        }
        BillingError::GatewayUnavailable { .. } => StatusCode::BAD_GATEWAY,
        BillingError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(error = %error, "Billing request failed");
    }

    let body = ErrorResponse {
        code: error.code().to_string(),
        message: error.message(),
        details: None,
    };
    (status, Json(body)).into_response()
}

fn handle_ledger_error(error: DomainError) -> Response {
    tracing::error!(code = %error.code, message = %error.message, "Ledger read failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::internal(error.message)),
    )
        .into_response()
}

fn handle_webhook_error(error: WebhookError) -> Response {
    let status = error.status_code();

    // Parked and ignored outcomes normally come back as Ok results, but
    // an error that maps to 2xx is still an acknowledgement.
    if status.is_success() {
        return (status, Json(WebhookAck { received: true })).into_response();
    }

    if status.is_server_error() {
        tracing::error!(error = %error, "Webhook processing failed, provider will retry");
    } else {
        tracing::warn!(error = %error, "Webhook delivery rejected");
    }

    (
        status,
        Json(serde_json::json!({
            "error": error.to_string(),
            "received": false
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{ErrorCode, SubscriptionId, UserId};

    fn user_id() -> UserId {
        UserId::new("user-42").unwrap()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Billing error mapping
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn missing_subscription_maps_to_404() {
        let response = handle_billing_error(BillingError::not_found_for_user(user_id()));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn already_subscribed_maps_to_409() {
        let response = handle_billing_error(BillingError::already_subscribed(user_id()));
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn already_canceled_maps_to_409() {
        let response =
            handle_billing_error(BillingError::already_canceled(SubscriptionId::new()));
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn unknown_plan_maps_to_400() {
        let response = handle_billing_error(BillingError::plan_not_found("platinum"));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn gateway_failure_maps_to_502() {
        let response = handle_billing_error(BillingError::GatewayUnavailable {
            reason: "timeout".to_string(),
        });
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn infrastructure_failure_maps_to_500() {
        let response = handle_billing_error(BillingError::infrastructure("db down"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Webhook error mapping
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn invalid_signature_maps_to_400() {
        let response = handle_webhook_error(WebhookError::InvalidSignature);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn stale_timestamp_maps_to_400() {
        let response = handle_webhook_error(WebhookError::TimestampOutOfRange);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn database_failure_maps_to_500_for_redelivery() {
        let response = handle_webhook_error(WebhookError::Database("pool exhausted".to_string()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn in_flight_event_maps_to_503_for_redelivery() {
        let response = handle_webhook_error(WebhookError::EventInFlight);
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn ignored_error_still_acknowledges() {
        let response = handle_webhook_error(WebhookError::Ignored("irrelevant".to_string()));
        assert_eq!(response.status(), StatusCode::OK);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Ledger error mapping
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn ledger_read_failure_maps_to_500() {
        let error = DomainError::new(ErrorCode::DatabaseError, "connection lost");
        let response = handle_ledger_error(error);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
