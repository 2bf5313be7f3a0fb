//! HTTP DTOs for billing endpoints.
//!
//! These types decouple the HTTP API from domain types, allowing independent evolution.

use serde::{Deserialize, Serialize};

use crate::application::handlers::billing::{CancelSubscriptionResult, CreateCheckoutResult};
use crate::domain::billing::{Plan, Subscription, SubscriptionStatus};
use crate::domain::credits::{CreditBalance, CreditTransaction, TransactionType};
use crate::domain::foundation::Timestamp;

// ════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════

/// Request to start hosted checkout for a plan.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub plan_code: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Request to cancel the caller's subscription.
///
/// The default schedules cancellation for the end of the paid period.
#[derive(Debug, Clone, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub immediately: bool,
}

/// Query parameters for the transaction history endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// ════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════

/// The caller's subscription as shown to clients.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    pub id: String,
    pub plan_code: String,
    pub status: SubscriptionStatus,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
    pub cancel_at_period_end: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canceled_at: Option<Timestamp>,
    pub has_access: bool,
    pub days_remaining: u32,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(subscription: Subscription) -> Self {
        Self {
            id: subscription.id.to_string(),
            plan_code: subscription.plan_code.clone(),
            status: subscription.status,
            current_period_start: subscription.current_period_start,
            current_period_end: subscription.current_period_end,
            cancel_at_period_end: subscription.cancel_at_period_end,
            canceled_at: subscription.canceled_at,
            has_access: subscription.has_access(),
            days_remaining: subscription.days_remaining(),
        }
    }
}

/// Response for a created checkout session.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub subscription_id: String,
    pub plan_code: String,
    pub session_id: String,
    pub checkout_url: String,
    pub expires_at: i64,
}

impl From<CreateCheckoutResult> for CheckoutResponse {
    fn from(result: CreateCheckoutResult) -> Self {
        Self {
            subscription_id: result.subscription_id.to_string(),
            plan_code: result.plan_code,
            session_id: result.session_id,
            checkout_url: result.checkout_url,
            expires_at: result.expires_at,
        }
    }
}

/// Response for a cancellation request.
#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub subscription: SubscriptionResponse,
    pub effective_at: Timestamp,
}

impl From<CancelSubscriptionResult> for CancelResponse {
    fn from(result: CancelSubscriptionResult) -> Self {
        Self {
            subscription: result.subscription.into(),
            effective_at: result.effective_at,
        }
    }
}

/// The caller's credit balance.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub total_credits: i64,
    pub used_credits: i64,
    pub available_credits: i64,
}

impl From<CreditBalance> for BalanceResponse {
    fn from(balance: CreditBalance) -> Self {
        Self {
            total_credits: balance.total_credits,
            used_credits: balance.used_credits,
            available_credits: balance.available(),
        }
    }
}

/// One ledger entry in the transaction history.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionResponse {
    pub id: String,
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub balance_after: i64,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub created_at: Timestamp,
}

impl From<CreditTransaction> for TransactionResponse {
    fn from(transaction: CreditTransaction) -> Self {
        Self {
            id: transaction.id.to_string(),
            transaction_type: transaction.transaction_type,
            amount: transaction.amount,
            balance_after: transaction.balance_after,
            description: transaction.description,
            reference: transaction.reference,
            created_at: transaction.created_at,
        }
    }
}

/// Page of ledger entries, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub transactions: Vec<TransactionResponse>,
    pub limit: u32,
    pub offset: u32,
}

/// One purchasable plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanResponse {
    pub code: String,
    pub name: String,
    pub monthly_price_cents: i64,
    pub monthly_credits: i64,
}

impl From<&Plan> for PlanResponse {
    fn from(plan: &Plan) -> Self {
        Self {
            code: plan.code.clone(),
            name: plan.name.clone(),
            monthly_price_cents: plan.monthly_price_cents,
            monthly_credits: plan.monthly_credits,
        }
    }
}

/// Catalog of purchasable plans.
#[derive(Debug, Clone, Serialize)]
pub struct PlansResponse {
    pub plans: Vec<PlanResponse>,
}

/// Acknowledgement body for webhook deliveries.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// Standard error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: "BAD_REQUEST".to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(resource_type: &str, id: &str) -> Self {
        Self {
            code: "NOT_FOUND".to_string(),
            message: format!("{} not found: {}", resource_type, id),
            details: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: "INTERNAL_ERROR".to_string(),
            message: message.into(),
            details: None,
        }
    }
}
