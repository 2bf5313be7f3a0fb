//! Payment gateway port for external payment processing.
//!
//! Defines the contract for the payment provider integration (Stripe).
//! Billing state is driven by webhooks; this port covers the few calls we
//! make INTO the provider: starting checkout, canceling, and reading back
//! subscription state for the drift sweep.
//!
//! # Design
//!
//! - **Gateway agnostic**: Interface works with any hosted-checkout provider
//! - **Webhook-first**: No state is trusted from synchronous responses; the
//!   webhook (or the drift sweep) is the source of truth
//! - **Timeout is not failure**: A timed-out call may still have succeeded
//!   remotely. Callers must not assume the remote operation failed, and must
//!   leave local state untouched until a webhook or sweep confirms.

use crate::domain::foundation::{DomainError, ErrorCode, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Port for the payment gateway integration.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout session for a subscription.
    ///
    /// Returns a URL for the customer to complete payment. Completion
    /// arrives later as a `checkout.session.completed` webhook.
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    /// Cancel a subscription at the provider.
    ///
    /// If `at_period_end` is true the provider keeps the subscription active
    /// until the paid period ends. The returned snapshot reflects the
    /// provider's post-cancel state; local state still waits for the
    /// `customer.subscription.updated` / `.deleted` webhook.
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> Result<GatewaySubscription, GatewayError>;

    /// Fetch the provider's current view of a subscription.
    ///
    /// Returns `None` if the provider has no such subscription. Used by the
    /// drift sweep to repair local state that missed webhooks.
    async fn fetch_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<GatewaySubscription>, GatewayError>;
}

/// Request to create a checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCheckoutRequest {
    /// Internal user ID (stored as session metadata for webhook correlation).
    pub user_id: UserId,

    /// Customer email for pre-fill.
    pub email: String,

    /// Plan code, also stored in session metadata. The completed-checkout
    /// webhook uses it to rebuild a local subscription row that was lost
    /// between session creation and persistence.
    pub plan_code: String,

    /// Provider price id for the selected plan.
    pub price_id: String,

    /// URL to redirect after successful checkout.
    pub success_url: String,

    /// URL to redirect after canceled checkout.
    pub cancel_url: String,

    /// Idempotency key for safe retries.
    pub idempotency_key: Option<String>,
}

/// Checkout session for payment completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Provider's session ID.
    pub id: String,

    /// URL for the customer to complete checkout.
    pub url: String,

    /// When the session expires (Unix timestamp).
    pub expires_at: i64,
}

/// The provider's view of a subscription.
///
/// Field names follow the provider's wire format so a serialized snapshot
/// is a valid `customer.subscription.*` event object. The drift sweep
/// relies on this to synthesize repair events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySubscription {
    /// Provider's subscription ID.
    pub id: String,

    /// Provider's customer ID (wire name `customer`).
    pub customer: String,

    /// Current subscription status at the provider.
    pub status: GatewaySubscriptionStatus,

    /// Current billing period start (Unix timestamp).
    pub current_period_start: i64,

    /// Current billing period end (Unix timestamp).
    pub current_period_end: i64,

    /// Whether the subscription cancels at period end.
    pub cancel_at_period_end: bool,

    /// When cancellation was requested (Unix timestamp, if any).
    pub canceled_at: Option<i64>,
}

/// Subscription status reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewaySubscriptionStatus {
    /// Subscription is active and current.
    Active,

    /// Payment is past due, provider retries are running.
    PastDue,

    /// Subscription is canceled.
    Canceled,

    /// Provider retries exhausted without payment.
    Unpaid,

    /// Initial payment incomplete.
    Incomplete,

    /// Initial payment abandoned.
    IncompleteExpired,

    /// Subscription is in a trial period.
    Trialing,

    /// Subscription is paused.
    Paused,

    /// Status we do not recognize.
    #[serde(other)]
    Unknown,
}

impl GatewaySubscriptionStatus {
    /// Check if the provider considers the subscription payable/serving.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            GatewaySubscriptionStatus::Active
                | GatewaySubscriptionStatus::Trialing
                | GatewaySubscriptionStatus::PastDue
        )
    }

    /// Wire-format name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewaySubscriptionStatus::Active => "active",
            GatewaySubscriptionStatus::PastDue => "past_due",
            GatewaySubscriptionStatus::Canceled => "canceled",
            GatewaySubscriptionStatus::Unpaid => "unpaid",
            GatewaySubscriptionStatus::Incomplete => "incomplete",
            GatewaySubscriptionStatus::IncompleteExpired => "incomplete_expired",
            GatewaySubscriptionStatus::Trialing => "trialing",
            GatewaySubscriptionStatus::Paused => "paused",
            GatewaySubscriptionStatus::Unknown => "unknown",
        }
    }
}

/// Errors from payment gateway operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayError {
    /// Error code for categorization.
    pub code: GatewayErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Provider's error code (if available).
    pub provider_code: Option<String>,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl GatewayError {
    /// Create a new gateway error.
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    /// Attach the provider's own error code.
    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::NetworkError, message)
    }

    /// Create a timeout error.
    ///
    /// The remote operation MAY still have completed.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Timeout, message)
    }

    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::AuthenticationError, message)
    }

    /// Create a rate-limit error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::RateLimited, message)
    }

    /// Create a not found error.
    pub fn not_found(resource: &str) -> Self {
        Self::new(
            GatewayErrorCode::NotFound,
            format!("{} not found", resource),
        )
    }

    /// Create an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::InvalidResponse, message)
    }

    /// Create a provider-side error.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::ProviderError, message)
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayError {}

impl From<GatewayError> for DomainError {
    fn from(err: GatewayError) -> Self {
        let code = match err.code {
            GatewayErrorCode::NotFound => ErrorCode::SubscriptionNotFound,
            code if code.is_retryable() => ErrorCode::GatewayUnavailable,
            _ => ErrorCode::InternalError,
        };
        DomainError::new(code, err.message)
    }
}

impl From<GatewayError> for crate::domain::billing::BillingError {
    fn from(err: GatewayError) -> Self {
        if err.retryable {
            crate::domain::billing::BillingError::gateway_unavailable(err.message)
        } else {
            crate::domain::billing::BillingError::infrastructure(err.to_string())
        }
    }
}

/// Gateway error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorCode {
    /// Network connectivity issue.
    NetworkError,

    /// Request timed out; remote outcome unknown.
    Timeout,

    /// API authentication failed.
    AuthenticationError,

    /// Rate limit exceeded.
    RateLimited,

    /// Resource not found at the provider.
    NotFound,

    /// Response could not be parsed.
    InvalidResponse,

    /// Provider-side API error.
    ProviderError,
}

impl GatewayErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayErrorCode::NetworkError
                | GatewayErrorCode::Timeout
                | GatewayErrorCode::RateLimited
        )
    }
}

impl std::fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GatewayErrorCode::NetworkError => "network_error",
            GatewayErrorCode::Timeout => "timeout",
            GatewayErrorCode::AuthenticationError => "authentication_error",
            GatewayErrorCode::RateLimited => "rate_limited",
            GatewayErrorCode::NotFound => "not_found",
            GatewayErrorCode::InvalidResponse => "invalid_response",
            GatewayErrorCode::ProviderError => "provider_error",
        };
        write!(f, "{}", s)
    }
}
