//! Stripe payment gateway adapter.
//!
//! Implements the `PaymentGateway` trait against the Stripe REST API.
//! Only three calls go INTO Stripe: creating hosted checkout sessions,
//! canceling subscriptions, and reading a subscription back for the drift
//! sweep. Everything else arrives as webhooks.
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeConfig::new(secret_key);
//! let gateway = StripeGateway::new(config);
//! ```

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::ports::{
    CheckoutSession, CreateCheckoutRequest, GatewayError, GatewaySubscription, PaymentGateway,
};

/// Per-request deadline. A timed-out call surfaces as
/// `GatewayErrorCode::Timeout`, which callers treat as outcome-unknown.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Checkout sessions expire after 24 hours unless Stripe says otherwise.
const DEFAULT_SESSION_TTL_SECS: i64 = 24 * 60 * 60;

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    secret_key: SecretString,

    /// Base URL for the Stripe API (default: https://api.stripe.com).
    api_base_url: String,
}

impl StripeConfig {
    /// Create a new Stripe configuration.
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: SecretString::new(secret_key.into()),
            api_base_url: "https://api.stripe.com".to_string(),
        }
    }

    /// Set a custom API base URL (for testing against a stub server).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

/// Stripe gateway adapter.
pub struct StripeGateway {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripeGateway {
    /// Create a new Stripe gateway with the given configuration.
    pub fn new(config: StripeConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    async fn error_from_response(
        response: reqwest::Response,
        operation: &str,
    ) -> GatewayError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::error!(
            status = %status,
            operation,
            error = %body,
            "Stripe API call failed"
        );
        classify_error(status, &body)
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let url = format!("{}/v1/checkout/sessions", self.config.api_base_url);

        let params = vec![
            ("mode", "subscription".to_string()),
            ("customer_email", request.email.clone()),
            ("line_items[0][price]", request.price_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            // The completed-checkout webhook correlates back to the user
            // through this metadata; the subscription copy is for support
            // lookups in the Stripe dashboard.
            ("metadata[user_id]", request.user_id.to_string()),
            ("metadata[plan_code]", request.plan_code.clone()),
            (
                "subscription_data[metadata][user_id]",
                request.user_id.to_string(),
            ),
        ];

        let mut builder = self
            .http_client
            .post(&url)
            .basic_auth(self.config.secret_key.expose_secret(), Option::<&str>::None)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .form(&params);

        if let Some(key) = &request.idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }

        let response = builder.send().await.map_err(request_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response, "create_checkout_session").await);
        }

        let session: CheckoutSessionResponse = response.json().await.map_err(|e| {
            GatewayError::invalid_response(format!("Failed to parse Stripe response: {}", e))
        })?;

        let checkout_url = session.url.ok_or_else(|| {
            GatewayError::invalid_response("Checkout session response carried no URL")
        })?;

        let expires_at = session
            .expires_at
            .unwrap_or_else(|| chrono::Utc::now().timestamp() + DEFAULT_SESSION_TTL_SECS);

        Ok(CheckoutSession {
            id: session.id,
            url: checkout_url,
            expires_at,
        })
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> Result<GatewaySubscription, GatewayError> {
        let url = format!(
            "{}/v1/subscriptions/{}",
            self.config.api_base_url, subscription_id
        );

        let response = if at_period_end {
            // Flag the subscription to lapse when the paid period ends.
            self.http_client
                .post(&url)
                .basic_auth(self.config.secret_key.expose_secret(), Option::<&str>::None)
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .form(&[("cancel_at_period_end", "true")])
                .send()
                .await
        } else {
            // Immediately cancel.
            self.http_client
                .delete(&url)
                .basic_auth(self.config.secret_key.expose_secret(), Option::<&str>::None)
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .send()
                .await
        }
        .map_err(request_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::not_found("Subscription"));
        }

        if !response.status().is_success() {
            return Err(Self::error_from_response(response, "cancel_subscription").await);
        }

        response.json::<GatewaySubscription>().await.map_err(|e| {
            GatewayError::invalid_response(format!("Failed to parse Stripe response: {}", e))
        })
    }

    async fn fetch_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<GatewaySubscription>, GatewayError> {
        let url = format!(
            "{}/v1/subscriptions/{}",
            self.config.api_base_url, subscription_id
        );

        let response = self
            .http_client
            .get(&url)
            .basic_auth(self.config.secret_key.expose_secret(), Option::<&str>::None)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await
            .map_err(request_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(Self::error_from_response(response, "fetch_subscription").await);
        }

        let subscription: GatewaySubscription = response.json().await.map_err(|e| {
            GatewayError::invalid_response(format!("Failed to parse Stripe response: {}", e))
        })?;

        Ok(Some(subscription))
    }
}

/// Wire shape of a created checkout session.
#[derive(Debug, Deserialize)]
struct CheckoutSessionResponse {
    id: String,
    url: Option<String>,
    expires_at: Option<i64>,
}

/// Stripe's error envelope, used to lift the provider's error code.
#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    #[serde(default)]
    code: Option<String>,
}

fn request_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::timeout(format!("Stripe request timed out: {}", err))
    } else {
        GatewayError::network(err.to_string())
    }
}

fn classify_error(status: reqwest::StatusCode, body: &str) -> GatewayError {
    let provider_code = serde_json::from_str::<StripeErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error.code);

    let error = match status.as_u16() {
        401 | 403 => GatewayError::authentication("Stripe rejected the API key"),
        429 => GatewayError::rate_limited("Stripe rate limit exceeded"),
        _ => GatewayError::provider(format!("Stripe API error ({}): {}", status, body)),
    };

    match provider_code {
        Some(code) => error.with_provider_code(code),
        None => error,
    }
}
