//! Mock payment gateway for testing.
//!
//! Provides a configurable mock implementation of `PaymentGateway` for unit
//! and integration tests. Supports:
//! - Pre-configured subscriptions and checkout sessions
//! - Error injection (global or per method)
//! - Call tracking

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::ports::{
    CheckoutSession, CreateCheckoutRequest, GatewayError, GatewaySubscription,
    GatewaySubscriptionStatus, PaymentGateway,
};

/// Mock payment gateway for testing.
///
/// # Example
///
/// ```ignore
/// let mock = MockPaymentGateway::with_active_subscription("sub_123", "cus_456");
///
/// // Inject errors
/// mock.set_method_error("cancel_subscription", GatewayError::timeout("stub"));
///
/// // Use in tests
/// let result = mock.cancel_subscription("sub_123", true).await;
/// assert!(mock.was_called("cancel_subscription"));
/// ```
#[derive(Default)]
pub struct MockPaymentGateway {
    /// Inner state (thread-safe for async tests).
    inner: Arc<Mutex<MockState>>,
}

/// Internal mutable state.
#[derive(Default)]
struct MockState {
    /// Subscriptions by provider id.
    subscriptions: HashMap<String, GatewaySubscription>,

    /// Next checkout session to return.
    next_checkout: Option<CheckoutSession>,

    /// Error to return on the next call (consumed once).
    next_error: Option<GatewayError>,

    /// Persistent errors by method name.
    method_errors: HashMap<String, GatewayError>,

    /// Recorded calls for assertions.
    call_log: Vec<MethodCall>,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockPaymentGateway {
    /// Create a new mock gateway with no configured state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock holding one active subscription.
    pub fn with_active_subscription(subscription_id: &str, customer_id: &str) -> Self {
        let mock = Self::new();
        let now = chrono::Utc::now().timestamp();

        mock.add_subscription(GatewaySubscription {
            id: subscription_id.to_string(),
            customer: customer_id.to_string(),
            status: GatewaySubscriptionStatus::Active,
            current_period_start: now,
            current_period_end: now + 30 * 24 * 60 * 60,
            cancel_at_period_end: false,
            canceled_at: None,
        });

        mock
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Add a subscription to the provider-side "database".
    pub fn add_subscription(&self, subscription: GatewaySubscription) {
        let id = subscription.id.clone();
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .insert(id, subscription);
    }

    /// Read back a subscription, for post-call assertions.
    pub fn subscription(&self, subscription_id: &str) -> Option<GatewaySubscription> {
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .get(subscription_id)
            .cloned()
    }

    /// Set the checkout session to return on the next create call.
    pub fn set_checkout_session(&self, session: CheckoutSession) {
        self.inner.lock().unwrap().next_checkout = Some(session);
    }

    /// Set an error to return on the next call to any method.
    pub fn set_error(&self, error: GatewayError) {
        self.inner.lock().unwrap().next_error = Some(error);
    }

    /// Set an error for a specific method.
    pub fn set_method_error(&self, method: &str, error: GatewayError) {
        self.inner
            .lock()
            .unwrap()
            .method_errors
            .insert(method.to_string(), error);
    }

    /// Clear all configured errors.
    pub fn clear_errors(&self) {
        let mut state = self.inner.lock().unwrap();
        state.next_error = None;
        state.method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    /// Get all recorded method calls.
    pub fn calls(&self) -> Vec<MethodCall> {
        self.inner.lock().unwrap().call_log.clone()
    }

    /// Check if a method was called.
    pub fn was_called(&self, method: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .call_log
            .iter()
            .any(|c| c.method == method)
    }

    /// Get count of calls to a method.
    pub fn call_count(&self, method: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().call_log.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn record_call(&self, method: &str, args: Vec<String>) {
        self.inner.lock().unwrap().call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
    }

    fn check_error(&self, method: &str) -> Result<(), GatewayError> {
        let mut state = self.inner.lock().unwrap();

        // Method-specific error first
        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }

        // Global error (consumes it)
        if let Some(error) = state.next_error.take() {
            return Err(error);
        }

        Ok(())
    }
}

impl Clone for MockPaymentGateway {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn mock_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}_mock_{}", prefix, &hex[..8])
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        self.record_call(
            "create_checkout_session",
            vec![
                request.user_id.to_string(),
                request.price_id.clone(),
                request.email.clone(),
            ],
        );
        self.check_error("create_checkout_session")?;

        let mut state = self.inner.lock().unwrap();

        let session = state.next_checkout.take().unwrap_or_else(|| {
            let id = mock_id("cs");
            CheckoutSession {
                url: format!("https://checkout.stripe.com/c/pay/{}", id),
                id,
                expires_at: chrono::Utc::now().timestamp() + 24 * 60 * 60,
            }
        });

        Ok(session)
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> Result<GatewaySubscription, GatewayError> {
        self.record_call(
            "cancel_subscription",
            vec![subscription_id.to_string(), at_period_end.to_string()],
        );
        self.check_error("cancel_subscription")?;

        let mut state = self.inner.lock().unwrap();

        let subscription = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| GatewayError::not_found("Subscription"))?;

        subscription.cancel_at_period_end = at_period_end;
        subscription.canceled_at = Some(chrono::Utc::now().timestamp());

        if !at_period_end {
            subscription.status = GatewaySubscriptionStatus::Canceled;
        }

        Ok(subscription.clone())
    }

    async fn fetch_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<GatewaySubscription>, GatewayError> {
        self.record_call("fetch_subscription", vec![subscription_id.to_string()]);
        self.check_error("fetch_subscription")?;

        let state = self.inner.lock().unwrap();
        Ok(state.subscriptions.get(subscription_id).cloned())
    }
}
