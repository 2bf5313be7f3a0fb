//! Webhook error types for Stripe webhook handling.
//!
//! Defines all error conditions that can occur during webhook processing,
//! with HTTP status code mapping and retryability semantics.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that occur during webhook processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Webhook signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Webhook timestamp is outside the acceptable window (5 minutes).
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Event timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Failed to parse webhook payload or signature header.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Required field missing from webhook payload.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Event references a subscription we don't know yet.
    ///
    /// Happens when deliveries reorder past the checkout-completion event.
    /// The event is parked and replayed by the reconciler, and the delivery
    /// is acknowledged so the processor stops redelivering.
    #[error("Unknown subscription: {0}")]
    UnknownSubscription(String),

    /// Another worker is processing the same event right now.
    #[error("Event is already being processed")]
    EventInFlight,

    /// Attempted state transition is not valid.
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// Event was intentionally ignored (not an error condition).
    #[error("Event ignored: {0}")]
    Ignored(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),
}

impl WebhookError {
    /// Returns true if Stripe should retry delivering this webhook.
    ///
    /// Retryable errors indicate temporary failures that may succeed
    /// on subsequent attempts (database issues, concurrent duplicates).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::Database(_) | WebhookError::EventInFlight
        )
    }

    /// Maps the error to an appropriate HTTP status code.
    ///
    /// Status codes determine Stripe's retry behavior:
    /// - 2xx: Event acknowledged, no retry
    /// - 4xx: Rejected delivery, no retry
    /// - 5xx: Server error, will retry
    pub fn status_code(&self) -> StatusCode {
        match self {
            // Untrusted or malformed deliveries - reject, no retry
            WebhookError::InvalidSignature
            | WebhookError::TimestampOutOfRange
            | WebhookError::InvalidTimestamp
            | WebhookError::ParseError(_)
            | WebhookError::MissingField(_) => StatusCode::BAD_REQUEST,

            // Parked or ignored events are acknowledged as success
            WebhookError::UnknownSubscription(_) | WebhookError::Ignored(_) => StatusCode::OK,

            // Concurrent duplicate - tell the processor to come back
            WebhookError::EventInFlight => StatusCode::SERVICE_UNAVAILABLE,

            // Server errors - will retry
            WebhookError::InvalidTransition(_) | WebhookError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
