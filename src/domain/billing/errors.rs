//! Billing-specific error types.
//!
//! Errors related to subscription lifecycle operations and checkout.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | NotFound | 404 |
//! | NotFoundForUser | 404 |
//! | AlreadySubscribed | 409 |
//! | AlreadyCanceled | 409 |
//! | PlanNotFound | 400 |
//! | InvalidState | 409 |
//! | ValidationFailed | 400 |
//! | GatewayUnavailable | 502 |
//! | Infrastructure | 500 |

use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, UserId};

/// Billing-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// Subscription was not found.
    NotFound(SubscriptionId),

    /// No subscription exists for this user.
    NotFoundForUser(UserId),

    /// User already has a live subscription.
    AlreadySubscribed(UserId),

    /// Subscription has already been canceled.
    AlreadyCanceled(SubscriptionId),

    /// Unknown plan code.
    PlanNotFound(String),

    /// Invalid state for the requested operation.
    InvalidState {
        current: String,
        attempted: String,
    },

    /// Validation failed.
    ValidationFailed {
        field: String,
        message: String,
    },

    /// Payment gateway call failed or timed out.
    GatewayUnavailable {
        reason: String,
    },

    /// Infrastructure error.
    Infrastructure(String),
}

impl BillingError {
    // Constructor functions for cleaner error creation

    pub fn not_found(id: SubscriptionId) -> Self {
        BillingError::NotFound(id)
    }

    pub fn not_found_for_user(user_id: UserId) -> Self {
        BillingError::NotFoundForUser(user_id)
    }

    pub fn already_subscribed(user_id: UserId) -> Self {
        BillingError::AlreadySubscribed(user_id)
    }

    pub fn already_canceled(id: SubscriptionId) -> Self {
        BillingError::AlreadyCanceled(id)
    }

    pub fn plan_not_found(plan_code: impl Into<String>) -> Self {
        BillingError::PlanNotFound(plan_code.into())
    }

    pub fn invalid_state(current: impl Into<String>, attempted: impl Into<String>) -> Self {
        BillingError::InvalidState {
            current: current.into(),
            attempted: attempted.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn gateway_unavailable(reason: impl Into<String>) -> Self {
        BillingError::GatewayUnavailable {
            reason: reason.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        BillingError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            BillingError::NotFound(_) | BillingError::NotFoundForUser(_) => {
                ErrorCode::SubscriptionNotFound
            }
            BillingError::AlreadySubscribed(_) => ErrorCode::DuplicateRecord,
            BillingError::AlreadyCanceled(_) => ErrorCode::SubscriptionCanceled,
            BillingError::PlanNotFound(_) => ErrorCode::PlanNotFound,
            BillingError::InvalidState { .. } => ErrorCode::InvalidStateTransition,
            BillingError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            BillingError::GatewayUnavailable { .. } => ErrorCode::GatewayUnavailable,
            BillingError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Returns a user-friendly error message.
    pub fn message(&self) -> String {
        match self {
            BillingError::NotFound(id) => format!("Subscription not found: {}", id),
            BillingError::NotFoundForUser(user_id) => {
                format!("No subscription found for user: {}", user_id)
            }
            BillingError::AlreadySubscribed(user_id) => {
                format!("User {} already has a live subscription", user_id)
            }
            BillingError::AlreadyCanceled(id) => {
                format!("Subscription {} is already canceled", id)
            }
            BillingError::PlanNotFound(plan_code) => format!("Unknown plan: {}", plan_code),
            BillingError::InvalidState { current, attempted } => {
                format!("Cannot {} subscription in {} state", attempted, current)
            }
            BillingError::ValidationFailed { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
            BillingError::GatewayUnavailable { reason } => {
                format!("Payment gateway unavailable: {}", reason)
            }
            BillingError::Infrastructure(msg) => format!("Error: {}", msg),
        }
    }

    /// Returns true if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BillingError::Infrastructure(_) | BillingError::GatewayUnavailable { .. }
        )
    }
}

impl std::fmt::Display for BillingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for BillingError {}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::PlanNotFound => BillingError::PlanNotFound(err.to_string()),
            ErrorCode::SubscriptionCanceled => BillingError::InvalidState {
                current: "canceled".to_string(),
                attempted: err.to_string(),
            },
            ErrorCode::InvalidStateTransition => BillingError::InvalidState {
                current: "unknown".to_string(),
                attempted: err.to_string(),
            },
            ErrorCode::ValidationFailed
            | ErrorCode::EmptyField
            | ErrorCode::OutOfRange
            | ErrorCode::InvalidFormat => BillingError::ValidationFailed {
                field: "unknown".to_string(),
                message: err.to_string(),
            },
            ErrorCode::GatewayUnavailable => BillingError::GatewayUnavailable {
                reason: err.to_string(),
            },
            _ => BillingError::Infrastructure(err.to_string()),
        }
    }
}

impl From<BillingError> for DomainError {
    fn from(err: BillingError) -> Self {
        DomainError::new(err.code(), err.message())
    }
}
