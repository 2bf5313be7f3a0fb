//! Authentication extractor for axum.
//!
//! This service sits behind an edge gateway that terminates sessions and
//! forwards the caller's identity as trusted headers:
//!
//! ```text
//! X-User-Id:    required, the authenticated user's id
//! X-User-Email: optional, the address on the user's account
//! ```
//!
//! `RequireAuth` reads those headers directly; there is no middleware layer
//! and no token validation here. Requests that reach this service without
//! an identity header did not come through the gateway and are rejected
//! with 401.
//!
//! # Example
//!
//! ```ignore
//! async fn my_handler(RequireAuth(user): RequireAuth) -> String {
//!     format!("Hello, {}!", user.user_id)
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::domain::foundation::UserId;

/// Identity forwarded by the edge gateway.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// The authenticated user's id.
    pub user_id: UserId,

    /// Account email, when the gateway forwarded one.
    pub email: Option<String>,
}

/// Extractor that requires a forwarded identity.
///
/// Rejects with 401 when `X-User-Id` is missing, empty, or not valid
/// header text.
#[derive(Debug, Clone)]
pub struct RequireAuth(pub AuthenticatedUser);

impl<S> axum::extract::FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut axum::http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let raw_id = parts
                .headers
                .get("X-User-Id")
                .ok_or(AuthRejection::MissingIdentity)?;

            let user_id = raw_id
                .to_str()
                .map_err(|_| AuthRejection::InvalidIdentity)
                .and_then(|id| UserId::new(id).map_err(|_| AuthRejection::InvalidIdentity))?;

            let email = parts
                .headers
                .get("X-User-Email")
                .and_then(|h| h.to_str().ok())
                .map(str::to_string);

            Ok(RequireAuth(AuthenticatedUser { user_id, email }))
        })
    }
}

/// Rejection type for authentication failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRejection {
    /// No identity header was forwarded.
    MissingIdentity,

    /// The identity header was present but unusable.
    InvalidIdentity,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let message = match self {
            AuthRejection::MissingIdentity => "Authentication required",
            AuthRejection::InvalidIdentity => "Invalid identity header",
        };

        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": message,
                "code": "UNAUTHENTICATED"
            })),
        )
            .into_response()
    }
}
