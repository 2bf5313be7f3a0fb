//! Subscription repository port (write side).
//!
//! Defines the contract for persisting and retrieving Subscription
//! aggregates. Implementations handle the actual database operations.
//!
//! # Design
//!
//! - **Write-focused**: Optimized for aggregate persistence
//! - **Webhook correlation**: Lookup by the provider's subscription id is the
//!   hot path, since that is all a webhook payload carries
//! - **Unique constraint**: At most one non-canceled subscription per user
//!
//! # Example
//!
//! ```ignore
//! async fn activate_from_checkout(
//!     repo: &dyn SubscriptionRepository,
//!     stripe_subscription_id: &str,
//!     period_start: Timestamp,
//!     period_end: Timestamp,
//! ) -> Result<(), DomainError> {
//!     let mut subscription = repo
//!         .find_by_stripe_subscription_id(stripe_subscription_id)
//!         .await?
//!         .ok_or_else(|| DomainError::new(ErrorCode::SubscriptionNotFound, "unknown"))?;
//!
//!     subscription.activate(period_start, period_end, None, None)?;
//!     repo.update(&subscription).await?;
//!     Ok(())
//! }
//! ```

use crate::domain::billing::Subscription;
use crate::domain::foundation::{DomainError, SubscriptionId, Timestamp, UserId};
use async_trait::async_trait;

/// Repository port for Subscription aggregate persistence.
///
/// Implementations must ensure:
/// - At most one non-canceled subscription per user
/// - Unique stripe_subscription_id across rows
/// - updated_at maintained on every write (drives the stale sweep)
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Save a new subscription.
    ///
    /// # Errors
    ///
    /// - `DuplicateRecord` if the user already has a live subscription
    /// - `DatabaseError` on persistence failure
    async fn save(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Update an existing subscription.
    ///
    /// # Errors
    ///
    /// - `SubscriptionNotFound` if the subscription doesn't exist
    /// - `DatabaseError` on persistence failure
    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Find a subscription by its ID.
    ///
    /// Returns `None` if not found.
    async fn find_by_id(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Find a user's current subscription.
    ///
    /// Returns the newest subscription for the user, live or canceled, or
    /// `None` if the user never subscribed.
    async fn find_by_user_id(&self, user_id: &UserId)
        -> Result<Option<Subscription>, DomainError>;

    /// Find a subscription by the payment provider's subscription id.
    ///
    /// This is the primary webhook lookup: invoice and subscription events
    /// carry only the provider id. Returns `None` when the provider id has
    /// no local record yet (the caller parks the event).
    async fn find_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Find live provider-linked subscriptions not written since the cutoff.
    ///
    /// Used by the drift sweep: a subscription that has not seen a webhook
    /// in a while is re-checked against the provider. Canceled rows and rows
    /// without a provider id are excluded.
    async fn find_stale(
        &self,
        updated_before: Timestamp,
        limit: u32,
    ) -> Result<Vec<Subscription>, DomainError>;

    /// Delete a subscription (primarily for testing).
    ///
    /// In production, subscriptions transition to Canceled rather than being
    /// deleted.
    ///
    /// # Errors
    ///
    /// - `SubscriptionNotFound` if the subscription doesn't exist
    /// - `DatabaseError` on persistence failure
    async fn delete(&self, id: &SubscriptionId) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Trait object safety test
    #[test]
    fn subscription_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn SubscriptionRepository) {}
    }
}
