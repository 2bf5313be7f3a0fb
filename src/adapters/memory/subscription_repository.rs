//! In-memory subscription repository.
//!
//! Stores Subscription aggregates in a process-local map, enforcing the same
//! uniqueness rules the Postgres schema enforces with indexes: at most one
//! non-canceled subscription per user, and unique provider subscription ids.
//!
//! # Security Note
//!
//! This adapter is for tests and local development runs only. Nothing is
//! persisted and the whole store vanishes with the process.

use crate::domain::billing::{Subscription, SubscriptionStatus};
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp, UserId};
use crate::ports::SubscriptionRepository;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory implementation of [`SubscriptionRepository`].
///
/// A single `RwLock` guards the map. Methods never hold the lock across an
/// await point, so the std lock is safe here.
#[derive(Debug, Default)]
pub struct InMemorySubscriptionRepository {
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
}

impl InMemorySubscriptionRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored subscriptions (test helper).
    pub fn count(&self) -> usize {
        self.subscriptions
            .read()
            .expect("InMemorySubscriptionRepository: subscriptions lock poisoned")
            .len()
    }

    /// Remove all stored subscriptions (test helper).
    pub fn clear(&self) {
        self.subscriptions
            .write()
            .expect("InMemorySubscriptionRepository: subscriptions lock poisoned")
            .clear();
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn save(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut store = self
            .subscriptions
            .write()
            .expect("InMemorySubscriptionRepository: subscriptions lock poisoned");

        if store.contains_key(&subscription.id) {
            return Err(DomainError::new(
                ErrorCode::DuplicateRecord,
                format!("Subscription already exists: {}", subscription.id),
            ));
        }

        // Mirrors the partial unique index on (user_id) WHERE status != 'canceled'.
        let has_live = store.values().any(|existing| {
            existing.user_id == subscription.user_id
                && existing.status != SubscriptionStatus::Canceled
        });
        if has_live && subscription.status != SubscriptionStatus::Canceled {
            return Err(DomainError::new(
                ErrorCode::DuplicateRecord,
                "User already has a live subscription",
            ));
        }

        store.insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut store = self
            .subscriptions
            .write()
            .expect("InMemorySubscriptionRepository: subscriptions lock poisoned");

        if !store.contains_key(&subscription.id) {
            return Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                "Subscription not found",
            ));
        }

        store.insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, DomainError> {
        let store = self
            .subscriptions
            .read()
            .expect("InMemorySubscriptionRepository: subscriptions lock poisoned");
        Ok(store.get(id).cloned())
    }

    async fn find_by_user_id(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError> {
        let store = self
            .subscriptions
            .read()
            .expect("InMemorySubscriptionRepository: subscriptions lock poisoned");
        let newest = store
            .values()
            .filter(|subscription| &subscription.user_id == user_id)
            .max_by_key(|subscription| *subscription.created_at.as_datetime())
            .cloned();
        Ok(newest)
    }

    async fn find_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let store = self
            .subscriptions
            .read()
            .expect("InMemorySubscriptionRepository: subscriptions lock poisoned");
        let found = store
            .values()
            .find(|subscription| {
                subscription.stripe_subscription_id.as_deref() == Some(stripe_subscription_id)
            })
            .cloned();
        Ok(found)
    }

    async fn find_stale(
        &self,
        updated_before: Timestamp,
        limit: u32,
    ) -> Result<Vec<Subscription>, DomainError> {
        let store = self
            .subscriptions
            .read()
            .expect("InMemorySubscriptionRepository: subscriptions lock poisoned");
        let mut stale: Vec<Subscription> = store
            .values()
            .filter(|subscription| {
                subscription.status != SubscriptionStatus::Canceled
                    && subscription.stripe_subscription_id.is_some()
                    && subscription.updated_at.is_before(&updated_before)
            })
            .cloned()
            .collect();
        stale.sort_by_key(|subscription| *subscription.updated_at.as_datetime());
        stale.truncate(limit as usize);
        Ok(stale)
    }

    async fn delete(&self, id: &SubscriptionId) -> Result<(), DomainError> {
        let mut store = self
            .subscriptions
            .write()
            .expect("InMemorySubscriptionRepository: subscriptions lock poisoned");
        if store.remove(id).is_none() {
            return Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                "Subscription not found",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(user: &str) -> Subscription {
        Subscription::create_pending(
            SubscriptionId::new(),
            UserId::new(user).unwrap(),
            "pro",
        )
    }

    // ========================================================================
    // Save and lookup
    // ========================================================================

    #[tokio::test]
    async fn save_and_find_by_id_round_trips() {
        let repo = InMemorySubscriptionRepository::new();
        let subscription = pending("user-1");

        repo.save(&subscription).await.unwrap();

        let found = repo.find_by_id(&subscription.id).await.unwrap().unwrap();
        assert_eq!(found.user_id, subscription.user_id);
        assert_eq!(found.status, SubscriptionStatus::Pending);
    }

    #[tokio::test]
    async fn save_rejects_second_live_subscription_for_user() {
        let repo = InMemorySubscriptionRepository::new();
        repo.save(&pending("user-1")).await.unwrap();

        let err = repo.save(&pending("user-1")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateRecord);
    }

    #[tokio::test]
    async fn save_allows_new_subscription_after_cancellation() {
        let repo = InMemorySubscriptionRepository::new();
        let mut first = pending("user-1");
        first.status = SubscriptionStatus::Canceled;
        repo.save(&first).await.unwrap();

        repo.save(&pending("user-1")).await.unwrap();
        assert_eq!(repo.count(), 2);
    }

    #[tokio::test]
    async fn find_by_user_id_returns_newest() {
        let repo = InMemorySubscriptionRepository::new();
        let mut old = pending("user-1");
        old.status = SubscriptionStatus::Canceled;
        old.created_at = Timestamp::now().minus_days(30);
        repo.save(&old).await.unwrap();

        let newest = pending("user-1");
        repo.save(&newest).await.unwrap();

        let found = repo.find_by_user_id(&newest.user_id).await.unwrap().unwrap();
        assert_eq!(found.id, newest.id);
    }

    #[tokio::test]
    async fn find_by_stripe_subscription_id_matches_provider_id() {
        let repo = InMemorySubscriptionRepository::new();
        let mut subscription = pending("user-1");
        subscription.stripe_subscription_id = Some("sub_123".to_string());
        repo.save(&subscription).await.unwrap();

        let found = repo
            .find_by_stripe_subscription_id("sub_123")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, subscription.id);

        let missing = repo.find_by_stripe_subscription_id("sub_999").await.unwrap();
        assert!(missing.is_none());
    }

    // ========================================================================
    // Update and delete
    // ========================================================================

    #[tokio::test]
    async fn update_requires_existing_subscription() {
        let repo = InMemorySubscriptionRepository::new();
        let subscription = pending("user-1");

        let err = repo.update(&subscription).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SubscriptionNotFound);
    }

    #[tokio::test]
    async fn update_replaces_stored_state() {
        let repo = InMemorySubscriptionRepository::new();
        let mut subscription = pending("user-1");
        repo.save(&subscription).await.unwrap();

        subscription
            .activate(
                Timestamp::now(),
                Timestamp::now().add_days(30),
                Some("cus_1".to_string()),
                Some("sub_1".to_string()),
            )
            .unwrap();
        repo.update(&subscription).await.unwrap();

        let found = repo.find_by_id(&subscription.id).await.unwrap().unwrap();
        assert_eq!(found.status, SubscriptionStatus::Active);
        assert_eq!(found.stripe_subscription_id.as_deref(), Some("sub_1"));
    }

    #[tokio::test]
    async fn delete_removes_subscription() {
        let repo = InMemorySubscriptionRepository::new();
        let subscription = pending("user-1");
        repo.save(&subscription).await.unwrap();

        repo.delete(&subscription.id).await.unwrap();
        assert!(repo.find_by_id(&subscription.id).await.unwrap().is_none());

        let err = repo.delete(&subscription.id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SubscriptionNotFound);
    }

    // ========================================================================
    // Stale sweep
    // ========================================================================

    #[tokio::test]
    async fn find_stale_filters_and_orders_oldest_first() {
        let repo = InMemorySubscriptionRepository::new();
        let cutoff = Timestamp::now();

        let mut oldest = pending("user-1");
        oldest.stripe_subscription_id = Some("sub_old".to_string());
        oldest.updated_at = cutoff.minus_days(10);
        repo.save(&oldest).await.unwrap();

        let mut newer = pending("user-2");
        newer.stripe_subscription_id = Some("sub_newer".to_string());
        newer.updated_at = cutoff.minus_days(2);
        repo.save(&newer).await.unwrap();

        // Canceled and provider-less rows are excluded even when stale.
        let mut canceled = pending("user-3");
        canceled.status = SubscriptionStatus::Canceled;
        canceled.stripe_subscription_id = Some("sub_canceled".to_string());
        canceled.updated_at = cutoff.minus_days(20);
        repo.save(&canceled).await.unwrap();

        let mut unlinked = pending("user-4");
        unlinked.updated_at = cutoff.minus_days(20);
        repo.save(&unlinked).await.unwrap();

        let stale = repo.find_stale(cutoff, 10).await.unwrap();
        assert_eq!(stale.len(), 2);
        assert_eq!(stale[0].id, oldest.id);
        assert_eq!(stale[1].id, newer.id);

        let limited = repo.find_stale(cutoff, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, oldest.id);
    }
}
