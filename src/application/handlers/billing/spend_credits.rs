//! SpendCreditsHandler - debits credits for metered work.
//!
//! The caller supplies the idempotency key (typically the job id), so a
//! retried job debits the balance exactly once. Overdrafts are rejected by
//! the ledger before any row is posted.

use std::sync::Arc;

use crate::domain::billing::BillingEvent;
use crate::domain::credits::{CreditError, NewCreditTransaction};
use crate::domain::foundation::{DomainError, Timestamp, TransactionId, UserId};
use crate::ports::{CreditLedger, EventPublisher};

/// Command to spend credits on a piece of work.
#[derive(Debug, Clone)]
pub struct SpendCreditsCommand {
    /// User whose balance is debited.
    pub user_id: UserId,

    /// Credits to debit. Must be positive.
    pub credits: i64,

    /// What the credits paid for, shown in the ledger history.
    pub description: String,

    /// Caller-chosen key that makes retries safe (e.g. `render:job-81`).
    pub idempotency_key: String,
}

/// Result of a spend.
#[derive(Debug, Clone)]
pub struct SpendCreditsResult {
    /// The posted (or previously posted) usage row.
    pub transaction_id: TransactionId,

    /// Balance after the debit.
    pub balance_after: i64,

    /// True when this call was a retry and no new row was posted.
    pub deduplicated: bool,
}

/// Handler for spending credits.
pub struct SpendCreditsHandler {
    ledger: Arc<dyn CreditLedger>,
    publisher: Arc<dyn EventPublisher>,
}

impl SpendCreditsHandler {
    pub fn new(ledger: Arc<dyn CreditLedger>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { ledger, publisher }
    }

    /// Debit the user's balance.
    ///
    /// # Errors
    ///
    /// Returns `CreditError::InsufficientBalance` if the debit exceeds the
    /// available balance.
    pub async fn handle(
        &self,
        command: SpendCreditsCommand,
    ) -> Result<SpendCreditsResult, CreditError> {
        // 1. Build the validated debit
        let request = NewCreditTransaction::usage(
            command.user_id.clone(),
            command.credits,
            &command.idempotency_key,
            &command.description,
        )
        .map_err(DomainError::from)?;

        // 2. Post it; the ledger serializes concurrent spends per user
        let receipt = self.ledger.apply(request).await?;

        // 3. Announce fresh debits only; replays already announced
        if receipt.was_applied() {
            let event = BillingEvent::CreditsSpent {
                user_id: command.user_id.clone(),
                credits: command.credits,
                balance_after: receipt.balance_after,
                occurred_at: Timestamp::now(),
            };
            self.publisher
                .publish(event.to_envelope().with_correlation_id(&command.idempotency_key))
                .await?;
        }

        tracing::debug!(
            user_id = %command.user_id,
            credits = command.credits,
            balance_after = receipt.balance_after,
            deduplicated = !receipt.was_applied(),
            "Credits spent"
        );

        Ok(SpendCreditsResult {
            transaction_id: receipt.transaction_id,
            balance_after: receipt.balance_after,
            deduplicated: !receipt.was_applied(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::events::InMemoryEventBus;
    use crate::adapters::memory::InMemoryCreditLedger;

    fn test_user_id() -> UserId {
        UserId::new("user-42").unwrap()
    }

    fn command(credits: i64, key: &str) -> SpendCreditsCommand {
        SpendCreditsCommand {
            user_id: test_user_id(),
            credits,
            description: "Clip export render".to_string(),
            idempotency_key: key.to_string(),
        }
    }

    struct Fixture {
        ledger: Arc<InMemoryCreditLedger>,
        publisher: Arc<InMemoryEventBus>,
        handler: SpendCreditsHandler,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryCreditLedger::new());
        let publisher = Arc::new(InMemoryEventBus::new());
        let handler = SpendCreditsHandler::new(ledger.clone(), publisher.clone());

        Fixture {
            ledger,
            publisher,
            handler,
        }
    }

    async fn grant(fixture: &Fixture, credits: i64) {
        let request = NewCreditTransaction::purchase(
            test_user_id(),
            credits,
            "purchase:pi_seed",
            "Credit pack",
        )
        .unwrap();
        fixture.ledger.apply(request).await.unwrap();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Spend Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn spend_debits_the_balance() {
        let fixture = fixture();
        grant(&fixture, 100).await;

        let result = fixture
            .handler
            .handle(command(30, "render:job-81"))
            .await
            .unwrap();

        assert_eq!(result.balance_after, 70);
        assert!(!result.deduplicated);

        let balance = fixture.ledger.balance(&test_user_id()).await.unwrap();
        assert_eq!(balance.available(), 70);
    }

    #[tokio::test]
    async fn spend_publishes_credits_spent() {
        let fixture = fixture();
        grant(&fixture, 100).await;

        fixture
            .handler
            .handle(command(30, "render:job-81"))
            .await
            .unwrap();

        let events = fixture.publisher.events_of_type("billing.credits_spent");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["credits"], 30);
        assert_eq!(events[0].payload["balance_after"], 70);
    }

    #[tokio::test]
    async fn retried_spend_debits_once() {
        let fixture = fixture();
        grant(&fixture, 100).await;

        let first = fixture
            .handler
            .handle(command(30, "render:job-81"))
            .await
            .unwrap();
        let second = fixture
            .handler
            .handle(command(30, "render:job-81"))
            .await
            .unwrap();

        assert!(second.deduplicated);
        assert_eq!(second.transaction_id, first.transaction_id);
        assert_eq!(second.balance_after, 70);
        // Seed grant plus one usage row
        assert_eq!(fixture.ledger.transaction_count(), 2);
        assert_eq!(
            fixture.publisher.events_of_type("billing.credits_spent").len(),
            1
        );
    }

    #[tokio::test]
    async fn distinct_jobs_debit_separately() {
        let fixture = fixture();
        grant(&fixture, 100).await;

        fixture
            .handler
            .handle(command(30, "render:job-81"))
            .await
            .unwrap();
        let result = fixture
            .handler
            .handle(command(30, "render:job-82"))
            .await
            .unwrap();

        assert_eq!(result.balance_after, 40);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Rejection Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn overdraft_is_rejected_without_a_row() {
        let fixture = fixture();
        grant(&fixture, 10).await;

        let result = fixture.handler.handle(command(11, "render:job-81")).await;

        assert!(matches!(
            result,
            Err(CreditError::InsufficientBalance { .. })
        ));
        let balance = fixture.ledger.balance(&test_user_id()).await.unwrap();
        assert_eq!(balance.available(), 10);
        assert_eq!(fixture.publisher.event_count(), 0);
    }

    #[tokio::test]
    async fn zero_credit_spend_is_rejected() {
        let fixture = fixture();
        grant(&fixture, 10).await;

        let result = fixture.handler.handle(command(0, "render:job-81")).await;

        assert!(result.is_err());
        assert_eq!(fixture.ledger.transaction_count(), 1);
    }
}
