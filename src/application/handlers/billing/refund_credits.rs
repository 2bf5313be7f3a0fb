//! RefundCreditsHandler - returns credits from a failed or reversed job.
//!
//! Every refund references the usage row it reverses, and the ledger caps
//! total refunds at what that usage actually debited. Credits move back to
//! the available balance; money refunds stay with the payment provider and
//! never pass through here.

use std::sync::Arc;

use crate::domain::billing::BillingEvent;
use crate::domain::credits::{CreditError, NewCreditTransaction};
use crate::domain::foundation::{DomainError, Timestamp, TransactionId, UserId};
use crate::ports::{CreditLedger, EventPublisher};

/// Command to refund credits against a prior usage.
#[derive(Debug, Clone)]
pub struct RefundCreditsCommand {
    /// User whose balance is credited back.
    pub user_id: UserId,

    /// Credits to return. Must be positive and within the refund cap.
    pub credits: i64,

    /// The usage transaction being reversed.
    pub usage_transaction_id: TransactionId,

    /// Why the refund happened, shown in the ledger history.
    pub reason: String,

    /// Caller-chosen key that makes retries safe (e.g. `refund:job-81`).
    pub idempotency_key: String,
}

/// Result of a refund.
#[derive(Debug, Clone)]
pub struct RefundCreditsResult {
    /// The posted (or previously posted) refund row.
    pub transaction_id: TransactionId,

    /// Balance after the refund.
    pub balance_after: i64,

    /// True when this call was a retry and no new row was posted.
    pub deduplicated: bool,
}

/// Handler for refunding credits.
pub struct RefundCreditsHandler {
    ledger: Arc<dyn CreditLedger>,
    publisher: Arc<dyn EventPublisher>,
}

impl RefundCreditsHandler {
    pub fn new(ledger: Arc<dyn CreditLedger>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { ledger, publisher }
    }

    /// Return credits to the user's balance.
    ///
    /// # Errors
    ///
    /// Returns `CreditError::RefundExceedsUsage` if the refund, together
    /// with refunds already posted against the same usage, exceeds what
    /// that usage debited.
    pub async fn handle(
        &self,
        command: RefundCreditsCommand,
    ) -> Result<RefundCreditsResult, CreditError> {
        // 1. Build the validated refund, tied to the usage it reverses
        let request = NewCreditTransaction::refund(
            command.user_id.clone(),
            command.credits,
            &command.idempotency_key,
            &command.reason,
        )
        .map_err(DomainError::from)?
        .with_reference(command.usage_transaction_id.to_string());

        // 2. Post it; the ledger enforces the refund cap
        let receipt = self.ledger.apply(request).await?;

        // 3. Announce fresh refunds only
        if receipt.was_applied() {
            let event = BillingEvent::CreditsRefunded {
                user_id: command.user_id.clone(),
                credits: command.credits,
                balance_after: receipt.balance_after,
                occurred_at: Timestamp::now(),
            };
            self.publisher
                .publish(event.to_envelope().with_correlation_id(&command.idempotency_key))
                .await?;
        }

        tracing::info!(
            user_id = %command.user_id,
            credits = command.credits,
            usage_transaction_id = %command.usage_transaction_id,
            balance_after = receipt.balance_after,
            "Credits refunded"
        );

        Ok(RefundCreditsResult {
            transaction_id: receipt.transaction_id,
            balance_after: receipt.balance_after,
            deduplicated: !receipt.was_applied(),
        })
    }
}
