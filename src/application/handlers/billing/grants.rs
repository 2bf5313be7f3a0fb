//! Credit grants shared by the webhook handlers.
//!
//! Three handlers put credits on a ledger: checkout completion (signup
//! bonus, credit packs), paid invoices (signup bonus, period allotments),
//! and the subscription sync path when it advances a period the invoice
//! webhook never delivered. They all must agree on the idempotency keys,
//! because the at-least-once delivery model lets any two of them race for
//! the same grant:
//!
//! - `signup:<user>` one-time bonus, shared by every activation path
//! - `period-grant:<provider sub>:<period start>` one per billing period
//! - `purchase:<payment intent>` one per credit pack payment
//!
//! A `CreditsGranted` event is published only when the ledger actually
//! posted a new row, never for a deduplicated replay.

use std::sync::Arc;

use crate::domain::billing::{BillingEvent, PlanCatalog, WebhookError};
use crate::domain::credits::NewCreditTransaction;
use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::ports::{CreditLedger, EventPublisher, LedgerReceipt};

/// Idempotent credit grants with event publication.
#[derive(Clone)]
pub struct CreditGrants {
    ledger: Arc<dyn CreditLedger>,
    publisher: Arc<dyn EventPublisher>,
    catalog: PlanCatalog,
    signup_bonus_credits: i64,
}

impl CreditGrants {
    pub fn new(
        ledger: Arc<dyn CreditLedger>,
        publisher: Arc<dyn EventPublisher>,
        catalog: PlanCatalog,
        signup_bonus_credits: i64,
    ) -> Self {
        Self {
            ledger,
            publisher,
            catalog,
            signup_bonus_credits,
        }
    }

    /// The plan catalog the grants are priced from.
    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    /// Grant the one-time signup bonus, if configured.
    ///
    /// Keyed by user id, so the checkout and first-invoice activation paths
    /// grant exactly once between them no matter which lands first.
    pub async fn signup_bonus(
        &self,
        user_id: &UserId,
        correlation_id: &str,
    ) -> Result<(), WebhookError> {
        if self.signup_bonus_credits <= 0 {
            return Ok(());
        }

        let request = NewCreditTransaction::bonus(
            user_id.clone(),
            self.signup_bonus_credits,
            format!("signup:{}", user_id),
            "Signup bonus",
        )
        .map_err(DomainError::from)?;

        let receipt = self.ledger.apply(request).await?;
        if receipt.was_applied() {
            self.publish_granted(
                user_id,
                self.signup_bonus_credits,
                receipt.balance_after,
                "Signup bonus".to_string(),
                correlation_id,
            )
            .await?;
        }

        Ok(())
    }

    /// Grant the plan's monthly allotment for one billing period.
    ///
    /// The key binds provider subscription and period start: retries of the
    /// same invoice, the recovery after failed attempts, and the drift
    /// sweep's synthesized renewal all collapse to a single grant.
    pub async fn period_allotment(
        &self,
        user_id: &UserId,
        plan_code: &str,
        gateway_subscription_id: &str,
        period_start: i64,
        correlation_id: &str,
    ) -> Result<(), WebhookError> {
        let Some(plan) = self.catalog.by_code(plan_code) else {
            tracing::warn!(
                plan_code = %plan_code,
                "No catalog entry for plan, skipping period grant"
            );
            return Ok(());
        };
        if plan.monthly_credits <= 0 {
            return Ok(());
        }

        let request = NewCreditTransaction::plan_grant(
            user_id.clone(),
            plan.monthly_credits,
            &plan.name,
            format!("period-grant:{}:{}", gateway_subscription_id, period_start),
        )
        .map_err(DomainError::from)?;

        let receipt = self.ledger.apply(request).await?;
        if receipt.was_applied() {
            self.publish_granted(
                user_id,
                plan.monthly_credits,
                receipt.balance_after,
                format!("Monthly {} plan credit grant", plan.name),
                correlation_id,
            )
            .await?;
        }

        Ok(())
    }

    /// Grant purchased credits for a one-time credit pack payment.
    ///
    /// Returns the receipt so the caller can gate notifications on whether
    /// this delivery actually posted the row.
    pub async fn pack_purchase(
        &self,
        user_id: &UserId,
        credits: i64,
        payment_intent: &str,
        correlation_id: &str,
    ) -> Result<LedgerReceipt, WebhookError> {
        let description = format!("Credit pack ({} credits)", credits);
        let request = NewCreditTransaction::purchase(
            user_id.clone(),
            credits,
            format!("purchase:{}", payment_intent),
            description.clone(),
        )
        .map_err(DomainError::from)?
        .with_reference(payment_intent);

        let receipt = self.ledger.apply(request).await?;
        if receipt.was_applied() {
            self.publish_granted(
                user_id,
                credits,
                receipt.balance_after,
                description,
                correlation_id,
            )
            .await?;
        }

        Ok(receipt)
    }

    async fn publish_granted(
        &self,
        user_id: &UserId,
        credits: i64,
        balance_after: i64,
        description: String,
        correlation_id: &str,
    ) -> Result<(), WebhookError> {
        let granted = BillingEvent::CreditsGranted {
            user_id: user_id.clone(),
            credits,
            balance_after,
            description,
            occurred_at: Timestamp::now(),
        };
        self.publisher
            .publish(granted.to_envelope().with_correlation_id(correlation_id))
            .await?;
        Ok(())
    }
}
