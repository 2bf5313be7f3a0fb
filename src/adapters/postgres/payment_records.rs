//! PostgreSQL implementation of the payment audit trail.
//!
//! Inserts use `ON CONFLICT DO NOTHING` against the provider id, so a
//! redelivered webhook reports `AlreadyRecorded` instead of failing or
//! duplicating the row.

use async_trait::async_trait;
use sqlx::postgres::PgPool;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{InvoiceRecord, PaymentRecord, PaymentRecordStore, RecordOutcome};

/// PostgreSQL payment audit store backed by `payments` and `invoices`.
pub struct PostgresPaymentRecordStore {
    pool: PgPool,
}

impl PostgresPaymentRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentRecordStore for PostgresPaymentRecordStore {
    async fn record_payment(
        &self,
        payment: PaymentRecord,
    ) -> Result<RecordOutcome, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO payments (
                payment_intent_id, user_id, amount_cents, currency, description, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (payment_intent_id) DO NOTHING
            "#,
        )
        .bind(&payment.payment_intent_id)
        .bind(payment.user_id.as_str())
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(payment.description.as_deref())
        .bind(payment.occurred_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to record payment: {}", e),
            )
        })?;

        if result.rows_affected() == 0 {
            Ok(RecordOutcome::AlreadyRecorded)
        } else {
            Ok(RecordOutcome::Inserted)
        }
    }

    async fn record_invoice(
        &self,
        invoice: InvoiceRecord,
    ) -> Result<RecordOutcome, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO invoices (
                invoice_id, stripe_subscription_id, user_id, amount_paid_cents,
                currency, period_start, period_end, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (invoice_id) DO NOTHING
            "#,
        )
        .bind(&invoice.invoice_id)
        .bind(&invoice.stripe_subscription_id)
        .bind(invoice.user_id.as_str())
        .bind(invoice.amount_paid_cents)
        .bind(&invoice.currency)
        .bind(invoice.period_start.as_datetime())
        .bind(invoice.period_end.as_datetime())
        .bind(invoice.occurred_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to record invoice: {}", e),
            )
        })?;

        if result.rows_affected() == 0 {
            Ok(RecordOutcome::AlreadyRecorded)
        } else {
            Ok(RecordOutcome::Inserted)
        }
    }
}
