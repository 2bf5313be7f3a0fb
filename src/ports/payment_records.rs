//! PaymentRecordStore port - Interface for the payment audit trail.
//!
//! Successful payments and paid invoices are recorded as append-only rows,
//! keyed by the provider's payment intent / invoice id. Webhooks redeliver,
//! so inserts are idempotent: recording the same id twice reports
//! `AlreadyRecorded` instead of duplicating the row.
//!
//! These rows never drive billing state. They exist for support lookups and
//! revenue reconciliation against provider exports.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Timestamp, UserId};

/// Whether a record call inserted a new row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new row was inserted.
    Inserted,
    /// The provider id was already recorded; no new row.
    AlreadyRecorded,
}

/// A one-time payment captured from a checkout or payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    /// Provider's payment intent id (pi_xxx format), the dedup key.
    pub payment_intent_id: String,

    /// User who paid.
    pub user_id: UserId,

    /// Amount paid, in the currency's minor unit (cents).
    pub amount_cents: i64,

    /// ISO currency code, lowercase (e.g., "usd").
    pub currency: String,

    /// What the payment was for, if known.
    pub description: Option<String>,

    /// When the payment occurred at the provider.
    pub occurred_at: Timestamp,
}

/// A paid subscription invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRecord {
    /// Provider's invoice id (in_xxx format), the dedup key.
    pub invoice_id: String,

    /// Provider's subscription id the invoice belongs to.
    pub stripe_subscription_id: String,

    /// User the subscription belongs to.
    pub user_id: UserId,

    /// Amount paid, in the currency's minor unit (cents).
    pub amount_paid_cents: i64,

    /// ISO currency code, lowercase (e.g., "usd").
    pub currency: String,

    /// Billing period start the invoice covers.
    pub period_start: Timestamp,

    /// Billing period end the invoice covers.
    pub period_end: Timestamp,

    /// When the invoice was paid at the provider.
    pub occurred_at: Timestamp,
}

/// Port for recording payments and invoices.
#[async_trait]
pub trait PaymentRecordStore: Send + Sync {
    /// Record a one-time payment.
    ///
    /// Idempotent on `payment_intent_id`.
    async fn record_payment(&self, payment: PaymentRecord)
        -> Result<RecordOutcome, DomainError>;

    /// Record a paid invoice.
    ///
    /// Idempotent on `invoice_id`.
    async fn record_invoice(&self, invoice: InvoiceRecord)
        -> Result<RecordOutcome, DomainError>;
}
