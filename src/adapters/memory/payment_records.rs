//! In-memory payment record store.
//!
//! # Security Note
//!
//! This adapter is for tests and local development runs only. Nothing is
//! persisted and the audit trail vanishes with the process.

use crate::domain::foundation::DomainError;
use crate::ports::{InvoiceRecord, PaymentRecord, PaymentRecordStore, RecordOutcome};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
struct StoreState {
    payments: HashMap<String, PaymentRecord>,
    invoices: HashMap<String, InvoiceRecord>,
}

/// In-memory implementation of [`PaymentRecordStore`].
#[derive(Debug, Default)]
pub struct InMemoryPaymentRecordStore {
    state: RwLock<StoreState>,
}

impl InMemoryPaymentRecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded payments (test helper).
    pub fn payments(&self) -> Vec<PaymentRecord> {
        self.state
            .read()
            .expect("InMemoryPaymentRecordStore: state lock poisoned")
            .payments
            .values()
            .cloned()
            .collect()
    }

    /// All recorded invoices (test helper).
    pub fn invoices(&self) -> Vec<InvoiceRecord> {
        self.state
            .read()
            .expect("InMemoryPaymentRecordStore: state lock poisoned")
            .invoices
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PaymentRecordStore for InMemoryPaymentRecordStore {
    async fn record_payment(
        &self,
        payment: PaymentRecord,
    ) -> Result<RecordOutcome, DomainError> {
        let mut state = self
            .state
            .write()
            .expect("InMemoryPaymentRecordStore: state lock poisoned");
        if state.payments.contains_key(&payment.payment_intent_id) {
            return Ok(RecordOutcome::AlreadyRecorded);
        }
        state
            .payments
            .insert(payment.payment_intent_id.clone(), payment);
        Ok(RecordOutcome::Inserted)
    }

    async fn record_invoice(
        &self,
        invoice: InvoiceRecord,
    ) -> Result<RecordOutcome, DomainError> {
        let mut state = self
            .state
            .write()
            .expect("InMemoryPaymentRecordStore: state lock poisoned");
        if state.invoices.contains_key(&invoice.invoice_id) {
            return Ok(RecordOutcome::AlreadyRecorded);
        }
        state.invoices.insert(invoice.invoice_id.clone(), invoice);
        Ok(RecordOutcome::Inserted)
    }
}
