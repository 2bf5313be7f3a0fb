//! PostgreSQL adapters - Database implementations for persistence ports.
//!
//! This module provides adapters for PostgreSQL-backed persistence:
//! - `PostgresSubscriptionRepository` - Subscription lifecycle rows
//! - `PostgresCreditLedger` - Serialized, idempotent credit ledger
//! - `PostgresWebhookEventRepository` - Webhook reservation and replay store
//! - `PostgresPaymentRecordStore` - Payment and invoice audit trail

mod credit_ledger;
mod payment_records;
mod subscription_repository;
mod webhook_event_repository;

pub use credit_ledger::PostgresCreditLedger;
pub use payment_records::PostgresPaymentRecordStore;
pub use subscription_repository::PostgresSubscriptionRepository;
pub use webhook_event_repository::PostgresWebhookEventRepository;
