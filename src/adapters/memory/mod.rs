//! In-memory adapters for the persistence ports.
//!
//! Every port the billing pipeline writes through has an in-memory twin
//! here, used by integration tests and local development runs. Each one
//! enforces the same contract as its Postgres counterpart (uniqueness,
//! idempotency, the reserve-then-settle protocol) so a pipeline wired
//! against these behaves like one wired against the database.

mod credit_ledger;
mod payment_records;
mod subscription_repository;
mod webhook_event_repository;

pub use credit_ledger::InMemoryCreditLedger;
pub use payment_records::InMemoryPaymentRecordStore;
pub use subscription_repository::InMemorySubscriptionRepository;
pub use webhook_event_repository::InMemoryWebhookEventRepository;
