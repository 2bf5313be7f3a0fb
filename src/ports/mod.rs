//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Persistence Ports
//!
//! - `SubscriptionRepository` - Subscription aggregate persistence
//! - `CreditLedger` - Atomic, idempotent credit transaction posting
//! - `PaymentRecordStore` - Append-only payment/invoice audit trail
//! - `WebhookEventRepository` - Webhook reservation and idempotency tracking
//!
//! ## Integration Ports
//!
//! - `PaymentGateway` - Outbound calls to the payment provider
//! - `EventPublisher` - Port for publishing domain events
//! - `NotificationSender` - User-facing billing notifications

mod credit_ledger;
mod event_publisher;
mod notification_sender;
mod payment_gateway;
mod payment_records;
mod subscription_repository;
mod webhook_event_repository;

pub use credit_ledger::{CreditLedger, LedgerOutcome, LedgerReceipt};
pub use event_publisher::EventPublisher;
pub use notification_sender::{Notification, NotificationSender};
pub use payment_gateway::{
    CheckoutSession, CreateCheckoutRequest, GatewayError, GatewayErrorCode, GatewaySubscription,
    GatewaySubscriptionStatus, PaymentGateway,
};
pub use payment_records::{InvoiceRecord, PaymentRecord, PaymentRecordStore, RecordOutcome};
pub use subscription_repository::SubscriptionRepository;
pub use webhook_event_repository::{
    BeginOutcome, ProcessingOutcome, WebhookEventRecord, WebhookEventRepository,
    WebhookEventStatus, WebhookResult,
};
