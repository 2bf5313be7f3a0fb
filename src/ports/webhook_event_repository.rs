//! WebhookEventRepository port - Interface for tracking processed Stripe webhooks.
//!
//! This port enables idempotent webhook handling: each event id is reserved
//! before any side effect runs, and the reservation is settled with the
//! processing outcome. The full payload is stored for auditing and so the
//! reconciler can replay parked events.
//!
//! ## Event Lifecycle
//!
//! ```text
//! begin() ──> processing ──complete()──> succeeded | ignored | parked
//!                 │
//!              release()
//!                 ▼
//!               failed ──(reclaimed by a later begin())──> processing
//! ```
//!
//! Stripe may deliver the same webhook multiple times due to network
//! timeouts, 5xx responses from our endpoint, or our success response being
//! lost. The reserve-then-settle protocol guarantees the event's side
//! effects run at most once even when deliveries race within milliseconds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::foundation::DomainError;

/// Lifecycle status of a webhook event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventStatus {
    /// A worker holds the reservation and is applying effects.
    Processing,
    /// Effects were applied.
    Succeeded,
    /// Event was acknowledged without effects.
    Ignored,
    /// Event referenced unknown local state; waiting for reconciler replay.
    Parked,
    /// Last attempt failed; the next begin() reclaims it.
    Failed,
}

impl WebhookEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Ignored => "ignored",
            Self::Parked => "parked",
            Self::Failed => "failed",
        }
    }

    /// Returns true once the event needs no further delivery or replay.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Ignored)
    }
}

/// Record of a webhook event and its processing state.
#[derive(Debug, Clone)]
pub struct WebhookEventRecord {
    /// Stripe event ID (evt_xxx format).
    pub event_id: String,

    /// Type of Stripe event (e.g., "invoice.payment_succeeded").
    pub event_type: String,

    /// Where the event is in its processing lifecycle.
    pub status: WebhookEventStatus,

    /// Number of processing attempts, including the current one.
    pub attempts: u32,

    /// Failure or park reason from the most recent attempt.
    pub last_error: Option<String>,

    /// Original event payload, kept for auditing and parked replay.
    pub payload: serde_json::Value,

    /// When the event was first received.
    pub received_at: DateTime<Utc>,

    /// When the event reached a settled outcome.
    pub processed_at: Option<DateTime<Utc>>,
}

impl WebhookEventRecord {
    /// Creates a freshly reserved record.
    pub fn processing(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            status: WebhookEventStatus::Processing,
            attempts: 1,
            last_error: None,
            payload,
            received_at: Utc::now(),
            processed_at: None,
        }
    }

    /// Settles the record with the given outcome.
    pub fn settle(&mut self, outcome: &ProcessingOutcome) {
        match outcome {
            ProcessingOutcome::Succeeded => {
                self.status = WebhookEventStatus::Succeeded;
                self.last_error = None;
                self.processed_at = Some(Utc::now());
            }
            ProcessingOutcome::Ignored(reason) => {
                self.status = WebhookEventStatus::Ignored;
                self.last_error = Some(reason.clone());
                self.processed_at = Some(Utc::now());
            }
            ProcessingOutcome::Parked(reason) => {
                self.status = WebhookEventStatus::Parked;
                self.last_error = Some(reason.clone());
                self.processed_at = None;
            }
        }
    }

    /// Marks the record failed so a later begin() can reclaim it.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = WebhookEventStatus::Failed;
        self.last_error = Some(error.into());
        self.processed_at = None;
    }

    /// Reclaims a failed or parked record for another attempt.
    pub fn reclaim(&mut self) {
        self.status = WebhookEventStatus::Processing;
        self.attempts += 1;
        self.last_error = None;
    }
}

/// Result of trying to reserve an event for processing.
#[derive(Debug, Clone)]
pub enum BeginOutcome {
    /// Reservation acquired; the caller must settle it via complete() or release().
    Fresh,
    /// The event already reached a settled outcome; do not reapply effects.
    AlreadyProcessed(WebhookEventRecord),
    /// Another worker holds the reservation right now.
    InProgress,
}

/// Outcome a worker reports when settling its reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// Effects were applied.
    Succeeded,
    /// Event acknowledged without effects, with the reason.
    Ignored(String),
    /// Event referenced unknown local state; the reconciler will replay it.
    Parked(String),
}

/// Result of webhook processing as seen by the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookResult {
    /// Event was processed (effects applied or intentionally skipped).
    Processed,
    /// Event was already processed (idempotent skip).
    AlreadyProcessed,
    /// Event was parked for reconciler replay; delivery is acknowledged.
    Parked,
}

/// Port for reserving and settling webhook event processing.
///
/// Implementations must make begin() atomic with respect to concurrent
/// deliveries of the same event id (the processor may redeliver within
/// milliseconds of a timeout). A database PRIMARY KEY on event_id plus
/// `INSERT ... ON CONFLICT` gives this for free.
#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Atomically check-and-reserve an event id.
    ///
    /// Inserts a `processing` row for unseen events. Failed and parked rows
    /// are reclaimed in the same statement, so redelivery and reconciler
    /// replay retry through the identical path.
    async fn begin(
        &self,
        event_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<BeginOutcome, DomainError>;

    /// Settle a reservation with its processing outcome.
    async fn complete(
        &self,
        event_id: &str,
        outcome: ProcessingOutcome,
    ) -> Result<(), DomainError>;

    /// Mark a reservation failed so a later begin() can reclaim it.
    async fn release(&self, event_id: &str, error: &str) -> Result<(), DomainError>;

    /// Find an event record by its Stripe event ID.
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError>;

    /// List parked events awaiting reconciler replay, oldest first.
    async fn list_parked(&self, limit: u32) -> Result<Vec<WebhookEventRecord>, DomainError>;

    /// Delete settled records older than the specified timestamp.
    ///
    /// Returns the number of records deleted.
    /// Used for cleanup/retention policy (e.g., keep 30 days).
    async fn delete_before(&self, timestamp: DateTime<Utc>) -> Result<u64, DomainError>;
}
