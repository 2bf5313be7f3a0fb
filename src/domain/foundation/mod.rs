//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, error types, and event
//! infrastructure that form the vocabulary of the billing domain.

mod errors;
mod events;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use events::{EventEnvelope, EventId, EventMetadata};
pub use ids::{SubscriptionId, TransactionId, UserId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
