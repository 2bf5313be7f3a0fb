//! Tracing-based event publisher.
//!
//! Emits every domain event as a structured log line. Downstream consumers
//! (analytics, email flows) tail the log pipeline; nothing in the billing
//! service itself subscribes. Publishing never fails, so event emission can
//! sit inside webhook handlers without adding a failure mode.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, EventEnvelope};
use crate::ports::EventPublisher;

/// Publishes domain events to the tracing pipeline.
#[derive(Debug, Clone, Default)]
pub struct TracingEventPublisher;

impl TracingEventPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventPublisher for TracingEventPublisher {
    async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError> {
        tracing::info!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            aggregate_type = %event.aggregate_type,
            correlation_id = event.metadata.correlation_id.as_deref(),
            user_id = event.metadata.user_id.as_deref(),
            payload = %event.payload,
            "Domain event published"
        );
        Ok(())
    }

    async fn publish_all(&self, events: Vec<EventEnvelope>) -> Result<(), DomainError> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}
