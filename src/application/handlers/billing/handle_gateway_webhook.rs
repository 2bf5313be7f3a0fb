//! HandleGatewayWebhookHandler - entry point for delivered webhooks.
//!
//! Verifies the signature over the raw body, then hands the parsed event to
//! the idempotent processor. Everything after the signature check is
//! at-most-once per event id; redeliveries and races settle to the same
//! state no matter how many workers receive them.

use std::sync::Arc;

use crate::domain::billing::{
    IdempotentWebhookProcessor, StripeWebhookVerifier, WebhookError,
};
use crate::ports::WebhookResult;

/// Command carrying one webhook delivery, exactly as received.
///
/// The payload must be the raw request body; re-serialized JSON would not
/// match the provider's signature.
#[derive(Debug, Clone)]
pub struct HandleGatewayWebhookCommand {
    /// Raw request body bytes.
    pub payload: Vec<u8>,

    /// Contents of the provider's signature header.
    pub signature: String,
}

/// Outcome of one webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleGatewayWebhookResult {
    /// The event was applied (or deliberately ignored) and settled.
    Processed { event_id: String, event_type: String },

    /// A previous delivery already settled this event.
    AlreadyProcessed { event_id: String },

    /// The event referenced state we do not have yet; the drift sweep
    /// will replay it.
    Parked { event_id: String },
}

/// Handler for incoming gateway webhooks.
pub struct HandleGatewayWebhookHandler {
    verifier: StripeWebhookVerifier,
    processor: Arc<IdempotentWebhookProcessor>,
}

impl HandleGatewayWebhookHandler {
    pub fn new(
        verifier: StripeWebhookVerifier,
        processor: Arc<IdempotentWebhookProcessor>,
    ) -> Self {
        Self {
            verifier,
            processor,
        }
    }

    /// Verify and process one delivery.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::InvalidSignature` / `TimestampOutOfRange` /
    /// `ParseError` for deliveries that fail verification (the caller maps
    /// these to 4xx so the provider does not retry), and `EventInFlight` or
    /// `Database` for transient conditions the provider should retry.
    pub async fn handle(
        &self,
        command: HandleGatewayWebhookCommand,
    ) -> Result<HandleGatewayWebhookResult, WebhookError> {
        // 1. Verify the signature over the raw bytes and parse the event
        let event = self
            .verifier
            .verify_and_parse(&command.payload, &command.signature)?;

        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            livemode = event.livemode,
            "Webhook received"
        );

        // 2. Apply it at most once
        let result = self.processor.process(&event).await?;

        let outcome = match result {
            WebhookResult::Processed => HandleGatewayWebhookResult::Processed {
                event_id: event.id.clone(),
                event_type: event.event_type.clone(),
            },
            WebhookResult::AlreadyProcessed => HandleGatewayWebhookResult::AlreadyProcessed {
                event_id: event.id.clone(),
            },
            WebhookResult::Parked => HandleGatewayWebhookResult::Parked {
                event_id: event.id.clone(),
            },
        };

        tracing::info!(
            event_id = %event.id,
            outcome = ?result,
            "Webhook settled"
        );

        Ok(outcome)
    }
}
