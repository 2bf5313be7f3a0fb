//! In-memory webhook event repository.
//!
//! Implements the reserve-then-settle protocol over a process-local map.
//! Matches the Postgres adapter's behavior, including the error on settling
//! a reservation that was never taken, so tests catch the same protocol
//! violations the database would.
//!
//! # Security Note
//!
//! This adapter is for tests and local development runs only. Nothing is
//! persisted and the whole store vanishes with the process.

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{
    BeginOutcome, ProcessingOutcome, WebhookEventRecord, WebhookEventRepository,
    WebhookEventStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory implementation of [`WebhookEventRepository`].
#[derive(Debug, Default)]
pub struct InMemoryWebhookEventRepository {
    records: RwLock<HashMap<String, WebhookEventRecord>>,
}

impl InMemoryWebhookEventRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records (test helper).
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Current status of an event, if recorded (test helper).
    pub async fn status_of(&self, event_id: &str) -> Option<WebhookEventStatus> {
        self.records
            .read()
            .await
            .get(event_id)
            .map(|record| record.status)
    }

    /// Overwrite a record's settled timestamp (test helper for retention).
    pub async fn set_processed_at(&self, event_id: &str, processed_at: DateTime<Utc>) {
        if let Some(record) = self.records.write().await.get_mut(event_id) {
            record.processed_at = Some(processed_at);
        }
    }
}

#[async_trait]
impl WebhookEventRepository for InMemoryWebhookEventRepository {
    async fn begin(
        &self,
        event_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<BeginOutcome, DomainError> {
        let mut records = self.records.write().await;
        match records.get_mut(event_id) {
            None => {
                records.insert(
                    event_id.to_string(),
                    WebhookEventRecord::processing(event_id, event_type, payload),
                );
                Ok(BeginOutcome::Fresh)
            }
            Some(record) if record.status == WebhookEventStatus::Processing => {
                Ok(BeginOutcome::InProgress)
            }
            Some(record) if record.status.is_settled() => {
                Ok(BeginOutcome::AlreadyProcessed(record.clone()))
            }
            Some(record) => {
                record.reclaim();
                Ok(BeginOutcome::Fresh)
            }
        }
    }

    async fn complete(
        &self,
        event_id: &str,
        outcome: ProcessingOutcome,
    ) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(event_id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("No reservation found for webhook event: {}", event_id),
            )
        })?;
        record.settle(&outcome);
        Ok(())
    }

    async fn release(&self, event_id: &str, error: &str) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(event_id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("No reservation found for webhook event: {}", event_id),
            )
        })?;
        record.fail(error);
        Ok(())
    }

    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        let records = self.records.read().await;
        Ok(records.get(event_id).cloned())
    }

    async fn list_parked(&self, limit: u32) -> Result<Vec<WebhookEventRecord>, DomainError> {
        let records = self.records.read().await;
        let mut parked: Vec<_> = records
            .values()
            .filter(|record| record.status == WebhookEventStatus::Parked)
            .cloned()
            .collect();
        parked.sort_by_key(|record| record.received_at);
        parked.truncate(limit as usize);
        Ok(parked)
    }

    async fn delete_before(&self, timestamp: DateTime<Utc>) -> Result<u64, DomainError> {
        let mut records = self.records.write().await;
        let before_count = records.len();
        records.retain(|_, record| match record.processed_at {
            Some(processed_at) => processed_at >= timestamp,
            None => true,
        });
        Ok((before_count - records.len()) as u64)
    }
}
