//! PostgreSQL implementation of WebhookEventRepository.
//!
//! `begin` is a single `INSERT ... ON CONFLICT DO UPDATE ... RETURNING`
//! statement, so two concurrent deliveries of the same event id resolve
//! inside the database: exactly one sees `Fresh`, the other sees the
//! surviving row's status. Failed and parked rows are reclaimed by the same
//! statement, as are `processing` rows whose worker died mid-flight.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgPool;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{
    BeginOutcome, ProcessingOutcome, WebhookEventRecord, WebhookEventRepository,
    WebhookEventStatus,
};

/// How long a `processing` reservation may sit untouched before a later
/// begin() may steal it. Workers settle within seconds; a reservation this
/// old belongs to a worker that crashed before settling.
const STALE_CLAIM_SECS: i64 = 300;

/// PostgreSQL webhook event store backed by the `webhook_events` table.
pub struct PostgresWebhookEventRepository {
    pool: PgPool,
}

impl PostgresWebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookEventRepository for PostgresWebhookEventRepository {
    async fn begin(
        &self,
        event_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<BeginOutcome, DomainError> {
        let stale_before = Utc::now() - Duration::seconds(STALE_CLAIM_SECS);

        let claimed = sqlx::query_scalar::<_, String>(
            r#"
            INSERT INTO webhook_events (
                event_id, event_type, status, attempts, last_error, payload,
                received_at, processed_at, updated_at
            )
            VALUES ($1, $2, 'processing', 1, NULL, $3, now(), NULL, now())
            ON CONFLICT (event_id) DO UPDATE
            SET status = 'processing',
                attempts = webhook_events.attempts + 1,
                last_error = NULL,
                updated_at = now()
            WHERE webhook_events.status IN ('failed', 'parked')
               OR (webhook_events.status = 'processing' AND webhook_events.updated_at < $4)
            RETURNING event_id
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .bind(&payload)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to reserve webhook event: {}", e),
            )
        })?;

        if claimed.is_some() {
            return Ok(BeginOutcome::Fresh);
        }

        // The conflict row refused the claim. Read it to tell the caller why.
        let record = self.find_by_event_id(event_id).await?.ok_or_else(|| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Webhook event vanished during reservation: {}", event_id),
            )
        })?;

        match record.status {
            WebhookEventStatus::Succeeded | WebhookEventStatus::Ignored => {
                Ok(BeginOutcome::AlreadyProcessed(record))
            }
            // Failed or parked rows transitioned between our claim and this
            // read. The next delivery reclaims them.
            _ => Ok(BeginOutcome::InProgress),
        }
    }

    async fn complete(
        &self,
        event_id: &str,
        outcome: ProcessingOutcome,
    ) -> Result<(), DomainError> {
        let (status, last_error, settled) = match &outcome {
            ProcessingOutcome::Succeeded => ("succeeded", None, true),
            ProcessingOutcome::Ignored(reason) => ("ignored", Some(reason.as_str()), true),
            ProcessingOutcome::Parked(reason) => ("parked", Some(reason.as_str()), false),
        };

        let result = sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = $2,
                last_error = $3,
                processed_at = CASE WHEN $4 THEN now() ELSE NULL END,
                updated_at = now()
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(status)
        .bind(last_error)
        .bind(settled)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to settle webhook event: {}", e),
            )
        })?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                format!("No reservation found for webhook event: {}", event_id),
            ));
        }

        Ok(())
    }

    async fn release(&self, event_id: &str, error: &str) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = 'failed',
                last_error = $2,
                processed_at = NULL,
                updated_at = now()
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to release webhook event: {}", e),
            )
        })?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                format!("No reservation found for webhook event: {}", event_id),
            ));
        }

        Ok(())
    }

    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        let row = sqlx::query_as::<_, WebhookEventRow>(
            r#"
            SELECT event_id, event_type, status, attempts, last_error, payload,
                   received_at, processed_at
            FROM webhook_events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to fetch webhook event: {}", e),
            )
        })?;

        row.map(WebhookEventRecord::try_from).transpose()
    }

    async fn list_parked(&self, limit: u32) -> Result<Vec<WebhookEventRecord>, DomainError> {
        let rows = sqlx::query_as::<_, WebhookEventRow>(
            r#"
            SELECT event_id, event_type, status, attempts, last_error, payload,
                   received_at, processed_at
            FROM webhook_events
            WHERE status = 'parked'
            ORDER BY received_at ASC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to list parked webhook events: {}", e),
            )
        })?;

        rows.into_iter().map(WebhookEventRecord::try_from).collect()
    }

    async fn delete_before(&self, timestamp: DateTime<Utc>) -> Result<u64, DomainError> {
        let result = sqlx::query(
            r#"
            DELETE FROM webhook_events
            WHERE processed_at IS NOT NULL AND processed_at < $1
            "#,
        )
        .bind(timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to delete old webhook events: {}", e),
            )
        })?;

        Ok(result.rows_affected())
    }
}

/// Database row for the webhook_events table.
#[derive(Debug, sqlx::FromRow)]
struct WebhookEventRow {
    event_id: String,
    event_type: String,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    payload: serde_json::Value,
    received_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<WebhookEventRow> for WebhookEventRecord {
    type Error = DomainError;

    fn try_from(row: WebhookEventRow) -> Result<Self, Self::Error> {
        Ok(WebhookEventRecord {
            event_id: row.event_id,
            event_type: row.event_type,
            status: parse_status(&row.status)?,
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            last_error: row.last_error,
            payload: row.payload,
            received_at: row.received_at,
            processed_at: row.processed_at,
        })
    }
}

fn parse_status(value: &str) -> Result<WebhookEventStatus, DomainError> {
    match value.to_lowercase().as_str() {
        "processing" => Ok(WebhookEventStatus::Processing),
        "succeeded" => Ok(WebhookEventStatus::Succeeded),
        "ignored" => Ok(WebhookEventStatus::Ignored),
        "parked" => Ok(WebhookEventStatus::Parked),
        "failed" => Ok(WebhookEventStatus::Failed),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid webhook event status value: {}", value),
        )),
    }
}
