//! Tracing-based notification sender.
//!
//! Stands in for the email/push delivery pipeline: each notification is
//! emitted as a structured log line that the delivery worker tails. Sending
//! is best-effort by contract, and this sender never fails.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::ports::{Notification, NotificationSender};

/// Emits notifications to the tracing pipeline.
#[derive(Debug, Clone, Default)]
pub struct TracingNotificationSender;

impl TracingNotificationSender {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationSender for TracingNotificationSender {
    async fn send(&self, notification: Notification) -> Result<(), DomainError> {
        match &notification {
            Notification::Welcome { user_id, plan_name } => {
                tracing::info!(
                    kind = notification.kind(),
                    user_id = %user_id,
                    plan_name = %plan_name,
                    "Notification queued"
                );
            }
            Notification::PaymentSucceeded {
                user_id,
                amount_cents,
                currency,
            } => {
                tracing::info!(
                    kind = notification.kind(),
                    user_id = %user_id,
                    amount_cents,
                    currency = %currency,
                    "Notification queued"
                );
            }
            Notification::PaymentFailed {
                user_id,
                attempt_count,
            } => {
                tracing::info!(
                    kind = notification.kind(),
                    user_id = %user_id,
                    attempt_count,
                    "Notification queued"
                );
            }
            Notification::RenewalReminder {
                user_id,
                plan_name,
                days_until_renewal,
            } => {
                tracing::info!(
                    kind = notification.kind(),
                    user_id = %user_id,
                    plan_name = %plan_name,
                    days_until_renewal,
                    "Notification queued"
                );
            }
        }
        Ok(())
    }
}
