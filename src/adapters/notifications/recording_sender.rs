//! Recording notification sender for testing.
//!
//! Captures every notification handed to it so tests can assert on what
//! the pipeline tried to send, and can simulate delivery failures to
//! exercise the best-effort contract.
//!
//! # Security Note
//!
//! This adapter is for tests and local development runs only.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::ports::{Notification, NotificationSender};

/// Notification sender that records instead of delivering.
#[derive(Default)]
pub struct RecordingNotificationSender {
    inner: Arc<Mutex<RecorderState>>,
}

#[derive(Default)]
struct RecorderState {
    sent: Vec<Notification>,
    next_error: Option<DomainError>,
}

impl RecordingNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications sent so far, in order.
    pub fn sent(&self) -> Vec<Notification> {
        self.inner
            .lock()
            .expect("RecordingNotificationSender: lock poisoned")
            .sent
            .clone()
    }

    /// Notifications of one kind (see [`Notification::kind`]).
    pub fn sent_of_kind(&self, kind: &str) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.kind() == kind)
            .collect()
    }

    /// Count of sent notifications.
    pub fn count(&self) -> usize {
        self.inner
            .lock()
            .expect("RecordingNotificationSender: lock poisoned")
            .sent
            .len()
    }

    /// Fail the next send with the given error (consumed once).
    pub fn set_error(&self, error: DomainError) {
        self.inner
            .lock()
            .expect("RecordingNotificationSender: lock poisoned")
            .next_error = Some(error);
    }
}

impl Clone for RecordingNotificationSender {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl NotificationSender for RecordingNotificationSender {
    async fn send(&self, notification: Notification) -> Result<(), DomainError> {
        let mut state = self
            .inner
            .lock()
            .expect("RecordingNotificationSender: lock poisoned");

        if let Some(error) = state.next_error.take() {
            return Err(error);
        }

        state.sent.push(notification);
        Ok(())
    }
}
