//! Notification adapters.
//!
//! - `TracingNotificationSender` - Structured-log emission for the delivery
//!   pipeline (and a safe default everywhere else)
//! - `RecordingNotificationSender` - Capture-only sender for tests

mod recording_sender;
mod tracing_sender;

pub use recording_sender::RecordingNotificationSender;
pub use tracing_sender::TracingNotificationSender;
