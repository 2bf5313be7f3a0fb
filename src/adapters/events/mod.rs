//! Event bus adapters.
//!
//! Adapters implement the event publishing port for different environments:
//!
//! - `InMemoryEventBus` - Synchronous, in-process capture for testing
//! - `TracingEventPublisher` - Structured-log emission for production

mod in_memory;
mod tracing_publisher;

pub use in_memory::InMemoryEventBus;
pub use tracing_publisher::TracingEventPublisher;
