//! Event store error types

use thingbus_cache::CacheError;
use thingbus_store::StoreError;
use thiserror::Error;

/// A lifecycle record that carries a known operation tag but cannot be
/// turned into an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("record has no operation attribute")]
    MissingOperation,

    #[error("{operation} record is missing attribute '{attribute}'")]
    MissingAttribute {
        operation: &'static str,
        attribute: &'static str,
    },
}

/// Errors raised by producers, subscriptions and handlers.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("appending to stream '{stream}': {source}")]
    Append { stream: String, source: StoreError },

    #[error("subscribing to stream '{stream}': {source}")]
    Subscribe { stream: String, source: StoreError },

    #[error("reading stream '{stream}': {source}")]
    Read { stream: String, source: StoreError },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("handler error: {0}")]
    Handler(String),

    #[error("subscription task failed: {0}")]
    Task(String),
}

impl EventError {
    /// Create a handler error
    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }
}

pub type EventResult<T> = Result<T, EventError>;
