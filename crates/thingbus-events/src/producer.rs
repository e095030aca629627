//! Stream producers.
//!
//! Appends never wait on consumers: the store keeps a separate cursor per
//! consumer group, so a stalled group cannot hold a producer back.

use crate::error::{EventError, EventResult};
use crate::event::LifecycleEvent;
use std::sync::Arc;
use thingbus_common::THINGS_STREAM;
use thingbus_store::{EntryId, Fields, StreamStore};
use tracing::{debug, warn};

/// A fact that can be appended to a stream.
pub trait StreamEvent: Send + Sync {
    /// Tag used in logs
    fn operation(&self) -> &str;

    /// Attribute map appended to the stream
    fn encode(&self) -> Fields;
}

impl StreamEvent for LifecycleEvent {
    fn operation(&self) -> &str {
        Self::operation(self)
    }

    fn encode(&self) -> Fields {
        Self::encode(self)
    }
}

/// Appends events to one named stream.
#[derive(Clone)]
pub struct Producer {
    store: Arc<dyn StreamStore>,
    stream: String,
}

impl Producer {
    pub fn new(store: Arc<dyn StreamStore>, stream: impl Into<String>) -> Self {
        Self {
            store,
            stream: stream.into(),
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Append `event` and return the id the store assigned to it.
    pub async fn publish<E: StreamEvent + ?Sized>(&self, event: &E) -> EventResult<EntryId> {
        let id = self
            .store
            .append(&self.stream, &event.encode())
            .await
            .map_err(|source| EventError::Append {
                stream: self.stream.clone(),
                source,
            })?;
        debug!("Appended {} to {} as {}", event.operation(), self.stream, id);
        Ok(id)
    }

    /// Append `event`, logging instead of returning a failure.
    pub async fn publish_best_effort<E: StreamEvent + ?Sized>(&self, event: &E) -> Option<EntryId> {
        match self.publish(event).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Dropped {} event: {}", event.operation(), e);
                None
            }
        }
    }
}

/// Lifecycle notifier used by the authoritative service after each commit.
#[derive(Clone)]
pub struct EventProducer {
    producer: Producer,
}

impl EventProducer {
    /// Producer for the well-known lifecycle stream
    pub fn new(store: Arc<dyn StreamStore>) -> Self {
        Self::with_stream(store, THINGS_STREAM)
    }

    pub fn with_stream(store: Arc<dyn StreamStore>, stream: impl Into<String>) -> Self {
        Self {
            producer: Producer::new(store, stream),
        }
    }

    /// Record a lifecycle fact.
    ///
    /// The entity write has already committed when this is called, so a
    /// failure is logged as a warning and handed back for the caller to
    /// report. Projections drift until the entity is written again.
    pub async fn notify(&self, event: &LifecycleEvent) -> EventResult<EntryId> {
        self.producer.publish(event).await.inspect_err(|e| {
            warn!(
                "Lifecycle notification for {:?} not recorded, projections will drift: {}",
                event.entity().map(|(_, id)| id),
                e
            );
        })
    }
}
