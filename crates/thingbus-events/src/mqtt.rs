//! MQTT adapter connection events.
//!
//! The MQTT adapter reports client connects and disconnects on its own
//! stream for audit consumers. Nothing in this workspace subscribes to it.

use crate::producer::{Producer, StreamEvent};
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use thingbus_common::MQTT_STREAM;
use thingbus_store::{EntryId, Fields, StreamStore};

/// Kind of connection change at the protocol edge
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connect,
    Disconnect,
}

impl ConnectionEvent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
        }
    }

    const fn operation(self) -> &'static str {
        match self {
            Self::Connect => "mqtt.connect",
            Self::Disconnect => "mqtt.disconnect",
        }
    }
}

/// A client connected to or disconnected from an adapter instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEvent {
    /// MQTT client id, which is the thing id
    pub thing_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: ConnectionEvent,
    /// Adapter instance that observed the change
    pub instance: String,
}

impl StreamEvent for MqttEvent {
    fn operation(&self) -> &str {
        self.event_type.operation()
    }

    fn encode(&self) -> Fields {
        Fields::from([
            ("thing_id".to_string(), self.thing_id.clone()),
            (
                "timestamp".to_string(),
                self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            ("event_type".to_string(), self.event_type.as_str().to_string()),
            ("instance".to_string(), self.instance.clone()),
        ])
    }
}

/// Best-effort producer of [`MqttEvent`]s for one adapter instance.
#[derive(Clone)]
pub struct ProtocolEventProducer {
    producer: Producer,
    instance: String,
}

impl ProtocolEventProducer {
    /// Producer for the well-known MQTT stream
    pub fn new(store: Arc<dyn StreamStore>, instance: impl Into<String>) -> Self {
        Self {
            producer: Producer::new(store, MQTT_STREAM),
            instance: instance.into(),
        }
    }

    pub async fn connect(&self, thing_id: &str) -> Option<EntryId> {
        self.record(thing_id, ConnectionEvent::Connect).await
    }

    pub async fn disconnect(&self, thing_id: &str) -> Option<EntryId> {
        self.record(thing_id, ConnectionEvent::Disconnect).await
    }

    async fn record(&self, thing_id: &str, event_type: ConnectionEvent) -> Option<EntryId> {
        let event = MqttEvent {
            thing_id: thing_id.to_string(),
            timestamp: Utc::now(),
            event_type,
            instance: self.instance.clone(),
        };
        self.producer.publish_best_effort(&event).await
    }
}
