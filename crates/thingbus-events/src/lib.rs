//! Thingbus Events - lifecycle event propagation
//!
//! Facts about entities flow one way: the authoritative service appends
//! them to the lifecycle stream through an [`EventProducer`], and every
//! downstream service replays them into its own projection through a
//! [`Subscription`] under a consumer group named after the service.
//!
//! - [`LifecycleEvent`]: closed vocabulary of lifecycle facts
//! - [`Subscription`]: at-least-once consumer-group loop with crash recovery
//! - [`RouteProjection`]: keeps protocol route maps in step with the stream
//! - [`ProtocolEventProducer`]: best-effort MQTT connection events

pub mod error;
pub mod event;
pub mod mqtt;
pub mod producer;
pub mod projection;
pub mod subscriber;

#[cfg(test)]
mod testing;

pub use error::{DecodeError, EventError, EventResult};
pub use event::{EntityKind, LifecycleEvent};
pub use mqtt::{ConnectionEvent, MqttEvent, ProtocolEventProducer};
pub use producer::{EventProducer, Producer, StreamEvent};
pub use projection::RouteProjection;
pub use subscriber::{
    Backoff, EventHandler, Subscription, SubscriptionHandle, SubscriptionOptions,
};
