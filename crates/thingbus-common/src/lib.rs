//! Thingbus Common - Shared types and utilities
//!
//! This crate provides the configuration structures, well-known names and
//! the process-level error type used across all Thingbus services.

pub mod config;
pub mod error;

pub use config::{
    Config, EventsConfig, GroupStartConfig, LoggingConfig, RouteClassConfig, RouteMapConfig,
    StoreBackend, StoreConfig,
};
pub use error::{Error, Result};

/// Stream carrying entity lifecycle facts from the things service.
pub const THINGS_STREAM: &str = "thingbus.things";

/// Stream carrying MQTT adapter connect/disconnect events.
pub const MQTT_STREAM: &str = "thingbus.mqtt";
