//! Uplink and downlink id translation.

use thingbus_cache::{CacheError, RouteMap};
use thiserror::Error;

/// Errors returned to the LoRa side of the adapter.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("unknown device '{0}'")]
    UnknownDevice(String),

    #[error("unknown channel '{0}'")]
    UnknownChannel(String),

    #[error("route lookup failed: {0}")]
    Lookup(#[source] CacheError),
}

impl AdapterError {
    /// Check if the message was rejected because its ids are not routed
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::UnknownDevice(_) | Self::UnknownChannel(_))
    }
}

/// Thingbus ids of an uplink message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceRoute {
    pub thing_id: String,
    pub channel_id: String,
}

/// LoRa ids of a downlink message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelRoute {
    pub dev_eui: String,
    pub app_id: String,
}

/// Resolves ids through the thing and channel route maps.
///
/// A miss is never guessed around: the message is rejected.
#[derive(Clone)]
pub struct LoraAdapter {
    things: RouteMap,
    channels: RouteMap,
}

impl LoraAdapter {
    pub const fn new(things: RouteMap, channels: RouteMap) -> Self {
        Self { things, channels }
    }

    /// Resolve the sender of an uplink message.
    pub async fn uplink(&self, dev_eui: &str, app_id: &str) -> Result<DeviceRoute, AdapterError> {
        let thing_id = self
            .things
            .get(dev_eui)
            .await
            .map_err(|e| unresolved(e, AdapterError::UnknownDevice(dev_eui.to_string())))?;
        let channel_id = self
            .channels
            .get(app_id)
            .await
            .map_err(|e| unresolved(e, AdapterError::UnknownChannel(app_id.to_string())))?;
        Ok(DeviceRoute {
            thing_id,
            channel_id,
        })
    }

    /// Resolve the recipient of a downlink message.
    pub async fn downlink(
        &self,
        thing_id: &str,
        channel_id: &str,
    ) -> Result<ChannelRoute, AdapterError> {
        let dev_eui = self
            .things
            .foreign_id(thing_id)
            .await
            .map_err(|e| unresolved(e, AdapterError::UnknownDevice(thing_id.to_string())))?;
        let app_id = self
            .channels
            .foreign_id(channel_id)
            .await
            .map_err(|e| unresolved(e, AdapterError::UnknownChannel(channel_id.to_string())))?;
        Ok(ChannelRoute { dev_eui, app_id })
    }
}

fn unresolved(err: CacheError, unknown: AdapterError) -> AdapterError {
    if err.is_not_found() {
        unknown
    } else {
        AdapterError::Lookup(err)
    }
}
