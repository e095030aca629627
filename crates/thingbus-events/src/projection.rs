//! Route-map projection maintained from the lifecycle stream.
//!
//! A protocol adapter never writes its route maps itself. This handler
//! keeps them in step with the authoritative service: created and updated
//! entities that carry a foreign identifier are mapped, removed entities
//! are forgotten. Updates without a foreign identifier leave the route as
//! it is. Connection facts do not affect routing.

use crate::error::EventResult;
use crate::event::{EntityKind, LifecycleEvent};
use crate::subscriber::EventHandler;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thingbus_cache::RouteMap;
use thingbus_common::{RouteClassConfig, RouteMapConfig};
use thingbus_store::KvStore;
use tracing::{debug, warn};

/// Route map of one entity class plus where its foreign id lives in metadata
#[derive(Clone)]
struct RouteClass {
    map: RouteMap,
    metadata_pointer: String,
}

impl RouteClass {
    fn new(store: Arc<dyn KvStore>, config: &RouteClassConfig) -> Self {
        Self {
            map: RouteMap::new(store, &config.prefix),
            metadata_pointer: config.metadata_pointer.clone(),
        }
    }

    /// Foreign id from the explicit attribute, else from the metadata document
    fn foreign_id(&self, external_id: Option<&str>, metadata: Option<&str>) -> Option<String> {
        if let Some(id) = external_id {
            return Some(id.to_string());
        }
        let doc: Value = match serde_json::from_str(metadata?) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Ignoring unparsable entity metadata: {}", e);
                return None;
            }
        };
        match doc.pointer(&self.metadata_pointer)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// [`EventHandler`] that projects lifecycle facts into thing and channel
/// route maps.
#[derive(Clone)]
pub struct RouteProjection {
    things: RouteClass,
    channels: RouteClass,
}

impl RouteProjection {
    pub fn new(store: Arc<dyn KvStore>, config: &RouteMapConfig) -> Self {
        Self {
            things: RouteClass::new(store.clone(), &config.thing),
            channels: RouteClass::new(store, &config.channel),
        }
    }

    /// Device id <-> thing id map
    pub fn things(&self) -> &RouteMap {
        &self.things.map
    }

    /// Application id <-> channel id map
    pub fn channels(&self) -> &RouteMap {
        &self.channels.map
    }

    const fn class(&self, kind: EntityKind) -> &RouteClass {
        match kind {
            EntityKind::Thing => &self.things,
            EntityKind::Channel => &self.channels,
        }
    }
}

#[async_trait]
impl EventHandler for RouteProjection {
    async fn handle(&self, event: &LifecycleEvent) -> EventResult<()> {
        match event {
            LifecycleEvent::Created {
                kind,
                id,
                external_id,
                metadata,
                ..
            } => {
                let class = self.class(*kind);
                match class.foreign_id(external_id.as_deref(), metadata.as_deref()) {
                    Some(foreign) => {
                        class.map.save(&foreign, id).await?;
                        debug!("Mapped {:?} {} to {}", kind, id, foreign);
                    }
                    None => debug!("{:?} {} has no foreign id, not routed", kind, id),
                }
            }
            LifecycleEvent::Updated {
                kind,
                id,
                external_id,
                metadata,
                ..
            } => {
                // An update without a foreign id (a rename, say) keeps the route;
                // saving a new one unlinks the previous pair
                let class = self.class(*kind);
                match class.foreign_id(external_id.as_deref(), metadata.as_deref()) {
                    Some(foreign) => {
                        class.map.save(&foreign, id).await?;
                        debug!("Remapped {:?} {} to {}", kind, id, foreign);
                    }
                    None => debug!(
                        "Update of {:?} {} carries no foreign id, route kept",
                        kind, id
                    ),
                }
            }
            LifecycleEvent::Removed { kind, id } => {
                if self.class(*kind).map.remove(id).await? {
                    debug!("Unmapped {:?} {}", kind, id);
                }
            }
            LifecycleEvent::Connected { .. } | LifecycleEvent::Disconnected { .. } => {}
        }
        Ok(())
    }
}
