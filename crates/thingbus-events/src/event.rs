//! Lifecycle event vocabulary.
//!
//! On the wire a lifecycle record is a flat attribute map whose `operation`
//! attribute carries the tag. In code it is the closed [`LifecycleEvent`]
//! enum, so a projection that forgets a variant fails to compile.

use crate::error::DecodeError;
use thingbus_store::Fields;

/// Attribute holding the operation tag
pub const OPERATION: &str = "operation";

const ID: &str = "id";
const OWNER: &str = "owner";
const NAME: &str = "name";
const EXTERNAL_ID: &str = "external_id";
const METADATA: &str = "metadata";
const CHANNEL_ID: &str = "chan_id";
const THING_ID: &str = "thing_id";

pub const THING_CREATE: &str = "thing.create";
pub const THING_UPDATE: &str = "thing.update";
pub const THING_REMOVE: &str = "thing.remove";
pub const THING_CONNECT: &str = "thing.connect";
pub const THING_DISCONNECT: &str = "thing.disconnect";
pub const CHANNEL_CREATE: &str = "channel.create";
pub const CHANNEL_UPDATE: &str = "channel.update";
pub const CHANNEL_REMOVE: &str = "channel.remove";

/// Class of entity a lifecycle fact is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Thing,
    Channel,
}

impl EntityKind {
    const fn tags(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::Thing => (THING_CREATE, THING_UPDATE, THING_REMOVE),
            Self::Channel => (CHANNEL_CREATE, CHANNEL_UPDATE, CHANNEL_REMOVE),
        }
    }
}

/// An immutable fact about an entity, as appended to the lifecycle stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    Created {
        kind: EntityKind,
        id: String,
        owner: String,
        name: Option<String>,
        /// Identifier of the entity on an external protocol network
        external_id: Option<String>,
        /// Free-form JSON document
        metadata: Option<String>,
    },
    Updated {
        kind: EntityKind,
        id: String,
        name: Option<String>,
        external_id: Option<String>,
        metadata: Option<String>,
    },
    Removed {
        kind: EntityKind,
        id: String,
    },
    Connected {
        channel_id: String,
        thing_id: String,
    },
    Disconnected {
        channel_id: String,
        thing_id: String,
    },
}

impl LifecycleEvent {
    /// Wire tag of this event
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Created { kind, .. } => kind.tags().0,
            Self::Updated { kind, .. } => kind.tags().1,
            Self::Removed { kind, .. } => kind.tags().2,
            Self::Connected { .. } => THING_CONNECT,
            Self::Disconnected { .. } => THING_DISCONNECT,
        }
    }

    /// Entity class and internal id, for events about a single entity
    #[must_use]
    pub fn entity(&self) -> Option<(EntityKind, &str)> {
        match self {
            Self::Created { kind, id, .. }
            | Self::Updated { kind, id, .. }
            | Self::Removed { kind, id } => Some((*kind, id)),
            Self::Connected { .. } | Self::Disconnected { .. } => None,
        }
    }

    /// Flatten into the attribute map appended to the stream.
    #[must_use]
    pub fn encode(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(OPERATION.to_string(), self.operation().to_string());

        let mut put = |key: &str, value: &str| {
            fields.insert(key.to_string(), value.to_string());
        };
        match self {
            Self::Created {
                id,
                owner,
                name,
                external_id,
                metadata,
                ..
            } => {
                put(ID, id);
                put(OWNER, owner);
                put_opt(&mut put, NAME, name.as_deref());
                put_opt(&mut put, EXTERNAL_ID, external_id.as_deref());
                put_opt(&mut put, METADATA, metadata.as_deref());
            }
            Self::Updated {
                id,
                name,
                external_id,
                metadata,
                ..
            } => {
                put(ID, id);
                put_opt(&mut put, NAME, name.as_deref());
                put_opt(&mut put, EXTERNAL_ID, external_id.as_deref());
                put_opt(&mut put, METADATA, metadata.as_deref());
            }
            Self::Removed { id, .. } => put(ID, id),
            Self::Connected {
                channel_id,
                thing_id,
            }
            | Self::Disconnected {
                channel_id,
                thing_id,
            } => {
                put(CHANNEL_ID, channel_id);
                put(THING_ID, thing_id);
            }
        }
        fields
    }

    /// Parse a stream record.
    ///
    /// Returns `Ok(None)` for tags this build does not know, so producers
    /// can introduce new facts without breaking older consumers.
    pub fn decode(fields: &Fields) -> Result<Option<Self>, DecodeError> {
        let op = fields
            .get(OPERATION)
            .ok_or(DecodeError::MissingOperation)?;

        let event = match op.as_str() {
            THING_CREATE => Self::created(EntityKind::Thing, fields, THING_CREATE)?,
            CHANNEL_CREATE => Self::created(EntityKind::Channel, fields, CHANNEL_CREATE)?,
            THING_UPDATE => Self::updated(EntityKind::Thing, fields, THING_UPDATE)?,
            CHANNEL_UPDATE => Self::updated(EntityKind::Channel, fields, CHANNEL_UPDATE)?,
            THING_REMOVE => Self::Removed {
                kind: EntityKind::Thing,
                id: required(fields, THING_REMOVE, ID)?,
            },
            CHANNEL_REMOVE => Self::Removed {
                kind: EntityKind::Channel,
                id: required(fields, CHANNEL_REMOVE, ID)?,
            },
            THING_CONNECT => Self::Connected {
                channel_id: required(fields, THING_CONNECT, CHANNEL_ID)?,
                thing_id: required(fields, THING_CONNECT, THING_ID)?,
            },
            THING_DISCONNECT => Self::Disconnected {
                channel_id: required(fields, THING_DISCONNECT, CHANNEL_ID)?,
                thing_id: required(fields, THING_DISCONNECT, THING_ID)?,
            },
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    fn created(kind: EntityKind, fields: &Fields, op: &'static str) -> Result<Self, DecodeError> {
        Ok(Self::Created {
            kind,
            id: required(fields, op, ID)?,
            owner: required(fields, op, OWNER)?,
            name: optional(fields, NAME),
            external_id: optional(fields, EXTERNAL_ID),
            metadata: optional(fields, METADATA),
        })
    }

    fn updated(kind: EntityKind, fields: &Fields, op: &'static str) -> Result<Self, DecodeError> {
        Ok(Self::Updated {
            kind,
            id: required(fields, op, ID)?,
            name: optional(fields, NAME),
            external_id: optional(fields, EXTERNAL_ID),
            metadata: optional(fields, METADATA),
        })
    }
}

fn put_opt(put: &mut impl FnMut(&str, &str), key: &str, value: Option<&str>) {
    if let Some(value) = value {
        put(key, value);
    }
}

fn required(
    fields: &Fields,
    operation: &'static str,
    attribute: &'static str,
) -> Result<String, DecodeError> {
    optional(fields, attribute).ok_or(DecodeError::MissingAttribute {
        operation,
        attribute,
    })
}

// Empty attributes are treated as absent
fn optional(fields: &Fields, attribute: &str) -> Option<String> {
    fields.get(attribute).filter(|v| !v.is_empty()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_encode_created_thing() {
        let event = LifecycleEvent::Created {
            kind: EntityKind::Thing,
            id: "thing-1".into(),
            owner: "alice@example.com".into(),
            name: None,
            external_id: Some("dev-42".into()),
            metadata: None,
        };
        let fields = event.encode();
        assert_eq!(fields[OPERATION], "thing.create");
        assert_eq!(fields["id"], "thing-1");
        assert_eq!(fields["external_id"], "dev-42");
        assert!(!fields.contains_key("name"));
        assert_eq!(LifecycleEvent::decode(&fields).unwrap(), Some(event));
    }

    #[test]
    fn test_decode_connect() {
        let fields = record(&[
            ("operation", "thing.connect"),
            ("chan_id", "chan-1"),
            ("thing_id", "thing-1"),
        ]);
        let event = LifecycleEvent::decode(&fields).unwrap().unwrap();
        assert_eq!(
            event,
            LifecycleEvent::Connected {
                channel_id: "chan-1".into(),
                thing_id: "thing-1".into(),
            }
        );
        assert_eq!(event.entity(), None);
    }

    #[test]
    fn test_decode_channel_remove() {
        let fields = record(&[("operation", "channel.remove"), ("id", "chan-9")]);
        let event = LifecycleEvent::decode(&fields).unwrap().unwrap();
        assert_eq!(event.entity(), Some((EntityKind::Channel, "chan-9")));
        assert_eq!(event.operation(), CHANNEL_REMOVE);
    }

    #[test]
    fn test_unknown_tag_is_ignored() {
        let fields = record(&[("operation", "thing.share"), ("id", "thing-1")]);
        assert_eq!(LifecycleEvent::decode(&fields).unwrap(), None);
    }

    #[test]
    fn test_missing_attributes_are_malformed() {
        let fields = record(&[("operation", "thing.create"), ("id", "thing-1")]);
        assert_eq!(
            LifecycleEvent::decode(&fields).unwrap_err(),
            DecodeError::MissingAttribute {
                operation: "thing.create",
                attribute: "owner",
            }
        );

        let fields = record(&[("id", "thing-1")]);
        assert_eq!(
            LifecycleEvent::decode(&fields).unwrap_err(),
            DecodeError::MissingOperation
        );
    }

    #[test]
    fn test_empty_attribute_counts_as_missing() {
        let fields = record(&[("operation", "thing.remove"), ("id", "")]);
        assert!(LifecycleEvent::decode(&fields).is_err());
    }
}
