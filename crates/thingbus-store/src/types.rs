//! Stream entry and consumer-group types shared by all store backends.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Flat string attribute map carried by a stream entry.
pub type Fields = BTreeMap<String, String>;

/// Store-assigned position of an entry within one stream.
///
/// Ids are strictly increasing per stream and never reused. Zero is the
/// position before the first entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(u64);

impl EntryId {
    /// Position before the first entry
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An entry delivered to a consumer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEntry {
    pub id: EntryId,
    pub fields: Fields,
    /// How many times this entry has been delivered within the group,
    /// including this delivery.
    pub deliveries: u32,
}

/// A delivered but unacknowledged entry in a group's pending list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub id: EntryId,
    /// Consumer currently owning the entry
    pub consumer: String,
    pub deliveries: u32,
    /// Time since the entry was last delivered
    pub idle: Duration,
}

/// Which entries a group read returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadMode {
    /// Entries never delivered to the group. Blocks up to the read timeout.
    New,
    /// Entries already delivered to the calling consumer and not yet
    /// acknowledged, with id greater than `after`. Never blocks.
    Pending { after: EntryId },
}

/// Starting position of a newly created consumer group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupStart {
    /// Deliver the whole retained history
    #[default]
    Beginning,
    /// Deliver only entries appended after creation
    Latest,
}
