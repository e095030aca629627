//! Redb table definitions for the durable keyed store.

use redb::TableDefinition;

// Scalar keys (cache pairs, route maps)
pub const KV: TableDefinition<&str, &str> = TableDefinition::new("kv");

// Streams
// Key: (stream, seq), Value: bincode-encoded Fields
pub const STREAM_ENTRIES: TableDefinition<(&str, u64), &[u8]> =
    TableDefinition::new("stream_entries");
// Key: stream, Value: last assigned seq
pub const STREAM_SEQ: TableDefinition<&str, u64> = TableDefinition::new("stream_seq");

// Consumer groups
// Key: (stream, group), Value: last delivered seq
pub const STREAM_GROUPS: TableDefinition<(&str, &str), u64> =
    TableDefinition::new("stream_groups");
// Key: (stream, group, seq), Value: bincode-encoded StoredDelivery
pub const STREAM_PENDING: TableDefinition<(&str, &str, u64), &[u8]> =
    TableDefinition::new("stream_pending");
