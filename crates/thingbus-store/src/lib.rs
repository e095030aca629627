//! Thingbus Store - keyed store and durable stream contracts
//!
//! Services never talk to a concrete store directly. Caches are written
//! against [`KvStore`] and subscriptions against [`StreamStore`], with two
//! backends:
//!
//! - [`MemoryStore`]: lock-guarded maps, used by tests and single-process setups
//! - [`RedbStore`]: durable single-file store backed by redb, usable by one
//!   process at a time
//! - [`RemoteStore`]: client of a [`StoreServer`], which exposes one backend
//!   to every service of a deployment over TCP
//!
//! Consumer-group cursors and pending-entries lists live in the store.
//! Callers only issue read/ack calls and never keep a local copy.

pub mod error;
pub mod memory;
pub mod redb_store;
pub mod remote;
pub mod server;
pub mod tables;
pub mod types;
pub mod wire;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use redb_store::RedbStore;
pub use remote::RemoteStore;
pub use server::StoreServer;
pub use types::{EntryId, Fields, GroupStart, PendingEntry, ReadMode, StreamEntry};

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;

/// Scalar key/value operations.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a key. A missing key is `Ok(None)`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a key, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Delete all given keys in one atomic step, returning how many existed.
    async fn delete(&self, keys: &[&str]) -> StoreResult<u64>;
}

/// Append-only streams with consumer groups.
#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Append an entry and return its store-assigned id.
    async fn append(&self, stream: &str, fields: &Fields) -> StoreResult<EntryId>;

    /// Create a consumer group. Returns `false` if it already exists.
    async fn create_group(&self, stream: &str, group: &str, start: GroupStart)
    -> StoreResult<bool>;

    /// Read entries for `consumer` within `group`.
    ///
    /// [`ReadMode::New`] moves the group cursor and records the returned
    /// entries in the pending list under `consumer`, waiting up to `block`
    /// when nothing is available. [`ReadMode::Pending`] re-delivers the
    /// consumer's own unacknowledged entries.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        mode: ReadMode,
        count: usize,
        block: Duration,
    ) -> StoreResult<Vec<StreamEntry>>;

    /// Acknowledge entries, removing them from the pending list.
    async fn ack(&self, stream: &str, group: &str, ids: &[EntryId]) -> StoreResult<u64>;

    /// Transfer entries idle for at least `min_idle` to `consumer`.
    async fn claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>>;

    /// List the group's pending entries in id order.
    async fn pending(&self, stream: &str, group: &str) -> StoreResult<Vec<PendingEntry>>;
}

/// Retry `attempt` until it yields entries, an append is missed for
/// `block`, or it fails. Readers are woken through the `appended` channel.
pub(crate) async fn read_blocking<F>(
    appended: &watch::Sender<u64>,
    block: Duration,
    mut attempt: F,
) -> StoreResult<Vec<StreamEntry>>
where
    F: FnMut() -> StoreResult<Vec<StreamEntry>> + Send,
{
    let mut rx = appended.subscribe();
    let deadline = tokio::time::Instant::now() + block;
    loop {
        rx.borrow_and_update();
        let entries = attempt()?;
        if !entries.is_empty() {
            return Ok(entries);
        }
        match tokio::time::timeout_at(deadline, rx.changed()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) | Err(_) => return Ok(Vec::new()),
        }
    }
}
