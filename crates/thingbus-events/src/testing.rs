//! Store doubles shared by the unit tests of this crate.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use thingbus_store::{
    EntryId, Fields, GroupStart, KvStore, MemoryStore, PendingEntry, ReadMode, StoreError,
    StoreResult, StreamEntry, StreamStore,
};

fn refused() -> StoreError {
    StoreError::Unavailable("connection refused".into())
}

/// Stream store that rejects every call, standing in for an unreachable server.
pub struct DownStore;

#[async_trait]
impl StreamStore for DownStore {
    async fn append(&self, _: &str, _: &Fields) -> StoreResult<EntryId> {
        Err(refused())
    }

    async fn create_group(&self, _: &str, _: &str, _: GroupStart) -> StoreResult<bool> {
        Err(refused())
    }

    async fn read_group(
        &self,
        _: &str,
        _: &str,
        _: &str,
        _: ReadMode,
        _: usize,
        _: Duration,
    ) -> StoreResult<Vec<StreamEntry>> {
        Err(refused())
    }

    async fn ack(&self, _: &str, _: &str, _: &[EntryId]) -> StoreResult<u64> {
        Err(refused())
    }

    async fn claim_idle(
        &self,
        _: &str,
        _: &str,
        _: &str,
        _: Duration,
        _: usize,
    ) -> StoreResult<Vec<StreamEntry>> {
        Err(refused())
    }

    async fn pending(&self, _: &str, _: &str) -> StoreResult<Vec<PendingEntry>> {
        Err(refused())
    }
}

/// Memory store whose next `n` group reads fail with a connection error.
pub struct FlakyStore {
    pub inner: Arc<MemoryStore>,
    failing_reads: AtomicU32,
    pub reads: AtomicU32,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>, failing_reads: u32) -> Self {
        Self {
            inner,
            failing_reads: AtomicU32::new(failing_reads),
            reads: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl StreamStore for FlakyStore {
    async fn append(&self, stream: &str, fields: &Fields) -> StoreResult<EntryId> {
        self.inner.append(stream, fields).await
    }

    async fn create_group(&self, stream: &str, group: &str, start: GroupStart) -> StoreResult<bool> {
        self.inner.create_group(stream, group, start).await
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        mode: ReadMode,
        count: usize,
        block: Duration,
    ) -> StoreResult<Vec<StreamEntry>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(refused());
        }
        self.inner
            .read_group(stream, group, consumer, mode, count, block)
            .await
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[EntryId]) -> StoreResult<u64> {
        self.inner.ack(stream, group, ids).await
    }

    async fn claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>> {
        self.inner
            .claim_idle(stream, group, consumer, min_idle, count)
            .await
    }

    async fn pending(&self, stream: &str, group: &str) -> StoreResult<Vec<PendingEntry>> {
        self.inner.pending(stream, group).await
    }
}

/// Keyed store over a [`MemoryStore`] whose next `n` writes fail.
pub struct FlakyKv {
    pub inner: Arc<MemoryStore>,
    failing_sets: AtomicU32,
}

impl FlakyKv {
    pub fn new(inner: Arc<MemoryStore>, failing_sets: u32) -> Self {
        Self {
            inner,
            failing_sets: AtomicU32::new(failing_sets),
        }
    }
}

#[async_trait]
impl KvStore for FlakyKv {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let failing = self
            .failing_sets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(refused());
        }
        self.inner.set(key, value).await
    }

    async fn delete(&self, keys: &[&str]) -> StoreResult<u64> {
        self.inner.delete(keys).await
    }
}
