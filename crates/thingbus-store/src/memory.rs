//! In-memory keyed store
//!
//! All state sits behind one `RwLock`, so every operation is atomic with
//! respect to the others. Sharing one instance through `Arc` between a
//! producer and several subscribers models separate processes talking to
//! the same store.

use crate::error::{StoreError, StoreResult};
use crate::types::{EntryId, Fields, GroupStart, PendingEntry, ReadMode, StreamEntry};
use crate::{KvStore, StreamStore, read_blocking};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tokio::sync::watch;

#[derive(Debug)]
struct Delivery {
    consumer: String,
    delivered_at: Instant,
    deliveries: u32,
}

#[derive(Debug, Default)]
struct Group {
    last_delivered: u64,
    pending: BTreeMap<u64, Delivery>,
}

#[derive(Debug, Default)]
struct Stream {
    last_id: u64,
    entries: BTreeMap<u64, Fields>,
    groups: HashMap<String, Group>,
}

#[derive(Debug, Default)]
struct Inner {
    kv: HashMap<String, String>,
    streams: HashMap<String, Stream>,
}

/// In-memory implementation of [`KvStore`] and [`StreamStore`].
#[derive(Debug)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    appended: watch::Sender<u64>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        let (appended, _) = watch::channel(0);
        Self {
            inner: RwLock::new(Inner::default()),
            appended,
        }
    }

    /// Number of scalar keys currently stored
    pub fn key_count(&self) -> usize {
        self.inner.read().kv.len()
    }

    /// Number of entries appended to a stream
    pub fn stream_len(&self, stream: &str) -> usize {
        self.inner
            .read()
            .streams
            .get(stream)
            .map_or(0, |s| s.entries.len())
    }

    /// Number of delivered but unacknowledged entries in a group
    pub fn pending_len(&self, stream: &str, group: &str) -> usize {
        self.inner
            .read()
            .streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map_or(0, |g| g.pending.len())
    }

    fn read_once(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        mode: ReadMode,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>> {
        let mut inner = self.inner.write();
        let Some(s) = inner.streams.get_mut(stream) else {
            return Err(StoreError::no_such_group(stream, group));
        };
        let Stream { entries, groups, .. } = s;
        let g = groups
            .get_mut(group)
            .ok_or_else(|| StoreError::no_such_group(stream, group))?;
        let now = Instant::now();

        match mode {
            ReadMode::New => {
                let batch: Vec<StreamEntry> = entries
                    .range(g.last_delivered + 1..)
                    .take(count)
                    .map(|(id, fields)| StreamEntry {
                        id: EntryId::new(*id),
                        fields: fields.clone(),
                        deliveries: 1,
                    })
                    .collect();
                for entry in &batch {
                    g.last_delivered = entry.id.get();
                    g.pending.insert(
                        entry.id.get(),
                        Delivery {
                            consumer: consumer.to_string(),
                            delivered_at: now,
                            deliveries: 1,
                        },
                    );
                }
                Ok(batch)
            }
            ReadMode::Pending { after } => {
                let mut batch = Vec::new();
                for (id, delivery) in g.pending.range_mut(after.get() + 1..) {
                    if batch.len() >= count {
                        break;
                    }
                    if delivery.consumer != consumer {
                        continue;
                    }
                    let Some(fields) = entries.get(id) else {
                        continue;
                    };
                    delivery.deliveries += 1;
                    delivery.delivered_at = now;
                    batch.push(StreamEntry {
                        id: EntryId::new(*id),
                        fields: fields.clone(),
                        deliveries: delivery.deliveries,
                    });
                }
                Ok(batch)
            }
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.inner.read().kv.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.inner
            .write()
            .kv
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, keys: &[&str]) -> StoreResult<u64> {
        let mut inner = self.inner.write();
        let removed = keys
            .iter()
            .filter(|key| inner.kv.remove(**key).is_some())
            .count();
        Ok(removed as u64)
    }
}

#[async_trait]
impl StreamStore for MemoryStore {
    async fn append(&self, stream: &str, fields: &Fields) -> StoreResult<EntryId> {
        let id = {
            let mut inner = self.inner.write();
            let s = inner.streams.entry(stream.to_string()).or_default();
            s.last_id += 1;
            s.entries.insert(s.last_id, fields.clone());
            s.last_id
        };
        self.appended.send_replace(id);
        Ok(EntryId::new(id))
    }

    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        start: GroupStart,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        let s = inner.streams.entry(stream.to_string()).or_default();
        if s.groups.contains_key(group) {
            return Ok(false);
        }
        let last_delivered = match start {
            GroupStart::Beginning => 0,
            GroupStart::Latest => s.last_id,
        };
        s.groups.insert(
            group.to_string(),
            Group {
                last_delivered,
                pending: BTreeMap::new(),
            },
        );
        Ok(true)
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
        match mode {
            ReadMode::New => {
                read_blocking(&self.appended, block, || {
                    self.read_once(stream, group, consumer, mode, count)
                })
                .await
            }
            ReadMode::Pending { .. } => self.read_once(stream, group, consumer, mode, count),
        }
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[EntryId]) -> StoreResult<u64> {
        let mut inner = self.inner.write();
        let g = inner
            .streams
            .get_mut(stream)
            .and_then(|s| s.groups.get_mut(group))
            .ok_or_else(|| StoreError::no_such_group(stream, group))?;
        let acked = ids
            .iter()
            .filter(|id| g.pending.remove(&id.get()).is_some())
            .count();
        Ok(acked as u64)
    }

    async fn claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>> {
        let mut inner = self.inner.write();
        let Some(Stream { entries, groups, .. }) = inner.streams.get_mut(stream) else {
            return Err(StoreError::no_such_group(stream, group));
        };
        let g = groups
            .get_mut(group)
            .ok_or_else(|| StoreError::no_such_group(stream, group))?;
        let now = Instant::now();

        let mut claimed = Vec::new();
        for (id, delivery) in &mut g.pending {
            if claimed.len() >= count {
                break;
            }
            if now.duration_since(delivery.delivered_at) < min_idle {
                continue;
            }
            let Some(fields) = entries.get(id) else {
                continue;
            };
            delivery.consumer = consumer.to_string();
            delivery.deliveries += 1;
            delivery.delivered_at = now;
            claimed.push(StreamEntry {
                id: EntryId::new(*id),
                fields: fields.clone(),
                deliveries: delivery.deliveries,
            });
        }
        Ok(claimed)
    }

    async fn pending(&self, stream: &str, group: &str) -> StoreResult<Vec<PendingEntry>> {
        let inner = self.inner.read();
        let g = inner
            .streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .ok_or_else(|| StoreError::no_such_group(stream, group))?;
        let now = Instant::now();
        Ok(g.pending
            .iter()
            .map(|(id, delivery)| PendingEntry {
                id: EntryId::new(*id),
                consumer: delivery.consumer.clone(),
                deliveries: delivery.deliveries,
                idle: now.duration_since(delivery.delivered_at),
            })
            .collect())
    }
}
