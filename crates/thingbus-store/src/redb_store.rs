//! Durable keyed store backed by redb.
//!
//! Every mutating call runs in a single write transaction, so multi-key
//! deletes, group reads (cursor move + pending insert), acks and claims
//! are atomic and survive a crash between calls. Field maps and pending
//! deliveries are bincode-encoded.

use crate::error::{StoreError, StoreResult};
use crate::tables;
use crate::types::{EntryId, Fields, GroupStart, PendingEntry, ReadMode, StreamEntry};
use crate::{KvStore, StreamStore, read_blocking};
use async_trait::async_trait;
use redb::{Database, ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDelivery {
    consumer: String,
    delivered_at_ms: u64,
    deliveries: u32,
}

/// Durable implementation of [`KvStore`] and [`StreamStore`].
pub struct RedbStore {
    db: Database,
    appended: watch::Sender<u64>,
}

impl RedbStore {
    /// Open (or create) the redb database at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Create all tables eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(tables::KV)?;
            let _t = write_txn.open_table(tables::STREAM_ENTRIES)?;
            let _t = write_txn.open_table(tables::STREAM_SEQ)?;
            let _t = write_txn.open_table(tables::STREAM_GROUPS)?;
            let _t = write_txn.open_table(tables::STREAM_PENDING)?;
        }
        write_txn.commit()?;
        debug!("Opened keyed store at {}", path.display());

        let (appended, _) = watch::channel(0);
        Ok(Self { db, appended })
    }

    fn write<T>(&self, f: impl FnOnce(&WriteTransaction) -> StoreResult<T>) -> StoreResult<T> {
        let txn = self.db.begin_write()?;
        let out = f(&txn)?;
        txn.commit()?;
        Ok(out)
    }

    /// Whether the group has undelivered entries, checked in a read txn so
    /// idle polls never take the writer lock.
    fn has_new(&self, stream: &str, group: &str) -> StoreResult<bool> {
        let read_txn = self.db.begin_read()?;
        let groups = read_txn.open_table(tables::STREAM_GROUPS)?;
        let last = groups
            .get((stream, group))?
            .map(|v| v.value())
            .ok_or_else(|| StoreError::no_such_group(stream, group))?;
        let seqs = read_txn.open_table(tables::STREAM_SEQ)?;
        Ok(seqs.get(stream)?.is_some_and(|v| v.value() > last))
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

fn ensure_group(txn: &WriteTransaction, stream: &str, group: &str) -> StoreResult<u64> {
    let groups = txn.open_table(tables::STREAM_GROUPS)?;
    let cursor = groups.get((stream, group))?.map(|v| v.value());
    cursor.ok_or_else(|| StoreError::no_such_group(stream, group))
}

fn load_fields(
    txn: &WriteTransaction,
    stream: &str,
    seq: u64,
) -> StoreResult<Option<Fields>> {
    let entries = txn.open_table(tables::STREAM_ENTRIES)?;
    let fields = entries
        .get((stream, seq))?
        .map(|v| bincode::deserialize::<Fields>(v.value()))
        .transpose()?;
    Ok(fields)
}

fn read_new(
    txn: &WriteTransaction,
    stream: &str,
    group: &str,
    consumer: &str,
    count: usize,
) -> StoreResult<Vec<StreamEntry>> {
    let last = ensure_group(txn, stream, group)?;

    let mut batch = Vec::new();
    {
        let entries = txn.open_table(tables::STREAM_ENTRIES)?;
        for item in entries.range((stream, last + 1)..=(stream, u64::MAX))?.take(count) {
            let (key, value) = item?;
            let (_, seq) = key.value();
            batch.push(StreamEntry {
                id: EntryId::new(seq),
                fields: bincode::deserialize(value.value())?,
                deliveries: 1,
            });
        }
    }

    if let Some(tail) = batch.last() {
        let mut groups = txn.open_table(tables::STREAM_GROUPS)?;
        groups.insert((stream, group), tail.id.get())?;

        let record = bincode::serialize(&StoredDelivery {
            consumer: consumer.to_string(),
            delivered_at_ms: now_ms(),
            deliveries: 1,
        })?;
        let mut pending = txn.open_table(tables::STREAM_PENDING)?;
        for entry in &batch {
            pending.insert((stream, group, entry.id.get()), record.as_slice())?;
        }
    }
    Ok(batch)
}

/// Select pending deliveries after `after` matching `pick`, re-stamp them
/// for `consumer` and return the underlying entries.
fn redeliver(
    txn: &WriteTransaction,
    stream: &str,
    group: &str,
    consumer: &str,
    after: u64,
    count: usize,
    pick: impl Fn(&StoredDelivery) -> bool,
) -> StoreResult<Vec<StreamEntry>> {
    ensure_group(txn, stream, group)?;

    let mut selected = Vec::new();
    {
        let pending = txn.open_table(tables::STREAM_PENDING)?;
        for item in pending.range((stream, group, after + 1)..=(stream, group, u64::MAX))? {
            if selected.len() >= count {
                break;
            }
            let (key, value) = item?;
            let delivery: StoredDelivery = bincode::deserialize(value.value())?;
            if pick(&delivery) {
                selected.push((key.value().2, delivery));
            }
        }
    }

    let now = now_ms();
    let mut batch = Vec::with_capacity(selected.len());
    for (seq, mut delivery) in selected {
        let Some(fields) = load_fields(txn, stream, seq)? else {
            continue;
        };
        delivery.consumer = consumer.to_string();
        delivery.deliveries += 1;
        delivery.delivered_at_ms = now;
        let bytes = bincode::serialize(&delivery)?;
        txn.open_table(tables::STREAM_PENDING)?
            .insert((stream, group, seq), bytes.as_slice())?;
        batch.push(StreamEntry {
            id: EntryId::new(seq),
            fields,
            deliveries: delivery.deliveries,
        });
    }
    Ok(batch)
}

#[async_trait]
impl KvStore for RedbStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::KV)?;
        let value = table.get(key)?.map(|v| v.value().to_string());
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.write(|txn| {
            let mut table = txn.open_table(tables::KV)?;
            table.insert(key, value)?;
            Ok(())
        })
    }

    async fn delete(&self, keys: &[&str]) -> StoreResult<u64> {
        self.write(|txn| {
            let mut table = txn.open_table(tables::KV)?;
            let mut removed = 0;
            for key in keys {
                if table.remove(*key)?.is_some() {
                    removed += 1;
                }
            }
            Ok(removed)
        })
    }
}

#[async_trait]
impl StreamStore for RedbStore {
    async fn append(&self, stream: &str, fields: &Fields) -> StoreResult<EntryId> {
        let bytes = bincode::serialize(fields)?;
        let seq = self.write(|txn| {
            let mut seqs = txn.open_table(tables::STREAM_SEQ)?;
            let next = seqs.get(stream)?.map_or(0, |v| v.value()) + 1;
            seqs.insert(stream, next)?;
            let mut entries = txn.open_table(tables::STREAM_ENTRIES)?;
            entries.insert((stream, next), bytes.as_slice())?;
            Ok(next)
        })?;
        self.appended.send_replace(seq);
        Ok(EntryId::new(seq))
    }

    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        start: GroupStart,
    ) -> StoreResult<bool> {
        self.write(|txn| {
            let mut groups = txn.open_table(tables::STREAM_GROUPS)?;
            if groups.get((stream, group))?.is_some() {
                return Ok(false);
            }
            let cursor = match start {
                GroupStart::Beginning => 0,
                GroupStart::Latest => {
                    let seqs = txn.open_table(tables::STREAM_SEQ)?;
                    let last = seqs.get(stream)?.map_or(0, |v| v.value());
                    drop(seqs);
                    last
                }
            };
            groups.insert((stream, group), cursor)?;
            Ok(true)
        })
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
                    if !self.has_new(stream, group)? {
                        return Ok(Vec::new());
                    }
                    self.write(|txn| read_new(txn, stream, group, consumer, count))
                })
                .await
            }
            ReadMode::Pending { after } => self.write(|txn| {
                redeliver(txn, stream, group, consumer, after.get(), count, |d| {
                    d.consumer == consumer
                })
            }),
        }
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[EntryId]) -> StoreResult<u64> {
        self.write(|txn| {
            ensure_group(txn, stream, group)?;
            let mut pending = txn.open_table(tables::STREAM_PENDING)?;
            let mut acked = 0;
            for id in ids {
                if pending.remove((stream, group, id.get()))?.is_some() {
                    acked += 1;
                }
            }
            Ok(acked)
        })
    }

    async fn claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>> {
        let min_idle_ms = u64::try_from(min_idle.as_millis()).unwrap_or(u64::MAX);
        let now = now_ms();
        self.write(|txn| {
            redeliver(txn, stream, group, consumer, 0, count, |d| {
                now.saturating_sub(d.delivered_at_ms) >= min_idle_ms
            })
        })
    }

    async fn pending(&self, stream: &str, group: &str) -> StoreResult<Vec<PendingEntry>> {
        let read_txn = self.db.begin_read()?;
        let groups = read_txn.open_table(tables::STREAM_GROUPS)?;
        if groups.get((stream, group))?.is_none() {
            return Err(StoreError::no_such_group(stream, group));
        }
        let table = read_txn.open_table(tables::STREAM_PENDING)?;
        let now = now_ms();
        let mut result = Vec::new();
        for item in table.range((stream, group, 0)..=(stream, group, u64::MAX))? {
            let (key, value) = item?;
            let delivery: StoredDelivery = bincode::deserialize(value.value())?;
            result.push(PendingEntry {
                id: EntryId::new(key.value().2),
                consumer: delivery.consumer,
                deliveries: delivery.deliveries,
                idle: Duration::from_millis(now.saturating_sub(delivery.delivered_at_ms)),
            });
        }
        Ok(result)
    }
}
