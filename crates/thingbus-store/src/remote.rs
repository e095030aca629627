//! Client of a [`StoreServer`](crate::StoreServer).
//!
//! Connections are opened lazily and pooled. A connection that fails in
//! any way is dropped together with the rest of the pool, and the call
//! reports [`StoreError::Unavailable`] so callers retry it like any other
//! connection-class failure.

use crate::error::{StoreError, StoreResult};
use crate::types::{EntryId, Fields, GroupStart, PendingEntry, ReadMode, StreamEntry};
use crate::wire::{self, Request, Response};
use crate::{KvStore, StreamStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// [`KvStore`] and [`StreamStore`] backed by a store server.
pub struct RemoteStore {
    address: String,
    timeout: Duration,
    idle: Mutex<Vec<TcpStream>>,
}

impl RemoteStore {
    /// Client of the server at `address`. `timeout` bounds each request on
    /// top of the blocking wait of group reads.
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
            idle: Mutex::new(Vec::new()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> StoreResult<TcpStream> {
        let connect = TcpStream::connect(&self.address);
        let stream = tokio::time::timeout(self.timeout, connect)
            .await
            .map_err(|_| self.unavailable("connect timed out"))?
            .map_err(|e| self.unavailable(e))?;
        stream.set_nodelay(true).map_err(|e| self.unavailable(e))?;
        debug!("Connected to store server {}", self.address);
        Ok(stream)
    }

    async fn call(&self, request: Request, block: Duration) -> StoreResult<Response> {
        let pooled = self.idle.lock().pop();
        let mut conn = match pooled {
            Some(conn) => conn,
            None => self.connect().await?,
        };

        let op = request.name();
        let exchange = async {
            wire::write_frame(&mut conn, &request).await?;
            wire::read_frame::<_, Response>(&mut conn).await
        };
        let deadline = self.timeout.saturating_add(block);
        let response = match tokio::time::timeout(deadline, exchange).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(self.broken(op, e)),
            Err(_) => return Err(self.broken(op, "request timed out")),
        };

        self.idle.lock().push(conn);
        match response {
            Response::Error(e) => Err(e.into()),
            response => Ok(response),
        }
    }

    /// Forget every pooled connection; they likely share the failure.
    fn broken(&self, op: &str, cause: impl std::fmt::Display) -> StoreError {
        self.idle.lock().clear();
        self.unavailable(format!("{op}: {cause}"))
    }

    fn unavailable(&self, cause: impl std::fmt::Display) -> StoreError {
        StoreError::Unavailable(format!("store server {}: {cause}", self.address))
    }
}

fn unexpected(op: &str, response: &Response) -> StoreError {
    StoreError::Remote(format!("unexpected response to {op}: {response:?}"))
}

#[async_trait]
impl KvStore for RemoteStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let request = Request::Get {
            key: key.to_string(),
        };
        match self.call(request, Duration::ZERO).await? {
            Response::Value(value) => Ok(value),
            other => Err(unexpected("get", &other)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let request = Request::Set {
            key: key.to_string(),
            value: value.to_string(),
        };
        match self.call(request, Duration::ZERO).await? {
            Response::Done => Ok(()),
            other => Err(unexpected("set", &other)),
        }
    }

    async fn delete(&self, keys: &[&str]) -> StoreResult<u64> {
        let request = Request::Delete {
            keys: keys.iter().map(ToString::to_string).collect(),
        };
        match self.call(request, Duration::ZERO).await? {
            Response::Count(n) => Ok(n),
            other => Err(unexpected("delete", &other)),
        }
    }
}

#[async_trait]
impl StreamStore for RemoteStore {
    async fn append(&self, stream: &str, fields: &Fields) -> StoreResult<EntryId> {
        let request = Request::Append {
            stream: stream.to_string(),
            fields: fields.clone(),
        };
        match self.call(request, Duration::ZERO).await? {
            Response::Id(id) => Ok(id),
            other => Err(unexpected("append", &other)),
        }
    }

    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        start: GroupStart,
    ) -> StoreResult<bool> {
        let request = Request::CreateGroup {
            stream: stream.to_string(),
            group: group.to_string(),
            start,
        };
        match self.call(request, Duration::ZERO).await? {
            Response::Created(created) => Ok(created),
            other => Err(unexpected("create_group", &other)),
        }
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
        let request = Request::ReadGroup {
            stream: stream.to_string(),
            group: group.to_string(),
            consumer: consumer.to_string(),
            mode,
            count,
            block,
        };
        match self.call(request, block).await? {
            Response::Entries(entries) => Ok(entries),
            other => Err(unexpected("read_group", &other)),
        }
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[EntryId]) -> StoreResult<u64> {
        let request = Request::Ack {
            stream: stream.to_string(),
            group: group.to_string(),
            ids: ids.to_vec(),
        };
        match self.call(request, Duration::ZERO).await? {
            Response::Count(n) => Ok(n),
            other => Err(unexpected("ack", &other)),
        }
    }

    async fn claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>> {
        let request = Request::ClaimIdle {
            stream: stream.to_string(),
            group: group.to_string(),
            consumer: consumer.to_string(),
            min_idle,
            count,
        };
        match self.call(request, Duration::ZERO).await? {
            Response::Entries(entries) => Ok(entries),
            other => Err(unexpected("claim_idle", &other)),
        }
    }

    async fn pending(&self, stream: &str, group: &str) -> StoreResult<Vec<PendingEntry>> {
        let request = Request::Pending {
            stream: stream.to_string(),
            group: group.to_string(),
        };
        match self.call(request, Duration::ZERO).await? {
            Response::Pending(pending) => Ok(pending),
            other => Err(unexpected("pending", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStore, RedbStore, StoreServer};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    const STREAM: &str = "thingbus.things";

    async fn start<B: KvStore + StreamStore + 'static>(backend: Arc<B>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(Arc::new(StoreServer::new(backend)).serve(listener));
        address
    }

    fn client(address: &str) -> RemoteStore {
        RemoteStore::new(address, Duration::from_secs(2))
    }

    fn fields(op: &str, id: &str) -> Fields {
        Fields::from([
            ("operation".to_string(), op.to_string()),
            ("id".to_string(), id.to_string()),
        ])
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_clients_share_keys_and_streams() {
        let address = start(Arc::new(MemoryStore::new())).await;
        let producer = client(&address);
        let consumer = client(&address);

        producer.set("lora:thing:ext:dev-42", "thing-1").await.unwrap();
        assert_eq!(
            consumer.get("lora:thing:ext:dev-42").await.unwrap().as_deref(),
            Some("thing-1")
        );
        assert_eq!(
            consumer.delete(&["lora:thing:ext:dev-42", "absent"]).await.unwrap(),
            1
        );

        assert!(consumer.create_group(STREAM, "lora", GroupStart::Beginning).await.unwrap());
        let reader = tokio::spawn(async move {
            let entries = consumer
                .read_group(STREAM, "lora", "lora", ReadMode::New, 10, Duration::from_secs(5))
                .await
                .unwrap();
            consumer.ack(STREAM, "lora", &[entries[0].id]).await.unwrap();
            (consumer, entries)
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        producer.append(STREAM, &fields("thing.remove", "thing-1")).await.unwrap();

        let (consumer, entries) = reader.await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].fields["id"], "thing-1");
        assert!(consumer.pending(STREAM, "lora").await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_redb_backend_over_the_wire() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(RedbStore::open(dir.path().join("store.redb")).unwrap());
        let address = start(backend).await;
        let store = client(&address);

        store.create_group(STREAM, "lora", GroupStart::Beginning).await.unwrap();
        store.append(STREAM, &fields("thing.create", "thing-1")).await.unwrap();
        store
            .read_group(STREAM, "lora", "lora-1", ReadMode::New, 10, Duration::ZERO)
            .await
            .unwrap();
        let claimed = store
            .claim_idle(STREAM, "lora", "lora-2", Duration::ZERO, 10)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].deliveries, 2);

        let pending = store.pending(STREAM, "lora").await.unwrap();
        assert_eq!(pending[0].consumer, "lora-2");
    }

    #[tokio::test]
    async fn test_missing_group_keeps_its_class() {
        let address = start(Arc::new(MemoryStore::new())).await;
        let err = client(&address)
            .read_group(STREAM, "ghost", "c", ReadMode::New, 10, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NoSuchGroup { ref group, .. } if group == "ghost"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_retryable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = client(&address).get("k").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(err.is_retryable());
    }
}
