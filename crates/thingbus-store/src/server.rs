//! TCP server exposing one store to many processes.
//!
//! The embedded redb file is locked by the process that opens it. Services
//! that share a store (the things service producing lifecycle facts, the
//! protocol adapters consuming them) run one `thingbus-stored` and reach it
//! through [`RemoteStore`](crate::RemoteStore).

use crate::error::{StoreError, StoreResult};
use crate::wire::{self, Request, Response};
use crate::{KvStore, StreamStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Serves [`KvStore`] and [`StreamStore`] calls of remote clients against
/// a local backend.
pub struct StoreServer<B> {
    backend: Arc<B>,
}

impl<B> StoreServer<B>
where
    B: KvStore + StreamStore + 'static,
{
    pub const fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Accept clients until the task is dropped. Each connection is
    /// served by its own task.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!("Store server listening on {addr}");
        }

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_client(stream, peer).await {
                            warn!("Store client {peer} error: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Store server accept error: {e}");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn handle_client(
        self: Arc<Self>,
        mut stream: TcpStream,
        peer: SocketAddr,
    ) -> StoreResult<()> {
        debug!("Store client {peer} connected");
        stream.set_nodelay(true)?;
        loop {
            let request: Request = match wire::read_frame(&mut stream).await {
                Ok(request) => request,
                Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("Store client {peer} disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            let op = request.name();
            let response = self.dispatch(request).await;
            if let Response::Error(e) = &response {
                debug!("Store client {peer}: {op} failed: {e:?}");
            }
            wire::write_frame(&mut stream, &response).await?;
        }
    }

    async fn dispatch(&self, request: Request) -> Response {
        let store = &*self.backend;
        let result = match request {
            Request::Get { key } => KvStore::get(store, &key).await.map(Response::Value),
            Request::Set { key, value } => {
                KvStore::set(store, &key, &value).await.map(|()| Response::Done)
            }
            Request::Delete { keys } => {
                let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
                KvStore::delete(store, &keys).await.map(Response::Count)
            }
            Request::Append { stream, fields } => {
                store.append(&stream, &fields).await.map(Response::Id)
            }
            Request::CreateGroup {
                stream,
                group,
                start,
            } => store
                .create_group(&stream, &group, start)
                .await
                .map(Response::Created),
            Request::ReadGroup {
                stream,
                group,
                consumer,
                mode,
                count,
                block,
            } => store
                .read_group(&stream, &group, &consumer, mode, count, block)
                .await
                .map(Response::Entries),
            Request::Ack { stream, group, ids } => {
                store.ack(&stream, &group, &ids).await.map(Response::Count)
            }
            Request::ClaimIdle {
                stream,
                group,
                consumer,
                min_idle,
                count,
            } => store
                .claim_idle(&stream, &group, &consumer, min_idle, count)
                .await
                .map(Response::Entries),
            Request::Pending { stream, group } => {
                store.pending(&stream, &group).await.map(Response::Pending)
            }
        };
        result.unwrap_or_else(|e| Response::Error(e.into()))
    }
}
