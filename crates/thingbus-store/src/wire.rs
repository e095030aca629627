//! Framed protocol spoken between [`RemoteStore`](crate::RemoteStore) and
//! [`StoreServer`](crate::StoreServer).
//!
//! Every message is a big-endian `u32` body length followed by a bincode
//! body. A connection carries one request at a time; the server answers
//! each request with exactly one response frame.

use crate::error::{StoreError, StoreResult};
use crate::types::{EntryId, Fields, GroupStart, PendingEntry, ReadMode, StreamEntry};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted frame body (16 MiB)
pub const MAX_FRAME: u32 = 16 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
pub enum Request {
    Get {
        key: String,
    },
    Set {
        key: String,
        value: String,
    },
    Delete {
        keys: Vec<String>,
    },
    Append {
        stream: String,
        fields: Fields,
    },
    CreateGroup {
        stream: String,
        group: String,
        start: GroupStart,
    },
    ReadGroup {
        stream: String,
        group: String,
        consumer: String,
        mode: ReadMode,
        count: usize,
        block: Duration,
    },
    Ack {
        stream: String,
        group: String,
        ids: Vec<EntryId>,
    },
    ClaimIdle {
        stream: String,
        group: String,
        consumer: String,
        min_idle: Duration,
        count: usize,
    },
    Pending {
        stream: String,
        group: String,
    },
}

impl Request {
    /// Operation name for logs and error messages
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Get { .. } => "get",
            Self::Set { .. } => "set",
            Self::Delete { .. } => "delete",
            Self::Append { .. } => "append",
            Self::CreateGroup { .. } => "create_group",
            Self::ReadGroup { .. } => "read_group",
            Self::Ack { .. } => "ack",
            Self::ClaimIdle { .. } => "claim_idle",
            Self::Pending { .. } => "pending",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    Value(Option<String>),
    Done,
    Count(u64),
    Id(EntryId),
    Created(bool),
    Entries(Vec<StreamEntry>),
    Pending(Vec<PendingEntry>),
    Error(WireError),
}

/// Server-side failure as seen by the client.
#[derive(Debug, Serialize, Deserialize)]
pub enum WireError {
    NoSuchGroup { stream: String, group: String },
    /// The server's backend hit a connection-class failure
    Unavailable(String),
    Backend(String),
}

impl From<StoreError> for WireError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NoSuchGroup { stream, group } => Self::NoSuchGroup { stream, group },
            e if e.is_retryable() => Self::Unavailable(e.to_string()),
            e => Self::Backend(e.to_string()),
        }
    }
}

impl From<WireError> for StoreError {
    fn from(e: WireError) -> Self {
        match e {
            WireError::NoSuchGroup { stream, group } => Self::NoSuchGroup { stream, group },
            WireError::Unavailable(msg) => Self::Unavailable(msg),
            WireError::Backend(msg) => Self::Remote(msg),
        }
    }
}

/// Write one length-prefixed frame.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> StoreResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = bincode::serialize(message)?;
    let len = u32::try_from(body.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME)
        .ok_or(StoreError::FrameTooLarge(body.len()))?;
    writer.write_u32(len).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame.
///
/// A peer closing the connection between frames surfaces as an
/// `UnexpectedEof` io error.
pub async fn read_frame<R, T>(reader: &mut R) -> StoreResult<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = reader.read_u32().await?;
    let len = usize::try_from(len).unwrap_or(usize::MAX);
    if len > MAX_FRAME as usize {
        return Err(StoreError::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(bincode::deserialize(&body)?)
}
