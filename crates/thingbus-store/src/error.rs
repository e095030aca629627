//! Store error types

/// Error type for keyed store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("no such consumer group '{group}' on stream '{stream}'")]
    NoSuchGroup { stream: String, group: String },
    #[error("store server error: {0}")]
    Remote(String),
    #[error("frame of {0} bytes exceeds the protocol limit")]
    FrameTooLarge(usize),
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl StoreError {
    pub(crate) fn no_such_group(stream: &str, group: &str) -> Self {
        Self::NoSuchGroup {
            stream: stream.to_string(),
            group: group.to_string(),
        }
    }

    /// Check if the failure is connection-class and worth retrying
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Io(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
