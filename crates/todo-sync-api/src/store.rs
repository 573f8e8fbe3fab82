//! Remote collaborators consumed by the sync engine
//!
//! Both traits are object safe and used as `Arc<dyn _>`, so the engine can be
//! wired against the HTTP clients or the in-memory fakes.

use async_trait::async_trait;

use crate::error::Result;
use crate::record::TodoRecord;

pub const ID_COLUMN: &str = "id";
pub const TITLE_COLUMN: &str = "title";

/// Ordering requested from the record store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub column: String,
    pub ascending: bool,
}

impl SortOrder {
    pub fn ascending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn descending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }

    /// Ascending by server-assigned id, the order of every full refresh
    pub fn by_id() -> Self {
        Self::ascending(ID_COLUMN)
    }
}

/// Remote table of to-do rows
#[async_trait]
pub trait RemoteRecordStore: Send + Sync {
    async fn select_all(&self, order: &SortOrder) -> Result<Vec<TodoRecord>>;

    /// Rows whose title matches `title_like` case-insensitively, where the
    /// pattern uses LIKE syntax (see [`crate::pattern`])
    async fn select_filtered(&self, title_like: &str, order: &SortOrder)
        -> Result<Vec<TodoRecord>>;

    /// Insert one row and return it as stored, carrying its assigned id
    async fn insert_one(&self, record: &TodoRecord) -> Result<TodoRecord>;

    async fn update_one(&self, id: i64, record: &TodoRecord) -> Result<()>;

    async fn delete_one(&self, id: i64) -> Result<()>;
}

/// Remote object store addressed by path
#[async_trait]
pub trait RemoteBlobStore: Send + Sync {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    async fn download(&self, path: &str) -> Result<Vec<u8>>;
}
