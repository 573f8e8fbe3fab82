//! Shared vocabulary for the to-do sync layer
//!
//! - `record` - TodoRecord, the entity kept in sync with the remote table
//! - `error` - SyncError and the crate-wide Result alias
//! - `store` - RemoteRecordStore / RemoteBlobStore collaborator traits
//! - `pattern` - case-insensitive LIKE patterns used by title filtering

pub mod error;
pub mod pattern;
pub mod record;
pub mod store;

pub use error::{Result, SyncError};
pub use pattern::{contains_pattern, ilike_matches, title_contains};
pub use record::TodoRecord;
pub use store::{RemoteBlobStore, RemoteRecordStore, SortOrder, ID_COLUMN, TITLE_COLUMN};
