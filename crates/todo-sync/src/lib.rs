//! Client-side sync of a to-do list with a hosted table and image bucket
//!
//! - `engine` - SyncEngine, the authoritative local list and its reconciliation
//! - `codec` - ImageCodec and TodoItemImage
//! - `client` - PostgrestClient (RemoteRecordStore over HTTP)
//! - `storage_client` - StorageClient (RemoteBlobStore over HTTP)
//! - `http` - authenticated HTTP plumbing shared by both clients
//! - `fake` - in-memory record and blob stores for tests and offline use
//! - `config` - SyncConfig

pub mod client;
pub mod codec;
pub mod config;
pub mod engine;
pub mod fake;
pub mod http;
pub mod storage_client;

pub use client::PostgrestClient;
pub use codec::{ImageCodec, ImagePayload, TodoItemImage};
pub use config::SyncConfig;
pub use engine::{DEFAULT_IMAGE_CACHE_CAPACITY, SyncEngine, TodoList};
pub use fake::{InMemoryBlobStore, InMemoryRecordStore, StoreOperation};
pub use http::SupabaseHttp;
pub use storage_client::StorageClient;
pub use todo_sync_api::{
    RemoteBlobStore, RemoteRecordStore, Result, SortOrder, SyncError, TodoRecord,
};
