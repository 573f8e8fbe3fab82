//! SyncEngine: the authoritative local to-do list
//!
//! The engine owns the ordered local collection and reconciles it with the
//! remote table and image bucket:
//! - refreshes (fetch_all, filter, the resync after delete) replace the whole
//!   collection, ordered ascending by id
//! - create uploads the image first, inserts, then appends the confirmed row
//! - update is a remote confirmation of an edit the caller already made
//! - images are resolved lazily per item and never touch the collection
//!
//! Operations take `&self` and may run concurrently from independent tasks.
//! Every refresh draws a sequence number; a result older than the one already
//! applied is dropped, so the most recently started refresh wins.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use lru::LruCache;
use todo_sync_api::{
    RemoteBlobStore, RemoteRecordStore, Result, SortOrder, SyncError, TodoRecord,
    contains_pattern, title_contains,
};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::PostgrestClient;
use crate::codec::{ImageCodec, TodoItemImage};
use crate::config::SyncConfig;
use crate::http::SupabaseHttp;
use crate::storage_client::StorageClient;

/// Snapshot of the local collection as observed by callers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TodoList {
    todos: Vec<TodoRecord>,
    /// Sequence number of the refresh this list is based on
    refresh: u64,
}

impl TodoList {
    pub fn todos(&self) -> &[TodoRecord] {
        &self.todos
    }

    pub fn len(&self) -> usize {
        self.todos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.todos.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&TodoRecord> {
        self.todos.iter().find(|r| r.id() == Some(id))
    }

    fn position(&self, id: i64) -> Option<usize> {
        self.todos.iter().position(|r| r.id() == Some(id))
    }
}

/// Decoded images kept in memory unless configured otherwise
pub const DEFAULT_IMAGE_CACHE_CAPACITY: usize = 32;

type ImageCache = Option<LruCache<String, TodoItemImage>>;

fn image_cache_with(capacity: usize) -> ImageCache {
    NonZeroUsize::new(capacity).map(LruCache::new)
}

enum RefreshQuery<'a> {
    All,
    TitleContains(&'a str),
}

pub struct SyncEngine {
    records: Arc<dyn RemoteRecordStore>,
    blobs: Arc<dyn RemoteBlobStore>,
    codec: ImageCodec,
    todos: watch::Sender<TodoList>,
    fetching: watch::Sender<bool>,
    refreshes_in_flight: Mutex<usize>,
    refresh_seq: AtomicU64,
    /// Least recently used entries go first; `None` when caching is off
    image_cache: Mutex<ImageCache>,
}

impl SyncEngine {
    pub fn new(records: Arc<dyn RemoteRecordStore>, blobs: Arc<dyn RemoteBlobStore>) -> Self {
        Self {
            records,
            blobs,
            codec: ImageCodec,
            todos: watch::channel(TodoList::default()).0,
            fetching: watch::channel(false).0,
            refreshes_in_flight: Mutex::new(0),
            refresh_seq: AtomicU64::new(0),
            image_cache: Mutex::new(image_cache_with(DEFAULT_IMAGE_CACHE_CAPACITY)),
        }
    }

    pub fn with_image_cache(self, enabled: bool) -> Self {
        self.with_image_cache_capacity(if enabled { DEFAULT_IMAGE_CACHE_CAPACITY } else { 0 })
    }

    /// Keep at most `capacity` decoded images. Zero turns the cache off.
    pub fn with_image_cache_capacity(mut self, capacity: usize) -> Self {
        self.image_cache = Mutex::new(image_cache_with(capacity));
        self
    }

    /// Engine wired to the hosted table and bucket named in `config`
    pub fn connect(config: &SyncConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let http = SupabaseHttp::new(&config.url, &config.api_key, config.timeout())?;
        let records = Arc::new(PostgrestClient::new(http.clone(), config.table.clone()));
        let blobs = Arc::new(StorageClient::new(http, config.bucket.clone()));

        info!(
            "[SyncEngine] Connected to {} (table={}, bucket={})",
            config.url, config.table, config.bucket
        );
        Ok(Self::new(records, blobs)
            .with_image_cache_capacity(config.effective_image_cache_capacity()))
    }

    // Observation

    pub fn todos(&self) -> Vec<TodoRecord> {
        self.todos.borrow().todos.clone()
    }

    pub fn snapshot(&self) -> TodoList {
        self.todos.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TodoList> {
        self.todos.subscribe()
    }

    /// Stream of snapshots, starting with the current one
    pub fn changes(&self) -> WatchStream<TodoList> {
        WatchStream::new(self.todos.subscribe())
    }

    /// True while any refresh is in flight. For loading indicators only.
    pub fn is_fetching(&self) -> bool {
        *self.fetching.borrow()
    }

    pub fn subscribe_fetching(&self) -> watch::Receiver<bool> {
        self.fetching.subscribe()
    }

    // Refresh

    /// Replace the local collection with every remote row, ascending by id.
    /// On failure the collection keeps its previous value.
    #[tracing::instrument(name = "sync.fetch_all", skip(self))]
    pub async fn fetch_all(&self) -> Result<()> {
        self.refresh(RefreshQuery::All).await
    }

    /// Narrow the local collection to rows whose title contains `term`,
    /// ignoring case. An empty term restores the full list.
    #[tracing::instrument(name = "sync.filter", skip(self))]
    pub async fn filter(&self, term: &str) -> Result<()> {
        if term.is_empty() {
            return self.fetch_all().await;
        }
        self.refresh(RefreshQuery::TitleContains(term)).await
    }

    async fn refresh(&self, query: RefreshQuery<'_>) -> Result<()> {
        let seq = self.refresh_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let _fetching = FetchingGuard::enter(self);
        let full = matches!(query, RefreshQuery::All);

        let order = SortOrder::by_id();
        let result = match query {
            RefreshQuery::All => self.records.select_all(&order).await,
            RefreshQuery::TitleContains(term) => self
                .records
                .select_filtered(&contains_pattern(term), &order)
                .await
                .map(|mut rows| {
                    // The store pattern can over-match; keep literal hits only
                    rows.retain(|row| title_contains(&row.title, term));
                    rows
                }),
        };

        let rows = result
            .and_then(|rows| validate_rows(&rows).map(|_| rows))
            .map_err(|e| {
                error!("[SyncEngine] Refresh #{} failed, keeping local list: {}", seq, e);
                e
            })?;

        let count = rows.len();
        let live_images: Option<HashSet<String>> = full.then(|| {
            rows.iter()
                .filter_map(|r| r.image_path().map(str::to_string))
                .collect()
        });
        let applied = self.todos.send_if_modified(|list| {
            if seq < list.refresh {
                return false;
            }
            list.todos = rows;
            list.refresh = seq;
            true
        });

        if applied {
            debug!("[SyncEngine] Refresh #{} applied {} to-dos", seq, count);
            if let Some(live) = live_images {
                self.prune_images(&live);
            }
        } else {
            debug!(
                "[SyncEngine] Refresh #{} discarded, a newer refresh already landed",
                seq
            );
        }
        Ok(())
    }

    // Writes

    /// Upload the image (if any), insert the record, and append the confirmed
    /// row to the local list
    ///
    /// A failed upload aborts before anything is inserted. A failed insert
    /// leaves the local list unchanged; an image uploaded for it stays in the
    /// bucket and its path is logged.
    #[tracing::instrument(name = "sync.create", skip(self, image), fields(with_image = image.is_some()))]
    pub async fn create(&self, title: &str, image: Option<&TodoItemImage>) -> Result<TodoRecord> {
        let image_path = match image {
            Some(image) => Some(self.upload_image(image).await?),
            None => None,
        };

        let draft = TodoRecord::new(title).with_image_path(image_path.clone());
        let inserted = match self.insert_confirmed(&draft).await {
            Ok(row) => row,
            Err(e) => {
                match &image_path {
                    Some(path) => warn!(
                        "[SyncEngine] Insert of '{}' failed after uploading image; orphaned blob path: {} ({})",
                        title, path, e
                    ),
                    None => error!("[SyncEngine] Insert of '{}' failed: {}", title, e),
                }
                return Err(e);
            }
        };

        if let (Some(path), Some(image)) = (&image_path, image) {
            self.cache_image(path, image.clone());
        }

        info!(
            "[SyncEngine] Created to-do {:?} '{}'",
            inserted.id(),
            inserted.title
        );
        self.append(inserted.clone());
        Ok(inserted)
    }

    async fn upload_image(&self, image: &TodoItemImage) -> Result<String> {
        let payload = self.codec.encode(image);
        let path = format!("{}.{}", Uuid::new_v4(), payload.extension);

        self.blobs
            .upload(&path, payload.bytes, payload.content_type)
            .await
            .map_err(|e| {
                error!(
                    "[SyncEngine] Image upload to {} failed, to-do not created: {}",
                    path, e
                );
                e
            })?;
        Ok(path)
    }

    async fn insert_confirmed(&self, draft: &TodoRecord) -> Result<TodoRecord> {
        let row = self.records.insert_one(draft).await?;
        if !row.is_persisted() {
            return Err(SyncError::decode("insert returned a row without an id"));
        }
        Ok(row)
    }

    /// Append a confirmed row. A concurrent refresh may already have brought
    /// the same id in; replace it rather than holding the id twice.
    fn append(&self, row: TodoRecord) {
        self.todos.send_modify(|list| {
            match row.id().and_then(|id| list.position(id)) {
                Some(idx) => list.todos[idx] = row,
                None => list.todos.push(row),
            }
        });
    }

    /// Confirm a local edit remotely. The local list is not touched; if this
    /// fails the local copy stays ahead of the remote until the next refresh.
    #[tracing::instrument(name = "sync.update", skip(self, record), fields(id = ?record.id()))]
    pub async fn update(&self, record: &TodoRecord) -> Result<()> {
        let id = record.require_id().map_err(|e| {
            error!("[SyncEngine] Refusing update: {}", e);
            e
        })?;

        self.records.update_one(id, record).await.map_err(|e| {
            error!("[SyncEngine] Update of to-do {} failed: {}", id, e);
            e
        })?;

        debug!("[SyncEngine] Update of to-do {} confirmed", id);
        Ok(())
    }

    /// Delete remotely, then resync the whole list from the remote table
    ///
    /// If the remote delete fails the local list is untouched. If the delete
    /// succeeds but the resync fails, the id is removed locally instead.
    #[tracing::instrument(name = "sync.delete", skip(self, record), fields(id = ?record.id()))]
    pub async fn delete(&self, record: &TodoRecord) -> Result<()> {
        let id = record.require_id().map_err(|e| {
            error!("[SyncEngine] Refusing delete: {}", e);
            e
        })?;

        self.records.delete_one(id).await.map_err(|e| {
            error!("[SyncEngine] Delete of to-do {} failed: {}", id, e);
            e
        })?;
        info!("[SyncEngine] Deleted to-do {}", id);
        if let Some(path) = record.image_path() {
            self.evict_image(path);
        }

        if let Err(e) = self.fetch_all().await {
            warn!(
                "[SyncEngine] Resync after deleting {} failed, removing it locally: {}",
                id, e
            );
            self.todos.send_if_modified(|list| match list.position(id) {
                Some(idx) => {
                    list.todos.remove(idx);
                    true
                }
                None => false,
            });
        }
        Ok(())
    }

    /// Rename a local to-do and confirm the edit remotely
    pub async fn set_title(&self, id: i64, title: impl Into<String>) -> Result<TodoRecord> {
        let title = title.into();
        let edited = self.edit_local(id, |record| record.title = title)?;
        self.update(&edited).await?;
        Ok(edited)
    }

    /// Flip the done flag of a local to-do and confirm the edit remotely
    pub async fn toggle_done(&self, id: i64) -> Result<TodoRecord> {
        let edited = self.edit_local(id, |record| record.done = !record.done)?;
        self.update(&edited).await?;
        Ok(edited)
    }

    fn edit_local(&self, id: i64, edit: impl FnOnce(&mut TodoRecord)) -> Result<TodoRecord> {
        let mut edited = None;
        self.todos.send_if_modified(|list| match list.position(id) {
            Some(idx) => {
                edit(&mut list.todos[idx]);
                edited = Some(list.todos[idx].clone());
                true
            }
            None => false,
        });
        edited.ok_or_else(|| SyncError::invalid_state(format!("no local to-do with id {}", id)))
    }

    // Images

    /// Download and decode the image at `path`
    ///
    /// Returns `None` both for an empty path and when the image cannot be
    /// downloaded or decoded. Use [`SyncEngine::fetch_image`] to tell the two
    /// apart.
    pub async fn resolve_image(&self, path: &str) -> Option<TodoItemImage> {
        match self.fetch_image(path).await {
            Ok(image) => image,
            Err(e) => {
                warn!("[SyncEngine] No image available for {}: {}", path, e);
                None
            }
        }
    }

    /// `Ok(None)` for an empty path, `Err` when download or decoding fails
    #[tracing::instrument(name = "sync.fetch_image", skip(self))]
    pub async fn fetch_image(&self, path: &str) -> Result<Option<TodoItemImage>> {
        if path.is_empty() {
            return Ok(None);
        }
        if let Some(image) = self.cached_image(path) {
            debug!("[SyncEngine] Image cache hit for {}", path);
            return Ok(Some(image));
        }

        let bytes = self.blobs.download(path).await?;
        let image = self.codec.decode(bytes)?;
        self.cache_image(path, image.clone());
        Ok(Some(image))
    }

    pub async fn resolve_record_image(&self, record: &TodoRecord) -> Option<TodoItemImage> {
        match record.image_path() {
            Some(path) => self.resolve_image(path).await,
            None => None,
        }
    }

    pub fn clear_image_cache(&self) {
        if let Some(cache) = self.lock_image_cache().as_mut() {
            cache.clear();
        }
    }

    /// Number of decoded images currently held
    pub fn cached_images(&self) -> usize {
        self.lock_image_cache().as_ref().map_or(0, LruCache::len)
    }

    fn cached_image(&self, path: &str) -> Option<TodoItemImage> {
        self.lock_image_cache().as_mut()?.get(path).cloned()
    }

    fn cache_image(&self, path: &str, image: TodoItemImage) {
        if let Some(cache) = self.lock_image_cache().as_mut() {
            cache.put(path.to_string(), image);
        }
    }

    fn evict_image(&self, path: &str) {
        if let Some(cache) = self.lock_image_cache().as_mut() {
            cache.pop(path);
        }
    }

    /// Drop cached images no row of a full refresh refers to any more
    fn prune_images(&self, live: &HashSet<String>) {
        let mut guard = self.lock_image_cache();
        let Some(cache) = guard.as_mut() else {
            return;
        };
        let stale: Vec<String> = cache
            .iter()
            .filter(|(path, _)| !live.contains(*path))
            .map(|(path, _)| path.clone())
            .collect();
        for path in &stale {
            cache.pop(path);
        }
        if !stale.is_empty() {
            debug!("[SyncEngine] Pruned {} cached images", stale.len());
        }
    }

    fn lock_image_cache(&self) -> MutexGuard<'_, ImageCache> {
        self.image_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_refreshes(&self) -> MutexGuard<'_, usize> {
        self.refreshes_in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Every refreshed row must carry an id, and no id may appear twice
fn validate_rows(rows: &[TodoRecord]) -> Result<()> {
    let mut seen = HashSet::with_capacity(rows.len());
    for row in rows {
        let id = row
            .id()
            .ok_or_else(|| SyncError::decode(format!("row '{}' has no id", row.title)))?;
        if !seen.insert(id) {
            return Err(SyncError::decode(format!("duplicate id {} in result", id)));
        }
    }
    Ok(())
}

/// Holds the fetching flag up for the lifetime of one refresh, including one
/// whose future is dropped midway
struct FetchingGuard<'a> {
    engine: &'a SyncEngine,
}

impl<'a> FetchingGuard<'a> {
    fn enter(engine: &'a SyncEngine) -> Self {
        let mut in_flight = engine.lock_refreshes();
        *in_flight += 1;
        engine
            .fetching
            .send_if_modified(|fetching| !std::mem::replace(fetching, true));
        Self { engine }
    }
}

impl Drop for FetchingGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.engine.lock_refreshes();
        *in_flight -= 1;
        if *in_flight == 0 {
            self.engine
                .fetching
                .send_if_modified(|fetching| std::mem::replace(fetching, false));
        }
    }
}
