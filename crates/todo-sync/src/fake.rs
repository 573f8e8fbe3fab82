//! In-memory fakes of the remote collaborators
//!
//! InMemoryRecordStore and InMemoryBlobStore behave like the hosted services
//! (server-assigned ids, LIKE filtering with `*` as a `%` alias, no
//! overwriting of existing objects)
//! and add hooks for tests:
//! - failure injection per operation, once or until cleared
//! - injectable latency, consumed one call at a time
//! - per-operation call counters

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use todo_sync_api::{
    ID_COLUMN, RemoteBlobStore, RemoteRecordStore, Result, SortOrder, SyncError, TITLE_COLUMN,
    TodoRecord, ilike_matches,
};

/// Operations of both fakes, for failure injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Select,
    SelectFiltered,
    Insert,
    Update,
    Delete,
    Upload,
    Download,
}

impl StoreOperation {
    fn name(self) -> &'static str {
        match self {
            StoreOperation::Select => "select",
            StoreOperation::SelectFiltered => "select filtered",
            StoreOperation::Insert => "insert",
            StoreOperation::Update => "update",
            StoreOperation::Delete => "delete",
            StoreOperation::Upload => "upload",
            StoreOperation::Download => "download",
        }
    }
}

#[derive(Default)]
struct Faults {
    failing: HashSet<StoreOperation>,
    fail_once: HashMap<StoreOperation, usize>,
    delays: HashMap<StoreOperation, VecDeque<Duration>>,
    calls: HashMap<StoreOperation, usize>,
}

impl Faults {
    /// Count the call and decide its fate: (latency, injected failure)
    fn enter(&mut self, op: StoreOperation) -> (Option<Duration>, Option<SyncError>) {
        *self.calls.entry(op).or_default() += 1;

        let delay = self.delays.get_mut(&op).and_then(VecDeque::pop_front);

        let once = match self.fail_once.get_mut(&op) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        };
        let failure = (once || self.failing.contains(&op))
            .then(|| SyncError::remote(op.name(), "injected failure"));

        (delay, failure)
    }
}

/// Shared hooks of both fakes
#[derive(Default)]
struct FaultHooks(Mutex<Faults>);

impl FaultHooks {
    fn lock(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn enter(&self, op: StoreOperation) -> Result<()> {
        let (delay, failure) = self.lock().enter(op);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn fail_next(&self, op: StoreOperation) {
        *self.lock().fail_once.entry(op).or_default() += 1;
    }

    fn set_failing(&self, op: StoreOperation, failing: bool) {
        let mut faults = self.lock();
        if failing {
            faults.failing.insert(op);
        } else {
            faults.failing.remove(&op);
        }
    }

    fn delay_next(&self, op: StoreOperation, delay: Duration) {
        self.lock().delays.entry(op).or_default().push_back(delay);
    }

    fn calls(&self, op: StoreOperation) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }
}

struct Table {
    rows: BTreeMap<i64, TodoRecord>,
    next_id: i64,
}

impl Table {
    fn insert(&mut self, title: String, done: bool, image_path: Option<String>) -> TodoRecord {
        let id = self.next_id;
        self.next_id += 1;
        let row = TodoRecord::persisted(id, title, done, image_path);
        self.rows.insert(id, row.clone());
        row
    }
}

/// Fake remote table with identity ids starting at 1
pub struct InMemoryRecordStore {
    table: Mutex<Table>,
    hooks: FaultHooks,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                rows: BTreeMap::new(),
                next_id: 1,
            }),
            hooks: FaultHooks::default(),
        }
    }

    /// Store pre-populated with not-done rows, ids assigned in order
    pub fn with_titles(titles: &[&str]) -> Self {
        let store = Self::new();
        for title in titles {
            store.seed(TodoRecord::new(*title));
        }
        store
    }

    fn table(&self) -> std::sync::MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write a row behind the engine's back, as another client would.
    /// Any id on `record` is ignored; the store assigns one.
    pub fn seed(&self, record: TodoRecord) -> TodoRecord {
        self.table().insert(
            record.title.clone(),
            record.done,
            record.image_path().map(str::to_string),
        )
    }

    /// Remove a row behind the engine's back
    pub fn remove(&self, id: i64) -> Option<TodoRecord> {
        self.table().rows.remove(&id)
    }

    /// Current rows, ascending by id
    pub fn rows(&self) -> Vec<TodoRecord> {
        self.table().rows.values().cloned().collect()
    }

    pub fn get(&self, id: i64) -> Option<TodoRecord> {
        self.table().rows.get(&id).cloned()
    }

    pub fn fail_next(&self, op: StoreOperation) {
        self.hooks.fail_next(op);
    }

    pub fn set_failing(&self, op: StoreOperation, failing: bool) {
        self.hooks.set_failing(op, failing);
    }

    pub fn delay_next(&self, op: StoreOperation, delay: Duration) {
        self.hooks.delay_next(op, delay);
    }

    pub fn calls(&self, op: StoreOperation) -> usize {
        self.hooks.calls(op)
    }

    fn sorted(mut rows: Vec<TodoRecord>, order: &SortOrder) -> Result<Vec<TodoRecord>> {
        match order.column.as_str() {
            ID_COLUMN => rows.sort_by_key(|r| r.id()),
            TITLE_COLUMN => rows.sort_by(|a, b| a.title.cmp(&b.title).then(a.id().cmp(&b.id()))),
            other => {
                return Err(SyncError::remote(
                    "select",
                    format!("column todos.{} does not exist", other),
                ));
            }
        }
        if !order.ascending {
            rows.reverse();
        }
        Ok(rows)
    }
}

#[async_trait]
impl RemoteRecordStore for InMemoryRecordStore {
    async fn select_all(&self, order: &SortOrder) -> Result<Vec<TodoRecord>> {
        // Query result is fixed when the request arrives, latency only delays the answer
        let rows = self.rows();
        self.hooks.enter(StoreOperation::Select).await?;
        Self::sorted(rows, order)
    }

    async fn select_filtered(
        &self,
        title_like: &str,
        order: &SortOrder,
    ) -> Result<Vec<TodoRecord>> {
        let rows: Vec<TodoRecord> = self
            .rows()
            .into_iter()
            .filter(|r| ilike_matches(title_like, &r.title))
            .collect();
        self.hooks.enter(StoreOperation::SelectFiltered).await?;
        Self::sorted(rows, order)
    }

    async fn insert_one(&self, record: &TodoRecord) -> Result<TodoRecord> {
        self.hooks.enter(StoreOperation::Insert).await?;
        if let Some(id) = record.id() {
            return Err(SyncError::remote(
                "insert",
                format!("cannot insert a row with explicit id {}", id),
            ));
        }
        Ok(self.table().insert(
            record.title.clone(),
            record.done,
            record.image_path().map(str::to_string),
        ))
    }

    async fn update_one(&self, id: i64, record: &TodoRecord) -> Result<()> {
        self.hooks.enter(StoreOperation::Update).await?;
        let mut table = self.table();
        let row = table
            .rows
            .get_mut(&id)
            .ok_or_else(|| SyncError::remote("update", format!("no row with id {}", id)))?;
        *row = TodoRecord::persisted(
            id,
            record.title.clone(),
            record.done,
            record.image_path().map(str::to_string),
        );
        Ok(())
    }

    async fn delete_one(&self, id: i64) -> Result<()> {
        self.hooks.enter(StoreOperation::Delete).await?;
        self.table()
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| SyncError::remote("delete", format!("no row with id {}", id)))
    }
}

struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// Fake object store; uploading to an existing path fails like a non-upsert upload
#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    hooks: FaultHooks,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredObject>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Place an object directly, overwriting any previous one
    pub fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) {
        self.objects().insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects().get(path).map(|o| o.bytes.clone())
    }

    pub fn content_type(&self, path: &str) -> Option<String> {
        self.objects().get(path).map(|o| o.content_type.clone())
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.objects().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.objects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects().is_empty()
    }

    pub fn fail_next(&self, op: StoreOperation) {
        self.hooks.fail_next(op);
    }

    pub fn set_failing(&self, op: StoreOperation, failing: bool) {
        self.hooks.set_failing(op, failing);
    }

    pub fn delay_next(&self, op: StoreOperation, delay: Duration) {
        self.hooks.delay_next(op, delay);
    }

    pub fn calls(&self, op: StoreOperation) -> usize {
        self.hooks.calls(op)
    }
}

#[async_trait]
impl RemoteBlobStore for InMemoryBlobStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        self.hooks.enter(StoreOperation::Upload).await?;
        let mut objects = self.objects();
        if objects.contains_key(path) {
            return Err(SyncError::remote(
                "upload",
                format!("object {} already exists", path),
            ));
        }
        objects.insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        self.hooks.enter(StoreOperation::Download).await?;
        self.get(path)
            .ok_or_else(|| SyncError::remote("download", format!("object {} not found", path)))
    }
}
