//! In-memory document store for tests and embedding.
//!
//! [`InMemoryBackend`] keeps every document in a `BTreeMap` behind a
//! `RwLock` and implements the full [`DocumentBackend`] contract, including
//! optimistic transactions:
//!
//! - every write stamps the document path with the next value of a global
//!   version clock, and stamps the path's collection id too;
//! - a transaction records the version of every path it reads and of every
//!   collection id it scans;
//! - commit fails with `Conflict` if any recorded version moved, and
//!   otherwise applies all buffered writes under one lock.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fsdb_types::{DocPath, Document, DocumentData, QuerySpec};
use tokio::sync::broadcast;
use tracing::debug;

use crate::change::{ChangeStream, ListenTarget, Snapshot};
use crate::error::{StoreError, StoreResult};
use crate::traits::{BackendTransaction, DocumentBackend};

/// Configuration for [`InMemoryBackend`].
#[derive(Clone, Debug)]
pub struct MemoryConfig {
    /// Delay injected before every call, so concurrent callers interleave.
    pub latency: Option<Duration>,
    /// Capacity of per-subscriber snapshot channels.
    pub channel_capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            latency: None,
            channel_capacity: 1024,
        }
    }
}

#[derive(Default)]
struct State {
    docs: BTreeMap<DocPath, Document>,
    /// Last write version per path; kept after deletes.
    versions: HashMap<DocPath, u64>,
    /// Last write version per collection id.
    scans: HashMap<String, u64>,
    clock: u64,
}

impl State {
    fn version_of(&self, path: &DocPath) -> u64 {
        self.versions.get(path).copied().unwrap_or(0)
    }

    fn scan_version(&self, collection_id: &str) -> u64 {
        self.scans.get(collection_id).copied().unwrap_or(0)
    }

    fn put(&mut self, path: &DocPath, data: DocumentData, create: bool) -> StoreResult<Document> {
        if create && self.docs.contains_key(path) {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }

        self.clock += 1;
        let now = Utc::now();
        let create_time = self.docs.get(path).map_or(now, |d| d.create_time);
        let doc = Document {
            path: path.clone(),
            data,
            create_time,
            update_time: now,
            version: self.clock,
        };
        self.docs.insert(path.clone(), doc.clone());
        self.stamp(path);
        Ok(doc)
    }

    fn remove(&mut self, path: &DocPath) -> bool {
        if self.docs.remove(path).is_none() {
            return false;
        }
        self.clock += 1;
        self.stamp(path);
        true
    }

    fn stamp(&mut self, path: &DocPath) {
        self.versions.insert(path.clone(), self.clock);
        self.scans
            .insert(path.collection_id().to_string(), self.clock);
    }

    fn evaluate(&self, target: &ListenTarget) -> Vec<Document> {
        match target {
            ListenTarget::Document(path) => self.docs.get(path).cloned().into_iter().collect(),
            ListenTarget::Query(query) => query.apply(self.candidates(query)),
        }
    }

    fn candidates(&self, query: &QuerySpec) -> Vec<Document> {
        self.docs
            .values()
            .filter(|d| query.target.contains(&d.path))
            .cloned()
            .collect()
    }
}

struct Listener {
    target: ListenTarget,
    sender: broadcast::Sender<Snapshot>,
    last: BTreeMap<DocPath, Document>,
}

struct Shared {
    state: RwLock<State>,
    listeners: Mutex<Vec<Listener>>,
    closed: AtomicBool,
    config: MemoryConfig,
}

impl Shared {
    async fn pause(&self) {
        if let Some(latency) = self.config.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.ensure_open()?;
        self.state
            .read()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.ensure_open()?;
        self.state
            .write()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }

    /// Push fresh snapshots to every subscriber whose result changed.
    /// Subscribers with no receivers left are pruned.
    fn notify(&self, state: &State) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.retain_mut(|listener| {
            if listener.sender.receiver_count() == 0 {
                return false;
            }
            let snapshot = Snapshot::diff(&listener.last, state.evaluate(&listener.target));
            if snapshot.changes.is_empty() {
                return true;
            }
            listener.last = index_by_path(&snapshot.documents);
            listener.sender.send(snapshot).is_ok()
        });
    }
}

fn index_by_path(docs: &[Document]) -> BTreeMap<DocPath, Document> {
    docs.iter().map(|d| (d.path.clone(), d.clone())).collect()
}

/// An in-memory implementation of [`DocumentBackend`].
///
/// Cloning yields another handle to the same store. Data is lost when the
/// last handle is dropped.
#[derive(Clone)]
pub struct InMemoryBackend {
    shared: Arc<Shared>,
}

impl InMemoryBackend {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::with_config(MemoryConfig::default())
    }

    pub fn with_config(config: MemoryConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(State::default()),
                listeners: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                config,
            }),
        }
    }

    /// Create a store that sleeps for `latency` before every call.
    pub fn with_latency(latency: Duration) -> Self {
        Self::with_config(MemoryConfig {
            latency: Some(latency),
            ..MemoryConfig::default()
        })
    }

    /// Number of documents currently stored.
    pub fn len(&self) -> usize {
        self.state().docs.len()
    }

    /// Returns `true` if the store holds no documents.
    pub fn is_empty(&self) -> bool {
        self.state().docs.is_empty()
    }

    /// Sorted list of every document path.
    pub fn paths(&self) -> Vec<DocPath> {
        self.state().docs.keys().cloned().collect()
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn state(&self) -> RwLockReadGuard<'_, State> {
        self.shared
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("document_count", &self.len())
            .field("closed", &self.shared.closed.load(Ordering::Relaxed))
            .finish()
    }
}

#[async_trait]
impl DocumentBackend for InMemoryBackend {
    async fn get(&self, path: &DocPath) -> StoreResult<Document> {
        self.shared.pause().await;
        let state = self.shared.read()?;
        state
            .docs
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn create(&self, path: &DocPath, data: DocumentData) -> StoreResult<Document> {
        self.shared.pause().await;
        let mut state = self.shared.write()?;
        let doc = state.put(path, data, true)?;
        self.shared.notify(&state);
        Ok(doc)
    }

    async fn set(&self, path: &DocPath, data: DocumentData) -> StoreResult<Document> {
        self.shared.pause().await;
        let mut state = self.shared.write()?;
        let doc = state.put(path, data, false)?;
        self.shared.notify(&state);
        Ok(doc)
    }

    async fn delete(&self, path: &DocPath) -> StoreResult<()> {
        self.shared.pause().await;
        let mut state = self.shared.write()?;
        if state.remove(path) {
            self.shared.notify(&state);
        }
        Ok(())
    }

    async fn run_query(&self, query: &QuerySpec) -> StoreResult<Vec<Document>> {
        query.validate()?;
        self.shared.pause().await;
        let state = self.shared.read()?;
        Ok(query.apply(state.candidates(query)))
    }

    async fn list_collections(&self, parent: Option<&DocPath>) -> StoreResult<Vec<String>> {
        self.shared.pause().await;
        let state = self.shared.read()?;
        let parent: Vec<&str> = parent.map(|p| p.segments().collect()).unwrap_or_default();

        let mut ids = BTreeSet::new();
        for path in state.docs.keys() {
            let segments: Vec<&str> = path.segments().collect();
            if segments.len() > parent.len() && segments[..parent.len()] == parent[..] {
                ids.insert(segments[parent.len()].to_string());
            }
        }
        Ok(ids.into_iter().collect())
    }

    async fn begin(&self) -> StoreResult<Box<dyn BackendTransaction>> {
        self.shared.pause().await;
        self.shared.ensure_open()?;
        let txn = MemoryTransaction {
            id: uuid::Uuid::now_v7().to_string(),
            shared: Arc::clone(&self.shared),
            reads: HashMap::new(),
            scans: HashMap::new(),
            writes: Vec::new(),
        };
        debug!(txn = %txn.id, "transaction opened");
        Ok(Box::new(txn))
    }

    async fn listen(&self, target: ListenTarget) -> StoreResult<ChangeStream> {
        if let ListenTarget::Query(query) = &target {
            query.validate()?;
        }
        self.shared.pause().await;

        let state = self.shared.read()?;
        let (sender, receiver) = broadcast::channel(self.shared.config.channel_capacity);
        let initial = Snapshot::diff(&BTreeMap::new(), state.evaluate(&target));
        let last = index_by_path(&initial.documents);
        sender
            .send(initial)
            .map_err(|e| StoreError::Backend(format!("listener channel closed: {e}")))?;

        self.shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Listener {
                target,
                sender,
                last,
            });
        Ok(ChangeStream::new(receiver))
    }

    async fn close(&self) -> StoreResult<()> {
        self.shared.closed.store(true, Ordering::Release);
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!("in-memory store closed");
        Ok(())
    }
}

enum PendingWrite {
    Create(DocumentData),
    Set(DocumentData),
    Delete,
}

/// Transaction handle issued by [`InMemoryBackend::begin`].
pub struct MemoryTransaction {
    id: String,
    shared: Arc<Shared>,
    reads: HashMap<DocPath, u64>,
    scans: HashMap<String, u64>,
    writes: Vec<(DocPath, PendingWrite)>,
}

impl MemoryTransaction {
    fn pending(&self, path: &DocPath) -> Option<&PendingWrite> {
        self.writes
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .map(|(_, w)| w)
    }

    /// Record an observed version; seeing a different one later is a conflict.
    fn observe(&mut self, path: &DocPath, version: u64) -> StoreResult<()> {
        match self.reads.get(path) {
            Some(seen) if *seen != version => Err(StoreError::Conflict(format!(
                "{path} changed while transaction {} was reading",
                self.id
            ))),
            Some(_) => Ok(()),
            None => {
                self.reads.insert(path.clone(), version);
                Ok(())
            }
        }
    }

    fn observe_scan(&mut self, collection_id: &str, version: u64) -> StoreResult<()> {
        match self.scans.get(collection_id) {
            Some(seen) if *seen != version => Err(StoreError::Conflict(format!(
                "collection {collection_id} changed while transaction {} was reading",
                self.id
            ))),
            Some(_) => Ok(()),
            None => {
                self.scans.insert(collection_id.to_string(), version);
                Ok(())
            }
        }
    }

    fn buffered(path: &DocPath, data: &DocumentData) -> Document {
        let now = Utc::now();
        Document {
            path: path.clone(),
            data: data.clone(),
            create_time: now,
            update_time: now,
            version: 0,
        }
    }

    fn validate(&self, state: &State) -> StoreResult<()> {
        for (path, seen) in &self.reads {
            if state.version_of(path) != *seen {
                return Err(StoreError::Conflict(format!("{path} was modified")));
            }
        }
        for (collection_id, seen) in &self.scans {
            if state.scan_version(collection_id) != *seen {
                return Err(StoreError::Conflict(format!(
                    "collection {collection_id} was modified"
                )));
            }
        }

        // Create preconditions against the batch as it will be applied.
        let mut exists: HashMap<&DocPath, bool> = HashMap::new();
        for (path, write) in &self.writes {
            let present = *exists
                .entry(path)
                .or_insert_with(|| state.docs.contains_key(path));
            match write {
                PendingWrite::Create(_) if present => {
                    return Err(StoreError::AlreadyExists(path.to_string()));
                }
                PendingWrite::Create(_) | PendingWrite::Set(_) => {
                    exists.insert(path, true);
                }
                PendingWrite::Delete => {
                    exists.insert(path, false);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BackendTransaction for MemoryTransaction {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get(&mut self, path: &DocPath) -> StoreResult<Document> {
        self.shared.pause().await;
        if let Some(write) = self.pending(path) {
            return match write {
                PendingWrite::Create(data) | PendingWrite::Set(data) => {
                    Ok(Self::buffered(path, data))
                }
                PendingWrite::Delete => Err(StoreError::NotFound(path.to_string())),
            };
        }

        let (doc, version) = {
            let state = self.shared.read()?;
            (state.docs.get(path).cloned(), state.version_of(path))
        };
        self.observe(path, version)?;
        doc.ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn run_query(&mut self, query: &QuerySpec) -> StoreResult<Vec<Document>> {
        query.validate()?;
        self.shared.pause().await;

        let (committed, version) = {
            let state = self.shared.read()?;
            (
                state.candidates(query),
                state.scan_version(query.target.collection_id()),
            )
        };
        self.observe_scan(query.target.collection_id(), version)?;

        let mut view = index_by_path(&committed);
        for (path, write) in &self.writes {
            if !query.target.contains(path) {
                continue;
            }
            match write {
                PendingWrite::Create(data) | PendingWrite::Set(data) => {
                    view.insert(path.clone(), Self::buffered(path, data));
                }
                PendingWrite::Delete => {
                    view.remove(path);
                }
            }
        }
        Ok(query.apply(view.into_values()))
    }

    async fn create(&mut self, path: &DocPath, data: DocumentData) -> StoreResult<()> {
        match self.get(path).await {
            Ok(_) => Err(StoreError::AlreadyExists(path.to_string())),
            Err(StoreError::NotFound(_)) => {
                self.writes.push((path.clone(), PendingWrite::Create(data)));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn set(&mut self, path: &DocPath, data: DocumentData) -> StoreResult<()> {
        self.shared.pause().await;
        self.shared.ensure_open()?;
        self.writes.push((path.clone(), PendingWrite::Set(data)));
        Ok(())
    }

    async fn delete(&mut self, path: &DocPath) -> StoreResult<()> {
        self.shared.pause().await;
        self.shared.ensure_open()?;
        self.writes.push((path.clone(), PendingWrite::Delete));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.shared.pause().await;
        let shared = Arc::clone(&self.shared);
        let mut state = shared.write()?;

        if let Err(e) = self.validate(&state) {
            debug!(txn = %self.id, error = %e, "commit rejected");
            return Err(e);
        }

        let MemoryTransaction { id, writes, .. } = *self;
        let count = writes.len();
        for (path, write) in writes {
            match write {
                PendingWrite::Create(data) => {
                    state.put(&path, data, true)?;
                }
                PendingWrite::Set(data) => {
                    state.put(&path, data, false)?;
                }
                PendingWrite::Delete => {
                    state.remove(&path);
                }
            }
        }

        if count > 0 {
            shared.notify(&state);
        }
        debug!(txn = %id, writes = count, "transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        debug!(txn = %self.id, discarded = self.writes.len(), "transaction rolled back");
        Ok(())
    }
}
