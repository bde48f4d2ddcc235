use async_trait::async_trait;
use fsdb_types::{DocPath, Document, DocumentData, QuerySpec};

use crate::change::{ChangeStream, ListenTarget};
use crate::error::StoreResult;

/// A remote document store.
///
/// All implementations must satisfy these invariants:
/// - Every single-document call is atomic on its own.
/// - `create` fails with `AlreadyExists` if the path holds a document.
/// - `get` fails with `NotFound` if the path holds no document.
/// - `delete` of an absent document succeeds.
/// - Query results follow the [`QuerySpec`] evaluation order.
/// - Transactions from [`begin`](DocumentBackend::begin) are optimistic:
///   conflicting commits fail with `Conflict` and apply nothing.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Read one document.
    async fn get(&self, path: &DocPath) -> StoreResult<Document>;

    /// Create a document that must not exist yet.
    async fn create(&self, path: &DocPath, data: DocumentData) -> StoreResult<Document>;

    /// Create or overwrite a document.
    async fn set(&self, path: &DocPath, data: DocumentData) -> StoreResult<Document>;

    /// Remove a document.
    async fn delete(&self, path: &DocPath) -> StoreResult<()>;

    /// Run a query outside any transaction.
    async fn run_query(&self, query: &QuerySpec) -> StoreResult<Vec<Document>>;

    /// Ids of the collections under `parent`, or the root collections.
    async fn list_collections(&self, parent: Option<&DocPath>) -> StoreResult<Vec<String>>;

    /// Open a new optimistic transaction.
    async fn begin(&self) -> StoreResult<Box<dyn BackendTransaction>>;

    /// Subscribe to snapshots of a document or a query.
    ///
    /// The first snapshot describes the current state; later ones are sent
    /// whenever the result changes.
    async fn listen(&self, target: ListenTarget) -> StoreResult<ChangeStream>;

    /// Close the connection. Open change streams end.
    async fn close(&self) -> StoreResult<()>;
}

/// One live store transaction.
///
/// Reads observe the transaction's own buffered writes and are recorded in
/// its read set. Writes are buffered until [`commit`](Self::commit), which
/// validates the read set and applies every write or none.
#[async_trait]
pub trait BackendTransaction: Send {
    /// Identifier used in diagnostics.
    fn id(&self) -> &str;

    async fn get(&mut self, path: &DocPath) -> StoreResult<Document>;

    async fn run_query(&mut self, query: &QuerySpec) -> StoreResult<Vec<Document>>;

    /// Buffer a create.
    ///
    /// Fails with `AlreadyExists` right away if the document is visible to
    /// this transaction; the precondition is checked again at commit.
    async fn create(&mut self, path: &DocPath, data: DocumentData) -> StoreResult<()>;

    async fn set(&mut self, path: &DocPath, data: DocumentData) -> StoreResult<()>;

    async fn delete(&mut self, path: &DocPath) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
