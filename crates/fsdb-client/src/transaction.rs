//! Optimistic transactions.
//!
//! [`Database::run_transaction`] opens a backend transaction, hands a
//! [`Transaction`] to the caller's function, and commits when the function
//! succeeds. A write conflict discards the attempt and runs the function
//! again against a fresh transaction, so the function must be safe to call
//! more than once.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fsdb_store::{BackendTransaction, StoreError, StoreResult};
use fsdb_types::{encode_data, escape, unescape, DocPath, Document, Filter, FilterOp, QuerySpec};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cancel::{race, CancelSignal};
use crate::database::{collection_path, group_id, Database};
use crate::error::{Error, Result};
use crate::query::{DocumentIterator, Query, Source};

struct Attempt {
    id: String,
    backend: Mutex<Option<Box<dyn BackendTransaction>>>,
    conflicted: AtomicBool,
}

/// One attempt of a transaction.
///
/// Reads see this transaction's own pending writes. Writes are buffered and
/// become visible together when the attempt commits. Once the attempt ends
/// every call fails with [`Error::TransactionClosed`].
pub struct Transaction {
    attempt: Arc<Attempt>,
    cancel: Option<CancelSignal>,
}

impl Transaction {
    fn new(backend: Box<dyn BackendTransaction>, cancel: Option<CancelSignal>) -> Self {
        Self {
            attempt: Arc::new(Attempt {
                id: backend.id().to_string(),
                backend: Mutex::new(Some(backend)),
                conflicted: AtomicBool::new(false),
            }),
            cancel,
        }
    }

    /// Backend transaction id, for diagnostics.
    pub fn id(&self) -> &str {
        &self.attempt.id
    }

    /// Read and decode a document.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        Ok(self.get_document(path).await?.data_to()?)
    }

    pub async fn get_document(&self, path: &str) -> Result<Document> {
        let path = DocPath::new(path)?;
        let mut guard = self.attempt.backend.lock().await;
        let backend = guard.as_mut().ok_or(Error::TransactionClosed)?;
        let result = race(self.cancel.as_ref(), backend.get(&path)).await;
        self.settle(result)
    }

    /// Create a document that must not exist.
    ///
    /// `AlreadyExists` is reported here, not at commit, so callers can branch
    /// on it inside the transaction.
    pub async fn add<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> Result<()> {
        let path = DocPath::new(path)?;
        let data = encode_data(value)?;
        let mut guard = self.attempt.backend.lock().await;
        let backend = guard.as_mut().ok_or(Error::TransactionClosed)?;
        let result = race(self.cancel.as_ref(), backend.create(&path, data)).await;
        self.settle(result)?;
        debug!(txn = %self.attempt.id, path = %path, "document added");
        Ok(())
    }

    /// Create or overwrite a document.
    pub async fn add_or_replace<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> Result<()> {
        let path = DocPath::new(path)?;
        let data = encode_data(value)?;
        let mut guard = self.attempt.backend.lock().await;
        let backend = guard.as_mut().ok_or(Error::TransactionClosed)?;
        let result = race(self.cancel.as_ref(), backend.set(&path, data)).await;
        self.settle(result)?;
        debug!(txn = %self.attempt.id, path = %path, "document written");
        Ok(())
    }

    /// Delete a document; a missing document is not an error.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let path = DocPath::new(path)?;
        let mut guard = self.attempt.backend.lock().await;
        let backend = guard.as_mut().ok_or(Error::TransactionClosed)?;
        let result = race(self.cancel.as_ref(), backend.delete(&path)).await;
        self.settle(result)?;
        debug!(txn = %self.attempt.id, path = %path, "document deleted");
        Ok(())
    }

    /// Every document of `collection`, read inside this transaction.
    pub fn documents(&self, collection: &str) -> Result<DocumentIterator<'_>> {
        Ok(self.query(collection)?.documents())
    }

    /// Single-filter query over `collection`.
    pub fn query_iterator(
        &self,
        collection: &str,
        field: &str,
        op: FilterOp,
        value: impl Into<Value>,
    ) -> Result<DocumentIterator<'_>> {
        Ok(self.query(collection)?.filter(field, op, value).documents())
    }

    pub fn query(&self, collection: &str) -> Result<Query<'_>> {
        let spec = QuerySpec::collection(collection_path(collection)?);
        Ok(Query::new(Source::Transaction(self), spec))
    }

    pub fn query_group(&self, collection_id: &str) -> Result<Query<'_>> {
        let spec = QuerySpec::collection_group(group_id(collection_id)?);
        Ok(Query::new(Source::Transaction(self), spec))
    }

    /// Query a collection group with a conjunction of filters.
    pub fn collection_group_query(
        &self,
        collection_id: &str,
        wheres: &[Filter],
    ) -> Result<DocumentIterator<'_>> {
        let query = wheres
            .iter()
            .cloned()
            .fold(self.query_group(collection_id)?, Query::with_filter);
        Ok(query.documents())
    }

    pub fn escape(&self, raw: &str) -> String {
        escape(raw)
    }

    pub fn unescape(&self, s: &str) -> String {
        unescape(s)
    }

    pub(crate) async fn run_query(&self, spec: &QuerySpec) -> Result<Vec<Document>> {
        let mut guard = self.attempt.backend.lock().await;
        let backend = guard.as_mut().ok_or(Error::TransactionClosed)?;
        let result = race(self.cancel.as_ref(), backend.run_query(spec)).await;
        self.settle(result)
    }

    fn settle<T>(&self, result: StoreResult<T>) -> Result<T> {
        if let Err(StoreError::Conflict(reason)) = &result {
            debug!(txn = %self.attempt.id, %reason, "read conflict");
            self.attempt.conflicted.store(true, Ordering::Release);
        }
        result.map_err(Error::from)
    }

    /// Second handle on the same attempt, kept by the retry loop.
    fn handle(&self) -> Self {
        Self {
            attempt: Arc::clone(&self.attempt),
            cancel: self.cancel.clone(),
        }
    }

    fn conflicted(&self) -> bool {
        self.attempt.conflicted.load(Ordering::Acquire)
    }

    async fn take(&self) -> Result<Box<dyn BackendTransaction>> {
        self.attempt
            .backend
            .lock()
            .await
            .take()
            .ok_or(Error::TransactionClosed)
    }

    async fn commit(&self) -> Result<()> {
        let backend = self.take().await?;
        let result = race(self.cancel.as_ref(), backend.commit()).await;
        self.settle(result)
    }

    async fn rollback(&self) -> Result<()> {
        let backend = self.take().await?;
        backend.rollback().await.map_err(Error::from)
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.attempt.id)
            .finish_non_exhaustive()
    }
}

impl Database {
    async fn begin(&self) -> Result<Transaction> {
        let backend = race(self.cancel_signal(), self.backend().begin()).await?;
        Ok(Transaction::new(backend, self.cancel_signal().cloned()))
    }

    /// Run `f` inside an optimistic transaction and commit its writes.
    ///
    /// If the commit (or a read inside `f`) hits a conflict, the attempt is
    /// discarded and `f` runs again with a fresh [`Transaction`], after a
    /// jittered exponential backoff. When `transaction.max_attempts` is used
    /// up the call fails with [`Error::Aborted`]. Any other error returned
    /// by `f` rolls the attempt back and is returned unchanged.
    ///
    /// ```no_run
    /// # async fn demo(db: fsdb_client::Database) -> fsdb_client::Result<()> {
    /// let total: i64 = db
    ///     .run_transaction(|tx| async move {
    ///         let mut n: i64 = tx.get::<serde_json::Value>("counters/hits").await?["n"]
    ///             .as_i64()
    ///             .unwrap_or(0);
    ///         n += 1;
    ///         tx.add_or_replace("counters/hits", &serde_json::json!({ "n": n })).await?;
    ///         Ok::<_, fsdb_client::Error>(n)
    ///     })
    ///     .await?;
    /// # Ok(()) }
    /// ```
    pub async fn run_transaction<T, E, F, Fut>(&self, mut f: F) -> std::result::Result<T, E>
    where
        F: FnMut(Transaction) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<Error>,
    {
        let options = &self.config().transaction;
        let max_attempts = options.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let txn = self.begin().await?;
            let handle = txn.handle();

            let reason = match f(txn).await {
                Ok(value) => match handle.commit().await {
                    Ok(()) => {
                        debug!(txn = %handle.id(), attempt, "transaction committed");
                        return Ok(value);
                    }
                    Err(Error::Conflict(reason)) => reason,
                    Err(e) => return Err(e.into()),
                },
                Err(e) => {
                    let conflicted = handle.conflicted();
                    if let Err(rollback) = handle.rollback().await {
                        debug!(txn = %handle.id(), error = %rollback, "rollback failed");
                    }
                    if !conflicted {
                        return Err(e);
                    }
                    "conflicting read".to_string()
                }
            };

            if attempt < max_attempts {
                let delay = options.backoff(attempt);
                debug!(
                    txn = %handle.id(),
                    attempt,
                    ?delay,
                    %reason,
                    "transaction conflict, retrying"
                );
                self.pause(delay).await?;
            }
        }

        warn!(attempts = max_attempts, "transaction aborted after exhausting attempts");
        Err(Error::Aborted {
            attempts: max_attempts,
        }
        .into())
    }
}
