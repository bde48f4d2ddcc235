use std::sync::Arc;
use std::time::Duration;

use fsdb_store::{DocumentBackend, InMemoryBackend, StoreError};
use fsdb_types::{
    encode_data, escape, unescape, CollectionPath, DocPath, Document, Filter, FilterOp, QuerySpec,
    TypeError,
};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::cancel::{race, CancelSignal};
use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::query::{DocumentIterator, Query, Source};

/// Length of ids generated by [`Database::collection_add`].
pub const AUTO_ID_LENGTH: usize = 20;

/// Handle on one document database.
///
/// Every method is atomic on its own. Use
/// [`run_transaction`](Self::run_transaction) to group several into one
/// atomic unit. Cloning is cheap and shares the connection.
#[derive(Clone)]
pub struct Database {
    backend: Arc<dyn DocumentBackend>,
    config: Arc<ConnectionConfig>,
    cancel: Option<CancelSignal>,
}

impl Database {
    /// Wrap a backend connection. The configuration is validated first.
    pub fn new(backend: Arc<dyn DocumentBackend>, config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            project = %config.project_id,
            database = %config.database_id,
            "database handle created"
        );
        Ok(Self {
            backend,
            config: Arc::new(config),
            cancel: None,
        })
    }

    /// A database backed by a fresh [`InMemoryBackend`].
    pub fn in_memory(project_id: impl Into<String>) -> Result<Self> {
        Self::new(
            Arc::new(InMemoryBackend::new()),
            ConnectionConfig::new(project_id),
        )
    }

    /// A handle whose backend calls all race against `signal`.
    pub fn with_cancellation(&self, signal: CancelSignal) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: Arc::clone(&self.config),
            cancel: Some(signal),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn DocumentBackend> {
        &self.backend
    }

    pub(crate) fn cancel_signal(&self) -> Option<&CancelSignal> {
        self.cancel.as_ref()
    }

    /// Create a document. Fails with `AlreadyExists` if it is present.
    pub async fn add<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> Result<()> {
        let path = DocPath::new(path)?;
        let data = encode_data(value)?;
        race(self.cancel_signal(), self.backend.create(&path, data)).await?;
        debug!(path = %path, "add");
        Ok(())
    }

    /// Create or overwrite a document.
    pub async fn add_or_replace<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> Result<()> {
        let path = DocPath::new(path)?;
        let data = encode_data(value)?;
        race(self.cancel_signal(), self.backend.set(&path, data)).await?;
        debug!(path = %path, "add_or_replace");
        Ok(())
    }

    /// Delete a document. Succeeds whether or not it exists.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let path = DocPath::new(path)?;
        match race(self.cancel_signal(), self.backend.delete(&path)).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        debug!(path = %path, "delete");
        Ok(())
    }

    /// Read and decode a document.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        Ok(self.get_document(path).await?.data_to()?)
    }

    pub async fn get_document(&self, path: &str) -> Result<Document> {
        let path = DocPath::new(path)?;
        Ok(race(self.cancel_signal(), self.backend.get(&path)).await?)
    }

    /// Create a document with a generated id in `collection`.
    pub async fn collection_add<T: Serialize + ?Sized>(
        &self,
        collection: &str,
        value: &T,
    ) -> Result<DocPath> {
        let path = collection_path(collection)?.doc(&auto_id())?;
        let data = encode_data(value)?;
        race(self.cancel_signal(), self.backend.create(&path, data)).await?;
        debug!(path = %path, "collection_add");
        Ok(path)
    }

    pub fn query(&self, collection: &str) -> Result<Query<'_>> {
        let spec = QuerySpec::collection(collection_path(collection)?);
        Ok(Query::new(Source::Database(self), spec))
    }

    /// Query every collection whose id is `collection_id`, at any depth.
    pub fn query_group(&self, collection_id: &str) -> Result<Query<'_>> {
        let spec = QuerySpec::collection_group(group_id(collection_id)?);
        Ok(Query::new(Source::Database(self), spec))
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

    /// Every document of `collection`, in path order.
    pub fn documents(&self, collection: &str) -> Result<DocumentIterator<'_>> {
        Ok(self.query(collection)?.documents())
    }

    /// Ids of the sub-collections of the document at `path`.
    pub async fn collections(&self, path: &str) -> Result<Vec<String>> {
        let path = DocPath::new(path)?;
        Ok(race(self.cancel_signal(), self.backend.list_collections(Some(&path))).await?)
    }

    pub async fn root_collections(&self) -> Result<Vec<String>> {
        Ok(race(self.cancel_signal(), self.backend.list_collections(None)).await?)
    }

    /// Encode a raw string for use as one path segment.
    pub fn escape(&self, raw: &str) -> String {
        escape(raw)
    }

    pub fn unescape(&self, s: &str) -> String {
        unescape(s)
    }

    /// Shut the connection down. Later calls on any clone fail with `Closed`.
    pub async fn close(&self) -> Result<()> {
        self.backend.close().await?;
        debug!(project = %self.config.project_id, "database closed");
        Ok(())
    }

    pub(crate) async fn run_query(&self, spec: &QuerySpec) -> Result<Vec<Document>> {
        Ok(race(self.cancel_signal(), self.backend.run_query(spec)).await?)
    }

    /// Sleep unless canceled.
    pub(crate) async fn pause(&self, delay: Duration) -> Result<()> {
        let sleep = async {
            tokio::time::sleep(delay).await;
            Ok::<_, StoreError>(())
        };
        Ok(race(self.cancel_signal(), sleep).await?)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("project_id", &self.config.project_id)
            .field("database_id", &self.config.database_id)
            .field("cancelable", &self.cancel.is_some())
            .finish()
    }
}

pub(crate) fn collection_path(collection: &str) -> Result<CollectionPath> {
    Ok(CollectionPath::new(collection)?)
}

pub(crate) fn group_id(collection_id: &str) -> Result<String> {
    if collection_id.is_empty() || collection_id.contains('/') {
        return Err(TypeError::InvalidPath {
            path: collection_id.to_string(),
            reason: "collection group id must be a single non-empty segment".into(),
        }
        .into());
    }
    Ok(collection_id.to_string())
}

fn auto_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(AUTO_ID_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    use crate::error::Error;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Player {
        name: String,
        score: u32,
    }

    fn db() -> Database {
        Database::in_memory("test").unwrap()
    }

    #[tokio::test]
    async fn add_get_replace_delete() {
        let db = db();
        let alice = Player {
            name: "alice".into(),
            score: 3,
        };
        db.add("players/alice", &alice).await.unwrap();
        assert!(db
            .add("players/alice", &alice)
            .await
            .unwrap_err()
            .is_already_exists());

        let got: Player = db.get("players/alice").await.unwrap();
        assert_eq!(got, alice);

        db.add_or_replace("players/alice", &Player { score: 9, ..alice })
            .await
            .unwrap();
        let got: Player = db.get("players/alice").await.unwrap();
        assert_eq!(got.score, 9);

        db.delete("players/alice").await.unwrap();
        db.delete("players/alice").await.unwrap();
        assert!(db
            .get::<Player>("players/alice")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn rejects_malformed_paths_and_bodies() {
        let db = db();
        assert!(matches!(
            db.add("players", &json!({})).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            db.add("players/x", &42).await,
            Err(Error::Serialization(_))
        ));
        assert!(matches!(db.query("a/b"), Err(Error::Validation(_))));
        assert!(matches!(db.query_group("a/b"), Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn collection_add_generates_ids() {
        let db = db();
        let first = db.collection_add("events", &json!({"k": 1})).await.unwrap();
        let second = db.collection_add("events", &json!({"k": 2})).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(first.id().len(), AUTO_ID_LENGTH);
        assert!(first.id().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(first.parent().as_str(), "events");
    }

    #[tokio::test]
    async fn escaped_segments_address_documents() {
        let db = db();
        let key = db.escape("mgr/42|x");
        let path = format!("owners/{key}");
        db.add(&path, &json!({"raw": "mgr/42|x"})).await.unwrap();

        let mut docs = db.documents("owners").unwrap();
        let doc = docs.next().await.unwrap().unwrap();
        assert_eq!(db.unescape(doc.id()), "mgr/42|x");
        assert!(docs.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lists_collections() {
        let db = db();
        db.add("users/a", &json!({})).await.unwrap();
        db.add("users/a/orders/1", &json!({})).await.unwrap();
        db.add("shops/s", &json!({})).await.unwrap();

        assert_eq!(db.root_collections().await.unwrap(), ["shops", "users"]);
        assert_eq!(db.collections("users/a").await.unwrap(), ["orders"]);
        assert!(db.collections("shops/s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_iterator_and_group_query() {
        let db = db();
        db.add("users/a/orders/1", &json!({"status": "open", "total": 5}))
            .await
            .unwrap();
        db.add("users/b/orders/2", &json!({"status": "open", "total": 50}))
            .await
            .unwrap();
        db.add("users/b/orders/3", &json!({"status": "shipped", "total": 7}))
            .await
            .unwrap();

        let wheres = [
            Filter::new("status", FilterOp::Eq, "open"),
            Filter::new("total", FilterOp::Gt, 10),
        ];
        let found = db
            .collection_group_query("orders", &wheres)
            .unwrap()
            .collect()
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path.as_str(), "users/b/orders/2");

        let shipped = db
            .query_iterator("users/b/orders", "status", FilterOp::Eq, "shipped")
            .unwrap()
            .collect()
            .await
            .unwrap();
        assert_eq!(shipped.len(), 1);
    }

    #[tokio::test]
    async fn cancellation_fails_calls() {
        let signal = CancelSignal::new();
        let db = db().with_cancellation(signal.clone());
        db.add("a/b", &json!({})).await.unwrap();
        signal.cancel();
        assert!(db.get_document("a/b").await.unwrap_err().is_canceled());
        assert!(db.documents("a").unwrap().next().await.unwrap_err().is_canceled());
    }

    #[tokio::test]
    async fn closed_database_rejects_calls() {
        let db = db();
        let other = db.clone();
        db.close().await.unwrap();
        assert!(matches!(
            other.get_document("a/b").await,
            Err(Error::Closed)
        ));
    }
}
