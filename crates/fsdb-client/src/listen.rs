//! Live listeners over documents and collections.

use fsdb_store::{ChangeKind, ChangeStream, ListenTarget, Snapshot, StoreError};
use fsdb_types::{DocPath, Document, DocumentData, QuerySpec};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::cancel::race;
use crate::database::{collection_path, Database};
use crate::error::{Error, Result};
use crate::query::Where;

/// One document change delivered to a listener.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentChange {
    pub kind: ChangeKind,
    pub path: DocPath,
    document: Option<Document>,
}

impl DocumentChange {
    /// The document as of this change, if it exists.
    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn data(&self) -> Option<&DocumentData> {
        self.document.as_ref().map(|d| &d.data)
    }

    /// Decode the document; `NotFound` for a removal without a body.
    pub fn data_to<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.document {
            Some(doc) => Ok(doc.data_to()?),
            None => Err(Error::NotFound(self.path.to_string())),
        }
    }
}

impl From<fsdb_store::DocumentChange> for DocumentChange {
    fn from(change: fsdb_store::DocumentChange) -> Self {
        Self {
            kind: change.kind,
            path: change.path,
            document: change.document,
        }
    }
}

/// One snapshot of a collection listener.
#[derive(Clone, Debug)]
pub struct CollectionChanges {
    snapshot: Snapshot,
}

impl CollectionChanges {
    /// Changes since the previous snapshot. The first snapshot reports
    /// every matching document as `Added`.
    pub fn changes(&self) -> Vec<DocumentChange> {
        self.snapshot
            .changes
            .iter()
            .cloned()
            .map(DocumentChange::from)
            .collect()
    }

    /// Every document currently matching the listener.
    pub fn documents(&self) -> &[Document] {
        &self.snapshot.documents
    }

    pub fn read_time(&self) -> chrono::DateTime<chrono::Utc> {
        self.snapshot.read_time
    }
}

impl Database {
    /// Call `handler` for every snapshot of the document at `path`.
    ///
    /// The change kind is `Modified` while the document exists and
    /// `Removed` while it does not, including on the first snapshot. Runs
    /// until `handler` fails, the database is closed, or the cancellation
    /// signal fires; the ending error is returned.
    pub async fn listen_document<H>(&self, path: &str, mut handler: H) -> Result<()>
    where
        H: FnMut(DocumentChange) -> Result<()>,
    {
        let path = DocPath::new(path)?;
        let target = ListenTarget::Document(path.clone());
        self.listen_loop(target, |snapshot| {
            let document = snapshot.documents.into_iter().next();
            let kind = if document.is_some() {
                ChangeKind::Modified
            } else {
                ChangeKind::Removed
            };
            handler(DocumentChange {
                kind,
                path: path.clone(),
                document,
            })
        })
        .await
    }

    /// Call `handler` for every snapshot of `collection`, optionally
    /// narrowed by one filter.
    ///
    /// The filter is validated before subscribing. Ends like
    /// [`listen_document`](Self::listen_document).
    pub async fn listen_collection<H>(
        &self,
        collection: &str,
        filter: Option<Where>,
        mut handler: H,
    ) -> Result<()>
    where
        H: FnMut(&CollectionChanges) -> Result<()>,
    {
        let mut spec = QuerySpec::collection(collection_path(collection)?);
        if let Some(filter) = filter {
            spec = spec.filter(filter);
        }
        spec.validate()?;

        self.listen_loop(ListenTarget::Query(spec), |snapshot| {
            handler(&CollectionChanges { snapshot })
        })
        .await
    }

    async fn listen_loop<S>(&self, target: ListenTarget, mut on_snapshot: S) -> Result<()>
    where
        S: FnMut(Snapshot) -> Result<()>,
    {
        let max_resubscribes = self.config().listen.max_resubscribes;
        let mut resubscribes = 0;
        let mut stream = self.subscribe(&target).await?;

        loop {
            let next = race(self.cancel_signal(), stream.next()).await;
            match next {
                Ok(Some(snapshot)) => {
                    debug!(changes = snapshot.changes.len(), "snapshot received");
                    on_snapshot(snapshot)?;
                }
                Ok(None) => return Err(Error::Closed),
                Err(StoreError::Unavailable(reason)) if resubscribes < max_resubscribes => {
                    resubscribes += 1;
                    warn!(%reason, resubscribes, "listener fell behind, subscribing again");
                    stream = self.subscribe(&target).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn subscribe(&self, target: &ListenTarget) -> Result<ChangeStream> {
        Ok(race(self.cancel_signal(), self.backend().listen(target.clone())).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use fsdb_store::{InMemoryBackend, MemoryConfig};
    use fsdb_types::{Filter, FilterOp};
    use serde_json::json;
    use tokio::sync::{mpsc, oneshot};

    use crate::{CancelSignal, ConnectionConfig};

    /// Listen to `counters/c` on a one-slot channel while ten writes land
    /// behind a handler that is still busy with the first snapshot.
    async fn listen_while_lagging(max_resubscribes: u32) -> Result<()> {
        let backend = InMemoryBackend::with_config(MemoryConfig {
            channel_capacity: 1,
            ..MemoryConfig::default()
        });
        let mut config = ConnectionConfig::new("test");
        config.listen.max_resubscribes = max_resubscribes;
        let db = Database::new(Arc::new(backend), config).unwrap();
        db.add("counters/c", &json!({"n": 0})).await.unwrap();

        let (ready_tx, ready_rx) = oneshot::channel();
        let (go_tx, go_rx) = std::sync::mpsc::channel::<()>();
        let listener = db.clone();
        let task = tokio::spawn(async move {
            let mut ready = Some(ready_tx);
            listener
                .listen_document("counters/c", move |change| {
                    if let Some(ready) = ready.take() {
                        ready.send(()).ok();
                        go_rx.recv().ok();
                        return Ok(());
                    }
                    let n = change.data_to::<serde_json::Value>()?["n"].as_i64();
                    if n == Some(10) {
                        return Err(Error::Validation("caught up".into()));
                    }
                    Ok(())
                })
                .await
        });

        ready_rx.await.unwrap();
        for n in 1..=10 {
            db.add_or_replace("counters/c", &json!({"n": n}))
                .await
                .unwrap();
        }
        go_tx.send(()).unwrap();
        task.await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn lagging_listener_resubscribes_and_sees_latest_state() {
        let result = listen_while_lagging(3).await;
        assert!(matches!(result, Err(Error::Validation(msg)) if msg == "caught up"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn lagging_listener_gives_up_without_resubscribes_left() {
        let result = listen_while_lagging(0).await;
        assert!(matches!(
            result,
            Err(Error::Store(StoreError::Unavailable(_)))
        ));
    }

    #[tokio::test]
    async fn document_listener_reports_presence() {
        let db = Database::in_memory("test").unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let listener = db.clone();
        let task = tokio::spawn(async move {
            listener
                .listen_document("flags/f", move |change| {
                    tx.send(change).map_err(|e| Error::Validation(e.to_string()))
                })
                .await
        });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, ChangeKind::Removed);

        db.add("flags/f", &json!({"on": true})).await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(second.kind, ChangeKind::Modified);
        assert_eq!(second.data_to::<serde_json::Value>().unwrap()["on"], true);

        db.delete("flags/f").await.unwrap();
        let third = rx.recv().await.unwrap();
        assert_eq!(third.kind, ChangeKind::Removed);
        assert!(third.data_to::<serde_json::Value>().unwrap_err().is_not_found());

        db.close().await.unwrap();
        assert!(matches!(task.await.unwrap(), Err(Error::Closed)));
    }

    #[tokio::test]
    async fn collection_listener_reports_each_kind() {
        let db = Database::in_memory("test").unwrap();
        db.add("rooms/a", &json!({"open": true})).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = db.clone();
        let task = tokio::spawn(async move {
            let mut seen = 0;
            listener
                .listen_collection(
                    "rooms",
                    Some(Filter::new("open", FilterOp::Eq, true)),
                    move |changes| {
                        let kinds: Vec<(ChangeKind, String)> = changes
                            .changes()
                            .iter()
                            .map(|c| (c.kind, c.path.id().to_string()))
                            .collect();
                        tx.send((kinds, changes.documents().len())).ok();
                        seen += 1;
                        if seen == 4 {
                            return Err(Error::Validation("enough".into()));
                        }
                        Ok(())
                    },
                )
                .await
        });

        let (initial, count) = rx.recv().await.unwrap();
        assert_eq!(initial, [(ChangeKind::Added, "a".to_string())]);
        assert_eq!(count, 1);

        db.add("rooms/b", &json!({"open": true})).await.unwrap();
        db.add_or_replace("rooms/a", &json!({"open": true, "guests": 2}))
            .await
            .unwrap();
        db.add_or_replace("rooms/b", &json!({"open": false}))
            .await
            .unwrap();

        let (added, _) = rx.recv().await.unwrap();
        assert_eq!(added, [(ChangeKind::Added, "b".to_string())]);
        let (modified, _) = rx.recv().await.unwrap();
        assert_eq!(modified, [(ChangeKind::Modified, "a".to_string())]);
        let (removed, count) = rx.recv().await.unwrap();
        assert_eq!(removed, [(ChangeKind::Removed, "b".to_string())]);
        assert_eq!(count, 1);

        // The handler error ends the loop and is returned.
        assert!(matches!(task.await.unwrap(), Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn invalid_filter_is_rejected_before_subscribing() {
        let db = Database::in_memory("test").unwrap();
        let values: Vec<String> = (0..11).map(|i| i.to_string()).collect();
        let err = db
            .listen_collection(
                "rooms",
                Some(Filter::new("id", FilterOp::In, json!(values))),
                |_| Ok(()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn cancellation_stops_listener() {
        let signal = CancelSignal::new();
        let db = Database::in_memory("test")
            .unwrap()
            .with_cancellation(signal.clone());

        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = db.listen_document("flags/f", |_| Ok(())).await.unwrap_err();
        assert!(err.is_canceled());
    }
}
