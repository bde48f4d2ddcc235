//! Change-stream types shared by backends and listeners.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use fsdb_types::{DocPath, Document, QuerySpec};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::{StoreError, StoreResult};

/// What a subscription watches.
#[derive(Clone, Debug, PartialEq)]
pub enum ListenTarget {
    Document(DocPath),
    Query(QuerySpec),
}

/// How a document changed between two snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Added => "Added",
            Self::Removed => "Removed",
            Self::Modified => "Modified",
        };
        write!(f, "{s}")
    }
}

/// A single document change.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentChange {
    pub kind: ChangeKind,
    pub path: DocPath,
    /// New state, or the last known state for `Removed`.
    pub document: Option<Document>,
}

/// The state of a subscription target at one point in time.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    /// Every document currently matching the target, in result order.
    pub documents: Vec<Document>,
    /// Differences from the previous snapshot.
    pub changes: Vec<DocumentChange>,
    pub read_time: DateTime<Utc>,
}

impl Snapshot {
    /// Diff `current` against `previous` (keyed by path).
    pub fn diff(previous: &BTreeMap<DocPath, Document>, current: Vec<Document>) -> Self {
        let mut changes = Vec::new();

        for (path, doc) in previous {
            if !current.iter().any(|d| &d.path == path) {
                changes.push(DocumentChange {
                    kind: ChangeKind::Removed,
                    path: path.clone(),
                    document: Some(doc.clone()),
                });
            }
        }

        for doc in &current {
            let kind = match previous.get(&doc.path) {
                None => ChangeKind::Added,
                Some(old) if old.version != doc.version => ChangeKind::Modified,
                Some(_) => continue,
            };
            changes.push(DocumentChange {
                kind,
                path: doc.path.clone(),
                document: Some(doc.clone()),
            });
        }

        Self {
            documents: current,
            changes,
            read_time: Utc::now(),
        }
    }
}

/// Receiving end of a subscription.
#[derive(Debug)]
pub struct ChangeStream {
    receiver: broadcast::Receiver<Snapshot>,
}

impl ChangeStream {
    pub fn new(receiver: broadcast::Receiver<Snapshot>) -> Self {
        Self { receiver }
    }

    /// Wait for the next snapshot.
    ///
    /// Returns `Ok(None)` once the backend ends the subscription. A
    /// subscriber that falls behind the channel capacity gets
    /// `Unavailable`, since skipped snapshots cannot be replayed.
    pub async fn next(&mut self) -> StoreResult<Option<Snapshot>> {
        match self.receiver.recv().await {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(broadcast::error::RecvError::Closed) => Ok(None),
            Err(broadcast::error::RecvError::Lagged(n)) => Err(StoreError::Unavailable(
                format!("listener fell behind by {n} snapshots"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(path: &str, version: u64) -> Document {
        let now = Utc::now();
        Document {
            path: DocPath::new(path).unwrap(),
            data: json!({"v": version}).as_object().cloned().unwrap(),
            create_time: now,
            update_time: now,
            version,
        }
    }

    #[test]
    fn diff_reports_each_kind() {
        let mut previous = BTreeMap::new();
        for d in [doc("c/a", 1), doc("c/b", 1)] {
            previous.insert(d.path.clone(), d);
        }

        let snapshot = Snapshot::diff(&previous, vec![doc("c/b", 2), doc("c/c", 1)]);
        let kinds: Vec<(ChangeKind, &str)> = snapshot
            .changes
            .iter()
            .map(|c| (c.kind, c.path.id()))
            .collect();
        assert_eq!(
            kinds,
            [
                (ChangeKind::Removed, "a"),
                (ChangeKind::Modified, "b"),
                (ChangeKind::Added, "c"),
            ]
        );
        assert_eq!(snapshot.documents.len(), 2);
    }

    #[test]
    fn unchanged_versions_produce_no_changes() {
        let mut previous = BTreeMap::new();
        let d = doc("c/a", 3);
        previous.insert(d.path.clone(), d.clone());
        assert!(Snapshot::diff(&previous, vec![d]).changes.is_empty());
    }

    #[tokio::test]
    async fn stream_ends_when_sender_drops() {
        let (tx, rx) = broadcast::channel(4);
        let mut stream = ChangeStream::new(rx);
        tx.send(Snapshot::diff(&BTreeMap::new(), vec![doc("c/a", 1)]))
            .unwrap();
        drop(tx);
        assert!(stream.next().await.unwrap().is_some());
        assert!(stream.next().await.unwrap().is_none());
    }
}
