//! Query builder and lazy document iteration.

use fsdb_types::{DocPath, Direction, Document, Filter, FilterOp, QuerySpec};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::database::Database;
use crate::error::Result;
use crate::transaction::Transaction;

/// A single filter clause, as passed to
/// [`Database::collection_group_query`] and listeners.
pub type Where = Filter;

/// What a query runs against.
#[derive(Clone, Copy)]
pub(crate) enum Source<'a> {
    Database(&'a Database),
    Transaction(&'a Transaction),
}

impl Source<'_> {
    async fn run_query(&self, spec: &QuerySpec) -> Result<Vec<Document>> {
        match self {
            Self::Database(db) => db.run_query(spec).await,
            Self::Transaction(tx) => tx.run_query(spec).await,
        }
    }
}

/// An immutable query over a collection or collection group.
///
/// Every clause method consumes the query and returns the extended one;
/// clone to branch. Nothing is validated or sent until
/// [`documents`](Self::documents) is iterated.
#[derive(Clone)]
pub struct Query<'a> {
    source: Source<'a>,
    spec: QuerySpec,
}

impl<'a> Query<'a> {
    pub(crate) fn new(source: Source<'a>, spec: QuerySpec) -> Self {
        Self { source, spec }
    }

    pub fn filter(self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.with_filter(Filter::new(field, op, value))
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.spec = self.spec.filter(filter);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.spec = self.spec.order_by(field, direction);
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.spec = self.spec.limit(n);
        self
    }

    /// Keep the last `n` results. Requires an ordering.
    pub fn limit_to_last(mut self, n: usize) -> Self {
        self.spec = self.spec.limit_to_last(n);
        self
    }

    pub fn offset(mut self, n: usize) -> Self {
        self.spec = self.spec.offset(n);
        self
    }

    /// Start at the position given by `values`, one per ordering.
    pub fn start_at(mut self, values: Vec<Value>) -> Self {
        self.spec = self.spec.start(values, true);
        self
    }

    pub fn start_after(mut self, values: Vec<Value>) -> Self {
        self.spec = self.spec.start(values, false);
        self
    }

    pub fn end_at(mut self, values: Vec<Value>) -> Self {
        self.spec = self.spec.end(values, true);
        self
    }

    pub fn end_before(mut self, values: Vec<Value>) -> Self {
        self.spec = self.spec.end(values, false);
        self
    }

    /// Return only the listed fields.
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec = self.spec.select(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    /// Lazy iterator over the results.
    pub fn documents(&self) -> DocumentIterator<'a> {
        DocumentIterator {
            source: self.source,
            spec: self.spec.clone(),
            pending: None,
        }
    }
}

impl std::fmt::Debug for Query<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query").field("spec", &self.spec).finish()
    }
}

/// Forward-only, single-pass iterator over query results.
///
/// The query runs on the first call to [`next`](Self::next).
pub struct DocumentIterator<'a> {
    source: Source<'a>,
    spec: QuerySpec,
    pending: Option<std::vec::IntoIter<Document>>,
}

impl DocumentIterator<'_> {
    /// Next document, or `Ok(None)` once the results are exhausted.
    pub async fn next(&mut self) -> Result<Option<Document>> {
        if self.pending.is_none() {
            self.spec.validate()?;
            let docs = self.source.run_query(&self.spec).await?;
            self.pending = Some(docs.into_iter());
        }
        Ok(self.pending.as_mut().and_then(|docs| docs.next()))
    }

    /// Next document decoded into `T`, with its path.
    pub async fn next_as<T: DeserializeOwned>(&mut self) -> Result<Option<(DocPath, T)>> {
        match self.next().await? {
            Some(doc) => {
                let value = doc.data_to()?;
                Ok(Some((doc.path, value)))
            }
            None => Ok(None),
        }
    }

    /// Drain the remaining documents.
    pub async fn collect(mut self) -> Result<Vec<Document>> {
        let mut docs = Vec::new();
        while let Some(doc) = self.next().await? {
            docs.push(doc);
        }
        Ok(docs)
    }

    /// Drain the remaining documents, decoding each into `T`.
    pub async fn collect_as<T: DeserializeOwned>(mut self) -> Result<Vec<(DocPath, T)>> {
        let mut out = Vec::new();
        while let Some(item) = self.next_as().await? {
            out.push(item);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use fsdb_store::{DocumentBackend, InMemoryBackend};
    use serde::Deserialize;
    use serde_json::json;

    use crate::{ConnectionConfig, Error};

    #[derive(Debug, Deserialize)]
    struct Order {
        status: String,
        total: i64,
    }

    async fn seeded() -> (Database, InMemoryBackend) {
        let backend = InMemoryBackend::new();
        let db = Database::new(Arc::new(backend.clone()), ConnectionConfig::new("test")).unwrap();
        for (id, status, total) in [
            ("o1", "open", 10),
            ("o2", "shipped", 30),
            ("o3", "open", 20),
            ("o4", "open", 40),
            ("o5", "cancelled", 5),
        ] {
            db.add(
                &format!("orders/{id}"),
                &json!({"status": status, "total": total, "tags": [status]}),
            )
            .await
            .unwrap();
        }
        (db, backend)
    }

    async fn ids(query: Query<'_>) -> Vec<String> {
        query
            .documents()
            .collect()
            .await
            .unwrap()
            .iter()
            .map(|d| d.id().to_string())
            .collect()
    }

    #[tokio::test]
    async fn filters_order_and_limits() {
        let (db, _) = seeded().await;
        let open = db
            .query("orders")
            .unwrap()
            .filter("status", FilterOp::Eq, "open")
            .order_by("total", Direction::Desc);

        assert_eq!(ids(open.clone()).await, ["o4", "o3", "o1"]);
        assert_eq!(ids(open.clone().limit(2)).await, ["o4", "o3"]);
        assert_eq!(ids(open.clone().offset(1).limit(1)).await, ["o3"]);
        assert_eq!(ids(open.limit_to_last(2)).await, ["o3", "o1"]);
    }

    #[tokio::test]
    async fn disjunctions_and_array_filters() {
        let (db, _) = seeded().await;
        let q = db
            .query("orders")
            .unwrap()
            .filter("status", FilterOp::In, json!(["shipped", "cancelled"]));
        assert_eq!(ids(q).await, ["o2", "o5"]);

        let q = db
            .query("orders")
            .unwrap()
            .filter("status", FilterOp::NotIn, json!(["open"]));
        assert_eq!(ids(q).await, ["o2", "o5"]);

        let q = db
            .query("orders")
            .unwrap()
            .filter("tags", FilterOp::ArrayContains, "shipped");
        assert_eq!(ids(q).await, ["o2"]);
    }

    #[tokio::test]
    async fn cursors() {
        let (db, _) = seeded().await;
        let by_total = db.query("orders").unwrap().order_by("total", Direction::Asc);

        assert_eq!(
            ids(by_total.clone().start_at(vec![json!(20)])).await,
            ["o3", "o2", "o4"]
        );
        assert_eq!(
            ids(by_total.clone().start_after(vec![json!(20)]).end_before(vec![json!(40)])).await,
            ["o2"]
        );
        assert_eq!(ids(by_total.end_at(vec![json!(10)])).await, ["o5", "o1"]);
    }

    #[tokio::test]
    async fn projection_and_typed_decoding() {
        let (db, _) = seeded().await;
        let docs = db
            .query("orders")
            .unwrap()
            .filter("status", FilterOp::Eq, "shipped")
            .select(["total"])
            .documents()
            .collect()
            .await
            .unwrap();
        assert_eq!(docs[0].data.len(), 1);
        assert_eq!(docs[0].field("total"), Some(&json!(30)));

        let orders: Vec<(DocPath, Order)> = db
            .query("orders")
            .unwrap()
            .filter("total", FilterOp::Ge, 30)
            .documents()
            .collect_as()
            .await
            .unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].0.as_str(), "orders/o2");
        assert_eq!(orders[0].1.status, "shipped");
        assert_eq!(orders[1].1.total, 40);
    }

    #[tokio::test]
    async fn invalid_queries_fail_before_reaching_the_store() {
        let (db, backend) = seeded().await;
        // A closed store would fail any call that reached it.
        backend.close().await.unwrap();

        let too_many: Vec<i32> = (0..11).collect();
        let cases = [
            db.query("orders")
                .unwrap()
                .filter("status", FilterOp::In, json!(too_many)),
            db.query("orders")
                .unwrap()
                .filter("status", FilterOp::ArrayContainsAny, json!([])),
            db.query("orders").unwrap().limit_to_last(1),
            db.query("orders").unwrap().start_at(vec![json!(1)]),
            db.query("orders")
                .unwrap()
                .order_by("total", Direction::Asc)
                .end_at(vec![json!(1), json!(2)]),
            db.query("orders").unwrap().filter("", FilterOp::Eq, 1),
        ];
        for query in cases {
            let err = query.documents().next().await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{err:?}");
        }
    }

    #[tokio::test]
    async fn iteration_is_lazy() {
        let (db, _) = seeded().await;
        let mut it = db.documents("orders").unwrap();
        // Written after the iterator was built but before the first `next`.
        db.add("orders/o6", &json!({"status": "open", "total": 1}))
            .await
            .unwrap();

        let mut count = 0;
        while let Some((_, order)) = it.next_as::<Order>().await.unwrap() {
            assert!(!order.status.is_empty());
            count += 1;
        }
        assert_eq!(count, 6);
        assert!(it.next().await.unwrap().is_none());
    }
}
