//! The query clause model.
//!
//! [`QuerySpec`] is the backend-neutral description of a query: a target
//! (collection or collection group) plus filters, orderings, cursors,
//! limits, and a projection. It is a plain value; every clause method
//! returns a new spec, so a partially built query can be cloned and
//! extended along separate branches.
//!
//! Evaluation helpers ([`QuerySpec::matches`], [`QuerySpec::apply`]) define
//! the reference semantics used by in-process backends.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::Document;
use crate::error::TypeError;
use crate::path::{CollectionPath, DocPath};
use crate::value::{compare_values, field, project_field, values_equal, ValueClass};

/// Store limit on the number of values in `in`, `not-in` and
/// `array-contains-any` filters.
pub const MAX_DISJUNCTION_VALUES: usize = 10;

/// Filter comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "array-contains")]
    ArrayContains,
    #[serde(rename = "array-contains-any")]
    ArrayContainsAny,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not-in")]
    NotIn,
}

impl FilterOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::ArrayContains => "array-contains",
            Self::ArrayContainsAny => "array-contains-any",
            Self::In => "in",
            Self::NotIn => "not-in",
        }
    }

    /// Operators whose value is a list of alternatives.
    pub fn takes_list(self) -> bool {
        matches!(self, Self::ArrayContainsAny | Self::In | Self::NotIn)
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOp {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "==" => Self::Eq,
            "!=" => Self::NotEq,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "array-contains" => Self::ArrayContains,
            "array-contains-any" => Self::ArrayContainsAny,
            "in" => Self::In,
            "not-in" => Self::NotIn,
            other => {
                return Err(TypeError::InvalidQuery(format!(
                    "unknown filter operator {other:?}"
                )))
            }
        })
    }
}

/// Sort direction for ordering clauses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// A single field filter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Client-side checks the store would otherwise reject.
    pub fn validate(&self) -> Result<(), TypeError> {
        if self.field.is_empty() {
            return Err(TypeError::InvalidQuery("filter field path is empty".into()));
        }
        if self.op.takes_list() {
            let Some(values) = self.value.as_array() else {
                return Err(TypeError::InvalidQuery(format!(
                    "{} filter on {:?} needs an array value, got {}",
                    self.op,
                    self.field,
                    ValueClass::of(&self.value).name()
                )));
            };
            if values.is_empty() {
                return Err(TypeError::InvalidQuery(format!(
                    "{} filter on {:?} needs at least one value",
                    self.op, self.field
                )));
            }
            if values.len() > MAX_DISJUNCTION_VALUES {
                return Err(TypeError::InvalidQuery(format!(
                    "{} filter on {:?}: too many values ({}), {MAX_DISJUNCTION_VALUES} max",
                    self.op,
                    self.field,
                    values.len()
                )));
            }
        }
        Ok(())
    }

    /// Returns `true` if the document satisfies this filter.
    pub fn matches(&self, data: &Map<String, Value>) -> bool {
        let present = field(data, &self.field);
        let list = || self.value.as_array().map(Vec::as_slice).unwrap_or_default();

        match self.op {
            FilterOp::Eq => present.is_some_and(|v| values_equal(v, &self.value)),
            FilterOp::NotEq => {
                present.is_some_and(|v| !v.is_null() && !values_equal(v, &self.value))
            }
            FilterOp::Lt | FilterOp::Le | FilterOp::Gt | FilterOp::Ge => {
                let Some(v) = present else {
                    return false;
                };
                if ValueClass::of(v) != ValueClass::of(&self.value) {
                    return false;
                }
                let ord = compare_values(v, &self.value);
                match self.op {
                    FilterOp::Lt => ord == Ordering::Less,
                    FilterOp::Le => ord != Ordering::Greater,
                    FilterOp::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                }
            }
            FilterOp::ArrayContains => present
                .and_then(Value::as_array)
                .is_some_and(|items| items.iter().any(|i| values_equal(i, &self.value))),
            FilterOp::ArrayContainsAny => present.and_then(Value::as_array).is_some_and(|items| {
                items
                    .iter()
                    .any(|i| list().iter().any(|want| values_equal(i, want)))
            }),
            FilterOp::In => {
                present.is_some_and(|v| list().iter().any(|want| values_equal(v, want)))
            }
            FilterOp::NotIn => present.is_some_and(|v| {
                !v.is_null() && !list().iter().any(|want| values_equal(v, want))
            }),
        }
    }
}

/// An ordering clause.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// A pagination cursor positioned on the ordering clauses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub values: Vec<Value>,
    /// `start_at` / `end_at` are inclusive, `start_after` / `end_before` are not.
    pub inclusive: bool,
}

/// Result size bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Limit {
    First(usize),
    Last(usize),
}

/// What a query scans.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryTarget {
    /// The direct children of one collection.
    Collection(CollectionPath),
    /// Every collection with this id, whatever its parent.
    CollectionGroup(String),
}

impl QueryTarget {
    pub fn contains(&self, doc: &DocPath) -> bool {
        match self {
            Self::Collection(col) => col.contains(doc),
            Self::CollectionGroup(id) => doc.collection_id() == id,
        }
    }

    /// The collection id shared by every document the target can match.
    pub fn collection_id(&self) -> &str {
        match self {
            Self::Collection(col) => col.id(),
            Self::CollectionGroup(id) => id,
        }
    }
}

/// Accumulated clause set of a query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub target: QueryTarget,
    pub filters: Vec<Filter>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<Limit>,
    pub offset: usize,
    pub start: Option<Cursor>,
    pub end: Option<Cursor>,
    pub projection: Option<Vec<String>>,
}

impl QuerySpec {
    pub fn new(target: QueryTarget) -> Self {
        Self {
            target,
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: 0,
            start: None,
            end: None,
            projection: None,
        }
    }

    pub fn collection(path: CollectionPath) -> Self {
        Self::new(QueryTarget::Collection(path))
    }

    pub fn collection_group(id: impl Into<String>) -> Self {
        Self::new(QueryTarget::CollectionGroup(id.into()))
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(Limit::First(n));
        self
    }

    pub fn limit_to_last(mut self, n: usize) -> Self {
        self.limit = Some(Limit::Last(n));
        self
    }

    pub fn offset(mut self, n: usize) -> Self {
        self.offset = n;
        self
    }

    pub fn start(mut self, values: Vec<Value>, inclusive: bool) -> Self {
        self.start = Some(Cursor { values, inclusive });
        self
    }

    pub fn end(mut self, values: Vec<Value>, inclusive: bool) -> Self {
        self.end = Some(Cursor { values, inclusive });
        self
    }

    pub fn select(mut self, fields: Vec<String>) -> Self {
        self.projection = Some(fields);
        self
    }

    /// Reject clause combinations the store would refuse.
    pub fn validate(&self) -> Result<(), TypeError> {
        if let QueryTarget::CollectionGroup(id) = &self.target {
            if id.is_empty() || id.contains('/') {
                return Err(TypeError::InvalidQuery(format!(
                    "invalid collection group id {id:?}"
                )));
            }
        }

        for filter in &self.filters {
            filter.validate()?;
        }

        for order in &self.order_by {
            if order.field.is_empty() {
                return Err(TypeError::InvalidQuery("order field path is empty".into()));
            }
        }

        if matches!(self.limit, Some(Limit::Last(_))) && self.order_by.is_empty() {
            return Err(TypeError::InvalidQuery(
                "limit-to-last requires at least one order-by clause".into(),
            ));
        }

        for (name, cursor) in [("start", &self.start), ("end", &self.end)] {
            let Some(cursor) = cursor else { continue };
            if cursor.values.is_empty() {
                return Err(TypeError::InvalidQuery(format!(
                    "{name} cursor needs at least one value"
                )));
            }
            if cursor.values.len() > self.order_by.len() {
                return Err(TypeError::InvalidQuery(format!(
                    "{name} cursor has {} values but the query has {} order-by clauses",
                    cursor.values.len(),
                    self.order_by.len()
                )));
            }
        }

        if let Some(fields) = &self.projection {
            if fields.iter().any(String::is_empty) {
                return Err(TypeError::InvalidQuery("select field path is empty".into()));
            }
        }
        Ok(())
    }

    /// Target and filter test for one document, ignoring cursors and limits.
    pub fn matches(&self, doc: &Document) -> bool {
        self.target.contains(&doc.path)
            && self.order_by.iter().all(|o| doc.field(&o.field).is_some())
            && self.filters.iter().all(|f| f.matches(&doc.data))
    }

    /// Result order: the ordering clauses, then document path.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for order in &self.order_by {
            let ord = match (a.field(&order.field), b.field(&order.field)) {
                (Some(x), Some(y)) => compare_values(x, y),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            let ord = match order.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.path.cmp(&b.path)
    }

    fn cursor_position(&self, doc: &Document, cursor: &Cursor) -> Ordering {
        for (order, want) in self.order_by.iter().zip(cursor.values.iter()) {
            let ord = doc
                .field(&order.field)
                .map_or(Ordering::Less, |have| compare_values(have, want));
            let ord = match order.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    fn within_cursors(&self, doc: &Document) -> bool {
        if let Some(start) = &self.start {
            let pos = self.cursor_position(doc, start);
            if pos == Ordering::Less || (pos == Ordering::Equal && !start.inclusive) {
                return false;
            }
        }
        if let Some(end) = &self.end {
            let pos = self.cursor_position(doc, end);
            if pos == Ordering::Greater || (pos == Ordering::Equal && !end.inclusive) {
                return false;
            }
        }
        true
    }

    /// Evaluate the query over a candidate set of documents.
    pub fn apply(&self, candidates: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut docs: Vec<Document> = candidates
            .into_iter()
            .filter(|d| self.matches(d) && self.within_cursors(d))
            .collect();
        docs.sort_by(|a, b| self.compare(a, b));

        let docs: Vec<Document> = match self.limit {
            Some(Limit::Last(n)) => {
                let end = docs.len().saturating_sub(self.offset);
                let begin = end.saturating_sub(n);
                docs.drain(begin..end).collect()
            }
            Some(Limit::First(n)) => docs.into_iter().skip(self.offset).take(n).collect(),
            None => docs.into_iter().skip(self.offset).collect(),
        };

        match &self.projection {
            None => docs,
            Some(fields) => docs
                .into_iter()
                .map(|mut doc| {
                    let mut projected = Map::new();
                    for f in fields {
                        project_field(&doc.data, &mut projected, f);
                    }
                    doc.data = projected;
                    doc
                })
                .collect(),
        }
    }
}
