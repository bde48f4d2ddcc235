//! Foundation types for fsdb.
//!
//! Every other fsdb crate depends on `fsdb-types`.
//!
//! # Key Types
//!
//! - [`DocPath`] / [`CollectionPath`] -- validated slash-delimited paths
//! - [`escape`] / [`unescape`] -- the path segment codec
//! - [`Document`] -- a stored document with its untyped body
//! - [`QuerySpec`] -- the backend-neutral query clause model

pub mod document;
pub mod error;
pub mod path;
pub mod query;
pub mod value;

pub use document::{decode_data, encode_data, Document, DocumentData};
pub use error::TypeError;
pub use path::{escape, unescape, CollectionPath, DocPath};
pub use query::{
    Cursor, Direction, Filter, FilterOp, Limit, OrderBy, QuerySpec, QueryTarget,
    MAX_DISJUNCTION_VALUES,
};
pub use value::{compare_values, values_equal, ValueClass};
