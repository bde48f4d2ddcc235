//! Composite index definitions for fsdb.
//!
//! Queries that combine filters and orderings over several fields need a
//! composite index in the hosted service. This crate models the index file
//! (`firestore.indexes.json`) and reads and writes it.
//!
//! # Key Types
//!
//! - [`IndexSet`] -- The whole file: indexes plus field overrides
//! - [`Index`] -- One composite index, built with [`Index::new`]
//! - [`IndexField`] -- One field with an order or an array config
//! - [`FieldOverride`] -- Single-field index settings

pub mod error;
pub mod field;
pub mod index;
pub mod set;

pub use error::{IndexError, IndexResult};
pub use field::{ArrayConfig, IndexField, Order, QueryScope};
pub use index::{FieldOverride, Index};
pub use set::IndexSet;
