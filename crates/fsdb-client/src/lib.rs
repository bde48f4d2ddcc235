//! High-level client for fsdb.
//!
//! This is the main entry point for applications: a [`Database`] handle
//! over any [`DocumentBackend`](fsdb_store::DocumentBackend), with
//! optimistic transactions, a query builder, atomic composites, and live
//! listeners on top.
//!
//! # Key Types
//!
//! - [`Database`] -- single-document operations and iteration, each atomic
//! - [`Transaction`] -- one attempt of [`Database::run_transaction`]
//! - [`Query`] / [`DocumentIterator`] -- immutable query builder, lazy results
//! - [`ConnectionConfig`] -- project, credentials, and retry policy
//! - [`CancelSignal`] -- cooperative cancellation of backend calls
//!
//! # Example
//!
//! ```no_run
//! use fsdb_client::{Database, Result};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Counter {
//!     hits: u64,
//! }
//!
//! # async fn demo() -> Result<()> {
//! let db = Database::in_memory("demo")?;
//! db.atomic_get_or_create("counters/home", || Ok(Counter { hits: 0 })).await?;
//! let counter = db
//!     .atomic_update("counters/home", |c: &mut Counter| {
//!         c.hits += 1;
//!         Ok(())
//!     })
//!     .await?;
//! assert_eq!(counter.hits, 1);
//! # Ok(()) }
//! ```

pub mod cancel;
pub mod composite;
pub mod config;
pub mod database;
pub mod error;
pub mod listen;
pub mod query;
pub mod transaction;

pub use cancel::CancelSignal;
pub use config::{ConnectionConfig, Credentials, ListenOptions, TransactionOptions};
pub use database::Database;
pub use error::{Error, Result};
pub use listen::{CollectionChanges, DocumentChange};
pub use query::{DocumentIterator, Query, Where};
pub use transaction::Transaction;

// Re-export the types callers need to build paths and queries.
pub use fsdb_store::ChangeKind;
pub use fsdb_types::{escape, unescape, CollectionPath, Direction, DocPath, Document, FilterOp};
