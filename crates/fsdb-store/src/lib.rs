//! Document store backends for fsdb.
//!
//! This crate defines the contract every document store must satisfy and
//! ships an in-memory implementation of it. The client layer in
//! `fsdb-client` only ever talks to a [`DocumentBackend`], so swapping the
//! in-memory store for a networked one touches no caller code.
//!
//! # Backends
//!
//! All backends implement the [`DocumentBackend`] trait:
//!
//! - [`InMemoryBackend`] -- `BTreeMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Single-document calls are atomic on their own.
//! 2. Transactions are optimistic: reads are recorded, writes are buffered,
//!    and commit either applies every write or fails with `Conflict`.
//! 3. A document's version never goes backwards, even across deletes.
//! 4. Listeners receive a full snapshot plus the changes since the last one.

pub mod change;
pub mod error;
pub mod memory;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use change::{ChangeKind, ChangeStream, DocumentChange, ListenTarget, Snapshot};
pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryBackend, MemoryConfig, MemoryTransaction};
pub use traits::{BackendTransaction, DocumentBackend};
