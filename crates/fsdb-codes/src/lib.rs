//! Unique short-code allocation for fsdb.
//!
//! A [`CodeAllocator`] hands out short random codes (six decimal digits by
//! default) that are unique across the database, each tied to one
//! `(namespace, owner_key)` pair. Two documents represent every record:
//!
//! - `by-code/{code}` -- resolve a code to its owner
//! - `by-owner/{namespace}_{owner_key}` -- find an owner's code
//!
//! Both are written in the same transaction. A candidate code is claimed
//! with a create-if-absent write; a collision draws a fresh candidate, and
//! a concurrent allocator racing for the same document forces the whole
//! transaction to retry.
//!
//! # Modules
//!
//! - [`allocator`] -- the [`CodeAllocator`]
//! - [`source`] -- the [`CodeSource`] randomness capability
//! - [`types`] -- [`CodeRecord`], [`AllocatorConfig`], [`AuditReport`]
//! - [`names`] -- namespace rules and document id derivation
//! - [`error`] -- error types

pub mod allocator;
pub mod error;
pub mod names;
pub mod source;
pub mod types;

pub use allocator::CodeAllocator;
pub use error::{CodeError, Result};
pub use names::{validate_namespace, OWNER_SEPARATOR};
pub use source::{CodeSource, OsCodeSource, ScriptedSource};
pub use types::{AllocatorConfig, AuditReport, CodeRecord};
