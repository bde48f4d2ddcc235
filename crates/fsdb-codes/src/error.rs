//! Error types for code allocation.

use thiserror::Error;

/// Errors that can occur while allocating or looking up codes.
#[derive(Debug, Error)]
pub enum CodeError {
    /// Every drawn candidate was already taken.
    #[error("codespace exhausted: {attempts} draws all collided")]
    CodespaceExhausted { attempts: u32 },

    /// No record exists for the code or owner.
    #[error("no code record for {key}")]
    NotFound { key: String },

    /// A namespace, owner key, or allocator setting is malformed.
    #[error("invalid {what}: {reason}")]
    Invalid { what: &'static str, reason: String },

    /// The random source could not produce bytes.
    #[error("random source failed: {0}")]
    Random(String),

    /// Failure from the underlying database.
    #[error(transparent)]
    Client(#[from] fsdb_client::Error),
}

impl CodeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convenience type alias for code operations.
pub type Result<T> = std::result::Result<T, CodeError>;
