//! Error types for the index crate.

/// Errors that can occur while reading, writing, or checking index files.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Reading or writing the file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a valid index document.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A definition breaks an index rule.
    #[error("invalid index definition: {0}")]
    Invalid(String),
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
