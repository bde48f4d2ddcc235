use fsdb_types::TypeError;

/// Errors from document store operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The requested document does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// A create targeted a document that already exists.
    #[error("document already exists: {0}")]
    AlreadyExists(String),

    /// A transaction observed data that changed before it committed.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// The caller canceled the operation.
    #[error("operation canceled")]
    Canceled,

    /// The connection has been closed.
    #[error("store connection is closed")]
    Closed,

    /// The transaction already committed or rolled back.
    #[error("transaction is no longer active")]
    TransactionClosed,

    /// The store is temporarily unable to serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Malformed path, document, or query.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
