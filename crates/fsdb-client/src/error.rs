use fsdb_store::StoreError;
use fsdb_types::TypeError;
use thiserror::Error;

/// Errors returned by the fsdb client.
#[derive(Debug, Error)]
pub enum Error {
    /// The document does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// A create targeted a document that already exists.
    #[error("document already exists: {0}")]
    AlreadyExists(String),

    /// The attached cancellation signal fired.
    #[error("operation canceled")]
    Canceled,

    /// A transaction kept conflicting until its attempts ran out.
    #[error("transaction aborted after {attempts} attempts")]
    Aborted { attempts: u32 },

    /// Malformed path, query, or argument. Nothing was sent to the store.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("database connection is closed")]
    Closed,

    /// The transaction handle was used after its attempt ended.
    #[error("transaction is no longer active")]
    TransactionClosed,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Optimistic validation failed. Retried by `run_transaction` and never
    /// returned from it.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// Any other store failure.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(path) => Self::NotFound(path),
            StoreError::AlreadyExists(path) => Self::AlreadyExists(path),
            StoreError::Conflict(reason) => Self::Conflict(reason),
            StoreError::Canceled => Self::Canceled,
            StoreError::Closed => Self::Closed,
            StoreError::TransactionClosed => Self::TransactionClosed,
            StoreError::Type(e) => e.into(),
            other => Self::Store(other),
        }
    }
}

impl From<TypeError> for Error {
    fn from(e: TypeError) -> Self {
        match e {
            TypeError::InvalidPath { .. } | TypeError::InvalidQuery(_) => {
                Self::Validation(e.to_string())
            }
            TypeError::NotAMap(_) | TypeError::Serialization(_) => {
                Self::Serialization(e.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_kinds_map_to_branchable_kinds() {
        assert!(Error::from(StoreError::NotFound("a/b".into())).is_not_found());
        assert!(Error::from(StoreError::AlreadyExists("a/b".into())).is_already_exists());
        assert!(Error::from(StoreError::Canceled).is_canceled());
        assert!(matches!(
            Error::from(StoreError::Conflict("x".into())),
            Error::Conflict(_)
        ));
        assert!(matches!(
            Error::from(StoreError::Unavailable("down".into())),
            Error::Store(StoreError::Unavailable(_))
        ));
    }

    #[test]
    fn type_errors_split_into_validation_and_serialization() {
        let invalid = TypeError::InvalidQuery("limit_to_last needs an ordering".into());
        assert!(matches!(Error::from(invalid), Error::Validation(_)));
        assert!(matches!(
            Error::from(StoreError::Type(TypeError::NotAMap("number"))),
            Error::Serialization(_)
        ));
    }
}
