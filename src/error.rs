use thiserror::Error;

/// Failure of a record store operation.
///
/// Front ends branch on the variant; the message is for display only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A field was malformed or out of range. Raised before any storage access.
    #[error("{0}")]
    InvalidInput(String),
    /// The referenced student does not exist.
    #[error("{0}")]
    NotFound(String),
    /// A student with the same roll number already exists.
    #[error("{0}")]
    DuplicateKey(String),
    /// The backing store failed in a way not classified above.
    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn invalid(message: impl Into<String>) -> Self {
        StoreError::InvalidInput(message.into())
    }

    pub fn storage(message: impl std::fmt::Display) -> Self {
        StoreError::Storage(message.to_string())
    }

    /// Stable machine-readable code used by the sidecar protocol.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::InvalidInput(_) => "invalid_input",
            StoreError::NotFound(_) => "not_found",
            StoreError::DuplicateKey(_) => "duplicate_key",
            StoreError::Storage(_) => "storage_failed",
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::storage(e)
    }
}

#[cfg(feature = "postgres")]
impl From<postgres::Error> for StoreError {
    fn from(e: postgres::Error) -> Self {
        StoreError::storage(e)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
