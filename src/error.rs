use thiserror::Error;

use crate::files::FileStoreError;
use crate::query::QueryError;
use crate::store::StoreError;

/// Crate-level error taxonomy.
///
/// Module errors are translated into one of these kinds at the service
/// boundary; the core never swallows a store or filesystem failure.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid media type: {0}")]
    InvalidMediaType(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed query: {0}")]
    Query(#[from] QueryError),

    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FileStoreError> for CoreError {
    fn from(err: FileStoreError) -> Self {
        match err {
            FileStoreError::InvalidMediaType(mime) => CoreError::InvalidMediaType(mime),
            FileStoreError::NotFound(name) => CoreError::NotFound(name),
            FileStoreError::Io(e) => CoreError::Io(e),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
