use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("invalid sort specification: {0}")]
    InvalidSort(String),

    #[error("invalid pagination cursor")]
    InvalidCursor,

    #[error("invalid page size: {0}")]
    InvalidPageSize(String),
}
