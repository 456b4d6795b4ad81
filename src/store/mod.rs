use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub mod memory;

pub use memory::MemoryStore;

/// Errors from a document store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("malformed document: {0}")]
    MalformedDocument(String),
}

/// One component of a compound sort. Keys apply in order; the caller is
/// responsible for including a tie-breaking key when it needs a total order.
#[derive(Debug, Clone)]
pub struct SortKey {
    pub field: String,
    pub ascending: bool,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Field paths to include. `_id` is always returned.
    pub projection: Option<Vec<String>>,
    pub sort: Vec<SortKey>,
    pub skip: Option<u64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub matched: u64,
    pub modified: u64,
}

/// Contract with the backing document database.
///
/// Filters, update documents and aggregation pipelines are store-native JSON
/// documents. The production deployment implements this over the MongoDB
/// driver; [`MemoryStore`] is the in-tree reference backend.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document, assigning `_id` when absent. Returns the id.
    async fn insert_one(&self, document: Value) -> Result<String, StoreError>;

    async fn find(&self, filter: &Value, options: FindOptions) -> Result<Vec<Value>, StoreError>;

    async fn find_one(&self, filter: &Value) -> Result<Option<Value>, StoreError>;

    /// Apply an update document to the first matching document.
    async fn update_one(&self, filter: &Value, update: &Value)
        -> Result<UpdateReport, StoreError>;

    async fn count(&self, filter: &Value) -> Result<u64, StoreError>;

    async fn aggregate(&self, pipeline: &[Value]) -> Result<Vec<Value>, StoreError>;
}
