pub mod builder;
pub mod cursor;
pub mod error;
pub mod paginator;
pub mod types;

pub use builder::ProjectFilter;
pub use cursor::PageCursor;
pub use error::QueryError;
pub use paginator::{Page, PageRequest, Paginator};
pub use types::{QueryParams, SortDirection, SortSpec};
