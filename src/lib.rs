//! Query, pagination, statistics and content-addressed file storage core
//! for the IEMAP materials metadata platform.
//!
//! The crate is a library with a single external seam: the
//! [`store::DocumentStore`] trait, which any document database supporting
//! JSON filters, updates and aggregation pipelines can implement. An
//! in-memory reference backend ([`store::MemoryStore`]) ships in-tree so the
//! whole core runs without a database instance.

pub mod config;
pub mod error;
pub mod files;
pub mod model;
pub mod projects;
pub mod query;
pub mod stats;
pub mod store;

pub use config::CoreConfig;
pub use error::{CoreError, CoreResult};
