use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Explicit configuration for the core components.
///
/// Constructed once and passed into each component's constructor. There is
/// deliberately no global singleton: every `FileStore`, `Paginator` or
/// `ProjectService` owns the piece of configuration it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub files: FileStoreConfig,
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStoreConfig {
    /// Directory where content-addressed files are written.
    pub upload_dir: PathBuf,
    /// Media types accepted by the upload path.
    pub allowed_media_types: Vec<String>,
    /// Chunk size for streamed reads. Not semantically significant.
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl CoreConfig {
    pub fn from_env() -> Self {
        Self::defaults().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("FILES_DIR") {
            self.files.upload_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("FILES_ALLOWED_MEDIA_TYPES") {
            self.files.allowed_media_types =
                v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("FILES_CHUNK_SIZE") {
            self.files.chunk_size = v.parse().unwrap_or(self.files.chunk_size);
        }
        if let Ok(v) = env::var("QUERY_DEFAULT_PAGE_SIZE") {
            self.query.default_page_size = v.parse().unwrap_or(self.query.default_page_size);
        }
        if let Ok(v) = env::var("QUERY_MAX_PAGE_SIZE") {
            self.query.max_page_size = v.parse().unwrap_or(self.query.max_page_size);
        }
        self
    }

    fn defaults() -> Self {
        Self {
            files: FileStoreConfig {
                upload_dir: PathBuf::from("uploaded"),
                allowed_media_types: vec![
                    "text/csv".to_string(),
                    "application/octet-stream".to_string(), // .cif
                    "application/pdf".to_string(),
                    "text/plain".to_string(),
                    "chemical/x-cif".to_string(),
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                        .to_string(),
                ],
                chunk_size: 1024 * 1024,
            },
            query: QueryConfig {
                default_page_size: 10,
                max_page_size: 100,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_accept_cif_uploads() {
        let config = CoreConfig::defaults();
        assert!(config
            .files
            .allowed_media_types
            .iter()
            .any(|m| m == "chemical/x-cif"));
        assert_eq!(config.query.default_page_size, 10);
    }
}
