use std::sync::Arc;

use iemap_core::config::{CoreConfig, FileStoreConfig, QueryConfig};
use iemap_core::model::{Identity, ProcessInfo, ProjectDraft, ProjectInfo};
use iemap_core::projects::ProjectService;
use iemap_core::store::{DocumentStore, MemoryStore};
use tempfile::TempDir;

/// Test harness: a fresh in-memory store and a service writing uploads into
/// a throwaway directory.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub service: ProjectService,
    // held for its Drop; the directory disappears with the context
    #[allow(dead_code)]
    pub upload_dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        let upload_dir = TempDir::new().expect("tempdir");
        let config = CoreConfig {
            files: FileStoreConfig {
                upload_dir: upload_dir.path().to_path_buf(),
                allowed_media_types: vec!["text/plain".to_string(), "text/csv".to_string()],
                chunk_size: 1024,
            },
            query: QueryConfig {
                default_page_size: 10,
                max_page_size: 100,
            },
        };
        let store = Arc::new(MemoryStore::new());
        let service = ProjectService::new(store.clone() as Arc<dyn DocumentStore>, &config);
        Self {
            store,
            service,
            upload_dir,
        }
    }
}

pub fn identity(email: &str, affiliation: &str) -> Identity {
    Identity {
        email: email.to_string(),
        affiliation: affiliation.to_string(),
    }
}

pub fn draft(name: &str, formula: &str) -> ProjectDraft {
    ProjectDraft {
        project: ProjectInfo {
            name: name.to_string(),
            label: name.to_string(),
            description: None,
        },
        process: ProcessInfo {
            is_experiment: false,
            method: "DFT".to_string(),
            agent: None,
        },
        formula: formula.to_string(),
        input: None,
        output: None,
        parameters: Vec::new(),
        properties: Vec::new(),
        publication: None,
    }
}
