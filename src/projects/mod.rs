//! Project bookkeeping flows: creation, querying, file attachment and
//! property upserts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::AsyncRead;
use tracing::info;

use crate::config::{CoreConfig, QueryConfig};
use crate::error::{CoreError, CoreResult};
use crate::files::{FileStore, StoredFile};
use crate::model::{
    generate_iemap_id, FileRef, Identity, Material, Project, ProjectDraft, Property, Provenance,
    ScalarValue,
};
use crate::query::{Page, PageRequest, Paginator, ProjectFilter, QueryParams};
use crate::stats::pipelines;
use crate::store::{DocumentStore, FindOptions, SortKey, StoreError};

/// Outcome of a file-attach call. Attaching an already-attached file is an
/// expected no-op, reported distinctly so callers can say "nothing changed".
#[derive(Debug)]
pub enum AttachOutcome {
    Attached(FileRef),
    AlreadyAttached { hash: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyOutcome {
    Added,
    AlreadyPresent,
}

/// Flat per-project summary for a user's listing.
#[derive(Debug, Clone, Serialize)]
pub struct UserProjectInfo {
    pub id: String,
    pub iemap_id: String,
    pub project_name: String,
    pub project_label: String,
    pub material_formula: String,
    pub is_experiment: bool,
    pub method: String,
    pub n_files: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One property of a project merged with its owning provenance, as produced
/// by the properties listing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectPropertyRow {
    pub name: String,
    pub value: ScalarValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub email: String,
    pub affiliation: String,
}

pub struct ProjectService {
    store: Arc<dyn DocumentStore>,
    paginator: Paginator,
    files: FileStore,
    query_config: QueryConfig,
}

impl ProjectService {
    pub fn new(store: Arc<dyn DocumentStore>, config: &CoreConfig) -> Self {
        Self {
            paginator: Paginator::new(store.clone()),
            files: FileStore::new(config.files.clone()),
            query_config: config.query.clone(),
            store,
        }
    }

    /// Insert a new project for the authenticated caller.
    ///
    /// Provenance is stamped from the caller identity and never reassigned;
    /// the element list is derived from the formula at write time.
    pub async fn add_project(
        &self,
        identity: &Identity,
        draft: ProjectDraft,
    ) -> CoreResult<String> {
        let project = Project {
            id: None,
            iemap_id: generate_iemap_id(),
            provenance: Provenance::stamp(identity),
            project: draft.project,
            process: draft.process,
            material: Material::from_formula(draft.formula, draft.input, draft.output),
            parameters: draft.parameters,
            properties: draft.properties,
            files: Vec::new(),
            publication: draft.publication,
            schema_version: "1_0".to_string(),
        };
        let iemap_id = project.iemap_id.clone();
        let id = self.store.insert_one(to_document(&project)?).await?;
        info!(%id, %iemap_id, "created project");
        Ok(id)
    }

    pub async fn get_project(&self, id: &str) -> CoreResult<Project> {
        let doc = self
            .store
            .find_one(&json!({ "_id": id }))
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("project {id}")))?;
        from_document(doc)
    }

    /// Run the full query surface: filter, sort, projection and cursor
    /// pagination. `skip` applies to the first page only.
    pub async fn query_projects(
        &self,
        params: &QueryParams,
        cursor: Option<String>,
    ) -> CoreResult<Page> {
        let filter = ProjectFilter::build(params)?;
        let sort = ProjectFilter::sort(params)?;
        self.paginator
            .page(
                &filter,
                &sort,
                PageRequest {
                    cursor,
                    skip: params.skip,
                    size: ProjectFilter::page_size(params, &self.query_config),
                    projection: ProjectFilter::projection(params),
                },
            )
            .await
    }

    /// Store an upload and attach its reference to a project.
    ///
    /// Bytes already stored under the same hash are not re-stored, and the
    /// reference push is a single conditional update keyed on the hash, so
    /// two concurrent attaches of the same content cannot double-push.
    pub async fn attach_file<R>(
        &self,
        project_id: &str,
        file_name: &str,
        content_type: &str,
        reader: R,
    ) -> CoreResult<AttachOutcome>
    where
        R: AsyncRead + Unpin + Send,
    {
        // resolve the project first so a bad id fails before any disk I/O
        if self
            .store
            .find_one(&json!({ "_id": project_id }))
            .await?
            .is_none()
        {
            return Err(CoreError::NotFound(format!("project {project_id}")));
        }

        let outcome = self.files.store(reader, file_name, content_type).await?;
        let stored: &StoredFile = outcome.file();
        let now = Utc::now();
        let file_ref = FileRef {
            hash: stored.hash.clone(),
            name: file_name.to_string(),
            extention: stored.extension.clone(),
            size: stored.size,
            created_at: now,
            updated_at: now,
        };

        let filter = json!({
            "_id": project_id,
            "files.hash": { "$ne": stored.hash }
        });
        let update = json!({
            "$push": { "files": to_document(&file_ref)? },
            "$set": { "provenance.updatedAt": now }
        });
        let report = self.store.update_one(&filter, &update).await?;
        if report.matched == 0 {
            info!(project_id, hash = %stored.hash, "file already attached");
            return Ok(AttachOutcome::AlreadyAttached {
                hash: stored.hash.clone(),
            });
        }
        info!(project_id, hash = %stored.hash, "attached file");
        Ok(AttachOutcome::Attached(file_ref))
    }

    /// Add a property with add-if-absent semantics.
    ///
    /// A value-identical entry is not duplicated; an entry with the same
    /// name but a different value is appended (repeated measurements stay
    /// recordable).
    pub async fn add_property(
        &self,
        project_id: &str,
        property: Property,
    ) -> CoreResult<PropertyOutcome> {
        let report = self
            .store
            .update_one(
                &json!({ "_id": project_id }),
                &json!({ "$addToSet": { "properties": to_document(&property)? } }),
            )
            .await?;
        if report.matched == 0 {
            return Err(CoreError::NotFound(format!("project {project_id}")));
        }
        if report.modified == 0 {
            return Ok(PropertyOutcome::AlreadyPresent);
        }
        // bump the touch timestamp only when something was actually added
        self.store
            .update_one(
                &json!({ "_id": project_id }),
                &json!({ "$set": { "provenance.updatedAt": Utc::now() } }),
            )
            .await?;
        Ok(PropertyOutcome::Added)
    }

    /// Base info for every project owned by an identity, newest first.
    pub async fn user_projects(&self, identity: &Identity) -> CoreResult<Vec<UserProjectInfo>> {
        let docs = self
            .store
            .find(
                &json!({
                    "provenance.email": identity.email,
                    "provenance.affiliation": identity.affiliation
                }),
                FindOptions {
                    sort: vec![SortKey::desc("provenance.createdAt")],
                    ..Default::default()
                },
            )
            .await?;
        let mut infos = Vec::with_capacity(docs.len());
        for doc in docs {
            let project: Project = from_document(doc)?;
            infos.push(UserProjectInfo {
                id: project.id.unwrap_or_default(),
                iemap_id: project.iemap_id,
                project_name: project.project.name,
                project_label: project.project.label,
                material_formula: project.material.formula,
                is_experiment: project.process.is_experiment,
                method: project.process.method,
                n_files: project.files.len(),
                created_at: project.provenance.created_at,
                updated_at: project.provenance.updated_at,
            });
        }
        Ok(infos)
    }

    /// Properties of one project, each merged with the owning provenance.
    pub async fn project_properties(
        &self,
        affiliation: &str,
        project_name: &str,
    ) -> CoreResult<Vec<ProjectPropertyRow>> {
        let rows = self
            .store
            .aggregate(&pipelines::properties_files(affiliation, project_name))
            .await?;
        rows.into_iter().map(from_document).collect()
    }

    /// Access to the underlying file store for download and delete flows.
    pub fn files(&self) -> &FileStore {
        &self.files
    }
}

fn to_document<T: Serialize>(value: &T) -> Result<Value, CoreError> {
    serde_json::to_value(value)
        .map_err(|e| StoreError::MalformedDocument(e.to_string()).into())
}

fn from_document<T: serde::de::DeserializeOwned>(doc: Value) -> CoreResult<T> {
    serde_json::from_value(doc)
        .map_err(|e| StoreError::MalformedDocument(e.to_string()).into())
}
