use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::pipelines;
use crate::error::CoreResult;
use crate::store::DocumentStore;

/// A grouped count. `key` is `None` when the grouped field was absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub key: Option<String>,
    pub count: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GlobalStats {
    pub total_projects: u64,
    pub projects_per_affiliation: Vec<GroupCount>,
    pub projects_per_user: Vec<GroupCount>,
    pub projects_with_files: u64,
    pub files_per_affiliation: Vec<GroupCount>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserStats {
    pub total_projects: u64,
    pub projects_with_files: u64,
    pub total_files: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FormulasAndElements {
    pub formulas: Vec<String>,
    pub elements: Vec<String>,
    pub n_formulas: usize,
    pub n_elements: usize,
}

/// Executes the aggregation pipelines and reshapes their output into typed
/// stats. An empty collection yields zero-valued stats, never an error.
pub struct StatsEngine {
    store: Arc<dyn DocumentStore>,
}

impl StatsEngine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn global_stats(&self) -> CoreResult<GlobalStats> {
        let rows = self
            .store
            .aggregate(&pipelines::global_project_stats())
            .await?;
        debug!(rows = rows.len(), "global stats aggregation");
        let Some(facet) = rows.first() else {
            return Ok(GlobalStats::default());
        };
        Ok(GlobalStats {
            total_projects: facet_count(facet, "totalProjects"),
            projects_per_affiliation: group_counts(facet, "projectsPerAffiliation"),
            projects_per_user: group_counts(facet, "projectsPerUser"),
            projects_with_files: facet_count(facet, "projectsWithFiles"),
            files_per_affiliation: group_counts(facet, "filesPerAffiliation"),
        })
    }

    pub async fn user_stats(&self, email: &str) -> CoreResult<UserStats> {
        let rows = self
            .store
            .aggregate(&pipelines::user_project_stats(email))
            .await?;
        let Some(facet) = rows.first() else {
            return Ok(UserStats::default());
        };
        Ok(UserStats {
            total_projects: facet_count(facet, "totalProjects"),
            projects_with_files: facet_count(facet, "projectsWithFiles"),
            total_files: facet_count(facet, "totalFiles"),
        })
    }

    pub async fn formulas_and_elements(&self) -> CoreResult<FormulasAndElements> {
        let rows = self
            .store
            .aggregate(&pipelines::formulas_and_elements())
            .await?;
        let Some(facet) = rows.first() else {
            return Ok(FormulasAndElements::default());
        };
        // sorted for stable output; group order is backend-dependent
        let mut formulas = group_keys(facet, "formulas");
        formulas.sort();
        let mut elements = group_keys(facet, "elements");
        elements.sort();
        Ok(FormulasAndElements {
            n_formulas: formulas.len(),
            n_elements: elements.len(),
            formulas,
            elements,
        })
    }
}

/// Read a `[{ "count": n }]` facet branch, defaulting to zero when the
/// branch produced no documents.
fn facet_count(facet: &Value, branch: &str) -> u64 {
    facet
        .get(branch)
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .and_then(|row| row.get("count"))
        .and_then(Value::as_f64)
        .map(|n| n as u64)
        .unwrap_or(0)
}

fn group_counts(facet: &Value, branch: &str) -> Vec<GroupCount> {
    let mut counts: Vec<GroupCount> = facet
        .get(branch)
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|row| GroupCount {
                    key: row.get("_id").and_then(Value::as_str).map(String::from),
                    count: row.get("count").and_then(Value::as_f64).unwrap_or(0.0) as u64,
                })
                .collect()
        })
        .unwrap_or_default();
    counts.sort_by(|a, b| a.key.cmp(&b.key));
    counts
}

fn group_keys(facet: &Value, branch: &str) -> Vec<String> {
    facet
        .get(branch)
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.get("_id").and_then(Value::as_str))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}
