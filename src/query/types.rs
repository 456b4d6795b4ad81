use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::QueryError;
use crate::store::SortKey;

/// The flat set of optional filter parameters accepted by the project query
/// surface. Parameter names mirror the public API; absent parameters emit no
/// filter clause at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryParams {
    pub id: Option<String>,
    /// Comma-separated list, matched as "one of".
    pub affiliation: Option<String>,
    pub project_name: Option<String>,
    pub provenance_email: Option<String>,
    /// Substring match, not exact.
    pub material_formula: Option<String>,
    /// Comma-separated list; all listed elements must be present.
    pub material_all_elements: Option<String>,
    /// Comma-separated list; at least one listed element must be present.
    pub material_any_element: Option<String>,
    pub iemap_id: Option<String>,
    #[serde(rename = "isExperiment")]
    pub is_experiment: Option<bool>,
    #[serde(rename = "simulationCode")]
    pub simulation_code: Option<String>,
    #[serde(rename = "experimentInstrument")]
    pub experiment_instrument: Option<String>,
    #[serde(rename = "simulationMethod")]
    pub simulation_method: Option<String>,
    #[serde(rename = "experimentMethod")]
    pub experiment_method: Option<String>,
    #[serde(rename = "parameterName")]
    pub parameter_name: Option<String>,
    #[serde(rename = "parameterValue")]
    pub parameter_value: Option<String>,
    #[serde(rename = "propertyName")]
    pub property_name: Option<String>,
    #[serde(rename = "propertyValue")]
    pub property_value: Option<String>,
    /// Publication date range bounds, "YYYY-MM-DD".
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Comma-separated projection field paths.
    pub fields: Option<String>,
    pub limit: Option<usize>,
    pub skip: Option<u64>,
    /// "field" or "field desc", as in "provenance.createdAt desc".
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn is_ascending(self) -> bool {
        matches!(self, SortDirection::Asc)
    }
}

#[derive(Debug, Clone)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    /// Default ordering: document id descending (newest first).
    pub fn by_id_desc() -> Self {
        Self {
            field: "_id".to_string(),
            direction: SortDirection::Desc,
        }
    }

    /// Parse "field" or "field asc|desc".
    pub fn parse(spec: &str) -> Result<Self, QueryError> {
        let mut tokens = spec.split_whitespace();
        let field = tokens
            .next()
            .ok_or_else(|| QueryError::InvalidSort(spec.to_string()))?;
        let direction = match tokens.next() {
            None => SortDirection::Asc,
            Some(d) if d.eq_ignore_ascii_case("asc") => SortDirection::Asc,
            Some(d) if d.eq_ignore_ascii_case("desc") => SortDirection::Desc,
            Some(_) => return Err(QueryError::InvalidSort(spec.to_string())),
        };
        if tokens.next().is_some() {
            return Err(QueryError::InvalidSort(spec.to_string()));
        }
        Ok(Self {
            field: field.to_string(),
            direction,
        })
    }

    /// Compound sort keys for the store: the sort field plus the id
    /// tie-break, both following the same direction.
    pub fn sort_keys(&self) -> Vec<SortKey> {
        let ascending = self.direction.is_ascending();
        let mut keys = vec![SortKey {
            field: self.field.clone(),
            ascending,
        }];
        if self.field != "_id" {
            keys.push(SortKey {
                field: "_id".to_string(),
                ascending,
            });
        }
        keys
    }
}

/// Coerce a raw string value to a number iff it parses cleanly as a finite
/// float; otherwise keep it as a string. Matches the type discipline used
/// when parameter and property values were stored.
pub fn coerce_scalar(raw: &str) -> Value {
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        _ => Value::String(raw.to_string()),
    }
}
