use chrono::NaiveDate;
use serde_json::{json, Map, Value};

use super::error::QueryError;
use super::types::{coerce_scalar, QueryParams, SortSpec};
use crate::config::QueryConfig;

/// Translates a [`QueryParams`] set into a store-native filter document.
///
/// Clauses are appended to a growable list only when the corresponding
/// parameter is present and non-empty; an all-unset parameter set builds the
/// match-all filter `{}`.
pub struct ProjectFilter {
    clauses: Vec<(String, Value)>,
}

impl ProjectFilter {
    pub fn build(params: &QueryParams) -> Result<Value, QueryError> {
        let mut filter = Self {
            clauses: Vec::new(),
        };
        filter.collect(params)?;
        Ok(filter.compose())
    }

    /// Projection field list from the `fields` parameter, if any.
    pub fn projection(params: &QueryParams) -> Option<Vec<String>> {
        let raw = non_empty(&params.fields)?;
        let fields: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        (!fields.is_empty()).then_some(fields)
    }

    /// Sort order from the `sort` parameter, defaulting to id descending.
    pub fn sort(params: &QueryParams) -> Result<SortSpec, QueryError> {
        match non_empty(&params.sort) {
            Some(spec) => SortSpec::parse(spec),
            None => Ok(SortSpec::by_id_desc()),
        }
    }

    /// Effective page size: requested limit capped by configuration.
    pub fn page_size(params: &QueryParams, config: &QueryConfig) -> usize {
        params
            .limit
            .unwrap_or(config.default_page_size)
            .min(config.max_page_size)
    }

    fn collect(&mut self, params: &QueryParams) -> Result<(), QueryError> {
        if let Some(id) = non_empty(&params.id) {
            self.push("_id", json!(id));
        }
        if let Some(iemap_id) = non_empty(&params.iemap_id) {
            self.push("iemap_id", json!(iemap_id));
        }
        if let Some(name) = non_empty(&params.project_name) {
            self.push("project.name", json!(name));
        }
        if let Some(email) = non_empty(&params.provenance_email) {
            self.push("provenance.email", json!(email));
        }
        if let Some(list) = non_empty(&params.affiliation) {
            self.push(
                "provenance.affiliation",
                json!({ "$in": split_list(list) }),
            );
        }
        if let Some(formula) = non_empty(&params.material_formula) {
            // partial formula search
            self.push(
                "material.formula",
                json!({ "$regex": regex::escape(formula) }),
            );
        }
        if let Some(list) = non_empty(&params.material_all_elements) {
            self.push("material.elements", json!({ "$all": split_list(list) }));
        }
        if let Some(list) = non_empty(&params.material_any_element) {
            self.push("material.elements", json!({ "$in": split_list(list) }));
        }
        if let Some(flag) = params.is_experiment {
            self.push("process.isExperiment", json!(flag));
        }

        // Each of the four process discriminators expands into a pair of
        // clauses. Contradictory combinations are allowed and match nothing.
        if let Some(code) = non_empty(&params.simulation_code) {
            self.push("process.isExperiment", json!(false));
            self.push("process.agent.name", json!(code));
        }
        if let Some(instrument) = non_empty(&params.experiment_instrument) {
            self.push("process.isExperiment", json!(true));
            self.push("process.agent.name", json!(instrument));
        }
        if let Some(method) = non_empty(&params.simulation_method) {
            self.push("process.isExperiment", json!(false));
            self.push("process.method", json!(method));
        }
        if let Some(method) = non_empty(&params.experiment_method) {
            self.push("process.isExperiment", json!(true));
            self.push("process.method", json!(method));
        }

        self.push_named_value(
            "parameters",
            non_empty(&params.parameter_name),
            non_empty(&params.parameter_value),
        );
        self.push_named_value(
            "properties",
            non_empty(&params.property_name),
            non_empty(&params.property_value),
        );

        self.push_date_range(
            non_empty(&params.start_date),
            non_empty(&params.end_date),
        )?;

        Ok(())
    }

    /// Name-only matches any array element with that name; name plus value
    /// must hold within the same element, so the pair is scoped with
    /// `$elemMatch` rather than two independent clauses.
    fn push_named_value(&mut self, array: &str, name: Option<&str>, value: Option<&str>) {
        match (name, value) {
            (Some(name), Some(value)) => {
                self.push(
                    array,
                    json!({ "$elemMatch": { "name": name, "value": coerce_scalar(value) } }),
                );
            }
            (Some(name), None) => {
                self.push(&format!("{array}.name"), json!(name));
            }
            (None, Some(value)) => {
                self.push(&format!("{array}.value"), coerce_scalar(value));
            }
            (None, None) => {}
        }
    }

    fn push_date_range(
        &mut self,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<(), QueryError> {
        let mut range = Map::new();
        if let Some(start) = start {
            range.insert("$gte".to_string(), json!(parse_date(start)?));
        }
        if let Some(end) = end {
            range.insert("$lte".to_string(), json!(parse_date(end)?));
        }
        if !range.is_empty() {
            self.push("publication.date", Value::Object(range));
        }
        Ok(())
    }

    fn push(&mut self, path: &str, clause: Value) {
        self.clauses.push((path.to_string(), clause));
    }

    /// Conjoin the collected clauses. Distinct field paths merge into one
    /// document; duplicate paths are wrapped under `$and` so neither clause
    /// overwrites the other.
    fn compose(self) -> Value {
        let duplicated = self
            .clauses
            .iter()
            .enumerate()
            .any(|(i, (path, _))| self.clauses[..i].iter().any(|(p, _)| p == path));
        if duplicated {
            let branches: Vec<Value> = self
                .clauses
                .into_iter()
                .map(|(path, clause)| json!({ path: clause }))
                .collect();
            json!({ "$and": branches })
        } else {
            let mut map = Map::new();
            for (path, clause) in self.clauses {
                map.insert(path, clause);
            }
            Value::Object(map)
        }
    }
}

fn non_empty(param: &Option<String>) -> Option<&str> {
    param.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// A date parameter must fail the whole request when unparseable, never be
/// silently dropped.
fn parse_date(raw: &str) -> Result<String, QueryError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| QueryError::InvalidDate(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_params_build_match_all() {
        let filter = ProjectFilter::build(&QueryParams::default()).unwrap();
        assert_eq!(filter, json!({}));
    }

    #[test]
    fn empty_strings_count_as_unset() {
        let params = QueryParams {
            affiliation: Some(String::new()),
            material_formula: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(ProjectFilter::build(&params).unwrap(), json!({}));
    }

    #[test]
    fn affiliation_splits_into_one_of() {
        let params = QueryParams {
            affiliation: Some("enea, cnr".to_string()),
            ..Default::default()
        };
        let filter = ProjectFilter::build(&params).unwrap();
        assert_eq!(
            filter,
            json!({ "provenance.affiliation": { "$in": ["enea", "cnr"] } })
        );
    }

    #[test]
    fn formula_is_a_substring_match() {
        let params = QueryParams {
            material_formula: Some("H12".to_string()),
            ..Default::default()
        };
        let filter = ProjectFilter::build(&params).unwrap();
        assert_eq!(filter, json!({ "material.formula": { "$regex": "H12" } }));
    }

    #[test]
    fn simulation_code_expands_to_a_pair() {
        let params = QueryParams {
            simulation_code: Some("quantum-espresso".to_string()),
            ..Default::default()
        };
        let filter = ProjectFilter::build(&params).unwrap();
        assert_eq!(
            filter,
            json!({
                "process.isExperiment": false,
                "process.agent.name": "quantum-espresso"
            })
        );
    }

    #[test]
    fn contradictory_discriminators_wrap_under_and() {
        let params = QueryParams {
            simulation_code: Some("code".to_string()),
            experiment_method: Some("XRD".to_string()),
            ..Default::default()
        };
        let filter = ProjectFilter::build(&params).unwrap();
        let branches = filter["$and"].as_array().unwrap();
        assert!(branches.contains(&json!({ "process.isExperiment": false })));
        assert!(branches.contains(&json!({ "process.isExperiment": true })));
    }

    #[test]
    fn property_pair_scopes_with_elem_match() {
        let params = QueryParams {
            property_name: Some("bandgap".to_string()),
            property_value: Some("2.5".to_string()),
            ..Default::default()
        };
        let filter = ProjectFilter::build(&params).unwrap();
        assert_eq!(
            filter,
            json!({ "properties": { "$elemMatch": { "name": "bandgap", "value": 2.5 } } })
        );
    }

    #[test]
    fn property_name_alone_matches_any_element() {
        let params = QueryParams {
            property_name: Some("bandgap".to_string()),
            ..Default::default()
        };
        let filter = ProjectFilter::build(&params).unwrap();
        assert_eq!(filter, json!({ "properties.name": "bandgap" }));
    }

    #[test]
    fn text_values_stay_strings() {
        let params = QueryParams {
            parameter_name: Some("type-crystal".to_string()),
            parameter_value: Some("type1".to_string()),
            ..Default::default()
        };
        let filter = ProjectFilter::build(&params).unwrap();
        assert_eq!(
            filter,
            json!({ "parameters": { "$elemMatch": { "name": "type-crystal", "value": "type1" } } })
        );
    }

    #[test]
    fn date_range_open_and_closed() {
        let params = QueryParams {
            start_date: Some("2023-01-01".to_string()),
            ..Default::default()
        };
        let filter = ProjectFilter::build(&params).unwrap();
        assert_eq!(
            filter,
            json!({ "publication.date": { "$gte": "2023-01-01" } })
        );

        let params = QueryParams {
            start_date: Some("2023-01-01".to_string()),
            end_date: Some("2023-06-30".to_string()),
            ..Default::default()
        };
        let filter = ProjectFilter::build(&params).unwrap();
        assert_eq!(
            filter,
            json!({ "publication.date": { "$gte": "2023-01-01", "$lte": "2023-06-30" } })
        );
    }

    #[test]
    fn bad_date_fails_the_request() {
        let params = QueryParams {
            start_date: Some("01/02/2023".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            ProjectFilter::build(&params),
            Err(QueryError::InvalidDate(_))
        ));
    }

    #[test]
    fn page_size_is_capped() {
        let config = QueryConfig {
            default_page_size: 10,
            max_page_size: 100,
        };
        let mut params = QueryParams::default();
        assert_eq!(ProjectFilter::page_size(&params, &config), 10);
        params.limit = Some(500);
        assert_eq!(ProjectFilter::page_size(&params, &config), 100);
    }
}
