//! Aggregation pipeline builders.
//!
//! Counts are computed in a single `$facet` pass so every sub-count derives
//! from one consistent scan of the collection instead of N sequential
//! queries.

use serde_json::{json, Value};

/// Global project statistics: totals plus per-affiliation and per-user
/// breakdowns.
pub fn global_project_stats() -> Vec<Value> {
    vec![json!({
        "$facet": {
            "totalProjects": [ { "$count": "count" } ],
            "projectsPerAffiliation": [
                { "$group": { "_id": "$provenance.affiliation", "count": { "$sum": 1 } } }
            ],
            "projectsPerUser": [
                { "$group": { "_id": "$provenance.email", "count": { "$sum": 1 } } }
            ],
            "projectsWithFiles": [
                { "$match": { "files.0": { "$exists": true } } },
                { "$count": "count" }
            ],
            "filesPerAffiliation": [
                { "$unwind": "$files" },
                { "$group": { "_id": "$provenance.affiliation", "count": { "$sum": 1 } } }
            ]
        }
    })]
}

/// Statistics for one user identity, scoped by an equality match on the
/// provenance email.
pub fn user_project_stats(email: &str) -> Vec<Value> {
    vec![
        json!({ "$match": { "provenance.email": email } }),
        json!({
            "$facet": {
                "totalProjects": [ { "$count": "count" } ],
                "projectsWithFiles": [
                    { "$match": { "files.0": { "$exists": true } } },
                    { "$count": "count" }
                ],
                "totalFiles": [
                    { "$unwind": "$files" },
                    { "$count": "count" }
                ]
            }
        }),
    ]
}

/// Distinct formulas and the flattened union of all element arrays.
///
/// Each document contributes an array of elements; unwinding before
/// grouping concatenates and dedupes, so the result is a flat set rather
/// than an array of arrays.
pub fn formulas_and_elements() -> Vec<Value> {
    vec![json!({
        "$facet": {
            "formulas": [ { "$group": { "_id": "$material.formula" } } ],
            "elements": [
                { "$unwind": "$material.elements" },
                { "$group": { "_id": "$material.elements" } }
            ]
        }
    })]
}

/// Properties of one project, each merged with the owning provenance.
pub fn properties_files(affiliation: &str, project_name: &str) -> Vec<Value> {
    vec![
        json!({ "$match": {
            "provenance.affiliation": affiliation,
            "project.name": project_name
        } }),
        json!({ "$unwind": "$properties" }),
        json!({ "$replaceRoot": {
            "newRoot": { "$mergeObjects": [ "$properties", "$provenance" ] }
        } }),
    ]
}
