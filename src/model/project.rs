use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

/// Authenticated caller identity, as handed over by the (external) auth
/// layer. Opaque to this crate beyond equality checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    pub affiliation: String,
}

/// Owner identity and lifecycle timestamps. `email` and `affiliation` are
/// set once at project creation and never reassigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub email: String,
    pub affiliation: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Provenance {
    pub fn stamp(identity: &Identity) -> Self {
        let now = Utc::now();
        Self {
            email: identity.email.clone(),
            affiliation: identity.affiliation.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Free-form project metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    #[serde(rename = "isExperiment")]
    pub is_experiment: bool,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<Agent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lattice {
    pub a: String,
    pub b: String,
    pub c: String,
    pub alpha: String,
    pub beta: String,
    pub gamma: String,
}

/// Crystallographic structure snapshot, used for both the input and output
/// sides of a process. Sites and species are kept as opaque strings; CIF
/// parsing is an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialStructure {
    pub lattice: Lattice,
    pub sites: String,
    pub species: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub formula: String,
    /// Derived from `formula` at write time. Never stored independently of
    /// a fresh formula.
    pub elements: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<MaterialStructure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<MaterialStructure>,
}

impl Material {
    /// Build a material from a formula, deriving `elements`.
    pub fn from_formula(
        formula: impl Into<String>,
        input: Option<MaterialStructure>,
        output: Option<MaterialStructure>,
    ) -> Self {
        let formula = formula.into();
        let elements = derive_elements(&formula);
        Self {
            formula,
            elements,
            input,
            output,
        }
    }

    /// Replace the formula, recomputing the derived element list.
    pub fn set_formula(&mut self, formula: impl Into<String>) {
        self.formula = formula.into();
        self.elements = derive_elements(&self.formula);
    }
}

/// Tokenize a chemical formula into its element symbols.
///
/// Symbols are an uppercase letter optionally followed by one lowercase
/// letter; counts are dropped and duplicates removed, preserving first
/// appearance ("C6H12O6" yields C, H, O).
pub fn derive_elements(formula: &str) -> Vec<String> {
    static ELEMENT_RE: OnceLock<Regex> = OnceLock::new();
    let re = ELEMENT_RE.get_or_init(|| Regex::new("[A-Z][a-z]?").unwrap());
    let mut elements: Vec<String> = Vec::new();
    for m in re.find_iter(formula) {
        if !elements.iter().any(|e| e == m.as_str()) {
            elements.push(m.as_str().to_string());
        }
    }
    elements
}

/// A float-or-string value, as stored for parameters and properties.
/// Numbers are stored as numbers, free text as strings; queries must keep
/// the same discipline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: ScalarValue,
}

/// A measured or computed property. `file`, when present, is a stored file
/// reference in `{hash}.{ext}` form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: ScalarValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Reference to a content-addressed stored file.
// Field name "extention" is load-bearing: existing documents spell it that way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRef {
    pub hash: String,
    pub name: String,
    pub extention: String,
    pub size: u64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publication {
    pub name: String,
    /// ISO date, "YYYY-MM-DD".
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Root aggregate persisted in the projects collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub iemap_id: String,
    pub provenance: Provenance,
    pub project: ProjectInfo,
    pub process: ProcessInfo,
    pub material: Material,
    pub parameters: Vec<Parameter>,
    pub properties: Vec<Property>,
    #[serde(default)]
    pub files: Vec<FileRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication: Option<Publication>,
    #[serde(rename = "_v", default = "default_schema_version")]
    pub schema_version: String,
}

fn default_schema_version() -> String {
    "1_0".to_string()
}

/// Caller-supplied payload for project creation. Provenance, the short id
/// and derived elements are stamped by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectDraft {
    pub project: ProjectInfo,
    pub process: ProcessInfo,
    pub formula: String,
    #[serde(default)]
    pub input: Option<MaterialStructure>,
    #[serde(default)]
    pub output: Option<MaterialStructure>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub publication: Option<Publication>,
}

/// Generate a human-facing short identifier, "iemap-" plus six random
/// uppercase hex chars. Uniqueness is probabilistic only and not enforced
/// by the store; deployments that need a hard guarantee should add a unique
/// index on the backing collection.
pub fn generate_iemap_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("iemap-{}", hex[..6].to_uppercase())
}
