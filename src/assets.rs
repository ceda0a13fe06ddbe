//! Stored asset document shapes
//!
//! These are the bodies of the entities each engine repository holds:
//! process definitions (service repo), flow definitions (hdes repo), form
//! definitions (dialob repo) and localized site documents (stencil repo).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ClientError;
use crate::store::Entity;

/// Parse an entity body into a typed asset document.
pub fn from_entity<T: serde::de::DeserializeOwned>(entity: &Entity) -> Result<T, ClientError> {
    serde_json::from_value(entity.body.clone()).map_err(|e| {
        ClientError::Deserialization(format!("entity {}: {}", entity.id, e))
    })
}

/// Orchestration-level process definition: binds a name to one flow and one
/// form so a single execution can chain both engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDef {
    pub name: String,
    /// Flow name in the hdes repository.
    pub flow: String,
    /// Form name in the dialob repository.
    pub form: String,
}

/// Decision-engine flow definition: ordered steps of variable criteria and
/// resulting assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDef {
    pub name: String,
    pub steps: Vec<FlowStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStep {
    pub id: String,
    /// All criteria must hold for the step to match.
    #[serde(default)]
    pub when: Vec<Criterion>,
    /// Variable assignments applied when the step matches. Values may be
    /// literals, `{"var": name}` references or `{"fn": name, "args": [..]}`
    /// registry calls.
    #[serde(default)]
    pub then: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub field: String,
    pub op: Op,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
}

/// Questionnaire form definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDef {
    pub name: String,
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub required: bool,
}

/// One locale's content document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteDef {
    pub locale: String,
    pub pages: Vec<PageDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDef {
    pub path: String,
    pub title: String,
    pub content: String,
    /// Page is invisible before this date.
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
}
