//! Process state threaded across executor invocations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::engines::dialob::Action;

/// Variable name to value mapping carried through an execution chain.
pub type VariableMap = BTreeMap<String, serde_json::Value>;

/// Logical position in the execution chain. Executors validate their own
/// inputs and set the step they own; there is no central state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessStep {
    Created,
    Evaluated,
    Filled,
    Rendered,
    Terminal,
}

/// Carrier of variables, target date and accumulated actions between
/// executor calls. A value type: executors return a new state instead of
/// mutating the caller's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessState {
    pub id: String,
    /// Process definition name this instance was created from.
    pub name: String,
    /// Flow name resolvable in the environment's hdes snapshot.
    pub flow: String,
    /// Form name resolvable in the environment's dialob snapshot.
    pub form: String,
    /// In-flight questionnaire (fill session) id, resolved through the
    /// caller's questionnaire store.
    pub questionnaire: String,
    pub step: ProcessStep,
    pub variables: VariableMap,
    pub target_date: DateTime<Utc>,
    pub actions: Vec<Action>,
}

/// Typed execution result wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution<T> {
    body: T,
}

impl<T> Execution<T> {
    pub fn new(body: T) -> Self {
        Self { body }
    }

    pub fn body(&self) -> &T {
        &self.body
    }

    pub fn into_body(self) -> T {
        self.body
    }
}
