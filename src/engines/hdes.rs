//! Reference decision engine: flow definitions as ordered criteria tables.
//!
//! A flow is an ordered list of steps; each step's criteria are tested
//! against the variable map and matching steps apply their assignments.
//! Evaluation is deterministic for a given snapshot, variables and date.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::assets::{from_entity, Criterion, FlowDef, Op};
use crate::envir::AssetSnapshot;
use crate::error::ClientError;
use crate::process::VariableMap;
use crate::store::EntityKind;

use super::{DecisionEngine, FunctionRegistry};

/// Variable the target evaluation date is exposed under during matching.
pub const TARGET_DATE_VAR: &str = "targetDate";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStepResult {
    pub id: String,
    pub matched: bool,
}

/// Outcome of one flow evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowResult {
    pub flow: String,
    pub steps: Vec<FlowStepResult>,
    /// Variable assignments produced by matched steps.
    pub outputs: VariableMap,
}

/// Data-driven decision engine over stored [`FlowDef`] assets.
pub struct TableDecisionEngine {
    functions: Arc<FunctionRegistry>,
}

impl TableDecisionEngine {
    pub fn new(functions: Arc<FunctionRegistry>) -> Self {
        Self { functions }
    }

    fn fail(flow: &str, message: impl Into<String>) -> ClientError {
        ClientError::FlowEvaluation {
            flow: flow.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl DecisionEngine for TableDecisionEngine {
    async fn evaluate(
        &self,
        snapshot: &AssetSnapshot,
        flow_ref: &str,
        variables: &VariableMap,
        target_date: DateTime<Utc>,
    ) -> Result<FlowResult, ClientError> {
        let mut def: Option<FlowDef> = None;
        for entity in snapshot.of_kind(EntityKind::Flow) {
            let candidate: FlowDef =
                from_entity(entity).map_err(|e| Self::fail(flow_ref, e.to_string()))?;
            if entity.id == flow_ref || candidate.name == flow_ref {
                def = Some(candidate);
                break;
            }
        }
        let def = def.ok_or_else(|| {
            Self::fail(
                flow_ref,
                format!("no such flow in {}@{}", snapshot.repo, snapshot.commit),
            )
        })?;

        let mut scope = variables.clone();
        scope.insert(
            TARGET_DATE_VAR.to_string(),
            serde_json::json!(target_date.to_rfc3339()),
        );

        let mut steps = Vec::with_capacity(def.steps.len());
        let mut outputs = VariableMap::new();
        for step in &def.steps {
            let matched = step.when.iter().all(|c| criterion_holds(c, &scope));
            if matched {
                for (name, value) in &step.then {
                    let resolved = resolve_value(value, &scope, &self.functions)
                        .map_err(|e| Self::fail(&def.name, e.to_string()))?;
                    scope.insert(name.clone(), resolved.clone());
                    outputs.insert(name.clone(), resolved);
                }
            }
            steps.push(FlowStepResult {
                id: step.id.clone(),
                matched,
            });
        }

        debug!(flow = %def.name, steps = steps.len(), outputs = outputs.len(), "Flow evaluated");
        Ok(FlowResult {
            flow: def.name,
            steps,
            outputs,
        })
    }
}

/// A criterion over a missing variable never holds.
fn criterion_holds(criterion: &Criterion, scope: &VariableMap) -> bool {
    let actual = match scope.get(&criterion.field) {
        Some(v) => v,
        None => return false,
    };
    let expected = &criterion.value;
    match criterion.op {
        Op::Eq => actual == expected,
        Op::Ne => actual != expected,
        Op::Gt | Op::Gte | Op::Lt | Op::Lte => compare_ordered(criterion.op, actual, expected),
        Op::In => expected
            .as_array()
            .map(|arr| arr.contains(actual))
            .unwrap_or(false),
    }
}

fn compare_ordered(op: Op, actual: &serde_json::Value, expected: &serde_json::Value) -> bool {
    // Numbers compare numerically, strings lexicographically (covers
    // rfc3339 dates); anything else never holds.
    let ordering = match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(b)) => Some(a.cmp(b)),
            _ => None,
        },
    };
    match ordering {
        Some(ord) => match op {
            Op::Gt => ord.is_gt(),
            Op::Gte => ord.is_ge(),
            Op::Lt => ord.is_lt(),
            Op::Lte => ord.is_le(),
            _ => false,
        },
        None => false,
    }
}

/// Resolve an assignment value: `{"var": name}` reads the scope,
/// `{"fn": name, "args": [..]}` calls the registry, anything else is a
/// literal.
fn resolve_value(
    value: &serde_json::Value,
    scope: &VariableMap,
    functions: &FunctionRegistry,
) -> Result<serde_json::Value, ClientError> {
    if let Some(obj) = value.as_object() {
        if let Some(var) = obj.get("var").and_then(|v| v.as_str()) {
            return Ok(scope.get(var).cloned().unwrap_or(serde_json::Value::Null));
        }
        if let Some(name) = obj.get("fn").and_then(|v| v.as_str()) {
            let raw_args = obj
                .get("args")
                .and_then(|a| a.as_array())
                .cloned()
                .unwrap_or_default();
            let mut args = Vec::with_capacity(raw_args.len());
            for arg in &raw_args {
                args.push(resolve_value(arg, scope, functions)?);
            }
            return functions.invoke(name, &args);
        }
    }
    Ok(value.clone())
}
