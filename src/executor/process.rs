//! Process executor: creates a new process instance and fill session.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::assets::{from_entity, ProcessDef};
use crate::client::ClientInner;
use crate::envir::Envir;
use crate::error::ClientError;
use crate::process::{Execution, ProcessState, ProcessStep, VariableMap};
use crate::store::EntityKind;

use super::bounded;

/// Collects a target date and initial variables, resolves the process
/// definition from the service snapshot and runs the initial flow
/// evaluation.
pub struct ProcessExecutor {
    inner: Arc<ClientInner>,
    envir: Envir,
    name_or_id: String,
    variables: VariableMap,
    target_date: Option<DateTime<Utc>>,
    timeout: Option<Duration>,
}

impl ProcessExecutor {
    pub(crate) fn new(inner: Arc<ClientInner>, envir: Envir, name_or_id: String) -> Self {
        Self {
            inner,
            envir,
            name_or_id,
            variables: VariableMap::new(),
            target_date: None,
            timeout: None,
        }
    }

    /// Target evaluation date; defaults to now.
    pub fn target_date(mut self, date: DateTime<Utc>) -> Self {
        self.target_date = Some(date);
        self
    }

    /// Set one initial variable. Last write per key wins.
    pub fn variable(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Merge a batch of initial variables. Last write per key wins.
    pub fn variables(mut self, variables: VariableMap) -> Self {
        self.variables.extend(variables);
        self
    }

    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub async fn build(self) -> Result<Execution<ProcessState>, ClientError> {
        let Self {
            inner,
            envir,
            name_or_id,
            variables,
            target_date,
            timeout,
        } = self;
        bounded(timeout, async move {
            let mut found: Option<ProcessDef> = None;
            for entity in envir.service().of_kind(EntityKind::Process) {
                let def: ProcessDef = from_entity(entity)?;
                if entity.id == name_or_id || def.name == name_or_id {
                    found = Some(def);
                    break;
                }
            }
            let def = found.ok_or_else(|| ClientError::ProcessNotFound(name_or_id.clone()))?;

            let date = target_date.unwrap_or_else(Utc::now);
            let flow = inner
                .decision
                .evaluate(envir.hdes(), &def.flow, &variables, date)
                .await?;

            let mut merged = variables;
            merged.extend(flow.outputs);

            let state = ProcessState {
                id: inner.gid.next("process"),
                name: def.name.clone(),
                flow: def.flow,
                form: def.form,
                questionnaire: inner.gid.next("questionnaire"),
                step: ProcessStep::Created,
                variables: merged,
                target_date: date,
                actions: Vec::new(),
            };
            info!(process = %state.id, name = %state.name, "Process instance created");
            Ok(Execution::new(state))
        })
        .await
    }
}
