//! Hdes executor: re-evaluates the state's flow as of a target date.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::client::ClientInner;
use crate::engines::dialob::QuestionnaireStore;
use crate::engines::hdes::FlowResult;
use crate::envir::Envir;
use crate::error::ClientError;
use crate::process::{Execution, ProcessState, ProcessStep};

use super::bounded;

/// Result of one flow evaluation step: the updated state and the flow
/// outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HdesBody {
    pub state: ProcessState,
    pub flow: FlowResult,
}

pub struct HdesExecutor {
    inner: Arc<ClientInner>,
    envir: Envir,
    state: ProcessState,
    store: Option<Arc<dyn QuestionnaireStore>>,
    target_date: Option<DateTime<Utc>>,
    timeout: Option<Duration>,
}

impl HdesExecutor {
    pub(crate) fn new(inner: Arc<ClientInner>, envir: Envir, state: ProcessState) -> Self {
        Self {
            inner,
            envir,
            state,
            store: None,
            target_date: None,
            timeout: None,
        }
    }

    /// Store resolving in-flight questionnaire data. Required: answers are
    /// merged into the evaluation variables.
    pub fn store(mut self, store: Arc<dyn QuestionnaireStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Evaluate as of this date; defaults to the state's target date.
    pub fn target_date(mut self, date: DateTime<Utc>) -> Self {
        self.target_date = Some(date);
        self
    }

    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub async fn build(self) -> Result<Execution<HdesBody>, ClientError> {
        let Self {
            inner,
            envir,
            state,
            store,
            target_date,
            timeout,
        } = self;
        let store = store.ok_or_else(|| {
            ClientError::config("hdes.store", "questionnaire store must be defined")
        })?;
        bounded(timeout, async move {
            let questionnaire = store.get(&state.questionnaire)?;
            let date = target_date.unwrap_or(state.target_date);

            // Questionnaire answers win over earlier variables.
            let mut variables = state.variables.clone();
            variables.extend(questionnaire.answers.clone());

            let flow = inner
                .decision
                .evaluate(envir.hdes(), &state.flow, &variables, date)
                .await?;
            variables.extend(flow.outputs.clone());

            let mut state = state;
            state.variables = variables;
            state.target_date = date;
            state.step = ProcessStep::Evaluated;

            Ok(Execution::new(HdesBody { state, flow }))
        })
        .await
    }
}
