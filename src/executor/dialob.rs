//! Dialob executor: continues a fill session with a batch of user actions.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::client::ClientInner;
use crate::engines::dialob::{Actions, Questionnaire, QuestionnaireStatus, QuestionnaireStore};
use crate::envir::Envir;
use crate::error::ClientError;
use crate::process::{Execution, ProcessState, ProcessStep};

use super::bounded;

/// Result of one fill step: the carried-forward state, the updated
/// questionnaire and the applied actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialobBody {
    pub state: ProcessState,
    pub questionnaire: Questionnaire,
    pub actions: Actions,
}

pub struct DialobExecutor {
    inner: Arc<ClientInner>,
    envir: Envir,
    state: ProcessState,
    store: Option<Arc<dyn QuestionnaireStore>>,
    actions: Actions,
    timeout: Option<Duration>,
}

impl DialobExecutor {
    pub(crate) fn new(inner: Arc<ClientInner>, envir: Envir, state: ProcessState) -> Self {
        Self {
            inner,
            envir,
            state,
            store: None,
            actions: Actions::default(),
            timeout: None,
        }
    }

    /// Store resolving in-flight questionnaire data. Required.
    pub fn store(mut self, store: Arc<dyn QuestionnaireStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Batch of user actions to apply.
    pub fn actions(mut self, actions: Actions) -> Self {
        self.actions = actions;
        self
    }

    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub async fn build(self) -> Result<Execution<DialobBody>, ClientError> {
        let Self {
            inner,
            envir,
            state,
            store,
            actions,
            timeout,
        } = self;
        let store = store.ok_or_else(|| {
            ClientError::config("dialob.store", "questionnaire store must be defined")
        })?;
        bounded(timeout, async move {
            let questionnaire = store.get(&state.questionnaire)?;
            let (questionnaire, applied) = inner
                .questionnaire
                .apply(envir.dialob(), questionnaire, actions)
                .await?;

            let mut state = state;
            state.actions.extend(applied.actions.iter().cloned());
            state.step = match questionnaire.status {
                QuestionnaireStatus::Completed => ProcessStep::Terminal,
                QuestionnaireStatus::Open => ProcessStep::Filled,
            };

            Ok(Execution::new(DialobBody {
                state,
                questionnaire,
                actions: applied,
            }))
        })
        .await
    }
}
