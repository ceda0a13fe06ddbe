//! Reference questionnaire engine: applies user actions to a fill session.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::assets::{from_entity, FormDef};
use crate::envir::AssetSnapshot;
use crate::error::ClientError;
use crate::store::EntityKind;

use super::{EventPublisher, QuestionnaireEngine, QuestionnaireEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionnaireStatus {
    Open,
    Completed,
}

/// In-flight questionnaire (fill session).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Questionnaire {
    pub id: String,
    /// Form definition name in the dialob snapshot.
    pub form: String,
    pub status: QuestionnaireStatus,
    pub answers: BTreeMap<String, serde_json::Value>,
    pub rev: u64,
}

impl Questionnaire {
    /// Fresh open session for a form.
    pub fn open(id: impl Into<String>, form: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            form: form.into(),
            status: QuestionnaireStatus::Open,
            answers: BTreeMap::new(),
            rev: 0,
        }
    }
}

/// One user action against a questionnaire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Action {
    Answer { id: String, answer: serde_json::Value },
    Complete,
}

/// Batch of actions applied in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Actions {
    pub actions: Vec<Action>,
}

impl Actions {
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions }
    }
}

/// Resolves in-flight questionnaire data. Owned by the caller; the client
/// never persists fill sessions itself.
pub trait QuestionnaireStore: Send + Sync {
    fn get(&self, questionnaire_id: &str) -> Result<Questionnaire, ClientError>;
}

/// Data-driven questionnaire engine over stored [`FormDef`] assets.
pub struct FormEngine {
    events: Arc<dyn EventPublisher>,
}

impl FormEngine {
    pub fn new(events: Arc<dyn EventPublisher>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl QuestionnaireEngine for FormEngine {
    async fn apply(
        &self,
        snapshot: &AssetSnapshot,
        questionnaire: Questionnaire,
        actions: Actions,
    ) -> Result<(Questionnaire, Actions), ClientError> {
        let mut def: Option<FormDef> = None;
        for entity in snapshot.of_kind(EntityKind::Form) {
            let candidate: FormDef = from_entity(entity)?;
            if entity.id == questionnaire.form || candidate.name == questionnaire.form {
                def = Some(candidate);
                break;
            }
        }
        let def = def.ok_or_else(|| {
            ClientError::QuestionnaireNotFound(format!(
                "form {} for questionnaire {}",
                questionnaire.form, questionnaire.id
            ))
        })?;

        let mut result = questionnaire;
        for action in &actions.actions {
            if result.status == QuestionnaireStatus::Completed {
                return Err(ClientError::InvalidInput(format!(
                    "questionnaire {} is already completed",
                    result.id
                )));
            }
            match action {
                Action::Answer { id, answer } => {
                    if !def.fields.iter().any(|f| &f.id == id) {
                        return Err(ClientError::InvalidInput(format!(
                            "unknown field {} on form {}",
                            id, def.name
                        )));
                    }
                    result.answers.insert(id.clone(), answer.clone());
                    result.rev += 1;
                    self.events.publish(QuestionnaireEvent::Answered {
                        questionnaire: result.id.clone(),
                        field: id.clone(),
                    });
                }
                Action::Complete => {
                    let missing: Vec<&str> = def
                        .fields
                        .iter()
                        .filter(|f| f.required)
                        .filter(|f| {
                            result
                                .answers
                                .get(&f.id)
                                .map(|a| a.is_null())
                                .unwrap_or(true)
                        })
                        .map(|f| f.id.as_str())
                        .collect();
                    if !missing.is_empty() {
                        return Err(ClientError::InvalidInput(format!(
                            "required answers missing: {}",
                            missing.join(", ")
                        )));
                    }
                    result.status = QuestionnaireStatus::Completed;
                    result.rev += 1;
                    self.events.publish(QuestionnaireEvent::Completed {
                        questionnaire: result.id.clone(),
                    });
                }
            }
        }

        debug!(
            questionnaire = %result.id,
            rev = result.rev,
            applied = actions.actions.len(),
            "Actions applied"
        );
        Ok((result, actions))
    }
}
