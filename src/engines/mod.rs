//! Collaborating engine interfaces and their configuration hooks.
//!
//! The decision, questionnaire and content engines are external
//! collaborators; this module defines the contracts the orchestrator calls
//! through, plus the hooks the client builder requires (event publisher,
//! function registry, dependency-injection and service-init contexts).
//! Reference implementations live in the submodules and are overridable at
//! build time.

pub mod dialob;
pub mod hdes;
pub mod stencil;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::envir::AssetSnapshot;
use crate::error::ClientError;
use crate::process::VariableMap;
use dialob::{Actions, Questionnaire};
use hdes::FlowResult;
use stencil::LocalizedSite;

/// Decision/flow engine: evaluates a flow against a commit-pinned snapshot.
#[async_trait]
pub trait DecisionEngine: Send + Sync {
    async fn evaluate(
        &self,
        snapshot: &AssetSnapshot,
        flow_ref: &str,
        variables: &VariableMap,
        target_date: DateTime<Utc>,
    ) -> Result<FlowResult, ClientError>;
}

/// Questionnaire engine: applies a batch of user actions to an in-flight
/// questionnaire, validated against the snapshot's form definition.
#[async_trait]
pub trait QuestionnaireEngine: Send + Sync {
    async fn apply(
        &self,
        snapshot: &AssetSnapshot,
        questionnaire: Questionnaire,
        actions: Actions,
    ) -> Result<(Questionnaire, Actions), ClientError>;
}

/// Content engine: resolves localized content from a commit-pinned snapshot.
#[async_trait]
pub trait ContentEngine: Send + Sync {
    async fn render(
        &self,
        snapshot: &AssetSnapshot,
        locale: &str,
        target_date: DateTime<Utc>,
    ) -> Result<LocalizedSite, ClientError>;
}

/// Events emitted by the questionnaire engine while filling.
#[derive(Debug, Clone, PartialEq)]
pub enum QuestionnaireEvent {
    Answered { questionnaire: String, field: String },
    Completed { questionnaire: String },
}

/// Receives questionnaire events. Required by the client builder; the
/// logging implementation below is an explicit opt-in, not a silent default.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: QuestionnaireEvent);
}

/// Publisher that only logs, for setups without an event pipeline.
#[derive(Debug, Default)]
pub struct LoggingEventPublisher;

impl EventPublisher for LoggingEventPublisher {
    fn publish(&self, event: QuestionnaireEvent) {
        debug!(?event, "questionnaire event");
    }
}

type RegistryFn =
    Arc<dyn Fn(&[serde_json::Value]) -> Result<serde_json::Value, ClientError> + Send + Sync>;

/// Named functions available to rule evaluation.
pub struct FunctionRegistry {
    functions: HashMap<String, RegistryFn>,
}

impl FunctionRegistry {
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Registry pre-populated with the standard function set
    /// (`sum`, `min`, `max`, `concat`, `coalesce`).
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register("sum", |args| {
            Ok(serde_json::json!(numbers(args)?.into_iter().sum::<f64>()))
        });
        registry.register("min", |args| {
            let nums = numbers(args)?;
            Ok(serde_json::json!(nums.into_iter().fold(f64::INFINITY, f64::min)))
        });
        registry.register("max", |args| {
            let nums = numbers(args)?;
            Ok(serde_json::json!(nums
                .into_iter()
                .fold(f64::NEG_INFINITY, f64::max)))
        });
        registry.register("concat", |args| {
            let mut out = String::new();
            for arg in args {
                match arg {
                    serde_json::Value::String(s) => out.push_str(s),
                    other => out.push_str(&other.to_string()),
                }
            }
            Ok(serde_json::Value::String(out))
        });
        registry.register("coalesce", |args| {
            Ok(args
                .iter()
                .find(|v| !v.is_null())
                .cloned()
                .unwrap_or(serde_json::Value::Null))
        });
        registry
    }

    pub fn register<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&[serde_json::Value]) -> Result<serde_json::Value, ClientError>
            + Send
            + Sync
            + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(f));
    }

    pub fn invoke(
        &self,
        name: &str,
        args: &[serde_json::Value],
    ) -> Result<serde_json::Value, ClientError> {
        let f = self
            .functions
            .get(name)
            .ok_or_else(|| ClientError::InvalidInput(format!("unknown function: {}", name)))?;
        f(args)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

fn numbers(args: &[serde_json::Value]) -> Result<Vec<f64>, ClientError> {
    args.iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| ClientError::InvalidInput(format!("not a number: {}", v)))
        })
        .collect()
}

/// Dependency-injection context required by the decision engine: resolves
/// already-constructed services by name.
pub trait DependencyInjection: Send + Sync {
    fn get(&self, service: &str) -> Option<Arc<dyn Any + Send + Sync>>;
}

/// Injection context that resolves nothing. Explicit opt-in test double.
#[derive(Debug, Default)]
pub struct EmptyInjection;

impl DependencyInjection for EmptyInjection {
    fn get(&self, _service: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        None
    }
}

/// Service-init hook required by the decision engine: constructs fresh
/// service instances by name.
pub trait ServiceInit: Send + Sync {
    fn init(&self, service: &str) -> Option<Arc<dyn Any + Send + Sync>>;
}

/// Service-init that constructs nothing. Explicit opt-in test double.
#[derive(Debug, Default)]
pub struct EmptyServiceInit;

impl ServiceInit for EmptyServiceInit {
    fn init(&self, _service: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        None
    }
}
