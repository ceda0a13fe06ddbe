//! Execution orchestration
//!
//! One fluent builder per engine integration. Each builder collects
//! parameters, validates them, invokes its engine against the environment's
//! pinned snapshot and returns a typed [`Execution`]. Builds accept an
//! optional time bound; on timeout or caller cancellation the input
//! `ProcessState` is untouched because states are values.

pub mod dialob;
pub mod hdes;
pub mod process;
pub mod stencil;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::client::ClientInner;
use crate::envir::Envir;
use crate::error::ClientError;
use crate::process::ProcessState;

pub use dialob::{DialobBody, DialobExecutor};
pub use hdes::{HdesBody, HdesExecutor};
pub use process::ProcessExecutor;
pub use stencil::StencilExecutor;

/// Per-engine execution builders against one environment.
pub struct ExecutorFactory {
    inner: Arc<ClientInner>,
    envir: Envir,
}

impl ExecutorFactory {
    pub(crate) fn new(inner: Arc<ClientInner>, envir: Envir) -> Self {
        Self { inner, envir }
    }

    /// New process instance from a definition name or id.
    pub fn process(&self, name_or_id: impl Into<String>) -> ProcessExecutor {
        ProcessExecutor::new(self.inner.clone(), self.envir.clone(), name_or_id.into())
    }

    /// Continue filling the state's questionnaire.
    pub fn dialob(&self, state: ProcessState) -> DialobExecutor {
        DialobExecutor::new(self.inner.clone(), self.envir.clone(), state)
    }

    /// Re-evaluate the state's flow as of a target date.
    pub fn hdes(&self, state: ProcessState) -> HdesExecutor {
        HdesExecutor::new(self.inner.clone(), self.envir.clone(), state)
    }

    /// Resolve localized content.
    pub fn stencil(&self) -> StencilExecutor {
        StencilExecutor::new(self.inner.clone(), self.envir.clone())
    }
}

/// Run an executor body under an optional time bound.
pub(crate) async fn bounded<T, F>(limit: Option<Duration>, fut: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match limit {
        Some(duration) => match tokio::time::timeout(duration, fut).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(duration)),
        },
        None => fut.await,
    }
}
