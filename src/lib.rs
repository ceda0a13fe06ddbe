//! composer-client - versioned asset store and execution orchestration
//!
//! Composes three domain engines (decision/flow, questionnaire, content)
//! into reproducible executions against versioned snapshots of
//! configuration assets.
//!
//! ## Architecture
//!
//! - **Document store**: branched, content-addressed repositories with
//!   atomic head advancement (optimistic CAS)
//! - **Environment**: immutable snapshot pinning one commit per repository,
//!   assembled from releases
//! - **Executors**: fluent per-engine builders producing typed executions,
//!   threading `ProcessState` between steps
//!
//! ## Flow
//!
//! ```text
//! ClientBuilder -> Client (4 stores, 1 connection)
//!   -> EnvirBuilder (releases -> pinned commits)
//!     -> ExecutorFactory (process | dialob | hdes | stencil)
//!       -> Execution<T> (+ new ProcessState)
//! ```
//!
//! Reads always pin to explicit commits, so concurrent head advancement
//! never changes what an assembled environment observes.

pub mod assets;
pub mod cache;
pub mod client;
pub mod engines;
pub mod envir;
pub mod error;
pub mod executor;
pub mod process;
pub mod store;

// Re-exports
pub use cache::{ClientCache, MemoryCache};
pub use client::{Client, ClientBuilder, ClientQuery, RepoBuilder, RepoKind};
pub use engines::dialob::{
    Action, Actions, Questionnaire, QuestionnaireStatus, QuestionnaireStore,
};
pub use engines::hdes::FlowResult;
pub use engines::stencil::{LocalizedPage, LocalizedSite};
pub use engines::{
    ContentEngine, DecisionEngine, DependencyInjection, EventPublisher, FunctionRegistry,
    QuestionnaireEvent, ServiceInit,
};
pub use envir::{AssetSnapshot, Envir, EnvirBuilder};
pub use error::{ClientError, CommitId};
pub use executor::{DialobBody, ExecutorFactory, HdesBody};
pub use process::{Execution, ProcessState, ProcessStep, VariableMap};
pub use store::{Changes, Commit, DocumentStore, Entity, EntityKind, Release, MAIN_BRANCH};
