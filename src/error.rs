//! Error types for composer-client

use thiserror::Error;

/// Commit identifier (content hash of the commit record).
pub type CommitId = String;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("configuration error: {field}: {message}")]
    Configuration { field: String, message: String },

    #[error("concurrent modification on {repo}/{branch}")]
    ConcurrentModification { repo: String, branch: String },

    #[error("repository not found: {0}")]
    RepoNotFound(String),

    #[error("commit not found: {repo}/{commit}")]
    CommitNotFound { repo: String, commit: CommitId },

    #[error("unresolved release: {repo}/{name}")]
    UnresolvedRelease { repo: String, name: String },

    #[error("release already exists: {repo}/{name}")]
    ReleaseExists { repo: String, name: String },

    #[error("process not found: {0}")]
    ProcessNotFound(String),

    #[error("questionnaire not found: {0}")]
    QuestionnaireNotFound(String),

    #[error("content not found for locale: {0}")]
    ContentNotFound(String),

    #[error("flow evaluation failed: {flow}: {message}")]
    FlowEvaluation { flow: String, message: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("execution timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sled::Error),
}

impl ClientError {
    /// Shorthand for a missing/invalid builder field.
    pub fn config(field: &str, message: &str) -> Self {
        ClientError::Configuration {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}
