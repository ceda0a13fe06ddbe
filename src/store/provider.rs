//! Id and author capabilities injected into the document store.
//!
//! One generator instance is shared by all writers so ids stay unique
//! within a process lifetime; v4 uuids make them practically unique
//! across processes too.

use std::sync::Arc;

use uuid::Uuid;

/// Author marker used when no provider is configured.
pub const UNATTRIBUTED: &str = "not-configured";

/// Type-keyed generator for entity/commit provenance ids.
pub trait GidProvider: Send + Sync {
    /// Generate the next id for the given entity type.
    fn next(&self, entity_type: &str) -> String;
}

/// Default generator: random v4 uuid, type-independent.
#[derive(Debug, Default)]
pub struct UuidGen;

impl GidProvider for UuidGen {
    fn next(&self, _entity_type: &str) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

/// Supplies the author recorded on entities, commits and releases.
pub trait AuthorProvider: Send + Sync {
    fn author(&self) -> String;
}

/// Constant author, e.g. a service account name.
#[derive(Debug, Clone)]
pub struct StaticAuthor(pub String);

impl StaticAuthor {
    /// The default "unattributed" author.
    pub fn unattributed() -> Arc<dyn AuthorProvider> {
        Arc::new(StaticAuthor(UNATTRIBUTED.to_string()))
    }
}

impl AuthorProvider for StaticAuthor {
    fn author(&self) -> String {
        self.0.clone()
    }
}
