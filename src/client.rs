//! Client construction and wiring.
//!
//! The builder validates configuration eagerly and wires one logical store
//! per engine repository, all sharing a single physical connection, a
//! shared id generator and author provider, and per-repository codecs. The
//! resulting client is immutable configuration plus factory methods.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::assets::{from_entity, ProcessDef};
use crate::cache::{ClientCache, MemoryCache};
use crate::engines::dialob::FormEngine;
use crate::engines::hdes::TableDecisionEngine;
use crate::engines::stencil::SiteEngine;
use crate::engines::{
    ContentEngine, DecisionEngine, DependencyInjection, EventPublisher, FunctionRegistry,
    QuestionnaireEngine, ServiceInit,
};
use crate::envir::{Envir, EnvirBuilder};
use crate::error::{ClientError, CommitId};
use crate::executor::ExecutorFactory;
use crate::store::codec::EntityCodec;
use crate::store::connection::Connection;
use crate::store::provider::{AuthorProvider, GidProvider, StaticAuthor, UuidGen};
use crate::store::{DocumentStore, EntityId, EntityKind, Release, MAIN_BRANCH};

/// The four repositories a client is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepoKind {
    Stencil = 0,
    Hdes = 1,
    Dialob = 2,
    Service = 3,
}

impl RepoKind {
    pub const ALL: [RepoKind; 4] = [
        RepoKind::Stencil,
        RepoKind::Hdes,
        RepoKind::Dialob,
        RepoKind::Service,
    ];
}

/// One store per engine repository, sharing one connection.
pub(crate) struct Stores {
    stencil: Arc<DocumentStore>,
    hdes: Arc<DocumentStore>,
    dialob: Arc<DocumentStore>,
    service: Arc<DocumentStore>,
}

impl Stores {
    pub(crate) fn get(&self, kind: RepoKind) -> &Arc<DocumentStore> {
        match kind {
            RepoKind::Stencil => &self.stencil,
            RepoKind::Hdes => &self.hdes,
            RepoKind::Dialob => &self.dialob,
            RepoKind::Service => &self.service,
        }
    }

    pub(crate) fn kind_of(&self, repo: &str) -> Option<RepoKind> {
        RepoKind::ALL
            .into_iter()
            .find(|kind| self.get(*kind).repo() == repo)
    }
}

/// Immutable client internals shared by builders and executors.
pub(crate) struct ClientInner {
    pub(crate) stores: Stores,
    pub(crate) cache: Arc<dyn ClientCache>,
    pub(crate) gid: Arc<dyn GidProvider>,
    pub(crate) decision: Arc<dyn DecisionEngine>,
    pub(crate) questionnaire: Arc<dyn QuestionnaireEngine>,
    pub(crate) content: Arc<dyn ContentEngine>,
    pub(crate) injection: Arc<dyn DependencyInjection>,
    pub(crate) service_init: Arc<dyn ServiceInit>,
    pub(crate) events: Arc<dyn EventPublisher>,
    pub(crate) functions: Arc<FunctionRegistry>,
}

/// Entry point: versioned asset store plus execution orchestration.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Start assembling an environment from release references.
    pub fn envir(&self) -> EnvirBuilder {
        EnvirBuilder::new(self.inner.clone())
    }

    /// Repository lifecycle operations.
    pub fn repo(&self) -> RepoBuilder {
        RepoBuilder {
            inner: self.inner.clone(),
        }
    }

    /// Per-engine execution builders against an environment.
    pub fn executor(&self, envir: &Envir) -> ExecutorFactory {
        ExecutorFactory::new(self.inner.clone(), envir.clone())
    }

    /// Read-side queries over the configured repositories.
    pub fn query(&self) -> ClientQuery {
        ClientQuery {
            inner: self.inner.clone(),
        }
    }

    /// The logical store for one repository.
    pub fn store(&self, kind: RepoKind) -> Arc<DocumentStore> {
        self.inner.stores.get(kind).clone()
    }

    /// The configured rule-evaluation function registry.
    pub fn functions(&self) -> &FunctionRegistry {
        &self.inner.functions
    }

    /// The configured questionnaire event publisher.
    pub fn events(&self) -> &Arc<dyn EventPublisher> {
        &self.inner.events
    }

    /// The configured decision-engine dependency-injection context.
    pub fn injection(&self) -> &Arc<dyn DependencyInjection> {
        &self.inner.injection
    }

    /// The configured decision-engine service-init hook.
    pub fn service_init(&self) -> &Arc<dyn ServiceInit> {
        &self.inner.service_init
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("stencil", &self.inner.stores.get(RepoKind::Stencil).repo())
            .field("hdes", &self.inner.stores.get(RepoKind::Hdes).repo())
            .field("dialob", &self.inner.stores.get(RepoKind::Dialob).repo())
            .field("service", &self.inner.stores.get(RepoKind::Service).repo())
            .finish_non_exhaustive()
    }
}

/// Validating builder for [`Client`].
///
/// Required: connection, codec, the four repository names, the decision
/// engine's injection and service-init hooks, the questionnaire engine's
/// event publisher and function registry. The provided no-op/logging hook
/// implementations are explicit opt-ins, never silent defaults. Author
/// provider and cache do default silently (unattributed author, embedded
/// cache keyed by the service repository name).
#[derive(Default)]
pub struct ClientBuilder {
    connection: Option<Arc<dyn Connection>>,
    codec: Option<Arc<dyn EntityCodec>>,
    codec_overrides: HashMap<RepoKind, Arc<dyn EntityCodec>>,
    repo_stencil: Option<String>,
    repo_hdes: Option<String>,
    repo_dialob: Option<String>,
    repo_service: Option<String>,
    gid: Option<Arc<dyn GidProvider>>,
    author: Option<Arc<dyn AuthorProvider>>,
    cache: Option<Arc<dyn ClientCache>>,
    hdes_injection: Option<Arc<dyn DependencyInjection>>,
    hdes_service_init: Option<Arc<dyn ServiceInit>>,
    dialob_events: Option<Arc<dyn EventPublisher>>,
    dialob_functions: Option<Arc<FunctionRegistry>>,
    decision: Option<Arc<dyn DecisionEngine>>,
    questionnaire: Option<Arc<dyn QuestionnaireEngine>>,
    content: Option<Arc<dyn ContentEngine>>,
    content_fallback_locale: Option<String>,
}

impl ClientBuilder {
    pub fn connection(mut self, connection: Arc<dyn Connection>) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn codec(mut self, codec: Arc<dyn EntityCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Override the codec for one repository.
    pub fn codec_for(mut self, kind: RepoKind, codec: Arc<dyn EntityCodec>) -> Self {
        self.codec_overrides.insert(kind, codec);
        self
    }

    pub fn repo_stencil(mut self, name: impl Into<String>) -> Self {
        self.repo_stencil = Some(name.into());
        self
    }

    pub fn repo_hdes(mut self, name: impl Into<String>) -> Self {
        self.repo_hdes = Some(name.into());
        self
    }

    pub fn repo_dialob(mut self, name: impl Into<String>) -> Self {
        self.repo_dialob = Some(name.into());
        self
    }

    pub fn repo_service(mut self, name: impl Into<String>) -> Self {
        self.repo_service = Some(name.into());
        self
    }

    pub fn gid(mut self, gid: Arc<dyn GidProvider>) -> Self {
        self.gid = Some(gid);
        self
    }

    pub fn author(mut self, author: Arc<dyn AuthorProvider>) -> Self {
        self.author = Some(author);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn ClientCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn hdes_injection(mut self, injection: Arc<dyn DependencyInjection>) -> Self {
        self.hdes_injection = Some(injection);
        self
    }

    pub fn hdes_service_init(mut self, service_init: Arc<dyn ServiceInit>) -> Self {
        self.hdes_service_init = Some(service_init);
        self
    }

    pub fn dialob_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.dialob_events = Some(events);
        self
    }

    pub fn dialob_functions(mut self, functions: FunctionRegistry) -> Self {
        self.dialob_functions = Some(Arc::new(functions));
        self
    }

    pub fn decision_engine(mut self, engine: Arc<dyn DecisionEngine>) -> Self {
        self.decision = Some(engine);
        self
    }

    pub fn questionnaire_engine(mut self, engine: Arc<dyn QuestionnaireEngine>) -> Self {
        self.questionnaire = Some(engine);
        self
    }

    pub fn content_engine(mut self, engine: Arc<dyn ContentEngine>) -> Self {
        self.content = Some(engine);
        self
    }

    /// Locale the content engine falls back to when the requested one is
    /// missing. Without it a missing locale is an error.
    pub fn content_fallback_locale(mut self, locale: impl Into<String>) -> Self {
        self.content_fallback_locale = Some(locale.into());
        self
    }

    /// Validate and construct the client. Fails fast with a
    /// `Configuration` error naming the first missing required field.
    pub fn build(mut self) -> Result<Client, ClientError> {
        let connection = self
            .connection
            .ok_or_else(|| ClientError::config("connection", "storage connection must be defined"))?;
        let codec = self
            .codec
            .ok_or_else(|| ClientError::config("codec", "entity codec must be defined"))?;
        let repo_stencil = self
            .repo_stencil
            .ok_or_else(|| ClientError::config("repo_stencil", "repository name must be defined"))?;
        let repo_hdes = self
            .repo_hdes
            .ok_or_else(|| ClientError::config("repo_hdes", "repository name must be defined"))?;
        let repo_dialob = self
            .repo_dialob
            .ok_or_else(|| ClientError::config("repo_dialob", "repository name must be defined"))?;
        let repo_service = self
            .repo_service
            .ok_or_else(|| ClientError::config("repo_service", "repository name must be defined"))?;
        let injection = self.hdes_injection.ok_or_else(|| {
            ClientError::config("hdes_injection", "dependency-injection context must be defined")
        })?;
        let service_init = self.hdes_service_init.ok_or_else(|| {
            ClientError::config("hdes_service_init", "service-init hook must be defined")
        })?;
        let events = self.dialob_events.ok_or_else(|| {
            ClientError::config("dialob_events", "event publisher must be defined")
        })?;
        let functions = self.dialob_functions.ok_or_else(|| {
            ClientError::config("dialob_functions", "function registry must be defined")
        })?;

        let names = [&repo_stencil, &repo_hdes, &repo_dialob, &repo_service];
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(ClientError::config(
                    "repo_names",
                    &format!("repository names must be distinct: {}", name),
                ));
            }
        }

        let gid = self.gid.unwrap_or_else(|| Arc::new(UuidGen));
        let author = self.author.unwrap_or_else(StaticAuthor::unattributed);
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(MemoryCache::new(repo_service.clone())));

        let mut store_for = |kind: RepoKind, repo: &str| {
            let codec = self
                .codec_overrides
                .remove(&kind)
                .unwrap_or_else(|| codec.clone());
            Arc::new(DocumentStore::new(
                repo,
                connection.clone(),
                codec,
                gid.clone(),
                author.clone(),
            ))
        };
        let stores = Stores {
            stencil: store_for(RepoKind::Stencil, &repo_stencil),
            hdes: store_for(RepoKind::Hdes, &repo_hdes),
            dialob: store_for(RepoKind::Dialob, &repo_dialob),
            service: store_for(RepoKind::Service, &repo_service),
        };

        let decision: Arc<dyn DecisionEngine> = self
            .decision
            .unwrap_or_else(|| Arc::new(TableDecisionEngine::new(functions.clone())));
        let questionnaire: Arc<dyn QuestionnaireEngine> = self
            .questionnaire
            .unwrap_or_else(|| Arc::new(FormEngine::new(events.clone())));
        let content: Arc<dyn ContentEngine> = self.content.unwrap_or_else(|| {
            Arc::new(match self.content_fallback_locale {
                Some(locale) => SiteEngine::with_fallback(locale),
                None => SiteEngine::new(),
            })
        });

        info!(
            stencil = %repo_stencil,
            hdes = %repo_hdes,
            dialob = %repo_dialob,
            service = %repo_service,
            "Client configured"
        );
        Ok(Client {
            inner: Arc::new(ClientInner {
                stores,
                cache,
                gid,
                decision,
                questionnaire,
                content,
                injection,
                service_init,
                events,
                functions,
            }),
        })
    }
}

/// Repository lifecycle: asynchronous, idempotent creation and existence
/// checks. Creation is a single CAS per repository, so a cancelled create
/// leaves each repository either fully absent or fully created.
pub struct RepoBuilder {
    inner: Arc<ClientInner>,
}

impl RepoBuilder {
    /// Create all configured repositories if absent.
    pub async fn create(self) -> Result<(), ClientError> {
        for kind in RepoKind::ALL {
            self.inner.stores.get(kind).create_repo().await?;
        }
        Ok(())
    }

    /// Verify all configured repositories exist.
    pub async fn load(self) -> Result<(), ClientError> {
        for kind in RepoKind::ALL {
            let store = self.inner.stores.get(kind);
            if !store.repo_exists().await? {
                return Err(ClientError::RepoNotFound(store.repo().to_string()));
            }
        }
        Ok(())
    }
}

/// Read-side queries over the configured repositories.
pub struct ClientQuery {
    inner: Arc<ClientInner>,
}

impl ClientQuery {
    pub async fn head(&self, kind: RepoKind) -> Result<Option<CommitId>, ClientError> {
        self.inner.stores.get(kind).head(MAIN_BRANCH).await
    }

    pub async fn release(&self, kind: RepoKind, name: &str) -> Result<Release, ClientError> {
        self.inner.stores.get(kind).release(name).await
    }

    pub async fn releases(&self, kind: RepoKind) -> Result<Vec<Release>, ClientError> {
        self.inner.stores.get(kind).list_releases().await
    }

    /// Process definitions visible in an environment's service snapshot.
    pub fn processes(&self, envir: &Envir) -> Result<Vec<(EntityId, ProcessDef)>, ClientError> {
        let mut defs = Vec::new();
        for entity in envir.service().of_kind(EntityKind::Process) {
            defs.push((entity.id.clone(), from_entity(entity)?));
        }
        Ok(defs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::{EmptyInjection, EmptyServiceInit, LoggingEventPublisher};
    use crate::store::codec::JsonCodec;
    use crate::store::connection::SledConnection;

    const REQUIRED: [&str; 10] = [
        "connection",
        "codec",
        "repo_stencil",
        "repo_hdes",
        "repo_dialob",
        "repo_service",
        "hdes_injection",
        "hdes_service_init",
        "dialob_events",
        "dialob_functions",
    ];

    fn populate(skip: &str) -> ClientBuilder {
        let mut b = Client::builder();
        if skip != "connection" {
            b = b.connection(Arc::new(SledConnection::temporary().unwrap()));
        }
        if skip != "codec" {
            b = b.codec(Arc::new(JsonCodec));
        }
        if skip != "repo_stencil" {
            b = b.repo_stencil("stencil");
        }
        if skip != "repo_hdes" {
            b = b.repo_hdes("hdes");
        }
        if skip != "repo_dialob" {
            b = b.repo_dialob("dialob");
        }
        if skip != "repo_service" {
            b = b.repo_service("service");
        }
        if skip != "hdes_injection" {
            b = b.hdes_injection(Arc::new(EmptyInjection));
        }
        if skip != "hdes_service_init" {
            b = b.hdes_service_init(Arc::new(EmptyServiceInit));
        }
        if skip != "dialob_events" {
            b = b.dialob_events(Arc::new(LoggingEventPublisher));
        }
        if skip != "dialob_functions" {
            b = b.dialob_functions(FunctionRegistry::standard());
        }
        b
    }

    #[test]
    fn build_succeeds_with_all_required_fields() {
        populate("none").build().unwrap();
    }

    #[test]
    fn debug_output_names_the_repositories() {
        let client = populate("none").build().unwrap();
        let shown = format!("{client:?}");
        for repo in ["stencil", "hdes", "dialob", "service"] {
            assert!(shown.contains(repo), "missing {repo} in {shown}");
        }
    }

    #[test]
    fn each_missing_field_is_named() {
        for field in REQUIRED {
            let err = populate(field).build().unwrap_err();
            match err {
                ClientError::Configuration { field: named, .. } => assert_eq!(named, field),
                other => panic!("expected configuration error for {field}, got {other}"),
            }
        }
    }

    #[test]
    fn repository_names_must_be_distinct() {
        let err = populate("repo_hdes")
            .repo_hdes("stencil")
            .build()
            .unwrap_err();
        match err {
            ClientError::Configuration { field, message } => {
                assert_eq!(field, "repo_names");
                assert!(message.contains("stencil"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn repo_create_is_idempotent_and_load_verifies() {
        let client = populate("none").build().unwrap();
        // Load before create: nothing exists yet.
        let err = client.repo().load().await.unwrap_err();
        assert!(matches!(err, ClientError::RepoNotFound(_)));

        client.repo().create().await.unwrap();
        client.repo().create().await.unwrap();
        client.repo().load().await.unwrap();
    }
}
