//! End-to-end execution tests: seed assets, release, assemble an
//! environment and chain the four executors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use composer_client::engines::{EmptyInjection, EmptyServiceInit, LoggingEventPublisher};
use composer_client::store::codec::JsonCodec;
use composer_client::store::connection::SledConnection;
use composer_client::{
    Action, Actions, Changes, Client, ClientError, ContentEngine, Envir, EntityKind,
    FunctionRegistry, LocalizedSite, ProcessStep, Questionnaire, QuestionnaireStatus,
    QuestionnaireStore, RepoKind,
};

fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn client() -> Client {
    init_logs();
    Client::builder()
        .connection(Arc::new(SledConnection::temporary().unwrap()))
        .codec(Arc::new(JsonCodec))
        .repo_stencil("stencil")
        .repo_hdes("hdes")
        .repo_dialob("dialob")
        .repo_service("service")
        .hdes_injection(Arc::new(EmptyInjection))
        .hdes_service_init(Arc::new(EmptyServiceInit))
        .dialob_events(Arc::new(LoggingEventPublisher))
        .dialob_functions(FunctionRegistry::standard())
        .build()
        .unwrap()
}

/// Seed one asset per repository and pin everything into an environment.
async fn seed(client: &Client) -> Envir {
    client.repo().create().await.unwrap();

    let stencil = client.store(RepoKind::Stencil);
    let c_stencil = stencil
        .put(Changes::new().message("seed site").upsert(
            EntityKind::Site,
            "site-en",
            json!({
                "locale": "en",
                "pages": [{"path": "/", "title": "Home", "content": "hello"}]
            }),
        ))
        .await
        .unwrap();

    let hdes = client.store(RepoKind::Hdes);
    let c_hdes = hdes
        .put(Changes::new().message("seed flow").upsert(
            EntityKind::Flow,
            "flow-1",
            json!({
                "name": "eligibility",
                "steps": [
                    {
                        "id": "adult",
                        "when": [{"field": "age", "op": "gte", "value": 18}],
                        "then": {"eligible": true}
                    },
                    {
                        "id": "minor",
                        "when": [{"field": "age", "op": "lt", "value": 18}],
                        "then": {"eligible": false}
                    }
                ]
            }),
        ))
        .await
        .unwrap();

    let dialob = client.store(RepoKind::Dialob);
    let c_dialob = dialob
        .put(Changes::new().message("seed form").upsert(
            EntityKind::Form,
            "form-1",
            json!({
                "name": "intake-form",
                "fields": [
                    {"id": "age", "label": "Age", "required": true},
                    {"id": "note", "label": "Note"}
                ]
            }),
        ))
        .await
        .unwrap();

    let service = client.store(RepoKind::Service);
    let c_service = service
        .put(Changes::new().message("seed process").upsert(
            EntityKind::Process,
            "proc-1",
            json!({"name": "intake", "flow": "eligibility", "form": "intake-form"}),
        ))
        .await
        .unwrap();

    let envir = client
        .envir()
        .add(stencil.create_release("v1", &c_stencil).await.unwrap())
        .add(hdes.create_release("v1", &c_hdes).await.unwrap())
        .add(dialob.create_release("v1", &c_dialob).await.unwrap())
        .add(service.create_release("v1", &c_service).await.unwrap())
        .build()
        .await
        .unwrap();
    envir
}

/// Caller-owned store for in-flight questionnaire data.
#[derive(Default)]
struct MemoryQuestionnaires(Mutex<HashMap<String, Questionnaire>>);

impl MemoryQuestionnaires {
    fn insert(&self, q: Questionnaire) {
        self.0.lock().unwrap().insert(q.id.clone(), q);
    }
}

impl QuestionnaireStore for MemoryQuestionnaires {
    fn get(&self, questionnaire_id: &str) -> Result<Questionnaire, ClientError> {
        self.0
            .lock()
            .unwrap()
            .get(questionnaire_id)
            .cloned()
            .ok_or_else(|| ClientError::QuestionnaireNotFound(questionnaire_id.to_string()))
    }
}

fn date(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

#[tokio::test]
async fn full_execution_chain() {
    let client = client();
    let envir = seed(&client).await;
    let executor = client.executor(&envir);

    // Process: resolve definition, initial evaluation.
    let state = executor
        .process("intake")
        .target_date(date("2024-01-01T00:00:00Z"))
        .variable("age", json!(30))
        .build()
        .await
        .unwrap()
        .into_body();
    assert_eq!(state.step, ProcessStep::Created);
    assert_eq!(state.flow, "eligibility");
    assert_eq!(state.variables["eligible"], json!(true));

    // The caller opens the fill session referenced by the state.
    let sessions = Arc::new(MemoryQuestionnaires::default());
    sessions.insert(Questionnaire::open(state.questionnaire.clone(), state.form.clone()));

    // Dialob: answer and complete.
    let fill = executor
        .dialob(state)
        .store(sessions.clone())
        .actions(Actions::new(vec![
            Action::Answer {
                id: "age".to_string(),
                answer: json!(16),
            },
            Action::Complete,
        ]))
        .build()
        .await
        .unwrap()
        .into_body();
    assert_eq!(fill.questionnaire.status, QuestionnaireStatus::Completed);
    assert_eq!(fill.state.step, ProcessStep::Terminal);
    assert_eq!(fill.state.actions.len(), 2);
    sessions.insert(fill.questionnaire.clone());

    // Hdes: answers override earlier variables.
    let evaluated = executor
        .hdes(fill.state)
        .store(sessions.clone())
        .target_date(date("2024-02-01T00:00:00Z"))
        .build()
        .await
        .unwrap()
        .into_body();
    assert_eq!(evaluated.state.step, ProcessStep::Evaluated);
    assert_eq!(evaluated.flow.outputs["eligible"], json!(false));
    assert_eq!(evaluated.state.variables["eligible"], json!(false));

    // Stencil: localized content.
    let site: LocalizedSite = executor
        .stencil()
        .locale("en")
        .target_date(date("2024-02-01T00:00:00Z"))
        .build()
        .await
        .unwrap()
        .into_body();
    assert_eq!(site.locale, "en");
    assert_eq!(site.pages["/"].content, "hello");
}

#[tokio::test]
async fn repeated_flow_evaluation_is_deterministic() {
    let client = client();
    let envir = seed(&client).await;
    let executor = client.executor(&envir);

    let sessions = Arc::new(MemoryQuestionnaires::default());
    let state = executor
        .process("intake")
        .target_date(date("2024-01-01T00:00:00Z"))
        .variable("age", json!(30))
        .build()
        .await
        .unwrap()
        .into_body();
    sessions.insert(Questionnaire::open(state.questionnaire.clone(), state.form.clone()));

    let first = executor
        .hdes(state.clone())
        .store(sessions.clone())
        .target_date(date("2024-01-01T00:00:00Z"))
        .build()
        .await
        .unwrap()
        .into_body();
    let second = executor
        .hdes(state)
        .store(sessions.clone())
        .target_date(date("2024-01-01T00:00:00Z"))
        .build()
        .await
        .unwrap()
        .into_body();
    assert_eq!(first.flow, second.flow);
    assert_eq!(first.state, second.state);
}

#[tokio::test]
async fn unknown_process_name_fails() {
    let client = client();
    let envir = seed(&client).await;
    let err = client
        .executor(&envir)
        .process("bogus")
        .build()
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ProcessNotFound(name) if name == "bogus"));
}

#[tokio::test]
async fn missing_locale_without_fallback_fails() {
    let client = client();
    let envir = seed(&client).await;
    let err = client
        .executor(&envir)
        .stencil()
        .locale("fr")
        .build()
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ContentNotFound(locale) if locale == "fr"));
}

#[tokio::test]
async fn dialob_requires_a_store() {
    let client = client();
    let envir = seed(&client).await;
    let state = client
        .executor(&envir)
        .process("intake")
        .build()
        .await
        .unwrap()
        .into_body();
    let err = client
        .executor(&envir)
        .dialob(state)
        .build()
        .await
        .unwrap_err();
    assert!(
        matches!(err, ClientError::Configuration { ref field, .. } if field == "dialob.store")
    );
}

#[tokio::test]
async fn unresolvable_questionnaire_id_fails() {
    let client = client();
    let envir = seed(&client).await;
    let state = client
        .executor(&envir)
        .process("intake")
        .build()
        .await
        .unwrap()
        .into_body();

    // Empty store: the session was never opened.
    let sessions = Arc::new(MemoryQuestionnaires::default());
    let err = client
        .executor(&envir)
        .dialob(state)
        .store(sessions)
        .build()
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::QuestionnaireNotFound(_)));
}

/// Content engine that hangs, to exercise the bounded-time contract.
struct SlowContent;

#[async_trait]
impl ContentEngine for SlowContent {
    async fn render(
        &self,
        _snapshot: &composer_client::AssetSnapshot,
        _locale: &str,
        _target_date: DateTime<Utc>,
    ) -> Result<LocalizedSite, ClientError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        unreachable!("the executor must time out first")
    }
}

#[tokio::test]
async fn slow_engine_call_is_bounded() {
    let client = Client::builder()
        .connection(Arc::new(SledConnection::temporary().unwrap()))
        .codec(Arc::new(JsonCodec))
        .repo_stencil("stencil")
        .repo_hdes("hdes")
        .repo_dialob("dialob")
        .repo_service("service")
        .hdes_injection(Arc::new(EmptyInjection))
        .hdes_service_init(Arc::new(EmptyServiceInit))
        .dialob_events(Arc::new(LoggingEventPublisher))
        .dialob_functions(FunctionRegistry::standard())
        .content_engine(Arc::new(SlowContent))
        .build()
        .unwrap();
    let envir = seed(&client).await;

    let err = client
        .executor(&envir)
        .stencil()
        .locale("en")
        .timeout(Duration::from_millis(20))
        .build()
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Timeout(_)));
}

#[tokio::test]
async fn fallback_locale_applies_when_configured() {
    let client = Client::builder()
        .connection(Arc::new(SledConnection::temporary().unwrap()))
        .codec(Arc::new(JsonCodec))
        .repo_stencil("stencil")
        .repo_hdes("hdes")
        .repo_dialob("dialob")
        .repo_service("service")
        .hdes_injection(Arc::new(EmptyInjection))
        .hdes_service_init(Arc::new(EmptyServiceInit))
        .dialob_events(Arc::new(LoggingEventPublisher))
        .dialob_functions(FunctionRegistry::standard())
        .content_fallback_locale("en")
        .build()
        .unwrap();
    let envir = seed(&client).await;

    let site = client
        .executor(&envir)
        .stencil()
        .locale("fr")
        .build()
        .await
        .unwrap()
        .into_body();
    assert_eq!(site.locale, "en");
}

#[tokio::test]
async fn query_lists_processes_and_releases() {
    let client = client();
    let envir = seed(&client).await;

    let processes = client.query().processes(&envir).unwrap();
    assert_eq!(processes.len(), 1);
    assert_eq!(processes[0].0, "proc-1");
    assert_eq!(processes[0].1.name, "intake");

    let releases = client.query().releases(RepoKind::Stencil).await.unwrap();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].name, "v1");

    assert!(client.query().head(RepoKind::Hdes).await.unwrap().is_some());
}
