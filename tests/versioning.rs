//! Versioning tests: environments pin commits, releases never move, and
//! concurrent writers serialize through the head CAS.

use serde_json::json;
use std::sync::Arc;

use composer_client::engines::{EmptyInjection, EmptyServiceInit, LoggingEventPublisher};
use composer_client::store::codec::JsonCodec;
use composer_client::store::connection::SledConnection;
use composer_client::{
    Changes, Client, ClientError, EntityKind, FunctionRegistry, MemoryCache, Release, RepoKind,
};

fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn client_with_cache(cache: Option<Arc<MemoryCache>>) -> Client {
    init_logs();
    let mut builder = Client::builder()
        .connection(Arc::new(SledConnection::temporary().unwrap()))
        .codec(Arc::new(JsonCodec))
        .repo_stencil("stencil")
        .repo_hdes("hdes")
        .repo_dialob("dialob")
        .repo_service("service")
        .hdes_injection(Arc::new(EmptyInjection))
        .hdes_service_init(Arc::new(EmptyServiceInit))
        .dialob_events(Arc::new(LoggingEventPublisher))
        .dialob_functions(FunctionRegistry::standard());
    if let Some(cache) = cache {
        builder = builder.cache(cache);
    }
    builder.build().unwrap()
}

fn client() -> Client {
    client_with_cache(None)
}

/// One trivial commit and release per repository, release name `v1`.
async fn release_all(client: &Client) -> Vec<Release> {
    client.repo().create().await.unwrap();
    let mut releases = Vec::new();
    for (kind, entity_kind, id) in [
        (RepoKind::Stencil, EntityKind::Site, "site-en"),
        (RepoKind::Hdes, EntityKind::Flow, "flow-1"),
        (RepoKind::Dialob, EntityKind::Form, "form-1"),
        (RepoKind::Service, EntityKind::Process, "proc-1"),
    ] {
        let store = client.store(kind);
        let commit = store
            .put(Changes::new().message("seed").upsert(
                entity_kind,
                id,
                json!({"name": "seed", "rev": 1, "locale": "en", "pages": [],
                       "steps": [], "fields": [], "flow": "f", "form": "f"}),
            ))
            .await
            .unwrap();
        releases.push(store.create_release("v1", &commit).await.unwrap());
    }
    releases
}

async fn envir_of(client: &Client, releases: &[Release]) -> composer_client::Envir {
    let mut builder = client.envir();
    for release in releases {
        builder = builder.add(release.clone());
    }
    builder.build().await.unwrap()
}

#[tokio::test]
async fn pinned_release_is_unaffected_by_later_head_advance() {
    let client = client();
    let releases = release_all(&client).await;
    let pinned = envir_of(&client, &releases).await;
    let c1 = pinned.stencil().commit.clone();

    // Head advances past the release.
    let stencil = client.store(RepoKind::Stencil);
    let c2 = stencil
        .put(Changes::new().message("update").upsert(
            EntityKind::Site,
            "site-en",
            json!({"locale": "en", "pages": [], "rev": 2}),
        ))
        .await
        .unwrap();
    assert_ne!(c1, c2);
    assert_eq!(client.query().head(RepoKind::Stencil).await.unwrap(), Some(c2));

    // Rebuilding from the same releases observes the original content.
    let rebuilt = envir_of(&client, &releases).await;
    assert_eq!(rebuilt.stencil().commit, c1);
    assert_eq!(rebuilt.stencil().entities, pinned.stencil().entities);
    assert_eq!(rebuilt.stencil().entities[0].body["rev"], json!(1));
}

#[tokio::test]
async fn environment_assembly_is_deterministic() {
    let client = client();
    let releases = release_all(&client).await;

    let a = envir_of(&client, &releases).await;
    let b = envir_of(&client, &releases).await;
    assert_eq!(a.stencil().commit, b.stencil().commit);
    assert_eq!(a.hdes().commit, b.hdes().commit);
    assert_eq!(a.dialob().commit, b.dialob().commit);
    assert_eq!(a.service().commit, b.service().commit);
    assert_eq!(a.releases(), b.releases());
}

#[tokio::test]
async fn duplicate_release_for_one_repository_is_rejected() {
    let client = client();
    let releases = release_all(&client).await;

    let mut builder = client.envir();
    for release in &releases {
        builder = builder.add(release.clone());
    }
    let err = builder.add(releases[0].clone()).build().await.unwrap_err();
    match err {
        ClientError::Configuration { field, message } => {
            assert_eq!(field, "envir.release");
            assert!(message.contains("duplicate"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn release_for_unknown_repository_is_rejected() {
    let client = client();
    let mut releases = release_all(&client).await;
    releases[0].repo = "elsewhere".to_string();

    let err = envir_err(&client, &releases).await;
    match err {
        ClientError::Configuration { field, message } => {
            assert_eq!(field, "envir.release");
            assert!(message.contains("elsewhere"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn missing_repository_release_is_rejected() {
    let client = client();
    let releases = release_all(&client).await;

    // Leave the service repository out.
    let err = envir_err(&client, &releases[..3]).await;
    match err {
        ClientError::Configuration { field, message } => {
            assert_eq!(field, "envir.release");
            assert!(message.contains("service"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn release_with_missing_commit_is_unresolvable() {
    let client = client();
    let mut releases = release_all(&client).await;
    releases[1].commit = "sha256-0000".to_string();
    releases[1].name = "ghost".to_string();

    let err = envir_err(&client, &releases).await;
    match err {
        ClientError::UnresolvedRelease { repo, name } => {
            assert_eq!(repo, "hdes");
            assert_eq!(name, "ghost");
        }
        other => panic!("unexpected error: {other}"),
    }
}

async fn envir_err(client: &Client, releases: &[Release]) -> ClientError {
    let mut builder = client.envir();
    for release in releases {
        builder = builder.add(release.clone());
    }
    builder.build().await.unwrap_err()
}

#[tokio::test]
async fn snapshot_cache_fronts_repeated_assembly() {
    let cache = Arc::new(MemoryCache::new("service"));
    let client = client_with_cache(Some(cache.clone()));
    let releases = release_all(&client).await;

    envir_of(&client, &releases).await;
    let cold = cache.stats();
    assert_eq!(cold.hits, 0);
    assert_eq!(cold.misses, 4);

    envir_of(&client, &releases).await;
    let warm = cache.stats();
    assert_eq!(warm.hits, 4);
}

#[tokio::test]
async fn concurrent_puts_serialize_through_head_cas() {
    let client = client();
    client.repo().create().await.unwrap();
    let store = client.store(RepoKind::Service);

    let mut handles = Vec::new();
    for i in 0..4 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .put(Changes::new().message(format!("writer {i}")).upsert(
                    EntityKind::Process,
                    format!("proc-{i}"),
                    json!({"name": format!("p{i}"), "flow": "f", "form": "f"}),
                ))
                .await
        }));
    }
    let mut commits = Vec::new();
    for handle in handles {
        commits.push(handle.await.unwrap().unwrap());
    }

    // Every writer landed; the head's ancestry covers all commits and the
    // final tree carries all four entities.
    let head = client
        .query()
        .head(RepoKind::Service)
        .await
        .unwrap()
        .unwrap();
    assert!(commits.contains(&head));

    let mut lineage = Vec::new();
    let mut cursor = Some(head);
    while let Some(id) = cursor {
        let commit = store.commit(&id).await.unwrap();
        lineage.push(id);
        cursor = commit.parent;
    }
    assert_eq!(lineage.len(), 4);
    for commit in &commits {
        assert!(lineage.contains(commit));
    }

    let entities = store.read(&lineage[0]).await.unwrap();
    assert_eq!(entities.len(), 4);
}
