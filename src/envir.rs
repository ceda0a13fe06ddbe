//! Environment snapshots
//!
//! An environment pins one commit per engine repository by resolving a set
//! of releases. It is immutable and safely shared across concurrent
//! executions: all executions against one environment observe the same
//! asset versions regardless of concurrent head advancement.

use std::sync::Arc;
use tracing::{debug, info};

use crate::client::{ClientInner, RepoKind};
use crate::error::{ClientError, CommitId};
use crate::store::{Entity, EntityKind, Release};

/// The resolved entity set of one repository at one commit.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetSnapshot {
    pub repo: String,
    pub commit: CommitId,
    pub entities: Vec<Entity>,
}

impl AssetSnapshot {
    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(move |e| e.body_type == kind)
    }
}

/// Immutable aggregate of resolved releases, one per engine repository.
#[derive(Debug, Clone)]
pub struct Envir {
    releases: Arc<Vec<Release>>,
    stencil: Arc<AssetSnapshot>,
    hdes: Arc<AssetSnapshot>,
    dialob: Arc<AssetSnapshot>,
    service: Arc<AssetSnapshot>,
}

impl Envir {
    pub fn releases(&self) -> &[Release] {
        &self.releases
    }

    pub fn stencil(&self) -> &AssetSnapshot {
        &self.stencil
    }

    pub fn hdes(&self) -> &AssetSnapshot {
        &self.hdes
    }

    pub fn dialob(&self) -> &AssetSnapshot {
        &self.dialob
    }

    pub fn service(&self) -> &AssetSnapshot {
        &self.service
    }
}

/// Accumulates release references and resolves them into an [`Envir`].
///
/// Exactly one release per repository: adding a second release for the same
/// repository is a caller error surfaced at `build()`. Building never
/// mutates shared state; a different release set always yields a new
/// `Envir` instance.
pub struct EnvirBuilder {
    inner: Arc<ClientInner>,
    releases: Vec<Release>,
}

impl EnvirBuilder {
    pub(crate) fn new(inner: Arc<ClientInner>) -> Self {
        Self {
            inner,
            releases: Vec::new(),
        }
    }

    pub fn add(mut self, release: Release) -> Self {
        self.releases.push(release);
        self
    }

    pub async fn build(mut self) -> Result<Envir, ClientError> {
        let releases = std::mem::take(&mut self.releases);
        let mut slots: [Option<Release>; 4] = [None, None, None, None];
        for release in releases {
            let kind = self.inner.stores.kind_of(&release.repo).ok_or_else(|| {
                ClientError::config(
                    "envir.release",
                    &format!("unknown repository: {}", release.repo),
                )
            })?;
            let slot = &mut slots[kind as usize];
            if slot.is_some() {
                return Err(ClientError::config(
                    "envir.release",
                    &format!("duplicate release for repository: {}", release.repo),
                ));
            }
            *slot = Some(release);
        }

        let (stencil_rel, stencil) = self.resolve_slot(RepoKind::Stencil, &mut slots).await?;
        let (hdes_rel, hdes) = self.resolve_slot(RepoKind::Hdes, &mut slots).await?;
        let (dialob_rel, dialob) = self.resolve_slot(RepoKind::Dialob, &mut slots).await?;
        let (service_rel, service) = self.resolve_slot(RepoKind::Service, &mut slots).await?;

        info!(
            stencil = %stencil.commit,
            hdes = %hdes.commit,
            dialob = %dialob.commit,
            service = %service.commit,
            "Assembled environment"
        );
        Ok(Envir {
            releases: Arc::new(vec![stencil_rel, hdes_rel, dialob_rel, service_rel]),
            stencil,
            hdes,
            dialob,
            service,
        })
    }

    async fn resolve_slot(
        &self,
        kind: RepoKind,
        slots: &mut [Option<Release>; 4],
    ) -> Result<(Release, Arc<AssetSnapshot>), ClientError> {
        let release = slots[kind as usize].take().ok_or_else(|| {
            ClientError::config(
                "envir.release",
                &format!(
                    "missing release for repository: {}",
                    self.inner.stores.get(kind).repo()
                ),
            )
        })?;
        let snapshot = Arc::new(self.resolve(kind, &release).await?);
        Ok((release, snapshot))
    }

    /// Resolve one release's pinned commit by direct lookup, fronted by the
    /// advisory cache. The cache never substitutes for a failed resolution.
    async fn resolve(
        &self,
        kind: RepoKind,
        release: &Release,
    ) -> Result<AssetSnapshot, ClientError> {
        let store = self.inner.stores.get(kind);
        let key = format!("snapshot:{}:{}", release.repo, release.commit);

        if let Some(cached) = self.inner.cache.get(&key) {
            if let Ok(entities) = serde_json::from_value::<Vec<Entity>>(cached) {
                debug!(repo = %release.repo, commit = %release.commit, "Snapshot cache hit");
                return Ok(AssetSnapshot {
                    repo: release.repo.clone(),
                    commit: release.commit.clone(),
                    entities,
                });
            }
            // Undecodable cache entries are advisory; fall through.
        }

        let entities = match store.read(&release.commit).await {
            Ok(entities) => entities,
            Err(ClientError::CommitNotFound { .. }) => {
                return Err(ClientError::UnresolvedRelease {
                    repo: release.repo.clone(),
                    name: release.name.clone(),
                })
            }
            Err(e) => return Err(e),
        };
        if let Ok(value) = serde_json::to_value(&entities) {
            self.inner.cache.put(&key, value, None);
        }
        Ok(AssetSnapshot {
            repo: release.repo.clone(),
            commit: release.commit.clone(),
            entities,
        })
    }
}
