//! Branched, content-addressed document store
//!
//! A repository is a sequence of commits; a head is a movable pointer to the
//! latest commit of a branch, advanced only through an atomic
//! compare-and-set. Entities are immutable once written and addressed by
//! generated id plus content hash. Reads always pin to an explicit commit,
//! never the mutable head, so a reader observes a consistent snapshot even
//! while heads advance concurrently.
//!
//! ## Key layout (per repository namespace)
//!
//! ```text
//! repo                      -> repository metadata
//! heads/<branch>            -> commit id
//! commits/<commit-id>       -> commit record (full entity-ref set)
//! entities/<id>/<hash>      -> entity record (append-only)
//! releases/<name>           -> release record (immutable pointer)
//! ```

pub mod codec;
pub mod connection;
pub mod provider;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{ClientError, CommitId};
use codec::EntityCodec;
use connection::Connection;
use provider::{AuthorProvider, GidProvider};

/// Entity identifier, assigned by the gid provider before persistence.
pub type EntityId = String;

/// Default branch name.
pub const MAIN_BRANCH: &str = "main";

/// Bounded optimistic-concurrency retry for `put`.
pub const MAX_HEAD_RETRIES: usize = 5;

/// Compute the content hash of serialized bytes.
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256-{}", hex::encode(hasher.finalize()))
}

/// Body type of a stored entity, one per asset shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    /// Decision-engine flow definition (hdes repository)
    Flow,
    /// Questionnaire form definition (dialob repository)
    Form,
    /// Localized content document (stencil repository)
    Site,
    /// Process definition (service repository)
    Process,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Flow => "flow",
            EntityKind::Form => "form",
            EntityKind::Site => "site",
            EntityKind::Process => "process",
        };
        f.write_str(name)
    }
}

/// Immutable stored entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub body_type: EntityKind,
    pub body: serde_json::Value,
    /// Content hash of the serialized body, used for dedup and integrity.
    pub hash: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

/// Reference from a commit to one entity version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: EntityId,
    pub hash: String,
}

/// Append-only commit record carrying the full entity-ref set of its tree.
///
/// The id is a content hash over parent, message and the sorted ref set;
/// author and timestamp are provenance only and excluded from identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub id: CommitId,
    pub parent: Option<CommitId>,
    pub message: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub entities: Vec<EntityRef>,
}

/// Immutable named pointer to a fixed commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub repo: String,
    pub name: String,
    pub commit: CommitId,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RepoMeta {
    name: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Upsert {
    kind: EntityKind,
    id: Option<EntityId>,
    body: serde_json::Value,
}

/// Batch of entity changes applied on top of the current head.
#[derive(Debug, Default)]
pub struct Changes {
    message: String,
    upserts: Vec<Upsert>,
    deletes: Vec<EntityId>,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add a new entity; the store assigns its id.
    pub fn create(mut self, kind: EntityKind, body: serde_json::Value) -> Self {
        self.upserts.push(Upsert {
            kind,
            id: None,
            body,
        });
        self
    }

    /// Add or replace an entity under a caller-chosen id.
    pub fn upsert(mut self, kind: EntityKind, id: impl Into<String>, body: serde_json::Value) -> Self {
        self.upserts.push(Upsert {
            kind,
            id: Some(id.into()),
            body,
        });
        self
    }

    pub fn delete(mut self, id: impl Into<String>) -> Self {
        self.deletes.push(id.into());
        self
    }
}

/// One logical store over one repository namespace.
///
/// All stores of a client share the same physical [`Connection`], gid
/// generator and author provider; each carries its own codec.
pub struct DocumentStore {
    repo: String,
    conn: Arc<dyn Connection>,
    codec: Arc<dyn EntityCodec>,
    gid: Arc<dyn GidProvider>,
    author: Arc<dyn AuthorProvider>,
}

impl DocumentStore {
    pub fn new(
        repo: impl Into<String>,
        conn: Arc<dyn Connection>,
        codec: Arc<dyn EntityCodec>,
        gid: Arc<dyn GidProvider>,
        author: Arc<dyn AuthorProvider>,
    ) -> Self {
        Self {
            repo: repo.into(),
            conn,
            codec,
            gid,
            author,
        }
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Create the repository if absent. Idempotent: a lost creation race is
    /// not an error, and the single CAS leaves the repository either fully
    /// absent or fully created.
    pub async fn create_repo(&self) -> Result<bool, ClientError> {
        let meta = RepoMeta {
            name: self.repo.clone(),
            created_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&meta)?;
        let created = self.conn.cas(&self.repo, "repo", None, bytes).await?;
        if created {
            info!(repo = %self.repo, "Created repository");
        } else {
            debug!(repo = %self.repo, "Repository already exists");
        }
        Ok(created)
    }

    pub async fn repo_exists(&self) -> Result<bool, ClientError> {
        Ok(self.conn.get(&self.repo, "repo").await?.is_some())
    }

    /// Current head of a branch, `None` before the first commit.
    pub async fn head(&self, branch: &str) -> Result<Option<CommitId>, ClientError> {
        let key = format!("heads/{}", branch);
        match self.conn.get(&self.repo, &key).await? {
            Some(bytes) => Ok(Some(String::from_utf8(bytes).map_err(|e| {
                ClientError::Deserialization(format!("head pointer: {}", e))
            })?)),
            None => Ok(None),
        }
    }

    /// Commit a batch of changes on the main branch.
    pub async fn put(&self, changes: Changes) -> Result<CommitId, ClientError> {
        self.put_on(MAIN_BRANCH, changes).await
    }

    /// Commit a batch of changes on top of the given branch's head.
    ///
    /// Entity records are written first (append-only, content-keyed, so
    /// rewrites are idempotent), then the head is advanced with a bounded
    /// CAS retry loop.
    pub async fn put_on(&self, branch: &str, changes: Changes) -> Result<CommitId, ClientError> {
        if !self.repo_exists().await? {
            return Err(ClientError::RepoNotFound(self.repo.clone()));
        }

        // Materialize upserts once so ids and hashes are stable across retries.
        let author = self.author.author();
        let now = Utc::now();
        let mut upserted: Vec<Entity> = Vec::with_capacity(changes.upserts.len());
        for up in &changes.upserts {
            let id = up
                .id
                .clone()
                .unwrap_or_else(|| self.gid.next(&up.kind.to_string()));
            let body_bytes = serde_json::to_vec(&up.body)
                .map_err(|e| ClientError::Serialization(e.to_string()))?;
            upserted.push(Entity {
                id,
                body_type: up.kind,
                body: up.body.clone(),
                hash: compute_hash(&body_bytes),
                author: author.clone(),
                created_at: now,
            });
        }
        for entity in &upserted {
            let key = format!("entities/{}/{}", entity.id, entity.hash);
            let bytes = self.codec.serialize(entity)?;
            self.conn.put(&self.repo, &key, bytes).await?;
        }

        for attempt in 0..MAX_HEAD_RETRIES {
            let head = self.head(branch).await?;
            let mut refs: Vec<EntityRef> = match &head {
                Some(commit) => self.commit(commit).await?.entities,
                None => Vec::new(),
            };
            refs.retain(|r| !changes.deletes.contains(&r.id));
            for entity in &upserted {
                match refs.iter_mut().find(|r| r.id == entity.id) {
                    Some(existing) => existing.hash = entity.hash.clone(),
                    None => refs.push(EntityRef {
                        id: entity.id.clone(),
                        hash: entity.hash.clone(),
                    }),
                }
            }
            refs.sort_by(|a, b| a.id.cmp(&b.id));

            let commit = Commit {
                id: commit_identity(head.as_deref(), &changes.message, &refs)?,
                parent: head.clone(),
                message: changes.message.clone(),
                author: author.clone(),
                created_at: now,
                entities: refs,
            };
            let key = format!("commits/{}", commit.id);
            self.conn
                .put(&self.repo, &key, serde_json::to_vec(&commit)?)
                .await?;

            match self.advance_head(branch, head.as_deref(), &commit.id).await {
                Ok(()) => {
                    info!(
                        repo = %self.repo,
                        branch = %branch,
                        commit = %commit.id,
                        entities = commit.entities.len(),
                        "Committed"
                    );
                    return Ok(commit.id);
                }
                Err(ClientError::ConcurrentModification { .. }) if attempt + 1 < MAX_HEAD_RETRIES => {
                    debug!(repo = %self.repo, branch = %branch, attempt, "Head moved, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(ClientError::ConcurrentModification {
            repo: self.repo.clone(),
            branch: branch.to_string(),
        })
    }

    /// Atomic head advance. Succeeds only if the branch's current head
    /// equals `expected` (`None` = branch not yet created); otherwise fails
    /// with `ConcurrentModification` and the caller must re-read and retry.
    pub async fn advance_head(
        &self,
        branch: &str,
        expected: Option<&str>,
        new: &CommitId,
    ) -> Result<(), ClientError> {
        let key = format!("heads/{}", branch);
        let swapped = self
            .conn
            .cas(
                &self.repo,
                &key,
                expected.map(|c| c.as_bytes().to_vec()),
                new.as_bytes().to_vec(),
            )
            .await?;
        if swapped {
            Ok(())
        } else {
            Err(ClientError::ConcurrentModification {
                repo: self.repo.clone(),
                branch: branch.to_string(),
            })
        }
    }

    /// Fetch a commit record.
    pub async fn commit(&self, commit: &str) -> Result<Commit, ClientError> {
        let key = format!("commits/{}", commit);
        let bytes = self
            .conn
            .get(&self.repo, &key)
            .await?
            .ok_or_else(|| ClientError::CommitNotFound {
                repo: self.repo.clone(),
                commit: commit.to_string(),
            })?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Deserialization(e.to_string()))
    }

    /// The full entity set at a specific commit. Integrity-checked against
    /// the recorded content hashes.
    pub async fn read(&self, commit: &str) -> Result<Vec<Entity>, ClientError> {
        let record = self.commit(commit).await?;
        let mut entities = Vec::with_capacity(record.entities.len());
        for entity_ref in &record.entities {
            let key = format!("entities/{}/{}", entity_ref.id, entity_ref.hash);
            let bytes = self.conn.get(&self.repo, &key).await?.ok_or_else(|| {
                ClientError::Deserialization(format!(
                    "missing entity {} at {}",
                    entity_ref.id, entity_ref.hash
                ))
            })?;
            let entity = self.codec.deserialize(&bytes)?;
            if entity.hash != entity_ref.hash {
                return Err(ClientError::Deserialization(format!(
                    "hash mismatch for entity {}: expected {}, got {}",
                    entity_ref.id, entity_ref.hash, entity.hash
                )));
            }
            entities.push(entity);
        }
        Ok(entities)
    }

    /// Publish an immutable release pinning the given commit. Re-publishing
    /// the same name to the same commit is idempotent; to a different commit
    /// it fails.
    pub async fn create_release(
        &self,
        name: &str,
        commit: &CommitId,
    ) -> Result<Release, ClientError> {
        // The pinned commit must exist before the pointer does.
        self.commit(commit).await?;

        let release = Release {
            repo: self.repo.clone(),
            name: name.to_string(),
            commit: commit.clone(),
            author: self.author.author(),
            created_at: Utc::now(),
        };
        let key = format!("releases/{}", name);
        let created = self
            .conn
            .cas(&self.repo, &key, None, serde_json::to_vec(&release)?)
            .await?;
        if created {
            info!(repo = %self.repo, release = %name, commit = %commit, "Published release");
            return Ok(release);
        }
        let existing = self.release(name).await?;
        if &existing.commit == commit {
            return Ok(existing);
        }
        Err(ClientError::ReleaseExists {
            repo: self.repo.clone(),
            name: name.to_string(),
        })
    }

    /// Resolve a release by name.
    pub async fn release(&self, name: &str) -> Result<Release, ClientError> {
        let key = format!("releases/{}", name);
        let bytes = self
            .conn
            .get(&self.repo, &key)
            .await?
            .ok_or_else(|| ClientError::UnresolvedRelease {
                repo: self.repo.clone(),
                name: name.to_string(),
            })?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Deserialization(e.to_string()))
    }

    pub async fn list_releases(&self) -> Result<Vec<Release>, ClientError> {
        let mut releases = Vec::new();
        for (_, bytes) in self.conn.scan(&self.repo, "releases/").await? {
            let release: Release = serde_json::from_slice(&bytes)
                .map_err(|e| ClientError::Deserialization(e.to_string()))?;
            releases.push(release);
        }
        Ok(releases)
    }
}

/// The encoding is unambiguous (JSON strings are delimited and escaped), so
/// free-text messages can never mimic the ref set of a different tree.
fn commit_identity(
    parent: Option<&str>,
    message: &str,
    refs: &[EntityRef],
) -> Result<CommitId, ClientError> {
    let canonical = serde_json::to_vec(&(parent, message, refs))?;
    Ok(compute_hash(&canonical))
}
