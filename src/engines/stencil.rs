//! Reference content engine: locale selection over stored site documents.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::assets::{from_entity, SiteDef};
use crate::envir::AssetSnapshot;
use crate::error::ClientError;
use crate::store::EntityKind;

use super::ContentEngine;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizedPage {
    pub path: String,
    pub title: String,
    pub content: String,
}

/// Localized content resolved for one locale as of a target date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizedSite {
    pub locale: String,
    /// Pages keyed by path.
    pub pages: BTreeMap<String, LocalizedPage>,
}

/// Data-driven content engine over stored [`SiteDef`] assets.
///
/// Without a configured fallback locale, a missing locale is an error, not
/// an empty document.
pub struct SiteEngine {
    fallback: Option<String>,
}

impl SiteEngine {
    pub fn new() -> Self {
        Self { fallback: None }
    }

    pub fn with_fallback(locale: impl Into<String>) -> Self {
        Self {
            fallback: Some(locale.into()),
        }
    }
}

impl Default for SiteEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentEngine for SiteEngine {
    async fn render(
        &self,
        snapshot: &AssetSnapshot,
        locale: &str,
        target_date: DateTime<Utc>,
    ) -> Result<LocalizedSite, ClientError> {
        let mut sites: Vec<SiteDef> = Vec::new();
        for entity in snapshot.of_kind(EntityKind::Site) {
            sites.push(from_entity(entity)?);
        }

        let pick = |wanted: &str| sites.iter().find(|s| s.locale == wanted);
        let site = match pick(locale) {
            Some(site) => site,
            None => match &self.fallback {
                Some(fallback) => pick(fallback)
                    .ok_or_else(|| ClientError::ContentNotFound(locale.to_string()))?,
                None => return Err(ClientError::ContentNotFound(locale.to_string())),
            },
        };

        let mut pages = BTreeMap::new();
        for page in &site.pages {
            // Pages scheduled after the target date are invisible.
            if let Some(starts_at) = page.starts_at {
                if starts_at > target_date {
                    continue;
                }
            }
            pages.insert(
                page.path.clone(),
                LocalizedPage {
                    path: page.path.clone(),
                    title: page.title.clone(),
                    content: page.content.clone(),
                },
            );
        }

        debug!(locale = %site.locale, pages = pages.len(), "Rendered localized site");
        Ok(LocalizedSite {
            locale: site.locale.clone(),
            pages,
        })
    }
}
