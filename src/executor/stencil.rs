//! Stencil executor: resolves localized content from the pinned snapshot.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::client::ClientInner;
use crate::engines::stencil::LocalizedSite;
use crate::envir::Envir;
use crate::error::ClientError;
use crate::process::Execution;

use super::bounded;

pub struct StencilExecutor {
    inner: Arc<ClientInner>,
    envir: Envir,
    locale: Option<String>,
    target_date: Option<DateTime<Utc>>,
    timeout: Option<Duration>,
}

impl StencilExecutor {
    pub(crate) fn new(inner: Arc<ClientInner>, envir: Envir) -> Self {
        Self {
            inner,
            envir,
            locale: None,
            target_date: None,
            timeout: None,
        }
    }

    /// Requested locale. Required.
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Content as of this date; defaults to now.
    pub fn target_date(mut self, date: DateTime<Utc>) -> Self {
        self.target_date = Some(date);
        self
    }

    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub async fn build(self) -> Result<Execution<LocalizedSite>, ClientError> {
        let Self {
            inner,
            envir,
            locale,
            target_date,
            timeout,
        } = self;
        let locale = locale
            .ok_or_else(|| ClientError::config("stencil.locale", "locale must be defined"))?;
        bounded(timeout, async move {
            let date = target_date.unwrap_or_else(Utc::now);
            let site = inner.content.render(envir.stencil(), &locale, date).await?;
            Ok(Execution::new(site))
        })
        .await
    }
}
