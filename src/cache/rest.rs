//! Paginated resource fetching over REST
//!
//! Each collection lives at `GET /{resource}?page=&pageSize=`, authorized
//! with the bearer session token. The trait is the seam tests and
//! alternative transports inject through.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::resource::{Page, Resource};
use crate::credentials::CredentialStore;
use crate::error::FetchError;

/// Backend endpoint family serving paginated collections.
#[async_trait]
pub trait ResourceBackend: Send + Sync {
    async fn fetch_page(
        &self,
        resource: Resource,
        page: u32,
        page_size: usize,
    ) -> Result<Page, FetchError>;
}

/// reqwest-backed implementation against the REST API.
pub struct HttpResourceBackend {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn CredentialStore>,
}

impl HttpResourceBackend {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            base_url: base_url.into(),
            store,
        }
    }
}

#[async_trait]
impl ResourceBackend for HttpResourceBackend {
    async fn fetch_page(
        &self,
        resource: Resource,
        page: u32,
        page_size: usize,
    ) -> Result<Page, FetchError> {
        let token = self
            .store
            .read()
            .map_err(|e| FetchError(e.to_string()))?
            .filter(|set| set.is_complete())
            .map(|set| set.session_token)
            .ok_or_else(|| FetchError("not authenticated".into()))?;

        let url = format!(
            "{}/{}?page={}&pageSize={}",
            self.base_url.trim_end_matches('/'),
            resource.path(),
            page,
            page_size
        );
        debug!(url = %url, "fetching resource page");

        let response = self.http.get(&url).bearer_auth(token).send().await?;
        if !response.status().is_success() {
            return Err(FetchError(format!(
                "{} returned {}",
                resource,
                response.status()
            )));
        }

        Ok(response.json::<Page>().await?)
    }
}
