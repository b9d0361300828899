//! Ambient identity via the compute metadata server

use async_trait::async_trait;

use super::token::{AccessToken, TokenResponse, TokenSlot, TokenSource};
use crate::{Error, Result};

const METADATA_FLAVOR: &str = "Metadata-Flavor";
const METADATA_FLAVOR_VALUE: &str = "Google";

/// Environment variable consulted before the metadata server
pub const PROJECT_ENV: &str = "GOOGLE_CLOUD_PROJECT";

/// Resolves the default project when none is configured
#[async_trait]
pub trait ProjectResolver: Send + Sync + std::fmt::Debug {
    async fn default_project(&self, scope: &str) -> Result<String>;
}

fn metadata_url(host: &str, path: &str) -> String {
    format!("http://{host}/computeMetadata/v1/{path}")
}

async fn metadata_get(http: &reqwest::Client, url: &str) -> Result<reqwest::Response> {
    let resp = http
        .get(url)
        .header(METADATA_FLAVOR, METADATA_FLAVOR_VALUE)
        .send()
        .await
        .map_err(|e| Error::transport(&e))?;

    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(Error::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(resp)
}

/// Token source backed by the default service account of the environment
pub struct MetadataTokenSource {
    http: reqwest::Client,
    host: String,
    scopes: Vec<String>,
    slot: TokenSlot,
}

impl std::fmt::Debug for MetadataTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataTokenSource")
            .field("host", &self.host)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl MetadataTokenSource {
    #[must_use]
    pub fn new(http: reqwest::Client, host: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            http,
            host: host.into(),
            scopes,
            slot: TokenSlot::default(),
        }
    }

    fn token_url(&self) -> String {
        let base = metadata_url(&self.host, "instance/service-accounts/default/token");
        if self.scopes.is_empty() {
            return base;
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("scopes", &self.scopes.join(","))
            .finish();
        format!("{base}?{query}")
    }
}

#[async_trait]
impl TokenSource for MetadataTokenSource {
    async fn token(&self) -> Result<AccessToken> {
        if let Some(token) = self.slot.fresh() {
            return Ok(token);
        }

        let resp = metadata_get(&self.http, &self.token_url()).await?;
        let body: TokenResponse = resp.json().await.map_err(|e| Error::transport(&e))?;
        let token: AccessToken = body.into();
        self.slot.store(token.clone());
        Ok(token)
    }
}

/// Reads the project from `GOOGLE_CLOUD_PROJECT`, then the metadata server
#[derive(Debug, Clone)]
pub struct MetadataProjectResolver {
    http: reqwest::Client,
    host: String,
}

impl MetadataProjectResolver {
    #[must_use]
    pub fn new(http: reqwest::Client, host: impl Into<String>) -> Self {
        Self {
            http,
            host: host.into(),
        }
    }
}

#[async_trait]
impl ProjectResolver for MetadataProjectResolver {
    async fn default_project(&self, scope: &str) -> Result<String> {
        if let Ok(project) = std::env::var(PROJECT_ENV)
            && !project.trim().is_empty()
        {
            return Ok(project.trim().to_string());
        }

        tracing::debug!(host = %self.host, scope, "Resolving default project from metadata server");

        let url = metadata_url(&self.host, "project/project-id");
        let resp = metadata_get(&self.http, &url).await?;
        let project = resp.text().await.map_err(|e| Error::transport(&e))?;
        let project = project.trim();

        if project.is_empty() {
            return Err(Error::Config(
                "metadata server returned an empty project id".to_string(),
            ));
        }
        Ok(project.to_string())
    }
}
