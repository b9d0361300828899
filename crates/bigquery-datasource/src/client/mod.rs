//! BigQuery REST client and the pooled API client wrapper
//!
//! [`BigQueryClient`] is the expensive, authenticated remote client. It is
//! built through a [`ClientFactory`] and shared by reference between the
//! query handle and the [`BigQueryApi`] stored for the same cache key.

mod api;
mod types;

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

pub use api::BigQueryApi;
pub use types::{
    DatasetEntry, DatasetList, DatasetReference, Job, JobConfiguration, JobQueryConfig,
    JobReference, JobRequest, QueryRequest, QueryResponse, QueryStatistics, Table, TableEntry,
    TableFieldSchema, TableList, TableMetadataResponse, TableReference, TableSchema,
    ValidateQueryResponse,
};

use crate::constants::BIGQUERY_ENDPOINT;
use crate::paging::collect_pages;
use crate::transport::AuthenticatedTransport;
use crate::{Error, Result};

/// Options for remote client construction
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub transport: AuthenticatedTransport,
    pub endpoint: Option<String>,
}

/// Constructs remote clients.
///
/// Each call is a full client construction; the data source counts on it
/// being called at most once per cache key.
#[async_trait]
pub trait ClientFactory: Send + Sync + std::fmt::Debug {
    async fn new_client(&self, project: &str, options: ClientOptions)
    -> Result<Arc<BigQueryClient>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClientFactory;

#[async_trait]
impl ClientFactory for DefaultClientFactory {
    async fn new_client(
        &self,
        project: &str,
        options: ClientOptions,
    ) -> Result<Arc<BigQueryClient>> {
        let client = BigQueryClient::new(project, options.endpoint.as_deref(), options.transport)?;
        #[cfg(feature = "metrics")]
        crate::observability::record_client_created();
        Ok(Arc::new(client))
    }
}

/// Authenticated BigQuery v2 client bound to a billing project
#[derive(Debug)]
pub struct BigQueryClient {
    project: String,
    endpoint: Url,
    transport: AuthenticatedTransport,
}

impl BigQueryClient {
    pub fn new(
        project: impl Into<String>,
        endpoint: Option<&str>,
        transport: AuthenticatedTransport,
    ) -> Result<Self> {
        let project = project.into();
        if project.is_empty() {
            return Err(Error::Remote(
                "a project is required to create a BigQuery client".to_string(),
            ));
        }
        Ok(Self {
            project,
            endpoint: parse_endpoint(endpoint.unwrap_or(BIGQUERY_ENDPOINT))?,
            transport,
        })
    }

    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("invalid service endpoint {}", self.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        let req = self.transport.request(reqwest::Method::GET, url).await?;
        self.transport.send_json(req).await
    }

    /// All datasets of the project, following pagination
    pub async fn list_datasets(&self) -> Result<Vec<DatasetEntry>> {
        let base = self.url(&["projects", &self.project, "datasets"])?;
        collect_pages(&base, |url| self.get_json::<DatasetList>(url)).await
    }

    /// Table ids of one dataset, following pagination
    pub async fn list_tables(&self, dataset: &str) -> Result<Vec<String>> {
        let base = self.url(&["projects", &self.project, "datasets", dataset, "tables"])?;
        let tables = collect_pages(&base, |url| self.get_json::<TableList>(url)).await?;
        Ok(tables
            .into_iter()
            .map(|t| t.table_reference.table_id)
            .collect())
    }

    pub async fn get_table(&self, dataset: &str, table: &str) -> Result<Table> {
        let url = self.url(&["projects", &self.project, "datasets", dataset, "tables", table])?;
        self.get_json(url).await
    }

    /// Run `jobs.query`; with `dry_run` set nothing is executed
    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let url = self.url(&["projects", &self.project, "queries"])?;
        let req = self
            .transport
            .request(reqwest::Method::POST, url)
            .await?
            .json(request);
        self.transport.send_json(req).await
    }

    /// Submit a query job through `jobs.insert`
    pub async fn insert_job(&self, request: &JobRequest) -> Result<JobReference> {
        let url = self.url(&["projects", &self.project, "jobs"])?;
        let req = self
            .transport
            .request(reqwest::Method::POST, url)
            .await?
            .json(request);
        let job: Job = self.transport.send_json(req).await?;
        Ok(job.job_reference)
    }

    /// Poll `jobs.getQueryResults`; the server waits up to `timeout_ms`
    pub async fn get_query_results(
        &self,
        job: &JobReference,
        timeout_ms: u64,
    ) -> Result<QueryResponse> {
        let mut url = self.url(&["projects", &self.project, "queries", &job.job_id])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("timeoutMs", &timeout_ms.to_string());
            if !job.location.is_empty() {
                query.append_pair("location", &job.location);
            }
        }
        self.get_json(url).await
    }
}

fn parse_endpoint(raw: &str) -> Result<Url> {
    let mut url =
        Url::parse(raw).map_err(|e| Error::Config(format!("invalid service endpoint {raw}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(Error::Config(format!("invalid service endpoint {raw}")));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
