//! Query handles opened over a shared [`BigQueryClient`]

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::client::{
    BigQueryClient, DatasetReference, JobConfiguration, JobQueryConfig, JobReference, JobRequest,
    QueryRequest, QueryResponse,
};
use crate::labels::headers_as_labels;
use crate::settings::{ConnectionSettings, QueryPriority};
use crate::{Error, Result};

const RESULTS_POLL_TIMEOUT_MS: u64 = 10_000;
const JOB_ID_PREFIX: &str = "bqds_";

static JOB_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Client-side job id in the `[A-Za-z0-9_-]` alphabet jobs.insert accepts,
/// unique per process and call.
fn new_job_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    let seq = JOB_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{JOB_ID_PREFIX}{nanos:x}_{:x}_{seq}", std::process::id())
}

/// Connection-level state behind one or more [`DbHandle`]s
#[derive(Debug)]
pub struct Driver {
    closed: AtomicBool,
    client: Arc<BigQueryClient>,
    settings: ConnectionSettings,
}

impl Driver {
    /// Liveness check used before a cached handle is reused
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub const fn client(&self) -> &Arc<BigQueryClient> {
        &self.client
    }
}

/// Queryable handle; clones share the same driver
#[derive(Debug, Clone)]
pub struct DbHandle {
    driver: Arc<Driver>,
}

impl DbHandle {
    #[must_use]
    pub const fn driver(&self) -> &Arc<Driver> {
        &self.driver
    }

    #[must_use]
    pub fn client(&self) -> &Arc<BigQueryClient> {
        &self.driver.client
    }

    #[must_use]
    pub fn settings(&self) -> &ConnectionSettings {
        &self.driver.settings
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.driver.is_closed()
    }

    /// Mark the driver closed; cached entries holding it get rebuilt
    pub fn close(&self) {
        self.driver.closed.store(true, Ordering::Release);
    }

    /// Run `sql` in the connection's location and default dataset.
    ///
    /// Recognised request headers become job labels.
    pub async fn query<S: BuildHasher>(
        &self,
        sql: &str,
        headers: &HashMap<String, Vec<String>, S>,
    ) -> Result<QueryResponse> {
        if self.is_closed() {
            return Err(Error::HandleOpen("connection is closed".to_string()));
        }

        let settings = &self.driver.settings;
        let client = &self.driver.client;
        let labels = headers_as_labels(headers);
        let default_dataset = (!settings.dataset.is_empty()).then(|| DatasetReference {
            project_id: settings.project.clone(),
            dataset_id: settings.dataset.clone(),
        });
        let maximum_bytes_billed = settings.max_bytes_billed.map(|b| b.to_string());

        tracing::debug!(
            project = %settings.project,
            location = %settings.location,
            priority = settings.query_priority.as_str(),
            labels = labels.len(),
            "Running query"
        );

        match settings.query_priority {
            QueryPriority::Interactive => {
                let request = QueryRequest {
                    query: sql.to_string(),
                    use_legacy_sql: false,
                    dry_run: false,
                    location: Some(settings.location.clone()).filter(|l| !l.is_empty()),
                    default_dataset,
                    labels,
                    maximum_bytes_billed,
                };
                let mut resp = client.query(&request).await?;
                if !resp.job_complete
                    && let Some(job) = resp.job_reference.take()
                {
                    resp = wait_for_results(client, &job).await?;
                }
                Ok(resp)
            }
            QueryPriority::Batch => {
                let request = JobRequest {
                    job_reference: JobReference {
                        project_id: settings.project.clone(),
                        job_id: new_job_id(),
                        location: settings.location.clone(),
                    },
                    configuration: JobConfiguration {
                        query: JobQueryConfig {
                            query: sql.to_string(),
                            use_legacy_sql: false,
                            priority: QueryPriority::Batch.as_str().to_string(),
                            default_dataset,
                            maximum_bytes_billed,
                        },
                        labels,
                    },
                };
                let job = client.insert_job(&request).await?;
                wait_for_results(client, &job).await
            }
        }
    }
}

async fn wait_for_results(client: &BigQueryClient, job: &JobReference) -> Result<QueryResponse> {
    loop {
        let resp = client.get_query_results(job, RESULTS_POLL_TIMEOUT_MS).await?;
        if resp.job_complete {
            return Ok(resp);
        }
        tracing::trace!(job_id = %job.job_id, "Query job still running");
    }
}

/// Driver and handle cached together under one key
#[derive(Debug, Clone)]
pub struct PooledHandle {
    pub driver: Arc<Driver>,
    pub db: DbHandle,
}

impl PooledHandle {
    /// Whether the cached handle can be handed out again
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.driver.is_closed()
    }
}

/// Open a handle over an existing client.
pub fn open(
    settings: &ConnectionSettings,
    client: Arc<BigQueryClient>,
) -> Result<(Arc<Driver>, DbHandle)> {
    if settings.project.is_empty() {
        return Err(Error::HandleOpen("no project configured".to_string()));
    }

    let driver = Arc::new(Driver {
        closed: AtomicBool::new(false),
        client,
        settings: settings.clone(),
    });
    let db = DbHandle {
        driver: Arc::clone(&driver),
    };
    Ok((driver, db))
}
