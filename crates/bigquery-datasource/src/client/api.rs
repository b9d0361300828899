use std::sync::Arc;

use arc_swap::ArcSwap;

use super::types::{
    DatasetEntry, QueryRequest, QueryStatistics, TableFieldSchema, TableMetadataResponse, ValidateQueryResponse,
};
use super::BigQueryClient;
use crate::{Error, Result};

/// Metadata API over a shared [`BigQueryClient`].
///
/// The processing location can be updated in place; it is read on every
/// call so concurrent readers always see a whole value.
#[derive(Debug)]
pub struct BigQueryApi {
    client: Arc<BigQueryClient>,
    location: ArcSwap<String>,
}

impl BigQueryApi {
    #[must_use]
    pub fn new(client: Arc<BigQueryClient>, location: impl Into<String>) -> Self {
        Self {
            client,
            location: ArcSwap::from_pointee(location.into()),
        }
    }

    #[must_use]
    pub const fn client(&self) -> &Arc<BigQueryClient> {
        &self.client
    }

    #[must_use]
    pub fn location(&self) -> String {
        self.location.load().as_ref().clone()
    }

    pub fn set_location(&self, location: impl Into<String>) {
        self.location.store(Arc::new(location.into()));
    }

    /// Dataset ids in the project that live in the current location
    pub async fn list_datasets(&self) -> Result<Vec<String>> {
        let datasets = self.client.list_datasets().await?;
        Ok(in_location(datasets, &self.location()))
    }

    pub async fn list_tables(&self, dataset: &str) -> Result<Vec<String>> {
        self.client.list_tables(dataset).await
    }

    /// Column names of a table; `is_orderable` drops columns that cannot be
    /// sorted on
    pub async fn list_columns(
        &self,
        dataset: &str,
        table: &str,
        is_orderable: bool,
    ) -> Result<Vec<String>> {
        let fields = self.table_fields(dataset, table).await?;
        Ok(fields
            .into_iter()
            .filter(|f| !is_orderable || f.is_orderable())
            .map(|f| f.name)
            .collect())
    }

    pub async fn get_table_schema(&self, dataset: &str, table: &str) -> Result<TableMetadataResponse> {
        Ok(TableMetadataResponse {
            schema: self.table_fields(dataset, table).await?,
        })
    }

    async fn table_fields(&self, dataset: &str, table: &str) -> Result<Vec<TableFieldSchema>> {
        let table = self.client.get_table(dataset, table).await?;
        Ok(table.schema.map(|s| s.fields).unwrap_or_default())
    }

    /// Dry-run `sql`; invalid SQL comes back as an unsuccessful response
    pub async fn validate_query(&self, sql: &str) -> ValidateQueryResponse {
        let request = QueryRequest {
            query: sql.to_string(),
            dry_run: true,
            location: Some(self.location()).filter(|l| !l.is_empty()),
            ..Default::default()
        };

        match self.client.query(&request).await {
            Ok(resp) => ValidateQueryResponse {
                query: sql.to_string(),
                is_valid: true,
                is_error: false,
                error: String::new(),
                statistics: Some(QueryStatistics {
                    total_bytes_processed: resp
                        .total_bytes_processed
                        .and_then(|b| b.parse().ok())
                        .unwrap_or_default(),
                }),
            },
            Err(e) => {
                tracing::debug!(error = %e, "Query validation failed");
                ValidateQueryResponse {
                    query: sql.to_string(),
                    is_valid: false,
                    is_error: true,
                    error: validation_message(&e),
                    statistics: None,
                }
            }
        }
    }
}

/// Ids of the datasets stored in `location`, compared case-insensitively.
/// An empty location keeps everything.
fn in_location(datasets: Vec<DatasetEntry>, location: &str) -> Vec<String> {
    datasets
        .into_iter()
        .filter(|d| location.is_empty() || d.location.eq_ignore_ascii_case(location))
        .map(|d| d.dataset_reference.dataset_id)
        .collect()
}

fn validation_message(err: &Error) -> String {
    match err {
        Error::Api { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
