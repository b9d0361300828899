//! BigQuery REST payloads and the responses handed to callers

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::paging::Page;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatasetReference {
    pub project_id: String,
    pub dataset_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableReference {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatasetEntry {
    pub dataset_reference: DatasetReference,
    pub location: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatasetList {
    pub datasets: Vec<DatasetEntry>,
    pub next_page_token: Option<String>,
}

impl Page for DatasetList {
    type Item = DatasetEntry;

    fn into_parts(self) -> (Vec<DatasetEntry>, Option<String>) {
        (self.datasets, self.next_page_token)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableEntry {
    pub table_reference: TableReference,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableList {
    pub tables: Vec<TableEntry>,
    pub next_page_token: Option<String>,
}

impl Page for TableList {
    type Item = TableEntry;

    fn into_parts(self) -> (Vec<TableEntry>, Option<String>) {
        (self.tables, self.next_page_token)
    }
}

/// One column of a table schema; nested for RECORD columns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableFieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<TableFieldSchema>,
}

impl TableFieldSchema {
    #[must_use]
    pub fn is_repeated(&self) -> bool {
        self.mode
            .as_deref()
            .is_some_and(|mode| mode.eq_ignore_ascii_case("REPEATED"))
    }

    /// Whether the column can appear in ORDER BY
    #[must_use]
    pub fn is_orderable(&self) -> bool {
        if self.is_repeated() {
            return false;
        }
        !matches!(
            self.field_type.to_ascii_uppercase().as_str(),
            "RECORD" | "STRUCT" | "GEOGRAPHY" | "JSON"
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableSchema {
    pub fields: Vec<TableFieldSchema>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Table {
    pub table_reference: TableReference,
    pub schema: Option<TableSchema>,
    pub location: String,
    #[serde(rename = "type")]
    pub table_type: String,
}

/// Table schema as returned to callers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetadataResponse {
    pub schema: Vec<TableFieldSchema>,
}

/// Body of `jobs.query`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    pub use_legacy_sql: bool,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_dataset: Option<DatasetReference>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    /// int64 encoded as a string, as the API expects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_bytes_billed: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobReference {
    pub project_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub job_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub location: String,
}

/// Query section of a job configuration
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobQueryConfig {
    pub query: String,
    pub use_legacy_sql: bool,
    pub priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_dataset: Option<DatasetReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_bytes_billed: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfiguration {
    pub query: JobQueryConfig,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

/// Body of `jobs.insert` for a query job
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub job_reference: JobReference,
    pub configuration: JobConfiguration,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Job {
    pub job_reference: JobReference,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_reference: Option<JobReference>,
    pub schema: Option<TableSchema>,
    pub rows: Vec<serde_json::Value>,
    pub total_rows: Option<String>,
    pub total_bytes_processed: Option<String>,
    pub job_complete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStatistics {
    pub total_bytes_processed: i64,
}

/// Outcome of a dry-run validation.
///
/// Invalid SQL is reported here, not as an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateQueryResponse {
    pub query: String,
    pub is_valid: bool,
    pub is_error: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<QueryStatistics>,
}
