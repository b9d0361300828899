//! Metadata requests served from the cached API clients

use std::collections::HashMap;
use std::hash::BuildHasher;

use serde::{Deserialize, Serialize};

use crate::client::{TableMetadataResponse, ValidateQueryResponse};
use crate::datasource::Datasource;
use crate::error::ResultExt;
use crate::resource_manager::Project;
use crate::settings::InstanceSettings;
use crate::{Error, Result};

const API_CLIENT_CONTEXT: &str = "Failed to retrieve BigQuery API client";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatasetsArgs {
    pub project: String,
    pub location: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableSchemaArgs {
    pub project: String,
    pub location: String,
    pub dataset: String,
    pub table: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidateQueryArgs {
    pub project: String,
    pub location: String,
    pub query: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectsArgs {
    pub datasource_id: String,
}

fn option<'a, S: BuildHasher>(options: &'a HashMap<String, String, S>, name: &str) -> &'a str {
    options.get(name).map_or("", String::as_str)
}

/// Accepts the spellings Go's `strconv.ParseBool` does
fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

impl Datasource {
    pub async fn datasets(
        &self,
        instance: &InstanceSettings,
        args: &DatasetsArgs,
    ) -> Result<Vec<String>> {
        let api = self
            .get_api_client(instance, &args.project, &args.location)
            .await
            .context(API_CLIENT_CONTEXT)?;
        api.list_datasets().await
    }

    /// Tables of `dataset`; `project`, `dataset` and `location` are required
    pub async fn tables<S: BuildHasher>(
        &self,
        instance: &InstanceSettings,
        options: &HashMap<String, String, S>,
    ) -> Result<Vec<String>> {
        let project = option(options, "project");
        let dataset = option(options, "dataset");
        let location = option(options, "location");
        if project.is_empty() || dataset.is_empty() || location.is_empty() {
            return Err(Error::InvalidArgument(
                "project, dataset and location must be specified".to_string(),
            ));
        }

        let api = self
            .get_api_client(instance, project, location)
            .await
            .context(API_CLIENT_CONTEXT)?;
        api.list_tables(dataset).await
    }

    /// Columns of a table, optionally only the orderable ones
    pub async fn columns<S: BuildHasher>(
        &self,
        instance: &InstanceSettings,
        options: &HashMap<String, String, S>,
    ) -> Result<Vec<String>> {
        let project = option(options, "project");
        let dataset = option(options, "dataset");
        let table = option(options, "table");
        let location = option(options, "location");
        if project.is_empty() || dataset.is_empty() || table.is_empty() || location.is_empty() {
            return Err(Error::InvalidArgument("missing required arguments".to_string()));
        }

        let is_orderable = parse_bool(option(options, "isOrderable")).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Failed to parse isOrderable: {:?}",
                option(options, "isOrderable")
            ))
        })?;

        let api = self
            .get_api_client(instance, project, location)
            .await
            .context(API_CLIENT_CONTEXT)?;
        api.list_columns(dataset, table, is_orderable).await
    }

    pub async fn table_schema(
        &self,
        instance: &InstanceSettings,
        args: &TableSchemaArgs,
    ) -> Result<TableMetadataResponse> {
        let api = self
            .get_api_client(instance, &args.project, &args.location)
            .await
            .context(API_CLIENT_CONTEXT)?;
        api.get_table_schema(&args.dataset, &args.table).await
    }

    /// Dry-run a query. Invalid SQL is reported in the response.
    pub async fn validate_query(
        &self,
        instance: &InstanceSettings,
        args: &ValidateQueryArgs,
    ) -> Result<ValidateQueryResponse> {
        let api = self
            .get_api_client(instance, &args.project, &args.location)
            .await
            .context(API_CLIENT_CONTEXT)?;
        Ok(api.validate_query(&args.query).await)
    }

    /// Projects visible to the data source with identity `datasource_id`.
    ///
    /// Served by the resource manager registered on that identity's first
    /// connect.
    pub async fn projects(&self, args: &ProjectsArgs) -> Result<Vec<Project>> {
        let service = self.resource_managers().get(&args.datasource_id).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "no resource manager registered for datasource {}",
                args.datasource_id
            ))
        })?;
        service.search_projects().await
    }
}
