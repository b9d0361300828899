//! Constants for the BigQuery data source

/// Processing location used when the instance does not configure one
pub const DEFAULT_PROCESSING_LOCATION: &str = "US";

/// Default BigQuery REST endpoint
pub const BIGQUERY_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2/";

/// Cloud Resource Manager v3 endpoint
pub const RESOURCE_MANAGER_ENDPOINT: &str = "https://cloudresourcemanager.googleapis.com/v3/";

/// OAuth scope for BigQuery access
pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

/// Drive scope, needed to query Drive-backed external tables
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// OAuth scope for listing accessible projects
pub const RESOURCE_MANAGER_SCOPE: &str =
    "https://www.googleapis.com/auth/cloudplatformprojects.readonly";

/// JWT bearer grant type for service-account token exchange
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Default metadata server host for ambient identity
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

/// Key of the private key inside decrypted secure settings
pub const SECURE_PRIVATE_KEY: &str = "privateKey";

/// Error reported when service-account credentials are incomplete
pub const MISSING_AUTH_DETAILS: &str = "datasource is missing authentication details";

/// Maximum length of a job label key or value
pub const MAX_LABEL_LENGTH: usize = 63;
