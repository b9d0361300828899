//! Connection and client caching for a BigQuery data source
//!
//! A [`Datasource`] turns per-instance settings plus per-query overrides into
//! live query handles and metadata clients, performing the authenticated
//! client handshake once per (instance, location, project).

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
mod constants;
mod datasource;
pub mod driver;
mod error;
pub mod labels;
pub mod observability;
mod paging;
pub mod resource_manager;
mod resources;
pub mod settings;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use cache::{CacheKey, SessionCache, SharedStore, SingleFlight, StoreStats};
pub use client::{BigQueryApi, BigQueryClient, ClientFactory, ClientOptions, DefaultClientFactory};
pub use config::{Config, ConfigBuilder, HttpConfig, TelemetryConfig};
pub use constants::DEFAULT_PROCESSING_LOCATION;
pub use datasource::{Datasource, DatasourceBuilder};
pub use driver::{DbHandle, Driver, PooledHandle};
pub use error::{Error, Result, ResultExt};
pub use labels::{headers_as_labels, sanitize_label};
pub use resource_manager::{Project, ResourceManagerRegistry, ResourceManagerService};
pub use resources::{DatasetsArgs, ProjectsArgs, TableSchemaArgs, ValidateQueryArgs};
pub use settings::{
    AuthenticationType, ConnectionArgs, ConnectionSettings, DatasourceSettings, InstanceSettings,
    QueryPriority,
};
pub use transport::{
    AuthenticatedTransport, DefaultTransportFactory, HttpClientOptions, Route, TransportFactory,
};
