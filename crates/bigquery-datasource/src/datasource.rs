//! Connection manager
//!
//! [`Datasource::connect`] hands out query handles and
//! [`Datasource::get_api_client`] hands out metadata clients. Both derive the
//! same [`CacheKey`] from (instance, location, project), so a handle and an
//! API client built for one key share a single authenticated
//! [`BigQueryClient`](crate::client::BigQueryClient).

use std::sync::Arc;

use crate::auth::{MetadataProjectResolver, ProjectResolver};
use crate::cache::{CacheKey, SessionCache, SingleFlight};
use crate::client::{BigQueryApi, ClientFactory, ClientOptions, DefaultClientFactory};
use crate::config::Config;
use crate::constants::BIGQUERY_SCOPE;
use crate::driver::{self, DbHandle, PooledHandle};
use crate::error::ResultExt;
use crate::resource_manager::ResourceManagerRegistry;
use crate::settings::{ConnectionArgs, ConnectionSettings, DatasourceSettings, InstanceSettings};
use crate::transport::{DefaultTransportFactory, HttpClientOptions, Route, TransportFactory};
use crate::Result;

/// Builder for [`Datasource`]; unset collaborators get the production defaults.
#[derive(Debug, Default)]
pub struct DatasourceBuilder {
    config: Option<Config>,
    cache: Option<SessionCache>,
    transports: Option<Arc<dyn TransportFactory>>,
    clients: Option<Arc<dyn ClientFactory>>,
    projects: Option<Arc<dyn ProjectResolver>>,
}

impl DatasourceBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: SessionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transports = Some(factory);
        self
    }

    #[must_use]
    pub fn with_client_factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.clients = Some(factory);
        self
    }

    #[must_use]
    pub fn with_project_resolver(mut self, resolver: Arc<dyn ProjectResolver>) -> Self {
        self.projects = Some(resolver);
        self
    }

    pub fn build(self) -> Result<Datasource> {
        let config = self.config.unwrap_or_default();

        let transports: Arc<dyn TransportFactory> = match self.transports {
            Some(factory) => factory,
            None => Arc::new(DefaultTransportFactory::new(config.metadata_host.as_str())),
        };
        let projects: Arc<dyn ProjectResolver> = match self.projects {
            Some(resolver) => resolver,
            None => {
                let http = HttpClientOptions::from_config(config.http()).build_client()?;
                Arc::new(MetadataProjectResolver::new(http, config.metadata_host.as_str()))
            }
        };
        let clients: Arc<dyn ClientFactory> = match self.clients {
            Some(factory) => factory,
            None => Arc::new(DefaultClientFactory),
        };
        let cache = self.cache.unwrap_or_default();

        Ok(Datasource {
            flights: Arc::new(SingleFlight::new(config.single_flight())),
            resource_managers: ResourceManagerRegistry::new(cache.resource_managers.clone()),
            config: Arc::new(config),
            cache,
            transports,
            clients,
            projects,
        })
    }
}

/// Connection manager for every configured BigQuery data source instance
#[derive(Debug, Clone)]
pub struct Datasource {
    config: Arc<Config>,
    cache: SessionCache,
    flights: Arc<SingleFlight<CacheKey>>,
    resource_managers: ResourceManagerRegistry,
    transports: Arc<dyn TransportFactory>,
    clients: Arc<dyn ClientFactory>,
    projects: Arc<dyn ProjectResolver>,
}

impl Datasource {
    #[must_use]
    pub fn builder() -> DatasourceBuilder {
        DatasourceBuilder::new()
    }

    #[must_use]
    pub const fn cache(&self) -> &SessionCache {
        &self.cache
    }

    #[must_use]
    pub const fn resource_managers(&self) -> &ResourceManagerRegistry {
        &self.resource_managers
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve settings plus per-query overrides into connection parameters,
    /// filling in the ambient project when the auth type calls for it.
    pub async fn connection_settings(
        &self,
        settings: &DatasourceSettings,
        args: &ConnectionArgs,
    ) -> Result<ConnectionSettings> {
        let mut params = ConnectionSettings::resolve(settings, args);
        if params.needs_ambient_project() {
            params.project = self
                .projects
                .default_project(BIGQUERY_SCOPE)
                .await
                .context("Failed to retrieve default GCE project")?;
        }
        Ok(params)
    }

    /// Return a live query handle for the instance and optional overrides.
    ///
    /// A cached handle is reused while its driver is open. Otherwise a new
    /// handle is opened, over the cached API client's remote client when one
    /// exists for the key, or over a freshly constructed client which is then
    /// also cached as the key's API client.
    pub async fn connect(
        &self,
        instance: &InstanceSettings,
        args_json: Option<&str>,
    ) -> Result<DbHandle> {
        let settings = DatasourceSettings::load(instance)?;
        let args = ConnectionArgs::parse(args_json)?;
        let params = self.connection_settings(&settings, &args).await?;

        let identity = instance.identity();
        let key = CacheKey::derive(&identity, &params);
        let options = HttpClientOptions::for_instance(self.config.http(), instance);

        self.resource_managers
            .ensure_service(&identity, &settings, &options, self.transports.as_ref())?;

        if let Some(db) = self.live_handle(&key) {
            return Ok(db);
        }

        let guard = self.flights.acquire(&key).await;
        if guard.is_some()
            && let Some(db) = self.live_handle(&key)
        {
            tracing::debug!(%key, "Connection built by concurrent request");
            return Ok(db);
        }

        if let Some(api) = self.cache.api_clients.get(&key) {
            tracing::debug!(%key, "Opening connection over cached API client");
            let (driver, db) = driver::open(&params, Arc::clone(api.client()))
                .context("Failed to connect to database")?;
            self.cache.handles.insert(
                key,
                PooledHandle {
                    driver,
                    db: db.clone(),
                },
            );
            return Ok(db);
        }

        let transport = self
            .transports
            .build(&settings, &options, Route::BigQuery)
            .context("Failed to create http client")?;
        let client = self
            .clients
            .new_client(
                &params.project,
                ClientOptions {
                    transport,
                    endpoint: settings.endpoint().map(str::to_string),
                },
            )
            .await
            .context("Failed to create BigQuery client")?;
        let (driver, db) = driver::open(&params, Arc::clone(&client))
            .context("Failed to connect to database")?;

        self.cache.handles.insert(
            key.clone(),
            PooledHandle {
                driver,
                db: db.clone(),
            },
        );
        self.cache.api_clients.insert(
            key.clone(),
            Arc::new(BigQueryApi::new(client, params.location.as_str())),
        );
        tracing::info!(%key, "Created BigQuery connection");

        Ok(db)
    }

    fn live_handle(&self, key: &CacheKey) -> Option<DbHandle> {
        let pooled = self.cache.handles.get(key)?;
        if pooled.is_live() {
            return Some(pooled.db);
        }
        tracing::warn!(%key, "Cached connection is closed, reconnecting");
        None
    }

    /// Return the metadata client for `project` in `location`.
    ///
    /// An empty location means the instance's processing location. Never
    /// touches the handle cache or the resource manager registry.
    pub async fn get_api_client(
        &self,
        instance: &InstanceSettings,
        project: &str,
        location: &str,
    ) -> Result<Arc<BigQueryApi>> {
        let settings = DatasourceSettings::load(instance)?;
        let location = if location.is_empty() {
            settings.processing_location.as_str()
        } else {
            location
        };
        let key = CacheKey::new(instance.identity(), location, project);

        if let Some(api) = self.cache.api_clients.get(&key) {
            return Ok(api);
        }

        let guard = self.flights.acquire(&key).await;
        if guard.is_some()
            && let Some(api) = self.cache.api_clients.get(&key)
        {
            return Ok(api);
        }

        let options = HttpClientOptions::for_instance(self.config.http(), instance);
        let transport = self
            .transports
            .build(&settings, &options, Route::BigQuery)
            .context("Failed to create http client")?;
        let client = self
            .clients
            .new_client(
                project,
                ClientOptions {
                    transport,
                    endpoint: settings.endpoint().map(str::to_string),
                },
            )
            .await
            .context("Failed to create BigQuery client")?;

        let api = Arc::new(BigQueryApi::new(client, location));
        self.cache.api_clients.insert(key.clone(), Arc::clone(&api));
        tracing::info!(%key, "Created BigQuery API client");

        Ok(api)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::settings::AuthenticationType;
    use crate::test_support::{
        CountingClientFactory, CountingTransportFactory, FixedProjectResolver, jwt_instance,
        static_api,
    };

    struct Harness {
        ds: Datasource,
        transports: Arc<CountingTransportFactory>,
        clients: Arc<CountingClientFactory>,
        resolver: Arc<FixedProjectResolver>,
    }

    fn harness_with(single_flight: bool, clients: CountingClientFactory) -> Harness {
        let transports = Arc::new(CountingTransportFactory::default());
        let clients = Arc::new(clients);
        let resolver = Arc::new(FixedProjectResolver::new("ambient-project"));
        let ds = Datasource::builder()
            .with_config(Config::builder().single_flight(single_flight).build())
            .with_transport_factory(transports.clone())
            .with_client_factory(clients.clone())
            .with_project_resolver(resolver.clone())
            .build()
            .unwrap();
        Harness {
            ds,
            transports,
            clients,
            resolver,
        }
    }

    fn harness() -> Harness {
        harness_with(true, CountingClientFactory::default())
    }

    #[tokio::test]
    async fn test_connect_reuses_cached_handle() {
        let h = harness();
        let instance = jwt_instance(1);

        let first = h.ds.connect(&instance, None).await.unwrap();
        let second = h.ds.connect(&instance, None).await.unwrap();
        let third = h.ds.connect(&instance, Some("{}")).await.unwrap();

        assert_eq!(h.clients.calls(), 1);
        assert_eq!(h.transports.calls(Route::BigQuery), 1);
        assert!(Arc::ptr_eq(first.driver(), second.driver()));
        assert!(Arc::ptr_eq(first.driver(), third.driver()));

        let key = CacheKey::new("1", "us-west1", "raintank-dev");
        assert!(h.ds.cache().handles.contains(&key));
        assert!(h.ds.cache().api_clients.contains(&key));
    }

    #[tokio::test]
    async fn test_distinct_locations_get_distinct_entries() {
        let h = harness();
        let instance = jwt_instance(1);

        let west = h.ds.connect(&instance, None).await.unwrap();
        let east = h
            .ds
            .connect(&instance, Some(r#"{"location":"us-east1"}"#))
            .await
            .unwrap();

        assert_eq!(h.clients.calls(), 2);
        assert!(!Arc::ptr_eq(west.client(), east.client()));
        assert_eq!(h.ds.cache().handles.len(), 2);
        assert!(
            h.ds.cache()
                .handles
                .contains(&CacheKey::new("1", "us-east1", "raintank-dev"))
        );
    }

    #[tokio::test]
    async fn test_distinct_projects_get_distinct_entries() {
        let h = harness();
        let mut other = jwt_instance(1);
        other.json_data["defaultProject"] = json!("other-project");

        h.ds.connect(&jwt_instance(1), None).await.unwrap();
        h.ds.connect(&other, None).await.unwrap();

        assert_eq!(h.clients.calls(), 2);
        assert_eq!(h.ds.cache().api_clients.len(), 2);
        assert_eq!(
            h.clients.projects(),
            vec!["raintank-dev".to_string(), "other-project".to_string()]
        );
    }

    #[tokio::test]
    async fn test_connect_reuses_existing_api_client() {
        let h = harness();
        let key = CacheKey::new("1", "us-west1", "raintank-dev");
        let api = static_api("raintank-dev", "us-west1");
        h.ds.cache().api_clients.insert(key.clone(), Arc::clone(&api));

        let db = h.ds.connect(&jwt_instance(1), None).await.unwrap();

        assert_eq!(h.clients.calls(), 0);
        assert_eq!(h.transports.calls(Route::BigQuery), 0);
        assert!(Arc::ptr_eq(db.client(), api.client()));
        assert!(h.ds.cache().handles.contains(&key));
    }

    #[tokio::test]
    async fn test_handle_and_api_client_share_remote_client() {
        let h = harness();
        let db = h.ds.connect(&jwt_instance(1), None).await.unwrap();

        let key = CacheKey::new("1", "us-west1", "raintank-dev");
        let api = h.ds.cache().api_clients.get(&key).unwrap();
        assert!(Arc::ptr_eq(db.client(), api.client()));
        assert_eq!(api.location(), "us-west1");
    }

    #[tokio::test]
    async fn test_resource_manager_created_once_per_identity() {
        let h = harness();

        h.ds.connect(&jwt_instance(1), None).await.unwrap();
        h.ds.connect(&jwt_instance(1), Some(r#"{"location":"EU"}"#))
            .await
            .unwrap();
        assert_eq!(h.transports.calls(Route::ResourceManager), 1);
        assert!(h.ds.resource_managers().get("1").is_some());

        h.ds.connect(&jwt_instance(2), None).await.unwrap();
        assert_eq!(h.transports.calls(Route::ResourceManager), 2);
        assert_eq!(h.ds.resource_managers().len(), 2);
    }

    #[tokio::test]
    async fn test_resource_manager_failure_is_surfaced() {
        let clients = Arc::new(CountingClientFactory::default());
        let ds = Datasource::builder()
            .with_transport_factory(Arc::new(CountingTransportFactory::failing_route(
                Route::ResourceManager,
            )))
            .with_client_factory(clients.clone())
            .with_project_resolver(Arc::new(FixedProjectResolver::new("p")))
            .build()
            .unwrap();

        let err = ds.connect(&jwt_instance(1), None).await.unwrap_err();
        assert!(err.to_string().contains("Failed to create resource manager client"));
        assert_eq!(clients.calls(), 0);
        assert!(ds.cache().handles.is_empty());
        assert!(ds.resource_managers().is_empty());
    }

    #[tokio::test]
    async fn test_missing_auth_details() {
        let h = harness();
        let instance = InstanceSettings {
            id: 1,
            json_data: json!({"authenticationType": "jwt", "defaultProject": "p"}),
            ..Default::default()
        };

        let err = h.ds.connect(&instance, None).await.unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("datasource is missing authentication details"));
        assert_eq!(h.clients.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_args() {
        let h = harness();
        let err = h
            .ds
            .connect(&jwt_instance(1), Some("{not json"))
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn test_closed_handle_is_replaced() {
        let h = harness();
        let instance = jwt_instance(1);

        let first = h.ds.connect(&instance, None).await.unwrap();
        first.close();

        let second = h.ds.connect(&instance, None).await.unwrap();
        assert!(!second.is_closed());
        assert!(!Arc::ptr_eq(first.driver(), second.driver()));
        // The cached API client supplies the remote client for the rebuild.
        assert_eq!(h.clients.calls(), 1);
        assert!(Arc::ptr_eq(first.client(), second.client()));
        assert_eq!(h.ds.cache().handles.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_client_construction_stores_nothing() {
        let h = harness_with(true, CountingClientFactory::failing());

        let err = h.ds.connect(&jwt_instance(1), None).await.unwrap_err();
        assert!(err.is_remote());
        assert!(err.to_string().contains("Failed to create BigQuery client"));
        assert!(h.ds.cache().handles.is_empty());
        assert!(h.ds.cache().api_clients.is_empty());

        let err = h
            .ds
            .get_api_client(&jwt_instance(1), "raintank-dev", "")
            .await
            .unwrap_err();
        assert!(err.is_remote());
        assert!(h.ds.cache().api_clients.is_empty());
    }

    #[tokio::test]
    async fn test_gce_resolves_ambient_project() {
        let h = harness();
        let instance = InstanceSettings {
            id: 7,
            json_data: json!({"authenticationType": "gce"}),
            ..Default::default()
        };

        let db = h.ds.connect(&instance, None).await.unwrap();
        assert_eq!(db.settings().project, "ambient-project");
        assert_eq!(h.resolver.calls(), 1);
        assert!(
            h.ds.cache()
                .handles
                .contains(&CacheKey::new("7", "US", "ambient-project"))
        );
        assert_eq!(
            h.transports.auth_types(),
            vec![AuthenticationType::Gce, AuthenticationType::Gce]
        );
    }

    #[tokio::test]
    async fn test_gce_with_project_skips_resolution() {
        let h = harness();
        let instance = InstanceSettings {
            id: 7,
            json_data: json!({"authenticationType": "gce", "defaultProject": "configured"}),
            ..Default::default()
        };

        let db = h.ds.connect(&instance, None).await.unwrap();
        assert_eq!(db.settings().project, "configured");
        assert_eq!(h.resolver.calls(), 0);
    }

    #[tokio::test]
    async fn test_gce_resolution_failure() {
        let ds = Datasource::builder()
            .with_transport_factory(Arc::new(CountingTransportFactory::default()))
            .with_client_factory(Arc::new(CountingClientFactory::default()))
            .with_project_resolver(Arc::new(FixedProjectResolver::failing()))
            .build()
            .unwrap();
        let instance = InstanceSettings {
            id: 7,
            json_data: json!({"authenticationType": "gce"}),
            ..Default::default()
        };

        let err = ds.connect(&instance, None).await.unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("Failed to retrieve default GCE project"));
    }

    #[tokio::test]
    async fn test_concurrent_connects_build_once() {
        let h = harness_with(true, CountingClientFactory::with_delay_ms(20));
        let instance = jwt_instance(1);

        let handles = futures::future::join_all((0..8).map(|_| h.ds.connect(&instance, None))).await;

        let handles: Vec<_> = handles.into_iter().map(Result::unwrap).collect();
        assert_eq!(h.clients.calls(), 1);
        assert!(
            handles
                .iter()
                .all(|db| Arc::ptr_eq(db.driver(), handles[0].driver()))
        );
    }

    #[tokio::test]
    async fn test_concurrent_connects_without_guard_may_duplicate() {
        let h = harness_with(false, CountingClientFactory::with_delay_ms(20));
        let instance = jwt_instance(1);

        let results = futures::future::join_all((0..4).map(|_| h.ds.connect(&instance, None))).await;

        assert!(results.iter().all(Result::is_ok));
        assert!(h.clients.calls() >= 1);
        // Last write wins; one entry per map regardless of duplicates.
        assert_eq!(h.ds.cache().handles.len(), 1);
        assert_eq!(h.ds.cache().api_clients.len(), 1);
    }

    #[tokio::test]
    async fn test_get_api_client_defaults_location() {
        let h = harness();
        let instance = jwt_instance(1);

        let api = h
            .ds
            .get_api_client(&instance, "raintank-dev", "")
            .await
            .unwrap();
        assert_eq!(api.location(), "us-west1");
        assert!(
            h.ds.cache()
                .api_clients
                .contains(&CacheKey::new("1", "us-west1", "raintank-dev"))
        );

        let again = h
            .ds
            .get_api_client(&instance, "raintank-dev", "us-west1")
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&api, &again));
        assert_eq!(h.clients.calls(), 1);
    }

    #[tokio::test]
    async fn test_get_api_client_skips_handles_and_registry() {
        let h = harness();
        h.ds.get_api_client(&jwt_instance(1), "raintank-dev", "EU")
            .await
            .unwrap();

        assert!(h.ds.cache().handles.is_empty());
        assert!(h.ds.resource_managers().is_empty());
        assert_eq!(h.transports.calls(Route::ResourceManager), 0);
    }

    #[tokio::test]
    async fn test_api_client_then_connect_share_client() {
        let h = harness();
        let instance = jwt_instance(1);

        let api = h
            .ds
            .get_api_client(&instance, "raintank-dev", "")
            .await
            .unwrap();
        let db = h.ds.connect(&instance, None).await.unwrap();

        assert_eq!(h.clients.calls(), 1);
        assert!(Arc::ptr_eq(db.client(), api.client()));
    }

    #[tokio::test]
    async fn test_custom_endpoint_forwarded() {
        let h = harness();
        let mut instance = jwt_instance(1);
        instance.json_data["serviceEndpoint"] = json!("https://bq.example.test/bigquery/v2/");

        let db = h.ds.connect(&instance, None).await.unwrap();
        assert_eq!(
            db.client().endpoint().as_str(),
            "https://bq.example.test/bigquery/v2/"
        );
    }

    #[tokio::test]
    async fn test_shared_cache_across_datasources() {
        let cache = SessionCache::new();
        let clients = Arc::new(CountingClientFactory::default());
        let build = || {
            Datasource::builder()
                .with_cache(cache.clone())
                .with_transport_factory(Arc::new(CountingTransportFactory::default()))
                .with_client_factory(clients.clone())
                .with_project_resolver(Arc::new(FixedProjectResolver::new("p")))
                .build()
                .unwrap()
        };

        build().connect(&jwt_instance(1), None).await.unwrap();
        build().connect(&jwt_instance(1), None).await.unwrap();
        assert_eq!(clients.calls(), 1);
    }
}
