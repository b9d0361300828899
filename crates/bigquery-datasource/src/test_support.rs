//! Counting collaborators for cache tests

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use crate::auth::{ProjectResolver, StaticTokenSource};
use crate::client::{BigQueryApi, BigQueryClient, ClientFactory, ClientOptions};
use crate::settings::{AuthenticationType, DatasourceSettings, InstanceSettings};
use crate::transport::{AuthenticatedTransport, HttpClientOptions, Route, TransportFactory};
use crate::{Error, Result};

/// Instance configured for `jwt` auth in `us-west1` on `raintank-dev`
pub fn jwt_instance(id: i64) -> InstanceSettings {
    InstanceSettings {
        id,
        json_data: json!({
            "authenticationType": "jwt",
            "defaultProject": "raintank-dev",
            "processingLocation": "us-west1",
            "tokenUri": "token",
            "clientEmail": "test@grafana.com"
        }),
        decrypted_secure_json_data: HashMap::from([(
            "privateKey".to_string(),
            "randomPrivateKey".to_string(),
        )]),
        ..Default::default()
    }
}

pub fn static_transport(route: Route) -> AuthenticatedTransport {
    AuthenticatedTransport::new(
        reqwest::Client::new(),
        Arc::new(StaticTokenSource::new("test-token")),
        route,
    )
}

pub fn static_client(project: &str) -> Arc<BigQueryClient> {
    match BigQueryClient::new(project, None, static_transport(Route::BigQuery)) {
        Ok(client) => Arc::new(client),
        Err(e) => panic!("test client: {e}"),
    }
}

pub fn static_api(project: &str, location: &str) -> Arc<BigQueryApi> {
    Arc::new(BigQueryApi::new(static_client(project), location))
}

/// Transport factory that counts builds per route
#[derive(Debug, Default)]
pub struct CountingTransportFactory {
    bigquery: AtomicUsize,
    resource_manager: AtomicUsize,
    auth_types: Mutex<Vec<AuthenticationType>>,
    fail: Option<Option<Route>>,
}

impl CountingTransportFactory {
    /// Every build fails
    pub fn failing() -> Self {
        Self {
            fail: Some(None),
            ..Default::default()
        }
    }

    /// Builds for `route` fail
    pub fn failing_route(route: Route) -> Self {
        Self {
            fail: Some(Some(route)),
            ..Default::default()
        }
    }

    pub fn calls(&self, route: Route) -> usize {
        match route {
            Route::BigQuery => self.bigquery.load(Ordering::SeqCst),
            Route::ResourceManager => self.resource_manager.load(Ordering::SeqCst),
        }
    }

    pub fn auth_types(&self) -> Vec<AuthenticationType> {
        self.auth_types.lock().clone()
    }
}

impl TransportFactory for CountingTransportFactory {
    fn build(
        &self,
        settings: &DatasourceSettings,
        _options: &HttpClientOptions,
        route: Route,
    ) -> Result<AuthenticatedTransport> {
        match route {
            Route::BigQuery => self.bigquery.fetch_add(1, Ordering::SeqCst),
            Route::ResourceManager => self.resource_manager.fetch_add(1, Ordering::SeqCst),
        };
        self.auth_types.lock().push(settings.authentication_type);

        if let Some(failing) = self.fail
            && failing.is_none_or(|r| r == route)
        {
            return Err(Error::Transport("transport construction refused".to_string()));
        }
        Ok(static_transport(route))
    }
}

/// Client factory that counts constructions
#[derive(Debug, Default)]
pub struct CountingClientFactory {
    calls: AtomicUsize,
    projects: Mutex<Vec<String>>,
    delay: Option<Duration>,
    fail: bool,
}

impl CountingClientFactory {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Each construction sleeps first, widening the race window
    pub fn with_delay_ms(ms: u64) -> Self {
        Self {
            delay: Some(Duration::from_millis(ms)),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn projects(&self) -> Vec<String> {
        self.projects.lock().clone()
    }
}

#[async_trait]
impl ClientFactory for CountingClientFactory {
    async fn new_client(
        &self,
        project: &str,
        options: ClientOptions,
    ) -> Result<Arc<BigQueryClient>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.projects.lock().push(project.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(Error::Remote("client construction refused".to_string()));
        }
        Ok(Arc::new(BigQueryClient::new(
            project,
            options.endpoint.as_deref(),
            options.transport,
        )?))
    }
}

/// Resolver returning a fixed project
#[derive(Debug)]
pub struct FixedProjectResolver {
    project: Option<String>,
    calls: AtomicUsize,
}

impl FixedProjectResolver {
    pub fn new(project: &str) -> Self {
        Self {
            project: Some(project.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            project: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProjectResolver for FixedProjectResolver {
    async fn default_project(&self, _scope: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.project
            .clone()
            .ok_or_else(|| Error::Config("no default project in environment".to_string()))
    }
}
