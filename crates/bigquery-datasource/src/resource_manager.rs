//! Cloud Resource Manager service and its per-instance registry

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::SharedStore;
use crate::constants::RESOURCE_MANAGER_ENDPOINT;
use crate::paging::{Page, collect_pages};
use crate::settings::DatasourceSettings;
use crate::transport::{AuthenticatedTransport, HttpClientOptions, Route, TransportFactory};
use crate::{Error, Result};

/// A project visible to the data source's identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    pub project_id: String,
    pub display_name: String,
    pub name: String,
    pub state: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SearchProjectsPage {
    projects: Vec<Project>,
    next_page_token: Option<String>,
}

impl Page for SearchProjectsPage {
    type Item = Project;

    fn into_parts(self) -> (Vec<Project>, Option<String>) {
        (self.projects, self.next_page_token)
    }
}

/// Resource Manager v3 client
#[derive(Debug)]
pub struct ResourceManagerService {
    transport: AuthenticatedTransport,
    endpoint: Url,
}

impl ResourceManagerService {
    pub fn new(transport: AuthenticatedTransport) -> Result<Self> {
        let endpoint = Url::parse(RESOURCE_MANAGER_ENDPOINT)
            .map_err(|e| Error::Config(format!("invalid resource manager endpoint: {e}")))?;
        Ok(Self {
            transport,
            endpoint,
        })
    }

    /// All projects the caller can see, following pagination
    pub async fn search_projects(&self) -> Result<Vec<Project>> {
        let mut base = self.endpoint.clone();
        base.path_segments_mut()
            .map_err(|()| Error::Config("invalid resource manager endpoint".to_string()))?
            .pop_if_empty()
            .push("projects:search");

        collect_pages(&base, |url| async move {
            let req = self.transport.request(reqwest::Method::GET, url).await?;
            self.transport.send_json::<SearchProjectsPage>(req).await
        })
        .await
    }
}

/// Resource manager services keyed by data source identity.
#[derive(Debug, Clone)]
pub struct ResourceManagerRegistry {
    services: SharedStore<String, Arc<ResourceManagerService>>,
}

impl ResourceManagerRegistry {
    #[must_use]
    pub const fn new(services: SharedStore<String, Arc<ResourceManagerService>>) -> Self {
        Self { services }
    }

    #[must_use]
    pub fn get(&self, identity: &str) -> Option<Arc<ResourceManagerService>> {
        self.services.get(&identity.to_string())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Return the identity's service, creating it on first use.
    ///
    /// Nothing is stored when creation fails.
    pub fn ensure_service(
        &self,
        identity: &str,
        settings: &DatasourceSettings,
        options: &HttpClientOptions,
        transports: &dyn TransportFactory,
    ) -> Result<Arc<ResourceManagerService>> {
        if let Some(service) = self.get(identity) {
            return Ok(service);
        }

        let transport = transports
            .build(settings, options, Route::ResourceManager)
            .map_err(|e| e.context("Failed to create resource manager client"))?;
        let service = Arc::new(ResourceManagerService::new(transport)?);

        self.services
            .insert(identity.to_string(), Arc::clone(&service));
        tracing::debug!(identity, "Created resource manager service");
        #[cfg(feature = "metrics")]
        crate::observability::record_resource_manager_created();

        Ok(service)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::test_support::CountingTransportFactory;

    fn registry() -> ResourceManagerRegistry {
        ResourceManagerRegistry::new(SharedStore::new("resource_managers"))
    }

    #[test]
    fn test_ensure_creates_once_per_identity() {
        let registry = registry();
        let factory = CountingTransportFactory::default();
        let settings = DatasourceSettings::default();
        let options = HttpClientOptions::default();

        let first = assert_ok!(registry.ensure_service("1", &settings, &options, &factory));
        let second = assert_ok!(registry.ensure_service("1", &settings, &options, &factory));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.calls(Route::ResourceManager), 1);
        assert_eq!(registry.len(), 1);

        assert_ok!(registry.ensure_service("2", &settings, &options, &factory));
        assert_eq!(factory.calls(Route::ResourceManager), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_failed_creation_stores_nothing() {
        let registry = registry();
        let factory = CountingTransportFactory::failing();

        let err = assert_err!(registry.ensure_service(
            "1",
            &DatasourceSettings::default(),
            &HttpClientOptions::default(),
            &factory,
        ));

        assert!(err.to_string().contains("Failed to create resource manager client"));
        assert!(registry.is_empty());
        assert!(registry.get("1").is_none());
    }

    #[test]
    fn test_search_page_parse() {
        let page: SearchProjectsPage = serde_json::from_value(json!({
            "projects": [{
                "name": "projects/123",
                "projectId": "raintank-dev",
                "displayName": "Raintank Dev",
                "state": "ACTIVE"
            }]
        }))
        .unwrap();
        assert_eq!(page.projects[0].project_id, "raintank-dev");
        assert_eq!(page.projects[0].display_name, "Raintank Dev");
        assert!(page.next_page_token.is_none());
    }
}
