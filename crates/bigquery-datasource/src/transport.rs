//! Authenticated HTTP transport construction

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::auth::{MetadataTokenSource, ServiceAccountTokenSource, TokenSource};
use crate::config::HttpConfig;
use crate::constants::{
    BIGQUERY_SCOPE, DEFAULT_METADATA_HOST, DRIVE_SCOPE, MISSING_AUTH_DETAILS,
    RESOURCE_MANAGER_SCOPE,
};
use crate::settings::{AuthenticationType, DatasourceSettings, InstanceSettings};
use crate::{Error, Result};

/// Which Google API a transport talks to; selects the OAuth scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    BigQuery,
    ResourceManager,
}

impl Route {
    #[must_use]
    pub fn scopes(self) -> Vec<String> {
        match self {
            Self::BigQuery => vec![BIGQUERY_SCOPE.to_string(), DRIVE_SCOPE.to_string()],
            Self::ResourceManager => vec![RESOURCE_MANAGER_SCOPE.to_string()],
        }
    }
}

/// Base HTTP options shared by every transport of an instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpClientOptions {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
    pub headers: Vec<(String, String)>,
}

impl Default for HttpClientOptions {
    fn default() -> Self {
        Self::from_config(&HttpConfig::default())
    }
}

impl HttpClientOptions {
    #[must_use]
    pub fn from_config(config: &HttpConfig) -> Self {
        Self {
            timeout: config.timeout,
            connect_timeout: config.connect_timeout,
            user_agent: config.user_agent.clone(),
            headers: Vec::new(),
        }
    }

    /// Process defaults plus the instance's custom headers
    #[must_use]
    pub fn for_instance(config: &HttpConfig, instance: &InstanceSettings) -> Self {
        Self {
            headers: instance.custom_headers(),
            ..Self::from_config(config)
        }
    }

    fn header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Config(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Config(format!("invalid value for header {name}: {e}")))?;
            map.append(name, value);
        }
        Ok(map)
    }

    /// Build the underlying `reqwest` client
    pub fn build_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(self.user_agent.as_str())
            .default_headers(self.header_map()?)
            .build()
            .map_err(|e| Error::transport(&e))
    }
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
}

/// HTTP client plus the token source that authorizes its requests.
#[derive(Debug, Clone)]
pub struct AuthenticatedTransport {
    http: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    route: Route,
}

impl AuthenticatedTransport {
    #[must_use]
    pub fn new(http: reqwest::Client, tokens: Arc<dyn TokenSource>, route: Route) -> Self {
        Self {
            http,
            tokens,
            route,
        }
    }

    #[must_use]
    pub const fn route(&self) -> Route {
        self.route
    }

    /// Start a request carrying a bearer token
    pub async fn request(
        &self,
        method: reqwest::Method,
        url: url::Url,
    ) -> Result<reqwest::RequestBuilder> {
        let token = self.tokens.token().await?;
        Ok(self.http.request(method, url).bearer_auth(token.value))
    }

    /// Send a request and decode a JSON success body.
    ///
    /// Non-success responses become [`Error::Api`] carrying the message
    /// from the Google error envelope when there is one.
    pub async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let resp = req.send().await.map_err(|e| Error::remote(&e))?;
        let status = resp.status();

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GoogleErrorBody>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text);
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = resp.bytes().await.map_err(|e| Error::remote(&e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Builds authenticated transports for a data source
pub trait TransportFactory: Send + Sync + std::fmt::Debug {
    fn build(
        &self,
        settings: &DatasourceSettings,
        options: &HttpClientOptions,
        route: Route,
    ) -> Result<AuthenticatedTransport>;
}

/// Transport factory backed by `reqwest` and the real token endpoints
#[derive(Debug, Clone)]
pub struct DefaultTransportFactory {
    metadata_host: String,
}

impl Default for DefaultTransportFactory {
    fn default() -> Self {
        Self::new(DEFAULT_METADATA_HOST)
    }
}

impl DefaultTransportFactory {
    #[must_use]
    pub fn new(metadata_host: impl Into<String>) -> Self {
        Self {
            metadata_host: metadata_host.into(),
        }
    }
}

impl TransportFactory for DefaultTransportFactory {
    fn build(
        &self,
        settings: &DatasourceSettings,
        options: &HttpClientOptions,
        route: Route,
    ) -> Result<AuthenticatedTransport> {
        let http = options.build_client()?;

        let tokens: Arc<dyn TokenSource> = match settings.authentication_type {
            AuthenticationType::Jwt => {
                if settings.client_email.is_empty()
                    || settings.private_key.is_empty()
                    || settings.token_uri.is_empty()
                {
                    return Err(Error::Config(MISSING_AUTH_DETAILS.to_string()));
                }
                Arc::new(ServiceAccountTokenSource::new(
                    http.clone(),
                    settings.client_email.as_str(),
                    settings.private_key.as_str(),
                    settings.token_uri.as_str(),
                    route.scopes(),
                ))
            }
            AuthenticationType::Gce => Arc::new(MetadataTokenSource::new(
                http.clone(),
                self.metadata_host.as_str(),
                route.scopes(),
            )),
        };

        tracing::debug!(
            ?route,
            auth = %settings.authentication_type,
            "Built authenticated transport"
        );

        Ok(AuthenticatedTransport::new(http, tokens, route))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_settings() -> DatasourceSettings {
        DatasourceSettings {
            authentication_type: AuthenticationType::Jwt,
            client_email: "test@grafana.com".into(),
            private_key: "randomPrivateKey".into(),
            token_uri: "token".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_route_scopes() {
        assert!(Route::BigQuery.scopes().contains(&BIGQUERY_SCOPE.to_string()));
        assert_eq!(
            Route::ResourceManager.scopes(),
            vec![RESOURCE_MANAGER_SCOPE.to_string()]
        );
    }

    #[test]
    fn test_build_jwt_transport() {
        let factory = DefaultTransportFactory::default();
        let transport = factory
            .build(&jwt_settings(), &HttpClientOptions::default(), Route::BigQuery)
            .unwrap();
        assert_eq!(transport.route(), Route::BigQuery);
    }

    #[test]
    fn test_build_gce_transport() {
        let settings = DatasourceSettings {
            authentication_type: AuthenticationType::Gce,
            ..Default::default()
        };
        let transport = DefaultTransportFactory::new("localhost:1")
            .build(&settings, &HttpClientOptions::default(), Route::ResourceManager)
            .unwrap();
        assert_eq!(transport.route(), Route::ResourceManager);
    }

    #[test]
    fn test_build_jwt_without_credentials() {
        let settings = DatasourceSettings::default();
        let err = DefaultTransportFactory::default()
            .build(&settings, &HttpClientOptions::default(), Route::BigQuery)
            .unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains(MISSING_AUTH_DETAILS));
    }

    #[test]
    fn test_invalid_custom_header() {
        let options = HttpClientOptions {
            headers: vec![("bad header".into(), "v".into())],
            ..Default::default()
        };
        let err = options.build_client().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_options_for_instance() {
        let instance = InstanceSettings {
            id: 1,
            json_data: serde_json::json!({"httpHeaderName1": "X-Team"}),
            decrypted_secure_json_data: std::collections::HashMap::from([(
                "httpHeaderValue1".to_string(),
                "core".to_string(),
            )]),
            ..Default::default()
        };
        let options = HttpClientOptions::for_instance(&HttpConfig::default(), &instance);
        assert_eq!(options.headers, vec![("X-Team".into(), "core".into())]);
        assert!(options.build_client().is_ok());
    }

    #[test]
    fn test_google_error_body() {
        let body: GoogleErrorBody =
            serde_json::from_str(r#"{"error":{"code":404,"message":"Not found"}}"#).unwrap();
        assert_eq!(body.error.message, "Not found");
    }
}
