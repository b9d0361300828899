//! Configuration builder

use std::time::Duration;

use crate::constants::DEFAULT_METADATA_HOST;

/// Process-level configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub http: HttpConfig,
    pub telemetry: TelemetryConfig,
    pub metadata_host: String,
    pub single_flight: bool,
}

impl Default for Config {
    fn default() -> Self {
        ConfigBuilder::new().build()
    }
}

impl Config {
    #[must_use]
    pub const fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    #[must_use]
    pub const fn http(&self) -> &HttpConfig {
        &self.http
    }

    #[must_use]
    pub const fn single_flight(&self) -> bool {
        self.single_flight
    }
}

/// Defaults for every HTTP client built by the transport factory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(ConfigBuilder::DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(ConfigBuilder::DEFAULT_CONNECT_TIMEOUT_SECS),
            user_agent: default_user_agent(),
        }
    }
}

fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Telemetry configuration
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub log_level: String,
    pub json_logs: bool,
}

/// Configuration builder with fluent API
#[derive(Debug)]
pub struct ConfigBuilder {
    http_timeout: Duration,
    http_connect_timeout: Duration,
    user_agent: Option<String>,
    metadata_host: Option<String>,
    single_flight: bool,
    telemetry: TelemetryConfig,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    const DEFAULT_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

    #[must_use]
    pub const fn new() -> Self {
        Self {
            http_timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            http_connect_timeout: Duration::from_secs(Self::DEFAULT_CONNECT_TIMEOUT_SECS),
            user_agent: None,
            metadata_host: None,
            single_flight: true,
            telemetry: TelemetryConfig {
                service_name: String::new(),
                log_level: String::new(),
                json_logs: false,
            },
        }
    }

    #[must_use]
    pub const fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn http_connect_timeout(mut self, timeout: Duration) -> Self {
        self.http_connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = Some(user_agent);
        self
    }

    #[must_use]
    pub fn metadata_host(mut self, host: String) -> Self {
        self.metadata_host = Some(host);
        self
    }

    #[must_use]
    pub const fn single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    #[must_use]
    pub fn service_name(mut self, name: String) -> Self {
        self.telemetry.service_name = name;
        self
    }

    #[must_use]
    pub fn log_level(mut self, level: String) -> Self {
        self.telemetry.log_level = level;
        self
    }

    #[must_use]
    pub const fn json_logs(mut self, enabled: bool) -> Self {
        self.telemetry.json_logs = enabled;
        self
    }

    #[must_use]
    pub fn build(self) -> Config {
        let mut telemetry = self.telemetry;
        if telemetry.service_name.is_empty() {
            telemetry.service_name = env!("CARGO_PKG_NAME").to_string();
        }
        if telemetry.log_level.is_empty() {
            telemetry.log_level = "info".to_string();
        }

        Config {
            http: HttpConfig {
                timeout: self.http_timeout,
                connect_timeout: self.http_connect_timeout,
                user_agent: self.user_agent.unwrap_or_else(default_user_agent),
            },
            telemetry,
            metadata_host: self
                .metadata_host
                .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string()),
            single_flight: self.single_flight,
        }
    }
}
