//! TOML configuration file loading

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::builder::ConfigBuilder;
use crate::Result;

/// Configuration file locations checked in order
const CONFIG_PATHS: &[&str] = &[
    "./bigquery-datasource.toml",
    "~/.config/bigquery-datasource/config.toml",
    "/etc/bigquery-datasource/config.toml",
];

/// Find the first existing configuration file
pub fn find_config_file() -> Option<PathBuf> {
    for path_str in CONFIG_PATHS {
        let path = if path_str.starts_with('~') {
            if let Ok(home) = std::env::var("HOME") {
                PathBuf::from(path_str.replacen('~', &home, 1))
            } else {
                continue;
            }
        } else {
            PathBuf::from(path_str)
        };

        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Load configuration from a TOML file
pub fn load_from_file(path: &Path, builder: ConfigBuilder) -> Result<ConfigBuilder> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    let file_config: FileConfig = toml::from_str(&content).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to parse config file {}: {}",
            path.display(),
            e
        ))
    })?;

    Ok(apply_file_config(builder, file_config))
}

fn apply_file_config(mut builder: ConfigBuilder, config: FileConfig) -> ConfigBuilder {
    if let Some(http) = config.http {
        if let Some(secs) = http.timeout_secs {
            builder = builder.http_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = http.connect_timeout_secs {
            builder = builder.http_connect_timeout(Duration::from_secs(secs));
        }
        if let Some(agent) = http.user_agent {
            builder = builder.user_agent(agent);
        }
    }

    if let Some(cache) = config.cache
        && let Some(enabled) = cache.single_flight
    {
        builder = builder.single_flight(enabled);
    }

    if let Some(host) = config.metadata_host {
        builder = builder.metadata_host(host);
    }

    if let Some(obs) = config.observability {
        if let Some(name) = obs.service_name {
            builder = builder.service_name(name);
        }
        if let Some(level) = obs.log_level {
            builder = builder.log_level(level);
        }
        if let Some(json) = obs.json_logs {
            builder = builder.json_logs(json);
        }
    }

    builder
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    http: Option<HttpSection>,
    cache: Option<CacheSection>,
    metadata_host: Option<String>,
    observability: Option<ObservabilitySection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HttpSection {
    timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CacheSection {
    single_flight: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ObservabilitySection {
    service_name: Option<String>,
    log_level: Option<String>,
    json_logs: Option<bool>,
}
