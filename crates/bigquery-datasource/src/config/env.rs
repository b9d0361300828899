//! Environment variable loading for configuration

use std::env;
use std::time::Duration;

use super::builder::ConfigBuilder;

/// Environment variable names
mod vars {
    pub const HTTP_TIMEOUT_SECS: &str = "BQDS_HTTP_TIMEOUT_SECS";
    pub const HTTP_CONNECT_TIMEOUT_SECS: &str = "BQDS_HTTP_CONNECT_TIMEOUT_SECS";
    pub const USER_AGENT: &str = "BQDS_USER_AGENT";
    pub const METADATA_HOST: &str = "GCE_METADATA_HOST";
    pub const SINGLE_FLIGHT: &str = "BQDS_SINGLE_FLIGHT";
    pub const RUST_LOG: &str = "RUST_LOG";
    pub const JSON_LOGS: &str = "BQDS_JSON_LOGS";
}

/// Load configuration from environment variables
pub fn load_from_env(mut builder: ConfigBuilder) -> ConfigBuilder {
    if let Ok(secs) = env::var(vars::HTTP_TIMEOUT_SECS)
        && let Ok(secs) = secs.parse::<u64>()
    {
        builder = builder.http_timeout(Duration::from_secs(secs));
    }

    if let Ok(secs) = env::var(vars::HTTP_CONNECT_TIMEOUT_SECS)
        && let Ok(secs) = secs.parse::<u64>()
    {
        builder = builder.http_connect_timeout(Duration::from_secs(secs));
    }

    if let Ok(agent) = env::var(vars::USER_AGENT)
        && !agent.is_empty()
    {
        builder = builder.user_agent(agent);
    }

    if let Ok(host) = env::var(vars::METADATA_HOST)
        && !host.is_empty()
    {
        builder = builder.metadata_host(host);
    }

    if let Ok(val) = env::var(vars::SINGLE_FLIGHT) {
        builder = builder.single_flight(parse_bool(&val));
    }

    if let Ok(level) = env::var(vars::RUST_LOG) {
        builder = builder.log_level(level);
    }

    if let Ok(val) = env::var(vars::JSON_LOGS) {
        builder = builder.json_logs(parse_bool(&val));
    }

    builder
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
