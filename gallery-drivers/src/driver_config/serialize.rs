use gallery_common::log::debug;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

use super::{RateLimitConfig, RetryConfig, ServerConfig, DEFAULT_UA};
use crate::server_config;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse server list: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Server {server} has an invalid rate limit of {rate} requests per second")]
    InvalidRateLimit { server: String, rate: f64 },
}

#[derive(Debug, Deserialize)]
struct Config {
    servers: HashMap<String, Server>,
}

#[derive(Debug, Deserialize)]
struct Server {
    pretty_name: Option<String>,
    base_url: String,
    post_url: Option<String>,
    post_list_url: Option<String>,
    user_agent: Option<String>,
    timeout_secs: Option<u64>,
    rate_limit: Option<RateLimitConfig>,
    retry: Option<RetryConfig>,
}

/// Parses a TOML server list into configs keyed by server name.
///
/// ```toml
/// [servers.mirror]
/// base_url = "https://mirror.example"
///
/// [servers.mirror.rate_limit]
/// requests_per_second = 1.0
/// burst = 1
/// ```
///
/// Only `base_url` is required. Missing endpoints are derived from it and everything else falls
/// back to the e621 defaults.
pub fn read_server_cfg_str(contents: &str) -> Result<HashMap<String, ServerConfig>, ConfigError> {
    let config: Config = toml::from_str(contents)?;
    let mut smap = HashMap::with_capacity(config.servers.len());

    for (id, data) in config.servers {
        let base_url = data.base_url.trim_end_matches('/').to_string();
        let defaults = server_config!(
            id.as_str(),
            data.pretty_name.as_deref().unwrap_or(id.as_str()),
            base_url.as_str(),
            DEFAULT_UA
        );

        let rate_limit = data.rate_limit.unwrap_or(defaults.rate_limit);
        if !(rate_limit.requests_per_second.is_finite() && rate_limit.requests_per_second > 0.0) {
            return Err(ConfigError::InvalidRateLimit {
                server: id,
                rate: rate_limit.requests_per_second,
            });
        }

        let config = ServerConfig {
            post_url: data.post_url.unwrap_or(defaults.post_url),
            post_list_url: data.post_list_url.unwrap_or(defaults.post_list_url),
            user_agent: data.user_agent.unwrap_or(defaults.user_agent),
            timeout_secs: data.timeout_secs.unwrap_or(defaults.timeout_secs),
            rate_limit,
            retry: data.retry.unwrap_or(defaults.retry),
            ..defaults
        };
        smap.insert(id, config);
    }

    debug!("Configured servers: {:?}", smap.keys().collect::<Vec<_>>());
    Ok(smap)
}
