//! Per-server settings used by drivers.
//!
//! A [`ServerConfig`] tells a driver where the upstream lives, which user agent to present, and
//! how hard it may hit the server. The [`DEFAULT_SERVERS`] map covers the known instances;
//! hosts can add more through [`serialize::read_server_cfg_str`].
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::time::Duration;

use crate::server_config;

pub mod macros;
pub mod serialize;

/// e621 asks for a descriptive user agent and blocks generic library ones.
pub(crate) const DEFAULT_UA: &str = concat!("libgallery/", env!("CARGO_PKG_VERSION"));

pub static DEFAULT_SERVERS: Lazy<HashMap<String, ServerConfig>> = Lazy::new(|| {
    let mut hmap = HashMap::with_capacity(2);
    hmap.insert(
        "e621".to_string(),
        server_config!("e621", "e621", "https://e621.net", DEFAULT_UA),
    );
    hmap.insert(
        "e926".to_string(),
        server_config!("e926", "e926", "https://e926.net", DEFAULT_UA),
    );
    hmap
});

/// Request rate allowed against a server.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Steady state requests per second.
    pub requests_per_second: f64,
    /// Max requests that may be issued back to back.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // Hard limit is 2 req/s and hitting it yields 503s
        Self {
            requests_per_second: 2.0,
            burst: 1,
        }
    }
}

/// How transient failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 4,
            min_backoff_ms: 1000,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryConfig {
    #[inline]
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based), doubling from the minimum up to the maximum.
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(31);
        let delay = self.min_backoff_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub pretty_name: String,
    pub base_url: String,
    /// Post pages live at `<post_url>/<id>` and their JSON at `<post_url>/<id>.json`.
    pub post_url: String,
    pub post_list_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        server_config!("e621", "e621", "https://e621.net", DEFAULT_UA)
    }
}

impl Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl ServerConfig {
    /// Points every endpoint at `base_url`, keeping the rest of the settings.
    ///
    /// Meant for mirrors and local test servers that expose the same API under another host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.base_url = base.to_string();
        self.post_url = format!("{base}/posts");
        self.post_list_url = format!("{base}/posts.json");
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_second: f64, burst: u32) -> Self {
        self.rate_limit = RateLimitConfig {
            requests_per_second,
            burst,
        };
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[inline]
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
