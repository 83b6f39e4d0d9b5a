// ── Client Layer ───────────────────────────────────────────────────────────
// HTTP plumbing, auth, the chat service, and the streaming ingestion
// pipeline. Everything here talks to exactly one Drift backend.

pub mod auth;
pub mod chat;
pub mod directory;
pub mod http;
pub mod store;
pub mod stream;

use std::time::Duration;

use crate::atoms::constants::{
    CONNECT_TIMEOUT, DEFAULT_POLLING_INTERVAL, REQUEST_TIMEOUT,
};

/// Client engine configuration. Constructor-injected; there is no
/// config-file layer in this crate — the embedder owns persistence.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL, no trailing slash required.
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Whole-request timeout for non-streaming calls. Streaming requests
    /// are exempt (a healthy chat stream may legitimately outlive it).
    pub request_timeout: Duration,
    /// Interval between notification polls.
    pub polling_interval: Duration,
    /// Whether the push channel may be used at all. Off means `start()`
    /// goes straight to polling and status reports push unsupported.
    pub push_enabled: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            connect_timeout: CONNECT_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            push_enabled: true,
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Self::default() }
    }
}
