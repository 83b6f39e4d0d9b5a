// ── Client: Shared HTTP Layer ──────────────────────────────────────────────
//
// One reqwest::Client for the whole engine (one connection pool), plus the
// retry utilities used by every non-streaming endpoint.
//
// Features:
//   • Exponential backoff with ±25% jitter (base 1s, max 30s, 3 retries)
//   • Retry on 429 (rate limit), 500, 502, 503, 504
//   • Respects `Retry-After` header
//   • Bearer token attached to every request once acquired
//   • 401 anywhere → token cleared + forced-logout hooks fired
//
// Streaming requests go through `stream_request` — no retry (the send must
// happen at most once) and no whole-request timeout (a healthy chat stream
// may legitimately run for minutes).

use log::{error, warn};
use parking_lot::Mutex;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::atoms::error::{ClientError, ClientResult};
use crate::atoms::types::truncate_utf8;
use crate::client::auth::TokenStore;
use crate::client::ClientConfig;

// ── Constants ──────────────────────────────────────────────────────────────

/// Maximum number of retry attempts per non-streaming request.
pub const MAX_RETRIES: u32 = 3;

/// Initial retry delay in milliseconds (doubles each attempt).
const INITIAL_RETRY_DELAY_MS: u64 = 1_000;

/// Maximum retry delay cap in milliseconds (30 seconds).
const MAX_RETRY_DELAY_MS: u64 = 30_000;

// ── Retryable status detection ─────────────────────────────────────────────

/// Check if an HTTP status code represents a transient/retryable error.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

// ── Backoff delay ──────────────────────────────────────────────────────────

/// Sleep with exponential backoff + ±25% jitter.
/// Respects Retry-After header if the server sent one.
/// Returns the actual delay duration for logging.
pub async fn retry_delay(attempt: u32, retry_after_secs: Option<u64>) -> Duration {
    let base_ms = INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt);
    let capped_ms = base_ms.min(MAX_RETRY_DELAY_MS);
    let delay_ms = if let Some(secs) = retry_after_secs {
        // Use server-specified delay, but cap at 60s and floor at our computed backoff
        (secs.min(60) * 1000).max(capped_ms)
    } else {
        capped_ms
    };
    let jittered = apply_jitter(delay_ms);
    let delay = Duration::from_millis(jittered);
    tokio::time::sleep(delay).await;
    delay
}

/// Apply ±25% jitter to prevent thundering-herd effects.
fn apply_jitter(base_ms: u64) -> u64 {
    let jitter_range = (base_ms / 4) as i64;
    if jitter_range == 0 {
        return base_ms.max(100);
    }
    let offset = (rand_jitter() % (2 * jitter_range + 1)) - jitter_range;
    let result = base_ms as i64 + offset;
    result.max(100) as u64
}

/// Simple jitter source using system clock nanos (no extra crate needed).
fn rand_jitter() -> i64 {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as i64
}

// ── Retry-After header parsing ─────────────────────────────────────────────

/// Parse Retry-After header value (integer seconds only).
/// HTTP-date format is not implemented — falls back to computed backoff.
pub fn parse_retry_after(header_value: &str) -> Option<u64> {
    header_value.trim().parse::<u64>().ok()
}

// ── ApiClient ──────────────────────────────────────────────────────────────

type LogoutHook = Box<dyn Fn() + Send + Sync>;

/// Shared HTTP front door for every endpoint the engine talks to.
/// Clone is cheap (Arc internals); all clones share one connection pool,
/// one token store, and one set of forced-logout hooks.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    request_timeout: Duration,
    tokens: Arc<dyn TokenStore>,
    logout_hooks: Arc<Mutex<Vec<LogoutHook>>>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenStore>) -> Self {
        // No client-level request timeout: it would also apply to the
        // streaming body read. Non-streaming requests set it per call.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout,
            tokens,
            logout_hooks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Register a hook fired once per forced logout (401 seen anywhere).
    /// The embedder typically navigates to its login surface here.
    pub fn on_forced_logout(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.logout_hooks.lock().push(Box::new(hook));
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Build a request with the bearer token attached if one is held.
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self.client.request(method, self.url(path));
        if let Some(token) = self.tokens.get() {
            req = req.bearer_auth(token);
        }
        req
    }

    /// Clear credentials and fire every registered logout hook.
    /// Called on any 401; also used by `AuthClient::logout`.
    pub(crate) fn forced_logout(&self) {
        self.tokens.clear();
        for hook in self.logout_hooks.lock().iter() {
            hook();
        }
    }

    /// Send a non-streaming request with retry/backoff; returns the OK
    /// response with its status already checked.
    async fn send_with_retry<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ClientResult<Response> {
        let mut last_error = String::new();
        let mut last_status: u16 = 0;
        let mut retry_after: Option<u64> = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = retry_delay(attempt - 1, retry_after.take()).await;
                warn!(
                    "[http] retry {}/{} for {} {} after {}ms",
                    attempt,
                    MAX_RETRIES,
                    method,
                    path,
                    delay.as_millis()
                );
            }

            let mut req = self
                .request(method.clone(), path)
                .timeout(self.request_timeout);
            if let Some(b) = body {
                req = req.json(b);
            }

            let response = match req.send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = format!("HTTP request failed: {}", e);
                    last_status = 0;
                    if attempt < MAX_RETRIES {
                        continue;
                    }
                    return Err(ClientError::Network(e));
                }
            };

            let status = response.status();
            if !status.is_success() {
                last_status = status.as_u16();
                retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                let body_text = response.text().await.unwrap_or_default();
                last_error = truncate_utf8(&body_text, 200).to_string();
                error!("[http] {} {} failed: {} {}", method, path, last_status, truncate_utf8(&body_text, 500));

                // Auth errors are never retried
                if last_status == 401 {
                    self.forced_logout();
                    return Err(ClientError::Auth(last_error));
                }
                if is_retryable_status(last_status) && attempt < MAX_RETRIES {
                    continue;
                }
                return Err(ClientError::Api { status: last_status, message: last_error });
            }

            return Ok(response);
        }

        // All retries exhausted
        Err(ClientError::Api { status: last_status, message: last_error })
    }

    /// Send a non-streaming JSON request and decode the response body.
    /// `body: None` sends no body (GET / DELETE).
    pub async fn request_json<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ClientResult<T> {
        let response = self.send_with_retry(method, path, body).await?;
        Ok(response.json::<T>().await?)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.request_json::<T, ()>(Method::GET, path, None).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        self.request_json(Method::POST, path, Some(body)).await
    }

    /// POST where only the status matters; the response body is ignored.
    pub async fn post_ok<B: Serialize>(&self, path: &str, body: &B) -> ClientResult<()> {
        self.send_with_retry(Method::POST, path, Some(body)).await?;
        Ok(())
    }

    /// DELETE where only the status matters; the response body is ignored.
    pub async fn delete(&self, path: &str) -> ClientResult<()> {
        self.send_with_retry::<()>(Method::DELETE, path, None).await?;
        Ok(())
    }

    /// Open a streaming request and hand back the raw response once the
    /// status has been checked. No retry (at-most-once send) and no
    /// whole-request timeout — a stalled connection relies on transport-
    /// level timeouts, not application logic.
    pub async fn stream_request<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ClientResult<Response> {
        let mut req = self.request(method.clone(), path);
        if let Some(b) = body {
            req = req.json(b);
        }
        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let body_text = response.text().await.unwrap_or_default();
            let message = truncate_utf8(&body_text, 200).to_string();
            error!("[http] {} {} failed: {} {}", method, path, code, truncate_utf8(&body_text, 500));
            if code == 401 {
                self.forced_logout();
                return Err(ClientError::Auth(message));
            }
            return Err(ClientError::Api { status: code, message });
        }
        Ok(response)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
