// ── Atoms: Error Types ─────────────────────────────────────────────────────
// Single canonical error enum for the client engine, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (network, API, auth, stream…).
//   • `#[from]` wires std/external error conversions automatically.
//   • `ClientError` → `String` conversion is provided via `Display` so
//     embedder boundaries (FFI, UI bridges returning `Result<T, String>`)
//     can call `.map_err(|e| e.to_string())` without boilerplate.
//   • No variant carries the bearer token in its message.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP / network failure (reqwest layer).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend returned a non-OK status (detail is the response body,
    /// truncated — never the request).
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Authentication failure. A 401 anywhere maps here and additionally
    /// clears the token store (see `ApiClient::forced_logout`).
    #[error("Auth error: {0}")]
    Auth(String),

    /// Streaming-send failure: missing body, mid-stream transport error,
    /// or an error chunk sent by the server.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Client configuration is invalid (bad base URL, zero interval…).
    #[error("Configuration error: {0}")]
    Config(String),
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All client operations should return this type.
pub type ClientResult<T> = Result<T, ClientError>;

// ── Conversion: ClientError → String ───────────────────────────────────────
// Lets embedder-facing functions call `.map_err(ClientError::into)` directly.

impl From<ClientError> for String {
    fn from(e: ClientError) -> Self {
        e.to_string()
    }
}
