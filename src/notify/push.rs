// ── Notify: Push Channel ───────────────────────────────────────────────────
//
// Persistent server-to-client delivery over the authenticated
// /notifications/stream endpoint. Frames reuse the `data: <json>` line
// format of the chat stream; payloads are one of three kinds,
// discriminated on the wire and matched exhaustively here:
//
//   {"type":"connected"}            — server greeting, log only
//   {"type":"heartbeat"}            — keep-alive, ignored
//   {"event_id":..,"event_type":..} — a notification event, dispatched
//
// The channel itself carries no reconnect logic: on any failure the
// service tears it down and degrades to polling (see `service.rs`).

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use log::warn;
use reqwest::Method;
use serde::Deserialize;

use crate::atoms::constants::DATA_FRAME_PREFIX;
use crate::atoms::error::{ClientError, ClientResult};
use crate::atoms::types::{truncate_utf8, NotificationEvent};
use crate::client::http::ApiClient;

// ── Channel seam ───────────────────────────────────────────────────────────

pub type ByteStream = BoxStream<'static, ClientResult<Vec<u8>>>;

/// Transport seam for the push connection, so tests can script channel
/// lifecycles (connect failures, mid-stream errors) without a server.
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn connect(&self) -> ClientResult<ByteStream>;
}

/// Production channel: GET /notifications/stream with the bearer token.
pub struct HttpPushChannel {
    api: ApiClient,
}

impl HttpPushChannel {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PushChannel for HttpPushChannel {
    async fn connect(&self) -> ClientResult<ByteStream> {
        let response = self
            .api
            .stream_request::<()>(Method::GET, "/notifications/stream", None)
            .await?;
        Ok(response
            .bytes_stream()
            .map(|item| item.map(|bytes| bytes.to_vec()).map_err(ClientError::Network))
            .boxed())
    }
}

// ── Frame payloads ─────────────────────────────────────────────────────────

/// Everything the push channel can say. Untagged: control frames carry a
/// `type` discriminator, events carry `event_id`/`event_type` instead.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PushMessage {
    Control(ControlFrame),
    Event(NotificationEvent),
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlFrame {
    Connected,
    Heartbeat,
}

/// Parse one line of the push stream. Non-frames and unrecognized
/// payloads are skipped (logged) — one odd frame must not drop the
/// channel.
pub fn parse_push_frame(line: &str) -> Option<PushMessage> {
    let data = line.trim().strip_prefix(DATA_FRAME_PREFIX)?;
    match serde_json::from_str::<PushMessage>(data) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!("[notify] skipping unrecognized push frame ({}): {}", e, truncate_utf8(data, 200));
            None
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
