// End-to-end tests: a scripted TCP server stands in for the backend so
// the full path — ApiClient → streaming pipeline → store → directory —
// runs over real HTTP. Notification strategy switching is driven through
// the injected transport seams instead.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use driftchat::notify::poller::NotificationSource;
use driftchat::notify::push::{ByteStream, PushChannel};
use driftchat::{
    ApiClient, AuthClient, ChatService, ClientConfig, ClientError, ClientResult,
    ConversationDirectory, LoginRequest, MemoryTokenStore, MessageStore, NotificationBatch,
    NotificationEvent, NotificationFeed, NotificationService, Role,
};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ── Scripted HTTP server ───────────────────────────────────────────────────

/// Serve fixed JSON bodies keyed by path (query string ignored). Each
/// connection handles one request and closes.
async fn serve_routes(routes: HashMap<&'static str, (u16, String)>) -> SocketAddr {
    let routes: Arc<HashMap<&'static str, (u16, String)>> = Arc::new(routes);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let routes = routes.clone();
            tokio::spawn(async move {
                let Some((path, _body)) = read_request(&mut socket).await else {
                    return;
                };
                let (status, body) = routes
                    .get(path.as_str())
                    .cloned()
                    .unwrap_or((404, "{}".to_string()));
                let response = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

struct Scripted {
    status: u16,
    body: String,
    retry_after: Option<u64>,
}

/// Serve a fixed sequence of responses regardless of path, one per
/// request, counting requests. Runs dry into 404s.
async fn serve_script(responses: Vec<Scripted>) -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let responses = Arc::new(Mutex::new(responses));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let counter = hits.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            if read_request(&mut socket).await.is_none() {
                continue;
            }
            counter.fetch_add(1, Ordering::SeqCst);
            let next = {
                let mut responses = responses.lock();
                if responses.is_empty() {
                    Scripted { status: 404, body: "{}".to_string(), retry_after: None }
                } else {
                    responses.remove(0)
                }
            };
            let mut head = format!(
                "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
                next.status,
                next.body.len()
            );
            if let Some(secs) = next.retry_after {
                head.push_str(&format!("Retry-After: {}\r\n", secs));
            }
            let _ = socket.write_all(format!("{}\r\n{}", head, next.body).as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    (addr, hits)
}

/// Serve one connection: respond with chunked-encoding headers, one
/// partial chunk, then drop the socket mid-body.
async fn serve_truncated_stream(first_frame: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let _ = read_request(&mut socket).await;
            let chunk = format!("{:x}\r\n{}\r\n", first_frame.len(), first_frame);
            let response = format!(
                "HTTP/1.1 200 X\r\nContent-Type: text/event-stream\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n{}",
                chunk
            );
            let _ = socket.write_all(response.as_bytes()).await;
            // No terminating 0-length chunk: the client sees a broken body.
            let _ = socket.shutdown().await;
        }
    });
    addr
}

/// Read one HTTP request; returns (path without query, body).
async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<(String, Vec<u8>)> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    let header_end = loop {
        let n = socket.read(&mut tmp).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let lower = line.to_ascii_lowercase();
            lower.strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap_or(0))
        })
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = socket.read(&mut tmp).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
    }

    let path = head
        .lines()
        .next()?
        .split_whitespace()
        .nth(1)?
        .split('?')
        .next()?
        .to_string();
    Some((path, buf[header_end..].to_vec()))
}

fn engine_at(addr: SocketAddr) -> (ApiClient, ChatService) {
    let config = ClientConfig::with_base_url(format!("http://{}", addr));
    let api = ApiClient::new(&config, Arc::new(MemoryTokenStore::new()));
    let store = MessageStore::new();
    let directory = ConversationDirectory::new(api.clone());
    let chat = ChatService::new(api.clone(), store, directory);
    (api, chat)
}

// ── Streaming send ─────────────────────────────────────────────────────────

#[tokio::test]
async fn streaming_send_reconciles_against_live_server() {
    init_logs();
    let stream_body = concat!(
        "data: {\"content\":\"4\"}\n",
        "\n",
        "data: {\"finished\":true,\"conversation_id\":\"conv-9\",",
        "\"user_message_id\":101,\"assistant_message_id\":102}\n",
    );
    let conversations_body = concat!(
        "{\"conversations\":[{\"conversation_id\":\"conv-9\",",
        "\"last_message\":\"4\",\"last_updated\":\"2025-01-01T00:00:00Z\"}]}"
    );
    let addr = serve_routes(HashMap::from([
        ("/chat/send-stream", (200, stream_body.to_string())),
        ("/chat/conversations", (200, conversations_body.to_string())),
    ]))
    .await;
    let (_api, chat) = engine_at(addr);

    let deltas = Arc::new(Mutex::new(String::new()));
    let sink = deltas.clone();
    let outcome = chat
        .send_message_stream("2+2?", move |delta| sink.lock().push_str(delta))
        .await
        .expect("stream should succeed");

    assert_eq!(outcome.content, "4");
    assert!(outcome.finished);
    assert_eq!(*deltas.lock(), "4");

    let messages = chat.store().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].id, 101);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "2+2?");
    assert_eq!(messages[0].conversation_id.as_deref(), Some("conv-9"));
    assert_eq!(messages[1].id, 102);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "4");
    assert_eq!(messages[1].conversation_id.as_deref(), Some("conv-9"));
    assert_eq!(chat.store().current_conversation().as_deref(), Some("conv-9"));

    // Adoption refreshed the directory from the server.
    let listed = chat.directory().snapshot();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].conversation_id, "conv-9");
}

#[tokio::test]
async fn http_error_rolls_back_optimistic_messages() {
    let addr = serve_routes(HashMap::from([(
        "/chat/send-stream",
        (500, "{\"detail\":\"boom\"}".to_string()),
    )]))
    .await;
    let (_api, chat) = engine_at(addr);

    let before = chat.store().len();
    let result = chat.send_message_stream("hello", |_| {}).await;
    match result {
        Err(ClientError::Api { status, .. }) => assert_eq!(status, 500),
        other => panic!("expected API error, got ok={}", other.is_ok()),
    }
    assert_eq!(chat.store().len(), before);
}

#[tokio::test]
async fn mid_stream_disconnect_rolls_back() {
    let addr = serve_truncated_stream("data: {\"content\":\"par\"}\n").await;
    let (_api, chat) = engine_at(addr);

    let result = chat.send_message_stream("hello", |_| {}).await;
    assert!(matches!(result, Err(ClientError::Stream(_))));
    // No trace of the failed send — not even the partial content.
    assert!(chat.store().is_empty());
}

#[tokio::test]
async fn unauthorized_stream_clears_token_and_fires_hook() {
    let addr = serve_routes(HashMap::from([(
        "/chat/send-stream",
        (401, "{\"detail\":\"expired\"}".to_string()),
    )]))
    .await;
    let (api, chat) = engine_at(addr);
    api.token_store().set("stale-token");

    let fired = Arc::new(Mutex::new(false));
    let flag = fired.clone();
    api.on_forced_logout(move || *flag.lock() = true);

    let result = chat.send_message_stream("hello", |_| {}).await;
    assert!(matches!(result, Err(ClientError::Auth(_))));
    assert!(api.token_store().get().is_none());
    assert!(*fired.lock());
    assert!(chat.store().is_empty());
}

// ── Non-streaming chat endpoints ───────────────────────────────────────────

#[tokio::test]
async fn non_streaming_send_reconciles_and_adopts() {
    let send_body = concat!(
        "{\"content\":\"4\",\"conversation_id\":\"conv-3\",",
        "\"user_message_id\":11,\"assistant_message_id\":12}"
    );
    let addr = serve_routes(HashMap::from([
        ("/chat/send", (200, send_body.to_string())),
        ("/chat/conversations", (200, "{\"conversations\":[]}".to_string())),
    ]))
    .await;
    let (_api, chat) = engine_at(addr);

    let response = chat.send_message("2+2?").await.unwrap();
    assert_eq!(response.content, "4");

    let messages = chat.store().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].id, 11);
    assert_eq!(messages[0].content, "2+2?");
    assert_eq!(messages[1].id, 12);
    assert_eq!(messages[1].content, "4");
    assert_eq!(chat.store().current_conversation().as_deref(), Some("conv-3"));
}

#[tokio::test]
async fn non_streaming_send_error_rolls_back() {
    let addr = serve_routes(HashMap::from([(
        "/chat/send",
        (400, "{\"detail\":\"message too long\"}".to_string()),
    )]))
    .await;
    let (_api, chat) = engine_at(addr);

    match chat.send_message("hello").await {
        Err(ClientError::Api { status, .. }) => assert_eq!(status, 400),
        other => panic!("expected API error, got ok={}", other.is_ok()),
    }
    assert!(chat.store().is_empty());
}

#[tokio::test]
async fn open_conversation_loads_history() {
    let history = concat!(
        "{\"messages\":[",
        "{\"id\":1,\"role\":\"user\",\"content\":\"hi\",\"conversation_id\":\"c1\",",
        "\"created_at\":\"2025-01-01T00:00:00Z\"},",
        "{\"id\":2,\"role\":\"assistant\",\"content\":\"hello\",\"conversation_id\":\"c1\",",
        "\"created_at\":\"2025-01-01T00:00:01Z\"}]}"
    );
    let addr = serve_routes(HashMap::from([("/chat/history/c1", (200, history.to_string()))])).await;
    let (_api, chat) = engine_at(addr);

    chat.open_conversation("c1").await.unwrap();
    let messages = chat.store().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(chat.store().current_conversation().as_deref(), Some("c1"));
}

#[tokio::test]
async fn new_conversation_selects_empty_list() {
    let addr = serve_routes(HashMap::from([
        ("/chat/conversations/new", (200, "{\"conversation_id\":\"c7\"}".to_string())),
        ("/chat/conversations", (200, "{\"conversations\":[]}".to_string())),
    ]))
    .await;
    let (_api, chat) = engine_at(addr);

    let id = chat.new_conversation().await.unwrap();
    assert_eq!(id, "c7");
    assert!(chat.store().is_empty());
    assert_eq!(chat.store().current_conversation().as_deref(), Some("c7"));
}

#[tokio::test]
async fn deleting_active_conversation_clears_store() {
    let history = concat!(
        "{\"messages\":[{\"id\":1,\"role\":\"user\",\"content\":\"hi\",",
        "\"conversation_id\":\"c1\",\"created_at\":\"2025-01-01T00:00:00Z\"}]}"
    );
    let addr = serve_routes(HashMap::from([
        ("/chat/history/c1", (200, history.to_string())),
        ("/chat/conversations/c1", (200, "{}".to_string())),
        ("/chat/conversations", (200, "{\"conversations\":[]}".to_string())),
    ]))
    .await;
    let (_api, chat) = engine_at(addr);

    chat.open_conversation("c1").await.unwrap();
    assert!(!chat.store().is_empty());

    chat.delete_conversation("c1").await.unwrap();
    assert!(chat.store().is_empty());
    assert!(chat.store().current_conversation().is_none());
}

// ── Retry policy ───────────────────────────────────────────────────────────

#[tokio::test]
async fn retries_503_with_retry_after_then_succeeds() {
    let ok_body = concat!(
        "{\"conversations\":[{\"conversation_id\":\"c1\",",
        "\"last_message\":\"hi\",\"last_updated\":\"2025-01-01T00:00:00Z\"}]}"
    );
    let (addr, hits) = serve_script(vec![
        Scripted {
            status: 503,
            body: "{\"detail\":\"busy\"}".to_string(),
            retry_after: Some(1),
        },
        Scripted { status: 200, body: ok_body.to_string(), retry_after: None },
    ])
    .await;
    let (_api, chat) = engine_at(addr);

    let listed = chat.directory().refresh().await.expect("second attempt should succeed");
    assert_eq!(listed.len(), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn bad_request_is_not_retried() {
    let (addr, hits) = serve_script(vec![Scripted {
        status: 400,
        body: "{\"detail\":\"bad limit\"}".to_string(),
        retry_after: None,
    }])
    .await;
    let (_api, chat) = engine_at(addr);

    match chat.directory().refresh().await {
        Err(ClientError::Api { status, .. }) => assert_eq!(status, 400),
        other => panic!("expected API error, got ok={}", other.is_ok()),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

// ── Auth round trip ────────────────────────────────────────────────────────

#[tokio::test]
async fn login_stores_bearer_token() {
    let addr = serve_routes(HashMap::from([(
        "/auth/login",
        (
            200,
            "{\"token\":\"tok-1\",\"user_id\":\"u1\",\"is_anonymous\":true}".to_string(),
        ),
    )]))
    .await;
    let (api, _chat) = engine_at(addr);
    let auth = AuthClient::new(api.clone());

    let response = auth.login(&LoginRequest::anonymous()).await.unwrap();
    assert_eq!(response.user_id, "u1");
    assert!(response.is_anonymous);
    assert_eq!(api.token_store().get().as_deref(), Some("tok-1"));
    assert!(auth.has_token());
}

// ── Notification delivery ──────────────────────────────────────────────────

struct ScriptedSource {
    batches: Mutex<Vec<NotificationBatch>>,
}

#[async_trait::async_trait]
impl NotificationSource for ScriptedSource {
    async fn fetch_recent(&self) -> ClientResult<NotificationBatch> {
        let mut batches = self.batches.lock();
        if batches.is_empty() {
            Ok(NotificationBatch {
                events: Vec::new(),
                count: 0,
                timestamp: "2025-01-01T00:00:00Z".into(),
            })
        } else {
            Ok(batches.remove(0))
        }
    }
}

/// Connects, stays "open" briefly, then fails.
struct FlakyChannel;

#[async_trait::async_trait]
impl PushChannel for FlakyChannel {
    async fn connect(&self) -> ClientResult<ByteStream> {
        use futures::StreamExt;
        Ok(futures::stream::once(async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            Err(ClientError::Stream("connection dropped".into()))
        })
        .boxed())
    }
}

fn event(id: &str) -> NotificationEvent {
    NotificationEvent {
        event_id: id.to_string(),
        event_type: "message_received".into(),
        data: serde_json::Value::Null,
        user_id: None,
        conversation_id: None,
        timestamp: "2025-01-01T00:00:00Z".into(),
    }
}

fn batch(ids: &[&str]) -> NotificationBatch {
    NotificationBatch {
        events: ids.iter().map(|id| event(id)).collect(),
        count: ids.len(),
        timestamp: "2025-01-01T00:00:00Z".into(),
    }
}

#[tokio::test]
async fn polling_dispatches_each_event_once_across_overlapping_batches() {
    let source = Arc::new(ScriptedSource {
        batches: Mutex::new(vec![batch(&["e01", "e02"]), batch(&["e02", "e03"])]),
    });
    let service = NotificationService::with_transports(
        source,
        Arc::new(FlakyChannel),
        Duration::from_millis(25),
        false,
    );

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    service.subscribe("message_received", move |e| sink.lock().push(e.event_id.clone()));

    let feed = NotificationFeed::new();
    feed.attach(&service);

    service.start();
    tokio::time::sleep(Duration::from_millis(120)).await;
    service.stop();

    assert_eq!(*seen.lock(), vec!["e01", "e02", "e03"]);
    assert_eq!(feed.len(), 3);
    assert_eq!(service.status().last_event_id.as_deref(), Some("e03"));
}

#[tokio::test]
async fn push_failure_degrades_to_polling() {
    init_logs();
    let service = NotificationService::with_transports(
        Arc::new(ScriptedSource { batches: Mutex::new(Vec::new()) }),
        Arc::new(FlakyChannel),
        Duration::from_millis(50),
        true,
    );

    service.start();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let status = service.status();
    assert!(status.is_push_connected);
    assert!(!status.is_polling);

    // Channel drops at ~150ms; polling must be active within the fixed
    // 1-second fallback delay (plus margin).
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let status = service.status();
    assert!(!status.is_push_connected);
    assert!(status.is_polling);
    service.stop();
}
