// ── Notify: Delivery Service ───────────────────────────────────────────────
//
// One explicitly constructed service instance owns the active delivery
// strategy and the subscriber registry. No globals: embedders hold a
// clone (Arc internals) and tests build as many isolated instances as
// they like.
//
// Strategies are mutually exclusive — starting one stops the other — and
// start/stop are safe to call redundantly. The push channel degrades to
// polling after a fixed delay on any channel failure; polling never
// upgrades back on its own (the embedder may call `start()` again).
//
// Listener dispatch: for each event, matching specific-type listeners
// first, then all-events listeners, each group in registration order. A
// panicking listener is caught and logged; it never blocks the others.

use futures::StreamExt;
use log::{info, warn};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::atoms::constants::PUSH_FALLBACK_DELAY;
use crate::atoms::types::{NotificationEvent, ServiceStatus};
use crate::client::http::ApiClient;
use crate::client::stream::decode::LineDecoder;
use crate::client::ClientConfig;
use crate::notify::poller::{filter_batch, HttpNotificationSource, NotificationSource};
use crate::notify::push::{parse_push_frame, ControlFrame, HttpPushChannel, PushChannel, PushMessage};

// ── Listener registry ──────────────────────────────────────────────────────

pub type ListenerId = u64;

type Listener = Arc<dyn Fn(&NotificationEvent) + Send + Sync>;

struct Registration {
    id: ListenerId,
    /// `None` subscribes to all events.
    event_type: Option<String>,
    listener: Listener,
}

// ── Service ────────────────────────────────────────────────────────────────

struct ServiceInner {
    source: Arc<dyn NotificationSource>,
    push: Arc<dyn PushChannel>,
    polling_interval: Duration,
    push_enabled: bool,

    listeners: Mutex<Vec<Registration>>,
    next_listener_id: AtomicU64,

    /// Highest event id already delivered to subscribers.
    watermark: Mutex<Option<String>>,

    poll_task: Mutex<Option<JoinHandle<()>>>,
    push_task: Mutex<Option<JoinHandle<()>>>,
    push_connected: AtomicBool,
}

#[derive(Clone)]
pub struct NotificationService {
    inner: Arc<ServiceInner>,
}

impl NotificationService {
    /// Production service over the shared HTTP client.
    pub fn new(api: ApiClient, config: &ClientConfig) -> Self {
        Self::with_transports(
            Arc::new(HttpNotificationSource::new(api.clone())),
            Arc::new(HttpPushChannel::new(api)),
            config.polling_interval,
            config.push_enabled,
        )
    }

    /// Construct with injected transports. Tests script both sides.
    pub fn with_transports(
        source: Arc<dyn NotificationSource>,
        push: Arc<dyn PushChannel>,
        polling_interval: Duration,
        push_enabled: bool,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                source,
                push,
                polling_interval,
                push_enabled,
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
                watermark: Mutex::new(None),
                poll_task: Mutex::new(None),
                push_task: Mutex::new(None),
                push_connected: AtomicBool::new(false),
            }),
        }
    }

    // ── Subscriptions ──────────────────────────────────────────────────

    /// Register a listener for one event type.
    pub fn subscribe(
        &self,
        event_type: impl Into<String>,
        listener: impl Fn(&NotificationEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.register(Some(event_type.into()), Arc::new(listener))
    }

    /// Register a listener for every event.
    pub fn subscribe_all(
        &self,
        listener: impl Fn(&NotificationEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.register(None, Arc::new(listener))
    }

    fn register(&self, event_type: Option<String>, listener: Listener) -> ListenerId {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push(Registration { id, event_type, listener });
        id
    }

    /// Remove a listener. Safe to call with an id that is already gone.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.inner.listeners.lock().retain(|r| r.id != id);
    }

    /// Deliver one event to every matching listener. Exposed so the feed
    /// and tests can inject events without a transport.
    pub fn dispatch(&self, event: &NotificationEvent) {
        // Snapshot outside the lock so a listener may (un)subscribe.
        let (specific, all): (Vec<Listener>, Vec<Listener>) = {
            let listeners = self.inner.listeners.lock();
            (
                listeners
                    .iter()
                    .filter(|r| r.event_type.as_deref() == Some(event.event_type.as_str()))
                    .map(|r| r.listener.clone())
                    .collect(),
                listeners
                    .iter()
                    .filter(|r| r.event_type.is_none())
                    .map(|r| r.listener.clone())
                    .collect(),
            )
        };
        for listener in specific.into_iter().chain(all) {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                warn!("[notify] listener panicked on event {}", event.event_id);
            }
        }
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Start delivery: the push channel when enabled, else polling.
    pub fn start(&self) {
        if self.inner.push_enabled {
            self.start_push();
        } else {
            self.start_polling();
        }
    }

    /// Stop whichever strategy is active. Redundant calls are no-ops.
    pub fn stop(&self) {
        self.stop_polling();
        self.stop_push();
    }

    /// Read-only snapshot, recomputed on demand.
    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            is_polling: task_running(&self.inner.poll_task),
            is_push_connected: self.inner.push_connected.load(Ordering::Relaxed),
            push_supported: self.inner.push_enabled,
            polling_interval_ms: self.inner.polling_interval.as_millis() as u64,
            last_event_id: self.inner.watermark.lock().clone(),
        }
    }

    // ── Polling strategy ───────────────────────────────────────────────

    /// Start the polling loop: immediate fetch, then one per interval.
    /// No-op if polling already runs; stops the push channel (strategies
    /// are mutually exclusive).
    pub fn start_polling(&self) {
        self.stop_push();

        let mut task = self.inner.poll_task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        info!("[notify] polling started (every {:?})", self.inner.polling_interval);

        let service = self.clone();
        *task = Some(tokio::spawn(async move {
            loop {
                service.poll_once().await;
                tokio::time::sleep(service.inner.polling_interval).await;
            }
        }));
    }

    fn stop_polling(&self) {
        if let Some(task) = self.inner.poll_task.lock().take() {
            task.abort();
            info!("[notify] polling stopped");
        }
    }

    /// One poll tick: fetch, watermark-filter, dispatch. Failures are
    /// absorbed — the next tick covers the gap.
    async fn poll_once(&self) {
        let batch = match self.inner.source.fetch_recent().await {
            Ok(batch) => batch,
            Err(e) => {
                warn!("[notify] poll fetch failed: {}", e);
                return;
            }
        };

        let fresh = {
            let mut watermark = self.inner.watermark.lock();
            let (fresh, advanced) = filter_batch(watermark.as_deref(), &batch);
            *watermark = advanced;
            fresh
        };
        for index in fresh {
            self.dispatch(&batch.events[index]);
        }
    }

    // ── Push strategy ──────────────────────────────────────────────────

    /// Connect the push channel. No-op if it already runs; stops polling.
    /// Any channel failure degrades to polling after a fixed delay.
    pub fn start_push(&self) {
        if !self.inner.push_enabled {
            self.start_polling();
            return;
        }
        self.stop_polling();

        let mut task = self.inner.push_task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let service = self.clone();
        *task = Some(tokio::spawn(async move {
            service.run_push_channel().await;
            // Channel gone (error or server close): degrade to polling.
            service.inner.push_connected.store(false, Ordering::Relaxed);
            warn!(
                "[notify] push channel lost — falling back to polling in {:?}",
                PUSH_FALLBACK_DELAY
            );
            tokio::time::sleep(PUSH_FALLBACK_DELAY).await;
            // This task is ending; clear its slot so start_polling's
            // stop_push has nothing to abort (aborting ourselves would
            // cut the fallback short).
            *service.inner.push_task.lock() = None;
            service.start_polling();
        }));
    }

    fn stop_push(&self) {
        if let Some(task) = self.inner.push_task.lock().take() {
            task.abort();
            info!("[notify] push channel stopped");
        }
        self.inner.push_connected.store(false, Ordering::Relaxed);
    }

    /// Read the push channel until it fails or closes.
    async fn run_push_channel(&self) {
        let stream = match self.inner.push.connect().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("[notify] push connect failed: {}", e);
                return;
            }
        };
        self.inner.push_connected.store(true, Ordering::Relaxed);
        info!("[notify] push channel open");

        let mut stream = stream;
        let mut decoder = LineDecoder::new();
        while let Some(item) = stream.next().await {
            let data = match item {
                Ok(data) => data,
                Err(e) => {
                    warn!("[notify] push read failed: {}", e);
                    return;
                }
            };
            for line in decoder.feed(&data) {
                match parse_push_frame(&line) {
                    Some(PushMessage::Control(ControlFrame::Connected)) => {
                        info!("[notify] push channel confirmed by server");
                    }
                    Some(PushMessage::Control(ControlFrame::Heartbeat)) => {}
                    Some(PushMessage::Event(event)) => self.dispatch(&event),
                    None => {}
                }
            }
        }
        // Clean server close — a final unterminated frame may remain.
        if let Some(line) = decoder.flush() {
            if let Some(PushMessage::Event(event)) = parse_push_frame(&line) {
                self.dispatch(&event);
            }
        }
        info!("[notify] push channel closed by server");
    }
}

fn task_running(slot: &Mutex<Option<JoinHandle<()>>>) -> bool {
    slot.lock().as_ref().is_some_and(|t| !t.is_finished())
}

// ── Tests ──────────────────────────────────────────────────────────────────
