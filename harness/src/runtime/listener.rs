//! Notification Listener
//!
//! Ephemeral HTTP endpoint bound to one correlation key. The platform under
//! test pushes status changes to it; test cases wait for a given status with
//! a bounded timeout.
//!
//! Events are kept in arrival order. Each wait consumes the first matching
//! event that no earlier wait has taken, so consecutive waits for different
//! statuses compose.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::post,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use shared::CorrelationKey;
use tokio::net::TcpListener;
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;

use crate::config::ListenerConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::runtime::poll::deadline_after;

/// Grace period for in-flight callbacks when closing
const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationEvent {
    pub key: CorrelationKey,
    pub status: String,
    pub received_at: DateTime<Utc>,
    pub payload: Value,
}

#[derive(Debug)]
struct LoggedEvent {
    event: NotificationEvent,
    consumed: bool,
}

/// State shared between the listener handle and its HTTP handler
struct ListenerState {
    key: CorrelationKey,
    status_field: String,
    log: Mutex<Vec<LoggedEvent>>,
    arrivals: Notify,
}

impl ListenerState {
    fn record(&self, status: String, payload: Value) {
        let event = NotificationEvent {
            key: self.key.clone(),
            status,
            received_at: Utc::now(),
            payload,
        };
        tracing::debug!("📨 Notification for '{}': {}", self.key, event.status);

        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LoggedEvent { event, consumed: false });
        self.arrivals.notify_waiters();
    }

    fn take_first(&self, expected: &str) -> Option<NotificationEvent> {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = log
            .iter_mut()
            .find(|entry| !entry.consumed && entry.event.status == expected)?;
        entry.consumed = true;
        Some(entry.event.clone())
    }

    fn snapshot(&self) -> Vec<NotificationEvent> {
        let log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.iter().map(|entry| entry.event.clone()).collect()
    }
}

#[derive(Default)]
struct ServerControl {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

struct ListenerInner {
    state: Arc<ListenerState>,
    url: Url,
    addr: SocketAddr,
    control: Mutex<ServerControl>,
}

impl Drop for ListenerInner {
    fn drop(&mut self) {
        let control = self.control.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = control.task.take() {
            tracing::warn!(
                "🚨 Notification listener for '{}' dropped while open, aborting endpoint {}",
                self.state.key,
                self.addr
            );
            task.abort();
        }
    }
}

/// Handle to one open listener; clones share the same endpoint
#[derive(Clone)]
pub struct NotificationListener {
    inner: Arc<ListenerInner>,
}

impl fmt::Debug for NotificationListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationListener")
            .field("key", &self.inner.state.key)
            .field("url", &self.inner.url.as_str())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl NotificationListener {
    /// Bind an ephemeral endpoint for `key` and start serving callbacks
    pub async fn open(key: CorrelationKey, config: &ListenerConfig) -> HarnessResult<Self> {
        let bind_target = format!("{}:0", config.bind_host);
        let listener = TcpListener::bind(bind_target.as_str())
            .await
            .map_err(|e| HarnessError::bind(bind_target.clone(), e))?;
        let addr = listener.local_addr()?;

        let url = callback_url(config.advertise_host(), addr.port(), &key)?;

        let state = Arc::new(ListenerState {
            key,
            status_field: config.status_field.clone(),
            log: Mutex::new(Vec::new()),
            arrivals: Notify::new(),
        });

        let app = Router::new()
            .route("/notifications/:key", post(receive_notification).put(receive_notification))
            .with_state(state.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server_key = state.key.clone();
        let server_task = tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                tracing::error!("Notification listener for '{}' failed: {}", server_key, e);
            }
        });

        tracing::info!("📡 Notification listener for '{}' at {}", state.key, url);

        Ok(Self {
            inner: Arc::new(ListenerInner {
                state,
                url,
                addr,
                control: Mutex::new(ServerControl {
                    shutdown: Some(shutdown_tx),
                    task: Some(server_task),
                }),
            }),
        })
    }

    /// Callback target to hand to the platform under test
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.addr
    }

    pub fn key(&self) -> &CorrelationKey {
        &self.inner.state.key
    }

    /// Every event received so far, in arrival order
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.inner.state.snapshot()
    }

    pub fn event_count(&self) -> usize {
        self.inner.state.log.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .task
            .is_none()
    }

    /// Wait for the first unconsumed event with status `expected`
    ///
    /// Returns [`HarnessError::Timeout`] once `timeout` has fully elapsed
    /// without a match.
    pub async fn wait_for(&self, expected: &str, timeout: Duration) -> HarnessResult<NotificationEvent> {
        let state = &self.inner.state;
        let deadline = deadline_after(Instant::now(), timeout);

        loop {
            // Register before checking so an arrival between the check and the await still wakes us
            let arrival = state.arrivals.notified();
            tokio::pin!(arrival);
            arrival.as_mut().enable();

            if let Some(event) = state.take_first(expected) {
                tracing::info!("✅ '{}' reached status '{}'", state.key, expected);
                return Ok(event);
            }

            if tokio::time::timeout_at(deadline, arrival).await.is_err() {
                if let Some(event) = state.take_first(expected) {
                    return Ok(event);
                }
                tracing::warn!("⏰ No '{}' notification for '{}' within {:?}", expected, state.key, timeout);
                return Err(HarnessError::timeout(
                    format!("status '{expected}' for '{}'", state.key),
                    timeout,
                ));
            }
        }
    }

    /// Release the endpoint; closing twice is a no-op
    pub async fn close(&self) {
        let (shutdown, task) = {
            let mut control = self.inner.control.lock().unwrap_or_else(PoisonError::into_inner);
            (control.shutdown.take(), control.task.take())
        };

        let Some(mut task) = task else {
            return;
        };

        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(());
        }

        if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
            tracing::warn!("🔨 Listener for '{}' did not stop within {:?}, aborting", self.key(), CLOSE_GRACE);
            task.abort();
        }

        tracing::debug!("🛑 Notification listener for '{}' closed", self.key());
    }
}

fn callback_url(host: &str, port: u16, key: &CorrelationKey) -> HarnessResult<Url> {
    let mut url = Url::parse(&format!("http://{host}:{port}/"))
        .map_err(|e| HarnessError::configuration(format!("invalid advertise host '{host}': {e}")))?;
    url.path_segments_mut()
        .map_err(|_| HarnessError::configuration(format!("advertise host '{host}' cannot carry a path")))?
        .pop_if_empty()
        .extend(["notifications", key.as_str()]);
    Ok(url)
}

fn extract_status(payload: &Value, field: &str) -> Option<String> {
    match payload.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// HTTP handlers

async fn receive_notification(
    State(state): State<Arc<ListenerState>>,
    Path(key): Path<String>,
    body: Bytes,
) -> StatusCode {
    if key != state.key.as_str() {
        tracing::warn!("Notification for unknown key '{}' on listener '{}'", key, state.key);
        return StatusCode::NOT_FOUND;
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!("Unparseable notification for '{}': {}", state.key, e);
            return StatusCode::BAD_REQUEST;
        }
    };

    match extract_status(&payload, &state.status_field) {
        Some(status) => {
            state.record(status, payload);
            StatusCode::OK
        }
        None => {
            tracing::warn!(
                "Notification for '{}' has no '{}' field",
                state.key,
                state.status_field
            );
            StatusCode::BAD_REQUEST
        }
    }
}
