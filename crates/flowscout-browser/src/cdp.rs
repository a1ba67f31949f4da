//! DevTools protocol transport.
//!
//! One WebSocket per target (browser or page), JSON-RPC command/response
//! correlation by id, and a buffered event channel for the waiters that
//! care about lifecycle events such as `Page.loadEventFired`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use crate::error::BrowserError;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// An asynchronous DevTools event (`method` + `params`, no `id`).
#[derive(Debug, Clone)]
pub struct DevtoolsEvent {
    pub method: String,
    pub params: Value,
}

#[derive(Debug, serde::Serialize)]
struct CommandFrame<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug)]
struct CommandReply {
    result: Option<Value>,
    error: Option<ReplyError>,
}

#[derive(Debug, serde::Deserialize)]
struct ReplyError {
    code: i64,
    message: String,
}

type PendingMap = HashMap<u64, oneshot::Sender<CommandReply>>;

/// A live DevTools WebSocket connection.
///
/// Commands get auto-incrementing ids; replies are routed back to the
/// issuing caller. Events are pushed onto an unbounded channel consumed by
/// [`DevtoolsConnection::wait_for_event`]; callers that only care about
/// fresh events discard the backlog first with
/// [`DevtoolsConnection::discard_events`].
pub struct DevtoolsConnection {
    next_id: AtomicU64,
    pending: Arc<Mutex<PendingMap>>,
    sink: Mutex<WsSink>,
    events: Mutex<mpsc::UnboundedReceiver<DevtoolsEvent>>,
    reader: tokio::task::JoinHandle<()>,
}

impl DevtoolsConnection {
    /// Connect to a DevTools WebSocket endpoint
    /// (`ws://127.0.0.1:<port>/devtools/page/<target>` or the browser
    /// endpoint printed at Chromium startup).
    pub async fn connect(ws_url: &str) -> Result<Self, BrowserError> {
        debug!(url = ws_url, "connecting DevTools WebSocket");

        let (stream, _) = tokio_tungstenite::connect_async(ws_url).await.map_err(|e| {
            BrowserError::ConnectionFailed {
                url: ws_url.to_string(),
                reason: e.to_string(),
            }
        })?;

        let (sink, source) = stream.split();
        let pending: Arc<Mutex<PendingMap>> = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let pending_for_reader = Arc::clone(&pending);
        let reader = tokio::spawn(async move {
            Self::pump(source, pending_for_reader, event_tx).await;
        });

        Ok(Self {
            next_id: AtomicU64::new(1),
            pending,
            sink: Mutex::new(sink),
            events: Mutex::new(event_rx),
            reader,
        })
    }

    /// Send a command and wait for its reply with the default 30s timeout.
    pub async fn command(&self, method: &str, params: Value) -> Result<Value, BrowserError> {
        self.command_with_timeout(method, params, DEFAULT_COMMAND_TIMEOUT)
            .await
    }

    /// Send a command and wait for its reply.
    pub async fn command_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, BrowserError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = CommandFrame { id, method, params };
        let json = serde_json::to_string(&frame).map_err(|e| BrowserError::Protocol {
            detail: format!("failed to serialize command: {e}"),
        })?;

        trace!(id, method, "sending DevTools command");

        // Register the reply slot before sending so the pump can never race
        // us to an unknown id.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        {
            let mut sink = self.sink.lock().await;
            sink.send(Message::Text(json.into()))
                .await
                .map_err(|e| BrowserError::Protocol {
                    detail: format!("failed to send WebSocket message: {e}"),
                })?;
        }

        let reply = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => {
                return Err(BrowserError::Protocol {
                    detail: "reply channel closed, connection lost".to_string(),
                });
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(BrowserError::CommandTimeout {
                    method: method.to_string(),
                    duration: timeout,
                });
            }
        };

        if let Some(err) = reply.error {
            return Err(BrowserError::CommandFailed {
                code: err.code,
                message: err.message,
            });
        }

        Ok(reply.result.unwrap_or(Value::Null))
    }

    /// Drop every event buffered so far. Used before dispatching an action
    /// whose follow-up waits for a lifecycle event, so a stale
    /// `Page.loadEventFired` from an earlier navigation cannot satisfy the
    /// new wait.
    pub async fn discard_events(&self) {
        let mut events = self.events.lock().await;
        while events.try_recv().is_ok() {}
    }

    /// Wait until an event named `method` arrives.
    pub async fn wait_for_event(
        &self,
        method: &str,
        timeout: Duration,
    ) -> Result<DevtoolsEvent, BrowserError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut events = self.events.lock().await;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(BrowserError::PageLoadTimeout { duration: timeout });
            }

            match tokio::time::timeout(remaining, events.recv()).await {
                Ok(Some(event)) if event.method == method => return Ok(event),
                Ok(Some(_)) => continue,
                Ok(None) => {
                    return Err(BrowserError::Protocol {
                        detail: "WebSocket closed while waiting for event".to_string(),
                    });
                }
                Err(_) => return Err(BrowserError::PageLoadTimeout { duration: timeout }),
            }
        }
    }

    /// Enable a DevTools domain (`Page`, `Runtime`, ...). Most domains only
    /// emit events after an explicit enable.
    pub async fn enable_domain(&self, domain: &str) -> Result<(), BrowserError> {
        self.command(&format!("{domain}.enable"), serde_json::json!({}))
            .await?;
        Ok(())
    }

    /// Background task: routes replies to pending commands and forwards
    /// events to the channel.
    async fn pump(
        mut source: WsSource,
        pending: Arc<Mutex<PendingMap>>,
        event_tx: mpsc::UnboundedSender<DevtoolsEvent>,
    ) {
        while let Some(next) = source.next().await {
            let message = match next {
                Ok(m) => m,
                Err(e) => {
                    warn!(error = %e, "WebSocket read error, stopping pump");
                    break;
                }
            };

            let text = match message {
                Message::Text(t) => t.to_string(),
                Message::Binary(b) => match String::from_utf8(b.to_vec()) {
                    Ok(s) => s,
                    Err(_) => continue,
                },
                Message::Close(_) => {
                    debug!("WebSocket closed by remote");
                    break;
                }
                _ => continue,
            };

            let json: Value = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "unparseable DevTools frame");
                    continue;
                }
            };

            if let Some(id) = json.get("id").and_then(Value::as_u64) {
                let reply = CommandReply {
                    result: json.get("result").cloned(),
                    error: json
                        .get("error")
                        .and_then(|e| serde_json::from_value(e.clone()).ok()),
                };
                if let Some(tx) = pending.lock().await.remove(&id) {
                    let _ = tx.send(reply);
                } else {
                    trace!(id, "reply for unknown command id");
                }
            } else if let Some(event) = frame_as_event(&json) {
                let _ = event_tx.send(event);
            }
        }

        // Fail every in-flight command when the connection drops.
        let mut pending = pending.lock().await;
        for (_, tx) in pending.drain() {
            let _ = tx.send(CommandReply {
                result: None,
                error: Some(ReplyError {
                    code: -1,
                    message: "WebSocket connection closed".to_string(),
                }),
            });
        }
    }
}

impl Drop for DevtoolsConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Split a DevTools frame into event parts, if it is an event.
pub(crate) fn frame_as_event(json: &Value) -> Option<DevtoolsEvent> {
    if json.get("id").is_some() {
        return None;
    }
    Some(DevtoolsEvent {
        method: json.get("method")?.as_str()?.to_string(),
        params: json.get("params").cloned().unwrap_or(Value::Null),
    })
}
