//! CDP session: the command/event seam the executor drives, plus a raw
//! WebSocket client that attaches to an already-running Chrome.
//!
//! `CdpClient` never launches or kills a browser; ownership of the process
//! stays with whatever started it (`--remote-debugging-port` must already be
//! in effect).

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use crate::error::{ExecutorError, Result};

/// An active CDP session bound to one page target.
///
/// `call` issues a command and resolves to the command's `result` payload.
/// `subscribe` registers a one-shot listener for a CDP event; it must be
/// registered *before* the action that fires the event. Callers bound both
/// with their own deadlines — neither applies a timeout of its own, so a
/// dropped future is the cancellation mechanism.
pub trait CdpSession: Send + Sync {
    fn call(&self, method: &str, params: Value) -> impl Future<Output = Result<Value>> + Send;

    fn subscribe(&self, method: &str) -> impl Future<Output = oneshot::Receiver<Value>> + Send;
}

type WsSink = futures::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    WsMessage,
>;

/// CDP client over a raw WebSocket for best Chrome compatibility.
pub struct CdpClient {
    ws_tx: Arc<Mutex<WsSink>>,
    /// Command id → one-shot response sender. Filled by the reader task.
    responses: Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>,
    /// CDP event method → one-shot subscribers.
    events: Arc<Mutex<HashMap<String, Vec<oneshot::Sender<Value>>>>>,
    msg_id: AtomicU64,
    ws_url: String,
}

impl CdpClient {
    /// Attach to a running Chrome by its DevTools host/port.
    /// Polls `/json/list`, picks the first "page" target, and connects.
    pub async fn attach(host: &str, port: u16) -> Result<Self> {
        let mut retries = 0u32;
        const MAX_RETRIES: u32 = 30;
        let mut last_error = String::new();

        while retries < MAX_RETRIES {
            let list_url = format!("http://{}:{}/json/list", host, port);
            match reqwest::get(&list_url).await {
                Ok(response) if response.status().is_success() => {
                    match response.json::<Value>().await {
                        Ok(targets) => {
                            let page_target = targets.as_array().and_then(|arr| {
                                arr.iter()
                                    .find(|t| t.get("type").and_then(|v| v.as_str()) == Some("page"))
                            });
                            match page_target
                                .and_then(|t| t.get("webSocketDebuggerUrl"))
                                .and_then(|v| v.as_str())
                            {
                                Some(ws_url) => return Self::connect(ws_url).await,
                                None => last_error = "no page target with a webSocketDebuggerUrl".to_string(),
                            }
                        }
                        Err(e) => last_error = format!("failed to parse target list: {}", e),
                    }
                }
                Ok(response) => last_error = format!("HTTP {}", response.status()),
                Err(e) => last_error = format!("connection error: {}", e),
            }

            retries += 1;
            tracing::debug!("attach retry {}/{}: {}", retries, MAX_RETRIES, last_error);
            tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
        }

        Err(ExecutorError::Transport(format!(
            "failed to reach Chrome DevTools on {}:{} after {} retries: {}",
            host, port, MAX_RETRIES, last_error
        )))
    }

    /// Connect directly to a page target's WebSocket debugger URL.
    pub async fn connect(ws_url: &str) -> Result<Self> {
        tracing::info!("connecting to CDP WebSocket: {}", ws_url);

        let (ws_stream, _) = connect_async(ws_url)
            .await
            .map_err(|e| ExecutorError::Transport(format!("WebSocket connect failed: {}", e)))?;

        let (tx, mut rx) = StreamExt::split(ws_stream);
        let client = Self {
            ws_tx: Arc::new(Mutex::new(tx)),
            responses: Arc::new(Mutex::new(HashMap::new())),
            events: Arc::new(Mutex::new(HashMap::new())),
            msg_id: AtomicU64::new(1),
            ws_url: ws_url.to_string(),
        };

        let responses = Arc::clone(&client.responses);
        let events = Arc::clone(&client.events);
        tokio::spawn(async move {
            while let Some(msg) = StreamExt::next(&mut rx).await {
                match msg {
                    Ok(WsMessage::Text(text)) => {
                        let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                            continue;
                        };
                        if let Some(id) = frame.get("id").and_then(|i| i.as_u64()) {
                            if let Some(sender) = responses.lock().await.remove(&id) {
                                let _ = sender.send(frame);
                            }
                        } else if let Some(method) = frame.get("method").and_then(|m| m.as_str()) {
                            let params =
                                frame.get("params").cloned().unwrap_or(Value::Null);
                            let mut ev = events.lock().await;
                            if let Some(senders) = ev.remove(method) {
                                for sender in senders {
                                    let _ = sender.send(params.clone());
                                }
                            }
                        }
                    }
                    Ok(WsMessage::Close(_)) => {
                        tracing::debug!("CDP WebSocket closed");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!("CDP WebSocket error: {:?}", e);
                    }
                    _ => {}
                }
            }
        });

        // Page and Runtime event streams are needed for navigation waits and
        // evaluation; DOM and Accessibility are driven per-operation.
        client.send_command("Page.enable", json!({})).await?;
        client.send_command("Runtime.enable", json!({})).await?;
        tracing::info!("CDP session established");

        Ok(client)
    }

    /// The WebSocket debugger URL this client is connected to.
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    async fn send_command(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.msg_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.responses.lock().await.insert(id, tx);

        let command = json!({
            "id": id,
            "method": method,
            "params": params,
        });

        {
            let mut tx_guard = self.ws_tx.lock().await;
            tx_guard
                .send(WsMessage::Text(command.to_string()))
                .await
                .map_err(|e| ExecutorError::Transport(format!("{}: send failed: {}", method, e)))?;
        }

        let frame = rx.await.map_err(|_| {
            ExecutorError::Transport(format!("{}: response channel closed", method))
        })?;

        if let Some(err) = frame.get("error") {
            let msg = err.get("message").and_then(|m| m.as_str()).unwrap_or("CDP error");
            return Err(ExecutorError::Transport(format!("{}: {}", method, msg)));
        }
        Ok(frame.get("result").cloned().unwrap_or(Value::Null))
    }
}

impl CdpSession for CdpClient {
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.send_command(method, params).await
    }

    async fn subscribe(&self, method: &str) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        self.events
            .lock()
            .await
            .entry(method.to_string())
            .or_default()
            .push(tx);
        rx
    }
}
