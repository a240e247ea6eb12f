//! Chrome DevTools Protocol over a websocket
//!
//! Requests carry an increasing id; the reader task resolves the matching
//! pending oneshot when the response arrives. Events are only logged.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, trace, warn};

use crate::errors::{KeepaliveError, Result};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

type CallResult = std::result::Result<Value, String>;
type PendingMap = HashMap<u64, oneshot::Sender<CallResult>>;
type Pending = Arc<Mutex<PendingMap>>;

#[derive(Debug, Deserialize)]
struct CdpError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Incoming {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<CdpError>,
    method: Option<String>,
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

pub struct CdpConnection {
    sender: mpsc::UnboundedSender<Message>,
    pending: Pending,
    next_id: AtomicU64,
    call_timeout: Duration,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl CdpConnection {
    pub async fn connect(ws_url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(ws_url)
            .await
            .map_err(|e| KeepaliveError::Browser(format!("devtools connect {ws_url}: {e}")))?;
        debug!(ws_url, "connected to devtools");

        let (mut sink, mut stream) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    warn!("devtools send error: {}", e);
                    break;
                }
            }
        });

        let reader_pending = pending.clone();
        let reader = tokio::spawn(async move {
            while let Some(Ok(msg)) = stream.next().await {
                if !msg.is_text() {
                    continue;
                }
                let txt = msg.into_text().unwrap_or_default();
                let incoming = match serde_json::from_str::<Incoming>(&txt) {
                    Ok(incoming) => incoming,
                    Err(e) => {
                        warn!("invalid devtools message: {}", e);
                        continue;
                    }
                };
                match incoming.id {
                    Some(id) => {
                        if let Some(tx) = reader_pending.lock().await.remove(&id) {
                            let _ = tx.send(match incoming.error {
                                Some(err) => Err(format!("{} ({})", err.message, err.code)),
                                None => Ok(incoming.result.unwrap_or(Value::Null)),
                            });
                        }
                    }
                    None => {
                        trace!(
                            method = incoming.method.as_deref().unwrap_or(""),
                            session = incoming.session_id.as_deref().unwrap_or(""),
                            "devtools event"
                        );
                    }
                }
            }
            // connection closed: fail whatever is still waiting
            for (_, tx) in reader_pending.lock().await.drain() {
                let _ = tx.send(Err("devtools connection closed".to_string()));
            }
        });

        Ok(Self {
            sender: tx,
            pending,
            next_id: AtomicU64::new(1),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            writer,
            reader,
        })
    }

    /// Send one command and wait for its response.
    pub async fn call(&self, method: &str, params: Value, session_id: Option<&str>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut request = json!({ "id": id, "method": method, "params": params });
        if let Some(session_id) = session_id {
            request["sessionId"] = Value::String(session_id.to_string());
        }

        let (tx, rx) = oneshot::channel::<CallResult>();
        self.pending.lock().await.insert(id, tx);
        trace!(id, method, "devtools call");

        if self.sender.send(Message::Text(request.to_string())).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(KeepaliveError::Browser(format!(
                "{method}: devtools connection is closed"
            )));
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(KeepaliveError::Browser(format!("{method}: {e}"))),
            Ok(Err(_)) => Err(KeepaliveError::Browser(format!("{method}: response dropped"))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(KeepaliveError::Timeout(format!(
                    "{method} after {:?}",
                    self.call_timeout
                )))
            }
        }
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.writer.abort();
        self.reader.abort();
    }
}
