//! Shared fixtures for the integration suites.
//!
//! `ScriptedConnector` stands in for the WebSocket adapter: every accepted
//! open hands the test a `ServerEnd` that sees the client's frames and can
//! push frames back.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;

use price_stream_client::infrastructure::feed::HeartbeatConfig;
use price_stream_client::{FeedConnector, FeedFrame, FeedLink, SessionConfig, TransportError};

/// Session config used by every suite: fast defaults, no heartbeat.
pub fn session_config() -> SessionConfig {
    SessionConfig {
        heartbeat: HeartbeatConfig::disabled(),
        ..SessionConfig::new("ws://feed.test/ws")
    }
}

// =============================================================================
// Connector
// =============================================================================

struct Shared {
    refuse: AtomicBool,
    opens: Mutex<Vec<Instant>>,
    servers: mpsc::UnboundedSender<ServerEnd>,
}

/// Connector whose opens succeed or fail on command.
#[derive(Clone)]
pub struct ScriptedConnector {
    shared: Arc<Shared>,
}

impl ScriptedConnector {
    /// Connector plus the queue of accepted server ends.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        let (servers, accepted) = mpsc::unbounded_channel();
        let connector = Self {
            shared: Arc::new(Shared {
                refuse: AtomicBool::new(false),
                opens: Mutex::new(Vec::new()),
                servers,
            }),
        };
        (connector, accepted)
    }

    /// Make every following open fail.
    pub fn refuse(&self) {
        self.shared.refuse.store(true, Ordering::SeqCst);
    }

    /// Make every following open succeed.
    pub fn accept(&self) {
        self.shared.refuse.store(false, Ordering::SeqCst);
    }

    /// Paused-clock instants of every open attempt.
    pub fn open_times(&self) -> Vec<Instant> {
        self.shared.opens.lock().clone()
    }

    /// Number of open attempts so far.
    pub fn open_count(&self) -> usize {
        self.shared.opens.lock().len()
    }
}

#[async_trait]
impl FeedConnector for ScriptedConnector {
    async fn open(&self, _url: &str) -> Result<FeedLink, TransportError> {
        self.shared.opens.lock().push(Instant::now());
        if self.shared.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed("connection refused".into()));
        }

        let (client_tx, received) = mpsc::unbounded_channel::<FeedFrame>();
        let (to_client, client_rx) = mpsc::unbounded_channel();

        let sink = futures::sink::unfold(client_tx, |tx, frame: FeedFrame| async move {
            tx.send(frame).map_err(|_| TransportError::Closed)?;
            Ok::<_, TransportError>(tx)
        });
        let link = FeedLink::new(Box::pin(sink), Box::pin(UnboundedReceiverStream::new(client_rx)));

        let _ = self.shared.servers.send(ServerEnd {
            received,
            to_client,
        });
        Ok(link)
    }
}

// =============================================================================
// Server End
// =============================================================================

/// Server side of one accepted connection.
pub struct ServerEnd {
    received: mpsc::UnboundedReceiver<FeedFrame>,
    to_client: mpsc::UnboundedSender<Result<FeedFrame, TransportError>>,
}

impl ServerEnd {
    /// Push a JSON message to the client.
    pub fn send(&self, message: &Value) {
        self.send_text(&message.to_string());
    }

    /// Push a raw text frame to the client.
    pub fn send_text(&self, text: &str) {
        let _ = self.to_client.send(Ok(FeedFrame::Text(text.to_string())));
    }

    /// Close with an arbitrary code.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.to_client.send(Ok(FeedFrame::Close {
            code,
            reason: reason.to_string(),
        }));
    }

    /// Next directive the client sent, skipping control frames.
    ///
    /// Returns `None` once the client side is gone.
    pub async fn directive(&mut self) -> Option<Value> {
        while let Some(frame) = self.received.recv().await {
            if let FeedFrame::Text(text) = frame {
                return serde_json::from_str(&text).ok();
            }
        }
        None
    }

    /// Directive already sent, without waiting.
    pub fn try_directive(&mut self) -> Option<Value> {
        while let Ok(frame) = self.received.try_recv() {
            if let FeedFrame::Text(text) = frame {
                return serde_json::from_str(&text).ok();
            }
        }
        None
    }

    /// Every frame the client sent so far.
    pub fn drain(&mut self) -> Vec<FeedFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.received.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

// =============================================================================
// Messages
// =============================================================================

/// Directive as it appears on the wire.
pub fn directive(action: &str, codes: &[&str]) -> Value {
    json!({ "action": action, "stock_codes": codes })
}

/// `price_update` for one symbol.
pub fn price_update(code: &str, price: i64) -> Value {
    json!({
        "type": "price_update",
        "data": {
            "stock_code": code,
            "current_price": price,
            "change_amount": 0,
            "change_percent": 0,
            "volume": 1000,
            "trading_value": 0,
            "timestamp": "2026-10-18T09:00:00Z",
            "source": "test"
        }
    })
}

/// `batch_price_update` wrapping the given `price_update` messages.
pub fn batch_update(updates: &[Value]) -> Value {
    let data: Vec<Value> = updates.iter().map(|u| u["data"].clone()).collect();
    json!({ "type": "batch_price_update", "data": data })
}

/// Let the session drain its queues without moving the paused clock far.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
