//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `FeedConnector`: Opens the bidirectional message channel to the feed
//!
//! The session only ever sees `FeedFrame`s, so tests can stand in a
//! channel-backed connector for the WebSocket adapter.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, Stream};

/// WebSocket close code for a caller-initiated normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// A transport-level message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFrame {
    /// UTF-8 text payload.
    Text(String),
    /// Binary payload (not part of the feed protocol).
    Binary(Vec<u8>),
    /// Keepalive probe.
    Ping(Vec<u8>),
    /// Keepalive answer.
    Pong(Vec<u8>),
    /// Close handshake.
    Close {
        /// Close code.
        code: u16,
        /// Human readable reason.
        reason: String,
    },
}

impl FeedFrame {
    /// Close frame with the normal-closure code.
    #[must_use]
    pub fn normal_close(reason: impl Into<String>) -> Self {
        Self::Close {
            code: NORMAL_CLOSURE,
            reason: reason.into(),
        }
    }
}

/// Transport failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Opening the connection failed.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// Opening the connection did not finish in time.
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    /// Reading or writing an open connection failed.
    #[error("transport error: {0}")]
    Io(String),

    /// An outbound frame was not accepted in time.
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// The connection is closed.
    #[error("connection closed")]
    Closed,
}

/// Outbound half of an open connection.
pub type FrameSink = Pin<Box<dyn Sink<FeedFrame, Error = TransportError> + Send>>;

/// Inbound half of an open connection. Ends when the peer goes away.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<FeedFrame, TransportError>> + Send>>;

/// An open connection, split into its two halves.
pub struct FeedLink {
    /// Frames to the server.
    pub sink: FrameSink,
    /// Frames from the server.
    pub stream: FrameStream,
}

impl FeedLink {
    /// Bundle a sink and a stream.
    #[must_use]
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

impl std::fmt::Debug for FeedLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedLink").finish_non_exhaustive()
    }
}

/// Opens connections to the market-data feed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedConnector: Send + Sync + 'static {
    /// Open a new connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the connection cannot be established.
    async fn open(&self, url: &str) -> Result<FeedLink, TransportError>;
}
