//! WebSocket Connector
//!
//! `FeedConnector` adapter over `tokio-tungstenite`. The socket is split
//! into its sink and stream halves and both are mapped onto transport-neutral
//! `FeedFrame`s, so the session never sees tungstenite types.

use std::time::Duration;

use async_trait::async_trait;
use futures::future;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::application::ports::{FeedConnector, FeedFrame, FeedLink, TransportError};

/// Close code reported when the peer sent a close frame without a payload.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Opens WebSocket connections with a handshake timeout.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl WebSocketConnector {
    /// Create a connector with the given handshake timeout.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl FeedConnector for WebSocketConnector {
    async fn open(&self, url: &str) -> Result<FeedLink, TransportError> {
        tracing::debug!(url, "Opening WebSocket connection");

        let (ws_stream, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(url))
                .await
                .map_err(|_| TransportError::Timeout(self.connect_timeout))?
                .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(|e| TransportError::Io(e.to_string()))
            .with(|frame: FeedFrame| future::ready(Ok::<_, TransportError>(to_message(frame))));

        let stream = read.filter_map(|result| {
            future::ready(match result {
                Ok(message) => from_message(message).map(Ok),
                Err(e) => Some(Err(TransportError::Io(e.to_string()))),
            })
        });

        Ok(FeedLink::new(Box::pin(sink), Box::pin(stream)))
    }
}

/// Map an outbound frame onto a WebSocket message.
fn to_message(frame: FeedFrame) -> Message {
    match frame {
        FeedFrame::Text(text) => Message::Text(text.into()),
        FeedFrame::Binary(data) => Message::Binary(data.into()),
        FeedFrame::Ping(data) => Message::Ping(data.into()),
        FeedFrame::Pong(data) => Message::Pong(data.into()),
        FeedFrame::Close { code, reason } => Message::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        })),
    }
}

/// Map an inbound WebSocket message onto a frame; raw frames are skipped.
fn from_message(message: Message) -> Option<FeedFrame> {
    match message {
        Message::Text(text) => Some(FeedFrame::Text(text.as_str().to_owned())),
        Message::Binary(data) => Some(FeedFrame::Binary(data.to_vec())),
        Message::Ping(data) => Some(FeedFrame::Ping(data.to_vec())),
        Message::Pong(data) => Some(FeedFrame::Pong(data.to_vec())),
        Message::Close(frame) => Some(frame.map_or_else(
            || FeedFrame::Close {
                code: NO_STATUS_RECEIVED,
                reason: String::new(),
            },
            |frame| FeedFrame::Close {
                code: u16::from(frame.code),
                reason: frame.reason.as_str().to_owned(),
            },
        )),
        Message::Frame(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::NORMAL_CLOSURE;

    #[test]
    fn text_frames_map_both_ways() {
        let message = to_message(FeedFrame::Text("hello".into()));
        assert_eq!(message, Message::Text("hello".into()));
        assert_eq!(from_message(message), Some(FeedFrame::Text("hello".into())));
    }

    #[test]
    fn close_frame_keeps_code_and_reason() {
        let message = to_message(FeedFrame::normal_close("bye"));
        assert_eq!(
            from_message(message),
            Some(FeedFrame::Close {
                code: NORMAL_CLOSURE,
                reason: "bye".into()
            })
        );
    }

    #[test]
    fn empty_close_reports_no_status() {
        assert_eq!(
            from_message(Message::Close(None)),
            Some(FeedFrame::Close {
                code: NO_STATUS_RECEIVED,
                reason: String::new()
            })
        );
    }

    #[tokio::test]
    async fn unreachable_host_fails_to_connect() {
        let connector = WebSocketConnector::new(Duration::from_secs(5));
        // Port 1 on loopback is never listening
        let err = connector.open("ws://127.0.0.1:1/ws").await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectFailed(_)));
    }
}
