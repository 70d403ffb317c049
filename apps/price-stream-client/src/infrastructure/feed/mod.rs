//! Price Feed Client
//!
//! WebSocket client for the price feed server.
//!
//! # Components
//!
//! - `client`: Consumer facade (`PriceFeed`, `PriceSubscription`)
//! - `session`: Connection-owning event loop
//! - `websocket`: tokio-tungstenite transport
//! - `codec`: JSON encode/decode of feed messages
//! - `messages`: Wire message types
//! - `reconnect`: Exponential backoff policy
//! - `heartbeat`: Ping/pong liveness monitor

pub mod client;
pub mod codec;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;
pub mod session;
pub mod websocket;

pub use client::{PriceFeed, PriceSubscription, PriceView};
pub use codec::{CodecError, JsonCodec};
pub use heartbeat::{HeartbeatAction, HeartbeatConfig, HeartbeatMonitor};
pub use messages::{ClientDirective, DirectiveAction, PriceUpdatePayload, ServerMessage};
pub use reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
pub use session::{FeedSession, SessionCommand, SessionConfig, SessionHandle};
pub use websocket::WebSocketConnector;
