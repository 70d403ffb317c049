//! Feed Codec
//!
//! JSON encoding for client directives and decoding for server messages.
//! Server messages are inspected as raw `serde_json::Value`s first and
//! dispatched on their `type` field, so one bad element of a bulk update
//! does not spoil the rest.

use serde_json::Value;

use crate::infrastructure::feed::messages::{
    BatchPriceUpdate, ClientDirective, ConnectionStatusMessage, ErrorMessage, PriceUpdatePayload,
    ServerMessage, SubscriptionResponse,
};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Message has no `type` field.
    #[error("message has no type field")]
    MissingType,

    /// Unknown message type.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

impl CodecError {
    /// Short reason label for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::MissingType => "missing_type",
            Self::UnknownMessageType(_) => "unknown_type",
            Self::InvalidFormat(_) => "invalid_format",
        }
    }
}

/// JSON codec for the price feed.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame into a server message.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object, has no known
    /// `type`, or its payload does not match that type.
    pub fn decode(&self, text: &str) -> Result<ServerMessage, CodecError> {
        let value: Value = serde_json::from_str(text.trim())?;
        if !value.is_object() {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {}",
                preview(text)
            )));
        }

        let msg_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(CodecError::MissingType)?
            .to_string();

        match msg_type.as_str() {
            "connection_status" => {
                let m: ConnectionStatusMessage = serde_json::from_value(value)?;
                Ok(ServerMessage::ConnectionStatus(m))
            }
            "subscribe_response" => {
                let m: SubscriptionResponse = serde_json::from_value(value)?;
                Ok(ServerMessage::SubscribeResponse(m))
            }
            "unsubscribe_response" => {
                let m: SubscriptionResponse = serde_json::from_value(value)?;
                Ok(ServerMessage::UnsubscribeResponse(m))
            }
            "price_update" => Ok(ServerMessage::PriceUpdate(Self::decode_price(value)?)),
            "batch_price_update" => Ok(ServerMessage::BatchPriceUpdate(Self::decode_batch(
                value,
            )?)),
            "error" => {
                let m: ErrorMessage = serde_json::from_value(value)?;
                Ok(ServerMessage::Error(m))
            }
            _ => Err(CodecError::UnknownMessageType(msg_type)),
        }
    }

    /// Encode a directive to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self, directive: &ClientDirective) -> Result<String, CodecError> {
        Ok(serde_json::to_string(directive)?)
    }

    /// Price payload, either wrapped in `data` or flat.
    fn decode_price(mut value: Value) -> Result<PriceUpdatePayload, CodecError> {
        let payload = match value.get_mut("data") {
            Some(data) if data.is_object() => data.take(),
            _ => value,
        };
        Ok(serde_json::from_value(payload)?)
    }

    /// Bulk payload under `data` (or `updates`), dropping bad elements.
    fn decode_batch(mut value: Value) -> Result<BatchPriceUpdate, CodecError> {
        let elements = ["data", "updates"]
            .into_iter()
            .find_map(|key| match value.get_mut(key) {
                Some(Value::Array(items)) => Some(std::mem::take(items)),
                _ => None,
            })
            .ok_or_else(|| {
                CodecError::InvalidFormat("batch_price_update without data array".to_string())
            })?;

        let mut batch = BatchPriceUpdate::default();
        for element in elements {
            match Self::decode_price(element) {
                Ok(update) => batch.updates.push(update),
                Err(e) => {
                    tracing::debug!(error = %e, "Dropping malformed batch element");
                    batch.dropped += 1;
                }
            }
        }
        Ok(batch)
    }
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}
