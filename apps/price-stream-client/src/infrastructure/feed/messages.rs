//! Feed Wire Messages
//!
//! JSON message types exchanged with the price feed server.
//!
//! # Client → Server
//!
//! ```json
//! {"action": "subscribe", "stock_codes": ["005930", "000660"]}
//! {"action": "unsubscribe", "stock_codes": ["005930"]}
//! ```
//!
//! # Server → Client
//!
//! Every server message carries a `type` discriminator:
//!
//! - `connection_status`: currently subscribed codes
//! - `subscribe_response` / `unsubscribe_response`: directive outcome
//! - `price_update`: one symbol's latest price
//! - `batch_price_update`: many symbols at once
//! - `error`: application-level error, connection stays open

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize, de};

use crate::domain::price::PriceRecord;
use crate::domain::subscription::Symbol;

// =============================================================================
// Client Directives
// =============================================================================

/// Directive action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectiveAction {
    /// Start streaming the listed codes.
    Subscribe,
    /// Stop streaming the listed codes.
    Unsubscribe,
}

impl DirectiveAction {
    /// Get the action name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

/// A subscription directive sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDirective {
    /// What to do.
    pub action: DirectiveAction,
    /// Affected codes.
    pub stock_codes: Vec<Symbol>,
}

impl ClientDirective {
    /// Subscribe directive.
    #[must_use]
    pub const fn subscribe(stock_codes: Vec<Symbol>) -> Self {
        Self {
            action: DirectiveAction::Subscribe,
            stock_codes,
        }
    }

    /// Unsubscribe directive.
    #[must_use]
    pub const fn unsubscribe(stock_codes: Vec<Symbol>) -> Self {
        Self {
            action: DirectiveAction::Unsubscribe,
            stock_codes,
        }
    }
}

// =============================================================================
// Server Messages
// =============================================================================

/// Decoded server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Server's view of this connection's subscriptions.
    ConnectionStatus(ConnectionStatusMessage),
    /// Outcome of a subscribe directive.
    SubscribeResponse(SubscriptionResponse),
    /// Outcome of an unsubscribe directive.
    UnsubscribeResponse(SubscriptionResponse),
    /// Single price update.
    PriceUpdate(PriceUpdatePayload),
    /// Bulk price update; elements that failed to decode are already dropped.
    BatchPriceUpdate(BatchPriceUpdate),
    /// Application-level error.
    Error(ErrorMessage),
}

impl ServerMessage {
    /// Message type name, for logs and metrics labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionStatus(_) => "connection_status",
            Self::SubscribeResponse(_) => "subscribe_response",
            Self::UnsubscribeResponse(_) => "unsubscribe_response",
            Self::PriceUpdate(_) => "price_update",
            Self::BatchPriceUpdate(_) => "batch_price_update",
            Self::Error(_) => "error",
        }
    }
}

/// `connection_status` message.
///
/// ```json
/// {"type": "connection_status", "subscribed_codes": ["005930"]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConnectionStatusMessage {
    /// Codes the server streams to this connection.
    #[serde(default, alias = "stock_codes")]
    pub subscribed_codes: Vec<Symbol>,
    /// Optional human readable status.
    #[serde(default)]
    pub message: Option<String>,
}

/// `subscribe_response` / `unsubscribe_response` message.
///
/// ```json
/// {"type": "subscribe_response", "success": true, "stock_codes": ["005930"], "subscribed_codes": ["005930"]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SubscriptionResponse {
    /// Whether the directive succeeded; absent means success.
    #[serde(default)]
    pub success: Option<bool>,
    /// Codes named by the directive.
    #[serde(default)]
    pub stock_codes: Vec<Symbol>,
    /// Full subscribed set after the directive, when reported.
    #[serde(default)]
    pub subscribed_codes: Option<Vec<Symbol>>,
    /// Server message, used as the error text on failure.
    #[serde(default)]
    pub message: Option<String>,
}

impl SubscriptionResponse {
    /// Whether the server reported failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.success, Some(false))
    }
}

/// `error` message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorMessage {
    /// Error text.
    #[serde(default)]
    pub message: String,
}

/// Price fields of a `price_update` message.
///
/// ```json
/// {"type": "price_update", "data": {"stock_code": "005930", "current_price": 71200,
///   "change_amount": 300, "change_percent": 0.42, "volume": 1234567,
///   "trading_value": 87900000000, "timestamp": "2024-03-15T09:30:00+09:00", "source": "kis"}}
/// ```
///
/// The payload may also appear flat, without the `data` wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PriceUpdatePayload {
    /// Instrument code.
    pub stock_code: Symbol,
    /// Last traded price.
    pub current_price: Decimal,
    /// Absolute change.
    #[serde(default)]
    pub change_amount: Option<Decimal>,
    /// Percentage change.
    #[serde(default)]
    pub change_percent: Option<Decimal>,
    /// Accumulated volume. Integral floats such as `1234.0` are accepted.
    #[serde(default, deserialize_with = "integral_volume")]
    pub volume: Option<u64>,
    /// Accumulated traded value.
    #[serde(default)]
    pub trading_value: Option<Decimal>,
    /// Observation time.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Upstream source tag.
    #[serde(default)]
    pub source: Option<String>,
}

impl PriceUpdatePayload {
    /// Convert into a domain record.
    ///
    /// Missing numerics become zero; a missing or unparseable timestamp
    /// falls back to `received_at`.
    #[must_use]
    pub fn into_record(self, received_at: DateTime<Utc>) -> PriceRecord {
        let observed_at = self
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(received_at);

        PriceRecord {
            symbol: self.stock_code,
            price: self.current_price,
            change_amount: self.change_amount.unwrap_or_default(),
            change_percent: self.change_percent.unwrap_or_default(),
            volume: self.volume.unwrap_or_default(),
            trading_value: self.trading_value.unwrap_or_default(),
            source: self.source.unwrap_or_default(),
            observed_at,
        }
    }
}

/// Decoded `batch_price_update`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPriceUpdate {
    /// Elements that decoded cleanly.
    pub updates: Vec<PriceUpdatePayload>,
    /// Number of elements dropped as malformed.
    pub dropped: usize,
}

fn integral_volume<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<Decimal>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if !raw.fract().is_zero() {
        return Err(de::Error::custom(format!("volume {raw} is not a whole number")));
    }
    raw.to_u64()
        .map(Some)
        .ok_or_else(|| de::Error::custom(format!("volume {raw} is out of range")))
}

/// Parse RFC 3339, or a zone-less ISO 8601 timestamp taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn directive_wire_format() {
        let directive = ClientDirective::subscribe(vec!["005930".into(), "000660".into()]);
        let json = serde_json::to_string(&directive).unwrap();
        assert_eq!(
            json,
            r#"{"action":"subscribe","stock_codes":["005930","000660"]}"#
        );

        let json = serde_json::to_string(&ClientDirective::unsubscribe(vec!["A".into()])).unwrap();
        assert_eq!(json, r#"{"action":"unsubscribe","stock_codes":["A"]}"#);
    }

    #[test]
    fn payload_defaults_missing_numerics() {
        let payload: PriceUpdatePayload =
            serde_json::from_str(r#"{"stock_code":"005930","current_price":71200}"#).unwrap();
        let received = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();

        let record = payload.into_record(received);

        assert_eq!(record.symbol, "005930");
        assert_eq!(record.price, Decimal::from(71_200));
        assert_eq!(record.volume, 0);
        assert_eq!(record.change_amount, Decimal::ZERO);
        assert_eq!(record.observed_at, received);
    }

    #[test]
    fn volume_accepts_integral_floats() {
        let payload: PriceUpdatePayload = serde_json::from_str(
            r#"{"stock_code":"A","current_price":1,"volume":1234.0}"#,
        )
        .unwrap();
        assert_eq!(payload.volume, Some(1234));

        let payload: PriceUpdatePayload =
            serde_json::from_str(r#"{"stock_code":"A","current_price":1,"volume":null}"#).unwrap();
        assert_eq!(payload.volume, None);

        for bad in ["12.5", "-3"] {
            let json = format!(r#"{{"stock_code":"A","current_price":1,"volume":{bad}}}"#);
            assert!(serde_json::from_str::<PriceUpdatePayload>(&json).is_err());
        }
    }

    #[test]
    fn timestamp_with_offset_is_normalized() {
        let parsed = parse_timestamp("2024-03-15T09:30:00+09:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 15, 0, 30, 0).unwrap());
    }

    #[test]
    fn zoneless_timestamp_is_utc() {
        let parsed = parse_timestamp("2024-03-15T09:30:00.250").unwrap();
        assert_eq!(parsed.timestamp_subsec_millis(), 250);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn connection_status_accepts_alias() {
        let msg: ConnectionStatusMessage =
            serde_json::from_str(r#"{"stock_codes":["A","B"]}"#).unwrap();
        assert_eq!(msg.subscribed_codes, vec!["A", "B"]);
    }

    #[test]
    fn response_success_defaults_to_ok() {
        let response: SubscriptionResponse = serde_json::from_str("{}").unwrap();
        assert!(!response.is_failure());

        let response: SubscriptionResponse =
            serde_json::from_str(r#"{"success":false,"message":"limit"}"#).unwrap();
        assert!(response.is_failure());
    }
}
