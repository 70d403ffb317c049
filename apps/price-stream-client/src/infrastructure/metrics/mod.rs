//! Prometheus Metrics Module
//!
//! Exposes client metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Messages**: Server messages received by type, malformed payloads
//! - **Directives**: Subscribe/unsubscribe directives sent
//! - **Connection**: State gauge and reconnection attempts
//! - **Batching**: Flush count and flush sizes
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! functions are no-ops until `init_metrics` installs the recorder.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::connection::ConnectionState;
use crate::infrastructure::feed::messages::DirectiveAction;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "price_feed_messages_received_total",
        "Total server messages decoded, by message type"
    );
    describe_counter!(
        "price_feed_malformed_messages_total",
        "Total server payloads dropped as malformed, by reason"
    );
    describe_counter!(
        "price_feed_directives_sent_total",
        "Total subscription directives sent, by action"
    );
    describe_counter!(
        "price_feed_reconnects_total",
        "Total reconnection attempts scheduled"
    );
    describe_gauge!(
        "price_feed_connection_state",
        "Connection state (0=disconnected 1=connecting 2=connected 3=reconnecting 4=failed)"
    );
    describe_gauge!(
        "price_feed_desired_symbols",
        "Number of symbols currently desired by consumers"
    );
    describe_counter!(
        "price_feed_flushes_total",
        "Total batch flushes applied to the price table"
    );
    describe_histogram!(
        "price_feed_flush_size",
        "Number of symbols written per batch flush"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Batch flush trigger labels.
#[derive(Debug, Clone, Copy)]
pub enum FlushKind {
    /// Batch window elapsed.
    Window,
    /// Server bulk update.
    Bulk,
    /// Flush forced by disconnect.
    Disconnect,
}

impl FlushKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Window => "window",
            Self::Bulk => "bulk",
            Self::Disconnect => "disconnect",
        }
    }
}

/// Record a decoded server message.
pub fn record_message_received(kind: &'static str) {
    counter!("price_feed_messages_received_total", "message_type" => kind).increment(1);
}

/// Record dropped payloads.
pub fn record_malformed(reason: &'static str, count: u64) {
    counter!("price_feed_malformed_messages_total", "reason" => reason).increment(count);
}

/// Record a directive sent to the server.
pub fn record_directive(action: DirectiveAction) {
    counter!("price_feed_directives_sent_total", "action" => action.as_str()).increment(1);
}

/// Record a scheduled reconnection attempt.
pub fn record_reconnect() {
    counter!("price_feed_reconnects_total").increment(1);
}

/// Update the connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("price_feed_connection_state").set(f64::from(state.code()));
}

/// Update the desired-symbol gauge.
pub fn set_desired_symbols(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("price_feed_desired_symbols").set(count as f64);
}

/// Record a batch flush.
pub fn record_flush(kind: FlushKind, written: usize) {
    counter!("price_feed_flushes_total", "kind" => kind.as_str()).increment(1);
    #[allow(clippy::cast_precision_loss)]
    histogram!("price_feed_flush_size", "kind" => kind.as_str()).record(written as f64);
}

// =============================================================================
// Tests
// =============================================================================
