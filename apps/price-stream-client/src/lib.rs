#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Price Stream Client - Real-time Price Synchronization
//!
//! Keeps a local price table in sync with a remote market-data feed over a
//! single WebSocket connection. Many consumers declare the symbols they
//! care about; the client subscribes to the union, coalesces bursts of
//! updates into batched snapshots, and recovers from dropped connections
//! on its own.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure state and rules
//!   - `connection`: Connection states, transitions, observable status
//!   - `price`: Price records, pending batch, copy-on-write table
//!   - `subscription`: Ref-counted interest registry and reconciler
//!
//! - **Application**: Ports and session services
//!   - `ports`: The `FeedConnector` transport boundary
//!   - `services`: Debounced reconciliation, update batching, timers
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: WebSocket transport, codec, session loop, consumer facade
//!   - `config`: Environment-driven configuration
//!   - `health`: Health check HTTP endpoint
//!   - `metrics` / `telemetry`: Prometheus and OpenTelemetry
//!
//! # Data Flow
//!
//! ```text
//! consumers ──use_desired──► InterestRegistry ──union──► FeedSession
//!                                                          │    ▲
//!                                  subscribe/unsubscribe ──┘    │
//!                                                           feed server
//!                                                               │
//! consumers ◄──snapshots── PriceTable ◄──batch window── price updates
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no I/O.
pub mod domain;

/// Application layer - Ports and session services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{ConnectionState, FeedStatus};
pub use domain::price::{PriceRecord, PriceSnapshot};
pub use domain::subscription::{ConsumerId, SubscriptionChanges, SubscriptionStats, Symbol};

// Transport port
pub use application::ports::{FeedConnector, FeedFrame, FeedLink, TransportError};

// Feed client
pub use infrastructure::feed::{
    PriceFeed, PriceSubscription, PriceView, SessionConfig, WebSocketConnector,
};

// Configuration
pub use infrastructure::config::{
    ClientConfig, ConfigError, ServerSettings, SyncSettings, WebSocketSettings,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
