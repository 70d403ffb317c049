//! Price Feed Facade
//!
//! The consumer-facing API. A `PriceFeed` spawns one `FeedSession` and is
//! cheap to clone; every clone talks to the same session. Consumers declare
//! interest through `PriceSubscription`s, which are reference counted per
//! symbol in a shared `InterestRegistry`, so one consumer leaving never
//! unsubscribes a symbol another consumer still wants.
//!
//! Nothing here returns errors: connection problems show up in
//! `FeedStatus`, and stale data is recognizable from its timestamps.
//!
//! # Example
//!
//! ```rust,no_run
//! use price_stream_client::{ClientConfig, PriceFeed};
//!
//! # async fn example() {
//! let feed = PriceFeed::new(&ClientConfig::new("wss://feed.example.com/ws"));
//!
//! let mut prices = feed.use_desired(["005930", "000660"], true);
//! while prices.changed().await {
//!     let view = prices.view();
//!     println!("{} records, state {}", view.records.len(), view.connection_status.state);
//! }
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::FeedConnector;
use crate::domain::connection::FeedStatus;
use crate::domain::price::{PriceRecord, PriceSnapshot};
use crate::domain::subscription::{
    ConsumerId, InterestRegistry, SubscriptionChanges, SubscriptionStats, Symbol, sorted,
};
use crate::infrastructure::config::ClientConfig;

use super::session::{FeedSession, SessionCommand, SessionConfig};
use super::websocket::WebSocketConnector;

// =============================================================================
// Price Feed
// =============================================================================

/// Handle to a running feed session.
#[derive(Clone)]
pub struct PriceFeed {
    inner: Arc<FeedInner>,
}

struct FeedInner {
    commands: mpsc::UnboundedSender<SessionCommand>,
    status: watch::Receiver<FeedStatus>,
    snapshots: watch::Receiver<PriceSnapshot>,
    registry: Mutex<InterestRegistry>,
    next_consumer: AtomicU64,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PriceFeed {
    /// Spawn a session over WebSocket using the client configuration.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        let connector = WebSocketConnector::new(config.websocket.connect_timeout);
        Self::spawn(SessionConfig::from_client_config(config), connector)
    }

    /// Spawn a session with a custom connector.
    #[must_use]
    pub fn spawn<C: FeedConnector>(config: SessionConfig, connector: C) -> Self {
        Self::spawn_with_cancel(config, connector, CancellationToken::new())
    }

    /// Spawn a session that also stops when `cancel` fires.
    #[must_use]
    pub fn spawn_with_cancel<C: FeedConnector>(
        config: SessionConfig,
        connector: C,
        cancel: CancellationToken,
    ) -> Self {
        let (session, handle) = FeedSession::new(config, Arc::new(connector), cancel.clone());
        let task = tokio::spawn(session.run());

        Self {
            inner: Arc::new(FeedInner {
                commands: handle.commands,
                status: handle.status,
                snapshots: handle.snapshots,
                registry: Mutex::new(InterestRegistry::default()),
                next_consumer: AtomicU64::new(1),
                cancel,
                task: Mutex::new(Some(task)),
            }),
        }
    }

    /// Current immutable view of the whole price table.
    #[must_use]
    pub fn snapshot(&self) -> PriceSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> FeedStatus {
        self.inner.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    #[must_use]
    pub fn status_receiver(&self) -> watch::Receiver<FeedStatus> {
        self.inner.status.clone()
    }

    /// Receiver notified once per applied batch.
    #[must_use]
    pub fn snapshot_receiver(&self) -> watch::Receiver<PriceSnapshot> {
        self.inner.snapshots.clone()
    }

    /// Register a consumer interested in `symbols`.
    ///
    /// With `auto_subscribe` the interest is declared immediately; otherwise
    /// the subscription stays passive until `subscribe()` is called.
    #[must_use]
    pub fn use_desired<I, S>(&self, symbols: I, auto_subscribe: bool) -> PriceSubscription
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        let consumer = self.inner.next_consumer.fetch_add(1, Ordering::Relaxed);
        let mut subscription = PriceSubscription {
            feed: Arc::clone(&self.inner),
            consumer,
            symbols: dedup(symbols),
            subscribed: false,
            snapshots: self.inner.snapshots.clone(),
            status: self.inner.status.clone(),
        };
        if auto_subscribe {
            subscription.subscribe();
        }
        subscription
    }

    /// Open the connection (no-op while already connecting or connected).
    pub fn connect(&self) {
        self.inner.send(SessionCommand::Connect);
    }

    /// Retry after the session gave up; resets the attempt budget.
    pub fn retry(&self) {
        self.connect();
    }

    /// Close the connection and stay disconnected until `connect()`.
    pub fn disconnect(&self, reason: impl Into<String>) {
        self.inner.send(SessionCommand::Disconnect {
            reason: reason.into(),
        });
    }

    /// Drop retained records for `symbols` from the price table.
    pub fn forget<I, S>(&self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        self.inner.send(SessionCommand::Forget(dedup(symbols)));
    }

    /// Union of every consumer's declared symbols, sorted.
    #[must_use]
    pub fn desired_symbols(&self) -> Vec<Symbol> {
        sorted(&self.inner.registry.lock().desired())
    }

    /// Consumer and symbol counts.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        self.inner.registry.lock().stats()
    }

    /// Stop the session and wait for it to finish.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let task = self.inner.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            tracing::error!(error = %e, "Feed session task failed");
        }
    }
}

impl std::fmt::Debug for PriceFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceFeed")
            .field("status", &*self.inner.status.borrow())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl FeedInner {
    fn send(&self, command: SessionCommand) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Feed session is gone, command dropped");
        }
    }

    /// Apply an interest change and forward the new union if it changed.
    ///
    /// The lock is held while sending so unions reach the session in the
    /// order they were computed.
    fn update_interest(&self, change: impl FnOnce(&mut InterestRegistry) -> SubscriptionChanges) {
        let mut registry = self.registry.lock();
        if change(&mut registry).is_empty() {
            return;
        }
        self.send(SessionCommand::SetDesired(sorted(&registry.desired())));
    }
}

// =============================================================================
// Price Subscription
// =============================================================================

/// What one consumer sees.
#[derive(Debug, Clone)]
pub struct PriceView {
    /// Records for the consumer's symbols that have been seen so far.
    pub records: HashMap<Symbol, PriceRecord>,
    /// Connection status.
    pub connection_status: FeedStatus,
    /// When the price table last changed.
    pub last_updated_at: Option<DateTime<Utc>>,
}

/// One consumer's interest in a set of symbols.
///
/// Dropping the subscription releases its interest.
pub struct PriceSubscription {
    feed: Arc<FeedInner>,
    consumer: ConsumerId,
    symbols: Vec<Symbol>,
    subscribed: bool,
    snapshots: watch::Receiver<PriceSnapshot>,
    status: watch::Receiver<FeedStatus>,
}

impl PriceSubscription {
    /// Current records, status and freshness for this consumer's symbols.
    #[must_use]
    pub fn view(&self) -> PriceView {
        let snapshot = self.snapshots.borrow().clone();
        PriceView {
            records: snapshot.select(&self.symbols),
            connection_status: self.status.borrow().clone(),
            last_updated_at: snapshot.last_updated_at(),
        }
    }

    /// Declared symbols.
    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Whether interest is currently declared.
    #[must_use]
    pub const fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Replace the declared symbols.
    pub fn set_symbols<I, S>(&mut self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        self.symbols = dedup(symbols);
        if self.subscribed {
            let (consumer, symbols) = (self.consumer, &self.symbols);
            self.feed
                .update_interest(|registry| registry.replace(consumer, symbols));
        }
    }

    /// Declare interest in the current symbols.
    pub fn subscribe(&mut self) {
        self.subscribed = true;
        let (consumer, symbols) = (self.consumer, &self.symbols);
        self.feed
            .update_interest(|registry| registry.replace(consumer, symbols));
    }

    /// Withdraw interest without dropping the subscription.
    pub fn unsubscribe(&mut self) {
        self.subscribed = false;
        let consumer = self.consumer;
        self.feed
            .update_interest(|registry| registry.remove_consumer(consumer));
    }

    /// Force an unsubscribe/resubscribe cycle for this consumer's symbols
    /// on the live connection.
    pub fn refetch(&self) {
        if self.subscribed {
            self.feed.send(SessionCommand::Refetch(self.symbols.clone()));
        }
    }

    /// Wait until prices or status change.
    ///
    /// Returns `false` once the session has stopped.
    pub async fn changed(&mut self) -> bool {
        tokio::select! {
            result = self.snapshots.changed() => result.is_ok(),
            result = self.status.changed() => result.is_ok(),
        }
    }
}

impl Drop for PriceSubscription {
    fn drop(&mut self) {
        let consumer = self.consumer;
        self.feed
            .update_interest(|registry| registry.remove_consumer(consumer));
    }
}

impl std::fmt::Debug for PriceSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceSubscription")
            .field("consumer", &self.consumer)
            .field("symbols", &self.symbols)
            .field("subscribed", &self.subscribed)
            .finish_non_exhaustive()
    }
}

/// Collect symbols, keeping the first occurrence of each.
fn dedup<I, S>(symbols: I) -> Vec<Symbol>
where
    I: IntoIterator<Item = S>,
    S: Into<Symbol>,
{
    let mut out: Vec<Symbol> = Vec::new();
    for symbol in symbols.into_iter().map(Into::into) {
        if !out.contains(&symbol) {
            out.push(symbol);
        }
    }
    out
}
