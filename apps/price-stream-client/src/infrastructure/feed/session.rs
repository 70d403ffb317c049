//! Feed Session
//!
//! The single task that owns the feed connection and every piece of mutable
//! session state: the connection state machine, the reconnection policy,
//! the subscription reconciler, the update batcher and the heartbeat.
//!
//! The session is a cooperative event loop. Each iteration selects exactly
//! one event (a command, the outcome of an in-flight open, one of four
//! deadlines, or an inbound frame) and handles it to completion before the
//! next. Deadlines are polled ahead of inbound frames so a busy feed cannot
//! hold back a flush. Opening a connection never blocks the loop; the open
//! future is polled alongside everything else, and every outbound write is
//! bounded by `write_timeout`.
//!
//! ```text
//!   PriceFeed ──commands──► FeedSession ──directives──► server
//!       ▲                       │  ▲
//!       └── watch (status,      │  └──── frames ◄────── server
//!            snapshots) ◄───────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::ports::{FeedConnector, FeedFrame, FeedLink, TransportError};
use crate::application::services::{
    DEFAULT_BATCH_WINDOW, DEFAULT_DEBOUNCE, Deadline, SubscriptionReconciler, UpdateBatcher,
};
use crate::domain::connection::{ConnectionState, FeedStatus};
use crate::domain::price::PriceSnapshot;
use crate::domain::subscription::{Symbol, sorted};
use crate::infrastructure::config::ClientConfig;
use crate::infrastructure::metrics::{self, FlushKind};

use super::codec::JsonCodec;
use super::heartbeat::{HeartbeatAction, HeartbeatConfig, HeartbeatMonitor};
use super::messages::{ClientDirective, ServerMessage};
use super::reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};

// =============================================================================
// Configuration
// =============================================================================

/// Default bound on a single outbound write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Session tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Feed URL passed to the connector.
    pub url: String,
    /// Reconnection backoff.
    pub reconnect: ReconnectConfig,
    /// Heartbeat pings.
    pub heartbeat: HeartbeatConfig,
    /// Debounce window for reconciliation passes.
    pub debounce: Duration,
    /// Coalescing window for price updates.
    pub batch_window: Duration,
    /// Open the connection on the first non-empty desired set.
    pub auto_connect: bool,
    /// Time allowed for one outbound frame before the link counts as lost.
    pub write_timeout: Duration,
    /// Time allowed for the close frame on disconnect.
    pub close_timeout: Duration,
}

impl SessionConfig {
    /// Defaults for everything but the URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            debounce: DEFAULT_DEBOUNCE,
            batch_window: DEFAULT_BATCH_WINDOW,
            auto_connect: true,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            close_timeout: Duration::from_secs(1),
        }
    }

    /// Build from the client configuration.
    #[must_use]
    pub fn from_client_config(config: &ClientConfig) -> Self {
        Self {
            url: config.url.clone(),
            reconnect: ReconnectConfig::from_websocket_settings(&config.websocket),
            heartbeat: HeartbeatConfig::from_websocket_settings(&config.websocket),
            debounce: config.sync.debounce,
            batch_window: config.sync.batch_window,
            auto_connect: config.sync.auto_connect,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            close_timeout: Duration::from_secs(1),
        }
    }
}

// =============================================================================
// Commands and Events
// =============================================================================

/// Requests from facade handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Replace the desired symbol set.
    SetDesired(Vec<Symbol>),
    /// Unsubscribe and resubscribe the given symbols on the live connection.
    Refetch(Vec<Symbol>),
    /// Open the connection (manual connect or retry).
    Connect,
    /// Close the connection and suppress automatic recovery.
    Disconnect {
        /// Close reason sent to the server.
        reason: String,
    },
    /// Drop retained records for the given symbols.
    Forget(Vec<Symbol>),
}

/// One thing that happened, selected by the event loop.
enum SessionEvent {
    Cancelled,
    Command(Option<SessionCommand>),
    Opened(Result<FeedLink, TransportError>),
    Frame(Option<Result<FeedFrame, TransportError>>),
    ReconnectDue,
    ReconcileDue,
    FlushDue,
    HeartbeatDue,
}

type OpenFuture = BoxFuture<'static, Result<FeedLink, TransportError>>;

/// Channels a facade uses to talk to a running session.
#[derive(Debug)]
pub struct SessionHandle {
    /// Command sender.
    pub commands: mpsc::UnboundedSender<SessionCommand>,
    /// Connection status.
    pub status: watch::Receiver<FeedStatus>,
    /// Price snapshots, one per flush.
    pub snapshots: watch::Receiver<PriceSnapshot>,
}

// =============================================================================
// Feed Session
// =============================================================================

/// Connection-owning session actor.
pub struct FeedSession<C: FeedConnector> {
    id: Uuid,
    config: SessionConfig,
    connector: Arc<C>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    cancel: CancellationToken,
    status: FeedStatus,
    status_tx: watch::Sender<FeedStatus>,
    codec: JsonCodec,
    policy: ReconnectPolicy,
    reconciler: SubscriptionReconciler,
    batcher: UpdateBatcher,
    heartbeat: HeartbeatMonitor,
    reconnect_timer: Deadline,
    link: Option<FeedLink>,
    pending_open: Option<OpenFuture>,
    auto_connect_suppressed: bool,
}

impl<C: FeedConnector> FeedSession<C> {
    /// Create a session and the handle used to drive it.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        connector: Arc<C>,
        cancel: CancellationToken,
    ) -> (Self, SessionHandle) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(FeedStatus::default());
        let (snapshot_tx, snapshot_rx) = watch::channel(PriceSnapshot::default());

        let session = Self {
            id: Uuid::new_v4(),
            policy: ReconnectPolicy::new(config.reconnect.clone()),
            reconciler: SubscriptionReconciler::new(config.debounce),
            batcher: UpdateBatcher::new(config.batch_window, snapshot_tx),
            heartbeat: HeartbeatMonitor::new(config.heartbeat.clone()),
            config,
            connector,
            commands,
            cancel,
            status: FeedStatus::default(),
            status_tx,
            codec: JsonCodec::new(),
            reconnect_timer: Deadline::new(),
            link: None,
            pending_open: None,
            auto_connect_suppressed: false,
        };

        let handle = SessionHandle {
            commands: command_tx,
            status: status_rx,
            snapshots: snapshot_rx,
        };

        (session, handle)
    }

    /// Run until cancelled or every handle is dropped.
    pub async fn run(mut self) {
        tracing::info!(session_id = %self.id, url = %self.config.url, "Feed session started");
        metrics::set_connection_state(self.status.state);

        loop {
            let event = tokio::select! {
                biased;
                () = self.cancel.cancelled() => SessionEvent::Cancelled,
                command = self.commands.recv() => SessionEvent::Command(command),
                result = open_result(&mut self.pending_open) => SessionEvent::Opened(result),
                () = self.reconnect_timer.elapsed() => SessionEvent::ReconnectDue,
                () = self.reconciler.timer().elapsed() => SessionEvent::ReconcileDue,
                () = self.batcher.timer().elapsed() => SessionEvent::FlushDue,
                () = self.heartbeat.timer().elapsed() => SessionEvent::HeartbeatDue,
                frame = next_frame(&mut self.link) => SessionEvent::Frame(frame),
            };

            match event {
                SessionEvent::Cancelled | SessionEvent::Command(None) => {
                    self.disconnect("session shutdown").await;
                    self.publish_status();
                    break;
                }
                SessionEvent::Command(Some(command)) => self.on_command(command).await,
                SessionEvent::Opened(result) => {
                    self.pending_open = None;
                    self.on_opened(result).await;
                }
                SessionEvent::Frame(frame) => self.on_frame(frame).await,
                SessionEvent::ReconnectDue => {
                    if self.reconnect_timer.fire() {
                        self.start_open();
                    }
                }
                SessionEvent::ReconcileDue => self.on_reconcile_due().await,
                SessionEvent::FlushDue => {
                    if self.batcher.due() {
                        let written = self.batcher.flush();
                        metrics::record_flush(FlushKind::Window, written);
                    }
                }
                SessionEvent::HeartbeatDue => self.on_heartbeat_due().await,
            }

            self.publish_status();
        }

        tracing::info!(session_id = %self.id, "Feed session stopped");
    }

    // =========================================================================
    // Commands
    // =========================================================================

    async fn on_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::SetDesired(symbols) => {
                let changed = self.reconciler.set_desired(symbols);
                let desired = self.reconciler.state().desired().len();
                metrics::set_desired_symbols(desired);
                tracing::debug!(desired, changed, "Desired symbols updated");

                if self.config.auto_connect
                    && !self.auto_connect_suppressed
                    && desired > 0
                    && self.status.state == ConnectionState::Disconnected
                {
                    self.connect();
                }
            }
            SessionCommand::Refetch(symbols) => self.refetch(&symbols).await,
            SessionCommand::Connect => {
                self.auto_connect_suppressed = false;
                self.connect();
            }
            SessionCommand::Disconnect { reason } => self.disconnect(&reason).await,
            SessionCommand::Forget(symbols) => {
                let removed = self.batcher.forget(&symbols);
                tracing::debug!(requested = symbols.len(), removed, "Forgot price records");
            }
        }
    }

    /// Open the connection from `Disconnected` or `Failed`.
    fn connect(&mut self) {
        match self.status.state {
            ConnectionState::Disconnected => {}
            ConnectionState::Failed => self.policy.reset(),
            state => {
                tracing::debug!(%state, "Connect ignored, connection already active");
                return;
            }
        }

        self.status.reconnect_attempt = 0;
        self.set_state(ConnectionState::Connecting);
        self.start_open();
    }

    fn start_open(&mut self) {
        let connector = Arc::clone(&self.connector);
        let url = self.config.url.clone();
        tracing::info!(
            session_id = %self.id,
            url = %url,
            attempt = self.policy.attempt_count(),
            "Opening feed connection"
        );
        self.pending_open = Some(Box::pin(async move { connector.open(&url).await }));
    }

    async fn disconnect(&mut self, reason: &str) {
        self.reconnect_timer.cancel();
        self.pending_open = None;
        self.heartbeat.stop();

        if let Some(mut link) = self.link.take() {
            let close = link.sink.send(FeedFrame::normal_close(reason));
            match tokio::time::timeout(self.config.close_timeout, close).await {
                Ok(Ok(())) => tracing::debug!(reason, "Close frame sent"),
                Ok(Err(e)) => tracing::debug!(error = %e, "Close frame not delivered"),
                Err(_) => tracing::debug!("Close frame timed out"),
            }
        }

        let written = self.batcher.flush();
        if written > 0 {
            metrics::record_flush(FlushKind::Disconnect, written);
        }

        self.auto_connect_suppressed = true;
        if self.status.state == ConnectionState::Disconnected {
            return;
        }

        self.policy.reset();
        self.status.reconnect_attempt = 0;
        self.status.acknowledged_symbols = 0;
        self.set_state(ConnectionState::Disconnected);
        tracing::info!(session_id = %self.id, reason, "Feed disconnected");
    }

    async fn refetch(&mut self, symbols: &[Symbol]) {
        if !self.status.state.is_connected() {
            tracing::debug!("Refetch ignored while not connected");
            return;
        }

        let mut subset = self.reconciler.state().reconciled_subset(symbols);
        subset.sort();
        subset.dedup();
        if subset.is_empty() {
            return;
        }

        tracing::debug!(symbols = subset.len(), "Refetching symbols");
        if let Err(e) = self
            .send_directive(ClientDirective::unsubscribe(subset.clone()))
            .await
        {
            self.on_link_lost(e.to_string());
            return;
        }
        if let Err(e) = self.send_directive(ClientDirective::subscribe(subset)).await {
            self.on_link_lost(e.to_string());
        }
    }

    // =========================================================================
    // Connection Lifecycle
    // =========================================================================

    async fn on_opened(&mut self, result: Result<FeedLink, TransportError>) {
        let link = match result {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "Feed connection failed");
                self.status.last_error = Some(e.to_string());
                self.schedule_reconnect();
                return;
            }
        };

        self.link = Some(link);
        self.policy.reset();
        self.status.last_error = None;
        self.status.reconnect_attempt = 0;
        self.status.last_connected_at = Some(Utc::now());
        self.status.acknowledged_symbols = 0;
        self.set_state(ConnectionState::Connected);
        self.heartbeat.start();

        let symbols = self.reconciler.resync();
        tracing::info!(
            session_id = %self.id,
            symbols = symbols.len(),
            "Feed connected, restoring subscriptions"
        );
        if symbols.is_empty() {
            return;
        }
        if let Err(e) = self.send_directive(ClientDirective::subscribe(symbols)).await {
            self.on_link_lost(e.to_string());
        }
    }

    /// Any close the client did not initiate.
    fn on_link_lost(&mut self, reason: String) {
        tracing::warn!(session_id = %self.id, reason = %reason, "Feed connection lost");
        self.status.last_error = Some(reason);
        self.status.acknowledged_symbols = 0;
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        self.link = None;
        self.pending_open = None;
        self.heartbeat.stop();

        if let Some(delay) = self.policy.next_delay() {
            let attempt = self.policy.attempt_count();
            self.status.reconnect_attempt = attempt;
            self.set_state(ConnectionState::Reconnecting);
            self.reconnect_timer.arm(delay);
            metrics::record_reconnect();
            tracing::info!(
                session_id = %self.id,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Reconnect scheduled"
            );
        } else {
            let error = ReconnectError::MaxAttemptsExceeded(self.policy.max_attempts());
            tracing::error!(
                session_id = %self.id,
                last_error = ?self.status.last_error,
                "{error}"
            );
            self.status.last_error = Some(error.to_string());
            self.set_state(ConnectionState::Failed);
        }
    }

    // =========================================================================
    // Inbound Traffic
    // =========================================================================

    async fn on_frame(&mut self, frame: Option<Result<FeedFrame, TransportError>>) {
        let frame = match frame {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                self.on_link_lost(e.to_string());
                return;
            }
            None => {
                self.on_link_lost("connection closed by server".to_string());
                return;
            }
        };

        self.heartbeat.record_traffic();
        match frame {
            FeedFrame::Text(text) => self.on_message(&text),
            FeedFrame::Binary(data) => {
                tracing::warn!(bytes = data.len(), "Dropping unexpected binary frame");
                metrics::record_malformed("binary", 1);
            }
            FeedFrame::Ping(data) => {
                if let Err(e) = self.send_frame(FeedFrame::Pong(data)).await {
                    self.on_link_lost(e.to_string());
                }
            }
            FeedFrame::Pong(_) => {}
            FeedFrame::Close { code, reason } => {
                self.on_link_lost(format!("server closed connection ({code}): {reason}"));
            }
        }
    }

    fn on_message(&mut self, text: &str) {
        let message = match self.codec.decode(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed feed message");
                metrics::record_malformed(e.reason(), 1);
                return;
            }
        };
        metrics::record_message_received(message.kind());

        match message {
            ServerMessage::ConnectionStatus(status) => {
                self.on_acknowledged(status.subscribed_codes);
            }
            ServerMessage::SubscribeResponse(response)
            | ServerMessage::UnsubscribeResponse(response) => {
                if response.is_failure() {
                    let error = response
                        .message
                        .clone()
                        .unwrap_or_else(|| "subscription request rejected".to_string());
                    tracing::warn!(codes = ?response.stock_codes, error = %error, "Server rejected directive");
                    self.status.last_error = Some(error);
                }
                if let Some(codes) = response.subscribed_codes {
                    self.on_acknowledged(codes);
                }
            }
            ServerMessage::PriceUpdate(update) => {
                self.batcher.add(update.into_record(Utc::now()));
            }
            ServerMessage::BatchPriceUpdate(batch) => {
                if batch.dropped > 0 {
                    tracing::warn!(dropped = batch.dropped, "Dropped malformed batch elements");
                    metrics::record_malformed(
                        "batch_element",
                        u64::try_from(batch.dropped).unwrap_or(u64::MAX),
                    );
                }
                let received_at = Utc::now();
                let written = self
                    .batcher
                    .merge_now(batch.updates.into_iter().map(|u| u.into_record(received_at)));
                metrics::record_flush(FlushKind::Bulk, written);
            }
            ServerMessage::Error(error) => {
                tracing::warn!(error = %error.message, "Feed server reported an error");
                self.status.last_error = Some(error.message);
            }
        }
    }

    fn on_acknowledged(&mut self, codes: Vec<Symbol>) {
        self.status.acknowledged_symbols = codes.len();
        let missing = self.reconciler.acknowledge(codes);
        if !missing.is_empty() {
            tracing::debug!(?missing, "Server has not acknowledged reconciled symbols");
        }
    }

    // =========================================================================
    // Deadlines
    // =========================================================================

    async fn on_reconcile_due(&mut self) {
        let Some(changes) = self.reconciler.take_pass() else {
            return;
        };
        if changes.is_empty() {
            return;
        }

        if !self.status.state.is_connected() || self.link.is_none() {
            tracing::debug!(
                subscribe = changes.subscribe.len(),
                unsubscribe = changes.unsubscribe.len(),
                "Offline, deferring directives to next connect"
            );
            self.reconciler.commit();
            return;
        }

        let unsubscribe = sorted(&changes.unsubscribe);
        let subscribe = sorted(&changes.subscribe);
        tracing::debug!(
            subscribe = subscribe.len(),
            unsubscribe = unsubscribe.len(),
            "Reconciling subscriptions"
        );

        let mut directives = Vec::with_capacity(2);
        if !unsubscribe.is_empty() {
            directives.push(ClientDirective::unsubscribe(unsubscribe));
        }
        if !subscribe.is_empty() {
            directives.push(ClientDirective::subscribe(subscribe));
        }

        for directive in directives {
            if let Err(e) = self.send_directive(directive).await {
                self.on_link_lost(e.to_string());
                return;
            }
        }
        self.reconciler.commit();
    }

    async fn on_heartbeat_due(&mut self) {
        match self.heartbeat.on_deadline() {
            Some(HeartbeatAction::SendPing) => {
                if let Err(e) = self.send_frame(FeedFrame::Ping(Vec::new())).await {
                    self.on_link_lost(e.to_string());
                }
            }
            Some(HeartbeatAction::Timeout) => self.on_link_lost("heartbeat timeout".to_string()),
            None => {}
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Write one frame, giving up after `write_timeout`.
    async fn send_frame(&mut self, frame: FeedFrame) -> Result<(), TransportError> {
        let Some(link) = self.link.as_mut() else {
            return Err(TransportError::Closed);
        };

        let limit = self.config.write_timeout;
        match tokio::time::timeout(limit, link.sink.send(frame)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::WriteTimeout(limit)),
        }
    }

    async fn send_directive(&mut self, directive: ClientDirective) -> Result<(), TransportError> {
        let json = match self.codec.encode(&directive) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode directive");
                return Ok(());
            }
        };

        self.send_frame(FeedFrame::Text(json)).await?;
        metrics::record_directive(directive.action);
        tracing::debug!(
            action = directive.action.as_str(),
            codes = ?directive.stock_codes,
            "Directive sent"
        );
        Ok(())
    }

    fn set_state(&mut self, next: ConnectionState) {
        let current = self.status.state;
        if current == next {
            return;
        }

        match current.transition(next) {
            Ok(state) => {
                self.status.state = state;
                metrics::set_connection_state(state);
                tracing::info!(session_id = %self.id, from = %current, to = %state, "Connection state changed");
            }
            Err(e) => tracing::error!(session_id = %self.id, error = %e, "Rejected state change"),
        }
    }

    fn publish_status(&self) {
        self.status_tx.send_if_modified(|published| {
            if *published == self.status {
                return false;
            }
            published.clone_from(&self.status);
            true
        });
    }
}

/// Resolve the in-flight open, or never while none is pending.
async fn open_result(pending: &mut Option<OpenFuture>) -> Result<FeedLink, TransportError> {
    match pending.as_mut() {
        Some(open) => open.await,
        None => std::future::pending().await,
    }
}

/// Next inbound frame, or never while no link is open.
async fn next_frame(link: &mut Option<FeedLink>) -> Option<Result<FeedFrame, TransportError>> {
    match link.as_mut() {
        Some(link) => link.stream.next().await,
        None => std::future::pending().await,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockFeedConnector;

    fn config() -> SessionConfig {
        SessionConfig {
            heartbeat: HeartbeatConfig::disabled(),
            ..SessionConfig::new("ws://feed.test/ws")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_ends_in_failed() {
        let mut connector = MockFeedConnector::new();
        connector
            .expect_open()
            .times(6)
            .returning(|_| Err(TransportError::ConnectFailed("refused".into())));

        let cancel = CancellationToken::new();
        let (session, mut handle) = FeedSession::new(config(), Arc::new(connector), cancel.clone());
        let task = tokio::spawn(session.run());

        handle
            .commands
            .send(SessionCommand::SetDesired(vec!["005930".into()]))
            .unwrap();

        let status = handle
            .status
            .wait_for(|s| s.state == ConnectionState::Failed)
            .await
            .unwrap()
            .clone();
        assert_eq!(status.reconnect_attempt, 5);
        assert_eq!(
            status.last_error.as_deref(),
            Some("maximum reconnection attempts (5) exceeded")
        );

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn auto_connect_waits_for_interest() {
        let mut connector = MockFeedConnector::new();
        connector.expect_open().never();

        let cancel = CancellationToken::new();
        let (session, handle) = FeedSession::new(config(), Arc::new(connector), cancel.clone());
        let task = tokio::spawn(session.run());

        handle.commands.send(SessionCommand::SetDesired(Vec::new())).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.status.borrow().state, ConnectionState::Disconnected);

        cancel.cancel();
        task.await.unwrap();
    }

    /// Link whose sink never accepts a frame and whose stream stays silent.
    fn stalled_link() -> FeedLink {
        let sink = futures::sink::unfold((), |(), _frame: FeedFrame| {
            std::future::pending::<Result<(), TransportError>>()
        });
        let stream = futures::stream::pending::<Result<FeedFrame, TransportError>>();
        FeedLink::new(Box::pin(sink), Box::pin(stream))
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_peer_cannot_block_disconnect() {
        let mut connector = MockFeedConnector::new();
        connector
            .expect_open()
            .times(1)
            .returning(|_| Ok(stalled_link()));

        let cancel = CancellationToken::new();
        let (session, mut handle) = FeedSession::new(config(), Arc::new(connector), cancel.clone());
        let task = tokio::spawn(session.run());
        let started = tokio::time::Instant::now();

        // The resubscribe on open is the first write to hang.
        handle
            .commands
            .send(SessionCommand::SetDesired(vec!["005930".into()]))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            handle.status.borrow_and_update().state,
            ConnectionState::Connecting
        );
        handle
            .commands
            .send(SessionCommand::Disconnect {
                reason: "user".into(),
            })
            .unwrap();

        let status = handle
            .status
            .wait_for(|s| s.state == ConnectionState::Disconnected)
            .await
            .unwrap()
            .clone();
        assert_eq!(
            status.last_error.as_deref(),
            Some("write timed out after 5s")
        );
        assert!(started.elapsed() < DEFAULT_WRITE_TIMEOUT + Duration::from_secs(2));

        // No reconnect after a deliberate disconnect.
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(handle.status.borrow().state, ConnectionState::Disconnected);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_the_session() {
        let connector = MockFeedConnector::new();
        let (session, handle) =
            FeedSession::new(config(), Arc::new(connector), CancellationToken::new());
        let task = tokio::spawn(session.run());

        drop(handle);

        task.await.unwrap();
    }
}
