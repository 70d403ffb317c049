//! Heartbeat Monitor
//!
//! Detects dead connections through periodic WebSocket pings. Any inbound
//! frame counts as proof of life; a ping that sees no inbound traffic
//! within the pong timeout is reported as a timeout, which the session
//! treats as an abnormal close.

use std::time::Duration;

use crate::application::services::Deadline;
use crate::infrastructure::config::WebSocketSettings;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Idle interval before a ping is sent (zero disables the heartbeat).
    pub ping_interval: Duration,
    /// Time allowed for traffic to arrive after a ping.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(20),
            pong_timeout: Duration::from_secs(20),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, pong_timeout: Duration) -> Self {
        Self {
            ping_interval,
            pong_timeout,
        }
    }

    /// A configuration that never pings.
    #[must_use]
    pub const fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Create configuration from `WebSocketSettings`.
    #[must_use]
    pub const fn from_websocket_settings(settings: &WebSocketSettings) -> Self {
        Self {
            ping_interval: settings.heartbeat_interval,
            pong_timeout: settings.heartbeat_timeout,
        }
    }

    /// Whether pings are sent at all.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !self.ping_interval.is_zero()
    }
}

/// What the session should do when the heartbeat deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Send a ping frame.
    SendPing,
    /// No traffic since the last ping; the connection is dead.
    Timeout,
}

/// Per-connection heartbeat state.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    timer: Deadline,
    awaiting_traffic: bool,
}

impl HeartbeatMonitor {
    /// Create an idle monitor.
    #[must_use]
    pub const fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            timer: Deadline::new(),
            awaiting_traffic: false,
        }
    }

    /// Begin monitoring a freshly opened connection.
    pub fn start(&mut self) {
        self.awaiting_traffic = false;
        if self.config.is_enabled() {
            self.timer.arm(self.config.ping_interval);
        }
    }

    /// Stop monitoring.
    pub const fn stop(&mut self) {
        self.awaiting_traffic = false;
        self.timer.cancel();
    }

    /// Record inbound traffic.
    pub fn record_traffic(&mut self) {
        if self.awaiting_traffic {
            self.awaiting_traffic = false;
            self.timer.arm(self.config.ping_interval);
        }
    }

    /// Deadline the owner's event loop waits on.
    #[must_use]
    pub const fn timer(&self) -> &Deadline {
        &self.timer
    }

    /// Consume the passed deadline and decide what to do.
    pub fn on_deadline(&mut self) -> Option<HeartbeatAction> {
        if !self.timer.fire() {
            return None;
        }

        if self.awaiting_traffic {
            tracing::warn!(
                timeout_ms = u64::try_from(self.config.pong_timeout.as_millis()).unwrap_or(u64::MAX),
                "Heartbeat timeout detected"
            );
            self.awaiting_traffic = false;
            return Some(HeartbeatAction::Timeout);
        }

        self.awaiting_traffic = true;
        self.timer.arm(self.config.pong_timeout);
        Some(HeartbeatAction::SendPing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> HeartbeatMonitor {
        HeartbeatMonitor::new(HeartbeatConfig::new(
            Duration::from_millis(100),
            Duration::from_millis(50),
        ))
    }

    #[test]
    fn default_config_values() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(20));
        assert_eq!(config.pong_timeout, Duration::from_secs(20));
        assert!(config.is_enabled());
        assert!(!HeartbeatConfig::disabled().is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_connection_times_out() {
        let mut monitor = monitor();
        monitor.start();

        monitor.timer().elapsed().await;
        assert_eq!(monitor.on_deadline(), Some(HeartbeatAction::SendPing));

        monitor.timer().elapsed().await;
        assert_eq!(monitor.on_deadline(), Some(HeartbeatAction::Timeout));
        assert!(!monitor.timer().is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn traffic_after_ping_keeps_connection_alive() {
        let mut monitor = monitor();
        monitor.start();

        monitor.timer().elapsed().await;
        assert_eq!(monitor.on_deadline(), Some(HeartbeatAction::SendPing));

        monitor.record_traffic();
        assert_eq!(monitor.timer().remaining(), Some(Duration::from_millis(100)));

        monitor.timer().elapsed().await;
        assert_eq!(monitor.on_deadline(), Some(HeartbeatAction::SendPing));
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_monitor_never_arms() {
        let mut monitor = HeartbeatMonitor::new(HeartbeatConfig::disabled());
        monitor.start();
        assert!(!monitor.timer().is_armed());
        assert_eq!(monitor.on_deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_disarms() {
        let mut monitor = monitor();
        monitor.start();
        monitor.stop();
        assert!(!monitor.timer().is_armed());
    }
}
