//! Deadline Timer
//!
//! A re-armable one-shot deadline owned by whoever schedules it. The owner
//! polls `elapsed()` inside its event loop and calls `fire()` when it
//! resolves, so a cancelled or replaced deadline can never fire late.

use std::time::Duration;

use tokio::time::Instant;

/// One-shot deadline with explicit arm/cancel.
#[derive(Debug, Default)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// Create a disarmed deadline.
    #[must_use]
    pub const fn new() -> Self {
        Self { at: None }
    }

    /// Arm for `after` from now, replacing any earlier deadline.
    pub fn arm(&mut self, after: Duration) {
        self.at = Some(Instant::now() + after);
    }

    /// Arm only if not already armed.
    ///
    /// Returns `true` if the deadline was armed by this call.
    pub fn arm_if_idle(&mut self, after: Duration) -> bool {
        if self.at.is_some() {
            return false;
        }
        self.arm(after);
        true
    }

    /// Disarm.
    pub const fn cancel(&mut self) {
        self.at = None;
    }

    /// Consume an expired deadline.
    ///
    /// Returns `true` if the deadline was armed and has passed; it is
    /// disarmed either way once passed.
    pub fn fire(&mut self) -> bool {
        match self.at {
            Some(at) if at <= Instant::now() => {
                self.at = None;
                true
            }
            _ => false,
        }
    }

    /// Whether a deadline is pending.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.at.is_some()
    }

    /// Time left until the deadline, if armed.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Resolve when the deadline passes; never resolves while disarmed.
    pub async fn elapsed(&self) {
        match self.at {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    }
}
