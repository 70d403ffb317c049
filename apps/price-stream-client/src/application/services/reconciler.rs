//! Subscription Reconciler Service
//!
//! Debounces desired-set changes into reconciliation passes. Every
//! `set_desired` re-arms a trailing deadline, so a burst of changes (UI
//! pagination, several consumers mounting at once) collapses into a single
//! pass over the latest desired set.

use std::time::Duration;

use crate::domain::subscription::{Reconciler, SubscriptionChanges, Symbol, sorted};

use super::timer::Deadline;

/// Default debounce window for reconciliation passes.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Debounced wrapper around the reconciliation bookkeeping.
#[derive(Debug)]
pub struct SubscriptionReconciler {
    state: Reconciler,
    debounce: Duration,
    timer: Deadline,
    passes: u64,
}

impl Default for SubscriptionReconciler {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl SubscriptionReconciler {
    /// Create a reconciler with the given debounce window.
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        Self {
            state: Reconciler::default(),
            debounce,
            timer: Deadline::new(),
            passes: 0,
        }
    }

    /// Replace the desired set and (re)arm the debounce deadline.
    ///
    /// Returns `true` if the desired set changed.
    pub fn set_desired(&mut self, symbols: impl IntoIterator<Item = Symbol>) -> bool {
        let changed = self.state.set_desired(symbols);
        self.timer.arm(self.debounce);
        changed
    }

    /// Deadline the owner's event loop waits on.
    #[must_use]
    pub const fn timer(&self) -> &Deadline {
        &self.timer
    }

    /// Start a reconciliation pass if the debounce deadline has passed.
    ///
    /// The returned changes are empty when nothing needs to be sent.
    pub fn take_pass(&mut self) -> Option<SubscriptionChanges> {
        if !self.timer.fire() {
            return None;
        }
        self.passes += 1;
        Some(self.state.plan())
    }

    /// Record that the pass's directives went out (or were deferred).
    pub fn commit(&mut self) {
        self.state.commit();
    }

    /// Full desired set for a fresh connection, sorted.
    pub fn resync(&mut self) -> Vec<Symbol> {
        sorted(&self.state.resync())
    }

    /// Record the server-acknowledged set.
    ///
    /// Returns reconciled symbols the server did not acknowledge.
    pub fn acknowledge(&mut self, symbols: impl IntoIterator<Item = Symbol>) -> Vec<Symbol> {
        self.state.acknowledge(symbols);
        sorted(&self.state.unacknowledged())
    }

    /// Bookkeeping state.
    #[must_use]
    pub const fn state(&self) -> &Reconciler {
        &self.state
    }

    /// Number of passes started so far.
    #[must_use]
    pub const fn passes(&self) -> u64 {
        self.passes
    }
}
