//! Update Batcher Service
//!
//! Coalesces per-symbol price updates into windows and applies each window
//! to the price table in a single pass, publishing one snapshot per flush.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use crate::domain::price::{PendingBatch, PriceRecord, PriceSnapshot, PriceTable};
use crate::domain::subscription::Symbol;

use super::timer::Deadline;

/// Default batch window.
pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(100);

/// Owns the price table and the pending batch.
#[derive(Debug)]
pub struct UpdateBatcher {
    window: Duration,
    pending: PendingBatch,
    timer: Deadline,
    table: PriceTable,
    snapshots: watch::Sender<PriceSnapshot>,
}

impl UpdateBatcher {
    /// Create a batcher publishing to `snapshots`.
    #[must_use]
    pub fn new(window: Duration, snapshots: watch::Sender<PriceSnapshot>) -> Self {
        Self {
            window,
            pending: PendingBatch::default(),
            timer: Deadline::new(),
            table: PriceTable::new(),
            snapshots,
        }
    }

    /// Queue a record; the first record of a window arms the flush deadline.
    pub fn add(&mut self, record: PriceRecord) {
        self.pending.insert(record);
        self.timer.arm_if_idle(self.window);
    }

    /// Deadline the owner's event loop waits on.
    #[must_use]
    pub const fn timer(&self) -> &Deadline {
        &self.timer
    }

    /// Whether the flush deadline has passed.
    pub fn due(&mut self) -> bool {
        self.timer.fire()
    }

    /// Apply the pending window to the table.
    ///
    /// Returns the number of symbols written; nothing is published for an
    /// empty window.
    pub fn flush(&mut self) -> usize {
        self.timer.cancel();
        let batch = self.pending.take();
        let written = self.table.merge(batch, Utc::now());
        if written > 0 {
            self.publish();
        }
        written
    }

    /// Apply a server-side bulk batch immediately.
    ///
    /// Anything already pending is merged in the same pass, with the bulk
    /// values taking precedence.
    pub fn merge_now(&mut self, records: impl IntoIterator<Item = PriceRecord>) -> usize {
        for record in records {
            self.pending.insert(record);
        }
        self.flush()
    }

    /// Drop records for `symbols` from the table and the pending window.
    pub fn forget(&mut self, symbols: &[Symbol]) -> usize {
        let mut pending = self.pending.take();
        for symbol in symbols {
            pending.remove(symbol);
        }
        for (_, record) in pending {
            self.pending.insert(record);
        }
        if self.pending.is_empty() {
            self.timer.cancel();
        }

        let removed = self.table.remove(symbols, Utc::now());
        if removed > 0 {
            self.publish();
        }
        removed
    }

    /// Number of symbols waiting for the next flush.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Current snapshot of the table.
    #[must_use]
    pub fn snapshot(&self) -> PriceSnapshot {
        self.table.snapshot()
    }

    fn publish(&self) {
        // send_replace never fails, even with no receivers
        self.snapshots.send_replace(self.table.snapshot());
    }
}
