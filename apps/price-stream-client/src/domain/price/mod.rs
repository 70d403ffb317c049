//! Price Types
//!
//! The per-symbol price record, the authoritative price table and the
//! transient batch that feeds it.
//!
//! # Design
//!
//! The table stores its records behind an `Arc` and mutates them with
//! copy-on-write, so a published `PriceSnapshot` is an O(1) clone that
//! consumers can hold on to while the table keeps moving.
//!
//! Records are never evicted when a symbol leaves the subscription set. A
//! symbol keeps its last known value until it is overwritten or explicitly
//! forgotten; freshness is judged from `observed_at` and the connection
//! status, never from absence.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::subscription::Symbol;

// =============================================================================
// Price Record
// =============================================================================

/// Latest price observation for one symbol.
///
/// A new record fully replaces the previous one; fields are never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceRecord {
    /// Instrument code.
    pub symbol: Symbol,
    /// Last traded price.
    pub price: Decimal,
    /// Absolute change against the reference price.
    pub change_amount: Decimal,
    /// Percentage change against the reference price.
    pub change_percent: Decimal,
    /// Accumulated volume.
    pub volume: u64,
    /// Accumulated traded value.
    pub trading_value: Decimal,
    /// Upstream source tag reported by the feed.
    pub source: String,
    /// When the price was observed.
    pub observed_at: DateTime<Utc>,
}

// =============================================================================
// Pending Batch
// =============================================================================

/// Updates received inside the current batch window.
///
/// Last write wins per symbol; intermediate values inside a window are
/// intentionally lost.
#[derive(Debug, Default)]
pub struct PendingBatch {
    records: HashMap<Symbol, PriceRecord>,
}

impl PendingBatch {
    /// Insert or overwrite the record for its symbol.
    pub fn insert(&mut self, record: PriceRecord) {
        self.records.insert(record.symbol.clone(), record);
    }

    /// Number of distinct symbols waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drain everything, leaving the batch empty.
    pub fn take(&mut self) -> HashMap<Symbol, PriceRecord> {
        std::mem::take(&mut self.records)
    }
}

// =============================================================================
// Price Table
// =============================================================================

/// Authoritative symbol → latest record mapping.
///
/// Only the update batcher mutates the table.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    records: Arc<HashMap<Symbol, PriceRecord>>,
    last_updated_at: Option<DateTime<Utc>>,
    version: u64,
}

impl PriceTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch in one pass, preserving records of other symbols.
    ///
    /// Returns the number of symbols written. An empty batch leaves the
    /// table (and its version) untouched.
    pub fn merge(
        &mut self,
        batch: impl IntoIterator<Item = (Symbol, PriceRecord)>,
        at: DateTime<Utc>,
    ) -> usize {
        let mut batch = batch.into_iter().peekable();
        if batch.peek().is_none() {
            return 0;
        }

        let records = Arc::make_mut(&mut self.records);
        let mut written = 0;
        for (symbol, record) in batch {
            records.insert(symbol, record);
            written += 1;
        }

        self.last_updated_at = Some(at);
        self.version += 1;
        written
    }

    /// Drop records for the given symbols.
    ///
    /// Returns the number of records removed.
    pub fn remove(&mut self, symbols: &[Symbol], at: DateTime<Utc>) -> usize {
        if !symbols.iter().any(|s| self.records.contains_key(s)) {
            return 0;
        }

        let records = Arc::make_mut(&mut self.records);
        let removed = symbols
            .iter()
            .filter(|s| records.remove(s.as_str()).is_some())
            .count();

        self.last_updated_at = Some(at);
        self.version += 1;
        removed
    }

    /// Get the record for a symbol.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<&PriceRecord> {
        self.records.get(symbol)
    }

    /// Number of symbols with a record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Take an immutable snapshot of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> PriceSnapshot {
        PriceSnapshot {
            records: Arc::clone(&self.records),
            last_updated_at: self.last_updated_at,
            version: self.version,
        }
    }
}

// =============================================================================
// Price Snapshot
// =============================================================================

/// Read-only view of the price table at one point in time.
#[derive(Debug, Clone, Default)]
pub struct PriceSnapshot {
    records: Arc<HashMap<Symbol, PriceRecord>>,
    last_updated_at: Option<DateTime<Utc>>,
    version: u64,
}

impl PriceSnapshot {
    /// Get the record for a symbol.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<&PriceRecord> {
        self.records.get(symbol)
    }

    /// Records restricted to the given symbols.
    #[must_use]
    pub fn select(&self, symbols: &[Symbol]) -> HashMap<Symbol, PriceRecord> {
        symbols
            .iter()
            .filter_map(|s| self.records.get(s).map(|r| (s.clone(), r.clone())))
            .collect()
    }

    /// When the table was last changed.
    #[must_use]
    pub const fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        self.last_updated_at
    }

    /// Number of changes applied to the table so far (one per flush).
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Number of symbols with a record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
