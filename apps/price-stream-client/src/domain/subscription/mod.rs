//! Subscription Management Types
//!
//! Domain types for tracking which symbols consumers want live.
//!
//! # Design
//!
//! The interest registry tracks:
//! - Which symbols each consumer has declared
//! - A reference count per symbol across consumers
//!
//! The union of all declared symbols is the desired set handed to the
//! reconciler. A consumer dropping a symbol only removes it from the
//! desired set when no other consumer still holds it.

mod reconciler;

use std::collections::{BTreeSet, HashMap, HashSet};

pub use reconciler::Reconciler;

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a consumer of the price feed.
pub type ConsumerId = u64;

/// An opaque, case-sensitive instrument code.
pub type Symbol = String;

// =============================================================================
// Subscription Changes
// =============================================================================

/// Changes to the desired or upstream subscription set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChanges {
    /// Symbols to subscribe to.
    pub subscribe: HashSet<Symbol>,
    /// Symbols to unsubscribe from.
    pub unsubscribe: HashSet<Symbol>,
}

impl SubscriptionChanges {
    /// Check if there are any changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }

    /// Create changes with only subscribes.
    #[must_use]
    pub fn subscribe_only(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            subscribe: symbols.into_iter().collect(),
            unsubscribe: HashSet::new(),
        }
    }

    /// Create changes with only unsubscribes.
    #[must_use]
    pub fn unsubscribe_only(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            subscribe: HashSet::new(),
            unsubscribe: symbols.into_iter().collect(),
        }
    }

    /// Symbols to subscribe to, sorted for stable wire output.
    #[must_use]
    pub fn subscribe_sorted(&self) -> Vec<Symbol> {
        sorted(&self.subscribe)
    }

    /// Symbols to unsubscribe from, sorted for stable wire output.
    #[must_use]
    pub fn unsubscribe_sorted(&self) -> Vec<Symbol> {
        sorted(&self.unsubscribe)
    }
}

/// Sort a symbol set into a vector.
#[must_use]
pub fn sorted(symbols: &HashSet<Symbol>) -> Vec<Symbol> {
    symbols
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// =============================================================================
// Interest Registry
// =============================================================================

/// Reference-counted symbol interest across consumers.
///
/// Not synchronized; the consumer facade owns it behind a lock so that
/// computing a new union and forwarding it happen atomically.
///
/// # Example
///
/// ```rust
/// use price_stream_client::domain::subscription::InterestRegistry;
///
/// let mut registry = InterestRegistry::default();
///
/// // Consumer 1 wants 005930
/// let changes = registry.add(1, &["005930".to_string()]);
/// assert!(changes.subscribe.contains("005930"));
///
/// // Consumer 2 also wants it - the desired set does not change
/// let changes = registry.add(2, &["005930".to_string()]);
/// assert!(changes.is_empty());
///
/// // Consumer 1 leaves - still wanted by consumer 2
/// let changes = registry.remove_consumer(1);
/// assert!(changes.is_empty());
///
/// // Consumer 2 leaves - the symbol drops out of the desired set
/// let changes = registry.remove_consumer(2);
/// assert!(changes.unsubscribe.contains("005930"));
/// ```
#[derive(Debug, Default)]
pub struct InterestRegistry {
    /// Map from consumer ID to their declared symbols.
    consumer_symbols: HashMap<ConsumerId, HashSet<Symbol>>,
    /// Map from symbol to reference count.
    symbol_refcount: HashMap<Symbol, usize>,
}

impl InterestRegistry {
    /// Add symbols for a consumer.
    ///
    /// Returns symbols that entered the desired set (refcount went 0→1).
    pub fn add(&mut self, consumer: ConsumerId, symbols: &[Symbol]) -> SubscriptionChanges {
        let consumer_set = self.consumer_symbols.entry(consumer).or_default();
        let mut entered = Vec::new();

        for symbol in symbols {
            // Skip if consumer already holds it
            if !consumer_set.insert(symbol.clone()) {
                continue;
            }

            let refcount = self.symbol_refcount.entry(symbol.clone()).or_insert(0);
            *refcount += 1;

            if *refcount == 1 {
                entered.push(symbol.clone());
            }
        }

        if consumer_set.is_empty() {
            self.consumer_symbols.remove(&consumer);
        }

        SubscriptionChanges::subscribe_only(entered)
    }

    /// Remove symbols for a consumer.
    ///
    /// Returns symbols that left the desired set (refcount went 1→0).
    pub fn remove(&mut self, consumer: ConsumerId, symbols: &[Symbol]) -> SubscriptionChanges {
        let Some(consumer_set) = self.consumer_symbols.get_mut(&consumer) else {
            return SubscriptionChanges::default();
        };

        let mut left = Vec::new();

        for symbol in symbols {
            // Skip if consumer didn't hold it
            if !consumer_set.remove(symbol) {
                continue;
            }

            if release(&mut self.symbol_refcount, symbol) {
                left.push(symbol.clone());
            }
        }

        if consumer_set.is_empty() {
            self.consumer_symbols.remove(&consumer);
        }

        SubscriptionChanges::unsubscribe_only(left)
    }

    /// Replace a consumer's declared symbols with exactly `symbols`.
    ///
    /// Returns the net change to the desired set.
    pub fn replace(&mut self, consumer: ConsumerId, symbols: &[Symbol]) -> SubscriptionChanges {
        let wanted: HashSet<&Symbol> = symbols.iter().collect();
        let dropped: Vec<Symbol> = self
            .consumer_symbols
            .get(&consumer)
            .map(|current| {
                current
                    .iter()
                    .filter(|s| !wanted.contains(s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let removed = self.remove(consumer, &dropped);
        let added = self.add(consumer, symbols);

        SubscriptionChanges {
            subscribe: added.subscribe,
            unsubscribe: removed.unsubscribe,
        }
    }

    /// Remove every symbol held by a consumer.
    ///
    /// Returns symbols that left the desired set.
    pub fn remove_consumer(&mut self, consumer: ConsumerId) -> SubscriptionChanges {
        let Some(consumer_set) = self.consumer_symbols.remove(&consumer) else {
            return SubscriptionChanges::default();
        };

        let left: Vec<Symbol> = consumer_set
            .into_iter()
            .filter(|symbol| release(&mut self.symbol_refcount, symbol))
            .collect();

        SubscriptionChanges::unsubscribe_only(left)
    }

    /// The union of all consumers' symbols.
    #[must_use]
    pub fn desired(&self) -> HashSet<Symbol> {
        self.symbol_refcount.keys().cloned().collect()
    }

    /// Symbols declared by one consumer.
    #[must_use]
    pub fn consumer_symbols(&self, consumer: ConsumerId) -> Vec<Symbol> {
        self.consumer_symbols
            .get(&consumer)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// How many consumers currently hold a symbol.
    #[must_use]
    pub fn refcount(&self, symbol: &str) -> usize {
        self.symbol_refcount.get(symbol).copied().unwrap_or(0)
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        SubscriptionStats {
            symbol_count: self.symbol_refcount.len(),
            consumer_count: self.consumer_symbols.len(),
        }
    }
}

/// Decrement a symbol's refcount; true when it reached zero.
fn release(refcounts: &mut HashMap<Symbol, usize>, symbol: &str) -> bool {
    let Some(refcount) = refcounts.get_mut(symbol) else {
        return false;
    };

    *refcount = refcount.saturating_sub(1);
    if *refcount == 0 {
        refcounts.remove(symbol);
        return true;
    }
    false
}

// =============================================================================
// Statistics
// =============================================================================

/// Interest registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    /// Number of unique desired symbols.
    pub symbol_count: usize,
    /// Number of consumers declaring at least one symbol.
    pub consumer_count: usize,
}

// =============================================================================
// Tests
// =============================================================================
