//! Desired vs reconciled symbol bookkeeping.
//!
//! Three sets are tracked:
//! - `desired`: the latest union declared by consumers
//! - `reconciled`: what the client last told the server (or would have told
//!   it, while offline)
//! - `acknowledged`: what the server last reported as subscribed
//!
//! The reconciler never talks to the network; it only plans directives and
//! records that they went out.

use std::collections::HashSet;

use super::{Symbol, SubscriptionChanges};

/// Pure reconciliation state.
#[derive(Debug, Default)]
pub struct Reconciler {
    desired: HashSet<Symbol>,
    reconciled: HashSet<Symbol>,
    acknowledged: HashSet<Symbol>,
}

impl Reconciler {
    /// Replace the desired set.
    ///
    /// Returns `true` if it differs (as a set) from the previous one.
    pub fn set_desired(&mut self, symbols: impl IntoIterator<Item = Symbol>) -> bool {
        let next: HashSet<Symbol> = symbols.into_iter().collect();
        if next == self.desired {
            return false;
        }
        self.desired = next;
        true
    }

    /// Directives needed to move the server from `reconciled` to `desired`.
    #[must_use]
    pub fn plan(&self) -> SubscriptionChanges {
        SubscriptionChanges {
            subscribe: self.desired.difference(&self.reconciled).cloned().collect(),
            unsubscribe: self.reconciled.difference(&self.desired).cloned().collect(),
        }
    }

    /// Record that the planned directives were delivered.
    pub fn commit(&mut self) {
        self.reconciled.clone_from(&self.desired);
    }

    /// Full desired set for a fresh connection.
    ///
    /// Server-side subscriptions never survive a reconnect, so the whole set
    /// is resent and treated as reconciled.
    pub fn resync(&mut self) -> HashSet<Symbol> {
        self.acknowledged.clear();
        self.commit();
        self.desired.clone()
    }

    /// Record the server's view of this connection's subscriptions.
    pub fn acknowledge(&mut self, symbols: impl IntoIterator<Item = Symbol>) {
        self.acknowledged = symbols.into_iter().collect();
    }

    /// Reconciled symbols the server has not acknowledged.
    #[must_use]
    pub fn unacknowledged(&self) -> HashSet<Symbol> {
        self.reconciled
            .difference(&self.acknowledged)
            .cloned()
            .collect()
    }

    /// Restrict `symbols` to those currently reconciled.
    #[must_use]
    pub fn reconciled_subset(&self, symbols: &[Symbol]) -> Vec<Symbol> {
        symbols
            .iter()
            .filter(|s| self.reconciled.contains(*s))
            .cloned()
            .collect()
    }

    /// The latest desired set.
    #[must_use]
    pub const fn desired(&self) -> &HashSet<Symbol> {
        &self.desired
    }

    /// The set last sent to (or planned for) the server.
    #[must_use]
    pub const fn reconciled(&self) -> &HashSet<Symbol> {
        &self.reconciled
    }

    /// The set last acknowledged by the server.
    #[must_use]
    pub const fn acknowledged(&self) -> &HashSet<Symbol> {
        &self.acknowledged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::subscription::sorted;
    use proptest::prelude::*;

    fn set(list: &[&str]) -> Vec<Symbol> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn plan_is_set_difference() {
        let mut reconciler = Reconciler::default();
        reconciler.set_desired(set(&["A", "B"]));
        reconciler.commit();

        reconciler.set_desired(set(&["B", "C"]));
        let plan = reconciler.plan();

        assert_eq!(plan.subscribe_sorted(), set(&["C"]));
        assert_eq!(plan.unsubscribe_sorted(), set(&["A"]));
    }

    #[test]
    fn same_set_in_other_order_is_no_change() {
        let mut reconciler = Reconciler::default();
        assert!(reconciler.set_desired(set(&["A", "B"])));
        assert!(!reconciler.set_desired(set(&["B", "A", "A"])));
    }

    #[test]
    fn commit_makes_plan_empty() {
        let mut reconciler = Reconciler::default();
        reconciler.set_desired(set(&["A"]));
        assert!(!reconciler.plan().is_empty());

        reconciler.commit();
        assert!(reconciler.plan().is_empty());
    }

    #[test]
    fn shrink_to_empty_is_single_unsubscribe_all() {
        let mut reconciler = Reconciler::default();
        reconciler.set_desired(set(&["A", "B", "C"]));
        reconciler.commit();

        reconciler.set_desired(Vec::new());
        let plan = reconciler.plan();

        assert!(plan.subscribe.is_empty());
        assert_eq!(plan.unsubscribe_sorted(), set(&["A", "B", "C"]));
    }

    #[test]
    fn resync_returns_full_desired_set() {
        let mut reconciler = Reconciler::default();
        reconciler.set_desired(set(&["A", "B"]));
        reconciler.commit();
        reconciler.acknowledge(set(&["A", "B"]));

        let full = reconciler.resync();

        assert_eq!(sorted(&full), set(&["A", "B"]));
        assert!(reconciler.acknowledged().is_empty());
        assert!(reconciler.plan().is_empty());
    }

    #[test]
    fn unacknowledged_reports_drift() {
        let mut reconciler = Reconciler::default();
        reconciler.set_desired(set(&["A", "B"]));
        reconciler.commit();
        reconciler.acknowledge(set(&["A"]));

        assert_eq!(sorted(&reconciler.unacknowledged()), set(&["B"]));
    }

    #[test]
    fn reconciled_subset_filters_unknown() {
        let mut reconciler = Reconciler::default();
        reconciler.set_desired(set(&["A"]));
        reconciler.commit();

        assert_eq!(reconciler.reconciled_subset(&set(&["A", "Z"])), set(&["A"]));
    }

    fn symbol_set() -> impl Strategy<Value = HashSet<Symbol>> {
        proptest::collection::hash_set("[A-E]", 0..5)
    }

    proptest! {
        #[test]
        fn reconciling_a_then_b_emits_exact_deltas(a in symbol_set(), b in symbol_set()) {
            let mut reconciler = Reconciler::default();
            reconciler.set_desired(a.clone());
            reconciler.commit();

            reconciler.set_desired(b.clone());
            let plan = reconciler.plan();

            let expected_sub: HashSet<Symbol> = b.difference(&a).cloned().collect();
            let expected_unsub: HashSet<Symbol> = a.difference(&b).cloned().collect();
            prop_assert_eq!(&plan.subscribe, &expected_sub);
            prop_assert_eq!(&plan.unsubscribe, &expected_unsub);
            prop_assert_eq!(plan.is_empty(), a == b);

            reconciler.commit();
            prop_assert!(reconciler.plan().is_empty());
        }
    }
}
