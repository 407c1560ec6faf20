//! Concurrent map of tracked bar series.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::series::{BarMergeOutcome, BarSeries, MergePolicy, TradeOutcome};
use crate::domain::market::{normalize_symbol, Bar, Trade};

/// Bar series for every tracked symbol of one channel.
///
/// Each series sits behind its own lock so readers of one symbol never wait
/// on merges into another. Reads return owned snapshots.
#[derive(Debug)]
pub struct BarStore {
    policy: MergePolicy,
    capacity: usize,
    series: RwLock<HashMap<String, Arc<RwLock<BarSeries>>>>,
}

impl BarStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(policy: MergePolicy, capacity: usize) -> Self {
        Self {
            policy,
            capacity: capacity.max(1),
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Merge policy applied to every series.
    #[must_use]
    pub const fn policy(&self) -> &MergePolicy {
        &self.policy
    }

    /// Per-symbol capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Start tracking a symbol. Returns `false` if it was already tracked
    /// under any spelling.
    pub fn track(&self, symbol: &str) -> bool {
        let key = normalize_symbol(symbol);
        if key.is_empty() {
            return false;
        }
        let mut map = self.series.write();
        if map.contains_key(&key) {
            return false;
        }
        map.insert(
            key,
            Arc::new(RwLock::new(BarSeries::new(symbol.trim(), self.capacity))),
        );
        true
    }

    /// Stop tracking a symbol and drop its bars.
    pub fn untrack(&self, symbol: &str) -> bool {
        self.series.write().remove(&normalize_symbol(symbol)).is_some()
    }

    /// Drop a symbol's bars but keep tracking it.
    pub fn clear(&self, symbol: &str) -> bool {
        self.lookup(symbol).is_some_and(|series| {
            series.write().clear();
            true
        })
    }

    /// Whether a symbol is tracked under any spelling.
    #[must_use]
    pub fn is_tracked(&self, symbol: &str) -> bool {
        self.lookup(symbol).is_some()
    }

    /// Tracked symbols as first spelled, sorted.
    #[must_use]
    pub fn tracked_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .series
            .read()
            .values()
            .map(|series| series.read().symbol().to_string())
            .collect();
        symbols.sort();
        symbols
    }

    /// Number of tracked symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.series.read().len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.read().is_empty()
    }

    /// Fold a bar event into its symbol's series.
    pub fn merge_bar(&self, bar: Bar) -> BarMergeOutcome {
        match self.lookup(&bar.symbol) {
            Some(series) => series.write().merge_bar(bar, &self.policy),
            None => BarMergeOutcome::Untracked,
        }
    }

    /// Refine a symbol's open bar with a trade.
    pub fn apply_trade(&self, trade: &Trade, now_secs: i64) -> TradeOutcome {
        match self.lookup(&trade.symbol) {
            Some(series) => series.write().apply_trade(trade, now_secs, &self.policy),
            None => TradeOutcome::Untracked,
        }
    }

    /// Owned copy of a symbol's bars, oldest first.
    #[must_use]
    pub fn snapshot(&self, symbol: &str) -> Option<Vec<Bar>> {
        self.lookup(symbol).map(|series| series.read().to_vec())
    }

    fn lookup(&self, symbol: &str) -> Option<Arc<RwLock<BarSeries>>> {
        self.series.read().get(&normalize_symbol(symbol)).cloned()
    }
}

impl Default for BarStore {
    fn default() -> Self {
        Self::new(MergePolicy::default(), super::DEFAULT_MAX_BARS)
    }
}
