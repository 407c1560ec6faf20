//! Per-symbol ring buffer and merge algorithm.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::domain::market::{normalize_symbol, Bar, Trade};

// =============================================================================
// Policy
// =============================================================================

/// What to do with a bar older than the newest buffered bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LateDataPolicy {
    /// Discard it.
    #[default]
    Drop,
    /// Insert it in order if its bucket still lies within the buffer.
    Correct,
}

impl LateDataPolicy {
    /// Parse `drop` or `correct`, ignoring case.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "drop" => Some(Self::Drop),
            "correct" => Some(Self::Correct),
            _ => None,
        }
    }
}

/// Tolerances and late-data handling for a bar series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergePolicy {
    /// A bar event within this many seconds of a buffered bar replaces it.
    pub bar_tolerance_secs: i64,
    /// A trade within this many seconds of the open bucket (or of now)
    /// refines it.
    pub trade_tolerance_secs: i64,
    /// Handling of bars older than the newest buffered bucket.
    pub late_data: LateDataPolicy,
}

impl MergePolicy {
    /// Tolerances for the feed's native bars.
    ///
    /// The one-second replace window is inclusive: a bar one second after a
    /// buffered bar overwrites it (keeping the buffered bucket time), so
    /// consecutive one-second bars collapse pairwise. Upstream bars are
    /// expected to be at least a minute apart.
    #[must_use]
    pub const fn canonical() -> Self {
        Self {
            bar_tolerance_secs: 1,
            trade_tolerance_secs: 5,
            late_data: LateDataPolicy::Drop,
        }
    }

    /// Looser tolerances for coarser upstream bars.
    #[must_use]
    pub const fn coarse() -> Self {
        Self {
            bar_tolerance_secs: 5,
            trade_tolerance_secs: 5,
            late_data: LateDataPolicy::Drop,
        }
    }

    /// Same tolerances with a different late-data policy.
    #[must_use]
    pub const fn with_late_data(mut self, late_data: LateDataPolicy) -> Self {
        self.late_data = late_data;
        self
    }
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::canonical()
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of merging one bar event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarMergeOutcome {
    /// First bar of an empty series.
    Seeded,
    /// A buffered bar within tolerance was overwritten.
    Replaced,
    /// Appended after the newest bar.
    Appended {
        /// Bucket time of the bar evicted to make room, if any.
        evicted: Option<i64>,
    },
    /// A late bar inserted in order under [`LateDataPolicy::Correct`].
    Inserted,
    /// A late bar for a closed bucket was dropped.
    DiscardedLate,
    /// The bar belongs to another symbol.
    SymbolMismatch,
    /// No series is tracked for the symbol.
    Untracked,
}

impl BarMergeOutcome {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Seeded => "seeded",
            Self::Replaced => "replaced",
            Self::Appended { .. } => "appended",
            Self::Inserted => "inserted",
            Self::DiscardedLate => "discarded_late",
            Self::SymbolMismatch => "symbol_mismatch",
            Self::Untracked => "untracked",
        }
    }

    /// Whether the series changed.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(
            self,
            Self::Seeded | Self::Replaced | Self::Appended { .. } | Self::Inserted
        )
    }
}

/// Result of applying one trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeOutcome {
    /// The last bar was refined.
    Refined,
    /// The trade maps to a bucket older than the last bar.
    Stale,
    /// The trade is neither near the last bucket nor near now.
    OutOfWindow,
    /// Nothing buffered yet.
    NoOpenBar,
    /// The trade belongs to another symbol.
    SymbolMismatch,
    /// No series is tracked for the symbol.
    Untracked,
}

impl TradeOutcome {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Refined => "refined",
            Self::Stale => "stale",
            Self::OutOfWindow => "out_of_window",
            Self::NoOpenBar => "no_open_bar",
            Self::SymbolMismatch => "symbol_mismatch",
            Self::Untracked => "untracked",
        }
    }
}

// =============================================================================
// Bar Series
// =============================================================================

/// Bounded, strictly time-ordered bars for one symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarSeries {
    symbol: String,
    key: String,
    bars: VecDeque<Bar>,
    capacity: usize,
    seeded: bool,
}

impl BarSeries {
    /// Create an empty series. A zero capacity is raised to one.
    #[must_use]
    pub fn new(symbol: impl Into<String>, capacity: usize) -> Self {
        let symbol = symbol.into();
        let capacity = capacity.max(1);
        Self {
            key: normalize_symbol(&symbol),
            symbol,
            bars: VecDeque::with_capacity(capacity),
            capacity,
            seeded: false,
        }
    }

    /// Symbol as first tracked.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Normalized key events are matched against.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Maximum number of bars retained.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the series has received its first bar.
    #[must_use]
    pub const fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Number of buffered bars.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Whether nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Newest bar.
    #[must_use]
    pub fn last(&self) -> Option<&Bar> {
        self.bars.back()
    }

    /// Whether an event for `symbol` belongs to this series.
    #[must_use]
    pub fn accepts(&self, symbol: &str) -> bool {
        symbol == self.symbol || normalize_symbol(symbol) == self.key
    }

    /// Owned snapshot of the buffered bars, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Bar> {
        self.bars.iter().cloned().collect()
    }

    /// Drop all bars and mark the series unseeded.
    pub fn clear(&mut self) {
        self.bars.clear();
        self.seeded = false;
    }

    /// Fold a bar event into the series.
    pub fn merge_bar(&mut self, bar: Bar, policy: &MergePolicy) -> BarMergeOutcome {
        if !self.accepts(&bar.symbol) {
            return BarMergeOutcome::SymbolMismatch;
        }

        if let Some(idx) = self.replace_target(bar.time, policy.bar_tolerance_secs) {
            let slot = &mut self.bars[idx];
            let time = slot.time;
            *slot = bar;
            slot.time = time;
            return BarMergeOutcome::Replaced;
        }

        let Some(last_time) = self.bars.back().map(|b| b.time) else {
            self.bars.push_back(bar);
            self.seeded = true;
            return BarMergeOutcome::Seeded;
        };

        if bar.time >= last_time {
            let evicted = self.push_evicting(bar);
            return BarMergeOutcome::Appended { evicted };
        }

        match policy.late_data {
            LateDataPolicy::Drop => BarMergeOutcome::DiscardedLate,
            LateDataPolicy::Correct => self.insert_late(bar),
        }
    }

    /// Refine the last bar with a trade.
    ///
    /// `now_secs` is the current wall-clock time in epoch seconds.
    pub fn apply_trade(&mut self, trade: &Trade, now_secs: i64, policy: &MergePolicy) -> TradeOutcome {
        if !self.accepts(&trade.symbol) {
            return TradeOutcome::SymbolMismatch;
        }
        let tolerance = policy.trade_tolerance_secs;
        let Some(last) = self.bars.back_mut() else {
            return TradeOutcome::NoOpenBar;
        };

        let tt = trade.time_secs();
        if tt < last.time - tolerance {
            return TradeOutcome::Stale;
        }
        if (tt - last.time).abs() <= tolerance || (tt - now_secs).abs() <= tolerance {
            last.refine(trade.price, trade.size);
            return TradeOutcome::Refined;
        }
        TradeOutcome::OutOfWindow
    }

    /// Index of the bar a new event at `time` should overwrite.
    ///
    /// An exact bucket match wins; otherwise the newest bar within
    /// `tolerance` is chosen.
    fn replace_target(&self, time: i64, tolerance: i64) -> Option<usize> {
        let exact = self.bars.partition_point(|b| b.time < time);
        if self.bars.get(exact).is_some_and(|b| b.time == time) {
            return Some(exact);
        }
        self.bars
            .iter()
            .rposition(|b| (b.time - time).abs() <= tolerance)
    }

    fn push_evicting(&mut self, bar: Bar) -> Option<i64> {
        let evicted = if self.bars.len() >= self.capacity {
            self.bars.pop_front().map(|b| b.time)
        } else {
            None
        };
        self.bars.push_back(bar);
        evicted
    }

    fn insert_late(&mut self, bar: Bar) -> BarMergeOutcome {
        let full = self.bars.len() >= self.capacity;
        if full && self.bars.front().is_some_and(|front| bar.time < front.time) {
            return BarMergeOutcome::DiscardedLate;
        }
        let idx = self.bars.partition_point(|b| b.time < bar.time);
        self.bars.insert(idx, bar);
        if self.bars.len() > self.capacity {
            self.bars.pop_front();
        }
        BarMergeOutcome::Inserted
    }
}
