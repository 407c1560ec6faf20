//! Bar Store
//!
//! Bounded, time-ordered bar buffers per symbol and the rules for folding
//! bar and trade events into them.
//!
//! # Merge rules
//!
//! A bar event at bucket time `t`:
//! 1. replaces a buffered bar within the replace tolerance,
//! 2. seeds an empty buffer,
//! 3. appends when `t ≥ last.time`, evicting the oldest bar on overflow,
//! 4. otherwise is late and handled by [`LateDataPolicy`].
//!
//! A trade only ever refines the last bar, and only when its time is close
//! to that bar's bucket or to the current wall clock.

mod series;
mod store;

pub use series::{BarMergeOutcome, BarSeries, LateDataPolicy, MergePolicy, TradeOutcome};
pub use store::BarStore;

/// Default ring-buffer capacity per symbol.
pub const DEFAULT_MAX_BARS: usize = 200;
