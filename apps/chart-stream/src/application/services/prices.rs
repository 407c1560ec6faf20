//! Latest-price cache.

use std::collections::HashMap;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::market::normalize_symbol;

/// Most recent price seen for a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatestPrice {
    /// Symbol as last reported by the feed.
    pub symbol: String,
    /// Last price.
    pub price: Decimal,
    /// Event time, epoch milliseconds.
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone)]
struct Entry {
    latest: LatestPrice,
    /// Bucket start of the newest bar close seen, epoch milliseconds.
    bar_time_ms: Option<i64>,
}

/// Last known price per symbol, keyed by normalized symbol.
///
/// Trade and quote prices are ordered by event time. Bar closes are ordered
/// against other bars by bucket start, so a reissued bar for the open bucket
/// replaces a tick seen inside that bucket.
#[derive(Debug, Default)]
pub struct PriceCache {
    prices: RwLock<HashMap<String, Entry>>,
}

impl PriceCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a trade or quote price. Returns `false` if a newer price is
    /// already cached.
    pub fn update(&self, symbol: &str, price: Decimal, timestamp_ms: i64) -> bool {
        let key = normalize_symbol(symbol);
        if key.is_empty() {
            return false;
        }
        let mut prices = self.prices.write();
        let bar_time_ms = match prices.get(&key) {
            Some(existing) if existing.latest.timestamp_ms > timestamp_ms => return false,
            Some(existing) => existing.bar_time_ms,
            None => None,
        };
        prices.insert(
            key,
            Entry {
                latest: LatestPrice {
                    symbol: symbol.to_string(),
                    price,
                    timestamp_ms,
                },
                bar_time_ms,
            },
        );
        true
    }

    /// Record a bar close for the bucket starting at `bar_time_ms`.
    ///
    /// Returns `false` if a bar for a later bucket is already cached.
    pub fn update_bar(&self, symbol: &str, close: Decimal, bar_time_ms: i64) -> bool {
        let key = normalize_symbol(symbol);
        if key.is_empty() {
            return false;
        }
        let mut prices = self.prices.write();
        let timestamp_ms = match prices.get(&key) {
            Some(existing) if existing.bar_time_ms.is_some_and(|t| t > bar_time_ms) => return false,
            Some(existing) => existing.latest.timestamp_ms.max(bar_time_ms),
            None => bar_time_ms,
        };
        prices.insert(
            key,
            Entry {
                latest: LatestPrice {
                    symbol: symbol.to_string(),
                    price: close,
                    timestamp_ms,
                },
                bar_time_ms: Some(bar_time_ms),
            },
        );
        true
    }

    /// Latest price for a symbol, under any spelling.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<LatestPrice> {
        self.prices
            .read()
            .get(&normalize_symbol(symbol))
            .map(|entry| entry.latest.clone())
    }

    /// Every cached price, sorted by symbol.
    #[must_use]
    pub fn all(&self) -> Vec<LatestPrice> {
        let mut prices: Vec<LatestPrice> = self
            .prices
            .read()
            .values()
            .map(|entry| entry.latest.clone())
            .collect();
        prices.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        prices
    }

    /// Forget a symbol's price.
    pub fn remove(&self, symbol: &str) -> bool {
        self.prices.write().remove(&normalize_symbol(symbol)).is_some()
    }

    /// Forget every price.
    pub fn clear(&self) {
        self.prices.write().clear();
    }
}
