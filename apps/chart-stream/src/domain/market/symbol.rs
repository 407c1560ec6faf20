//! Symbol normalization.
//!
//! The feed and its consumers disagree about how a pair is spelled
//! (`BTC/USD`, `BTC-USD`, `BTCUSD`, `BTC`). Everything that keys a series
//! goes through [`normalize_symbol`] first.

/// Characters dropped before comparison.
const SEPARATORS: [char; 5] = ['/', '-', '_', '.', ':'];

/// Quote-currency suffixes, longest first so `USDT` wins over `USD`.
const QUOTE_SUFFIXES: [&str; 3] = ["USDT", "USDC", "USD"];

/// Canonical form of a symbol.
///
/// Separators and whitespace are removed, the result is upper-cased, and one
/// trailing quote-currency suffix is stripped when something remains.
#[must_use]
pub fn normalize_symbol(raw: &str) -> String {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !SEPARATORS.contains(c))
        .flat_map(char::to_uppercase)
        .collect();

    for suffix in QUOTE_SUFFIXES {
        if let Some(base) = compact.strip_suffix(suffix)
            && !base.is_empty()
        {
            return base.to_string();
        }
    }
    compact
}

/// Whether two symbols refer to the same series.
#[must_use]
pub fn symbols_match(a: &str, b: &str) -> bool {
    a == b || normalize_symbol(a) == normalize_symbol(b)
}
