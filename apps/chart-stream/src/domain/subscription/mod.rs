//! Subscription Registry
//!
//! The set of symbols one connection streams. It outlives individual
//! sockets: on every open the full set is replayed, so a reconnect restores
//! exactly the symbols that were active before the drop.

use super::market::Symbol;

/// Insertion-ordered, de-duplicated symbol set.
///
/// Symbols are stored as given (trimmed); the feed is sent the consumer's
/// spelling. Duplicates are detected on the trimmed string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionRegistry {
    symbols: Vec<Symbol>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            symbols: Vec::new(),
        }
    }

    /// Add symbols.
    ///
    /// Returns the symbols that were not already present, in request order.
    /// Blank entries are ignored.
    pub fn add<S: AsRef<str>>(&mut self, symbols: &[S]) -> Vec<Symbol> {
        let mut added = Vec::new();
        for symbol in symbols {
            let symbol = symbol.as_ref().trim();
            if symbol.is_empty() || self.contains(symbol) {
                continue;
            }
            self.symbols.push(symbol.to_string());
            added.push(symbol.to_string());
        }
        added
    }

    /// Remove symbols.
    ///
    /// Returns the symbols that were actually present.
    pub fn remove<S: AsRef<str>>(&mut self, symbols: &[S]) -> Vec<Symbol> {
        let mut removed = Vec::new();
        for symbol in symbols {
            let symbol = symbol.as_ref().trim();
            if let Some(pos) = self.symbols.iter().position(|s| s == symbol) {
                removed.push(self.symbols.remove(pos));
            }
        }
        removed
    }

    /// Whether a symbol is registered.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }

    /// Registered symbols in insertion order.
    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Number of registered symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Drop every symbol.
    pub fn clear(&mut self) {
        self.symbols.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_returns_only_new_symbols() {
        let mut registry = SubscriptionRegistry::new();

        assert_eq!(registry.add(&["BTC", "ETH"]), vec!["BTC", "ETH"]);
        assert_eq!(registry.add(&["ETH", "SOL"]), vec!["SOL"]);
        assert_eq!(registry.symbols(), ["BTC", "ETH", "SOL"]);
    }

    #[test]
    fn duplicates_in_one_request_are_collapsed() {
        let mut registry = SubscriptionRegistry::new();

        assert_eq!(registry.add(&["AAPL", " AAPL ", ""]), vec!["AAPL"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_returns_only_present_symbols() {
        let mut registry = SubscriptionRegistry::new();
        registry.add(&["BTC", "ETH"]);

        assert_eq!(registry.remove(&["ETH", "DOGE"]), vec!["ETH"]);
        assert!(!registry.contains("ETH"));
        assert!(registry.contains("BTC"));
    }

    #[test]
    fn clear_empties_registry() {
        let mut registry = SubscriptionRegistry::new();
        registry.add(&["BTC"]);
        registry.clear();

        assert!(registry.is_empty());
        assert!(registry.remove(&["BTC"]).is_empty());
    }

    #[test]
    fn insertion_order_survives_removal() {
        let mut registry = SubscriptionRegistry::new();
        registry.add(&["A", "B", "C"]);
        registry.remove(&["B"]);
        registry.add(&["B"]);

        assert_eq!(registry.symbols(), ["A", "C", "B"]);
    }
}
