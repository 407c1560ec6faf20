//! Market Data Engine
//!
//! Per-channel facade tying a [`Connection`] to a [`BarStore`], a
//! [`PriceCache`] and a [`Dispatcher`]. Every decoded event is folded into
//! the store first, then fanned out, so a listener reading the series from
//! inside its callback already sees the event applied.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::broadcast;

use super::prices::{LatestPrice, PriceCache};
use crate::application::ports::{EventSink, Transport};
use crate::domain::bars::{BarStore, MergePolicy, DEFAULT_MAX_BARS};
use crate::domain::chart::{project, ChartRepresentation, SeriesPoint};
use crate::domain::market::{now_secs, symbols_match, Bar, DataChannel, Symbol};
use crate::domain::streaming::FeedEvent;
use crate::domain::timeframe::{resample, Timeframe};
use crate::infrastructure::config::StreamConfig;
use crate::infrastructure::dispatch::{Dispatcher, ListenerId, DEFAULT_BUS_CAPACITY};
use crate::infrastructure::feed::{
    Connection, ConnectionConfig, ConnectionState, ReconnectConfig,
};
use crate::infrastructure::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for one channel's engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Channel served.
    pub channel: DataChannel,
    /// Socket URL.
    pub url: String,
    /// Merge tolerances and late-data handling.
    pub policy: MergePolicy,
    /// Bars kept per symbol.
    pub max_bars: usize,
    /// Pause between open and subscription replay.
    pub settle_delay: Duration,
    /// Backoff schedule.
    pub reconnect: ReconnectConfig,
    /// Broadcast bus capacity.
    pub dispatch_capacity: usize,
}

impl EngineConfig {
    /// Defaults for a channel at `url`.
    #[must_use]
    pub fn new(channel: DataChannel, url: impl Into<String>) -> Self {
        Self {
            channel,
            url: url.into(),
            policy: MergePolicy::canonical(),
            max_bars: DEFAULT_MAX_BARS,
            settle_delay: Duration::from_millis(100),
            reconnect: ReconnectConfig::default(),
            dispatch_capacity: DEFAULT_BUS_CAPACITY,
        }
    }

    /// Derive a channel's configuration from the stream settings.
    #[must_use]
    pub fn for_channel(config: &StreamConfig, channel: DataChannel) -> Self {
        Self {
            channel,
            url: config.channel_url(channel),
            policy: config.store.merge_policy(),
            max_bars: config.store.max_bars,
            settle_delay: config.feed.settle_delay,
            reconnect: ReconnectConfig::from_feed_settings(&config.feed),
            dispatch_capacity: config.dispatch_capacity,
        }
    }

    fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.url.clone(),
            channel: self.channel,
            settle_delay: self.settle_delay,
            reconnect: self.reconnect.clone(),
        }
    }
}

// =============================================================================
// Ingest
// =============================================================================

/// Event sink handed to the connection: merge, cache, then fan out.
struct Ingest {
    channel: DataChannel,
    store: Arc<BarStore>,
    prices: Arc<PriceCache>,
    dispatcher: Arc<Dispatcher>,
}

impl EventSink for Ingest {
    fn on_event(&self, event: FeedEvent) {
        match &event {
            FeedEvent::Bar(bar) => {
                self.prices
                    .update_bar(&bar.symbol, bar.close, bar.time.saturating_mul(1000));
                let outcome = self.store.merge_bar(bar.clone());
                metrics::record_bar_merge(self.channel, outcome);
                if !outcome.is_applied() {
                    tracing::debug!(
                        channel = %self.channel,
                        symbol = %bar.symbol,
                        time = bar.time,
                        outcome = outcome.as_str(),
                        "Bar not merged"
                    );
                }
            }
            FeedEvent::Trade(trade) => {
                self.prices.update(&trade.symbol, trade.price, trade.timestamp_ms);
                let outcome = self.store.apply_trade(trade, now_secs());
                metrics::record_trade(self.channel, outcome);
            }
            FeedEvent::Quote(quote) => {
                if let Some(mid) = quote.midpoint() {
                    self.prices.update(&quote.symbol, mid, quote.timestamp_ms);
                }
            }
            FeedEvent::Connected { message } => {
                tracing::info!(channel = %self.channel, message = %message, "Feed greeted");
            }
            FeedEvent::Subscribed { symbols } => {
                tracing::debug!(channel = %self.channel, symbols = ?symbols, "Subscription confirmed");
            }
            FeedEvent::Error(error) if error.is_fatal() => {
                tracing::error!(channel = %self.channel, error = %error, "Feed gave up");
            }
            FeedEvent::Error(error) => {
                tracing::warn!(channel = %self.channel, error = %error, "Feed error");
            }
        }

        self.dispatcher.dispatch(&event);
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Streaming and aggregation engine for one data channel.
pub struct MarketDataEngine {
    channel: DataChannel,
    store: Arc<BarStore>,
    prices: Arc<PriceCache>,
    dispatcher: Arc<Dispatcher>,
    connection: Connection,
    #[cfg(test)]
    ingest: Arc<Ingest>,
}

impl std::fmt::Debug for MarketDataEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataEngine")
            .field("channel", &self.channel)
            .field("connection", &self.connection)
            .field("tracked", &self.store.len())
            .finish_non_exhaustive()
    }
}

impl MarketDataEngine {
    /// Create a disconnected engine.
    #[must_use]
    pub fn new(config: &EngineConfig, transport: Arc<dyn Transport>) -> Self {
        let store = Arc::new(BarStore::new(config.policy, config.max_bars));
        let prices = Arc::new(PriceCache::new());
        let dispatcher = Arc::new(Dispatcher::new(config.dispatch_capacity));
        let ingest = Arc::new(Ingest {
            channel: config.channel,
            store: Arc::clone(&store),
            prices: Arc::clone(&prices),
            dispatcher: Arc::clone(&dispatcher),
        });
        let connection = Connection::new(
            config.connection_config(),
            transport,
            Arc::clone(&ingest) as Arc<dyn EventSink>,
        );

        Self {
            channel: config.channel,
            store,
            prices,
            dispatcher,
            connection,
            #[cfg(test)]
            ingest,
        }
    }

    /// Channel served.
    #[must_use]
    pub const fn channel(&self) -> DataChannel {
        self.channel
    }

    /// Open the socket. No-op while already connecting or open.
    pub fn connect(&self) {
        self.connection.connect();
    }

    /// Close the socket, clear subscriptions and detach every listener.
    ///
    /// Bar series and cached prices are kept.
    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
        self.dispatcher.clear_listeners();
    }

    /// Track and subscribe symbols. Returns the symbols newly registered
    /// with the connection.
    pub fn subscribe<S: AsRef<str>>(&self, symbols: &[S]) -> Vec<Symbol> {
        for symbol in symbols {
            self.store.track(symbol.as_ref());
        }
        metrics::set_tracked_symbols(self.channel, self.store.len());
        self.connection.subscribe(symbols)
    }

    /// Unsubscribe symbols. Their series stay readable.
    pub fn unsubscribe<S: AsRef<str>>(&self, symbols: &[S]) -> Vec<Symbol> {
        self.connection.unsubscribe(symbols)
    }

    /// Register a synchronous listener.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&FeedEvent) + Send + Sync + 'static,
    {
        self.dispatcher.add_listener(listener)
    }

    /// Remove a listener. Returns `false` for stale or unknown handles.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.dispatcher.remove_listener(id)
    }

    /// Broadcast receiver for async consumers.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<FeedEvent> {
        self.dispatcher.subscribe()
    }

    /// Broadcast receiver as a stream that skips lag gaps.
    #[must_use]
    pub fn events(&self) -> impl Stream<Item = FeedEvent> + Send + 'static {
        self.dispatcher.event_stream()
    }

    /// Chart series for a symbol at a timeframe and representation.
    ///
    /// Empty for untracked symbols.
    #[must_use]
    pub fn get_series(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        representation: ChartRepresentation,
    ) -> Vec<SeriesPoint> {
        let bars = self.store.snapshot(symbol).unwrap_or_default();
        project(&resample(&bars, timeframe), representation)
    }

    /// Base-resolution bars for a symbol, oldest first.
    #[must_use]
    pub fn base_series(&self, symbol: &str) -> Vec<Bar> {
        self.store.snapshot(symbol).unwrap_or_default()
    }

    /// Drop a symbol's bars but keep tracking it.
    pub fn clear_series(&self, symbol: &str) -> bool {
        self.store.clear(symbol)
    }

    /// Stop tracking a symbol: unsubscribe, drop its bars and cached price.
    pub fn untrack(&self, symbol: &str) -> bool {
        let registered: Vec<Symbol> = self
            .connection
            .state()
            .subscribed_symbols
            .into_iter()
            .filter(|s| symbols_match(s, symbol))
            .collect();
        self.connection.unsubscribe(&registered);
        self.prices.remove(symbol);
        let removed = self.store.untrack(symbol);
        metrics::set_tracked_symbols(self.channel, self.store.len());
        removed
    }

    /// Tracked symbols as first spelled, sorted.
    #[must_use]
    pub fn tracked_symbols(&self) -> Vec<String> {
        self.store.tracked_symbols()
    }

    /// Latest price for a symbol from bars, trades or quote midpoints.
    #[must_use]
    pub fn latest_price(&self, symbol: &str) -> Option<LatestPrice> {
        self.prices.get(symbol)
    }

    /// Every cached price, sorted by symbol.
    #[must_use]
    pub fn latest_prices(&self) -> Vec<LatestPrice> {
        self.prices.all()
    }

    /// Whether the socket is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Snapshot of the connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.dispatcher.listener_count()
    }

    #[cfg(test)]
    pub(crate) fn ingest(&self, event: FeedEvent) {
        self.ingest.on_event(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::application::ports::{TransportError, TransportSession};
    use crate::domain::chart::{Direction, HistogramPoint, ValuePoint};
    use crate::domain::market::{Quote, Trade};
    use crate::domain::test_support::{d, flat_bar, ohlc_bar};

    struct RefusingTransport;

    #[async_trait]
    impl Transport for RefusingTransport {
        async fn open(&self, url: &str) -> Result<TransportSession, TransportError> {
            Err(TransportError::ConnectFailed {
                message: format!("refused: {url}"),
            })
        }
    }

    fn engine() -> MarketDataEngine {
        MarketDataEngine::new(
            &EngineConfig::new(DataChannel::Crypto, "ws://test/ws/alpaca/crypto"),
            Arc::new(RefusingTransport),
        )
    }

    #[test]
    fn for_channel_uses_stream_settings() {
        let mut stream = StreamConfig::default();
        stream.host = "feed:9000".to_string();
        stream.store.max_bars = 50;

        let config = EngineConfig::for_channel(&stream, DataChannel::Options);
        assert_eq!(config.url, "ws://feed:9000/ws/alpaca/options");
        assert_eq!(config.max_bars, 50);
        assert_eq!(config.reconnect.max_attempts, 5);
    }

    #[test]
    fn bars_for_any_spelling_merge_into_one_series() {
        let engine = engine();
        engine.subscribe(&["BTC/USD"]);

        engine.ingest(FeedEvent::Bar(flat_bar("BTC/USD", 60, "100", "1")));
        engine.ingest(FeedEvent::Bar(flat_bar("BTCUSD", 120, "101", "1")));
        engine.ingest(FeedEvent::Bar(flat_bar("BTC", 180, "102", "1")));

        let times: Vec<i64> = engine.base_series("btc-usd").iter().map(|b| b.time).collect();
        assert_eq!(times, vec![60, 120, 180]);
        assert_eq!(engine.tracked_symbols(), vec!["BTC/USD"]);
    }

    #[test]
    fn untracked_symbols_are_ignored() {
        let engine = engine();
        engine.ingest(FeedEvent::Bar(flat_bar("ETH/USD", 60, "3000", "1")));
        assert!(engine.base_series("ETH/USD").is_empty());
        assert!(engine.get_series("ETH/USD", Timeframe::M1, ChartRepresentation::Line).is_empty());
    }

    #[test]
    fn get_series_resamples_and_projects() {
        let engine = engine();
        engine.subscribe(&["BTC"]);
        engine.ingest(FeedEvent::Bar(ohlc_bar("BTC", 0, ["100", "110", "95", "105", "2"])));
        engine.ingest(FeedEvent::Bar(ohlc_bar("BTC", 60, ["105", "106", "90", "92", "3"])));
        engine.ingest(FeedEvent::Bar(ohlc_bar("BTC", 300, ["92", "93", "91", "93", "1"])));

        let line = engine.get_series("BTC", Timeframe::M5, ChartRepresentation::Line);
        assert_eq!(
            line,
            vec![
                SeriesPoint::Value(ValuePoint { time: 0, value: d("92") }),
                SeriesPoint::Value(ValuePoint { time: 300, value: d("93") }),
            ]
        );

        let volume = engine.get_series("BTC", Timeframe::M5, ChartRepresentation::Histogram);
        assert_eq!(
            volume[0],
            SeriesPoint::Histogram(HistogramPoint {
                time: 0,
                value: d("5"),
                direction: Direction::Down,
            })
        );
    }

    #[test]
    fn listener_sees_event_after_merge() {
        let engine = Arc::new(engine());
        engine.subscribe(&["BTC"]);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let reader = Arc::clone(&engine);
        let sink = Arc::clone(&seen);
        engine.add_listener(move |event: &FeedEvent| {
            if matches!(event, FeedEvent::Bar(_)) {
                sink.lock().push(reader.base_series("BTC").len());
            }
        });

        engine.ingest(FeedEvent::Bar(flat_bar("BTC", 60, "100", "1")));
        engine.ingest(FeedEvent::Bar(flat_bar("BTC", 120, "100", "1")));

        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn trades_refine_open_bar_and_update_price() {
        let engine = engine();
        engine.subscribe(&["BTC"]);
        let now = now_secs();
        engine.ingest(FeedEvent::Bar(flat_bar("BTC", now, "100", "1")));
        engine.ingest(FeedEvent::Trade(Trade {
            symbol: "BTC/USD".to_string(),
            timestamp_ms: now * 1000 + 500,
            price: d("104"),
            size: d("0.5"),
        }));

        let last = engine.base_series("BTC").pop().unwrap();
        assert_eq!(last.close, d("104"));
        assert_eq!(last.high, d("104"));
        assert_eq!(last.volume, d("1.5"));
        assert_eq!(engine.latest_price("BTC").unwrap().price, d("104"));
    }

    #[test]
    fn reissued_bar_close_wins_over_earlier_trade() {
        let engine = engine();
        engine.subscribe(&["BTC"]);
        let now = now_secs();
        engine.ingest(FeedEvent::Bar(flat_bar("BTC", now, "100", "1")));
        engine.ingest(FeedEvent::Trade(Trade {
            symbol: "BTC".to_string(),
            timestamp_ms: now * 1000 + 500,
            price: d("104"),
            size: d("0.5"),
        }));

        engine.ingest(FeedEvent::Bar(ohlc_bar("BTC", now, ["100", "106", "100", "105", "2"])));

        assert_eq!(engine.latest_price("BTC").unwrap().price, d("105"));
        assert_eq!(engine.base_series("BTC").pop().unwrap().close, d("105"));
    }

    #[test]
    fn quotes_update_price_only() {
        let engine = engine();
        engine.subscribe(&["AAPL"]);
        engine.ingest(FeedEvent::Quote(Quote {
            symbol: "AAPL".to_string(),
            timestamp_ms: 1_000,
            bid_price: d("190"),
            bid_size: d("1"),
            ask_price: d("190.2"),
            ask_size: d("1"),
        }));

        assert_eq!(engine.latest_price("AAPL").unwrap().price, d("190.1"));
        assert!(engine.base_series("AAPL").is_empty());
        assert_eq!(engine.latest_prices().len(), 1);
    }

    #[test]
    fn clear_series_keeps_tracking() {
        let engine = engine();
        engine.subscribe(&["BTC"]);
        engine.ingest(FeedEvent::Bar(flat_bar("BTC", 60, "100", "1")));

        assert!(engine.clear_series("BTC"));
        assert!(engine.base_series("BTC").is_empty());

        engine.ingest(FeedEvent::Bar(flat_bar("BTC", 120, "100", "1")));
        assert_eq!(engine.base_series("BTC").len(), 1);
    }

    #[test]
    fn untrack_drops_series_price_and_subscription() {
        let engine = engine();
        engine.subscribe(&["BTC/USD", "ETH"]);
        engine.ingest(FeedEvent::Bar(flat_bar("BTC", 60, "100", "1")));

        assert!(engine.untrack("BTC"));
        assert!(!engine.untrack("BTC"));
        assert!(engine.latest_price("BTC").is_none());
        assert_eq!(engine.tracked_symbols(), vec!["ETH"]);
        assert_eq!(engine.connection_state().subscribed_symbols, vec!["ETH"]);
    }

    #[test]
    fn unsubscribe_keeps_series() {
        let engine = engine();
        engine.subscribe(&["BTC"]);
        engine.ingest(FeedEvent::Bar(flat_bar("BTC", 60, "100", "1")));

        assert_eq!(engine.unsubscribe(&["BTC"]), vec!["BTC"]);
        assert_eq!(engine.base_series("BTC").len(), 1);
        assert!(engine.connection_state().subscribed_symbols.is_empty());
    }

    #[tokio::test]
    async fn disconnect_detaches_listeners() {
        let engine = engine();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let id = engine.add_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        engine.disconnect().await;
        engine.ingest(FeedEvent::Connected {
            message: "hello".to_string(),
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(engine.listener_count(), 0);
        assert!(!engine.remove_listener(id));
    }
}
