//! Stream Configuration Settings
//!
//! Configuration types for the chart stream, loaded from environment
//! variables. Lookups go through a closure so tests can supply a map
//! instead of touching the process environment.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::domain::bars::{LateDataPolicy, MergePolicy, DEFAULT_MAX_BARS};
use crate::domain::market::DataChannel;
use crate::infrastructure::dispatch::DEFAULT_BUS_CAPACITY;
use crate::infrastructure::feed::BackoffStrategy;

/// Bar store settings.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Ring-buffer capacity per symbol.
    pub max_bars: usize,
    /// Replace tolerance for bar events, seconds.
    pub bar_tolerance_secs: i64,
    /// Refinement tolerance for trades, seconds.
    pub trade_tolerance_secs: i64,
    /// Handling of bars older than the newest buffered bucket.
    pub late_data: LateDataPolicy,
}

impl Default for StoreSettings {
    fn default() -> Self {
        let policy = MergePolicy::canonical();
        Self {
            max_bars: DEFAULT_MAX_BARS,
            bar_tolerance_secs: policy.bar_tolerance_secs,
            trade_tolerance_secs: policy.trade_tolerance_secs,
            late_data: policy.late_data,
        }
    }
}

impl StoreSettings {
    /// Merge policy described by these settings.
    #[must_use]
    pub const fn merge_policy(&self) -> MergePolicy {
        MergePolicy {
            bar_tolerance_secs: self.bar_tolerance_secs,
            trade_tolerance_secs: self.trade_tolerance_secs,
            late_data: self.late_data,
        }
    }
}

/// Feed connection settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Pause between open and subscription replay.
    pub settle_delay: Duration,
    /// Backoff delay unit.
    pub reconnect_base: Duration,
    /// Upper bound on a single backoff delay.
    pub reconnect_max_delay: Duration,
    /// Reconnect attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Backoff growth.
    pub backoff: BackoffStrategy,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(100),
            reconnect_base: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            max_reconnect_attempts: 5,
            backoff: BackoffStrategy::Linear,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health, metrics and series HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete chart stream configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Feed host, with optional port.
    pub host: String,
    /// `ws` or `wss`.
    pub scheme: String,
    /// Channels to connect at startup.
    pub channels: Vec<DataChannel>,
    /// Startup symbols per channel.
    pub symbols: BTreeMap<DataChannel, Vec<String>>,
    /// Bar store settings.
    pub store: StoreSettings,
    /// Feed connection settings.
    pub feed: FeedSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Broadcast bus capacity per channel.
    pub dispatch_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: "localhost:8000".to_string(),
            scheme: "ws".to_string(),
            channels: vec![DataChannel::Crypto, DataChannel::Stocks],
            symbols: BTreeMap::new(),
            store: StoreSettings::default(),
            feed: FeedSettings::default(),
            server: ServerSettings::default(),
            dispatch_capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

impl StreamConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel list is empty or names an unknown
    /// channel, or if the host is set but empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`StreamConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = match lookup("CHART_STREAM_HOST") {
            Some(host) if host.trim().is_empty() => {
                return Err(ConfigError::EmptyValue("CHART_STREAM_HOST".to_string()));
            }
            Some(host) => host.trim().to_string(),
            None => defaults.host,
        };

        let scheme = lookup("CHART_STREAM_SCHEME")
            .map(|s| s.trim().to_lowercase())
            .filter(|s| s == "ws" || s == "wss")
            .unwrap_or(defaults.scheme);

        let channels = match lookup("CHART_STREAM_CHANNELS") {
            Some(raw) => parse_channels(&raw)?,
            None => defaults.channels,
        };

        let symbols = channels
            .iter()
            .filter_map(|channel| {
                let key = format!("CHART_STREAM_SYMBOLS_{}", channel.as_str().to_uppercase());
                let list = parse_list(&lookup(&key)?);
                (!list.is_empty()).then_some((*channel, list))
            })
            .collect();

        let store_defaults = StoreSettings::default();
        let store = StoreSettings {
            max_bars: parse_or(&lookup, "CHART_STREAM_MAX_BARS", store_defaults.max_bars),
            bar_tolerance_secs: parse_tolerance_secs(
                &lookup,
                "CHART_STREAM_BAR_TOLERANCE_SECS",
                store_defaults.bar_tolerance_secs,
            ),
            trade_tolerance_secs: parse_tolerance_secs(
                &lookup,
                "CHART_STREAM_TRADE_TOLERANCE_SECS",
                store_defaults.trade_tolerance_secs,
            ),
            late_data: lookup("CHART_STREAM_LATE_DATA")
                .and_then(|s| LateDataPolicy::from_str_case_insensitive(&s))
                .unwrap_or(store_defaults.late_data),
        };

        let feed_defaults = FeedSettings::default();
        let feed = FeedSettings {
            settle_delay: parse_duration_millis(
                &lookup,
                "CHART_STREAM_SETTLE_DELAY_MS",
                feed_defaults.settle_delay,
            ),
            reconnect_base: parse_duration_millis(
                &lookup,
                "CHART_STREAM_RECONNECT_BASE_MS",
                feed_defaults.reconnect_base,
            ),
            reconnect_max_delay: parse_duration_secs(
                &lookup,
                "CHART_STREAM_RECONNECT_MAX_DELAY_SECS",
                feed_defaults.reconnect_max_delay,
            ),
            max_reconnect_attempts: parse_or(
                &lookup,
                "CHART_STREAM_MAX_RECONNECT_ATTEMPTS",
                feed_defaults.max_reconnect_attempts,
            ),
            backoff: lookup("CHART_STREAM_BACKOFF")
                .and_then(|s| BackoffStrategy::from_str_case_insensitive(&s))
                .unwrap_or(feed_defaults.backoff),
        };

        let server = ServerSettings {
            health_port: parse_or(
                &lookup,
                "CHART_STREAM_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        Ok(Self {
            host,
            scheme,
            channels,
            symbols,
            store,
            feed,
            server,
            dispatch_capacity: parse_or(
                &lookup,
                "CHART_STREAM_DISPATCH_CAPACITY",
                defaults.dispatch_capacity,
            ),
        })
    }

    /// Socket URL for a channel.
    #[must_use]
    pub fn channel_url(&self, channel: DataChannel) -> String {
        format!("{}://{}{}", self.scheme, self.host, channel.stream_path())
    }

    /// Startup symbols for a channel.
    #[must_use]
    pub fn symbols_for(&self, channel: DataChannel) -> &[String] {
        self.symbols.get(&channel).map_or(&[], Vec::as_slice)
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// A channel name is not recognised.
    #[error("unknown data channel: {0}")]
    UnknownChannel(String),
    /// No channel is configured.
    #[error("at least one data channel must be configured")]
    NoChannels,
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_channels(raw: &str) -> Result<Vec<DataChannel>, ConfigError> {
    let mut channels = Vec::new();
    for name in parse_list(raw) {
        let channel = DataChannel::from_str_case_insensitive(&name)
            .ok_or(ConfigError::UnknownChannel(name))?;
        if !channels.contains(&channel) {
            channels.push(channel);
        }
    }
    if channels.is_empty() {
        return Err(ConfigError::NoChannels);
    }
    Ok(channels)
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// A tolerance window; negative values fall back to the default.
fn parse_tolerance_secs<F>(lookup: &F, key: &str, default: i64) -> i64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|secs| *secs >= 0)
        .unwrap_or(default)
}

fn parse_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
