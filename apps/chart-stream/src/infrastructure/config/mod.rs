//! Configuration Module
//!
//! Environment-driven configuration for the chart stream.

mod settings;

pub use settings::{ConfigError, FeedSettings, ServerSettings, StoreSettings, StreamConfig};
