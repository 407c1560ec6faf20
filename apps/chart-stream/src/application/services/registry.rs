//! Engine registry: one engine per data channel, created on demand.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::engine::{EngineConfig, MarketDataEngine};
use crate::application::ports::Transport;
use crate::domain::market::DataChannel;
use crate::infrastructure::config::StreamConfig;

/// Owns the engines of a process. Channels share the transport and
/// nothing else.
pub struct EngineRegistry {
    transport: Arc<dyn Transport>,
    config: StreamConfig,
    engines: RwLock<BTreeMap<DataChannel, Arc<MarketDataEngine>>>,
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("channels", &self.engines.read().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl EngineRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(config: StreamConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config,
            engines: RwLock::new(BTreeMap::new()),
        }
    }

    /// Settings engines are built from.
    #[must_use]
    pub const fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Engine for a channel, created on first use.
    pub fn engine(&self, channel: DataChannel) -> Arc<MarketDataEngine> {
        if let Some(engine) = self.engines.read().get(&channel) {
            return Arc::clone(engine);
        }

        let mut engines = self.engines.write();
        Arc::clone(engines.entry(channel).or_insert_with(|| {
            tracing::debug!(channel = %channel, "Creating engine");
            Arc::new(MarketDataEngine::new(
                &EngineConfig::for_channel(&self.config, channel),
                Arc::clone(&self.transport),
            ))
        }))
    }

    /// Engine for a channel if one exists.
    #[must_use]
    pub fn get(&self, channel: DataChannel) -> Option<Arc<MarketDataEngine>> {
        self.engines.read().get(&channel).cloned()
    }

    /// Existing engines in channel order.
    #[must_use]
    pub fn engines(&self) -> Vec<Arc<MarketDataEngine>> {
        self.engines.read().values().cloned().collect()
    }

    /// Disconnect every engine.
    pub async fn shutdown(&self) {
        for engine in self.engines() {
            engine.disconnect().await;
        }
    }
}
