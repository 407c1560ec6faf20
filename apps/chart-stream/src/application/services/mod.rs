//! Application Services
//!
//! The per-channel engine facade, the registry that owns engines, and the
//! latest-price cache they maintain.

pub mod engine;
pub mod prices;
pub mod registry;

pub use engine::{EngineConfig, MarketDataEngine};
pub use prices::{LatestPrice, PriceCache};
pub use registry::EngineRegistry;
