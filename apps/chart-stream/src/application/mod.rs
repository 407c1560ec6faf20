//! Application Layer - Ports and the engine facade.
//!
//! Ports describe what the engine needs from the outside (a socket, a place
//! to deliver events). Services wire the domain rules to those ports.

/// Port interfaces for the transport and event delivery.
pub mod ports;

/// Per-channel engine and the registry that owns them.
pub mod services;
