//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports plus the process
//! plumbing: configuration, metrics, tracing and the HTTP endpoint.

/// Feed socket: wire messages, codec, backoff and the connection driver.
pub mod feed;

/// Listener fan-out and broadcast bus.
pub mod dispatch;

/// Configuration from the environment.
pub mod config;

/// Health, metrics and series HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
