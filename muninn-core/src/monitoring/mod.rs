//! Observability: the Prometheus metrics registry and the
//! health/ready/metrics HTTP server.

pub mod metrics;
pub mod server;

pub use metrics::MetricsRegistry;
pub use server::{ObsServer, ObsServerConfig, ReadinessProbes};
