//! reclaim-core — shared types for the idle compute reaper.
//!
//! Holds the record types exchanged with the cloud (instances, volumes,
//! utilization samples), the `reclaim.toml` config parser, and the
//! gateway traits through which every cloud call is made. The
//! [`memory`] module provides in-memory gateways that record each call.

pub mod config;
pub mod gateway;
pub mod memory;
pub mod types;

pub use config::{ConfigError, ReclaimConfig};
pub use gateway::{
    ComputeGateway, GatewayError, GatewayFuture, GatewayResult, InstancePage, InstanceQuery,
    MetricQuery, MetricsGateway,
};
pub use types::*;
