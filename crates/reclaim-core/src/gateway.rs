//! Capability interfaces for the compute and metrics services.
//!
//! Components receive these as `Arc<dyn …>` so a sweep can run against
//! the real cloud or against the in-memory gateways in [`crate::memory`].
//! Methods return boxed futures so the traits stay object safe.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::types::{Instance, InstanceId, InstanceLifecycle, UtilizationSample, Volume};

/// Result type alias for gateway calls.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Boxed future returned by every gateway method.
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = GatewayResult<T>> + Send + 'a>>;

/// Errors reported by a gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The addressed resource does not exist (or no longer exists).
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// The service rejected or failed the call.
    #[error("{operation} failed: {message}")]
    Service {
        operation: &'static str,
        code: Option<String>,
        message: String,
    },
}

impl GatewayError {
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        GatewayError::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn service(operation: &'static str, message: impl Into<String>) -> Self {
        GatewayError::Service {
            operation,
            code: None,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound { .. })
    }
}

/// One page request against the instance listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceQuery {
    /// Only instances in this lifecycle state are returned.
    pub state: InstanceLifecycle,
    /// Upper bound on instances per page.
    pub page_size: i32,
    /// Continuation token from the previous page.
    pub next_token: Option<String>,
}

/// One page of the instance listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstancePage {
    pub instances: Vec<Instance>,
    /// `None` when no further pages remain.
    pub next_token: Option<String>,
}

/// Windowed maximum-statistic query for one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricQuery {
    pub namespace: String,
    pub metric_name: String,
    /// Dimension name, e.g. `InstanceId`.
    pub dimension_name: String,
    /// Dimension value, the instance identifier.
    pub dimension_value: String,
    /// Window start, Unix seconds (inclusive).
    pub start_secs: u64,
    /// Window end, Unix seconds (exclusive).
    pub end_secs: u64,
    /// Aggregation period in seconds.
    pub period_secs: u32,
    pub unit: Option<String>,
}

/// Compute service operations the reaper needs.
pub trait ComputeGateway: Send + Sync {
    /// Fetch one page of instances matching `query`.
    fn list_instances<'a>(&'a self, query: &'a InstanceQuery) -> GatewayFuture<'a, InstancePage>;

    /// Terminate all given instances in a single call.
    fn terminate_instances<'a>(&'a self, instance_ids: &'a [InstanceId]) -> GatewayFuture<'a, ()>;

    /// Describe one volume. A missing volume is `GatewayError::NotFound`.
    fn describe_volume<'a>(&'a self, volume_id: &'a str) -> GatewayFuture<'a, Volume>;

    /// Detach a volume from whatever instance holds it.
    fn detach_volume<'a>(&'a self, volume_id: &'a str, force: bool) -> GatewayFuture<'a, ()>;

    fn delete_volume<'a>(&'a self, volume_id: &'a str) -> GatewayFuture<'a, ()>;
}

/// Metrics service operations the reaper needs.
pub trait MetricsGateway: Send + Sync {
    /// Maximum-statistic samples for `query`, one per aggregation period.
    fn maximum_series<'a>(
        &'a self,
        query: &'a MetricQuery,
    ) -> GatewayFuture<'a, Vec<UtilizationSample>>;
}
