//! In-memory gateways.
//!
//! `InMemoryCompute` and `InMemoryMetrics` hold a fake cloud inventory,
//! apply terminate/detach/delete to it, and record every call in order so
//! a sweep's side effects can be asserted. Failures can be injected per
//! operation, optionally scoped to one resource identifier.

use std::collections::{HashMap, HashSet};
use std::future::ready;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::gateway::{
    ComputeGateway, GatewayError, GatewayFuture, GatewayResult, InstancePage, InstanceQuery,
    MetricQuery, MetricsGateway,
};
use crate::types::{Instance, InstanceId, InstanceLifecycle, UtilizationSample, Volume, VolumeState};

/// Compute operations, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputeOp {
    ListInstances,
    TerminateInstances,
    DescribeVolume,
    DetachVolume,
    DeleteVolume,
}

impl ComputeOp {
    fn operation(&self) -> &'static str {
        match self {
            ComputeOp::ListInstances => "DescribeInstances",
            ComputeOp::TerminateInstances => "TerminateInstances",
            ComputeOp::DescribeVolume => "DescribeVolumes",
            ComputeOp::DetachVolume => "DetachVolume",
            ComputeOp::DeleteVolume => "DeleteVolume",
        }
    }
}

/// A call observed by [`InMemoryCompute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeCall {
    ListInstances {
        state: InstanceLifecycle,
        page_size: i32,
        next_token: Option<String>,
    },
    TerminateInstances(Vec<InstanceId>),
    DescribeVolume(String),
    DetachVolume { volume_id: String, force: bool },
    DeleteVolume(String),
}

struct FailRule {
    op: ComputeOp,
    target: Option<String>,
    message: String,
}

#[derive(Default)]
struct ComputeState {
    instances: Vec<Instance>,
    volumes: HashMap<String, Volume>,
    calls: Vec<ComputeCall>,
    failures: Vec<FailRule>,
}

impl ComputeState {
    fn check_failure(&self, op: ComputeOp, target: Option<&str>) -> GatewayResult<()> {
        let rule = self.failures.iter().find(|rule| {
            rule.op == op
                && match (&rule.target, target) {
                    (None, _) => true,
                    (Some(want), Some(got)) => want == got,
                    (Some(_), None) => false,
                }
        });
        match rule {
            Some(rule) => Err(GatewayError::service(op.operation(), rule.message.clone())),
            None => Ok(()),
        }
    }
}

/// In-memory compute service.
///
/// Listing pages through matching instances using the offset of the next
/// instance as the continuation token.
#[derive(Default)]
pub struct InMemoryCompute {
    state: Mutex<ComputeState>,
}

impl InMemoryCompute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instance(self, instance: Instance) -> Self {
        self.lock().instances.push(instance);
        self
    }

    pub fn with_volume(self, volume: Volume) -> Self {
        self.lock().volumes.insert(volume.id.clone(), volume);
        self
    }

    /// Fail every call of `op`.
    pub fn fail(self, op: ComputeOp, message: &str) -> Self {
        self.lock().failures.push(FailRule {
            op,
            target: None,
            message: message.to_string(),
        });
        self
    }

    /// Fail calls of `op` addressed to `target` only.
    pub fn fail_for(self, op: ComputeOp, target: &str, message: &str) -> Self {
        self.lock().failures.push(FailRule {
            op,
            target: Some(target.to_string()),
            message: message.to_string(),
        });
        self
    }

    /// All calls observed so far, in order.
    pub fn calls(&self) -> Vec<ComputeCall> {
        self.lock().calls.clone()
    }

    /// Instance identifiers passed to terminate calls, one entry per call.
    pub fn terminate_calls(&self) -> Vec<Vec<InstanceId>> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ComputeCall::TerminateInstances(ids) => Some(ids.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn detached_volumes(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ComputeCall::DetachVolume { volume_id, .. } => Some(volume_id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn deleted_volumes(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ComputeCall::DeleteVolume(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn instance(&self, id: &str) -> Option<Instance> {
        self.lock().instances.iter().find(|i| i.id == id).cloned()
    }

    pub fn volume(&self, id: &str) -> Option<Volume> {
        self.lock().volumes.get(id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, ComputeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn list_page(&self, query: &InstanceQuery) -> GatewayResult<InstancePage> {
        let mut state = self.lock();
        state.calls.push(ComputeCall::ListInstances {
            state: query.state,
            page_size: query.page_size,
            next_token: query.next_token.clone(),
        });
        state.check_failure(ComputeOp::ListInstances, None)?;

        let offset = match &query.next_token {
            Some(token) => token.parse::<usize>().map_err(|_| {
                GatewayError::service("DescribeInstances", format!("invalid token {token:?}"))
            })?,
            None => 0,
        };
        let page_size = usize::try_from(query.page_size.max(1)).unwrap_or(1);

        let matching: Vec<&Instance> = state
            .instances
            .iter()
            .filter(|i| i.state == query.state)
            .collect();
        let end = (offset + page_size).min(matching.len());
        let instances = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|i| (*i).clone())
            .collect();
        let next_token = (end < matching.len()).then(|| end.to_string());

        Ok(InstancePage {
            instances,
            next_token,
        })
    }

    fn terminate(&self, ids: &[InstanceId]) -> GatewayResult<()> {
        let mut state = self.lock();
        state.calls.push(ComputeCall::TerminateInstances(ids.to_vec()));
        state.check_failure(ComputeOp::TerminateInstances, None)?;

        if let Some(missing) = ids
            .iter()
            .find(|id| !state.instances.iter().any(|i| &i.id == *id))
        {
            return Err(GatewayError::not_found("instance", missing.clone()));
        }
        for instance in state.instances.iter_mut() {
            if ids.contains(&instance.id) {
                instance.state = InstanceLifecycle::Terminated;
            }
        }
        Ok(())
    }

    fn describe(&self, volume_id: &str) -> GatewayResult<Volume> {
        let mut state = self.lock();
        state
            .calls
            .push(ComputeCall::DescribeVolume(volume_id.to_string()));
        state.check_failure(ComputeOp::DescribeVolume, Some(volume_id))?;
        state
            .volumes
            .get(volume_id)
            .cloned()
            .ok_or_else(|| GatewayError::not_found("volume", volume_id))
    }

    fn detach(&self, volume_id: &str, force: bool) -> GatewayResult<()> {
        let mut state = self.lock();
        state.calls.push(ComputeCall::DetachVolume {
            volume_id: volume_id.to_string(),
            force,
        });
        state.check_failure(ComputeOp::DetachVolume, Some(volume_id))?;
        match state.volumes.get_mut(volume_id) {
            Some(volume) => {
                volume.state = VolumeState::Available;
                Ok(())
            }
            None => Err(GatewayError::not_found("volume", volume_id)),
        }
    }

    fn delete(&self, volume_id: &str) -> GatewayResult<()> {
        let mut state = self.lock();
        state
            .calls
            .push(ComputeCall::DeleteVolume(volume_id.to_string()));
        state.check_failure(ComputeOp::DeleteVolume, Some(volume_id))?;
        match state.volumes.remove(volume_id) {
            Some(_) => Ok(()),
            None => Err(GatewayError::not_found("volume", volume_id)),
        }
    }
}

impl ComputeGateway for InMemoryCompute {
    fn list_instances<'a>(&'a self, query: &'a InstanceQuery) -> GatewayFuture<'a, InstancePage> {
        Box::pin(ready(self.list_page(query)))
    }

    fn terminate_instances<'a>(&'a self, instance_ids: &'a [InstanceId]) -> GatewayFuture<'a, ()> {
        Box::pin(ready(self.terminate(instance_ids)))
    }

    fn describe_volume<'a>(&'a self, volume_id: &'a str) -> GatewayFuture<'a, Volume> {
        Box::pin(ready(self.describe(volume_id)))
    }

    fn detach_volume<'a>(&'a self, volume_id: &'a str, force: bool) -> GatewayFuture<'a, ()> {
        Box::pin(ready(self.detach(volume_id, force)))
    }

    fn delete_volume<'a>(&'a self, volume_id: &'a str) -> GatewayFuture<'a, ()> {
        Box::pin(ready(self.delete(volume_id)))
    }
}

#[derive(Default)]
struct MetricsState {
    series: HashMap<String, Vec<UtilizationSample>>,
    failing: HashSet<String>,
    queries: Vec<MetricQuery>,
}

/// In-memory metrics service.
///
/// Serves the recorded series for an instance regardless of the queried
/// window; instances without a series yield no samples.
#[derive(Default)]
pub struct InMemoryMetrics {
    state: Mutex<MetricsState>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `maxima` (one sample per period) for `instance_id`.
    pub fn with_series(self, instance_id: &str, maxima: &[f64]) -> Self {
        let samples = maxima
            .iter()
            .enumerate()
            .map(|(i, max)| UtilizationSample::percent(i as u64 * 3600, *max))
            .collect();
        self.lock().series.insert(instance_id.to_string(), samples);
        self
    }

    /// Fail every query for `instance_id`.
    pub fn fail_for(self, instance_id: &str) -> Self {
        self.lock().failing.insert(instance_id.to_string());
        self
    }

    pub fn queries(&self) -> Vec<MetricQuery> {
        self.lock().queries.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MetricsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn query(&self, query: &MetricQuery) -> GatewayResult<Vec<UtilizationSample>> {
        let mut state = self.lock();
        state.queries.push(query.clone());
        if state.failing.contains(&query.dimension_value) {
            return Err(GatewayError::service(
                "GetMetricStatistics",
                format!("metrics unavailable for {}", query.dimension_value),
            ));
        }
        Ok(state
            .series
            .get(&query.dimension_value)
            .cloned()
            .unwrap_or_default())
    }
}

impl MetricsGateway for InMemoryMetrics {
    fn maximum_series<'a>(
        &'a self,
        query: &'a MetricQuery,
    ) -> GatewayFuture<'a, Vec<UtilizationSample>> {
        Box::pin(ready(self.query(query)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stopped_query(next_token: Option<&str>) -> InstanceQuery {
        InstanceQuery {
            state: InstanceLifecycle::Stopped,
            page_size: 2,
            next_token: next_token.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn lists_only_matching_state_in_pages() {
        let mut running = Instance::stopped("i-run");
        running.state = InstanceLifecycle::Running;
        let compute = InMemoryCompute::new()
            .with_instance(Instance::stopped("i-1"))
            .with_instance(running)
            .with_instance(Instance::stopped("i-2"))
            .with_instance(Instance::stopped("i-3"));

        let first = compute.list_instances(&stopped_query(None)).await.unwrap();
        let ids: Vec<_> = first.instances.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["i-1", "i-2"]);
        assert_eq!(first.next_token.as_deref(), Some("2"));

        let second = compute
            .list_instances(&stopped_query(Some("2")))
            .await
            .unwrap();
        assert_eq!(second.instances.len(), 1);
        assert_eq!(second.instances[0].id, "i-3");
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn terminate_moves_instances_out_of_stopped() {
        let compute = InMemoryCompute::new().with_instance(Instance::stopped("i-1"));
        compute
            .terminate_instances(&["i-1".to_string()])
            .await
            .unwrap();

        assert_eq!(
            compute.instance("i-1").unwrap().state,
            InstanceLifecycle::Terminated
        );
        let page = compute.list_instances(&stopped_query(None)).await.unwrap();
        assert!(page.instances.is_empty());
    }

    #[tokio::test]
    async fn describe_missing_volume_is_not_found() {
        let compute = InMemoryCompute::new();
        let err = compute.describe_volume("vol-gone").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn targeted_failure_only_hits_target() {
        let compute = InMemoryCompute::new()
            .with_volume(Volume::new("vol-a", VolumeState::InUse))
            .with_volume(Volume::new("vol-b", VolumeState::InUse))
            .fail_for(ComputeOp::DetachVolume, "vol-a", "busy");

        assert!(compute.detach_volume("vol-a", true).await.is_err());
        assert!(compute.detach_volume("vol-b", true).await.is_ok());
        assert_eq!(compute.volume("vol-b").unwrap().state, VolumeState::Available);
        assert_eq!(compute.detached_volumes(), vec!["vol-a", "vol-b"]);
    }

    #[tokio::test]
    async fn metrics_serves_series_and_records_queries() {
        let metrics = InMemoryMetrics::new().with_series("i-1", &[1.0, 2.0]);
        let query = MetricQuery {
            namespace: "AWS/EC2".to_string(),
            metric_name: "CPUUtilization".to_string(),
            dimension_name: "InstanceId".to_string(),
            dimension_value: "i-1".to_string(),
            start_secs: 0,
            end_secs: 60,
            period_secs: 3600,
            unit: Some("Percent".to_string()),
        };

        let samples = metrics.maximum_series(&query).await.unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].maximum, 2.0);
        assert_eq!(metrics.queries(), vec![query]);
    }
}
