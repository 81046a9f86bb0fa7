//! Usage evaluator — decides which stopped instances are idle.
//!
//! For every instance the evaluator asks the metrics service for the
//! maximum of the configured metric over `[now - lookback, now)`, one
//! sample per aggregation period, and hands the samples to an
//! [`IdlePolicy`].

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{StreamExt, TryStreamExt, stream};
use tracing::{debug, info};

use reclaim_core::config::ConfigError;
use reclaim_core::{Instance, MetricQuery, MetricsGateway, UtilizationSample};

use crate::error::{SweepError, SweepResult};
use crate::settings::MetricSpec;

/// Rule turning a sample set into an idle/active verdict.
///
/// Every policy treats an empty sample set as idle: an instance that
/// reported nothing during the window did no work.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IdlePolicy {
    /// Idle if any sample's maximum rounds (2 decimals) to exactly zero.
    AnyZero,
    /// Idle only if every sample's maximum rounds to zero.
    AllZero,
    /// Idle if the mean of the sample maxima is below the threshold.
    AverageBelow(f64),
}

impl IdlePolicy {
    /// Parse a policy name from config.
    pub fn parse(name: &str, threshold: Option<f64>) -> Result<Self, ConfigError> {
        match name {
            "any-zero" => Ok(IdlePolicy::AnyZero),
            "all-zero" => Ok(IdlePolicy::AllZero),
            "average-below" => match threshold {
                Some(t) if t.is_finite() && t > 0.0 => Ok(IdlePolicy::AverageBelow(t)),
                Some(t) => Err(ConfigError::InvalidValue {
                    field: "usage.average_threshold",
                    reason: format!("{t} must be a positive number"),
                }),
                None => Err(ConfigError::InvalidValue {
                    field: "usage.average_threshold",
                    reason: "required by the average-below policy".to_string(),
                }),
            },
            other => Err(ConfigError::InvalidValue {
                field: "usage.policy",
                reason: format!("unknown policy {other:?}"),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IdlePolicy::AnyZero => "any-zero",
            IdlePolicy::AllZero => "all-zero",
            IdlePolicy::AverageBelow(_) => "average-below",
        }
    }

    pub fn is_idle(&self, samples: &[UtilizationSample]) -> bool {
        if samples.is_empty() {
            return true;
        }
        match self {
            IdlePolicy::AnyZero => samples.iter().any(|s| round2(s.maximum) == 0.0),
            IdlePolicy::AllZero => samples.iter().all(|s| round2(s.maximum) == 0.0),
            IdlePolicy::AverageBelow(threshold) => {
                let mean = samples.iter().map(|s| s.maximum).sum::<f64>() / samples.len() as f64;
                mean < *threshold
            }
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Half-open evaluation window in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationWindow {
    pub start_secs: u64,
    pub end_secs: u64,
}

impl EvaluationWindow {
    /// The `lookback`-long window ending at `now_secs`.
    pub fn ending_at(now_secs: u64, lookback: Duration) -> Self {
        Self {
            start_secs: now_secs.saturating_sub(lookback.as_secs()),
            end_secs: now_secs,
        }
    }
}

pub struct UsageEvaluator {
    metrics: Arc<dyn MetricsGateway>,
    metric: MetricSpec,
    lookback: Duration,
    period: Duration,
    policy: IdlePolicy,
    concurrency: usize,
}

impl UsageEvaluator {
    pub fn new(metrics: Arc<dyn MetricsGateway>, metric: MetricSpec, lookback: Duration) -> Self {
        Self {
            metrics,
            metric,
            lookback,
            period: Duration::from_secs(3600),
            policy: IdlePolicy::AnyZero,
            concurrency: 1,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn with_policy(mut self, policy: IdlePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Number of metric queries allowed in flight at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// The idle subset of `instances`, in input order.
    pub async fn filter_idle(&self, instances: Vec<Instance>) -> SweepResult<Vec<Instance>> {
        self.filter_idle_at(instances, epoch_secs()).await
    }

    /// Like [`filter_idle`](Self::filter_idle) with the window ending at `now_secs`.
    pub async fn filter_idle_at(
        &self,
        instances: Vec<Instance>,
        now_secs: u64,
    ) -> SweepResult<Vec<Instance>> {
        let window = EvaluationWindow::ending_at(now_secs, self.lookback);

        // `buffered` keeps results in input order.
        let verdicts: Vec<bool> = stream::iter(instances.iter())
            .map(|instance| self.classify(instance, window))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let total = instances.len();
        let idle: Vec<Instance> = instances
            .into_iter()
            .zip(verdicts)
            .filter_map(|(instance, idle)| idle.then_some(instance))
            .collect();

        info!(
            evaluated = total,
            idle = idle.len(),
            policy = self.policy.name(),
            window_start = window.start_secs,
            window_end = window.end_secs,
            "usage evaluation complete"
        );
        Ok(idle)
    }

    async fn classify(&self, instance: &Instance, window: EvaluationWindow) -> SweepResult<bool> {
        let query = MetricQuery {
            namespace: self.metric.namespace.clone(),
            metric_name: self.metric.name.clone(),
            dimension_name: self.metric.dimension.clone(),
            dimension_value: instance.id.clone(),
            start_secs: window.start_secs,
            end_secs: window.end_secs,
            period_secs: u32::try_from(self.period.as_secs()).unwrap_or(u32::MAX),
            unit: self.metric.unit.clone(),
        };

        let samples = self
            .metrics
            .maximum_series(&query)
            .await
            .map_err(|source| SweepError::Usage {
                instance_id: instance.id.clone(),
                source,
            })?;

        let idle = self.policy.is_idle(&samples);
        debug!(
            instance_id = %instance.id,
            samples = samples.len(),
            idle,
            "classified instance"
        );
        Ok(idle)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reclaim_core::memory::InMemoryMetrics;

    fn samples(maxima: &[f64]) -> Vec<UtilizationSample> {
        maxima
            .iter()
            .map(|m| UtilizationSample::percent(0, *m))
            .collect()
    }

    fn evaluator(metrics: Arc<InMemoryMetrics>) -> UsageEvaluator {
        UsageEvaluator::new(metrics, MetricSpec::default(), Duration::from_secs(60))
    }

    #[test]
    fn no_samples_is_idle_under_every_policy() {
        for policy in [
            IdlePolicy::AnyZero,
            IdlePolicy::AllZero,
            IdlePolicy::AverageBelow(1.0),
        ] {
            assert!(policy.is_idle(&[]), "{} should treat empty as idle", policy.name());
        }
    }

    #[test]
    fn any_zero_single_zero_sample_is_idle() {
        assert!(IdlePolicy::AnyZero.is_idle(&samples(&[12.5, 0.00, 8.1])));
    }

    #[test]
    fn any_zero_without_zero_is_active() {
        assert!(!IdlePolicy::AnyZero.is_idle(&samples(&[12.5, 3.2])));
    }

    #[test]
    fn any_zero_rounds_to_two_decimals() {
        assert!(IdlePolicy::AnyZero.is_idle(&samples(&[0.004])));
        assert!(!IdlePolicy::AnyZero.is_idle(&samples(&[0.006])));
    }

    #[test]
    fn all_zero_requires_every_sample() {
        assert!(!IdlePolicy::AllZero.is_idle(&samples(&[12.5, 0.00, 8.1])));
        assert!(IdlePolicy::AllZero.is_idle(&samples(&[0.0, 0.001])));
    }

    #[test]
    fn average_below_uses_mean() {
        let policy = IdlePolicy::AverageBelow(5.0);
        assert!(policy.is_idle(&samples(&[2.0, 4.0])));
        assert!(!policy.is_idle(&samples(&[2.0, 9.0])));
    }

    #[test]
    fn parse_policies() {
        assert_eq!(IdlePolicy::parse("any-zero", None), Ok(IdlePolicy::AnyZero));
        assert_eq!(IdlePolicy::parse("all-zero", None), Ok(IdlePolicy::AllZero));
        assert_eq!(
            IdlePolicy::parse("average-below", Some(3.0)),
            Ok(IdlePolicy::AverageBelow(3.0))
        );
        assert!(IdlePolicy::parse("average-below", None).is_err());
        assert!(IdlePolicy::parse("average-below", Some(-1.0)).is_err());
        assert!(IdlePolicy::parse("random", None).is_err());
    }

    #[test]
    fn window_ends_at_now() {
        let window = EvaluationWindow::ending_at(10_000, Duration::from_secs(60));
        assert_eq!(window.start_secs, 9_940);
        assert_eq!(window.end_secs, 10_000);
    }

    #[tokio::test]
    async fn filter_keeps_idle_in_order() {
        let metrics = Arc::new(
            InMemoryMetrics::new()
                .with_series("i-busy", &[12.5, 3.2])
                .with_series("i-spiky", &[12.5, 0.00, 8.1]),
        );
        let instances = vec![
            Instance::stopped("i-silent"),
            Instance::stopped("i-busy"),
            Instance::stopped("i-spiky"),
        ];

        let idle = evaluator(metrics)
            .filter_idle_at(instances, 1_000_000)
            .await
            .unwrap();

        let ids: Vec<&str> = idle.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["i-silent", "i-spiky"]);
    }

    #[tokio::test]
    async fn queries_carry_metric_and_window() {
        let metrics = Arc::new(InMemoryMetrics::new());
        evaluator(metrics.clone())
            .with_period(Duration::from_secs(300))
            .filter_idle_at(vec![Instance::stopped("i-1")], 1_000_000)
            .await
            .unwrap();

        let queries = metrics.queries();
        assert_eq!(queries.len(), 1);
        let q = &queries[0];
        assert_eq!(q.namespace, "AWS/EC2");
        assert_eq!(q.metric_name, "CPUUtilization");
        assert_eq!(q.dimension_name, "InstanceId");
        assert_eq!(q.dimension_value, "i-1");
        assert_eq!(q.start_secs, 999_940);
        assert_eq!(q.end_secs, 1_000_000);
        assert_eq!(q.period_secs, 300);
        assert_eq!(q.unit.as_deref(), Some("Percent"));
    }

    #[tokio::test]
    async fn concurrent_evaluation_preserves_order() {
        let mut metrics = InMemoryMetrics::new();
        let mut instances = Vec::new();
        for i in 0..20 {
            let id = format!("i-{i:02}");
            let series: &[f64] = if i % 3 == 0 { &[0.0] } else { &[50.0] };
            metrics = metrics.with_series(&id, series);
            instances.push(Instance::stopped(&id));
        }

        let idle = evaluator(Arc::new(metrics))
            .with_concurrency(4)
            .filter_idle_at(instances, 1_000_000)
            .await
            .unwrap();

        let ids: Vec<String> = idle.into_iter().map(|i| i.id).collect();
        let expected: Vec<String> = (0..20)
            .filter(|i| i % 3 == 0)
            .map(|i| format!("i-{i:02}"))
            .collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn metric_error_is_fatal() {
        let metrics = Arc::new(InMemoryMetrics::new().fail_for("i-2"));
        let err = evaluator(metrics)
            .filter_idle_at(
                vec![Instance::stopped("i-1"), Instance::stopped("i-2")],
                1_000_000,
            )
            .await
            .unwrap_err();

        match err {
            SweepError::Usage { instance_id, .. } => assert_eq!(instance_id, "i-2"),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
