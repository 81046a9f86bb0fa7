//! CloudWatch-backed metrics gateway.

use aws_config::SdkConfig;
use aws_sdk_cloudwatch::Client;
use aws_sdk_cloudwatch::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_cloudwatch::primitives::DateTime;
use aws_sdk_cloudwatch::types::{Datapoint, Dimension, StandardUnit, Statistic};
use tracing::debug;

use reclaim_core::{GatewayError, GatewayFuture, MetricQuery, MetricsGateway, UtilizationSample};

pub struct CloudWatchMetrics {
    client: Client,
}

impl CloudWatchMetrics {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn query(&self, query: &MetricQuery) -> Result<Vec<UtilizationSample>, GatewayError> {
        let request = self
            .client
            .get_metric_statistics()
            .namespace(&query.namespace)
            .metric_name(&query.metric_name)
            .dimensions(
                Dimension::builder()
                    .name(&query.dimension_name)
                    .value(&query.dimension_value)
                    .build(),
            )
            .start_time(DateTime::from_secs(saturating_i64(query.start_secs)))
            .end_time(DateTime::from_secs(saturating_i64(query.end_secs)))
            .period(i32::try_from(query.period_secs).unwrap_or(i32::MAX))
            .statistics(Statistic::Maximum)
            .set_unit(query.unit.as_deref().map(StandardUnit::from));

        let resp = request.send().await.map_err(|err| GatewayError::Service {
            operation: "GetMetricStatistics",
            code: err.code().map(str::to_owned),
            message: DisplayErrorContext(&err).to_string(),
        })?;

        let samples: Vec<UtilizationSample> =
            resp.datapoints().iter().map(sample_from_datapoint).collect();
        debug!(
            instance_id = %query.dimension_value,
            samples = samples.len(),
            "fetched utilization"
        );
        Ok(samples)
    }
}

impl MetricsGateway for CloudWatchMetrics {
    fn maximum_series<'a>(
        &'a self,
        query: &'a MetricQuery,
    ) -> GatewayFuture<'a, Vec<UtilizationSample>> {
        Box::pin(self.query(query))
    }
}

/// A datapoint without a maximum counts as zero.
pub(crate) fn sample_from_datapoint(point: &Datapoint) -> UtilizationSample {
    UtilizationSample {
        timestamp: point
            .timestamp()
            .map(|t| u64::try_from(t.secs()).unwrap_or(0))
            .unwrap_or(0),
        maximum: point.maximum().unwrap_or(0.0),
        unit: point.unit().map(|u| u.as_str().to_owned()),
    }
}

fn saturating_i64(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_datapoint() {
        let point = Datapoint::builder()
            .timestamp(DateTime::from_secs(1_700_000_000))
            .maximum(12.5)
            .unit(StandardUnit::Percent)
            .build();

        let sample = sample_from_datapoint(&point);
        assert_eq!(sample.timestamp, 1_700_000_000);
        assert_eq!(sample.maximum, 12.5);
        assert_eq!(sample.unit.as_deref(), Some("Percent"));
    }

    #[test]
    fn missing_maximum_is_zero() {
        let point = Datapoint::builder().build();
        let sample = sample_from_datapoint(&point);
        assert_eq!(sample.maximum, 0.0);
        assert_eq!(sample.timestamp, 0);
        assert!(sample.unit.is_none());
    }
}
