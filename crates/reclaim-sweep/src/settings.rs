//! Resolved sweep settings.
//!
//! Turns an optional-everything [`ReclaimConfig`] into concrete values,
//! filling defaults and rejecting values the cloud APIs would refuse.

use std::time::Duration;

use reclaim_core::config::{ConfigError, ReclaimConfig, parse_duration};

use crate::usage::IdlePolicy;

/// Which metric the usage evaluator queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSpec {
    pub namespace: String,
    pub name: String,
    /// Dimension carrying the instance identifier.
    pub dimension: String,
    pub unit: Option<String>,
}

impl Default for MetricSpec {
    fn default() -> Self {
        Self {
            namespace: "AWS/EC2".to_string(),
            name: "CPUUtilization".to_string(),
            dimension: "InstanceId".to_string(),
            unit: Some("Percent".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepSettings {
    /// Instances requested per listing page.
    pub page_size: i32,
    /// Length of the evaluation window ending now.
    pub lookback: Duration,
    /// Aggregation period of each utilization sample.
    pub period: Duration,
    pub metric: MetricSpec,
    pub policy: IdlePolicy,
    /// Metric queries in flight at once.
    pub evaluation_concurrency: usize,
    /// Process each referenced volume once even if several instances list it.
    pub dedup_volumes: bool,
    /// Treat volume delete failures as soft cleanup errors.
    pub absorb_delete_errors: bool,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            page_size: 10,
            lookback: Duration::from_secs(60),
            period: Duration::from_secs(3600),
            metric: MetricSpec::default(),
            policy: IdlePolicy::AnyZero,
            evaluation_concurrency: 1,
            dedup_volumes: true,
            absorb_delete_errors: false,
        }
    }
}

impl SweepSettings {
    pub fn from_config(config: &ReclaimConfig) -> Result<Self, ConfigError> {
        let defaults = SweepSettings::default();
        let discovery = config.discovery();
        let usage = config.usage();
        let teardown = config.teardown();

        let page_size = discovery.page_size.unwrap_or(defaults.page_size);
        // DescribeInstances accepts MaxResults in 5..=1000.
        if !(5..=1000).contains(&page_size) {
            return Err(ConfigError::InvalidValue {
                field: "discovery.page_size",
                reason: format!("{page_size} is outside 5..=1000"),
            });
        }

        let lookback = match usage.lookback.as_deref() {
            Some(s) => parse_duration("usage.lookback", s)?,
            None => defaults.lookback,
        };
        let period = match usage.period.as_deref() {
            Some(s) => parse_duration("usage.period", s)?,
            None => defaults.period,
        };
        if u32::try_from(period.as_secs()).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "usage.period",
                reason: format!("{}s is too long", period.as_secs()),
            });
        }

        let policy = match usage.policy.as_deref() {
            Some(name) => IdlePolicy::parse(name, usage.average_threshold)?,
            None => defaults.policy,
        };

        let evaluation_concurrency = usage.concurrency.unwrap_or(1);
        if evaluation_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "usage.concurrency",
                reason: "must be at least 1".to_string(),
            });
        }

        let metric = MetricSpec {
            namespace: usage.namespace.unwrap_or(defaults.metric.namespace),
            name: usage.metric_name.unwrap_or(defaults.metric.name),
            dimension: usage.dimension.unwrap_or(defaults.metric.dimension),
            unit: usage.unit.or(defaults.metric.unit),
        };

        Ok(Self {
            page_size,
            lookback,
            period,
            metric,
            policy,
            evaluation_concurrency,
            dedup_volumes: teardown.dedup_volumes.unwrap_or(defaults.dedup_volumes),
            absorb_delete_errors: teardown
                .absorb_delete_errors
                .unwrap_or(defaults.absorb_delete_errors),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<SweepSettings, ConfigError> {
        let config: ReclaimConfig = toml::from_str(toml_str).unwrap();
        SweepSettings::from_config(&config)
    }

    #[test]
    fn empty_config_resolves_to_defaults() {
        assert_eq!(parse("").unwrap(), SweepSettings::default());
    }

    #[test]
    fn scaffold_resolves_to_defaults() {
        let settings = SweepSettings::from_config(&ReclaimConfig::scaffold()).unwrap();
        assert_eq!(settings, SweepSettings::default());
    }

    #[test]
    fn overrides_are_applied() {
        let settings = parse(
            r#"
[discovery]
page_size = 100

[usage]
lookback = "2h"
period = "5m"
metric_name = "NetworkIn"
unit = "Bytes"
policy = "average-below"
average_threshold = 2.5
concurrency = 8

[teardown]
dedup_volumes = false
absorb_delete_errors = true
"#,
        )
        .unwrap();

        assert_eq!(settings.page_size, 100);
        assert_eq!(settings.lookback, Duration::from_secs(7200));
        assert_eq!(settings.period, Duration::from_secs(300));
        assert_eq!(settings.metric.name, "NetworkIn");
        assert_eq!(settings.metric.namespace, "AWS/EC2");
        assert_eq!(settings.metric.unit.as_deref(), Some("Bytes"));
        assert_eq!(settings.policy, IdlePolicy::AverageBelow(2.5));
        assert_eq!(settings.evaluation_concurrency, 8);
        assert!(!settings.dedup_volumes);
        assert!(settings.absorb_delete_errors);
    }

    #[test]
    fn rejects_out_of_range_page_size() {
        let err = parse("[discovery]\npage_size = 2\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "discovery.page_size",
                ..
            }
        ));
    }

    #[test]
    fn rejects_bad_lookback() {
        let err = parse("[usage]\nlookback = \"a while\"\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDuration {
                field: "usage.lookback",
                ..
            }
        ));
    }

    #[test]
    fn rejects_zero_concurrency() {
        assert!(parse("[usage]\nconcurrency = 0\n").is_err());
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(parse("[usage]\npolicy = \"vibes\"\n").is_err());
    }
}
