//! reclaim.toml configuration parser.
//!
//! Every field is optional; unset fields fall back to the defaults the
//! sweep resolves them to. Durations are written as strings (`"30s"`,
//! `"1m"`, `"1h"`) and parsed with [`parse_duration`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while validating configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid duration {value:?} for {field}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReclaimConfig {
    pub discovery: Option<DiscoveryConfig>,
    pub usage: Option<UsageConfig>,
    pub teardown: Option<TeardownConfig>,
    pub aws: Option<AwsConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub page_size: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageConfig {
    pub lookback: Option<String>,
    pub period: Option<String>,
    pub namespace: Option<String>,
    pub metric_name: Option<String>,
    pub dimension: Option<String>,
    pub unit: Option<String>,
    pub policy: Option<String>,
    pub average_threshold: Option<f64>,
    pub concurrency: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeardownConfig {
    pub dedup_volumes: Option<bool>,
    pub absorb_delete_errors: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: Option<String>,
    pub profile: Option<String>,
}

impl ReclaimConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ReclaimConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// A reclaim.toml with every knob spelled out at its default.
    pub fn scaffold() -> Self {
        ReclaimConfig {
            discovery: Some(DiscoveryConfig {
                page_size: Some(10),
            }),
            usage: Some(UsageConfig {
                lookback: Some("1m".to_string()),
                period: Some("1h".to_string()),
                namespace: Some("AWS/EC2".to_string()),
                metric_name: Some("CPUUtilization".to_string()),
                dimension: Some("InstanceId".to_string()),
                unit: Some("Percent".to_string()),
                policy: Some("any-zero".to_string()),
                average_threshold: None,
                concurrency: Some(1),
            }),
            teardown: Some(TeardownConfig {
                dedup_volumes: Some(true),
                absorb_delete_errors: Some(false),
            }),
            aws: None,
        }
    }

    pub fn discovery(&self) -> DiscoveryConfig {
        self.discovery.clone().unwrap_or_default()
    }

    pub fn usage(&self) -> UsageConfig {
        self.usage.clone().unwrap_or_default()
    }

    pub fn teardown(&self) -> TeardownConfig {
        self.teardown.clone().unwrap_or_default()
    }

    pub fn aws(&self) -> AwsConfig {
        self.aws.clone().unwrap_or_default()
    }
}

/// Parse a duration string like `"30s"`, `"5m"`, `"1h"`.
///
/// A bare number is taken as seconds. Zero is rejected.
pub fn parse_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    };

    let s = value.trim();
    let (digits, scale) = if let Some(secs) = s.strip_suffix('s') {
        (secs, 1)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60)
    } else if let Some(hours) = s.strip_suffix('h') {
        (hours, 3600)
    } else {
        (s, 1)
    };

    let n: u64 = digits.trim().parse().map_err(|_| invalid())?;
    if n == 0 {
        return Err(invalid());
    }
    n.checked_mul(scale)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}
