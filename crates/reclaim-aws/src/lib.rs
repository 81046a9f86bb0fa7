//! reclaim-aws — EC2 and CloudWatch implementations of the reclaim gateways.
//!
//! [`Ec2Compute`] implements `ComputeGateway` and [`CloudWatchMetrics`]
//! implements `MetricsGateway`. Both are built from one shared
//! [`aws_config::SdkConfig`] loaded by [`load_sdk_config`].

pub mod cloudwatch;
pub mod ec2;

pub use cloudwatch::CloudWatchMetrics;
pub use ec2::Ec2Compute;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::debug;

/// Load credentials and region from the default provider chain.
///
/// `region` and `profile` override what the environment would pick.
pub async fn load_sdk_config(region: Option<String>, profile: Option<String>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(Region::new(region));
    }
    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }
    let config = loader.load().await;
    debug!(region = ?config.region(), "loaded AWS config");
    config
}
