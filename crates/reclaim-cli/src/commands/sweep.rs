use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use tracing::info;

use reclaim_aws::{CloudWatchMetrics, Ec2Compute};
use reclaim_core::ReclaimConfig;
use reclaim_sweep::{SweepSettings, Sweeper};

const DEFAULT_CONFIG: &str = "reclaim.toml";

#[derive(Args, Debug, Default)]
pub struct SweepArgs {
    /// Path to reclaim.toml
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Evaluation window ending now (e.g. 1m, 15m, 1h)
    #[arg(long)]
    pub lookback: Option<String>,
    /// Instances requested per listing page
    #[arg(long)]
    pub page_size: Option<i32>,
    /// AWS region (default: from the environment)
    #[arg(long)]
    pub region: Option<String>,
    /// AWS shared-config profile
    #[arg(long)]
    pub profile: Option<String>,
}

pub async fn sweep(args: SweepArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let config = apply_overrides(config, &args);
    let settings = SweepSettings::from_config(&config)?;
    info!(
        page_size = settings.page_size,
        lookback_secs = settings.lookback.as_secs(),
        policy = settings.policy.name(),
        "starting sweep"
    );

    let aws = config.aws();
    let sdk_config = reclaim_aws::load_sdk_config(aws.region, aws.profile).await;
    let sweeper = Sweeper::new(
        Arc::new(Ec2Compute::new(&sdk_config)),
        Arc::new(CloudWatchMetrics::new(&sdk_config)),
        &settings,
    );

    // A failed sweep is still a delivered envelope; the exit status stays 0.
    let envelope = sweeper.sweep().await;
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

/// An explicit path must exist; otherwise ./reclaim.toml is used if present.
fn load_config(path: Option<&Path>) -> anyhow::Result<ReclaimConfig> {
    match path {
        Some(path) => ReclaimConfig::from_file(path),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            ReclaimConfig::from_file(Path::new(DEFAULT_CONFIG))
        }
        None => Ok(ReclaimConfig::default()),
    }
}

fn apply_overrides(mut config: ReclaimConfig, args: &SweepArgs) -> ReclaimConfig {
    if let Some(page_size) = args.page_size {
        config.discovery.get_or_insert_with(Default::default).page_size = Some(page_size);
    }
    if let Some(lookback) = &args.lookback {
        config.usage.get_or_insert_with(Default::default).lookback = Some(lookback.clone());
    }
    if let Some(region) = &args.region {
        config.aws.get_or_insert_with(Default::default).region = Some(region.clone());
    }
    if let Some(profile) = &args.profile {
        config.aws.get_or_insert_with(Default::default).profile = Some(profile.clone());
    }
    config
}
