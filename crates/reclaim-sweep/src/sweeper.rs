//! Sweeper — runs discovery, usage evaluation and teardown in sequence.

use std::sync::Arc;

use tracing::{error, info};

use reclaim_core::{ComputeGateway, MetricsGateway};

use crate::discovery::Discovery;
use crate::error::SweepResult;
use crate::response::Envelope;
use crate::settings::SweepSettings;
use crate::teardown::{OperationOutcome, TeardownOrchestrator};
use crate::usage::UsageEvaluator;

/// How far a sweep got.
#[derive(Debug)]
pub enum SweepReport {
    /// No stopped instances, or none of them idle.
    NothingToDo { stopped: usize },
    /// Idle instances went through teardown (successfully or not).
    TornDown(OperationOutcome),
}

pub struct Sweeper {
    discovery: Discovery,
    usage: UsageEvaluator,
    teardown: TeardownOrchestrator,
}

impl Sweeper {
    pub fn new(
        compute: Arc<dyn ComputeGateway>,
        metrics: Arc<dyn MetricsGateway>,
        settings: &SweepSettings,
    ) -> Self {
        let discovery = Discovery::new(compute.clone(), settings.page_size);
        let usage = UsageEvaluator::new(metrics, settings.metric.clone(), settings.lookback)
            .with_period(settings.period)
            .with_policy(settings.policy)
            .with_concurrency(settings.evaluation_concurrency);
        let teardown = TeardownOrchestrator::new(compute)
            .with_dedup_volumes(settings.dedup_volumes)
            .with_absorb_delete_errors(settings.absorb_delete_errors);

        Self {
            discovery,
            usage,
            teardown,
        }
    }

    /// Run one sweep. Errors from discovery or usage evaluation are returned;
    /// teardown errors are carried inside the outcome.
    pub async fn run(&self) -> SweepResult<SweepReport> {
        let stopped = self.discovery.list_stopped_instances().await?;
        if stopped.is_empty() {
            info!("no stopped instances");
            return Ok(SweepReport::NothingToDo { stopped: 0 });
        }

        let count = stopped.len();
        let idle = self.usage.filter_idle(stopped).await?;
        if idle.is_empty() {
            info!(stopped = count, "no idle instances");
            return Ok(SweepReport::NothingToDo { stopped: count });
        }

        let outcome = self.teardown.teardown(&idle).await;
        Ok(SweepReport::TornDown(outcome))
    }

    /// Run one sweep and fold the result into an envelope.
    pub async fn sweep(&self) -> Envelope {
        let result = self.run().await;
        match &result {
            Err(e) => error!(error = %e, "sweep failed"),
            Ok(SweepReport::TornDown(outcome)) if !outcome.is_success() => {
                error!(
                    error = %outcome.diagnostic().unwrap_or_default(),
                    terminated = outcome.terminated.len(),
                    "sweep failed during teardown"
                );
            }
            Ok(_) => {}
        }
        Envelope::from_result(result)
    }
}
