//! Teardown orchestrator — terminates idle instances and cleans up their volumes.
//!
//! Order is fixed: one batched terminate for every idle instance, then each
//! referenced volume in turn is described, force-detached if still in use,
//! and deleted. The orchestrator does not wait for the instances to reach
//! `terminated` before detaching.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use reclaim_core::{ComputeGateway, Instance, InstanceId, VolumeId, VolumeState};

use crate::error::{ErrorKind, SweepError};

/// Final state of one volume after cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeStatus {
    Deleted,
    /// The volume no longer existed when described.
    SkippedNotFound,
    /// The delete call failed.
    DeleteFailed(String),
}

/// What happened to one referenced volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeOutcome {
    pub volume_id: VolumeId,
    /// A forced detach was issued and succeeded.
    pub detached: bool,
    /// A forced detach was issued and failed.
    pub detach_error: Option<String>,
    pub status: VolumeStatus,
}

impl VolumeOutcome {
    fn new(volume_id: &str, status: VolumeStatus) -> Self {
        Self {
            volume_id: volume_id.to_string(),
            detached: false,
            detach_error: None,
            status,
        }
    }

    /// The error class this outcome falls under, if any.
    pub fn kind(&self) -> Option<ErrorKind> {
        match (&self.status, &self.detach_error) {
            (VolumeStatus::SkippedNotFound, _) => Some(ErrorKind::SoftNotFound),
            (VolumeStatus::DeleteFailed(_), _) | (_, Some(_)) => Some(ErrorKind::SoftCleanupError),
            (VolumeStatus::Deleted, None) => None,
        }
    }
}

/// Result of a teardown.
#[derive(Debug)]
pub struct OperationOutcome {
    /// Instances included in the terminate call. Empty if it failed.
    pub terminated: Vec<InstanceId>,
    /// Per-volume cleanup results, in processing order.
    pub volumes: Vec<VolumeOutcome>,
    /// The fatal error that stopped the teardown, if any.
    pub failure: Option<SweepError>,
}

impl OperationOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn diagnostic(&self) -> Option<String> {
        self.failure.as_ref().map(ToString::to_string)
    }

    /// Whether any volume ended with a soft cleanup error.
    pub fn has_cleanup_errors(&self) -> bool {
        self.volumes
            .iter()
            .any(|v| v.kind() == Some(ErrorKind::SoftCleanupError))
    }
}

pub struct TeardownOrchestrator {
    compute: Arc<dyn ComputeGateway>,
    dedup_volumes: bool,
    absorb_delete_errors: bool,
}

impl TeardownOrchestrator {
    pub fn new(compute: Arc<dyn ComputeGateway>) -> Self {
        Self {
            compute,
            dedup_volumes: true,
            absorb_delete_errors: false,
        }
    }

    /// Process a volume once even when several instances reference it.
    pub fn with_dedup_volumes(mut self, dedup: bool) -> Self {
        self.dedup_volumes = dedup;
        self
    }

    /// Record delete failures per volume instead of stopping the teardown.
    pub fn with_absorb_delete_errors(mut self, absorb: bool) -> Self {
        self.absorb_delete_errors = absorb;
        self
    }

    /// Terminate `idle` and clean up every volume they reference.
    pub async fn teardown(&self, idle: &[Instance]) -> OperationOutcome {
        let instance_ids: Vec<InstanceId> = idle.iter().map(|i| i.id.clone()).collect();

        if let Err(e) = self.compute.terminate_instances(&instance_ids).await {
            warn!(instances = instance_ids.len(), error = %e, "terminate call failed");
            return OperationOutcome {
                terminated: Vec::new(),
                volumes: Vec::new(),
                failure: Some(SweepError::Terminate(e)),
            };
        }
        info!(instances = ?instance_ids, "terminated idle instances");

        let mut outcome = OperationOutcome {
            terminated: instance_ids,
            volumes: Vec::new(),
            failure: None,
        };

        for volume_id in self.referenced_volumes(idle) {
            match self.clean_volume(volume_id).await {
                Ok(volume) => outcome.volumes.push(volume),
                Err((volume, e)) => {
                    if let Some(volume) = volume {
                        outcome.volumes.push(volume);
                    }
                    warn!(volume_id, error = %e, "volume cleanup aborted teardown");
                    outcome.failure = Some(e);
                    break;
                }
            }
        }

        info!(
            volumes = outcome.volumes.len(),
            cleanup_errors = outcome.has_cleanup_errors(),
            success = outcome.is_success(),
            "teardown complete"
        );
        outcome
    }

    /// Volume identifiers referenced by `instances`, in mapping order.
    fn referenced_volumes<'a>(&self, instances: &'a [Instance]) -> Vec<&'a str> {
        let all = instances.iter().flat_map(Instance::volume_ids);
        if self.dedup_volumes {
            let mut seen = HashSet::new();
            all.filter(|id| seen.insert(*id)).collect()
        } else {
            all.collect()
        }
    }

    /// Describe, detach if in use, delete.
    ///
    /// On a fatal error returns the error along with the outcome recorded
    /// so far, if the volume got far enough to have one.
    async fn clean_volume(
        &self,
        volume_id: &str,
    ) -> Result<VolumeOutcome, (Option<VolumeOutcome>, SweepError)> {
        let volume = match self.compute.describe_volume(volume_id).await {
            Ok(volume) => volume,
            Err(e) if e.is_not_found() => {
                debug!(volume_id, "volume already gone, skipping");
                return Ok(VolumeOutcome::new(volume_id, VolumeStatus::SkippedNotFound));
            }
            Err(source) => {
                return Err((
                    None,
                    SweepError::DescribeVolume {
                        volume_id: volume_id.to_string(),
                        source,
                    },
                ));
            }
        };

        let mut outcome = VolumeOutcome::new(volume_id, VolumeStatus::Deleted);

        if volume.state == VolumeState::InUse {
            match self.compute.detach_volume(volume_id, true).await {
                Ok(()) => {
                    debug!(volume_id, "force-detached volume");
                    outcome.detached = true;
                }
                Err(e) => {
                    warn!(volume_id, error = %e, "force detach failed, continuing");
                    outcome.detach_error = Some(e.to_string());
                }
            }
        }

        match self.compute.delete_volume(volume_id).await {
            Ok(()) => {
                info!(volume_id, "deleted volume");
                Ok(outcome)
            }
            Err(e) if self.absorb_delete_errors => {
                warn!(volume_id, error = %e, "volume delete failed, continuing");
                outcome.status = VolumeStatus::DeleteFailed(e.to_string());
                Ok(outcome)
            }
            Err(source) => {
                outcome.status = VolumeStatus::DeleteFailed(source.to_string());
                Err((
                    Some(outcome),
                    SweepError::DeleteVolume {
                        volume_id: volume_id.to_string(),
                        source,
                    },
                ))
            }
        }
    }
}
