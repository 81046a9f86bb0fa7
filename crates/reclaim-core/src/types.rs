//! Record types exchanged with the compute and metrics services.
//!
//! Every optional field in a cloud response is an explicit `Option` here,
//! so a block-device mapping without a volume reference is visible in the
//! type rather than discovered by a failed lookup.

use serde::{Deserialize, Serialize};

/// Identifier of a compute instance (e.g. `i-0abc…`).
pub type InstanceId = String;

/// Identifier of a block-storage volume (e.g. `vol-0abc…`).
pub type VolumeId = String;

// ── Instance ───────────────────────────────────────────────────────

/// Lifecycle state of a compute instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceLifecycle {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
    Unknown,
}

impl InstanceLifecycle {
    /// The state name as used in listing filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceLifecycle::Pending => "pending",
            InstanceLifecycle::Running => "running",
            InstanceLifecycle::ShuttingDown => "shutting-down",
            InstanceLifecycle::Terminated => "terminated",
            InstanceLifecycle::Stopping => "stopping",
            InstanceLifecycle::Stopped => "stopped",
            InstanceLifecycle::Unknown => "unknown",
        }
    }

    /// Map a state name reported by the compute service.
    pub fn from_api(name: &str) -> Self {
        match name {
            "pending" => InstanceLifecycle::Pending,
            "running" => InstanceLifecycle::Running,
            "shutting-down" => InstanceLifecycle::ShuttingDown,
            "terminated" => InstanceLifecycle::Terminated,
            "stopping" => InstanceLifecycle::Stopping,
            "stopped" => InstanceLifecycle::Stopped,
            _ => InstanceLifecycle::Unknown,
        }
    }
}

/// Block-store half of a device mapping.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EbsReference {
    pub volume_id: Option<VolumeId>,
}

/// An instance's declared association to a storage device.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockDeviceMapping {
    /// Device name inside the instance (`/dev/xvda`).
    pub device_name: Option<String>,
    /// Present only for block-store backed devices.
    pub ebs: Option<EbsReference>,
}

impl BlockDeviceMapping {
    /// Mapping backed by the given volume.
    pub fn volume(device_name: &str, volume_id: &str) -> Self {
        Self {
            device_name: Some(device_name.to_string()),
            ebs: Some(EbsReference {
                volume_id: Some(volume_id.to_string()),
            }),
        }
    }

    /// The referenced volume, if the mapping resolves to one.
    pub fn volume_id(&self) -> Option<&str> {
        self.ebs.as_ref()?.volume_id.as_deref()
    }
}

/// A compute instance as returned by a listing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub state: InstanceLifecycle,
    /// Device mappings in the order the service reported them.
    pub block_device_mappings: Vec<BlockDeviceMapping>,
}

impl Instance {
    /// A stopped instance with no device mappings.
    pub fn stopped(id: &str) -> Self {
        Self {
            id: id.to_string(),
            state: InstanceLifecycle::Stopped,
            block_device_mappings: Vec::new(),
        }
    }

    pub fn with_mapping(mut self, mapping: BlockDeviceMapping) -> Self {
        self.block_device_mappings.push(mapping);
        self
    }

    /// Volume identifiers referenced by this instance, in mapping order.
    ///
    /// Mappings without a resolvable volume identifier are skipped.
    pub fn volume_ids(&self) -> impl Iterator<Item = &str> {
        self.block_device_mappings
            .iter()
            .filter_map(BlockDeviceMapping::volume_id)
    }
}

// ── Volume ─────────────────────────────────────────────────────────

/// Attachment state of a block-storage volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeState {
    Creating,
    Available,
    InUse,
    Deleting,
    Deleted,
    Error,
    Unknown,
}

impl VolumeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeState::Creating => "creating",
            VolumeState::Available => "available",
            VolumeState::InUse => "in-use",
            VolumeState::Deleting => "deleting",
            VolumeState::Deleted => "deleted",
            VolumeState::Error => "error",
            VolumeState::Unknown => "unknown",
        }
    }

    pub fn from_api(name: &str) -> Self {
        match name {
            "creating" => VolumeState::Creating,
            "available" => VolumeState::Available,
            "in-use" => VolumeState::InUse,
            "deleting" => VolumeState::Deleting,
            "deleted" => VolumeState::Deleted,
            "error" => VolumeState::Error,
            _ => VolumeState::Unknown,
        }
    }
}

/// A block-storage volume as returned by a describe call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub id: VolumeId,
    pub state: VolumeState,
}

impl Volume {
    pub fn new(id: &str, state: VolumeState) -> Self {
        Self {
            id: id.to_string(),
            state,
        }
    }
}

// ── Utilization ────────────────────────────────────────────────────

/// One aggregation period of a utilization metric for one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationSample {
    /// Unix timestamp (seconds) of the period start.
    pub timestamp: u64,
    /// Maximum value observed during the period.
    pub maximum: f64,
    /// Unit reported by the metrics service (`Percent`).
    pub unit: Option<String>,
}

impl UtilizationSample {
    pub fn percent(timestamp: u64, maximum: f64) -> Self {
        Self {
            timestamp,
            maximum,
            unit: Some("Percent".to_string()),
        }
    }
}
