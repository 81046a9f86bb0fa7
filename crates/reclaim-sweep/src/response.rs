//! Outward-facing result of a sweep.

use serde::{Deserialize, Serialize};

use crate::error::SweepResult;
use crate::sweeper::SweepReport;

pub const NOTHING_TO_DO: &str = "No instances to process";
pub const TORN_DOWN: &str = "EC2 Instances and EBS volumes were deleted successfully";
pub const FAILED: &str = "An error occurred while processing the request";

/// `{"Message": …, "Data": […], "Error": …}`
///
/// Always delivered; callers detect failure through a non-empty `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "Message")]
    pub message: String,
    /// Terminated instance identifiers.
    #[serde(rename = "Data")]
    pub data: Vec<String>,
    #[serde(rename = "Error")]
    pub error: String,
}

impl Envelope {
    pub fn nothing_to_do() -> Self {
        Self {
            message: NOTHING_TO_DO.to_string(),
            data: Vec::new(),
            error: String::new(),
        }
    }

    pub fn torn_down(instance_ids: Vec<String>) -> Self {
        Self {
            message: TORN_DOWN.to_string(),
            data: instance_ids,
            error: String::new(),
        }
    }

    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            message: FAILED.to_string(),
            data: Vec::new(),
            error: diagnostic.into(),
        }
    }

    /// Pick the envelope shape for a finished sweep.
    pub fn from_result(result: SweepResult<SweepReport>) -> Self {
        match result {
            Ok(SweepReport::NothingToDo { .. }) => Envelope::nothing_to_do(),
            Ok(SweepReport::TornDown(outcome)) => match outcome.failure {
                Some(e) => Envelope::failed(e.to_string()),
                None => Envelope::torn_down(outcome.terminated),
            },
            Err(e) => Envelope::failed(e.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SweepError;
    use crate::teardown::OperationOutcome;
    use reclaim_core::GatewayError;

    #[test]
    fn serializes_with_capitalized_keys() {
        let json = Envelope::torn_down(vec!["i-1".to_string()]).to_json().unwrap();
        assert_eq!(
            json,
            r#"{"Message":"EC2 Instances and EBS volumes were deleted successfully","Data":["i-1"],"Error":""}"#
        );
    }

    #[test]
    fn nothing_to_do_shape() {
        let env = Envelope::from_result(Ok(SweepReport::NothingToDo { stopped: 3 }));
        assert_eq!(env.message, NOTHING_TO_DO);
        assert!(env.data.is_empty());
        assert!(!env.is_error());
    }

    #[test]
    fn fatal_error_has_empty_data() {
        let err = SweepError::Discovery(GatewayError::service("DescribeInstances", "expired token"));
        let env = Envelope::from_result(Err(err));
        assert_eq!(env.message, FAILED);
        assert!(env.data.is_empty());
        assert!(env.error.contains("expired token"));
    }

    #[test]
    fn failed_teardown_drops_terminated_ids() {
        let outcome = OperationOutcome {
            terminated: vec!["i-1".to_string()],
            volumes: Vec::new(),
            failure: Some(SweepError::DeleteVolume {
                volume_id: "v1".to_string(),
                source: GatewayError::service("DeleteVolume", "VolumeInUse"),
            }),
        };
        let env = Envelope::from_result(Ok(SweepReport::TornDown(outcome)));
        assert!(env.is_error());
        assert!(env.data.is_empty());
        assert!(env.error.contains("v1"));
    }
}
