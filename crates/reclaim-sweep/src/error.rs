//! Sweep error types.

use thiserror::Error;

use reclaim_core::GatewayError;

/// How an error affects the rest of the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Aborts the remaining sweep.
    Fatal,
    /// A volume that no longer exists; nothing to clean up.
    SoftNotFound,
    /// A cleanup step failed; the cascade continues with the next volume.
    SoftCleanupError,
}

/// Fatal errors, one variant per stage that can raise them.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("listing stopped instances failed: {0}")]
    Discovery(#[source] GatewayError),

    #[error("querying utilization for {instance_id} failed: {source}")]
    Usage {
        instance_id: String,
        #[source]
        source: GatewayError,
    },

    #[error("terminating instances failed: {0}")]
    Terminate(#[source] GatewayError),

    #[error("describing volume {volume_id} failed: {source}")]
    DescribeVolume {
        volume_id: String,
        #[source]
        source: GatewayError,
    },

    #[error("deleting volume {volume_id} failed: {source}")]
    DeleteVolume {
        volume_id: String,
        #[source]
        source: GatewayError,
    },
}

impl SweepError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Fatal
    }
}

pub type SweepResult<T> = Result<T, SweepError>;
