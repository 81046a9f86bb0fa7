//! reclaim-sweep — one bounded sweep over stopped compute instances.
//!
//! A sweep runs four stages strictly in order, with no branching back:
//!
//! ```text
//! Discovery          page through instances with state = stopped
//!   → UsageEvaluator query max CPU over [now - lookback, now) per instance,
//!                    keep the ones the idle policy marks idle
//!   → Teardown       terminate all idle instances in one call, then for each
//!                    referenced volume: describe, force-detach if in-use, delete
//!   → Envelope       {"Message", "Data", "Error"}
//! ```
//!
//! # Error containment
//!
//! Discovery, usage and terminate errors are fatal and end the sweep.
//! Two points are softened: a volume that no longer exists is skipped,
//! and a failed detach is logged while the cascade moves on. Fatal errors
//! are folded into the envelope's `Error` field, so [`Sweeper::sweep`]
//! never fails.

pub mod discovery;
pub mod error;
pub mod response;
pub mod settings;
pub mod sweeper;
pub mod teardown;
pub mod usage;

pub use discovery::Discovery;
pub use error::{ErrorKind, SweepError, SweepResult};
pub use response::Envelope;
pub use settings::{MetricSpec, SweepSettings};
pub use sweeper::{SweepReport, Sweeper};
pub use teardown::{OperationOutcome, TeardownOrchestrator, VolumeOutcome, VolumeStatus};
pub use usage::{EvaluationWindow, IdlePolicy, UsageEvaluator};
