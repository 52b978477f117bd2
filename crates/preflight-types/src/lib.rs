//! Shared value types, identifiers and error kinds for the preflight
//! engine. Kept dependency-light and side-effect free: everything here
//! is a plain data type or a validated newtype, never an I/O capability.

pub mod error;
pub mod step_id;
pub mod value;

pub use error::{Error, ErrorKind, Result};
pub use step_id::StepId;
pub use value::{
    ApplyEntry, ApplyOutcome, ApplyReport, CaptureFilter, CaptureItem, Diff, DiffKind, DoctorCheck,
    DriftEntry, DriftKind, Explanation, HealthReport, LockInfo, PlanEntry, PlanReport,
    PolicyViolation, Resolution, ResolutionSource, Snapshot, SnapshotSet, StepStatus,
};
