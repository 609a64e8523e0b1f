//! Domain model (ids, jobs, log entries, control, artifacts, errors).

pub mod artifacts;
pub mod control;
pub mod errors;
pub mod ids;
pub mod job;
pub mod log;

pub use artifacts::Artifacts;
pub use control::{ControlRecord, INTERRUPT_MARKER, InputMessage};
pub use errors::{
    AdmissionError, ConfigError, CourierError, ErrorKind, InspectError, LaunchError, StoreError,
};
pub use ids::JobId;
pub use job::{Job, JobMode, JobStatus, PermissionMode};
pub use log::{LogEntry, LogItem};
