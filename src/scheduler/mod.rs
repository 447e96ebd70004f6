//! Job lifecycle tracking and asynchronous scheduling.

pub mod job;
pub mod manager;

pub use job::{
    JobHandle, JobRecord, JobStage, JobStatus, JobStatusView, ProgressEvent, StateError,
};
pub use manager::JobScheduler;
