//! Remote project provisioning: create from a mesh in a background job on the
//! remote application, poll it, then save, close and reopen the project.

pub mod job;
pub mod orchestrator;

pub use job::{generate_job_id, JobSnapshot, JobStatus, JobTransition, RemoteJob};
pub use orchestrator::{
    clamp_delay, JobConfig, JobError, JobOrchestrator, ProvisionOutcome, ProvisionRequest,
    SaveResult, WaitSummary,
};
