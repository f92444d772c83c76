use crate::job::{generate_job_id, JobSnapshot, JobStatus, RemoteJob};
use painter_remote::{
    dispatch_value, normalize_remote_path, Dispatch, DispatchRequest, RemoteExecutionError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_CEILING: Duration = Duration::from_secs(900);
pub const MAX_REMOTE_DELAY_SECS: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct JobConfig {
    pub poll_interval: Duration,
    pub ceiling: Duration,
    pub start_timeout: Duration,
    pub poll_timeout: Duration,
    pub save_timeout: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            ceiling: DEFAULT_CEILING,
            start_timeout: Duration::from_secs(30),
            poll_timeout: Duration::from_secs(20),
            save_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionRequest {
    pub mesh_path: String,
    pub output_path: String,
    pub save_delay_secs: f64,
    pub reopen_delay_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SaveResult {
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub close_error: Option<String>,
    #[serde(default)]
    pub open_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteExecutionError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaitSummary {
    pub polls: u32,
    pub elapsed_ms: u128,
    pub timed_out: bool,
}

/// Structured result of one create/save lifecycle, including failed ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionOutcome {
    pub job: RemoteJob,
    pub wait: WaitSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save: Option<SaveResult>,
}

impl ProvisionOutcome {
    pub fn status(&self) -> JobStatus {
        self.job.status
    }

    pub fn succeeded(&self) -> bool {
        self.job.status == JobStatus::Done
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("remote job start returned no job id: {reason}")]
    IdentityMissing { reason: String, raw: String },
    #[error("save requires status ready_for_save, last observed {status}")]
    NotReadyForSave { status: JobStatus },
}

pub fn clamp_delay(secs: f64) -> f64 {
    if secs.is_nan() {
        return 0.0;
    }
    secs.clamp(0.0, MAX_REMOTE_DELAY_SECS)
}

pub struct JobOrchestrator<'a, D: ?Sized> {
    remote: &'a D,
    config: JobConfig,
}

impl<'a, D: Dispatch + ?Sized> JobOrchestrator<'a, D> {
    pub fn new(remote: &'a D, config: JobConfig) -> Self {
        Self { remote, config }
    }

    /// Registers a job remotely and launches its worker. Returns once the
    /// registration is acknowledged; the worker keeps running remotely.
    pub fn start(&self, request: &ProvisionRequest) -> Result<RemoteJob, JobError> {
        let job_id = generate_job_id();
        let params = json!({
            "job_id": job_id,
            "mesh_path": normalize_remote_path(&request.mesh_path),
            "output_path": normalize_remote_path(&request.output_path),
            "save_delay": clamp_delay(request.save_delay_secs),
            "reopen_delay": clamp_delay(request.reopen_delay_secs),
        });
        let (result, raw) = dispatch_value(
            self.remote,
            &DispatchRequest::new("job_start", params),
            self.config.start_timeout,
        );
        let value = result.map_err(|err| JobError::IdentityMissing {
            reason: err.to_string(),
            raw: raw.clone(),
        })?;
        let acknowledged = value.get("job_id").and_then(Value::as_str);
        match acknowledged {
            Some(id) if !id.is_empty() => {
                info!(job_id = id, "remote job registered");
                let mesh = value
                    .get("mesh_path")
                    .and_then(Value::as_str)
                    .unwrap_or(&request.mesh_path);
                let output = value
                    .get("output_path")
                    .and_then(Value::as_str)
                    .unwrap_or(&request.output_path);
                Ok(RemoteJob::new(
                    id.to_string(),
                    mesh.to_string(),
                    output.to_string(),
                ))
            }
            _ => Err(JobError::IdentityMissing {
                reason: "acknowledgement carried no job_id".to_string(),
                raw,
            }),
        }
    }

    /// Current remote record for `job_id`; `Ok(None)` when the registry does
    /// not know it.
    pub fn poll(&self, job_id: &str) -> Result<Option<JobSnapshot>, RemoteExecutionError> {
        self.poll_within(job_id, self.config.poll_timeout)
    }

    fn poll_within(
        &self,
        job_id: &str,
        timeout: Duration,
    ) -> Result<Option<JobSnapshot>, RemoteExecutionError> {
        let (result, _raw) = dispatch_value(
            self.remote,
            &DispatchRequest::new("job_poll", json!({ "job_id": job_id })),
            timeout,
        );
        match result? {
            Value::Null => Ok(None),
            value => serde_json::from_value(value)
                .map(Some)
                .map_err(|err| RemoteExecutionError {
                    op: "job_poll".to_string(),
                    message: format!("invalid job record: {err}"),
                    trace: None,
                }),
        }
    }

    /// Polls at a fixed interval until the job reaches a status that ends
    /// polling, or fabricates a local timeout once the ceiling passes. No
    /// single poll may outlive the ceiling.
    pub fn wait_for_terminal(&self, job: &mut RemoteJob) -> WaitSummary {
        let start = Instant::now();
        let mut polls = 0u32;
        loop {
            polls += 1;
            let remaining = self.config.ceiling.saturating_sub(start.elapsed());
            match self.poll_within(&job.job_id, self.config.poll_timeout.min(remaining)) {
                Ok(Some(snapshot)) => {
                    if job.observe(&snapshot) {
                        info!(
                            job_id = %job.job_id,
                            status = %job.status,
                            step = job.step.as_deref().unwrap_or(""),
                            "job progressed"
                        );
                    }
                    if job.status.ends_polling() {
                        return WaitSummary {
                            polls,
                            elapsed_ms: start.elapsed().as_millis(),
                            timed_out: false,
                        };
                    }
                }
                Ok(None) => debug!(job_id = %job.job_id, "job not yet visible"),
                Err(err) => debug!(job_id = %job.job_id, error = %err, "job poll failed"),
            }
            if start.elapsed() >= self.config.ceiling {
                warn!(job_id = %job.job_id, ceiling = ?self.config.ceiling, "job polling timed out");
                job.mark_timeout();
                return WaitSummary {
                    polls,
                    elapsed_ms: start.elapsed().as_millis(),
                    timed_out: true,
                };
            }
            let remaining = self.config.ceiling.saturating_sub(start.elapsed());
            thread::sleep(self.config.poll_interval.min(remaining));
        }
    }

    /// Saves the created project. Valid only after `ready_for_save` was
    /// observed; the remote side re-checks the same precondition.
    pub fn save(
        &self,
        job: &RemoteJob,
        request: &ProvisionRequest,
    ) -> Result<SaveResult, JobError> {
        if job.status != JobStatus::ReadyForSave {
            return Err(JobError::NotReadyForSave { status: job.status });
        }
        let params = json!({
            "job_id": job.job_id,
            "output_path": normalize_remote_path(&request.output_path),
            "save_delay": clamp_delay(request.save_delay_secs),
            "reopen_delay": clamp_delay(request.reopen_delay_secs),
        });
        let (result, _raw) = dispatch_value(
            self.remote,
            &DispatchRequest::new("job_save", params),
            self.config.save_timeout,
        );
        let save = match result {
            Ok(value) => serde_json::from_value(value).unwrap_or_else(|err| SaveResult {
                job_id: job.job_id.clone(),
                error: Some(RemoteExecutionError {
                    op: "job_save".to_string(),
                    message: format!("invalid save result: {err}"),
                    trace: None,
                }),
                ..SaveResult::default()
            }),
            Err(err) => SaveResult {
                job_id: job.job_id.clone(),
                status: Some(JobStatus::Error),
                error: Some(err),
                ..SaveResult::default()
            },
        };
        if let Some(err) = &save.error {
            warn!(job_id = %job.job_id, error = %err, "remote save failed");
        } else {
            info!(job_id = %job.job_id, step = save.step.as_deref().unwrap_or(""), "remote save finished");
        }
        Ok(save)
    }

    /// Full create → save → reopen cycle. Error and timeout are reported in
    /// the outcome, not raised; only a missing job identity is an error.
    pub fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionOutcome, JobError> {
        let mut job = self.start(request)?;
        let wait = self.wait_for_terminal(&mut job);
        if job.status != JobStatus::ReadyForSave {
            return Ok(ProvisionOutcome {
                job,
                wait,
                save: None,
            });
        }

        let save = self.save(&job, request)?;
        match self.poll(&job.job_id) {
            Ok(Some(snapshot)) => {
                job.observe(&snapshot);
            }
            Ok(None) => warn!(job_id = %job.job_id, "job record vanished after save"),
            Err(err) => warn!(job_id = %job.job_id, error = %err, "final job poll failed"),
        }
        if !job.status.is_final() {
            let reason = match &save.error {
                Some(err) => err.message.clone(),
                None => format!("save did not complete (last step {:?})", job.step),
            };
            job.mark_error(reason);
        }
        info!(job_id = %job.job_id, status = %job.status, "job lifecycle finished");
        Ok(ProvisionOutcome {
            job,
            wait,
            save: Some(save),
        })
    }
}
