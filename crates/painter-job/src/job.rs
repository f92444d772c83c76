use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    ReadyForSave,
    Done,
    Error,
    Timeout,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::ReadyForSave => "ready_for_save",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
            JobStatus::Timeout => "timeout",
        }
    }

    /// Statuses that stop the local polling loop.
    pub fn ends_polling(self) -> bool {
        matches!(
            self,
            JobStatus::ReadyForSave | JobStatus::Done | JobStatus::Error
        )
    }

    /// Statuses after which the job record is no longer polled.
    pub fn is_final(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error | JobStatus::Timeout)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (a, b) if a == b => true,
            (Running, ReadyForSave) | (Running, Error) | (Running, Timeout) => true,
            (ReadyForSave, Done) | (ReadyForSave, Error) | (ReadyForSave, Timeout) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The job record as the remote registry holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub ts: Option<f64>,
    #[serde(default)]
    pub mesh_path: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_error: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTransition {
    pub status: JobStatus,
    pub step: Option<String>,
    pub at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteJob {
    pub job_id: String,
    pub status: JobStatus,
    pub step: Option<String>,
    pub mesh_path: String,
    pub output_path: String,
    pub transitions: Vec<JobTransition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl RemoteJob {
    pub fn new(job_id: String, mesh_path: String, output_path: String) -> Self {
        let mut job = Self {
            job_id,
            status: JobStatus::Running,
            step: Some("start".to_string()),
            mesh_path,
            output_path,
            transitions: Vec::new(),
            error_message: None,
            trace: None,
            notes: Vec::new(),
        };
        job.record_transition();
        job
    }

    /// Folds a remote snapshot into the local record. Returns true when the
    /// status or step changed. Snapshots that would move the status backwards
    /// are ignored.
    pub fn observe(&mut self, snapshot: &JobSnapshot) -> bool {
        if snapshot.job_id != self.job_id {
            self.notes.push(format!(
                "ignored snapshot for foreign job {}",
                snapshot.job_id
            ));
            return false;
        }
        if snapshot.status == JobStatus::Timeout {
            self.notes
                .push("ignored remote timeout status; timeout is assigned locally".to_string());
            return false;
        }
        if !self.status.can_transition_to(snapshot.status) {
            self.notes.push(format!(
                "ignored regressive status {} -> {}",
                self.status, snapshot.status
            ));
            return false;
        }
        if snapshot.error.is_some() {
            self.error_message = snapshot.error.clone();
        }
        if snapshot.trace.is_some() {
            self.trace = snapshot.trace.clone();
        }
        if let Some(err) = &snapshot.close_error {
            self.note_once(format!("close after save failed: {err}"));
        }
        if let Some(err) = &snapshot.open_error {
            self.note_once(format!("reopen after save failed: {err}"));
        }
        let changed = snapshot.status != self.status || snapshot.step != self.step;
        self.status = snapshot.status;
        self.step = snapshot.step.clone();
        if changed {
            self.record_transition();
        }
        changed
    }

    pub fn mark_timeout(&mut self) {
        if self.status.can_transition_to(JobStatus::Timeout) && self.status != JobStatus::Timeout
        {
            self.status = JobStatus::Timeout;
            self.record_transition();
        }
    }

    pub fn mark_error(&mut self, message: String) {
        if self.status.can_transition_to(JobStatus::Error) {
            self.status = JobStatus::Error;
            self.step = Some("error".to_string());
            self.error_message = Some(message);
            self.record_transition();
        }
    }

    fn note_once(&mut self, note: String) {
        if !self.notes.contains(&note) {
            self.notes.push(note);
        }
    }

    fn record_transition(&mut self) {
        self.transitions.push(JobTransition {
            status: self.status,
            step: self.step.clone(),
            at_ms: unix_millis(),
        });
    }
}

pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

static JOB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Time-based identifier, unique within this process.
pub fn generate_job_id() -> String {
    let sequence = JOB_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("job-{}-{}-{}", unix_millis(), std::process::id(), sequence)
}
