use painter_binding::{
    fingerprint_file, RawCapture, SourceFingerprint, TaskReport, TaskSummary, TextureSetWait,
};
use painter_job::ProvisionOutcome;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const RUNNER_VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));
pub const RUN_LOG_FILE: &str = "job_runner.local.log";
pub const APPLY_LOG_FILE: &str = "painter_remote_apply.log";
const RUN_SUMMARY_SCHEMA_VERSION: &str = "1";

/// Task name usable as a file name fragment.
pub fn safe_task_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ':' | '/' | '\\' | ' ' => '_',
            other => other,
        })
        .collect()
}

pub fn run_log_path(export_folder: &Path) -> PathBuf {
    export_folder.join(RUN_LOG_FILE)
}

pub fn raw_capture_path(export_folder: &Path, task: &str) -> PathBuf {
    export_folder.join(format!("painter_apply_{}_RAW.txt", safe_task_name(task)))
}

pub fn task_report_path(export_folder: &Path, task: &str) -> PathBuf {
    export_folder.join(format!(
        "painter_apply_{}_{RUNNER_VERSION}.json",
        safe_task_name(task)
    ))
}

pub fn run_summary_path(export_folder: &Path) -> PathBuf {
    export_folder.join(format!("painter_run_{RUNNER_VERSION}.json"))
}

/// Human-readable trail of remote results, one line per event.
#[derive(Debug, Clone)]
pub struct ApplyLog {
    path: PathBuf,
}

impl ApplyLog {
    pub fn create(export_folder: &Path) -> Result<Self, String> {
        fs::create_dir_all(export_folder)
            .map_err(|err| format!("create export folder {}: {err}", export_folder.display()))?;
        let path = export_folder.join(APPLY_LOG_FILE);
        fs::write(
            &path,
            format!("=== START {APPLY_LOG_FILE} ({RUNNER_VERSION}) ===\n"),
        )
        .map_err(|err| format!("write {}: {err}", path.display()))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a line. A failed write is logged and otherwise ignored.
    pub fn line(&self, text: impl AsRef<str>) {
        let result = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{}", text.as_ref()));
        if let Err(err) = result {
            warn!(path = %self.path.display(), error = %err, "apply log write failed");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFiles {
    pub report: String,
    pub raw: String,
}

/// Writes the raw capture and the structured report of one task. When the
/// report cannot be serialized the raw capture is wrapped instead.
pub fn write_task_outputs(
    export_folder: &Path,
    report: &TaskReport,
    capture: &RawCapture,
) -> Result<TaskFiles, String> {
    let raw_path = raw_capture_path(export_folder, &report.task);
    fs::write(&raw_path, capture.render())
        .map_err(|err| format!("write {}: {err}", raw_path.display()))?;

    let report_path = task_report_path(export_folder, &report.task);
    let json = match report.to_json() {
        Ok(json) => json,
        Err(err) => {
            warn!(task = %report.task, error = %err, "report serialization failed");
            serde_json::json!({ "_version": RUNNER_VERSION, "_raw": capture.render() }).to_string()
        }
    };
    fs::write(&report_path, format!("{json}\n"))
        .map_err(|err| format!("write {}: {err}", report_path.display()))?;

    Ok(TaskFiles {
        report: report_path.display().to_string(),
        raw: raw_path.display().to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFingerprint {
    pub path: String,
    #[serde(flatten)]
    pub digest: SourceFingerprint,
}

pub fn fingerprint_job_file(path: &Path) -> Result<FileFingerprint, String> {
    Ok(FileFingerprint {
        path: path.display().to_string(),
        digest: fingerprint_file(path)?,
    })
}

pub fn derive_run_id(job_sha256: &str, started_at_ms: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(job_sha256.as_bytes());
    hasher.update(b"\n");
    hasher.update(started_at_ms.to_string().as_bytes());
    let digest = hasher.finalize();
    let full = format!("{:x}", digest);
    format!("run-{}", &full[..16])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessSummary {
    pub transport_attempts: u32,
    pub transport_ms: u128,
    pub execution_attempts: u32,
    pub execution_ms: u128,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutcome {
    pub name: String,
    pub summary: TaskSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<TaskFiles>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationInstance {
    Reused,
    Launched,
    NotLaunched,
}

/// Manifest of one runner invocation, written whether or not the run succeeds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub schema_version: String,
    pub run_id: String,
    pub runner_version: String,
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_file: Option<FileFingerprint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<ApplicationInstance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readiness: Option<ReadinessSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning: Option<ProvisionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub texture_set_wait: Option<TextureSetWait>,
    pub tasks: Vec<TaskOutcome>,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    pub fn new(run_id: String, started_at_ms: u64, job_file: Option<FileFingerprint>) -> Self {
        Self {
            schema_version: RUN_SUMMARY_SCHEMA_VERSION.to_string(),
            run_id,
            runner_version: RUNNER_VERSION.to_string(),
            started_at_ms,
            finished_at_ms: started_at_ms,
            job_file,
            instance: None,
            readiness: None,
            provisioning: None,
            texture_set_wait: None,
            tasks: Vec::new(),
            exit_code: 0,
            error: None,
        }
    }

    pub fn write(&self, export_folder: &Path) -> Result<PathBuf, String> {
        let path = run_summary_path(export_folder);
        let json = serde_json::to_string_pretty(self)
            .map_err(|err| format!("serialize run summary: {err}"))?;
        fs::write(&path, format!("{json}\n"))
            .map_err(|err| format!("write {}: {err}", path.display()))?;
        Ok(path)
    }
}
