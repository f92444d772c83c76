use crate::exit::ExitCode;
use crate::job_file::{JobDescription, JobFileError};
use crate::launcher::{LaunchError, Launcher};
use crate::output::{
    derive_run_id, write_task_outputs, ApplicationInstance, ApplyLog, FileFingerprint,
    ReadinessSummary, RunSummary, TaskOutcome, RUNNER_VERSION,
};
use crate::settings::RunnerSettings;
use painter_binding::{apply_texture_set, DispatchSurface, RemoteSurface};
use painter_job::job::unix_millis;
use painter_job::{JobError, JobOrchestrator, JobStatus, ProvisionRequest};
use painter_remote::{wait_until_ready, Dispatch, ReadinessError, Transport};
use std::path::Path;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    JobFile(#[from] JobFileError),
    #[error("painterExePath is required to launch the application")]
    MissingExe,
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error(transparent)]
    Readiness(#[from] ReadinessError),
    #[error(transparent)]
    Job(#[from] JobError),
    #[error("provisioning failed: {0}")]
    Provisioning(String),
    #[error("provisioning timed out after {polls} polls")]
    ProvisionTimeout { polls: u32 },
    #[error("{0}")]
    Io(String),
}

impl RunError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            RunError::JobFile(JobFileError::MissingExportFolder)
            | RunError::JobFile(JobFileError::MissingField(_))
            | RunError::MissingExe => ExitCode::MissingConfig,
            RunError::JobFile(_) | RunError::Launch(_) | RunError::Io(_) => ExitCode::Fatal,
            RunError::Readiness(_) => ExitCode::ReadinessTimeout,
            RunError::Job(JobError::IdentityMissing { .. }) => ExitCode::JobIdentityMissing,
            RunError::Job(JobError::NotReadyForSave { .. }) | RunError::Provisioning(_) => {
                ExitCode::ProvisioningError
            }
            RunError::ProvisionTimeout { .. } => ExitCode::ProvisioningTimeout,
        }
    }
}

/// Drives one job against a remote application: bring it up, provision the
/// project, then apply every texture set in order.
pub struct Runner<'a, R: ?Sized, L: ?Sized> {
    remote: &'a R,
    launcher: &'a L,
    settings: &'a RunnerSettings,
    launch: bool,
}

impl<'a, R, L> Runner<'a, R, L>
where
    R: Transport + Dispatch + ?Sized,
    L: Launcher + ?Sized,
{
    pub fn new(
        remote: &'a R,
        launcher: &'a L,
        settings: &'a RunnerSettings,
        launch: bool,
    ) -> Self {
        Self {
            remote,
            launcher,
            settings,
            launch,
        }
    }

    /// Runs the job and writes the run summary. Never panics on a failed
    /// run; the outcome is the exit code.
    pub fn execute(&self, job: &JobDescription, job_file: Option<FileFingerprint>) -> ExitCode {
        let started_at_ms = unix_millis();
        let seed = job_file
            .as_ref()
            .map(|fp| fp.digest.sha256.clone())
            .unwrap_or_else(|| job.source.display().to_string());
        let run_id = derive_run_id(&seed, started_at_ms);
        info!(
            run_id = %run_id,
            job = %job.source.display(),
            version = RUNNER_VERSION,
            "run started"
        );

        let mut summary = RunSummary::new(run_id, started_at_ms, job_file);
        let code = match self.run(job, &mut summary) {
            Ok(()) => ExitCode::Success,
            Err(err) => {
                error!(error = %err, "run failed");
                summary.error = Some(err.to_string());
                err.exit_code()
            }
        };
        summary.exit_code = code.code();
        summary.finished_at_ms = unix_millis();
        match summary.write(&job.export_folder) {
            Ok(path) => {
                info!(path = %path.display(), exit_code = code.code(), "run summary written")
            }
            Err(err) => warn!(error = %err, "run summary not written"),
        }
        code
    }

    pub fn run(&self, job: &JobDescription, summary: &mut RunSummary) -> Result<(), RunError> {
        let apply_log = ApplyLog::create(&job.export_folder).map_err(RunError::Io)?;
        info!(path = %apply_log.path().display(), "apply log opened");
        for warning in &job.warnings {
            warn!(warning = %warning, "job file");
            apply_log.line(format!("job_file_warning={warning}"));
        }

        summary.instance = Some(self.ensure_instance(job, &apply_log)?);

        let readiness = match wait_until_ready(self.remote, &self.settings.readiness_config()) {
            Ok(report) => report,
            Err(err) => {
                apply_log.line(format!("readiness_timeout phase={} {err}", err.phase()));
                return Err(err.into());
            }
        };
        summary.readiness = Some(ReadinessSummary {
            transport_attempts: readiness.transport.attempts,
            transport_ms: readiness.transport.elapsed.as_millis(),
            execution_attempts: readiness.execution.attempts,
            execution_ms: readiness.execution.elapsed.as_millis(),
        });
        apply_log.line(format!(
            "ready transport_attempts={} execution_attempts={}",
            readiness.transport.attempts, readiness.execution.attempts
        ));

        self.provision(job, &apply_log, summary)?;

        let mut surface = DispatchSurface::new(self.remote, self.settings.surface_timeouts());
        let tries = self.settings.binding.wait_tries;
        match surface.wait_texture_sets(tries, self.settings.wait_interval()) {
            Ok(wait) => {
                apply_log.line(format!(
                    "wait_texture_sets ok={} count={} names={:?}",
                    wait.ok, wait.count, wait.names
                ));
                summary.texture_set_wait = Some(wait);
            }
            Err(err) => {
                warn!(error = %err, "texture sets did not appear");
                apply_log.line(format!("wait_texture_sets error={err}"));
            }
        }
        surface.take_capture();

        let options = self.settings.binding_options(RUNNER_VERSION);
        for task in &job.tasks {
            let report = apply_texture_set(&mut surface, task, &options);
            let capture = surface.take_capture();
            let summary_counts = report.summary();
            apply_log.line(format!(
                "task={} completed={} bindings_ok={} bindings_failed={}",
                task.name,
                report.completed,
                summary_counts.bindings_ok,
                summary_counts.bindings_failed
            ));
            for err in &report.errors {
                apply_log.line(format!("task={} error={err}", task.name));
            }
            for key in task.keys() {
                if let Some(binding) = report.binding(key) {
                    apply_log.line(format!(
                        "task={} key={key} bind_ok={} failure={}",
                        task.name,
                        binding.bind_ok,
                        binding.failure_kind.map(|kind| kind.as_str()).unwrap_or("none")
                    ));
                }
            }
            let files = match write_task_outputs(&job.export_folder, &report, &capture) {
                Ok(files) => Some(files),
                Err(err) => {
                    warn!(task = %task.name, error = %err, "task outputs not written");
                    None
                }
            };
            summary.tasks.push(TaskOutcome {
                name: task.name.clone(),
                summary: summary_counts,
                files,
            });
        }
        info!(tasks = job.tasks.len(), "run finished");
        Ok(())
    }

    fn ensure_instance(
        &self,
        job: &JobDescription,
        apply_log: &ApplyLog,
    ) -> Result<ApplicationInstance, RunError> {
        if !self.launch {
            return Ok(ApplicationInstance::NotLaunched);
        }
        if self.remote.check_alive().is_ok() {
            info!("remote endpoint already answering, reusing running instance");
            apply_log.line("instance=reused");
            return Ok(ApplicationInstance::Reused);
        }
        let exe = job.painter_exe_path.as_deref().ok_or(RunError::MissingExe)?;
        let pid = self.launcher.launch(
            exe,
            &self.settings.remote.launch_args,
            Some(Path::new(&job.output_project_path)),
        )?;
        apply_log.line(format!("instance=launched pid={pid}"));
        Ok(ApplicationInstance::Launched)
    }

    fn provision(
        &self,
        job: &JobDescription,
        apply_log: &ApplyLog,
        summary: &mut RunSummary,
    ) -> Result<(), RunError> {
        let orchestrator = JobOrchestrator::new(self.remote, self.settings.job_config());
        let request = ProvisionRequest {
            mesh_path: job.mesh_path.clone(),
            output_path: job.output_project_path.clone(),
            save_delay_secs: job.save_delay_secs,
            reopen_delay_secs: job.reopen_delay_secs,
        };
        let outcome = match orchestrator.provision(&request) {
            Ok(outcome) => outcome,
            Err(err) => {
                if let JobError::IdentityMissing { raw, .. } = &err {
                    apply_log.line(format!("ensure_project_job_id_raw={raw}"));
                }
                return Err(err.into());
            }
        };
        let status = outcome.status();
        let polls = outcome.wait.polls;
        let message = outcome.job.error_message.clone();
        apply_log.line(format!(
            "ensure_project_job_id={} status={status} step={}",
            outcome.job.job_id,
            outcome.job.step.as_deref().unwrap_or("")
        ));
        summary.provisioning = Some(outcome);
        match status {
            JobStatus::Done => Ok(()),
            JobStatus::Timeout => Err(RunError::ProvisionTimeout { polls }),
            other => Err(RunError::Provisioning(
                message.unwrap_or_else(|| format!("job ended with status {other}")),
            )),
        }
    }
}
