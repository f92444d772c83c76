mod exit;
mod job_file;
mod launcher;
mod logging;
mod output;
mod runner;
mod settings;

use clap::{Parser, Subcommand};
use exit::ExitCode;
use job_file::{load_job_file, JobDescription};
use launcher::ProcessLauncher;
use painter_remote::{HttpTransport, ScriptDispatcher};
use runner::{RunError, Runner};
use settings::RunnerSettings;
use std::path::{Path, PathBuf};
use tracing::error;

#[derive(Parser, Debug)]
#[command(
    name = "painter-runner",
    about = "Provisions a Substance 3D Painter project remotely and binds textures to it",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a job against the remote application.
    Run(RunArgs),
    /// Parse and validate a job file without contacting the application.
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    job: PathBuf,
    #[arg(long)]
    settings: Option<PathBuf>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// Expect an already running instance instead of launching one.
    #[arg(long)]
    no_launch: bool,
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    job: PathBuf,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if !err.use_stderr() => err.exit(),
        Err(err) => {
            let _ = err.print();
            std::process::exit(ExitCode::Usage.code());
        }
    };

    let code = match args.command {
        Command::Run(run) => run_command(run),
        Command::Check(check) => check_command(check),
    };
    std::process::exit(code.code());
}

fn load_job(path: &Path) -> Result<JobDescription, ExitCode> {
    load_job_file(path).map_err(|err| {
        eprintln!("Job file error: {err}");
        RunError::from(err).exit_code()
    })
}

/// Settings file, then environment, then command-line flags.
fn load_settings(run: &RunArgs) -> Result<RunnerSettings, ExitCode> {
    let mut settings = RunnerSettings::load(run.settings.as_deref())
        .and_then(|mut settings| {
            settings.apply_env(|name| std::env::var(name).ok())?;
            Ok(settings)
        })
        .map_err(|err| {
            error!(error = %err, "settings rejected");
            ExitCode::Usage
        })?;
    if let Some(host) = &run.host {
        settings.remote.host = host.clone();
    }
    if let Some(port) = run.port {
        settings.remote.port = port;
    }
    Ok(settings)
}

fn run_command(run: RunArgs) -> ExitCode {
    // The run log lives in the export folder, so the job file comes first.
    let job = match load_job_file(&run.job) {
        Ok(job) => job,
        Err(err) => {
            if logging::init_logging(&run.log_level, None).is_err() {
                eprintln!("Job file error: {err}");
            }
            error!(job = %run.job.display(), error = %err, "job file rejected");
            return RunError::from(err).exit_code();
        }
    };

    let run_log = output::run_log_path(&job.export_folder);
    if let Err(err) = logging::init_logging(&run.log_level, Some(&run_log)) {
        eprintln!("Logging error: {err}");
        return ExitCode::Fatal;
    }

    let settings = match load_settings(&run) {
        Ok(settings) => settings,
        Err(code) => return code,
    };

    let fingerprint = match output::fingerprint_job_file(&run.job) {
        Ok(fingerprint) => Some(fingerprint),
        Err(err) => {
            error!(error = %err, "job file fingerprint failed");
            None
        }
    };

    let transport = match HttpTransport::new(&settings.remote.host, settings.remote.port) {
        Ok(transport) => transport,
        Err(err) => {
            error!(error = %err, "transport setup failed");
            return ExitCode::Fatal;
        }
    };
    let remote = ScriptDispatcher::new(transport);
    let launcher = ProcessLauncher;
    Runner::new(&remote, &launcher, &settings, !run.no_launch).execute(&job, fingerprint)
}

fn check_command(check: CheckArgs) -> ExitCode {
    let job = match load_job(&check.job) {
        Ok(job) => job,
        Err(code) => return code,
    };
    println!("Job {}", job.source.display());
    match &job.painter_exe_path {
        Some(exe) => println!("Application: {}", exe.display()),
        None => println!("Application: (not set, --no-launch required)"),
    }
    println!("Mesh: {}", job.mesh_path);
    println!("Project: {}", job.output_project_path);
    println!("Export folder: {}", job.export_folder.display());
    println!(
        "Delays: save={}s reopen={}s",
        job.save_delay_secs, job.reopen_delay_secs
    );
    println!("Texture sets: {}", job.tasks.len());
    for task in &job.tasks {
        println!("- {} [{}]", task.name, task.keys().join(", "));
    }
    if !job.warnings.is_empty() {
        println!("Warnings:");
        for warning in &job.warnings {
            println!("- {}", warning);
        }
    }
    ExitCode::Success
}
