use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("application executable not found: {0}")]
    ExeMissing(PathBuf),
    #[error("spawn {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Starts the host application. The process is left running after the runner
/// exits.
pub trait Launcher {
    fn launch(&self, exe: &Path, args: &[String], project: Option<&Path>)
        -> Result<u32, LaunchError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(
        &self,
        exe: &Path,
        args: &[String],
        project: Option<&Path>,
    ) -> Result<u32, LaunchError> {
        if !exe.is_file() {
            return Err(LaunchError::ExeMissing(exe.to_path_buf()));
        }
        let mut cmd = Command::new(exe);
        cmd.args(args);
        if let Some(project) = project.filter(|p| p.exists()) {
            cmd.arg(project);
        }
        if let Some(dir) = exe.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }
        let child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            path: exe.to_path_buf(),
            source,
        })?;
        info!(exe = %exe.display(), pid = child.id(), "application launched");
        Ok(child.id())
    }
}
