use painter_binding::{
    BindingOptions, SurfaceTimeouts, DEFAULT_WAIT_INTERVAL, DEFAULT_WAIT_TRIES,
};
use painter_job::JobConfig;
use painter_remote::ReadinessConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const HOST_ENV: &str = "PAINTER_REMOTE_HOST";
pub const PORT_ENV: &str = "PAINTER_REMOTE_PORT";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("read settings {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid {name}={value}")]
    InvalidEnv { name: &'static str, value: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    pub remote: RemoteSettings,
    pub readiness: ReadinessSettings,
    pub job: JobSettings,
    pub binding: BindingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub host: String,
    pub port: u16,
    pub launch_args: Vec<String>,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 60041,
            launch_args: vec!["--enable-remote-scripting".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReadinessSettings {
    pub transport_budget_secs: u64,
    pub execution_budget_secs: u64,
    pub poll_interval_ms: u64,
    pub execution_timeout_secs: u64,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            transport_budget_secs: 240,
            execution_budget_secs: 300,
            poll_interval_ms: 1000,
            execution_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    pub poll_interval_ms: u64,
    pub ceiling_secs: u64,
    pub start_timeout_secs: u64,
    pub poll_timeout_secs: u64,
    pub save_timeout_secs: u64,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            ceiling_secs: 900,
            start_timeout_secs: 30,
            poll_timeout_secs: 20,
            save_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BindingSettings {
    pub provision_missing: bool,
    pub op_timeout_secs: u64,
    pub wait_timeout_secs: u64,
    pub wait_tries: u32,
    pub wait_interval_ms: u64,
}

impl Default for BindingSettings {
    fn default() -> Self {
        Self {
            provision_missing: true,
            op_timeout_secs: 120,
            wait_timeout_secs: 600,
            wait_tries: DEFAULT_WAIT_TRIES,
            wait_interval_ms: DEFAULT_WAIT_INTERVAL.as_millis() as u64,
        }
    }
}

impl RunnerSettings {
    /// Defaults, overlaid with the TOML file when one is given.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let src = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&src).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(HOST_ENV).filter(|v| !v.trim().is_empty()) {
            self.remote.host = host.trim().to_string();
        }
        if let Some(port) = lookup(PORT_ENV).filter(|v| !v.trim().is_empty()) {
            self.remote.port = port
                .trim()
                .parse()
                .map_err(|_| SettingsError::InvalidEnv {
                    name: PORT_ENV,
                    value: port.clone(),
                })?;
        }
        Ok(())
    }

    pub fn readiness_config(&self) -> ReadinessConfig {
        ReadinessConfig {
            transport_budget: Duration::from_secs(self.readiness.transport_budget_secs),
            execution_budget: Duration::from_secs(self.readiness.execution_budget_secs),
            poll_interval: Duration::from_millis(self.readiness.poll_interval_ms),
            execution_timeout: Duration::from_secs(self.readiness.execution_timeout_secs),
        }
    }

    pub fn job_config(&self) -> JobConfig {
        JobConfig {
            poll_interval: Duration::from_millis(self.job.poll_interval_ms),
            ceiling: Duration::from_secs(self.job.ceiling_secs),
            start_timeout: Duration::from_secs(self.job.start_timeout_secs),
            poll_timeout: Duration::from_secs(self.job.poll_timeout_secs),
            save_timeout: Duration::from_secs(self.job.save_timeout_secs),
        }
    }

    pub fn surface_timeouts(&self) -> SurfaceTimeouts {
        SurfaceTimeouts {
            op: Duration::from_secs(self.binding.op_timeout_secs),
            wait_texture_sets: Duration::from_secs(self.binding.wait_timeout_secs),
        }
    }

    pub fn binding_options(&self, version: &str) -> BindingOptions {
        BindingOptions {
            version: version.to_string(),
            provision_missing: self.binding.provision_missing,
        }
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.binding.wait_interval_ms)
    }
}
