use crate::strategy::AttemptLog;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MissingFile,
    ChannelUnresolved,
    TargetUnavailable,
    ImportFailed,
    IdentifierUnresolved,
    BindFailed,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::MissingFile => "missing_file",
            FailureKind::ChannelUnresolved => "channel_unresolved",
            FailureKind::TargetUnavailable => "target_unavailable",
            FailureKind::ImportFailed => "import_failed",
            FailureKind::IdentifierUnresolved => "identifier_unresolved",
            FailureKind::BindFailed => "bind_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFingerprint {
    pub sha256: String,
    pub size: u64,
}

pub fn fingerprint_file(path: &Path) -> Result<SourceFingerprint, String> {
    let bytes = fs::read(path).map_err(|err| format!("read {}: {err}", path.display()))?;
    let size = bytes.len() as u64;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hasher.finalize();
    Ok(SourceFingerprint {
        sha256: format!("{:x}", digest),
        size,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelResolution {
    pub key: String,
    pub resolved_channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_by: Option<String>,
    pub provisioned: bool,
    pub provision_strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBinding {
    pub key: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceFingerprint>,
    pub import_ok: bool,
    pub import_strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    pub resolved_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_strategy: Option<String>,
    pub bind_ok: bool,
    pub failure_kind: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResourceBinding {
    pub fn new(key: &str, path: &str) -> Self {
        Self {
            key: key.to_string(),
            path: path.to_string(),
            ..Self::default()
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.bind_ok && self.failure_kind.is_none()
    }

    pub fn fail(&mut self, kind: FailureKind, error: impl Into<String>) {
        self.failure_kind = Some(kind);
        self.error = Some(error.into());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub channels_resolved: usize,
    pub channels_provisioned: usize,
    pub bindings_ok: usize,
    pub bindings_failed: usize,
    pub attempts: usize,
}

/// Everything that happened while applying one texture set. Appending never
/// fails; the report is serialized once the task completes or aborts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub version: String,
    pub task: String,
    pub texture_set: Option<String>,
    pub stack: Option<String>,
    pub fill: Option<String>,
    pub capabilities: Vec<String>,
    pub channel_members: Vec<String>,
    pub channel_formats: Vec<String>,
    pub existing_channels: Vec<String>,
    pub channels: Vec<ChannelResolution>,
    pub bindings: Vec<ResourceBinding>,
    pub attempts: AttemptLog,
    pub errors: Vec<String>,
    pub completed: bool,
}

impl TaskReport {
    pub fn new(task: &str, version: &str) -> Self {
        Self {
            version: version.to_string(),
            task: task.to_string(),
            ..Self::default()
        }
    }

    pub fn push_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn channel(&self, key: &str) -> Option<&ChannelResolution> {
        self.channels.iter().find(|c| c.key == key)
    }

    pub fn binding(&self, key: &str) -> Option<&ResourceBinding> {
        self.bindings.iter().find(|b| b.key == key)
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            channels_resolved: self
                .channels
                .iter()
                .filter(|c| c.resolved_channel.is_some())
                .count(),
            channels_provisioned: self.channels.iter().filter(|c| c.provisioned).count(),
            bindings_ok: self.bindings.iter().filter(|b| b.bind_ok).count(),
            bindings_failed: self.bindings.iter().filter(|b| !b.bind_ok).count(),
            attempts: self.attempts.len(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    pub op: String,
    pub ok: bool,
    pub raw: String,
}

/// Raw remote responses in arrival order, kept for replay when structured
/// parsing is not enough.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCapture {
    entries: Vec<RawEntry>,
}

impl RawCapture {
    pub fn push(&mut self, op: &str, ok: bool, raw: String) {
        self.entries.push(RawEntry {
            op: op.to_string(),
            ok,
            raw,
        });
    }

    pub fn entries(&self) -> &[RawEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (index, entry) in self.entries.iter().enumerate() {
            let _ = writeln!(out, "### {index} {} ok={}", entry.op, entry.ok);
            let _ = writeln!(out, "{}", entry.raw);
        }
        out
    }
}
