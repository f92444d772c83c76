use crate::layer::{FillPosition, StackStrategy};
use crate::provision::ProvisionAttempt;
use crate::report::RawCapture;
use crate::resource::{IdentifierStrategy, ImportStrategy};
use painter_remote::{dispatch_value, normalize_remote_path, Dispatch, DispatchRequest};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

/// Opaque reference to an object held in the remote handle registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(String);

impl Handle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub handle: Handle,
    #[serde(rename = "type", default)]
    pub type_name: String,
    #[serde(default)]
    pub repr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureSetHandle {
    #[serde(flatten)]
    pub object: RemoteObject,
    #[serde(default)]
    pub channel_members: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackInspection {
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub channel_formats: Vec<String>,
    #[serde(default)]
    pub existing_channels: Vec<String>,
    #[serde(default)]
    pub root_layers: Vec<RemoteObject>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextureSetWait {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub tries: Vec<Value>,
}

/// The remote operations the binding resolver needs. Every method is one
/// round-trip; failures come back as the remote error text.
pub trait RemoteSurface {
    fn wait_texture_sets(&mut self, tries: u32, interval: Duration)
        -> Result<TextureSetWait, String>;

    fn open_texture_set(&mut self, name: &str) -> Result<TextureSetHandle, String>;

    fn locate_stack(
        &mut self,
        texture_set: &Handle,
        strategy: StackStrategy,
    ) -> Result<RemoteObject, String>;

    fn inspect_stack(
        &mut self,
        texture_set: &Handle,
        stack: &Handle,
    ) -> Result<StackInspection, String>;

    fn add_channel(
        &mut self,
        texture_set: &Handle,
        stack: &Handle,
        channel: &str,
        attempt: &ProvisionAttempt,
    ) -> Result<(), String>;

    fn insert_fill(
        &mut self,
        stack: &Handle,
        position: FillPosition,
        root: Option<&Handle>,
    ) -> Result<RemoteObject, String>;

    fn import_resource(
        &mut self,
        path: &str,
        strategy: ImportStrategy,
    ) -> Result<RemoteObject, String>;

    fn resource_identifier(
        &mut self,
        resource: &Handle,
        strategy: &IdentifierStrategy,
    ) -> Result<RemoteObject, String>;

    fn set_source(
        &mut self,
        layer: &Handle,
        channel: &str,
        identifier: &Handle,
    ) -> Result<(), String>;
}

#[derive(Debug, Clone)]
pub struct SurfaceTimeouts {
    pub op: Duration,
    pub wait_texture_sets: Duration,
}

impl Default for SurfaceTimeouts {
    fn default() -> Self {
        Self {
            op: Duration::from_secs(120),
            wait_texture_sets: Duration::from_secs(600),
        }
    }
}

/// `RemoteSurface` over the dispatcher. Keeps every raw response for the
/// task's forensic capture.
pub struct DispatchSurface<'a, D: ?Sized> {
    remote: &'a D,
    timeouts: SurfaceTimeouts,
    capture: RawCapture,
}

impl<'a, D: Dispatch + ?Sized> DispatchSurface<'a, D> {
    pub fn new(remote: &'a D, timeouts: SurfaceTimeouts) -> Self {
        Self {
            remote,
            timeouts,
            capture: RawCapture::default(),
        }
    }

    /// Hands over the responses captured so far and starts a fresh capture.
    pub fn take_capture(&mut self) -> RawCapture {
        std::mem::take(&mut self.capture)
    }

    fn call(&mut self, op: &str, params: Value, timeout: Duration) -> Result<Value, String> {
        let request = DispatchRequest::new(op, params);
        let (result, raw) = dispatch_value(self.remote, &request, timeout);
        self.capture.push(op, result.is_ok(), raw);
        result.map_err(|err| err.message)
    }

    fn call_as<T: DeserializeOwned>(
        &mut self,
        op: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<T, String> {
        let value = self.call(op, params, timeout)?;
        serde_json::from_value(value).map_err(|err| format!("unexpected {op} result: {err}"))
    }
}

impl<'a, D: Dispatch + ?Sized> RemoteSurface for DispatchSurface<'a, D> {
    fn wait_texture_sets(
        &mut self,
        tries: u32,
        interval: Duration,
    ) -> Result<TextureSetWait, String> {
        let timeout = self.timeouts.wait_texture_sets;
        self.call_as(
            "wait_texture_sets",
            json!({ "tries": tries, "interval": interval.as_secs_f64() }),
            timeout,
        )
    }

    fn open_texture_set(&mut self, name: &str) -> Result<TextureSetHandle, String> {
        let timeout = self.timeouts.op;
        self.call_as("open_texture_set", json!({ "name": name }), timeout)
    }

    fn locate_stack(
        &mut self,
        texture_set: &Handle,
        strategy: StackStrategy,
    ) -> Result<RemoteObject, String> {
        let timeout = self.timeouts.op;
        self.call_as(
            "locate_stack",
            json!({ "texture_set": texture_set, "strategy": strategy.as_str() }),
            timeout,
        )
    }

    fn inspect_stack(
        &mut self,
        texture_set: &Handle,
        stack: &Handle,
    ) -> Result<StackInspection, String> {
        let timeout = self.timeouts.op;
        self.call_as(
            "inspect_stack",
            json!({ "texture_set": texture_set, "stack": stack }),
            timeout,
        )
    }

    fn add_channel(
        &mut self,
        texture_set: &Handle,
        stack: &Handle,
        channel: &str,
        attempt: &ProvisionAttempt,
    ) -> Result<(), String> {
        let timeout = self.timeouts.op;
        self.call(
            "add_channel",
            json!({
                "texture_set": texture_set,
                "stack": stack,
                "channel": channel,
                "format": attempt.format,
                "site": attempt.site.as_str(),
            }),
            timeout,
        )
        .map(|_| ())
    }

    fn insert_fill(
        &mut self,
        stack: &Handle,
        position: FillPosition,
        root: Option<&Handle>,
    ) -> Result<RemoteObject, String> {
        let timeout = self.timeouts.op;
        self.call_as(
            "insert_fill",
            json!({ "stack": stack, "position": position.as_str(), "root": root }),
            timeout,
        )
    }

    fn import_resource(
        &mut self,
        path: &str,
        strategy: ImportStrategy,
    ) -> Result<RemoteObject, String> {
        let timeout = self.timeouts.op;
        self.call_as(
            "import_resource",
            json!({ "path": normalize_remote_path(path), "strategy": strategy.as_str() }),
            timeout,
        )
    }

    fn resource_identifier(
        &mut self,
        resource: &Handle,
        strategy: &IdentifierStrategy,
    ) -> Result<RemoteObject, String> {
        let timeout = self.timeouts.op;
        self.call_as(
            "resource_identifier",
            json!({
                "resource": resource,
                "kind": strategy.kind(),
                "name": strategy.name(),
                "target": strategy.target().as_str(),
            }),
            timeout,
        )
    }

    fn set_source(
        &mut self,
        layer: &Handle,
        channel: &str,
        identifier: &Handle,
    ) -> Result<(), String> {
        let timeout = self.timeouts.op;
        self.call(
            "set_source",
            json!({ "layer": layer, "channel": channel, "identifier": identifier }),
            timeout,
        )
        .map(|_| ())
    }
}
