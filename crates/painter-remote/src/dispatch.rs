use crate::script::{render_dispatch, DispatchRequest};
use crate::transport::{ScriptLanguage, Transport, TransportError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// A remote script that raised. The transport call itself succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("remote {op} failed: {message}")]
pub struct RemoteExecutionError {
    pub op: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteReply {
    pub op: String,
    pub raw: String,
    pub body: Option<Value>,
}

impl RemoteReply {
    pub fn from_raw(op: &str, raw: String) -> Self {
        let body = decode_remote_json(&raw);
        Self {
            op: op.to_string(),
            raw,
            body,
        }
    }

    /// Builds the reply a dispatcher would send for a successful operation.
    pub fn success(op: &str, result: Value) -> Self {
        let body = json!({ "ok": true, "op": op, "result": result });
        Self {
            op: op.to_string(),
            raw: body.to_string(),
            body: Some(body),
        }
    }

    pub fn failure(op: &str, message: &str) -> Self {
        let body = json!({ "ok": false, "op": op, "error": message });
        Self {
            op: op.to_string(),
            raw: body.to_string(),
            body: Some(body),
        }
    }

    pub fn remote_error(&self) -> Option<RemoteExecutionError> {
        let body = match &self.body {
            Some(body) => body,
            None => {
                return Some(RemoteExecutionError {
                    op: self.op.clone(),
                    message: format!("unparseable reply: {}", truncate(&self.raw, 500)),
                    trace: None,
                })
            }
        };
        if body.get("ok").and_then(Value::as_bool) == Some(true) {
            return None;
        }
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("malformed reply: {}", truncate(&self.raw, 500)));
        Some(RemoteExecutionError {
            op: self.op.clone(),
            message,
            trace: body.get("trace").and_then(Value::as_str).map(str::to_string),
        })
    }

    /// The operation result, or the structured remote error.
    pub fn into_result(self) -> Result<Value, RemoteExecutionError> {
        if let Some(err) = self.remote_error() {
            return Err(err);
        }
        Ok(self
            .body
            .and_then(|mut body| body.get_mut("result").map(Value::take))
            .unwrap_or(Value::Null))
    }
}

/// Structured request/reply channel to the remote dispatcher.
pub trait Dispatch {
    fn dispatch(
        &self,
        request: &DispatchRequest,
        timeout: Duration,
    ) -> Result<RemoteReply, TransportError>;
}

impl<D: Dispatch + ?Sized> Dispatch for &D {
    fn dispatch(
        &self,
        request: &DispatchRequest,
        timeout: Duration,
    ) -> Result<RemoteReply, TransportError> {
        (**self).dispatch(request, timeout)
    }
}

/// Sends requests as rendered dispatcher scripts over a raw transport.
#[derive(Debug, Clone)]
pub struct ScriptDispatcher<T> {
    transport: T,
}

impl<T: Transport> ScriptDispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

impl<T: Transport> Dispatch for ScriptDispatcher<T> {
    fn dispatch(
        &self,
        request: &DispatchRequest,
        timeout: Duration,
    ) -> Result<RemoteReply, TransportError> {
        let script = render_dispatch(request);
        debug!(op = request.label(), bytes = script.len(), "dispatching remote op");
        match self
            .transport
            .execute(ScriptLanguage::Python, &script, timeout)
        {
            Ok(raw) => {
                debug!(op = request.label(), return_len = raw.len(), "remote op returned");
                Ok(RemoteReply::from_raw(request.label(), raw))
            }
            Err(err) => {
                warn!(op = request.label(), error = %err, "remote op transport failure");
                Err(err)
            }
        }
    }
}

impl<T: Transport> Transport for ScriptDispatcher<T> {
    fn check_alive_within(&self, timeout: Duration) -> Result<String, TransportError> {
        self.transport.check_alive_within(timeout)
    }

    fn execute(
        &self,
        language: ScriptLanguage,
        script: &str,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        self.transport.execute(language, script, timeout)
    }
}

/// Dispatches and folds transport failures into the same structured error a
/// failing remote script produces, so callers record one kind of failure.
pub fn dispatch_value<D: Dispatch + ?Sized>(
    remote: &D,
    request: &DispatchRequest,
    timeout: Duration,
) -> (Result<Value, RemoteExecutionError>, String) {
    match remote.dispatch(request, timeout) {
        Ok(reply) => {
            let raw = reply.raw.clone();
            (reply.into_result(), raw)
        }
        Err(err) => {
            let raw = json!({
                "_remote_error": true,
                "label": request.label(),
                "error": err.to_string(),
            })
            .to_string();
            (
                Err(RemoteExecutionError {
                    op: request.op.clone(),
                    message: format!("transport: {err}"),
                    trace: None,
                }),
                raw,
            )
        }
    }
}

/// Parses a remote response, decoding twice when the endpoint returns a JSON
/// string that itself holds JSON. A string that is not JSON is kept under
/// `_raw_string`.
pub fn decode_remote_json(raw: &str) -> Option<Value> {
    let value: Value = serde_json::from_str(raw.trim()).ok()?;
    match value {
        Value::String(inner) => match serde_json::from_str(inner.trim()) {
            Ok(decoded) => Some(decoded),
            Err(_) => Some(json!({ "_raw_string": inner })),
        },
        other => Some(other),
    }
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
