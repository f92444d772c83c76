//! The only place where remote script text is assembled.
//!
//! Callers never splice their own strings into code. A request travels as a
//! base64-encoded JSON document that the fixed dispatcher decodes on the remote
//! side, so paths and names need no escaping. The only escaping performed here
//! is of the dispatcher text itself when it is wrapped into an evaluated
//! expression.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use serde_json::Value;

pub const DISPATCHER_VERSION: &str = "1";
const DISPATCHER_SOURCE: &str = include_str!("dispatcher.py");
const REQUEST_TOKEN: &str = "__REQUEST_B64__";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchRequest {
    pub op: String,
    pub params: Value,
}

impl DispatchRequest {
    pub fn new(op: impl Into<String>, params: Value) -> Self {
        Self {
            op: op.into(),
            params,
        }
    }

    pub fn label(&self) -> &str {
        &self.op
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    dispatcher_version: &'a str,
    op: &'a str,
    params: &'a Value,
}

/// Renders the dispatcher block for one request and wraps it as an expression
/// whose value is the dispatcher's `OUT` text.
pub fn render_dispatch(request: &DispatchRequest) -> String {
    let envelope = Envelope {
        dispatcher_version: DISPATCHER_VERSION,
        op: &request.op,
        params: &request.params,
    };
    // Serializing a Value-backed struct cannot fail.
    let json = serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string());
    let encoded = STANDARD.encode(json.as_bytes());
    let block = DISPATCHER_SOURCE.replace(REQUEST_TOKEN, &encoded);
    wrap_block_as_expression(&block)
}

pub fn wrap_block_as_expression(block: &str) -> String {
    format!(
        "(lambda g: (exec('''{}''', g), g.get('OUT', ''))[1])({{}})",
        escape_triple_quoted(block)
    )
}

pub fn escape_triple_quoted(text: &str) -> String {
    text.replace('\\', "\\\\").replace("'''", "\\'\\'\\'")
}

/// Recovers the request embedded in a rendered dispatch script.
pub fn extract_request(script: &str) -> Option<DispatchRequest> {
    let marker = "REQUEST_B64 = \"";
    let start = script.find(marker)? + marker.len();
    let end = start + script[start..].find('"')?;
    let bytes = STANDARD.decode(&script[start..end]).ok()?;
    let envelope: Value = serde_json::from_slice(&bytes).ok()?;
    let op = envelope.get("op")?.as_str()?.to_string();
    let params = envelope.get("params").cloned().unwrap_or(Value::Null);
    Some(DispatchRequest { op, params })
}
