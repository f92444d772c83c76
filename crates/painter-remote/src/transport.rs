use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 60041;
pub const RUN_PATH: &str = "/run.json";
pub const ALIVE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptLanguage {
    Python,
    JavaScript,
}

impl ScriptLanguage {
    /// Key of the request object that carries the encoded payload.
    pub fn payload_key(self) -> &'static str {
        match self {
            ScriptLanguage::Python => "python",
            ScriptLanguage::JavaScript => "js",
        }
    }
}

impl fmt::Display for ScriptLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.payload_key())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to build http client: {0}")]
    Client(String),
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("remote returned http {status}: {body}")]
    Status { status: u16, body: String },
    #[error("remote response was not readable: {0}")]
    Body(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

/// Raw script execution against the remote endpoint. Implementations never retry.
pub trait Transport {
    /// Empty-payload liveness check bounded by `timeout`.
    fn check_alive_within(&self, timeout: Duration) -> Result<String, TransportError>;

    fn check_alive(&self) -> Result<String, TransportError> {
        self.check_alive_within(ALIVE_TIMEOUT)
    }

    fn execute(
        &self,
        language: ScriptLanguage,
        script: &str,
        timeout: Duration,
    ) -> Result<String, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn check_alive_within(&self, timeout: Duration) -> Result<String, TransportError> {
        (**self).check_alive_within(timeout)
    }

    fn execute(
        &self,
        language: ScriptLanguage,
        script: &str,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        (**self).execute(language, script, timeout)
    }
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(host: &str, port: u16) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|err| TransportError::Client(err.to_string()))?;
        Ok(Self {
            url: format!("http://{host}:{port}{RUN_PATH}"),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn post(&self, body: &Value, timeout: Duration) -> Result<String, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(timeout)
            .json(body)
            .send()
            .map_err(|err| self.classify(err, timeout))?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|err| TransportError::Body(err.to_string()))?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    fn classify(&self, err: reqwest::Error, timeout: Duration) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                url: self.url.clone(),
                timeout,
            }
        } else {
            TransportError::Request {
                url: self.url.clone(),
                source: err,
            }
        }
    }
}

impl Transport for HttpTransport {
    fn check_alive_within(&self, timeout: Duration) -> Result<String, TransportError> {
        self.post(&payload_body(ScriptLanguage::JavaScript, ""), timeout)
    }

    fn execute(
        &self,
        language: ScriptLanguage,
        script: &str,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        self.post(&payload_body(language, script), timeout)
    }
}

/// Request body carrying exactly one language key with the base64 script body.
pub fn payload_body(language: ScriptLanguage, script: &str) -> Value {
    let mut body = Map::new();
    body.insert(
        language.payload_key().to_string(),
        Value::String(STANDARD.encode(script.as_bytes())),
    );
    Value::Object(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_body_has_single_language_key() {
        let body = payload_body(ScriptLanguage::Python, "1+1");
        let object = body.as_object().expect("object");
        assert_eq!(object.len(), 1);
        assert_eq!(object.get("python").and_then(Value::as_str), Some("MSsx"));
    }

    #[test]
    fn empty_script_encodes_to_empty_payload() {
        let body = payload_body(ScriptLanguage::JavaScript, "");
        assert_eq!(body.get("js").and_then(Value::as_str), Some(""));
    }

    #[test]
    fn url_points_at_run_endpoint() {
        let transport = HttpTransport::new("localhost", 60041).expect("client");
        assert_eq!(transport.url(), "http://localhost:60041/run.json");
    }
}
