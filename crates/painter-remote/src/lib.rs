pub mod dispatch;
pub mod path;
pub mod readiness;
pub mod script;
pub mod transport;

pub use crate::dispatch::{
    decode_remote_json, dispatch_value, Dispatch, RemoteExecutionError, RemoteReply,
    ScriptDispatcher,
};
pub use crate::path::normalize_remote_path;
pub use crate::readiness::{
    wait_until_ready, PhaseReport, ReadinessConfig, ReadinessError, ReadinessPhase,
    ReadinessReport,
};
pub use crate::script::{render_dispatch, DispatchRequest, DISPATCHER_VERSION};
pub use crate::transport::{HttpTransport, ScriptLanguage, Transport, TransportError};
