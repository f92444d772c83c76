//! Binds texture files to channels of a remote texture set whose object model
//! is only discoverable at runtime.

pub mod apply;
pub mod channel;
pub mod layer;
pub mod provision;
pub mod report;
pub mod resource;
pub mod strategy;
pub mod surface;
pub mod task;

pub use apply::{apply_texture_set, BindingOptions, DEFAULT_WAIT_INTERVAL, DEFAULT_WAIT_TRIES};
pub use channel::{resolve_channel, ChannelEnumeration, ChannelMatch, ResolutionFailure, ResolvedChannel};
pub use report::{
    fingerprint_file, ChannelResolution, FailureKind, RawCapture, ResourceBinding,
    SourceFingerprint, TaskReport, TaskSummary,
};
pub use strategy::{AttemptLog, AttemptRecord, Capabilities, Strategy, StrategyList};
pub use surface::{
    DispatchSurface, Handle, RemoteObject, RemoteSurface, StackInspection, SurfaceTimeouts,
    TextureSetHandle, TextureSetWait,
};
pub use task::{TextureBinding, TextureSetTask};
