//! The multimedia engine seen through its C-style API
//!
//! [`Engine`] is the only way the rest of the crate touches libobs (or the
//! simulated stand-in). Resource handles are opaque and deliberately not `Clone`:
//! the `release_*` calls take them by value, so a handle can be released at most
//! once.

mod simulated;

#[cfg(feature = "libobs")]
mod native;

pub use simulated::{FaultPoint, SimulatedEngine};

#[cfg(feature = "libobs")]
pub use native::LibObsEngine;

use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::capture::{AudioConfig, VideoConfig};

/// Kind of engine-owned resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    VideoEncoder,
    AudioEncoder,
    Output,
    Service,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::VideoEncoder => "video encoder",
            ResourceKind::AudioEncoder => "audio encoder",
            ResourceKind::Output => "output",
            ResourceKind::Service => "service",
        };
        f.write_str(name)
    }
}

/// Why the engine refused a video reset (mirrors the `OBS_VIDEO_*` codes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoResetFailure {
    Fail,
    NotSupported,
    InvalidParam,
    CurrentlyActive,
    ModuleNotFound,
}

impl VideoResetFailure {
    /// Map a non-success `obs_reset_video` return code
    pub fn from_code(code: i32) -> Self {
        match code {
            -2 => VideoResetFailure::NotSupported,
            -3 => VideoResetFailure::InvalidParam,
            -4 => VideoResetFailure::CurrentlyActive,
            -5 => VideoResetFailure::ModuleNotFound,
            _ => VideoResetFailure::Fail,
        }
    }
}

impl fmt::Display for VideoResetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            VideoResetFailure::Fail => "generic failure",
            VideoResetFailure::NotSupported => "adapter lacks required features",
            VideoResetFailure::InvalidParam => "invalid parameters",
            VideoResetFailure::CurrentlyActive => "an output is currently active",
            VideoResetFailure::ModuleNotFound => "graphics module not found",
        };
        f.write_str(reason)
    }
}

/// Failures reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("engine did not initialize")]
    StartupFailed,

    #[error("failed to load engine modules: {0}")]
    ModuleLoad(String),

    #[error("video reset rejected: {0}")]
    VideoReset(VideoResetFailure),

    #[error("audio reset rejected (is an output active?)")]
    AudioReset,

    #[error("failed to create {kind} '{id}'")]
    CreateFailed { kind: ResourceKind, id: String },

    #[error("failed to bind {0} to the engine's media context")]
    BindFailed(ResourceKind),

    #[error("failed to attach {0} to output")]
    AttachFailed(ResourceKind),

    #[error("output failed to start: {0}")]
    OutputStart(String),

    #[error("string passed to the engine contains a NUL byte: {0:?}")]
    InvalidString(String),

    #[error("job panicked: {0}")]
    Panicked(String),

    #[error("job ended without reporting a result")]
    Aborted,
}

macro_rules! engine_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, PartialEq, Eq, Hash)]
        pub struct $name(usize);

        impl $name {
            /// Wrap an engine-specific raw handle value
            pub fn from_raw(raw: usize) -> Self {
                Self(raw)
            }

            pub fn raw(&self) -> usize {
                self.0
            }
        }
    };
}

engine_handle!(
    /// Live encoder owned by the engine
    EncoderHandle
);
engine_handle!(
    /// Live output owned by the engine
    OutputHandle
);
engine_handle!(
    /// Live streaming service owned by the engine
    ServiceHandle
);

/// C-style control surface of the multimedia engine
///
/// Implementations must be callable from the blocking pool, so every method
/// takes `&self` and implementations synchronize internally.
pub trait Engine: Send + Sync {
    /// Start the engine core. Does not by itself prove the engine is usable;
    /// callers check [`Engine::is_initialized`] afterwards.
    fn startup(&self, locale: &str, module_config_path: Option<&Path>) -> Result<(), EngineError>;

    fn is_initialized(&self) -> bool;

    /// Load and finish loading every available module
    fn load_all_modules(&self) -> Result<(), EngineError>;

    fn version(&self) -> String;

    /// Release everything the engine owns and tear the core down
    fn shutdown(&self);

    fn reset_video(&self, video: &VideoConfig) -> Result<(), EngineError>;

    fn reset_audio(&self, audio: &AudioConfig) -> Result<(), EngineError>;

    fn create_video_encoder(&self, id: &str, name: &str) -> Result<EncoderHandle, EngineError>;

    fn create_audio_encoder(
        &self,
        id: &str,
        name: &str,
        mixer_index: usize,
    ) -> Result<EncoderHandle, EngineError>;

    /// Feed the encoder from the engine's active video context
    fn bind_video(&self, encoder: &EncoderHandle) -> Result<(), EngineError>;

    /// Feed the encoder from the engine's active audio context
    fn bind_audio(&self, encoder: &EncoderHandle) -> Result<(), EngineError>;

    fn create_output(&self, id: &str, name: &str) -> Result<OutputHandle, EngineError>;

    fn create_service(&self, id: &str, name: &str) -> Result<ServiceHandle, EngineError>;

    fn set_output_video_encoder(
        &self,
        output: &OutputHandle,
        encoder: &EncoderHandle,
    ) -> Result<(), EngineError>;

    fn set_output_audio_encoder(
        &self,
        output: &OutputHandle,
        encoder: &EncoderHandle,
        track: usize,
    ) -> Result<(), EngineError>;

    fn set_output_service(
        &self,
        output: &OutputHandle,
        service: &ServiceHandle,
    ) -> Result<(), EngineError>;

    fn start_output(&self, output: &OutputHandle) -> Result<(), EngineError>;

    fn stop_output(&self, output: &OutputHandle);

    fn release_output(&self, output: OutputHandle);

    fn release_encoder(&self, encoder: EncoderHandle);

    fn release_service(&self, service: ServiceHandle);

    /// Visit the name of every encoder instance; the visitor returns `false` to stop
    fn enum_encoders(&self, visit: &mut dyn FnMut(&str) -> bool);

    /// Visit the name of every output instance; the visitor returns `false` to stop
    fn enum_outputs(&self, visit: &mut dyn FnMut(&str) -> bool);
}
