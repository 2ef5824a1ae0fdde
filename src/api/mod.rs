//! Host-facing API
//!
//! [`ObsApi`] owns the engine context and the job runner and exposes the entry
//! points the host calls. Lifecycle operations return a [`JobHandle`] right away;
//! shutdown and the enumeration reads run inline.
//!
//! The enumeration reads answer a closed gate with the [`NOT_INITIALIZED`]
//! sentinel string instead of an error, unlike the lifecycle jobs.

mod host;

pub use host::{invoke, EntryPoint, HostReply, HostRequest, HostResponse};

use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::debug;

use crate::capture::EngineContext;
use crate::config::Config;
use crate::engine::Engine;
use crate::error::{ApiError, NOT_INITIALIZED};
use crate::jobs::{self, JobHandle, JobRunner};

/// Result of a successful shutdown
pub const SHUTDOWN_OK: &str = "Success shutting down OBS";

pub struct ObsApi {
    ctx: Arc<EngineContext>,
    runner: JobRunner,
}

impl ObsApi {
    /// Build the API over `engine`, running jobs on `runtime`'s blocking pool
    pub fn new(engine: Arc<dyn Engine>, config: &Config, runtime: Handle) -> Self {
        Self {
            ctx: Arc::new(EngineContext::new(engine, config)),
            runner: JobRunner::new(runtime),
        }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    pub fn is_initialized(&self) -> bool {
        self.ctx.is_initialized()
    }

    /// Start the engine; resolves with `"v" + version`
    pub fn initialize(&self) -> JobHandle<String> {
        jobs::initialize(&self.ctx, &self.runner)
    }

    /// Tear the engine down; returns [`SHUTDOWN_OK`] or the not-initialized sentinel
    ///
    /// Must not run concurrently with other operations.
    pub fn shutdown(&self) -> String {
        if self.ctx.shutdown() {
            SHUTDOWN_OK.to_string()
        } else {
            NOT_INITIALIZED.to_string()
        }
    }

    /// Reset base video from `"WIDTHxHEIGHT"` (either side optional)
    pub fn reset_video(&self, spec: &str) -> Result<JobHandle<String>, ApiError> {
        jobs::reset_video(&self.ctx, &self.runner, spec)
    }

    /// Reset base audio; `"mono"` anywhere in `spec` selects mono
    pub fn reset_audio(&self, spec: &str) -> Result<JobHandle<String>, ApiError> {
        jobs::reset_audio(&self.ctx, &self.runner, spec)
    }

    /// Start (and immediately clean up) a streaming output; `hint` names the service
    pub fn start_output(&self, hint: &str) -> Result<JobHandle<String>, ApiError> {
        jobs::start_output(&self.ctx, &self.runner, hint)
    }

    /// Names of every encoder instance, concatenated with no separator
    pub fn get_codecs(&self) -> String {
        if !self.ctx.is_initialized() {
            return NOT_INITIALIZED.to_string();
        }
        let mut names = String::new();
        self.ctx.engine().enum_encoders(&mut |name| {
            names.push_str(name);
            true
        });
        debug!("Enumerated encoders: {:?}", names);
        names
    }

    /// Names of every output instance, concatenated with no separator
    pub fn get_outputs(&self) -> String {
        if !self.ctx.is_initialized() {
            return NOT_INITIALIZED.to_string();
        }
        let mut names = String::new();
        self.ctx.engine().enum_outputs(&mut |name| {
            names.push_str(name);
            true
        });
        debug!("Enumerated outputs: {:?}", names);
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SimulatedEngine;

    fn api() -> (Arc<SimulatedEngine>, ObsApi) {
        let engine = Arc::new(SimulatedEngine::new());
        let api = ObsApi::new(engine.clone(), &Config::default(), Handle::current());
        (engine, api)
    }

    #[tokio::test]
    async fn test_end_to_end_lifecycle() {
        let (engine, api) = api();

        let version = api.initialize().await.unwrap();
        assert!(version.starts_with('v'));
        assert_eq!(api.reset_video("800x600").unwrap().await.unwrap(), "800x600");
        assert_eq!(api.reset_audio("stereo-mode").unwrap().await.unwrap(), "stereo");
        assert_eq!(api.start_output("twitch").unwrap().await.unwrap(), "ok");
        assert_eq!(engine.live_resources(), 0);

        assert_eq!(api.shutdown(), SHUTDOWN_OK);
        assert!(!api.is_initialized());
        assert_eq!(api.shutdown(), NOT_INITIALIZED);
    }

    #[tokio::test]
    async fn test_closed_gate_never_touches_engine() {
        let (engine, api) = api();

        assert_eq!(api.get_codecs(), NOT_INITIALIZED);
        assert_eq!(api.get_outputs(), NOT_INITIALIZED);
        assert_eq!(api.shutdown(), NOT_INITIALIZED);
        assert!(matches!(api.reset_video("1x1"), Err(ApiError::NotInitialized)));
        assert!(matches!(api.reset_audio("mono"), Err(ApiError::NotInitialized)));
        assert!(matches!(api.start_output(""), Err(ApiError::NotInitialized)));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_enumeration_concatenates_names_and_is_idempotent() {
        let (engine, api) = api();
        api.initialize().await.unwrap();

        assert_eq!(api.get_codecs(), "");

        let video = engine.create_video_encoder("x264", "h264").unwrap();
        let audio = engine.create_audio_encoder("aac", "aac", 0).unwrap();
        let output = engine.create_output("rtmp_output", "rtmp").unwrap();

        assert_eq!(api.get_codecs(), "h264aac");
        assert_eq!(api.get_codecs(), api.get_codecs());
        assert_eq!(api.get_outputs(), "rtmp");
        assert_eq!(api.get_outputs(), api.get_outputs());

        engine.release_output(output);
        engine.release_encoder(video);
        engine.release_encoder(audio);
        assert_eq!(api.get_outputs(), "");
    }

    #[tokio::test]
    async fn test_initialize_after_shutdown_restarts_engine() {
        let (engine, api) = api();
        api.initialize().await.unwrap();
        api.shutdown();
        api.initialize().await.unwrap();
        assert!(api.is_initialized());
        assert_eq!(engine.calls().iter().filter(|c| **c == "startup").count(), 2);
    }
}
