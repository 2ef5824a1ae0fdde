//! Engine context shared by every job
//!
//! Holds the engine, the initialized/uninitialized gate and the settings jobs
//! read. One context is created by the boundary layer and handed to jobs by `Arc`,
//! so tests can swap the engine for a simulated one.

use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use crate::config::{Config, EngineConfig, OutputConfig};
use crate::engine::Engine;
use crate::error::ApiError;

use super::settings::{AudioConfig, VideoConfig};

/// Whether the engine has been brought up through an Initialize job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Uninitialized,
    Initialized,
}

/// Guard consulted before any engine work
///
/// Initialization and shutdown are not expected to race other operations; the
/// lock only keeps reads and writes of the flag itself coherent.
#[derive(Debug, Default)]
pub struct EngineGate {
    state: RwLock<EngineState>,
}

impl EngineGate {
    pub fn state(&self) -> EngineState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == EngineState::Initialized
    }

    fn set(&self, next: EngineState) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if *state != next {
            debug!("Engine gate: {:?} -> {:?}", *state, next);
            *state = next;
        }
    }
}

/// Engine plus everything a job needs to drive it
pub struct EngineContext {
    engine: Arc<dyn Engine>,
    gate: EngineGate,
    startup: EngineConfig,
    video_defaults: VideoConfig,
    audio_defaults: AudioConfig,
    output: OutputConfig,
}

impl EngineContext {
    pub fn new(engine: Arc<dyn Engine>, config: &Config) -> Self {
        Self {
            engine,
            gate: EngineGate::default(),
            startup: config.engine.clone(),
            video_defaults: config.video.clone(),
            audio_defaults: config.audio,
            output: config.output.clone(),
        }
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn gate(&self) -> &EngineGate {
        &self.gate
    }

    pub fn is_initialized(&self) -> bool {
        self.gate.is_initialized()
    }

    /// Fail fast with [`ApiError::NotInitialized`] when the gate is closed
    pub fn ensure_initialized(&self) -> Result<(), ApiError> {
        if self.gate.is_initialized() {
            Ok(())
        } else {
            Err(ApiError::NotInitialized)
        }
    }

    pub(crate) fn mark_initialized(&self) {
        self.gate.set(EngineState::Initialized);
    }

    pub(crate) fn mark_uninitialized(&self) {
        self.gate.set(EngineState::Uninitialized);
    }

    pub fn startup_settings(&self) -> &EngineConfig {
        &self.startup
    }

    pub fn video_defaults(&self) -> &VideoConfig {
        &self.video_defaults
    }

    pub fn audio_defaults(&self) -> &AudioConfig {
        &self.audio_defaults
    }

    pub fn output_settings(&self) -> &OutputConfig {
        &self.output
    }

    /// Shut the engine down if the gate is open. Returns whether anything happened.
    pub fn shutdown(&self) -> bool {
        if !self.gate.is_initialized() {
            return false;
        }
        info!("Shutting down engine...");
        self.engine.shutdown();
        self.mark_uninitialized();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SimulatedEngine;

    #[test]
    fn test_gate_starts_closed() {
        let engine = Arc::new(SimulatedEngine::new());
        let ctx = EngineContext::new(engine.clone(), &Config::default());
        assert_eq!(ctx.gate().state(), EngineState::Uninitialized);
        assert!(matches!(ctx.ensure_initialized(), Err(ApiError::NotInitialized)));
        assert!(!ctx.shutdown());
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn test_shutdown_closes_gate() {
        let engine = Arc::new(SimulatedEngine::new());
        let ctx = EngineContext::new(engine.clone(), &Config::default());
        ctx.mark_initialized();
        assert!(ctx.ensure_initialized().is_ok());
        assert!(ctx.shutdown());
        assert!(!ctx.is_initialized());
        assert_eq!(engine.calls(), vec!["shutdown"]);
    }
}
