//! In-process engine with libobs-like rules and no media pipeline
//!
//! Tracks every resource instance it hands out, refuses video/audio resets while
//! an output is active, records each API call and counts releases per handle so
//! double releases are visible. Faults can be injected at any step.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::{
    Engine, EncoderHandle, EngineError, OutputHandle, ResourceKind, ServiceHandle,
    VideoResetFailure,
};
use crate::capture::{AudioConfig, VideoConfig};

/// Version reported by a simulated engine unless overridden
pub const SIMULATED_VERSION: &str = "30.2.0-simulated";

/// Engine call that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// Startup returns but the engine stays uninitialized
    Startup,
    ModuleLoad,
    ResetVideo,
    ResetAudio,
    CreateVideoEncoder,
    CreateAudioEncoder,
    BindVideo,
    BindAudio,
    CreateOutput,
    AttachVideoEncoder,
    AttachAudioEncoder,
    CreateService,
    AttachService,
    StartOutput,
}

impl FaultPoint {
    /// Every step of bringing an output session up, in the order it happens
    pub const SESSION_STEPS: [FaultPoint; 10] = [
        FaultPoint::CreateVideoEncoder,
        FaultPoint::CreateAudioEncoder,
        FaultPoint::BindVideo,
        FaultPoint::BindAudio,
        FaultPoint::CreateOutput,
        FaultPoint::AttachVideoEncoder,
        FaultPoint::AttachAudioEncoder,
        FaultPoint::CreateService,
        FaultPoint::AttachService,
        FaultPoint::StartOutput,
    ];
}

#[derive(Debug)]
struct SimResource {
    kind: ResourceKind,
    name: String,
    bound: bool,
    active: bool,
    video_encoder: Option<usize>,
    audio_encoder: Option<usize>,
    service: Option<usize>,
}

impl SimResource {
    fn new(kind: ResourceKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            bound: false,
            active: false,
            video_encoder: None,
            audio_encoder: None,
            service: None,
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    initialized: bool,
    modules_loaded: bool,
    video: Option<VideoConfig>,
    audio: Option<AudioConfig>,
    resources: BTreeMap<usize, SimResource>,
    next_handle: usize,
    releases: HashMap<usize, u32>,
    calls: Vec<&'static str>,
    faults: HashSet<FaultPoint>,
}

impl SimState {
    fn faulted(&self, point: FaultPoint) -> bool {
        self.faults.contains(&point)
    }

    fn any_output_active(&self) -> bool {
        self.resources
            .values()
            .any(|r| r.kind == ResourceKind::Output && r.active)
    }

    fn allocate(&mut self, kind: ResourceKind, name: &str) -> usize {
        self.next_handle += 1;
        let raw = self.next_handle;
        self.resources.insert(raw, SimResource::new(kind, name));
        debug!("simulated engine created {} '{}' (#{})", kind, name, raw);
        raw
    }

    fn resource_mut(&mut self, raw: usize, kinds: &[ResourceKind]) -> Option<&mut SimResource> {
        self.resources
            .get_mut(&raw)
            .filter(|r| kinds.contains(&r.kind))
    }

    fn release(&mut self, raw: usize, kind: ResourceKind) {
        let count = self.releases.entry(raw).or_insert(0);
        *count += 1;
        if *count > 1 {
            warn!("simulated engine: {} #{} released {} times", kind, raw, count);
        }
        self.resources.remove(&raw);
    }
}

/// Stand-in for libobs used by the host binary's dry-run mode and by tests
#[derive(Debug)]
pub struct SimulatedEngine {
    version: String,
    state: Mutex<SimState>,
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self::with_version(SIMULATED_VERSION)
    }

    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            state: Mutex::new(SimState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a call and return the locked state
    fn call(&self, name: &'static str) -> MutexGuard<'_, SimState> {
        let mut state = self.state();
        state.calls.push(name);
        state
    }

    /// Make the given step fail until the fault is cleared
    pub fn inject(&self, point: FaultPoint) {
        self.state().faults.insert(point);
    }

    pub fn clear_fault(&self, point: FaultPoint) {
        self.state().faults.remove(&point);
    }

    /// Every engine call made so far, in order
    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    /// Number of resources created and not yet released
    pub fn live_resources(&self) -> usize {
        self.state().resources.len()
    }

    pub fn live_of_kind(&self, kind: ResourceKind) -> usize {
        self.state()
            .resources
            .values()
            .filter(|r| r.kind == kind)
            .count()
    }

    /// Number of times the handle with this raw value was released
    pub fn release_count(&self, raw: usize) -> u32 {
        self.state().releases.get(&raw).copied().unwrap_or(0)
    }

    /// Number of release calls so far
    pub fn total_releases(&self) -> u32 {
        self.state().releases.values().sum()
    }

    /// Handles that were released more than once
    pub fn double_releases(&self) -> usize {
        self.state().releases.values().filter(|&&n| n > 1).count()
    }

    /// Last video settings the engine accepted
    pub fn video(&self) -> Option<VideoConfig> {
        self.state().video.clone()
    }

    /// Last audio settings the engine accepted
    pub fn audio(&self) -> Option<AudioConfig> {
        self.state().audio
    }

    pub fn any_output_active(&self) -> bool {
        self.state().any_output_active()
    }
}

impl Engine for SimulatedEngine {
    fn startup(&self, locale: &str, module_config_path: Option<&Path>) -> Result<(), EngineError> {
        let mut state = self.call("startup");
        debug!(
            "simulated engine startup (locale: {}, module config: {:?})",
            locale, module_config_path
        );
        if !state.faulted(FaultPoint::Startup) {
            state.initialized = true;
        }
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.call("is_initialized").initialized
    }

    fn load_all_modules(&self) -> Result<(), EngineError> {
        let mut state = self.call("load_all_modules");
        if state.faulted(FaultPoint::ModuleLoad) {
            return Err(EngineError::ModuleLoad("simulated module failure".to_string()));
        }
        state.modules_loaded = true;
        Ok(())
    }

    fn version(&self) -> String {
        let _state = self.call("version");
        self.version.clone()
    }

    fn shutdown(&self) {
        let mut state = self.call("shutdown");
        state.initialized = false;
        state.modules_loaded = false;
        state.video = None;
        state.audio = None;
        state.resources.clear();
    }

    fn reset_video(&self, video: &VideoConfig) -> Result<(), EngineError> {
        let mut state = self.call("reset_video");
        if state.faulted(FaultPoint::ResetVideo) || !state.initialized {
            return Err(EngineError::VideoReset(VideoResetFailure::Fail));
        }
        if state.any_output_active() {
            return Err(EngineError::VideoReset(VideoResetFailure::CurrentlyActive));
        }
        let sizes = [
            video.base_width,
            video.base_height,
            video.output_width,
            video.output_height,
        ];
        if sizes.contains(&0) || video.fps_num == 0 || video.fps_den == 0 {
            return Err(EngineError::VideoReset(VideoResetFailure::InvalidParam));
        }
        state.video = Some(video.clone());
        Ok(())
    }

    fn reset_audio(&self, audio: &AudioConfig) -> Result<(), EngineError> {
        let mut state = self.call("reset_audio");
        if state.faulted(FaultPoint::ResetAudio) || !state.initialized || state.any_output_active()
        {
            return Err(EngineError::AudioReset);
        }
        state.audio = Some(*audio);
        Ok(())
    }

    fn create_video_encoder(&self, id: &str, name: &str) -> Result<EncoderHandle, EngineError> {
        let mut state = self.call("create_video_encoder");
        if state.faulted(FaultPoint::CreateVideoEncoder) || !state.initialized {
            return Err(EngineError::CreateFailed {
                kind: ResourceKind::VideoEncoder,
                id: id.to_string(),
            });
        }
        Ok(EncoderHandle::from_raw(
            state.allocate(ResourceKind::VideoEncoder, name),
        ))
    }

    fn create_audio_encoder(
        &self,
        id: &str,
        name: &str,
        _mixer_index: usize,
    ) -> Result<EncoderHandle, EngineError> {
        let mut state = self.call("create_audio_encoder");
        if state.faulted(FaultPoint::CreateAudioEncoder) || !state.initialized {
            return Err(EngineError::CreateFailed {
                kind: ResourceKind::AudioEncoder,
                id: id.to_string(),
            });
        }
        Ok(EncoderHandle::from_raw(
            state.allocate(ResourceKind::AudioEncoder, name),
        ))
    }

    fn bind_video(&self, encoder: &EncoderHandle) -> Result<(), EngineError> {
        let mut state = self.call("bind_video");
        let faulted = state.faulted(FaultPoint::BindVideo);
        match state.resource_mut(encoder.raw(), &[ResourceKind::VideoEncoder]) {
            Some(resource) if !faulted => {
                resource.bound = true;
                Ok(())
            }
            _ => Err(EngineError::BindFailed(ResourceKind::VideoEncoder)),
        }
    }

    fn bind_audio(&self, encoder: &EncoderHandle) -> Result<(), EngineError> {
        let mut state = self.call("bind_audio");
        let faulted = state.faulted(FaultPoint::BindAudio);
        match state.resource_mut(encoder.raw(), &[ResourceKind::AudioEncoder]) {
            Some(resource) if !faulted => {
                resource.bound = true;
                Ok(())
            }
            _ => Err(EngineError::BindFailed(ResourceKind::AudioEncoder)),
        }
    }

    fn create_output(&self, id: &str, name: &str) -> Result<OutputHandle, EngineError> {
        let mut state = self.call("create_output");
        if state.faulted(FaultPoint::CreateOutput) || !state.initialized {
            return Err(EngineError::CreateFailed {
                kind: ResourceKind::Output,
                id: id.to_string(),
            });
        }
        Ok(OutputHandle::from_raw(
            state.allocate(ResourceKind::Output, name),
        ))
    }

    fn create_service(&self, id: &str, name: &str) -> Result<ServiceHandle, EngineError> {
        let mut state = self.call("create_service");
        if state.faulted(FaultPoint::CreateService) || !state.initialized {
            return Err(EngineError::CreateFailed {
                kind: ResourceKind::Service,
                id: id.to_string(),
            });
        }
        Ok(ServiceHandle::from_raw(
            state.allocate(ResourceKind::Service, name),
        ))
    }

    fn set_output_video_encoder(
        &self,
        output: &OutputHandle,
        encoder: &EncoderHandle,
    ) -> Result<(), EngineError> {
        let mut state = self.call("set_output_video_encoder");
        let usable = !state.faulted(FaultPoint::AttachVideoEncoder)
            && state
                .resource_mut(encoder.raw(), &[ResourceKind::VideoEncoder])
                .is_some();
        match state.resource_mut(output.raw(), &[ResourceKind::Output]) {
            Some(resource) if usable => {
                resource.video_encoder = Some(encoder.raw());
                Ok(())
            }
            _ => Err(EngineError::AttachFailed(ResourceKind::VideoEncoder)),
        }
    }

    fn set_output_audio_encoder(
        &self,
        output: &OutputHandle,
        encoder: &EncoderHandle,
        _track: usize,
    ) -> Result<(), EngineError> {
        let mut state = self.call("set_output_audio_encoder");
        let usable = !state.faulted(FaultPoint::AttachAudioEncoder)
            && state
                .resource_mut(encoder.raw(), &[ResourceKind::AudioEncoder])
                .is_some();
        match state.resource_mut(output.raw(), &[ResourceKind::Output]) {
            Some(resource) if usable => {
                resource.audio_encoder = Some(encoder.raw());
                Ok(())
            }
            _ => Err(EngineError::AttachFailed(ResourceKind::AudioEncoder)),
        }
    }

    fn set_output_service(
        &self,
        output: &OutputHandle,
        service: &ServiceHandle,
    ) -> Result<(), EngineError> {
        let mut state = self.call("set_output_service");
        let usable = !state.faulted(FaultPoint::AttachService)
            && state
                .resource_mut(service.raw(), &[ResourceKind::Service])
                .is_some();
        match state.resource_mut(output.raw(), &[ResourceKind::Output]) {
            Some(resource) if usable => {
                resource.service = Some(service.raw());
                Ok(())
            }
            _ => Err(EngineError::AttachFailed(ResourceKind::Service)),
        }
    }

    fn start_output(&self, output: &OutputHandle) -> Result<(), EngineError> {
        let mut state = self.call("start_output");
        if state.faulted(FaultPoint::StartOutput) {
            return Err(EngineError::OutputStart(
                "simulated connection failure".to_string(),
            ));
        }
        let resource = state
            .resource_mut(output.raw(), &[ResourceKind::Output])
            .ok_or_else(|| EngineError::OutputStart("unknown output".to_string()))?;
        if resource.video_encoder.is_none() || resource.audio_encoder.is_none() {
            return Err(EngineError::OutputStart(
                "output has no encoders attached".to_string(),
            ));
        }
        resource.active = true;
        Ok(())
    }

    fn stop_output(&self, output: &OutputHandle) {
        let mut state = self.call("stop_output");
        if let Some(resource) = state.resource_mut(output.raw(), &[ResourceKind::Output]) {
            resource.active = false;
        }
    }

    fn release_output(&self, output: OutputHandle) {
        self.call("release_output")
            .release(output.raw(), ResourceKind::Output);
    }

    fn release_encoder(&self, encoder: EncoderHandle) {
        let mut state = self.call("release_encoder");
        let kind = state
            .resources
            .get(&encoder.raw())
            .map(|r| r.kind)
            .unwrap_or(ResourceKind::VideoEncoder);
        state.release(encoder.raw(), kind);
    }

    fn release_service(&self, service: ServiceHandle) {
        self.call("release_service")
            .release(service.raw(), ResourceKind::Service);
    }

    fn enum_encoders(&self, visit: &mut dyn FnMut(&str) -> bool) {
        let state = self.call("enum_encoders");
        for resource in state.resources.values().filter(|r| {
            matches!(r.kind, ResourceKind::VideoEncoder | ResourceKind::AudioEncoder)
        }) {
            if !visit(&resource.name) {
                break;
            }
        }
    }

    fn enum_outputs(&self, visit: &mut dyn FnMut(&str) -> bool) {
        let state = self.call("enum_outputs");
        for resource in state
            .resources
            .values()
            .filter(|r| r.kind == ResourceKind::Output)
        {
            if !visit(&resource.name) {
                break;
            }
        }
    }
}
