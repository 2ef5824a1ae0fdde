//! libobs-backed engine
//!
//! Thin layer over the raw libobs bindings. Handles carry the libobs pointer as an
//! integer; libobs reference counting keeps them valid until the matching
//! `*_release` call.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{
    Engine, EncoderHandle, EngineError, OutputHandle, ResourceKind, ServiceHandle,
    VideoResetFailure,
};
use crate::capture::{AudioConfig, ChannelLayout, PixelFormat, VideoConfig};

const OBS_VIDEO_SUCCESS: i32 = 0;

/// Engine driving the process-wide libobs core
///
/// libobs keeps its own global state, so this type carries no data; creating two
/// of them still talks to one core.
#[derive(Debug, Default)]
pub struct LibObsEngine;

impl LibObsEngine {
    pub fn new() -> Self {
        Self
    }
}

fn c_string(value: &str) -> Result<CString, EngineError> {
    CString::new(value).map_err(|_| EngineError::InvalidString(value.to_string()))
}

/// Copy a libobs-owned C string, tolerating null
unsafe fn owned_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

fn video_format(format: PixelFormat) -> libobs::video_format {
    match format {
        PixelFormat::I420 => libobs::video_format_VIDEO_FORMAT_I420,
        PixelFormat::Nv12 => libobs::video_format_VIDEO_FORMAT_NV12,
        PixelFormat::I444 => libobs::video_format_VIDEO_FORMAT_I444,
        PixelFormat::Bgra => libobs::video_format_VIDEO_FORMAT_BGRA,
    }
}

fn speaker_layout(layout: ChannelLayout) -> libobs::speaker_layout {
    match layout {
        ChannelLayout::Mono => libobs::speaker_layout_SPEAKERS_MONO,
        ChannelLayout::Stereo => libobs::speaker_layout_SPEAKERS_STEREO,
    }
}

fn encoder_ptr(handle: &EncoderHandle) -> *mut libobs::obs_encoder_t {
    handle.raw() as *mut libobs::obs_encoder_t
}

fn output_ptr(handle: &OutputHandle) -> *mut libobs::obs_output_t {
    handle.raw() as *mut libobs::obs_output_t
}

fn service_ptr(handle: &ServiceHandle) -> *mut libobs::obs_service_t {
    handle.raw() as *mut libobs::obs_service_t
}

unsafe extern "C" fn collect_encoder_name(
    param: *mut c_void,
    encoder: *mut libobs::obs_encoder_t,
) -> bool {
    if param.is_null() || encoder.is_null() {
        return false;
    }
    let visit = &mut *(param as *mut &mut dyn FnMut(&str) -> bool);
    let name = owned_string(libobs::obs_encoder_get_name(encoder));
    visit(&name)
}

unsafe extern "C" fn collect_output_name(
    param: *mut c_void,
    output: *mut libobs::obs_output_t,
) -> bool {
    if param.is_null() || output.is_null() {
        return false;
    }
    let visit = &mut *(param as *mut &mut dyn FnMut(&str) -> bool);
    let name = owned_string(libobs::obs_output_get_name(output));
    visit(&name)
}

impl Engine for LibObsEngine {
    fn startup(&self, locale: &str, module_config_path: Option<&Path>) -> Result<(), EngineError> {
        let locale = c_string(locale)?;
        let module_config = module_config_path
            .map(|p| c_string(&p.to_string_lossy()))
            .transpose()?;
        let module_config_ptr = module_config
            .as_ref()
            .map_or(std::ptr::null(), |p| p.as_ptr());

        info!("Calling obs_startup");
        let ok = unsafe {
            libobs::obs_startup(locale.as_ptr(), module_config_ptr, std::ptr::null_mut())
        };
        if !ok {
            warn!("obs_startup returned false");
        }
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        unsafe { libobs::obs_initialized() }
    }

    fn load_all_modules(&self) -> Result<(), EngineError> {
        unsafe {
            libobs::obs_load_all_modules();
            libobs::obs_log_loaded_modules();
            libobs::obs_post_load_modules();
        }
        Ok(())
    }

    fn version(&self) -> String {
        unsafe { owned_string(libobs::obs_get_version_string()) }
    }

    fn shutdown(&self) {
        info!("Calling obs_shutdown");
        unsafe { libobs::obs_shutdown() }
    }

    fn reset_video(&self, video: &VideoConfig) -> Result<(), EngineError> {
        let graphics_module = c_string(&video.graphics_module)?;

        let mut ovi: libobs::obs_video_info = unsafe { std::mem::zeroed() };
        ovi.adapter = video.adapter;
        ovi.graphics_module = graphics_module.as_ptr();
        ovi.output_format = video_format(video.pixel_format);
        ovi.fps_num = video.fps_num;
        ovi.fps_den = video.fps_den;
        ovi.base_width = video.base_width;
        ovi.base_height = video.base_height;
        ovi.output_width = video.output_width;
        ovi.output_height = video.output_height;

        let code = unsafe { libobs::obs_reset_video(&mut ovi) };
        if code != OBS_VIDEO_SUCCESS {
            return Err(EngineError::VideoReset(VideoResetFailure::from_code(code)));
        }
        Ok(())
    }

    fn reset_audio(&self, audio: &AudioConfig) -> Result<(), EngineError> {
        let mut oai: libobs::obs_audio_info = unsafe { std::mem::zeroed() };
        oai.samples_per_sec = audio.samples_per_sec;
        oai.speakers = speaker_layout(audio.channel_layout);

        if unsafe { libobs::obs_reset_audio(&oai) } {
            Ok(())
        } else {
            Err(EngineError::AudioReset)
        }
    }

    fn create_video_encoder(&self, id: &str, name: &str) -> Result<EncoderHandle, EngineError> {
        let c_id = c_string(id)?;
        let c_name = c_string(name)?;
        let encoder = unsafe {
            libobs::obs_video_encoder_create(
                c_id.as_ptr(),
                c_name.as_ptr(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        if encoder.is_null() {
            return Err(EngineError::CreateFailed {
                kind: ResourceKind::VideoEncoder,
                id: id.to_string(),
            });
        }
        debug!("Created video encoder '{}' ({})", name, id);
        Ok(EncoderHandle::from_raw(encoder as usize))
    }

    fn create_audio_encoder(
        &self,
        id: &str,
        name: &str,
        mixer_index: usize,
    ) -> Result<EncoderHandle, EngineError> {
        let c_id = c_string(id)?;
        let c_name = c_string(name)?;
        let encoder = unsafe {
            libobs::obs_audio_encoder_create(
                c_id.as_ptr(),
                c_name.as_ptr(),
                std::ptr::null_mut(),
                mixer_index,
                std::ptr::null_mut(),
            )
        };
        if encoder.is_null() {
            return Err(EngineError::CreateFailed {
                kind: ResourceKind::AudioEncoder,
                id: id.to_string(),
            });
        }
        debug!("Created audio encoder '{}' ({})", name, id);
        Ok(EncoderHandle::from_raw(encoder as usize))
    }

    fn bind_video(&self, encoder: &EncoderHandle) -> Result<(), EngineError> {
        let video = unsafe { libobs::obs_get_video() };
        if video.is_null() {
            return Err(EngineError::BindFailed(ResourceKind::VideoEncoder));
        }
        unsafe { libobs::obs_encoder_set_video(encoder_ptr(encoder), video) };
        Ok(())
    }

    fn bind_audio(&self, encoder: &EncoderHandle) -> Result<(), EngineError> {
        let audio = unsafe { libobs::obs_get_audio() };
        if audio.is_null() {
            return Err(EngineError::BindFailed(ResourceKind::AudioEncoder));
        }
        unsafe { libobs::obs_encoder_set_audio(encoder_ptr(encoder), audio) };
        Ok(())
    }

    fn create_output(&self, id: &str, name: &str) -> Result<OutputHandle, EngineError> {
        let c_id = c_string(id)?;
        let c_name = c_string(name)?;
        let output = unsafe {
            libobs::obs_output_create(
                c_id.as_ptr(),
                c_name.as_ptr(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        if output.is_null() {
            return Err(EngineError::CreateFailed {
                kind: ResourceKind::Output,
                id: id.to_string(),
            });
        }
        debug!("Created output '{}' ({})", name, id);
        Ok(OutputHandle::from_raw(output as usize))
    }

    fn create_service(&self, id: &str, name: &str) -> Result<ServiceHandle, EngineError> {
        let c_id = c_string(id)?;
        let c_name = c_string(name)?;
        let service = unsafe {
            libobs::obs_service_create(
                c_id.as_ptr(),
                c_name.as_ptr(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        if service.is_null() {
            return Err(EngineError::CreateFailed {
                kind: ResourceKind::Service,
                id: id.to_string(),
            });
        }
        debug!("Created service '{}' ({})", name, id);
        Ok(ServiceHandle::from_raw(service as usize))
    }

    fn set_output_video_encoder(
        &self,
        output: &OutputHandle,
        encoder: &EncoderHandle,
    ) -> Result<(), EngineError> {
        unsafe { libobs::obs_output_set_video_encoder(output_ptr(output), encoder_ptr(encoder)) };
        Ok(())
    }

    fn set_output_audio_encoder(
        &self,
        output: &OutputHandle,
        encoder: &EncoderHandle,
        track: usize,
    ) -> Result<(), EngineError> {
        unsafe {
            libobs::obs_output_set_audio_encoder(output_ptr(output), encoder_ptr(encoder), track)
        };
        Ok(())
    }

    fn set_output_service(
        &self,
        output: &OutputHandle,
        service: &ServiceHandle,
    ) -> Result<(), EngineError> {
        unsafe { libobs::obs_output_set_service(output_ptr(output), service_ptr(service)) };
        Ok(())
    }

    fn start_output(&self, output: &OutputHandle) -> Result<(), EngineError> {
        let ptr = output_ptr(output);
        if unsafe { libobs::obs_output_start(ptr) } {
            return Ok(());
        }
        let reason = unsafe { owned_string(libobs::obs_output_get_last_error(ptr)) };
        Err(EngineError::OutputStart(if reason.is_empty() {
            "unknown error".to_string()
        } else {
            reason
        }))
    }

    fn stop_output(&self, output: &OutputHandle) {
        unsafe { libobs::obs_output_stop(output_ptr(output)) }
    }

    fn release_output(&self, output: OutputHandle) {
        unsafe { libobs::obs_output_release(output_ptr(&output)) }
    }

    fn release_encoder(&self, encoder: EncoderHandle) {
        unsafe { libobs::obs_encoder_release(encoder_ptr(&encoder)) }
    }

    fn release_service(&self, service: ServiceHandle) {
        unsafe { libobs::obs_service_release(service_ptr(&service)) }
    }

    fn enum_encoders(&self, mut visit: &mut dyn FnMut(&str) -> bool) {
        let param = &mut visit as *mut &mut dyn FnMut(&str) -> bool as *mut c_void;
        unsafe { libobs::obs_enum_encoders(Some(collect_encoder_name), param) }
    }

    fn enum_outputs(&self, mut visit: &mut dyn FnMut(&str) -> bool) {
        let param = &mut visit as *mut &mut dyn FnMut(&str) -> bool as *mut c_void;
        unsafe { libobs::obs_enum_outputs(Some(collect_output_name), param) }
    }
}
