//! Engine-side capture state
//!
//! - [`settings`]: video/audio settings and their compact text forms
//! - [`context`]: the shared engine context and its initialization gate
//! - [`session`]: the scoped owner of an output session's resources

mod context;
mod session;
mod settings;

pub use context::{EngineContext, EngineGate, EngineState};
pub use session::{service_name, OutputSession};
pub use settings::{
    parse_audio_mode, parse_audio_mode_with, parse_video_resolution, parse_video_resolution_with,
    AudioConfig, ChannelLayout, PixelFormat, VideoConfig, DEFAULT_AUDIO_SAMPLES,
    DEFAULT_GRAPHICS_MODULE, DEFAULT_VIDEO_HEIGHT, DEFAULT_VIDEO_WIDTH,
};
