//! Video and audio settings for the engine, plus the compact text forms the host
//! sends for them (`"1280x720"`, `"mono"`).
//!
//! Parsing never fails: malformed input degrades to the configured defaults
//! rather than producing an error.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_VIDEO_ADAPTER: u32 = 0;
pub const DEFAULT_GRAPHICS_MODULE: &str = "libobs-opengl";
pub const DEFAULT_VIDEO_FPS_NUM: u32 = 30000;
pub const DEFAULT_VIDEO_FPS_DEN: u32 = 1000;
pub const DEFAULT_VIDEO_WIDTH: u32 = 640;
pub const DEFAULT_VIDEO_HEIGHT: u32 = 360;

pub const DEFAULT_AUDIO_SAMPLES: u32 = 44100;

/// Token that selects mono audio when present anywhere in the audio mode text
const MONO_TOKEN: &str = "mono";

/// Pixel format of the engine's video output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[default]
    I420,
    Nv12,
    I444,
    Bgra,
}

/// Base video settings applied with a video reset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Graphics adapter index
    pub adapter: u32,
    /// Graphics module to load (cannot change without destroying the engine context)
    pub graphics_module: String,
    pub pixel_format: PixelFormat,
    pub fps_num: u32,
    pub fps_den: u32,
    pub base_width: u32,
    pub base_height: u32,
    pub output_width: u32,
    pub output_height: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            adapter: DEFAULT_VIDEO_ADAPTER,
            graphics_module: DEFAULT_GRAPHICS_MODULE.to_string(),
            pixel_format: PixelFormat::I420,
            fps_num: DEFAULT_VIDEO_FPS_NUM,
            fps_den: DEFAULT_VIDEO_FPS_DEN,
            base_width: DEFAULT_VIDEO_WIDTH,
            base_height: DEFAULT_VIDEO_HEIGHT,
            output_width: DEFAULT_VIDEO_WIDTH,
            output_height: DEFAULT_VIDEO_HEIGHT,
        }
    }
}

impl VideoConfig {
    /// Base resolution formatted as `"{width}x{height}"`
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.base_width, self.base_height)
    }
}

/// Speaker layout for the engine's audio mix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayout {
    Mono,
    #[default]
    Stereo,
}

impl ChannelLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelLayout::Mono => "mono",
            ChannelLayout::Stereo => "stereo",
        }
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base audio settings applied with an audio reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub samples_per_sec: u32,
    pub channel_layout: ChannelLayout,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            samples_per_sec: DEFAULT_AUDIO_SAMPLES,
            channel_layout: ChannelLayout::Stereo,
        }
    }
}

/// Parse a `"WIDTHxHEIGHT"` string against the built-in defaults
pub fn parse_video_resolution(text: &str) -> VideoConfig {
    parse_video_resolution_with(text, &VideoConfig::default())
}

/// Parse a `"WIDTHxHEIGHT"` string, taking everything it does not specify from `defaults`
///
/// Splits on the first `x`. Without a separator both dimensions keep their defaults,
/// and an empty side keeps its own default. A non-empty side is read the way C's
/// `atoi` reads it, so `"abc"` yields 0. Only the base resolution is replaced; the
/// output resolution stays as configured.
pub fn parse_video_resolution_with(text: &str, defaults: &VideoConfig) -> VideoConfig {
    let mut video = defaults.clone();

    if let Some((width, height)) = text.split_once('x') {
        if !width.is_empty() {
            video.base_width = parse_dimension(width);
        }
        if !height.is_empty() {
            video.base_height = parse_dimension(height);
        }
    }

    video
}

/// Parse an audio mode string against the built-in defaults
pub fn parse_audio_mode(text: &str) -> AudioConfig {
    parse_audio_mode_with(text, &AudioConfig::default())
}

/// Parse an audio mode string: `"mono"` anywhere (case-sensitive) selects mono,
/// anything else selects stereo
pub fn parse_audio_mode_with(text: &str, defaults: &AudioConfig) -> AudioConfig {
    let channel_layout = if text.contains(MONO_TOKEN) {
        ChannelLayout::Mono
    } else {
        ChannelLayout::Stereo
    };

    AudioConfig {
        channel_layout,
        ..*defaults
    }
}

/// `atoi`-style read of a dimension: leading whitespace, an optional sign, then as
/// many digits as follow. Negative values clamp to 0 and overflow saturates.
fn parse_dimension(text: &str) -> u32 {
    let trimmed = text.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == '\x0b');

    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let value = digits
        .bytes()
        .take_while(|b| b.is_ascii_digit())
        .fold(0u32, |acc, digit| {
            acc.saturating_mul(10).saturating_add(u32::from(digit - b'0'))
        });

    if negative {
        0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_resolution() {
        let video = parse_video_resolution("1280x720");
        assert_eq!((video.base_width, video.base_height), (1280, 720));
        assert_eq!(video.resolution(), "1280x720");
    }

    #[test]
    fn test_parse_missing_sides_use_defaults() {
        let video = parse_video_resolution("x720");
        assert_eq!((video.base_width, video.base_height), (640, 720));

        let video = parse_video_resolution("1920x");
        assert_eq!((video.base_width, video.base_height), (1920, 360));

        let video = parse_video_resolution("");
        assert_eq!((video.base_width, video.base_height), (640, 360));

        let video = parse_video_resolution("1280 720");
        assert_eq!(video, VideoConfig::default());
    }

    #[test]
    fn test_parse_non_numeric_side_is_zero() {
        let video = parse_video_resolution("widexhigh");
        assert_eq!((video.base_width, video.base_height), (0, 0));

        let video = parse_video_resolution("abc12x720");
        assert_eq!((video.base_width, video.base_height), (0, 720));
    }

    #[test]
    fn test_parse_reads_leading_digits_like_atoi() {
        let video = parse_video_resolution(" 800px600p");
        assert_eq!((video.base_width, video.base_height), (800, 600));

        // Only the first separator splits
        let video = parse_video_resolution("1280x720x60");
        assert_eq!((video.base_width, video.base_height), (1280, 720));

        let video = parse_video_resolution("+1024x-768");
        assert_eq!((video.base_width, video.base_height), (1024, 0));

        let video = parse_video_resolution("99999999999x1");
        assert_eq!(video.base_width, u32::MAX);
    }

    #[test]
    fn test_parse_keeps_output_and_other_defaults() {
        let defaults = VideoConfig {
            fps_num: 60,
            fps_den: 1,
            output_width: 1280,
            output_height: 720,
            ..VideoConfig::default()
        };

        let video = parse_video_resolution_with("1920x1080", &defaults);
        assert_eq!((video.base_width, video.base_height), (1920, 1080));
        assert_eq!((video.output_width, video.output_height), (1280, 720));
        assert_eq!((video.fps_num, video.fps_den), (60, 1));
        assert_eq!(video.graphics_module, DEFAULT_GRAPHICS_MODULE);
    }

    #[test]
    fn test_parse_audio_mode() {
        assert_eq!(parse_audio_mode("mono-mix").channel_layout, ChannelLayout::Mono);
        assert_eq!(parse_audio_mode("default").channel_layout, ChannelLayout::Stereo);
        assert_eq!(parse_audio_mode("").channel_layout, ChannelLayout::Stereo);
        assert_eq!(parse_audio_mode("MONO").channel_layout, ChannelLayout::Stereo);
        assert_eq!(parse_audio_mode("stereo-mode").channel_layout, ChannelLayout::Stereo);
        assert_eq!(parse_audio_mode("mono").samples_per_sec, DEFAULT_AUDIO_SAMPLES);
    }

    #[test]
    fn test_parse_audio_mode_keeps_sample_rate() {
        let defaults = AudioConfig {
            samples_per_sec: 48000,
            channel_layout: ChannelLayout::Stereo,
        };
        let audio = parse_audio_mode_with("mono", &defaults);
        assert_eq!(audio.samples_per_sec, 48000);
        assert_eq!(audio.channel_layout, ChannelLayout::Mono);
    }

    #[test]
    fn test_parsing_is_deterministic() {
        for input in ["", "x", "1x1", "abc", "mono", "\u{1F600}x\u{1F600}", "12x34x56"] {
            assert_eq!(parse_video_resolution(input), parse_video_resolution(input));
            assert_eq!(parse_audio_mode(input), parse_audio_mode(input));
        }
    }
}
