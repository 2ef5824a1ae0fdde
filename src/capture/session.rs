//! Output session: the four engine resources needed to push one stream
//!
//! [`OutputSession`] owns the handles it acquires and gives every one of them
//! back exactly once, in reverse acquisition order, whether bring-up succeeded,
//! failed halfway or panicked.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::OutputConfig;
use crate::engine::{EncoderHandle, Engine, EngineError, OutputHandle, ServiceHandle};

const VIDEO_ENCODER_NAME: &str = "stream_video_encoder";
const AUDIO_ENCODER_NAME: &str = "stream_audio_encoder";
const OUTPUT_NAME: &str = "stream_output";
const DEFAULT_SERVICE_NAME: &str = "stream_service";

/// Name given to the streaming service created for `hint`
///
/// The hint only names the service; it carries no endpoint or stream key, so the
/// service is created with empty settings.
pub fn service_name(hint: &str) -> String {
    let hint = hint.trim();
    if hint.is_empty() {
        DEFAULT_SERVICE_NAME.to_string()
    } else {
        hint.to_string()
    }
}

/// Resources of one output attempt, owned exclusively by the job running it
pub struct OutputSession {
    engine: Arc<dyn Engine>,
    video_encoder: Option<EncoderHandle>,
    audio_encoder: Option<EncoderHandle>,
    output: Option<OutputHandle>,
    service: Option<ServiceHandle>,
    audio_track: usize,
    started: bool,
}

impl OutputSession {
    pub fn new(engine: Arc<dyn Engine>, audio_track: usize) -> Self {
        Self {
            engine,
            video_encoder: None,
            audio_encoder: None,
            output: None,
            service: None,
            audio_track,
            started: false,
        }
    }

    /// Acquire, wire up and start everything. Stops at the first failing step,
    /// leaving whatever was acquired for [`OutputSession::release`].
    pub fn open(&mut self, settings: &OutputConfig, hint: &str) -> Result<(), EngineError> {
        let engine = self.engine.clone();

        let video_encoder = self.video_encoder.insert(
            engine.create_video_encoder(&settings.video_encoder_id, VIDEO_ENCODER_NAME)?,
        );
        let audio_encoder = self.audio_encoder.insert(engine.create_audio_encoder(
            &settings.audio_encoder_id,
            AUDIO_ENCODER_NAME,
            self.audio_track,
        )?);

        engine.bind_video(video_encoder)?;
        engine.bind_audio(audio_encoder)?;

        let output = self
            .output
            .insert(engine.create_output(&settings.output_id, OUTPUT_NAME)?);
        engine.set_output_video_encoder(output, video_encoder)?;
        engine.set_output_audio_encoder(output, audio_encoder, self.audio_track)?;

        let service = self
            .service
            .insert(engine.create_service(&settings.service_id, &service_name(hint))?);
        engine.set_output_service(output, service)?;

        engine.start_output(output)?;
        self.started = true;
        info!("Output '{}' started", OUTPUT_NAME);

        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Whether any resource is still held
    pub fn holds_resources(&self) -> bool {
        self.video_encoder.is_some()
            || self.audio_encoder.is_some()
            || self.output.is_some()
            || self.service.is_some()
    }

    /// Stop the output if it was started and release every held handle.
    /// Safe to call more than once; later calls find nothing to release.
    pub fn release(&mut self) {
        if let Some(output) = self.output.as_ref() {
            if self.started {
                debug!("Stopping output");
                self.engine.stop_output(output);
            }
        }
        self.started = false;

        if let Some(service) = self.service.take() {
            debug!("Releasing service");
            self.engine.release_service(service);
        }
        if let Some(output) = self.output.take() {
            debug!("Releasing output");
            self.engine.release_output(output);
        }
        if let Some(encoder) = self.audio_encoder.take() {
            debug!("Releasing audio encoder");
            self.engine.release_encoder(encoder);
        }
        if let Some(encoder) = self.video_encoder.take() {
            debug!("Releasing video encoder");
            self.engine.release_encoder(encoder);
        }
    }
}

impl Drop for OutputSession {
    fn drop(&mut self) {
        if self.holds_resources() {
            warn!("Output session dropped while holding resources, releasing");
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{FaultPoint, ResourceKind, SimulatedEngine};

    fn started_engine() -> Arc<SimulatedEngine> {
        let engine = Arc::new(SimulatedEngine::new());
        engine.startup("en-US", None).unwrap();
        engine.load_all_modules().unwrap();
        engine
    }

    #[test]
    fn test_open_and_release_success() {
        let engine = started_engine();
        let mut session = OutputSession::new(engine.clone(), 0);

        session.open(&OutputConfig::default(), "twitch").unwrap();
        assert!(session.is_started());
        assert!(engine.any_output_active());
        assert_eq!(engine.live_resources(), 4);

        session.release();
        assert!(!session.holds_resources());
        assert!(!engine.any_output_active());
        assert_eq!(engine.live_resources(), 0);
        assert_eq!(engine.total_releases(), 4);

        // Second release is a no-op
        session.release();
        assert_eq!(engine.total_releases(), 4);
        assert_eq!(engine.double_releases(), 0);
    }

    #[test]
    fn test_release_order_is_reverse_acquisition() {
        let engine = started_engine();
        let mut session = OutputSession::new(engine.clone(), 0);
        session.open(&OutputConfig::default(), "").unwrap();
        session.release();

        let calls = engine.calls();
        let tail = &calls[calls.len() - 5..];
        assert_eq!(
            tail,
            [
                "stop_output",
                "release_service",
                "release_output",
                "release_encoder",
                "release_encoder"
            ]
        );
    }

    #[test]
    fn test_every_failed_step_releases_everything_once() {
        for point in FaultPoint::SESSION_STEPS {
            let engine = started_engine();
            engine.inject(point);

            let mut session = OutputSession::new(engine.clone(), 0);
            assert!(session.open(&OutputConfig::default(), "hint").is_err(), "{:?}", point);
            assert!(!session.is_started());
            session.release();

            assert_eq!(engine.live_resources(), 0, "leak after {:?}", point);
            assert_eq!(engine.double_releases(), 0, "double release after {:?}", point);
            assert!(!engine.any_output_active());
            assert!(!engine.calls().contains(&"stop_output"), "{:?}", point);
        }
    }

    #[test]
    fn test_drop_releases_held_resources() {
        let engine = started_engine();
        engine.inject(FaultPoint::CreateOutput);
        {
            let mut session = OutputSession::new(engine.clone(), 0);
            assert!(session.open(&OutputConfig::default(), "").is_err());
            assert_eq!(engine.live_of_kind(ResourceKind::VideoEncoder), 1);
        }
        assert_eq!(engine.live_resources(), 0);
    }

    #[test]
    fn test_service_name_from_hint() {
        assert_eq!(service_name("  twitch "), "twitch");
        assert_eq!(service_name(""), DEFAULT_SERVICE_NAME);
    }
}
