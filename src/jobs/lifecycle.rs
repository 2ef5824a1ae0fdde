//! Engine lifecycle jobs: initialize, video/audio reset and output start
//!
//! Every gated job checks the engine gate before anything is queued, so a closed
//! gate fails synchronously and never reaches the engine.

use std::sync::Arc;
use tracing::{info, warn};

use super::{JobHandle, JobKind, JobRunner};
use crate::capture::{
    parse_audio_mode_with, parse_video_resolution_with, EngineContext, OutputSession,
};
use crate::engine::EngineError;
use crate::error::ApiError;

/// Value a successful output start resolves with
pub const OUTPUT_STARTED: &str = "ok";

/// Start the engine and load its modules; resolves with `"v" + version`
///
/// Allowed while the gate is closed. If the engine is already up, resolves with
/// the running version without starting it again.
pub fn initialize(ctx: &Arc<EngineContext>, runner: &JobRunner) -> JobHandle<String> {
    let ctx = ctx.clone();

    runner.submit(
        JobKind::Initialize,
        move || {
            let engine = ctx.engine();

            if ctx.is_initialized() {
                info!("Engine already initialized");
                return Ok(engine.version());
            }

            let startup = ctx.startup_settings();
            info!("Starting engine (locale: {})", startup.locale);
            engine.startup(&startup.locale, startup.module_config_path.as_deref())?;
            if !engine.is_initialized() {
                return Err(EngineError::StartupFailed);
            }

            if let Err(e) = engine.load_all_modules() {
                warn!("Module loading failed, shutting engine back down: {}", e);
                engine.shutdown();
                return Err(e);
            }

            ctx.mark_initialized();
            let version = engine.version();
            info!("Engine initialized (version {})", version);
            Ok(version)
        },
        |version| format!("v{}", version),
        ApiError::EngineStartup,
    )
}

/// Apply a `"WIDTHxHEIGHT"` base resolution; resolves with the applied resolution
///
/// The engine refuses resets while an output is active; that refusal surfaces as
/// [`ApiError::VideoReset`].
pub fn reset_video(
    ctx: &Arc<EngineContext>,
    runner: &JobRunner,
    spec: &str,
) -> Result<JobHandle<String>, ApiError> {
    ctx.ensure_initialized()?;

    let ctx = ctx.clone();
    let spec = spec.to_string();

    Ok(runner.submit(
        JobKind::ResetVideo,
        move || {
            let video = parse_video_resolution_with(&spec, ctx.video_defaults());
            info!(
                "Resetting video: {} base, {}x{} output, {}/{} fps",
                video.resolution(),
                video.output_width,
                video.output_height,
                video.fps_num,
                video.fps_den
            );
            ctx.engine().reset_video(&video)?;
            Ok(video)
        },
        |video| video.resolution(),
        ApiError::VideoReset,
    ))
}

/// Apply an audio mode (`"mono"` anywhere selects mono); resolves with
/// `"mono"` or `"stereo"`
pub fn reset_audio(
    ctx: &Arc<EngineContext>,
    runner: &JobRunner,
    spec: &str,
) -> Result<JobHandle<String>, ApiError> {
    ctx.ensure_initialized()?;

    let ctx = ctx.clone();
    let spec = spec.to_string();

    Ok(runner.submit(
        JobKind::ResetAudio,
        move || {
            let audio = parse_audio_mode_with(&spec, ctx.audio_defaults());
            info!(
                "Resetting audio: {} Hz, {}",
                audio.samples_per_sec, audio.channel_layout
            );
            ctx.engine().reset_audio(&audio)?;
            Ok(audio)
        },
        |audio| audio.channel_layout.to_string(),
        ApiError::AudioReset,
    ))
}

/// Bring up encoders, output and service, start the output, then release it all
///
/// The session's resources are released exactly once before the handle settles,
/// on success and on every failure path alike.
pub fn start_output(
    ctx: &Arc<EngineContext>,
    runner: &JobRunner,
    hint: &str,
) -> Result<JobHandle<String>, ApiError> {
    ctx.ensure_initialized()?;

    let ctx = ctx.clone();
    let hint = hint.to_string();

    Ok(runner.submit(
        JobKind::StartOutput,
        move || {
            let settings = ctx.output_settings();
            let mut session =
                OutputSession::new(ctx.engine().clone(), settings.audio_track_index);

            info!(
                "Starting output {} ({} + {}, service {})",
                settings.output_id,
                settings.video_encoder_id,
                settings.audio_encoder_id,
                settings.service_id
            );
            let outcome = session.open(settings, &hint);
            if let Err(e) = &outcome {
                warn!("Output start failed: {}", e);
            }

            session.release();
            outcome
        },
        |()| OUTPUT_STARTED.to_string(),
        ApiError::OutputStart,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::{Engine, FaultPoint, SimulatedEngine, VideoResetFailure};

    fn context(engine: &Arc<SimulatedEngine>) -> Arc<EngineContext> {
        Arc::new(EngineContext::new(engine.clone(), &Config::default()))
    }

    async fn initialized() -> (Arc<SimulatedEngine>, Arc<EngineContext>, JobRunner) {
        let engine = Arc::new(SimulatedEngine::new());
        let ctx = context(&engine);
        let runner = JobRunner::current();
        initialize(&ctx, &runner).await.unwrap();
        (engine, ctx, runner)
    }

    #[tokio::test]
    async fn test_initialize_resolves_with_version() {
        let engine = Arc::new(SimulatedEngine::with_version("30.1.2"));
        let ctx = context(&engine);
        let runner = JobRunner::current();

        let version = initialize(&ctx, &runner).await.unwrap();
        assert_eq!(version, "v30.1.2");
        assert!(ctx.is_initialized());

        // Second initialize does not restart the engine
        let again = initialize(&ctx, &runner).await.unwrap();
        assert_eq!(again, "v30.1.2");
        assert_eq!(engine.calls().iter().filter(|c| **c == "startup").count(), 1);
    }

    #[tokio::test]
    async fn test_initialize_startup_failure_keeps_gate_closed() {
        let engine = Arc::new(SimulatedEngine::new());
        engine.inject(FaultPoint::Startup);
        let ctx = context(&engine);

        let err = initialize(&ctx, &JobRunner::current()).await.unwrap_err();
        assert!(matches!(err, ApiError::EngineStartup(EngineError::StartupFailed)));
        assert!(!ctx.is_initialized());
        assert!(!engine.calls().contains(&"load_all_modules"));
    }

    #[tokio::test]
    async fn test_initialize_module_failure_rolls_back() {
        let engine = Arc::new(SimulatedEngine::new());
        engine.inject(FaultPoint::ModuleLoad);
        let ctx = context(&engine);

        let err = initialize(&ctx, &JobRunner::current()).await.unwrap_err();
        assert!(matches!(err, ApiError::EngineStartup(EngineError::ModuleLoad(_))));
        assert!(!ctx.is_initialized());
        assert!(!engine.is_initialized());
    }

    #[tokio::test]
    async fn test_gated_jobs_fail_synchronously_without_engine_calls() {
        let engine = Arc::new(SimulatedEngine::new());
        let ctx = context(&engine);
        let runner = JobRunner::current();

        assert!(matches!(reset_video(&ctx, &runner, "800x600"), Err(ApiError::NotInitialized)));
        assert!(matches!(reset_audio(&ctx, &runner, "mono"), Err(ApiError::NotInitialized)));
        assert!(matches!(start_output(&ctx, &runner, "hint"), Err(ApiError::NotInitialized)));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_reset_video_applies_parsed_resolution() {
        let (engine, ctx, runner) = initialized().await;

        assert_eq!(reset_video(&ctx, &runner, "800x600").unwrap().await.unwrap(), "800x600");
        let applied = engine.video().unwrap();
        assert_eq!((applied.base_width, applied.base_height), (800, 600));

        assert_eq!(reset_video(&ctx, &runner, "x480").unwrap().await.unwrap(), "640x480");
    }

    #[tokio::test]
    async fn test_reset_video_surfaces_engine_rejection() {
        let (_engine, ctx, runner) = initialized().await;

        // Non-numeric width parses to 0, which the engine refuses
        let err = reset_video(&ctx, &runner, "widex720").unwrap().await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::VideoReset(EngineError::VideoReset(VideoResetFailure::InvalidParam))
        ));
    }

    #[tokio::test]
    async fn test_reset_rejected_while_output_active() {
        let (engine, ctx, runner) = initialized().await;
        let video = engine.create_video_encoder("x264", "v").unwrap();
        let audio = engine.create_audio_encoder("aac", "a", 0).unwrap();
        let output = engine.create_output("rtmp_output", "live").unwrap();
        engine.set_output_video_encoder(&output, &video).unwrap();
        engine.set_output_audio_encoder(&output, &audio, 0).unwrap();
        engine.start_output(&output).unwrap();

        let err = reset_video(&ctx, &runner, "1280x720").unwrap().await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::VideoReset(EngineError::VideoReset(VideoResetFailure::CurrentlyActive))
        ));
        let err = reset_audio(&ctx, &runner, "mono").unwrap().await.unwrap_err();
        assert!(matches!(err, ApiError::AudioReset(EngineError::AudioReset)));

        engine.stop_output(&output);
        engine.release_output(output);
        engine.release_encoder(video);
        engine.release_encoder(audio);
    }

    #[tokio::test]
    async fn test_reset_audio_reports_layout() {
        let (engine, ctx, runner) = initialized().await;

        assert_eq!(reset_audio(&ctx, &runner, "stereo-mode").unwrap().await.unwrap(), "stereo");
        assert_eq!(reset_audio(&ctx, &runner, "mono-mix").unwrap().await.unwrap(), "mono");
        assert_eq!(engine.audio().unwrap().samples_per_sec, 44100);
    }

    #[tokio::test]
    async fn test_start_output_success_releases_everything() {
        let (engine, ctx, runner) = initialized().await;

        let ack = start_output(&ctx, &runner, "twitch").unwrap().await.unwrap();
        assert_eq!(ack, OUTPUT_STARTED);
        assert_eq!(engine.live_resources(), 0);
        assert_eq!(engine.total_releases(), 4);
        assert_eq!(engine.double_releases(), 0);
        assert!(engine.calls().contains(&"stop_output"));
    }

    #[tokio::test]
    async fn test_start_output_failure_at_each_step_releases_everything() {
        for point in FaultPoint::SESSION_STEPS {
            let (engine, ctx, runner) = initialized().await;
            engine.inject(point);

            let err = start_output(&ctx, &runner, "twitch").unwrap().await.unwrap_err();
            assert!(matches!(err, ApiError::OutputStart(_)), "{:?}: {}", point, err);
            assert_eq!(engine.live_resources(), 0, "leak after {:?}", point);
            assert_eq!(engine.double_releases(), 0, "double release after {:?}", point);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_resets_do_not_mix_inputs() {
        let (_engine, ctx, runner) = initialized().await;

        let video = reset_video(&ctx, &runner, "1920x1080").unwrap();
        let audio = reset_audio(&ctx, &runner, "mono").unwrap();
        let (video, audio) = tokio::join!(video, audio);

        assert_eq!(video.unwrap(), "1920x1080");
        assert_eq!(audio.unwrap(), "mono");
    }
}
