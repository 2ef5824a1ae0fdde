//! Errors surfaced to the host

use thiserror::Error;

use crate::engine::EngineError;

/// Returned in place of a result by the soft-failing entry points
/// (`shutdown`, `getCodecs`, `getOutputs`) while the engine is down
pub const NOT_INITIALIZED: &str = "Error: OBS API not initialized!";

/// Message of [`ApiError::ArgumentShape`] for the single-string entry points
pub const EXPECTED_SINGLE_STRING: &str = "Expected a single string argument";

#[derive(Debug, Error)]
pub enum ApiError {
    /// A gated operation was called before a successful initialize
    #[error("Error: OBS API not initialized!")]
    NotInitialized,

    /// The host passed the wrong number or type of arguments
    #[error("{0}")]
    ArgumentShape(String),

    #[error("Unknown entry point: {0}")]
    UnknownEntryPoint(String),

    #[error("Failed to start OBS: {0}")]
    EngineStartup(#[source] EngineError),

    #[error("Failed to reset video: {0}")]
    VideoReset(#[source] EngineError),

    #[error("Failed to reset audio: {0}")]
    AudioReset(#[source] EngineError),

    #[error("Failed to start output: {0}")]
    OutputStart(#[source] EngineError),
}

impl ApiError {
    /// Underlying engine failure, for errors delivered through a job
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            ApiError::EngineStartup(e)
            | ApiError::VideoReset(e)
            | ApiError::AudioReset(e)
            | ApiError::OutputStart(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_initialized_message_matches_sentinel() {
        assert_eq!(ApiError::NotInitialized.to_string(), NOT_INITIALIZED);
    }

    #[test]
    fn test_job_errors_carry_cause() {
        let err = ApiError::OutputStart(EngineError::OutputStart("refused".to_string()));
        assert_eq!(
            err.to_string(),
            "Failed to start output: output failed to start: refused"
        );
        assert!(err.engine_error().is_some());
        assert!(ApiError::NotInitialized.engine_error().is_none());
    }
}
