//! Named entry points and the line protocol the host binary speaks
//!
//! Hosts call entry points by name with loosely typed JSON arguments. Shape
//! checks happen here, synchronously, before any job exists.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::ObsApi;
use crate::error::{ApiError, EXPECTED_SINGLE_STRING};
use crate::jobs::JobHandle;

/// Entry points exported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    Initialize,
    Shutdown,
    ResetVideo,
    ResetAudio,
    StartOutput,
    GetCodecs,
    GetOutputs,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 7] = [
        EntryPoint::Initialize,
        EntryPoint::Shutdown,
        EntryPoint::ResetVideo,
        EntryPoint::ResetAudio,
        EntryPoint::StartOutput,
        EntryPoint::GetCodecs,
        EntryPoint::GetOutputs,
    ];

    /// Name the host uses to call this entry point
    pub fn name(&self) -> &'static str {
        match self {
            EntryPoint::Initialize => "initialize",
            EntryPoint::Shutdown => "shutdown",
            EntryPoint::ResetVideo => "resetVideo",
            EntryPoint::ResetAudio => "resetAudio",
            EntryPoint::StartOutput => "startOutput",
            EntryPoint::GetCodecs => "getCodecs",
            EntryPoint::GetOutputs => "getOutputs",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|entry| entry.name() == name)
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What an entry point hands back: a value now, or a job to await
#[derive(Debug)]
pub enum HostReply {
    Ready(String),
    Pending(JobHandle<String>),
}

impl HostReply {
    /// Wait for the final value
    pub async fn settle(self) -> Result<String, ApiError> {
        match self {
            HostReply::Ready(value) => Ok(value),
            HostReply::Pending(job) => job.await,
        }
    }
}

/// Call the entry point `name` with host-supplied arguments
///
/// Single-string entry points check the engine gate first and the argument shape
/// second. The other entry points ignore their arguments.
pub fn invoke(api: &ObsApi, name: &str, args: &[Value]) -> Result<HostReply, ApiError> {
    let entry =
        EntryPoint::from_name(name).ok_or_else(|| ApiError::UnknownEntryPoint(name.to_string()))?;

    let reply = match entry {
        EntryPoint::Initialize => HostReply::Pending(api.initialize()),
        EntryPoint::Shutdown => HostReply::Ready(api.shutdown()),
        EntryPoint::GetCodecs => HostReply::Ready(api.get_codecs()),
        EntryPoint::GetOutputs => HostReply::Ready(api.get_outputs()),
        EntryPoint::ResetVideo => {
            api.context().ensure_initialized()?;
            HostReply::Pending(api.reset_video(single_string(args)?)?)
        }
        EntryPoint::ResetAudio => {
            api.context().ensure_initialized()?;
            HostReply::Pending(api.reset_audio(single_string(args)?)?)
        }
        EntryPoint::StartOutput => {
            api.context().ensure_initialized()?;
            HostReply::Pending(api.start_output(single_string(args)?)?)
        }
    };

    Ok(reply)
}

fn single_string(args: &[Value]) -> Result<&str, ApiError> {
    match args {
        [Value::String(value)] => Ok(value.as_str()),
        _ => Err(ApiError::ArgumentShape(EXPECTED_SINGLE_STRING.to_string())),
    }
}

/// One line of host input
#[derive(Debug, Clone, Deserialize)]
pub struct HostRequest {
    /// Echoed back in the response so replies can arrive out of order
    pub id: Value,
    pub call: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// One line of host output
#[derive(Debug, Clone, Serialize)]
pub struct HostResponse {
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HostResponse {
    pub fn from_outcome(id: Value, outcome: Result<String, ApiError>) -> Self {
        match outcome {
            Ok(result) => Self {
                id,
                result: Some(result),
                error: None,
            },
            Err(e) => Self {
                id,
                result: None,
                error: Some(e.to_string()),
            },
        }
    }
}
