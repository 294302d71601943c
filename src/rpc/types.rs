//! JSON-RPC types for the daemon protocol.
//!
//! Request parameters, results and notifications for every method, and the
//! mapping from [`ErrorCode`] to JSON-RPC error codes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::captioning::CaptionMode;
use crate::error::{DaemonError, ErrorCode};
use crate::models::{InferenceStrategy, ModelCategory};
use crate::types::{AudioArtifact, Difficulty, GenerationConfig, MidiArtifact};

/// JSON-RPC version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// Longest accepted text prompt, in characters.
pub const MAX_PROMPT_CHARS: usize = 1000;

/// A JSON-RPC request ID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RequestId {
    Integer(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Integer(id)
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        RequestId::String(id)
    }
}

/// A JSON-RPC request wrapper.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub id: RequestId,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// A JSON-RPC response wrapper.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse<T: Serialize> {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    pub result: T,
}

impl<T: Serialize> JsonRpcResponse<T> {
    pub fn new(id: RequestId, result: T) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result,
        }
    }
}

/// A JSON-RPC error response.
#[derive(Debug, Serialize)]
pub struct JsonRpcErrorResponse {
    pub jsonrpc: &'static str,
    pub id: Option<RequestId>,
    pub error: JsonRpcError,
}

impl JsonRpcErrorResponse {
    pub fn new(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            error,
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonRpcErrorData>,
}

/// Extended error data for application-specific errors.
#[derive(Debug, Serialize)]
pub struct JsonRpcErrorData {
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// JSON-RPC code for an application error.
pub fn rpc_code(code: ErrorCode) -> i32 {
    match code {
        ErrorCode::UnknownModel => -32000,
        ErrorCode::InvalidConfiguration => -32001,
        ErrorCode::ModelLoadFailed => -32002,
        ErrorCode::GenerationFailed => -32003,
        ErrorCode::TranscriptionFailed => -32004,
        ErrorCode::Cancelled => -32005,
        ErrorCode::CaptioningFailed => -32006,
        ErrorCode::ArtifactIoFailed => -32007,
    }
}

impl JsonRpcError {
    /// Creates a parse error (-32700).
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: message.into(),
            data: None,
        }
    }

    /// Creates an invalid request error (-32600).
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
            data: None,
        }
    }

    /// Creates a method not found error (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {}", method),
            data: None,
        }
    }

    /// Creates an invalid params error (-32602).
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
            data: None,
        }
    }

    /// Creates an internal error (-32603).
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            code: -32603,
            message: message.into(),
            data: None,
        }
    }
}

impl From<DaemonError> for JsonRpcError {
    fn from(e: DaemonError) -> Self {
        Self {
            code: rpc_code(e.code),
            message: e.message,
            data: Some(JsonRpcErrorData {
                error_code: e.code.as_str().to_string(),
                details: Some(e.code.recovery_hint().to_string()),
            }),
        }
    }
}

// ============================================================================
// generate
// ============================================================================

/// Practice prompt request, used instead of a free-text prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct PracticeParams {
    #[serde(default)]
    pub difficulty: Difficulty,
    pub style: String,
}

/// Parameters for a generate request.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateParams {
    /// Model identifier; the configured default when absent.
    #[serde(default)]
    pub model: Option<String>,

    /// Text prompt shared by every output.
    #[serde(default)]
    pub prompt: Option<String>,

    /// Independent prompts, one output each. Excludes `prompt` and `count`.
    #[serde(default)]
    pub prompts: Option<Vec<String>>,

    /// Build a practice prompt instead of `prompt`.
    #[serde(default)]
    pub practice: Option<PracticeParams>,

    /// WAV file used for melody conditioning or continuation.
    #[serde(default)]
    pub melody_path: Option<PathBuf>,

    /// Number of outputs for a shared prompt.
    #[serde(default = "default_count")]
    pub count: usize,

    /// Generation parameters passed through to the model.
    #[serde(default)]
    pub params: GenerationConfig,

    /// Render a waveform SVG per output; the configured default when absent.
    #[serde(default)]
    pub render: Option<bool>,
}

fn default_count() -> usize {
    1
}

impl GenerateParams {
    /// Validates the request shape. Model-specific checks happen in the dispatcher.
    pub fn validate(&self) -> Result<(), JsonRpcError> {
        let sources = [
            self.prompt.is_some(),
            self.prompts.is_some(),
            self.practice.is_some(),
        ]
        .iter()
        .filter(|given| **given)
        .count();
        if sources > 1 {
            return Err(JsonRpcError::invalid_params(
                "Use only one of 'prompt', 'prompts' and 'practice'",
            ));
        }

        if let Some(ref prompts) = self.prompts {
            if prompts.is_empty() {
                return Err(JsonRpcError::invalid_params("'prompts' must not be empty"));
            }
            if self.count != 1 && self.count != prompts.len() {
                return Err(JsonRpcError::invalid_params(
                    "'count' cannot be combined with 'prompts'",
                ));
            }
        }

        let texts = self
            .prompt
            .iter()
            .chain(self.prompts.iter().flatten());
        for text in texts {
            if text.chars().count() > MAX_PROMPT_CHARS {
                return Err(JsonRpcError::invalid_params(format!(
                    "Prompt too long: {} characters (max {})",
                    text.chars().count(),
                    MAX_PROMPT_CHARS
                )));
            }
        }

        Ok(())
    }
}

/// One generated file as reported to the client.
#[derive(Debug, Clone, Serialize)]
pub struct AudioFileInfo {
    pub path: String,
    pub label: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_sec: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization: Option<String>,
}

impl From<&AudioArtifact> for AudioFileInfo {
    fn from(artifact: &AudioArtifact) -> Self {
        Self {
            path: artifact.path.to_string_lossy().to_string(),
            label: artifact.label(),
            sample_rate: artifact.sample_rate,
            channels: artifact.channels,
            duration_sec: artifact.duration_sec,
            visualization: artifact
                .visualization
                .as_ref()
                .map(|p| p.to_string_lossy().to_string()),
        }
    }
}

/// Response for a generate request.
#[derive(Debug, Serialize)]
pub struct GenerateResult {
    pub generation_id: String,
    pub model_id: String,
    pub strategy: InferenceStrategy,
    pub sample_rate: u32,
    pub files: Vec<AudioFileInfo>,
    pub generation_time_sec: f32,
}

// ============================================================================
// transcribe / caption / improve_prompt / list_models / cancel
// ============================================================================

/// Parameters for a transcribe request.
#[derive(Debug, Deserialize)]
pub struct TranscribeParams {
    /// Audio files to transcribe, in order.
    pub paths: Vec<PathBuf>,
}

/// One transcribed file as reported to the client.
#[derive(Debug, Clone, Serialize)]
pub struct MidiFileInfo {
    pub path: String,
    pub source: String,
    pub label: String,
    pub note_count: usize,
}

impl From<&MidiArtifact> for MidiFileInfo {
    fn from(artifact: &MidiArtifact) -> Self {
        Self {
            path: artifact.path.to_string_lossy().to_string(),
            source: artifact.source.to_string_lossy().to_string(),
            label: artifact.label(),
            note_count: artifact.note_count,
        }
    }
}

/// Response for a transcribe request.
#[derive(Debug, Serialize)]
pub struct TranscribeResult {
    pub files: Vec<MidiFileInfo>,
}

/// Parameters for a caption request.
#[derive(Debug, Deserialize)]
pub struct CaptionParams {
    pub image_path: PathBuf,
    /// Picks the caption mode from the model's category when `mode` is absent.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub mode: Option<CaptionMode>,
}

/// Response for a caption request.
#[derive(Debug, Serialize)]
pub struct CaptionResult {
    pub mode: CaptionMode,
    pub description: String,
    pub prompt: String,
}

/// Parameters for an improve_prompt request.
#[derive(Debug, Deserialize)]
pub struct ImprovePromptParams {
    pub prompt: String,
}

/// One catalogue entry.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub category: ModelCategory,
    pub description: String,
    pub stereo: bool,
    /// False for models no backend can run.
    pub supported: bool,
}

/// Response for a list_models request.
#[derive(Debug, Serialize)]
pub struct ListModelsResult {
    pub models: Vec<ModelInfo>,
    pub default_model: String,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resident_model: Option<String>,
}

/// Response for a cancel request.
#[derive(Debug, Serialize)]
pub struct CancelResult {
    /// True when a generation was running and has been asked to stop.
    pub cancelled: bool,
}

// ============================================================================
// Notifications
// ============================================================================

/// A JSON-RPC notification (no id field).
#[derive(Debug, Serialize)]
pub struct JsonRpcNotification<T: Serialize> {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: T,
}

impl<T: Serialize> JsonRpcNotification<T> {
    pub fn new(method: &'static str, params: T) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
        }
    }
}

/// Progress notification sent every 5% during generation.
#[derive(Debug, Serialize)]
pub struct GenerationProgressParams {
    pub generation_id: String,

    /// Progress percentage (100 only on the final step).
    pub percent: u8,

    /// Steps generated so far.
    pub generated: usize,

    /// Total steps.
    pub total: usize,

    /// Estimated seconds remaining.
    pub eta_sec: f32,
}

/// Notification sent when generation finishes successfully.
#[derive(Debug, Serialize)]
pub struct GenerationCompleteParams {
    pub generation_id: String,
    pub model_id: String,
    pub files: Vec<AudioFileInfo>,
    pub generation_time_sec: f32,
}

/// Notification sent when generation fails or is cancelled.
#[derive(Debug, Serialize)]
pub struct GenerationErrorParams {
    pub generation_id: String,

    /// Error code, e.g. `CANCELLED`.
    pub code: String,

    /// Human-readable error message.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_from_int() {
        let id: RequestId = 42.into();
        assert_eq!(id, RequestId::Integer(42));
    }

    #[test]
    fn request_id_from_string() {
        let id: RequestId = "abc".to_string().into();
        assert_eq!(id, RequestId::String("abc".to_string()));
    }

    #[test]
    fn generate_params_defaults() {
        let params: GenerateParams = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(params.count, 1);
        assert!(params.params.is_empty());
        assert!(params.validate().is_ok());
    }

    #[test]
    fn generate_params_carry_model_params() {
        let params: GenerateParams = serde_json::from_value(serde_json::json!({
            "model": "facebook/musicgen-small",
            "prompt": "lofi",
            "count": 2,
            "params": { "duration": 8, "use_sampling": true }
        }))
        .unwrap();
        assert_eq!(params.params.duration(), Some(8.0));
        assert_eq!(params.params.flag("use_sampling"), Some(true));
    }

    #[test]
    fn generate_params_reject_mixed_prompts() {
        let params = GenerateParams {
            prompt: Some("a".to_string()),
            prompts: Some(vec!["b".to_string()]),
            count: 1,
            ..Default::default()
        };
        assert_eq!(params.validate().unwrap_err().code, -32602);
    }

    #[test]
    fn generate_params_reject_long_prompt() {
        let params = GenerateParams {
            prompt: Some("x".repeat(MAX_PROMPT_CHARS + 1)),
            count: 1,
            ..Default::default()
        };
        assert_eq!(params.validate().unwrap_err().code, -32602);
    }

    #[test]
    fn generate_params_reject_count_with_prompts() {
        let params = GenerateParams {
            prompts: Some(vec!["a".to_string(), "b".to_string()]),
            count: 3,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn json_rpc_error_codes() {
        assert_eq!(JsonRpcError::parse_error("").code, -32700);
        assert_eq!(JsonRpcError::invalid_request("").code, -32600);
        assert_eq!(JsonRpcError::method_not_found("").code, -32601);
        assert_eq!(JsonRpcError::invalid_params("").code, -32602);
        assert_eq!(JsonRpcError::internal_error("").code, -32603);
    }

    #[test]
    fn daemon_errors_map_to_application_codes() {
        let err: JsonRpcError = DaemonError::unknown_model("x").into();
        assert_eq!(err.code, -32000);
        assert_eq!(err.data.as_ref().unwrap().error_code, "UNKNOWN_MODEL");

        assert_eq!(rpc_code(ErrorCode::Cancelled), -32005);
        assert_eq!(rpc_code(ErrorCode::ArtifactIoFailed), -32007);
    }
}
