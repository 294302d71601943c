//! Error types for tunecraft.
//!
//! Defines all error codes and types used throughout the daemon for
//! consistent error handling and reporting. Nothing here is retried:
//! every failure is surfaced to the caller as-is.

use std::fmt;

/// Error codes returned by the daemon in error responses.
///
/// These codes are used in JSON-RPC error responses and allow clients
/// to programmatically handle specific error conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Model identifier matches no known model family.
    /// Trigger: identifier without a musicgen/magnet/audiogen/musiclang marker.
    UnknownModel,

    /// A generation parameter is missing or out of range.
    /// Trigger: missing duration, negative temperature, too many outputs.
    InvalidConfiguration,

    /// The model capability could not be loaded.
    /// Trigger: bridge unreachable, unsupported model, OOM during load.
    ModelLoadFailed,

    /// The model capability failed while generating, or outputs could not be persisted.
    /// Trigger: runtime error inside the model, GPU OOM, render failure.
    GenerationFailed,

    /// Audio-to-MIDI transcription failed.
    /// Trigger: transcriber command failed, MIDI write failure.
    TranscriptionFailed,

    /// Generation was cancelled cooperatively.
    /// Trigger: cancel request observed at a progress tick.
    Cancelled,

    /// Image captioning or prompt improvement failed.
    /// Trigger: missing API key, HTTP error, malformed JSON reply.
    CaptioningFailed,

    /// Reading or writing a temporary artifact failed.
    /// Trigger: artifact directory not writable, unreadable input file.
    ArtifactIoFailed,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UnknownModel => "UNKNOWN_MODEL",
            ErrorCode::InvalidConfiguration => "INVALID_CONFIGURATION",
            ErrorCode::ModelLoadFailed => "MODEL_LOAD_FAILED",
            ErrorCode::GenerationFailed => "GENERATION_FAILED",
            ErrorCode::TranscriptionFailed => "TRANSCRIPTION_FAILED",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::CaptioningFailed => "CAPTIONING_FAILED",
            ErrorCode::ArtifactIoFailed => "ARTIFACT_IO_FAILED",
        }
    }

    /// Returns a human-readable description of the error.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::UnknownModel => "Model identifier does not match any known model family",
            ErrorCode::InvalidConfiguration => "Generation parameters are missing or invalid",
            ErrorCode::ModelLoadFailed => "Failed to load the requested model",
            ErrorCode::GenerationFailed => "Model generation failed",
            ErrorCode::TranscriptionFailed => "Audio to MIDI transcription failed",
            ErrorCode::Cancelled => "Generation was interrupted",
            ErrorCode::CaptioningFailed => "Image captioning failed",
            ErrorCode::ArtifactIoFailed => "Failed to read or write a temporary artifact",
        }
    }

    /// Returns a recovery hint suggesting how to resolve this error.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            ErrorCode::UnknownModel => {
                "Use one of the identifiers returned by list_models \
                 (e.g. 'facebook/musicgen-small' or 'facebook/audiogen-medium')"
            }
            ErrorCode::InvalidConfiguration => {
                "Provide a positive 'duration' and non-negative 'temperature', 'top_k' \
                 and 'top_p'; melody models also need a melody waveform"
            }
            ErrorCode::ModelLoadFailed => {
                "Check that the inference bridge is running (TUNECRAFT_BRIDGE_URL) \
                 and has enough memory for the selected model"
            }
            ErrorCode::GenerationFailed => {
                "Try a shorter duration or fewer outputs; the request is not retried"
            }
            ErrorCode::TranscriptionFailed => {
                "Check that the basic-pitch command is installed (TUNECRAFT_BASIC_PITCH) \
                 and that the artifact directory is writable"
            }
            ErrorCode::Cancelled => "Submit the generation again",
            ErrorCode::CaptioningFailed => {
                "Check the captioning API key and endpoint, or type the prompt manually"
            }
            ErrorCode::ArtifactIoFailed => {
                "Verify that the artifact directory exists and has free disk space \
                 (TUNECRAFT_ARTIFACT_DIR)"
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for daemon operations.
#[derive(Debug)]
pub struct DaemonError {
    /// The error code identifying the type of error.
    pub code: ErrorCode,
    /// Human-readable error message with context.
    pub message: String,
    /// Optional underlying cause of the error.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DaemonError {
    /// Creates a new DaemonError with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new DaemonError with an underlying cause.
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an UNKNOWN_MODEL error.
    pub fn unknown_model(model_id: &str) -> Self {
        Self::new(
            ErrorCode::UnknownModel,
            format!("Unknown model: '{}'", model_id),
        )
    }

    /// Creates an INVALID_CONFIGURATION error.
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, reason)
    }

    /// Creates an INVALID_CONFIGURATION error for a missing parameter.
    pub fn missing_parameter(key: &str, model_id: &str) -> Self {
        Self::new(
            ErrorCode::InvalidConfiguration,
            format!("Missing required parameter '{}' for model '{}'", key, model_id),
        )
    }

    /// Creates a MODEL_LOAD_FAILED error.
    pub fn model_load_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ModelLoadFailed,
            format!("Failed to load model: {}", reason.into()),
        )
    }

    /// Creates a GENERATION_FAILED error carrying the model's original message.
    pub fn generation_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::GenerationFailed,
            format!("Error while generating: {}", reason.into()),
        )
    }

    /// Creates a TRANSCRIPTION_FAILED error.
    pub fn transcription_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::TranscriptionFailed,
            format!("Transcription failed: {}", reason.into()),
        )
    }

    /// Creates a CANCELLED error.
    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "Interrupted")
    }

    /// Creates a CAPTIONING_FAILED error.
    pub fn captioning_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::CaptioningFailed,
            format!("Captioning failed: {}", reason.into()),
        )
    }

    /// Creates an ARTIFACT_IO_FAILED error wrapping an I/O error.
    pub fn artifact_io(context: impl Into<String>, source: std::io::Error) -> Self {
        let context = context.into();
        Self::with_source(
            ErrorCode::ArtifactIoFailed,
            format!("{}: {}", context, source),
            source,
        )
    }
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}. Recovery: {}",
            self.code,
            self.message,
            self.code.recovery_hint()
        )
    }
}

impl std::error::Error for DaemonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Result type alias using DaemonError.
pub type Result<T> = std::result::Result<T, DaemonError>;
