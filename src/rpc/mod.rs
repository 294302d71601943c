//! JSON-RPC module for daemon communication.
//!
//! Provides the JSON-RPC 2.0 server implementation for:
//! - `generate`: Generate audio files for a model and prompt
//! - `transcribe`: Convert audio files to MIDI
//! - `caption`: Turn an image into a prompt
//! - `improve_prompt`: Rewrite a prompt
//! - `list_models`: Known model identifiers
//! - `cancel`: Interrupt the running generation
//! - `ping`: Health check
//! - `shutdown`: Graceful shutdown
//!
//! Notifications:
//! - `generation_progress`: Progress updates during generation
//! - `generation_complete`: Successful completion
//! - `generation_error`: Generation failure or cancellation

pub mod methods;
pub mod server;
pub mod types;

// Re-export commonly used types
pub use methods::{handle_request, ProgressThrottle};
pub use server::{run_server, send_notification, CancelHandle, NotificationSink, ServerState};
pub use types::{
    rpc_code, GenerateParams, GenerateResult, GenerationCompleteParams, GenerationErrorParams,
    GenerationProgressParams, JsonRpcError, JsonRpcErrorResponse, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, RequestId,
};
