//! JSON-RPC server over stdin/stdout.
//!
//! Implements the JSON-RPC 2.0 protocol for daemon communication. Requests
//! are handled one at a time on the main thread. A reader thread owns
//! stdin so that `cancel` can be answered, and the running generation
//! interrupted, while the main thread is busy.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use tracing::{debug, info, warn};

use crate::cache::ArtifactStore;
use crate::captioning::{Captioner, HostedCaptioner};
use crate::config::DaemonConfig;
use crate::error::Result;
use crate::generation::{CancellationToken, GenerationDispatcher};
use crate::models::{ModelCache, ModelLoader, ModelRegistry};
use crate::transcription::{BasicPitchCommand, Transcriber, TranscriptionAdapter};

use super::methods::{handle_cancel, handle_request};
use super::types::{JsonRpcError, JsonRpcErrorResponse, JsonRpcNotification, JsonRpcRequest};

/// Destination for serialized notifications.
pub type NotificationSink = Arc<dyn Fn(String) + Send + Sync>;

/// Interrupts the running generation from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
    busy: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Requests cancellation. Returns false when nothing is running.
    pub fn cancel(&self) -> bool {
        if self.busy.load(Ordering::SeqCst) {
            self.token.cancel();
            true
        } else {
            false
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Marks a generation as running for the guard's lifetime.
    pub(crate) fn begin(&self) -> BusyGuard<'_> {
        self.token.reset();
        self.busy.store(true, Ordering::SeqCst);
        BusyGuard { handle: self }
    }
}

pub(crate) struct BusyGuard<'a> {
    handle: &'a CancelHandle,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.handle.busy.store(false, Ordering::SeqCst);
        self.handle.token.reset();
    }
}

/// State shared across all request handlers.
pub struct ServerState {
    /// Daemon configuration.
    pub config: DaemonConfig,
    dispatcher: GenerationDispatcher,
    transcription: TranscriptionAdapter,
    captioner: Option<Arc<dyn Captioner>>,
    cancel: CancelHandle,
    notify: NotificationSink,
    next_generation: AtomicU64,
    /// Flag to signal server shutdown.
    shutdown: Arc<AtomicBool>,
}

impl ServerState {
    /// Creates server state with the configured backend, `basic-pitch`
    /// transcription and a hosted captioner built on first use.
    pub fn new(config: DaemonConfig) -> Result<Self> {
        let loader = config
            .backend
            .loader(&config.bridge_url, config.bridge_timeout())?;
        let transcriber = Arc::new(BasicPitchCommand::new(config.transcriber_command.clone()));
        Ok(Self::with_parts(config, loader, transcriber))
    }

    /// Creates server state from explicit collaborators.
    pub fn with_parts(
        config: DaemonConfig,
        loader: Arc<dyn ModelLoader>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        let store = Arc::new(ArtifactStore::new(
            config.effective_artifact_dir(),
            config.artifact_lifetime(),
        ));
        let dispatcher = GenerationDispatcher::new(
            ModelRegistry::new(),
            ModelCache::new(loader),
            Arc::clone(&store),
            config.dispatcher_options(),
        );
        let transcription = TranscriptionAdapter::new(transcriber, store);

        Self {
            config,
            dispatcher,
            transcription,
            captioner: None,
            cancel: CancelHandle::default(),
            notify: Arc::new(write_line),
            next_generation: AtomicU64::new(1),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Uses `captioner` instead of the hosted one.
    pub fn with_captioner(mut self, captioner: Arc<dyn Captioner>) -> Self {
        self.captioner = Some(captioner);
        self
    }

    /// Redirects notifications, e.g. to a collector in tests.
    pub fn with_notification_sink(mut self, sink: NotificationSink) -> Self {
        self.notify = sink;
        self
    }

    pub fn dispatcher(&self) -> &GenerationDispatcher {
        &self.dispatcher
    }

    pub fn transcription(&self) -> &TranscriptionAdapter {
        &self.transcription
    }

    /// Returns the captioner, building the hosted one on first use.
    pub fn captioner(&mut self) -> Result<Arc<dyn Captioner>> {
        if let Some(ref captioner) = self.captioner {
            return Ok(Arc::clone(captioner));
        }
        let captioner: Arc<dyn Captioner> =
            Arc::new(HostedCaptioner::from_config(&self.config.captioning)?);
        self.captioner = Some(Arc::clone(&captioner));
        Ok(captioner)
    }

    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.cancel
    }

    /// Allocates an identifier for the next generation.
    pub fn next_generation_id(&self) -> String {
        format!("gen-{}", self.next_generation.fetch_add(1, Ordering::SeqCst))
    }

    /// Sends a notification through the configured sink.
    pub fn notify<T: serde::Serialize>(&self, method: &'static str, params: T) {
        let notification = JsonRpcNotification::new(method, params);
        if let Ok(json) = serde_json::to_string(&notification) {
            (self.notify)(json);
        }
    }

    /// Signals the server to shut down.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Returns true if shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// Runs the JSON-RPC server, reading from stdin and writing to stdout.
pub fn run_server(mut state: ServerState) -> Result<()> {
    let (sender, receiver) = mpsc::channel::<String>();
    let cancel = state.cancel_handle().clone();

    thread::Builder::new()
        .name("rpc-reader".to_string())
        .spawn(move || read_requests(io::stdin().lock(), sender, cancel))
        .map_err(|e| crate::error::DaemonError::artifact_io("Failed to start reader thread", e))?;

    info!("JSON-RPC server started, waiting for requests");

    for line in receiver {
        if let Some(response) = process_request(&line, &mut state) {
            write_line(response);
        }

        if state.is_shutdown() {
            info!("Server shutdown requested");
            break;
        }
    }

    info!("JSON-RPC server stopped");
    Ok(())
}

/// Reads request lines, answering `cancel` in place and forwarding the rest.
fn read_requests(reader: impl BufRead, sender: mpsc::Sender<String>, cancel: CancelHandle) {
    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, "Error reading stdin");
                break;
            }
        };

        // Skip empty lines
        if line.trim().is_empty() {
            continue;
        }

        if let Some(response) = intercept_cancel(&line, &cancel) {
            write_line(response);
            continue;
        }

        if sender.send(line).is_err() {
            break;
        }
    }
    debug!("stdin closed");
}

/// Answers a `cancel` request without waiting for the main thread.
fn intercept_cancel(line: &str, cancel: &CancelHandle) -> Option<String> {
    let request: JsonRpcRequest = serde_json::from_str(line).ok()?;
    if request.method != "cancel" || request.jsonrpc != "2.0" {
        return None;
    }
    Some(response_line(request.id, handle_cancel(cancel)))
}

/// Processes a single JSON-RPC request line.
pub(crate) fn process_request(line: &str, state: &mut ServerState) -> Option<String> {
    // Parse JSON
    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            let error = JsonRpcErrorResponse::new(
                None,
                JsonRpcError::parse_error(format!("Invalid JSON: {}", e)),
            );
            return Some(serde_json::to_string(&error).unwrap_or_default());
        }
    };

    // Validate JSON-RPC version
    if request.jsonrpc != "2.0" {
        let error = JsonRpcErrorResponse::new(
            Some(request.id),
            JsonRpcError::invalid_request("Invalid JSON-RPC version (expected 2.0)"),
        );
        return Some(serde_json::to_string(&error).unwrap_or_default());
    }

    debug!(method = %request.method, "Handling request");
    let result = handle_request(&request.method, request.params, state);
    Some(response_line(request.id, result))
}

fn response_line(
    id: super::types::RequestId,
    result: std::result::Result<serde_json::Value, JsonRpcError>,
) -> String {
    match result {
        Ok(response) => serde_json::to_string(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": response
        }))
        .unwrap_or_default(),
        Err(error) => {
            serde_json::to_string(&JsonRpcErrorResponse::new(Some(id), error)).unwrap_or_default()
        }
    }
}

/// Writes one line to stdout.
fn write_line(line: String) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{}", line).ok();
    out.flush().ok();
}

/// Sends a JSON-RPC notification to stdout.
pub fn send_notification<T: serde::Serialize>(method: &'static str, params: T) {
    let notification = JsonRpcNotification::new(method, params);
    if let Ok(json) = serde_json::to_string(&notification) {
        write_line(json);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Backend, SyntheticModelLoader};
    use crate::transcription::NoteEvent;
    use std::path::Path;
    use tempfile::tempdir;

    struct NoNotes;

    impl Transcriber for NoNotes {
        fn predict(&self, _audio: &Path) -> Result<Vec<NoteEvent>> {
            Ok(Vec::new())
        }
    }

    fn test_state(dir: &Path) -> ServerState {
        let config = DaemonConfig {
            artifact_dir: Some(dir.to_path_buf()),
            backend: Backend::Synthetic,
            ..Default::default()
        };
        ServerState::with_parts(config, Arc::new(SyntheticModelLoader), Arc::new(NoNotes))
            .with_notification_sink(Arc::new(|_| {}))
    }

    #[test]
    fn server_state_shutdown() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());
        assert!(!state.is_shutdown());
        state.shutdown();
        assert!(state.is_shutdown());
    }

    #[test]
    fn generation_ids_are_unique() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());
        assert_ne!(state.next_generation_id(), state.next_generation_id());
    }

    #[test]
    fn process_invalid_json() {
        let dir = tempdir().unwrap();
        let mut state = test_state(dir.path());
        let response = process_request("not json", &mut state).unwrap();
        assert!(response.contains("-32700")); // Parse error
    }

    #[test]
    fn process_invalid_version() {
        let dir = tempdir().unwrap();
        let mut state = test_state(dir.path());
        let request = r#"{"jsonrpc":"1.0","method":"ping","id":1}"#;
        let response = process_request(request, &mut state).unwrap();
        assert!(response.contains("-32600")); // Invalid request
    }

    #[test]
    fn process_unknown_method() {
        let dir = tempdir().unwrap();
        let mut state = test_state(dir.path());
        let request = r#"{"jsonrpc":"2.0","method":"unknown","id":1}"#;
        let response = process_request(request, &mut state).unwrap();
        assert!(response.contains("-32601")); // Method not found
    }

    #[test]
    fn cancel_only_applies_while_busy() {
        let handle = CancelHandle::default();
        assert!(!handle.cancel());
        assert!(!handle.token().is_cancelled());

        let guard = handle.begin();
        assert!(handle.cancel());
        assert!(handle.token().is_cancelled());
        drop(guard);

        assert!(!handle.token().is_cancelled());
        assert!(!handle.cancel());
    }

    #[test]
    fn cancel_is_intercepted_by_reader() {
        let handle = CancelHandle::default();
        let _guard = handle.begin();

        let response =
            intercept_cancel(r#"{"jsonrpc":"2.0","method":"cancel","id":7}"#, &handle).unwrap();
        let value: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["result"]["cancelled"], true);
        assert!(handle.token().is_cancelled());

        assert!(intercept_cancel(r#"{"jsonrpc":"2.0","method":"ping","id":8}"#, &handle).is_none());
        assert!(intercept_cancel("garbage", &handle).is_none());
    }

    #[test]
    fn reader_forwards_everything_but_cancel() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","method":"ping","id":1}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"cancel","id":2}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"list_models","id":3}"#,
            "\n"
        );
        let (sender, receiver) = mpsc::channel();
        read_requests(io::Cursor::new(input), sender, CancelHandle::default());

        let forwarded: Vec<String> = receiver.iter().collect();
        assert_eq!(forwarded.len(), 2);
        assert!(forwarded[0].contains("ping"));
        assert!(forwarded[1].contains("list_models"));
    }
}
