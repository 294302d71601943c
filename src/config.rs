//! Daemon configuration module.
//!
//! Contains the runtime configuration for tunecraft: where artifacts live
//! and for how long, which generation backend to use, worker counts and
//! the captioning and transcription collaborators.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::DEFAULT_LIFETIME;
use crate::captioning::CaptioningConfig;
use crate::generation::{DispatcherOptions, DEFAULT_MAX_OUTPUTS, DEFAULT_RENDER_WORKERS};
use crate::models::{Backend, DEFAULT_BRIDGE_URL};
use crate::transcription::DEFAULT_BASIC_PITCH_COMMAND;

/// Model used when a request does not name one.
pub const DEFAULT_MODEL: &str = "facebook/musicgen-melody-large";

/// Default bridge request timeout in seconds.
pub const DEFAULT_BRIDGE_TIMEOUT_SECS: u64 = 900;

const MAX_RENDER_WORKERS: usize = 32;
const MAX_OUTPUTS_LIMIT: usize = 64;

/// Runtime configuration for the daemon.
///
/// This configuration is typically loaded from environment variables at
/// startup and then refined by command-line arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Directory for temporary artifacts.
    /// If None, uses the platform-specific default cache location.
    pub artifact_dir: Option<PathBuf>,

    /// How long an artifact lives before the sweeper may delete it.
    pub artifact_lifetime_secs: u64,

    /// Threads used to render derived artifacts.
    pub render_workers: usize,

    /// Upper bound on outputs per generation request.
    pub max_outputs: usize,

    /// Render a waveform visualisation for every generated file.
    pub render_waveforms: bool,

    /// Model used when a request does not name one.
    pub default_model: String,

    /// Generation backend.
    pub backend: Backend,

    /// Base URL of the inference bridge.
    pub bridge_url: String,

    /// Per-request timeout for the inference bridge.
    pub bridge_timeout_secs: u64,

    /// Hosted captioning settings.
    pub captioning: CaptioningConfig,

    /// Executable used for audio-to-MIDI transcription.
    pub transcriber_command: PathBuf,
}

impl DaemonConfig {
    /// Creates a new DaemonConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a DaemonConfig from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `TUNECRAFT_ARTIFACT_DIR` - Directory for temporary artifacts
    /// - `TUNECRAFT_ARTIFACT_LIFETIME` - Artifact lifetime in seconds
    /// - `TUNECRAFT_RENDER_WORKERS` - Render pool size (1-32)
    /// - `TUNECRAFT_MAX_OUTPUTS` - Outputs per request (1-64)
    /// - `TUNECRAFT_RENDER_WAVEFORMS` - Render waveform SVGs (true/false)
    /// - `TUNECRAFT_MODEL` - Default model identifier
    /// - `TUNECRAFT_BACKEND` - Generation backend (bridge, synthetic)
    /// - `TUNECRAFT_BRIDGE_URL` - Inference bridge base URL
    /// - `TUNECRAFT_BRIDGE_TIMEOUT` - Bridge request timeout in seconds
    /// - `TUNECRAFT_CAPTION_ENDPOINT` - Captioning messages endpoint
    /// - `TUNECRAFT_CAPTION_MODEL` - Captioning model identifier
    /// - `TUNECRAFT_BASIC_PITCH` - Transcription executable
    ///
    /// Falls back to defaults for unset or unparsable variables.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = var("TUNECRAFT_ARTIFACT_DIR") {
            config.artifact_dir = Some(PathBuf::from(path));
        }

        if let Some(secs) = var("TUNECRAFT_ARTIFACT_LIFETIME").and_then(|s| s.parse::<u64>().ok()) {
            if secs > 0 {
                config.artifact_lifetime_secs = secs;
            }
        }

        if let Some(workers) = var("TUNECRAFT_RENDER_WORKERS").and_then(|s| s.parse::<usize>().ok()) {
            if (1..=MAX_RENDER_WORKERS).contains(&workers) {
                config.render_workers = workers;
            }
        }

        if let Some(max) = var("TUNECRAFT_MAX_OUTPUTS").and_then(|s| s.parse::<usize>().ok()) {
            if (1..=MAX_OUTPUTS_LIMIT).contains(&max) {
                config.max_outputs = max;
            }
        }

        if let Some(flag) = var("TUNECRAFT_RENDER_WAVEFORMS") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => config.render_waveforms = true,
                "0" | "false" | "no" | "off" => config.render_waveforms = false,
                _ => {}
            }
        }

        if let Some(model) = var("TUNECRAFT_MODEL") {
            if !model.trim().is_empty() {
                config.default_model = model;
            }
        }

        if let Some(backend) = var("TUNECRAFT_BACKEND").and_then(|s| Backend::parse(&s)) {
            config.backend = backend;
        }

        if let Some(url) = var("TUNECRAFT_BRIDGE_URL") {
            config.bridge_url = url;
        }

        if let Some(secs) = var("TUNECRAFT_BRIDGE_TIMEOUT").and_then(|s| s.parse::<u64>().ok()) {
            if secs > 0 {
                config.bridge_timeout_secs = secs;
            }
        }

        if let Some(endpoint) = var("TUNECRAFT_CAPTION_ENDPOINT") {
            config.captioning.endpoint = endpoint;
        }

        if let Some(model) = var("TUNECRAFT_CAPTION_MODEL") {
            config.captioning.model = model;
        }

        if let Some(command) = var("TUNECRAFT_BASIC_PITCH") {
            config.transcriber_command = PathBuf::from(command);
        }

        config
    }

    /// Returns the effective artifact directory, using platform defaults if not specified.
    pub fn effective_artifact_dir(&self) -> PathBuf {
        if let Some(ref path) = self.artifact_dir {
            path.clone()
        } else {
            default_artifact_dir()
        }
    }

    pub fn artifact_lifetime(&self) -> Duration {
        Duration::from_secs(self.artifact_lifetime_secs)
    }

    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_secs(self.bridge_timeout_secs)
    }

    /// Dispatcher limits derived from this configuration.
    pub fn dispatcher_options(&self) -> DispatcherOptions {
        DispatcherOptions {
            max_outputs: self.max_outputs,
            render_workers: self.render_workers,
        }
    }

    /// Validates the configuration.
    ///
    /// Returns an error message if validation fails, None otherwise.
    pub fn validate(&self) -> Option<String> {
        if self.artifact_lifetime_secs == 0 {
            return Some("artifact_lifetime_secs must be > 0".to_string());
        }

        if !(1..=MAX_RENDER_WORKERS).contains(&self.render_workers) {
            return Some(format!(
                "render_workers out of range: {} (1-{})",
                self.render_workers, MAX_RENDER_WORKERS
            ));
        }

        if !(1..=MAX_OUTPUTS_LIMIT).contains(&self.max_outputs) {
            return Some(format!(
                "max_outputs out of range: {} (1-{})",
                self.max_outputs, MAX_OUTPUTS_LIMIT
            ));
        }

        if self.default_model.trim().is_empty() {
            return Some("default_model must not be empty".to_string());
        }

        if self.backend == Backend::Bridge
            && !(self.bridge_url.starts_with("http://") || self.bridge_url.starts_with("https://"))
        {
            return Some(format!("bridge_url is not an http(s) URL: {}", self.bridge_url));
        }

        if self.bridge_timeout_secs == 0 {
            return Some("bridge_timeout_secs must be > 0".to_string());
        }

        None
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            artifact_dir: None,
            artifact_lifetime_secs: DEFAULT_LIFETIME.as_secs(),
            render_workers: DEFAULT_RENDER_WORKERS,
            max_outputs: DEFAULT_MAX_OUTPUTS,
            render_waveforms: false,
            default_model: DEFAULT_MODEL.to_string(),
            backend: Backend::default(),
            bridge_url: DEFAULT_BRIDGE_URL.to_string(),
            bridge_timeout_secs: DEFAULT_BRIDGE_TIMEOUT_SECS,
            captioning: CaptioningConfig::default(),
            transcriber_command: PathBuf::from(DEFAULT_BASIC_PITCH_COMMAND),
        }
    }
}

/// Returns the platform-specific default artifact directory.
///
/// Uses the `directories` crate to find appropriate locations:
/// - macOS: ~/Library/Caches/tunecraft/artifacts
/// - Linux: ~/.cache/tunecraft/artifacts
/// - Windows: C:\Users\<user>\AppData\Local\tunecraft\cache\artifacts
fn default_artifact_dir() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "tunecraft") {
        proj_dirs.cache_dir().join("artifacts")
    } else {
        std::env::temp_dir().join("tunecraft-artifacts")
    }
}
