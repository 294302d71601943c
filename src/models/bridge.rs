//! HTTP bridge to an inference server hosting the pretrained models.
//!
//! The server loads checkpoints and runs them; this side only marshals
//! requests. Conditioning audio travels as WAV files in a scratch
//! directory and outputs come back as WAV paths written by the server.
//!
//! Protocol:
//! - `POST /load` with the model identifier, answered with the sample rate
//!   and channel count.
//! - `POST /generate` with parameters and one item per output, answered
//!   with a job id.
//! - `GET /jobs/{id}` polled until the job is done or failed; each poll
//!   reports `(generated, total)` and drives the progress callback.
//! - `POST /jobs/{id}/cancel` when the callback asks to stop.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::audio::{read_wav, write_wav};
use crate::error::{DaemonError, Result};
use crate::types::{GenerationConfig, Prompt, Waveform};

use super::capability::{ModelFailure, ModelHandle, ModelLoader, ProgressFn, Tick};
use super::registry::{InferenceStrategy, Resolution};

/// Default bridge endpoint.
pub const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:8765";

/// Delay between job status polls.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Serialize)]
struct LoadRequest<'a> {
    model_id: &'a str,
    family: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoadResponse {
    sample_rate: u32,
    #[serde(default = "default_channels")]
    channels: usize,
}

fn default_channels() -> usize {
    1
}

#[derive(Debug, Serialize)]
struct GenerateItem {
    description: Option<String>,
    audio_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model_id: &'a str,
    strategy: InferenceStrategy,
    params: &'a GenerationConfig,
    items: Vec<GenerateItem>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    job_id: String,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum JobState {
    Running,
    Done,
    Failed,
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    status: JobState,
    #[serde(default)]
    generated: usize,
    #[serde(default)]
    total: usize,
    #[serde(default)]
    outputs: Vec<PathBuf>,
    #[serde(default)]
    error: Option<String>,
}

/// Loads models through the HTTP bridge.
pub struct BridgeModelLoader {
    base_url: String,
    client: Client,
}

impl BridgeModelLoader {
    /// Creates a loader for the bridge at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            DaemonError::invalid_configuration(format!("Cannot build HTTP client: {}", e))
        })?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Returns true if the bridge answers its health check.
    pub fn is_reachable(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).timeout(Duration::from_secs(5)).send() {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

impl ModelLoader for BridgeModelLoader {
    fn load(&self, resolution: &Resolution) -> Result<Box<dyn ModelHandle>> {
        let url = format!("{}/load", self.base_url);
        let request = LoadRequest {
            model_id: &resolution.model_id,
            family: resolution.family.as_str(),
        };

        let response = self.client.post(&url).json(&request).send().map_err(|e| {
            if e.is_connect() {
                DaemonError::model_load_failed(format!(
                    "Cannot connect to bridge at {}: {}",
                    self.base_url, e
                ))
            } else {
                DaemonError::model_load_failed(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(DaemonError::model_load_failed(format!(
                "Bridge returned {} while loading '{}'",
                response.status(),
                resolution.model_id
            )));
        }

        let loaded: LoadResponse = response.json().map_err(|e| {
            DaemonError::model_load_failed(format!("Invalid response from bridge: {}", e))
        })?;

        debug!(
            model = %resolution.model_id,
            sample_rate = loaded.sample_rate,
            channels = loaded.channels,
            "Bridge loaded model"
        );

        Ok(Box::new(BridgeModel {
            model_id: resolution.model_id.clone(),
            base_url: self.base_url.clone(),
            client: self.client.clone(),
            sample_rate: loaded.sample_rate,
            channels: loaded.channels.max(1),
            params: GenerationConfig::new(),
        }))
    }
}

/// A model resident on the bridge server.
pub struct BridgeModel {
    model_id: String,
    base_url: String,
    client: Client,
    sample_rate: u32,
    channels: usize,
    params: GenerationConfig,
}

impl BridgeModel {
    fn submit(
        &self,
        strategy: InferenceStrategy,
        prompts: &[Prompt],
        scratch: &Path,
    ) -> std::result::Result<String, ModelFailure> {
        let mut items = Vec::with_capacity(prompts.len());
        for (i, prompt) in prompts.iter().enumerate() {
            let audio_path = match &prompt.audio {
                Some(wave) => {
                    let path = scratch.join(format!("conditioning-{}.wav", i));
                    write_wav(wave, &path).map_err(|e| ModelFailure::Runtime(e.message))?;
                    Some(path.to_string_lossy().into_owned())
                }
                None => None,
            };
            items.push(GenerateItem {
                description: prompt.text.clone(),
                audio_path,
            });
        }

        let request = GenerateRequest {
            model_id: &self.model_id,
            strategy,
            params: &self.params,
            items,
        };

        let url = format!("{}/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .map_err(|e| ModelFailure::Runtime(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ModelFailure::Runtime(format!(
                "bridge returned {}",
                response.status()
            )));
        }
        let submitted: GenerateResponse = response
            .json()
            .map_err(|e| ModelFailure::Runtime(format!("invalid response from bridge: {}", e)))?;
        Ok(submitted.job_id)
    }

    fn poll(&self, job_id: &str) -> std::result::Result<JobStatus, ModelFailure> {
        let url = format!("{}/jobs/{}", self.base_url, job_id);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| ModelFailure::Runtime(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ModelFailure::Runtime(format!(
                "bridge returned {}",
                response.status()
            )));
        }
        response
            .json()
            .map_err(|e| ModelFailure::Runtime(format!("invalid job status from bridge: {}", e)))
    }

    fn cancel(&self, job_id: &str) {
        let url = format!("{}/jobs/{}/cancel", self.base_url, job_id);
        if let Err(e) = self.client.post(&url).send() {
            warn!(job_id, error = %e, "Failed to cancel bridge job");
        }
    }

    fn collect(&self, outputs: &[PathBuf]) -> std::result::Result<Vec<Waveform>, ModelFailure> {
        let mut waves = Vec::with_capacity(outputs.len());
        for path in outputs {
            let wave = read_wav(path).map_err(|e| ModelFailure::Runtime(e.message))?;
            waves.push(wave);
            // Outputs are copies owned by the bridge; we keep our own.
            if let Err(e) = std::fs::remove_file(path) {
                debug!(path = %path.display(), error = %e, "Failed to remove bridge output");
            }
        }
        Ok(waves)
    }
}

impl ModelHandle for BridgeModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn set_params(&mut self, config: &GenerationConfig) {
        self.params = config.clone();
    }

    fn generate(
        &mut self,
        strategy: InferenceStrategy,
        prompts: &[Prompt],
        progress: &mut ProgressFn<'_>,
    ) -> std::result::Result<Vec<Waveform>, ModelFailure> {
        let scratch = tempfile::tempdir()
            .map_err(|e| ModelFailure::Runtime(format!("cannot create scratch dir: {}", e)))?;

        let job_id = self.submit(strategy, prompts, scratch.path())?;
        debug!(model = %self.model_id, job_id = %job_id, items = prompts.len(), "Submitted bridge job");

        loop {
            let status = self.poll(&job_id)?;
            match status.status {
                JobState::Failed => {
                    return Err(ModelFailure::Runtime(
                        status.error.unwrap_or_else(|| "bridge job failed".to_string()),
                    ));
                }
                JobState::Done => {
                    if status.outputs.len() != prompts.len() {
                        return Err(ModelFailure::Runtime(format!(
                            "bridge returned {} outputs for {} prompts",
                            status.outputs.len(),
                            prompts.len()
                        )));
                    }
                    let total = status.total.max(1);
                    if progress(total, total) == Tick::Stop {
                        return Err(ModelFailure::Interrupted);
                    }
                    return self.collect(&status.outputs);
                }
                JobState::Running => {
                    if progress(status.generated, status.total) == Tick::Stop {
                        self.cancel(&job_id);
                        return Err(ModelFailure::Interrupted);
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }
}
