//! Generation dispatcher.
//!
//! Routes a request to the strategy its model identifier resolves to,
//! invokes the resident model once for the whole batch, masters every
//! output with the fixed loudness policy, writes it to a temporary WAV
//! registered with the artifact store and, when asked, renders a derived
//! visualisation for each file on the render pool.
//!
//! A batch is all-or-nothing: any failure fails the call and no artifact
//! list is returned. Files already written stay owned by the store and
//! are reclaimed by its sweep.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audio::{convert_audio, normalize_loudness, write_wav};
use crate::cache::ArtifactStore;
use crate::error::{DaemonError, Result};
use crate::models::{
    InferenceStrategy, ModelCache, ModelFailure, ModelHandle, ModelRegistry, Resolution,
};
use crate::types::{keys, ArtifactKind, AudioArtifact, GenerationConfig, Prompt, Waveform};

use super::cancel::ProgressMonitor;
use super::render::{ArtifactRenderer, RenderPool, SvgWaveformRenderer, DEFAULT_RENDER_WORKERS};

/// Default upper bound on outputs per request.
pub const DEFAULT_MAX_OUTPUTS: usize = 10;

/// A batch of prompts for one model.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model_id: String,
    pub config: GenerationConfig,
    /// One entry per requested output.
    pub prompts: Vec<Prompt>,
    /// Render a visualisation for every output.
    pub render: bool,
}

impl GenerationRequest {
    /// Replicates one prompt `count` times. Outputs differ only by sampling.
    pub fn replicated(
        model_id: impl Into<String>,
        config: GenerationConfig,
        prompt: Prompt,
        count: usize,
    ) -> Self {
        Self::batch(model_id, config, vec![prompt; count])
    }

    /// Uses independent prompts, one output each.
    pub fn batch(model_id: impl Into<String>, config: GenerationConfig, prompts: Vec<Prompt>) -> Self {
        Self {
            model_id: model_id.into(),
            config,
            prompts,
            render: false,
        }
    }

    /// Requests derived rendering.
    pub fn with_rendering(mut self, render: bool) -> Self {
        self.render = render;
        self
    }
}

/// Successful generation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub model_id: String,
    pub strategy: InferenceStrategy,
    pub sample_rate: u32,
    /// One artifact per prompt, in prompt order.
    pub artifacts: Vec<AudioArtifact>,
    pub generation_time_sec: f32,
}

/// Outcome of a generation call that did not fail.
#[derive(Debug, Clone)]
pub enum GenerationOutcome {
    Completed(GenerationResult),
    /// The cancellation token was observed; nothing was written.
    Cancelled,
}

impl GenerationOutcome {
    /// Converts a cancellation into a `CANCELLED` error.
    pub fn into_result(self) -> Result<GenerationResult> {
        match self {
            GenerationOutcome::Completed(result) => Ok(result),
            GenerationOutcome::Cancelled => Err(DaemonError::cancelled()),
        }
    }
}

/// Limits applied by the dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherOptions {
    pub max_outputs: usize,
    pub render_workers: usize,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            max_outputs: DEFAULT_MAX_OUTPUTS,
            render_workers: DEFAULT_RENDER_WORKERS,
        }
    }
}

/// Raw model outputs, or the interrupt that stopped them.
enum RawOutput {
    Waves { waves: Vec<Waveform>, sample_rate: u32 },
    Interrupted,
}

/// Owns the model cache and hands outputs to the artifact store.
pub struct GenerationDispatcher {
    registry: ModelRegistry,
    models: ModelCache,
    store: Arc<ArtifactStore>,
    renderer: Arc<dyn ArtifactRenderer>,
    pool: RenderPool,
    max_outputs: usize,
}

impl GenerationDispatcher {
    pub fn new(
        registry: ModelRegistry,
        models: ModelCache,
        store: Arc<ArtifactStore>,
        options: DispatcherOptions,
    ) -> Self {
        Self {
            registry,
            models,
            store,
            renderer: Arc::new(SvgWaveformRenderer::default()),
            pool: RenderPool::new(options.render_workers),
            max_outputs: options.max_outputs.max(1),
        }
    }

    /// Replaces the derived-artifact renderer.
    pub fn with_renderer(mut self, renderer: Arc<dyn ArtifactRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn models(&self) -> &ModelCache {
        &self.models
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    pub fn max_outputs(&self) -> usize {
        self.max_outputs
    }

    /// Rejects an output count outside `1..=max_outputs`.
    ///
    /// Callers that build a replicated batch check the count first so an
    /// oversized request never allocates its prompt list.
    pub fn check_output_count(&self, count: usize) -> Result<()> {
        if count == 0 || count > self.max_outputs {
            return Err(DaemonError::invalid_configuration(format!(
                "Output count must be between 1 and {}, got {}",
                self.max_outputs, count
            )));
        }
        Ok(())
    }

    /// Generates `output_count` outputs sharing one text/audio prompt.
    pub fn generate(
        &self,
        model_id: &str,
        config: &GenerationConfig,
        prompt_text: Option<&str>,
        prompt_audio: Option<Waveform>,
        output_count: usize,
        progress: &mut ProgressMonitor<'_>,
    ) -> Result<GenerationOutcome> {
        self.check_output_count(output_count)?;
        let prompt = Prompt {
            text: prompt_text.map(str::to_string),
            audio: prompt_audio,
        };
        let request = GenerationRequest::replicated(model_id, config.clone(), prompt, output_count);
        self.generate_batch(&request, progress)
    }

    /// Generates one output per prompt in `request`.
    pub fn generate_batch(
        &self,
        request: &GenerationRequest,
        progress: &mut ProgressMonitor<'_>,
    ) -> Result<GenerationOutcome> {
        let resolution = self.registry.resolve(&request.model_id)?;
        self.validate(&resolution, request)?;

        info!(
            model = %resolution.model_id,
            strategy = %resolution.strategy,
            outputs = request.prompts.len(),
            "Starting generation"
        );
        let start = Instant::now();

        let raw = self.models.with_model(&resolution, |handle| {
            invoke(handle, &resolution, request, progress)
        })??;

        let (waves, sample_rate) = match raw {
            RawOutput::Waves { waves, sample_rate } => (waves, sample_rate),
            RawOutput::Interrupted => {
                info!(model = %resolution.model_id, ticks = progress.ticks(), "Generation cancelled");
                return Ok(GenerationOutcome::Cancelled);
            }
        };

        if waves.len() != request.prompts.len() {
            return Err(DaemonError::generation_failed(format!(
                "model returned {} outputs for {} prompts",
                waves.len(),
                request.prompts.len()
            )));
        }
        if let Some(i) = waves.iter().position(|w| !w.is_finite()) {
            return Err(DaemonError::generation_failed(format!(
                "output {} contains non-finite samples",
                i
            )));
        }

        let mut artifacts = Vec::with_capacity(waves.len());
        for mut wave in waves {
            artifacts.push(self.persist(&mut wave)?);
        }

        if request.render {
            let inputs: Vec<_> = artifacts.iter().map(|a| a.path.clone()).collect();
            let rendered = self
                .pool
                .render_all(self.renderer.as_ref(), &self.store, &inputs)?;
            for (artifact, path) in artifacts.iter_mut().zip(rendered) {
                artifact.visualization = Some(path);
            }
        }

        let generation_time_sec = start.elapsed().as_secs_f32();
        info!(
            model = %resolution.model_id,
            outputs = artifacts.len(),
            secs = generation_time_sec,
            "Generation finished"
        );

        Ok(GenerationOutcome::Completed(GenerationResult {
            model_id: resolution.model_id,
            strategy: resolution.strategy,
            sample_rate,
            artifacts,
            generation_time_sec,
        }))
    }

    /// Checks a request before any model is touched.
    fn validate(&self, resolution: &Resolution, request: &GenerationRequest) -> Result<()> {
        request.config.validate()?;

        if resolution.family.requires_duration() && request.config.duration().is_none() {
            return Err(DaemonError::missing_parameter(
                keys::DURATION,
                &resolution.model_id,
            ));
        }

        self.check_output_count(request.prompts.len())?;

        if resolution.strategy.requires_audio() {
            if let Some(i) = request.prompts.iter().position(|p| !p.has_audio()) {
                return Err(DaemonError::invalid_configuration(format!(
                    "Model '{}' ({}) requires reference audio, prompt {} has none",
                    resolution.model_id, resolution.strategy, i
                )));
            }
        }

        Ok(())
    }

    /// Masters, writes and registers one output.
    fn persist(&self, wave: &mut Waveform) -> Result<AudioArtifact> {
        normalize_loudness(wave);

        let path = self.store.create_path(ArtifactKind::Audio)?;
        self.store.register(&path);
        write_wav(wave, &path)?;
        debug!(path = %path.display(), "Wrote audio artifact");

        let channels = u16::try_from(wave.channels()).unwrap_or(u16::MAX);
        Ok(AudioArtifact {
            path,
            sample_rate: wave.sample_rate(),
            channels,
            duration_sec: wave.duration_sec(),
            visualization: None,
        })
    }
}

/// Prepares prompts for the handle's format and runs the batch.
fn invoke(
    handle: &mut dyn ModelHandle,
    resolution: &Resolution,
    request: &GenerationRequest,
    monitor: &mut ProgressMonitor<'_>,
) -> Result<RawOutput> {
    handle.set_params(&request.config);

    let sample_rate = handle.sample_rate();
    let channels = handle.channels();
    let duration = request.config.duration();
    let uses_audio = resolution.strategy.requires_audio();

    let mut prompts = Vec::with_capacity(request.prompts.len());
    for prompt in &request.prompts {
        let audio = match (&prompt.audio, uses_audio) {
            (Some(wave), true) => Some(convert_audio(wave.clone(), duration, sample_rate, channels)?),
            (Some(_), false) => {
                warn!(
                    model = %resolution.model_id,
                    "Ignoring reference audio for a text-only model"
                );
                None
            }
            (None, _) => None,
        };
        prompts.push(Prompt {
            text: prompt.text.clone(),
            audio,
        });
    }

    match handle.generate(resolution.strategy, &prompts, &mut |g, t| monitor.tick(g, t)) {
        Ok(waves) => Ok(RawOutput::Waves { waves, sample_rate }),
        Err(ModelFailure::Interrupted) => Ok(RawOutput::Interrupted),
        Err(ModelFailure::Runtime(message)) => Err(DaemonError::generation_failed(message)),
    }
}
