//! Capability interface implemented by generation backends.
//!
//! The daemon never runs a neural network itself. A [`ModelLoader`] turns a
//! resolved identifier into a [`ModelHandle`], and the handle produces one
//! waveform per prompt in a batch.

use crate::error::Result;
use crate::types::{GenerationConfig, Prompt, Waveform};

use super::registry::{InferenceStrategy, Resolution};

/// Answer from a progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Keep generating.
    Continue,
    /// Stop at this point; the handle must return [`ModelFailure::Interrupted`].
    Stop,
}

/// Progress callback invoked with `(generated, total)` steps.
pub type ProgressFn<'a> = dyn FnMut(usize, usize) -> Tick + 'a;

/// Failure raised by a model handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelFailure {
    /// The progress callback asked the model to stop.
    Interrupted,
    /// The model failed at runtime. Carries the backend's original message.
    Runtime(String),
}

impl std::fmt::Display for ModelFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelFailure::Interrupted => write!(f, "interrupted"),
            ModelFailure::Runtime(msg) => write!(f, "{}", msg),
        }
    }
}

/// A loaded model instance.
pub trait ModelHandle: Send {
    /// Identifier the handle was loaded for.
    fn model_id(&self) -> &str;

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Output channel count; conditioning audio is mixed to this layout.
    fn channels(&self) -> usize;

    /// Applies generation parameters for subsequent calls.
    ///
    /// Unknown keys are passed through; backends ignore what they do not use.
    fn set_params(&mut self, config: &GenerationConfig);

    /// Generates one waveform per prompt.
    ///
    /// Implementations call `progress` as they advance and must stop with
    /// [`ModelFailure::Interrupted`] once it returns [`Tick::Stop`].
    fn generate(
        &mut self,
        strategy: InferenceStrategy,
        prompts: &[Prompt],
        progress: &mut ProgressFn<'_>,
    ) -> std::result::Result<Vec<Waveform>, ModelFailure>;
}

/// Creates model handles.
pub trait ModelLoader: Send + Sync {
    /// Loads the model named by `resolution`.
    fn load(&self, resolution: &Resolution) -> Result<Box<dyn ModelHandle>>;
}
