//! Model registry mapping model identifiers to inference strategies.
//!
//! Identifiers are opaque strings such as `facebook/musicgen-melody-large`.
//! They are matched against family markers by an ordered rule list; the
//! first matching rule wins, so more specific markers (`audio-magnet`)
//! are listed before the markers they contain (`magnet`).

use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, Result};

/// Model families known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// Autoregressive text-to-music transformer.
    MusicGen,
    /// Non-autoregressive masked music transformer with a fixed clip length.
    Magnet,
    /// Non-autoregressive sound effect transformer with a fixed clip length.
    AudioMagnet,
    /// Autoregressive sound effect transformer.
    AudioGen,
    /// Symbolic text-to-MIDI model. Resolves, but no backend can run it.
    MusicLang,
}

impl ModelFamily {
    /// Returns the string representation of the family.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::MusicGen => "musicgen",
            ModelFamily::Magnet => "magnet",
            ModelFamily::AudioMagnet => "audio_magnet",
            ModelFamily::AudioGen => "audiogen",
            ModelFamily::MusicLang => "musiclang",
        }
    }

    /// Returns the output sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        match self {
            ModelFamily::MusicGen | ModelFamily::Magnet | ModelFamily::MusicLang => 32000,
            ModelFamily::AudioGen | ModelFamily::AudioMagnet => 16000,
        }
    }

    /// Whether a request must carry a `duration` parameter.
    ///
    /// Magnet models generate a fixed clip length baked into the checkpoint.
    pub fn requires_duration(&self) -> bool {
        !matches!(self, ModelFamily::Magnet | ModelFamily::AudioMagnet)
    }

    /// Whether any generation backend can run this family.
    pub fn is_supported(&self) -> bool {
        !matches!(self, ModelFamily::MusicLang)
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inference procedure selected for a model's conditioning mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceStrategy {
    /// Text description only.
    TextToAudio,
    /// Text plus a reference melody whose chroma guides the output.
    MelodyConditioned,
    /// The reference audio is a prefix the model extends.
    Continuation,
    /// Text-only sound effect generation.
    SoundEffect,
}

impl InferenceStrategy {
    /// Returns the string representation of the strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceStrategy::TextToAudio => "text_to_audio",
            InferenceStrategy::MelodyConditioned => "melody_conditioned",
            InferenceStrategy::Continuation => "continuation",
            InferenceStrategy::SoundEffect => "sound_effect",
        }
    }

    /// Whether every prompt must carry reference audio.
    pub fn requires_audio(&self) -> bool {
        matches!(
            self,
            InferenceStrategy::MelodyConditioned | InferenceStrategy::Continuation
        )
    }
}

impl std::fmt::Display for InferenceStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of resolving a model identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The identifier as given by the caller.
    pub model_id: String,
    pub family: ModelFamily,
    pub strategy: InferenceStrategy,
    /// Output channel count (2 for stereo checkpoints).
    pub channels: usize,
}

impl Resolution {
    /// Returns the output sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.family.sample_rate()
    }

    /// Returns the clip length of fixed-length checkpoints, if any.
    pub fn fixed_duration_sec(&self) -> Option<f64> {
        if self.family.requires_duration() {
            return None;
        }
        let id = self.model_id.to_lowercase();
        Some(if id.contains("30secs") { 30.0 } else { 10.0 })
    }
}

type Predicate = fn(&str) -> bool;

/// A single routing rule, evaluated against the lowercased identifier.
struct Rule {
    matches: Predicate,
    family: ModelFamily,
    strategy: InferenceStrategy,
}

/// Ordered identifier-to-strategy table.
pub struct ModelRegistry {
    rules: Vec<Rule>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    /// Creates a registry with the built-in rules.
    pub fn new() -> Self {
        let rules = vec![
            Rule {
                matches: |id| id.contains("musiclang"),
                family: ModelFamily::MusicLang,
                strategy: InferenceStrategy::TextToAudio,
            },
            Rule {
                matches: |id| id.contains("audio-magnet"),
                family: ModelFamily::AudioMagnet,
                strategy: InferenceStrategy::SoundEffect,
            },
            Rule {
                matches: |id| id.contains("audiogen"),
                family: ModelFamily::AudioGen,
                strategy: InferenceStrategy::SoundEffect,
            },
            Rule {
                matches: |id| id.contains("magnet"),
                family: ModelFamily::Magnet,
                strategy: InferenceStrategy::TextToAudio,
            },
            Rule {
                matches: |id| id.contains("musicgen") && id.contains("melody"),
                family: ModelFamily::MusicGen,
                strategy: InferenceStrategy::MelodyConditioned,
            },
            Rule {
                matches: |id| id.contains("musicgen") && id.contains("continuation"),
                family: ModelFamily::MusicGen,
                strategy: InferenceStrategy::Continuation,
            },
            Rule {
                matches: |id| id.contains("musicgen"),
                family: ModelFamily::MusicGen,
                strategy: InferenceStrategy::TextToAudio,
            },
        ];
        Self { rules }
    }

    /// Resolves an identifier to its family and inference strategy.
    pub fn resolve(&self, model_id: &str) -> Result<Resolution> {
        let id = model_id.trim().to_lowercase();
        if id.is_empty() {
            return Err(DaemonError::unknown_model(model_id));
        }

        self.rules
            .iter()
            .find(|rule| (rule.matches)(&id))
            .map(|rule| Resolution {
                model_id: model_id.trim().to_string(),
                family: rule.family,
                strategy: rule.strategy,
                channels: if id.contains("stereo") { 2 } else { 1 },
            })
            .ok_or_else(|| DaemonError::unknown_model(model_id))
    }

    /// Returns the strategy for an identifier.
    pub fn strategy_for(&self, model_id: &str) -> Result<InferenceStrategy> {
        self.resolve(model_id).map(|r| r.strategy)
    }
}
