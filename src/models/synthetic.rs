//! Deterministic synthetic backend.
//!
//! Produces simple tone beds instead of running a network, honouring the
//! parts of the contract callers can observe: output count, duration,
//! sample rate, channel layout, conditioning mode and progress ticks.
//! Used for offline runs and tests.

use std::collections::hash_map::DefaultHasher;
use std::f32::consts::TAU;
use std::hash::{Hash, Hasher};

use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::Result;
use crate::types::{keys, GenerationConfig, Prompt, Waveform};

use super::capability::{ModelFailure, ModelHandle, ModelLoader, ProgressFn, Tick};
use super::registry::{InferenceStrategy, Resolution};

/// Decoding steps per second of audio, matching a 50 Hz codec frame rate.
const STEPS_PER_SECOND: f64 = 50.0;

/// Duration used when a request does not name one.
const FALLBACK_DURATION_SEC: f64 = 10.0;

/// Pentatonic scale degrees in semitones above the root.
const SCALE: [i32; 5] = [0, 2, 4, 7, 9];

/// Loads [`SyntheticModel`] handles.
#[derive(Debug, Default, Clone)]
pub struct SyntheticModelLoader;

impl ModelLoader for SyntheticModelLoader {
    fn load(&self, resolution: &Resolution) -> Result<Box<dyn ModelHandle>> {
        Ok(Box::new(SyntheticModel::new(resolution)))
    }
}

/// Synthetic stand-in for a pretrained model.
#[derive(Debug)]
pub struct SyntheticModel {
    model_id: String,
    sample_rate: u32,
    channels: usize,
    fixed_duration: Option<f64>,
    duration: Option<f64>,
    seed: Option<u64>,
}

impl SyntheticModel {
    pub fn new(resolution: &Resolution) -> Self {
        Self {
            model_id: resolution.model_id.clone(),
            sample_rate: resolution.sample_rate(),
            channels: resolution.channels,
            fixed_duration: resolution.fixed_duration_sec(),
            duration: None,
            seed: None,
        }
    }

    fn duration_sec(&self) -> f64 {
        self.fixed_duration
            .or(self.duration)
            .unwrap_or(FALLBACK_DURATION_SEC)
    }

    fn seed_for(&self, prompt: &Prompt, index: usize) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.model_id.hash(&mut hasher);
        prompt.text.hash(&mut hasher);
        self.seed.hash(&mut hasher);
        index.hash(&mut hasher);
        hasher.finish()
    }
}

impl ModelHandle for SyntheticModel {
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
        self.duration = config.duration();
        self.seed = config.number(keys::SEED).map(|s| s as u64);
    }

    fn generate(
        &mut self,
        strategy: InferenceStrategy,
        prompts: &[Prompt],
        progress: &mut ProgressFn<'_>,
    ) -> std::result::Result<Vec<Waveform>, ModelFailure> {
        let duration = self.duration_sec();
        if !(duration.is_finite() && duration > 0.0) {
            return Err(ModelFailure::Runtime(format!("invalid duration {}", duration)));
        }

        let frames = (duration * self.sample_rate as f64).round() as usize;
        let total_steps = ((duration * STEPS_PER_SECOND).ceil() as usize).max(1);
        let frames_per_step = frames.div_ceil(total_steps);

        let mut voices: Vec<Voice> = prompts
            .iter()
            .enumerate()
            .map(|(i, prompt)| Voice::new(strategy, prompt, self.seed_for(prompt, i), self.sample_rate))
            .collect();
        let mut outputs: Vec<Array2<f32>> = prompts
            .iter()
            .map(|_| Array2::zeros((self.channels, frames)))
            .collect();

        for step in 0..total_steps {
            if progress(step, total_steps) == Tick::Stop {
                return Err(ModelFailure::Interrupted);
            }
            let start = step * frames_per_step;
            let end = (start + frames_per_step).min(frames);
            for (voice, out) in voices.iter_mut().zip(outputs.iter_mut()) {
                for frame in start..end {
                    let sample = voice.next_sample(frame);
                    for channel in 0..self.channels {
                        out[[channel, frame]] = sample;
                    }
                }
            }
        }
        if progress(total_steps, total_steps) == Tick::Stop {
            return Err(ModelFailure::Interrupted);
        }

        Ok(outputs
            .into_iter()
            .map(|samples| Waveform::new(samples, self.sample_rate))
            .collect())
    }
}

/// Per-output synthesis state.
struct Voice {
    strategy: InferenceStrategy,
    rng: ChaCha8Rng,
    sample_rate: f32,
    root_hz: f32,
    note_hz: f32,
    phase: f32,
    note_frames: usize,
    /// Reference audio folded to mono.
    reference: Vec<f32>,
}

impl Voice {
    fn new(strategy: InferenceStrategy, prompt: &Prompt, seed: u64, sample_rate: u32) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let root_hz = 110.0 * 2f32.powf(rng.gen_range(0..12) as f32 / 12.0);
        let reference = prompt
            .audio
            .as_ref()
            .map(|wave| {
                let channels = wave.channels().max(1) as f32;
                wave.samples()
                    .columns()
                    .into_iter()
                    .map(|col| col.sum() / channels)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            strategy,
            rng,
            sample_rate: sample_rate as f32,
            root_hz,
            note_hz: root_hz,
            phase: 0.0,
            note_frames: (sample_rate / 4) as usize,
            reference,
        }
    }

    fn next_sample(&mut self, frame: usize) -> f32 {
        match self.strategy {
            InferenceStrategy::SoundEffect => {
                let noise: f32 = self.rng.gen_range(-1.0..1.0);
                let swell = 0.5 + 0.5 * (TAU * 0.5 * frame as f32 / self.sample_rate).sin();
                0.3 * noise * swell
            }
            InferenceStrategy::Continuation if frame < self.reference.len() => {
                self.reference[frame]
            }
            _ => {
                if frame % self.note_frames == 0 {
                    let degree = SCALE[self.rng.gen_range(0..SCALE.len())];
                    let octave = self.rng.gen_range(0..2) * 12;
                    self.note_hz = self.root_hz * 2f32.powf((degree + octave) as f32 / 12.0);
                }
                self.phase = (self.phase + TAU * self.note_hz / self.sample_rate) % TAU;
                let tone = 0.4 * self.phase.sin() + 0.1 * (2.0 * self.phase).sin();
                match self.strategy {
                    InferenceStrategy::MelodyConditioned if !self.reference.is_empty() => {
                        let follow = self.reference[frame % self.reference.len()].abs();
                        tone * (0.25 + follow.min(1.0))
                    }
                    _ => tone,
                }
            }
        }
    }
}
