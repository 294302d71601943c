//! Core types for tunecraft.
//!
//! This module re-exports all the core data types used throughout the daemon:
//! - [`GenerationConfig`]: Named generation parameters passed through to a model
//! - [`Prompt`]: Text and/or audio conditioning for one generated output
//! - [`Waveform`]: Multi-channel audio samples with a sample rate
//! - [`AudioArtifact`] / [`MidiArtifact`]: Files produced for download

mod artifact;
mod params;
mod prompt;
mod waveform;

// Re-export all types at the module level
pub use artifact::{download_label, ArtifactKind, AudioArtifact, MidiArtifact};
pub use params::{keys, GenerationConfig, ParamValue};
pub use prompt::{practice_prompt, Difficulty, Prompt};
pub use waveform::Waveform;
