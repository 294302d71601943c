//! Transcription module.
//!
//! Converts generated audio into Standard MIDI Files registered with the
//! artifact store.

pub mod adapter;
pub mod basic_pitch;
pub mod midi;

// Re-export commonly used items
pub use adapter::{Transcriber, TranscriptionAdapter};
pub use basic_pitch::{BasicPitchCommand, DEFAULT_BASIC_PITCH_COMMAND};
pub use midi::{decode_notes, encode_notes, read_midi, write_midi, NoteEvent};
