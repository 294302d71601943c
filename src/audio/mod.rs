//! Audio module.
//!
//! Provides WAV file I/O, the fixed loudness mastering policy and
//! conversion of reference audio for melody conditioning.

pub mod convert;
pub mod loudness;
pub mod wav;

// Re-export commonly used items
pub use convert::convert_audio;
pub use loudness::{normalize_loudness, LOUDNESS_COMPRESSOR, LOUDNESS_HEADROOM_DB};
pub use wav::{read_wav, write_wav};
