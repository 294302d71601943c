//! Cache module for temporary artifact storage.
//!
//! Provides time-based reclamation of generated files.

pub mod artifacts;

// Re-export commonly used types
pub use artifacts::{ArtifactStore, Clock, SystemClock, DEFAULT_LIFETIME};
