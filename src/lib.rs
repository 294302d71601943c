//! tunecraft: music generation daemon.
//!
//! Routes generation requests to pretrained audio models by identifier,
//! owns every temporary file it produces until a time-based sweep
//! reclaims it, transcribes audio to MIDI and turns images into prompts.
//!
//! # Modules
//!
//! - [`models`]: Model registry, single-residency cache and backends
//! - [`generation`]: Generation dispatcher, cancellation and render pool
//! - [`cache`]: Artifact store with time-based reclamation
//! - [`transcription`]: Audio-to-MIDI adapter
//! - [`captioning`]: Image captioning and prompt improvement
//! - [`rpc`]: JSON-RPC server over stdio
//! - [`config`]: Runtime configuration (DaemonConfig)
//! - [`error`]: Error types and codes (DaemonError, ErrorCode)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tunecraft::cache::{ArtifactStore, DEFAULT_LIFETIME};
//! use tunecraft::generation::{
//!     CancellationToken, DispatcherOptions, GenerationDispatcher, ProgressMonitor,
//! };
//! use tunecraft::models::{ModelCache, ModelRegistry, SyntheticModelLoader};
//! use tunecraft::types::{keys, GenerationConfig};
//!
//! let store = Arc::new(ArtifactStore::new("/tmp/tunecraft", DEFAULT_LIFETIME));
//! let dispatcher = GenerationDispatcher::new(
//!     ModelRegistry::new(),
//!     ModelCache::new(Arc::new(SyntheticModelLoader)),
//!     store,
//!     DispatcherOptions::default(),
//! );
//!
//! let config = GenerationConfig::new().with(keys::DURATION, 10);
//! let outcome = dispatcher.generate(
//!     "facebook/musicgen-large",
//!     &config,
//!     Some("lofi hip hop beats to relax to"),
//!     None,
//!     2,
//!     &mut ProgressMonitor::new(&CancellationToken::new(), &mut |_, _| {}),
//! )?;
//! ```

pub mod audio;
pub mod cache;
pub mod captioning;
pub mod cli;
pub mod config;
pub mod error;
pub mod generation;
pub mod models;
pub mod rpc;
pub mod transcription;
pub mod types;

// Re-export commonly used types at crate root for convenience
pub use config::DaemonConfig;
pub use error::{DaemonError, ErrorCode, Result};
pub use types::{AudioArtifact, GenerationConfig, MidiArtifact, Prompt, Waveform};
