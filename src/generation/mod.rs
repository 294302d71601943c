//! Audio generation module.
//!
//! Provides the generation dispatcher, cooperative cancellation and the
//! render pool for derived artifacts.

pub mod cancel;
pub mod dispatcher;
pub mod render;

// Re-export commonly used items
pub use cancel::{CancellationToken, ProgressMonitor};
pub use dispatcher::{
    DispatcherOptions, GenerationDispatcher, GenerationOutcome, GenerationRequest,
    GenerationResult, DEFAULT_MAX_OUTPUTS,
};
pub use render::{ArtifactRenderer, RenderPool, SvgWaveformRenderer, DEFAULT_RENDER_WORKERS};
