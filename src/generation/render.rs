//! Derived artifact rendering on a bounded worker pool.
//!
//! Each generated audio file can have a visualisation rendered from it.
//! Renders are CPU-bound and independent, so they run in parallel on a
//! fixed number of scoped worker threads; the caller blocks until every
//! job has finished.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

use tracing::debug;

use crate::audio::read_wav;
use crate::cache::ArtifactStore;
use crate::error::{DaemonError, ErrorCode, Result};
use crate::types::ArtifactKind;

/// Default number of render workers.
pub const DEFAULT_RENDER_WORKERS: usize = 4;

/// Produces a derived file from an audio artifact.
pub trait ArtifactRenderer: Send + Sync {
    /// Kind of file this renderer writes.
    fn kind(&self) -> ArtifactKind;

    /// Renders `audio` into the already-created file at `output`.
    fn render(&self, audio: &Path, output: &Path) -> Result<()>;
}

/// Renders a bar-style waveform image as SVG.
#[derive(Debug, Clone)]
pub struct SvgWaveformRenderer {
    pub width: u32,
    pub height: u32,
    pub bars: usize,
    pub bar_color: String,
    pub background: String,
}

impl Default for SvgWaveformRenderer {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 200,
            bars: 60,
            bar_color: "#c026d3".to_string(),
            background: "#0f172a".to_string(),
        }
    }
}

impl SvgWaveformRenderer {
    /// Peak level per bar, in `[0, 1]`, across all channels.
    fn peaks(&self, audio: &Path) -> Result<Vec<f32>> {
        let wave = read_wav(audio)?;
        let frames = wave.frames();
        let bars = self.bars.max(1);
        let samples = wave.samples();

        Ok((0..bars)
            .map(|bar| {
                let start = bar * frames / bars;
                let end = ((bar + 1) * frames / bars).max(start);
                (start..end)
                    .flat_map(|i| samples.column(i).into_iter().copied())
                    .fold(0.0f32, |peak, s| peak.max(s.abs()))
                    .min(1.0)
            })
            .collect())
    }

    /// Builds the SVG document for the given peaks.
    pub fn svg(&self, peaks: &[f32]) -> String {
        let width = self.width as f32;
        let height = self.height as f32;
        let slot = width / peaks.len().max(1) as f32;
        let bar_width = (slot * 0.6).max(1.0);
        let mid = height / 2.0;

        let mut svg = String::new();
        let _ = write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = self.width,
            h = self.height
        );
        let _ = write!(
            svg,
            r#"<rect width="100%" height="100%" fill="{}"/>"#,
            self.background
        );
        for (i, peak) in peaks.iter().enumerate() {
            let bar_height = (peak * height * 0.9).max(1.0);
            let x = i as f32 * slot + (slot - bar_width) / 2.0;
            let y = mid - bar_height / 2.0;
            let _ = write!(
                svg,
                r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" rx="{:.1}" fill="{}"/>"#,
                x,
                y,
                bar_width,
                bar_height,
                bar_width / 2.0,
                self.bar_color
            );
        }
        svg.push_str("</svg>\n");
        svg
    }
}

impl ArtifactRenderer for SvgWaveformRenderer {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Visualization
    }

    fn render(&self, audio: &Path, output: &Path) -> Result<()> {
        let peaks = self.peaks(audio)?;
        std::fs::write(output, self.svg(&peaks)).map_err(|e| {
            DaemonError::artifact_io(format!("Failed to write {}", output.display()), e)
        })
    }
}

/// Fixed-size pool running one render job per audio artifact.
#[derive(Debug, Clone, Copy)]
pub struct RenderPool {
    workers: usize,
}

impl Default for RenderPool {
    fn default() -> Self {
        Self::new(DEFAULT_RENDER_WORKERS)
    }
}

impl RenderPool {
    /// Creates a pool with `workers` threads (at least one).
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Renders every input, registers the outputs and returns them in input
    /// order. Blocks until all jobs finish; fails if any job failed.
    pub fn render_all(
        &self,
        renderer: &dyn ArtifactRenderer,
        store: &ArtifactStore,
        inputs: &[PathBuf],
    ) -> Result<Vec<PathBuf>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let next = AtomicUsize::new(0);
        let (sender, receiver) = mpsc::channel::<(usize, Result<PathBuf>)>();

        std::thread::scope(|scope| {
            for _ in 0..self.workers.min(inputs.len()) {
                let sender = sender.clone();
                let next = &next;
                scope.spawn(move || loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(input) = inputs.get(index) else {
                        break;
                    };
                    let result = render_one(renderer, store, input);
                    if sender.send((index, result)).is_err() {
                        break;
                    }
                });
            }
        });
        drop(sender);

        let mut outputs: Vec<Option<PathBuf>> = vec![None; inputs.len()];
        let mut first_error: Option<(usize, DaemonError)> = None;
        for (index, result) in receiver {
            match result {
                Ok(path) => outputs[index] = Some(path),
                Err(e) => {
                    if first_error.as_ref().map_or(true, |(i, _)| index < *i) {
                        first_error = Some((index, e));
                    }
                }
            }
        }

        if let Some((_, e)) = first_error {
            return Err(e);
        }

        outputs
            .into_iter()
            .map(|o| {
                o.ok_or_else(|| {
                    DaemonError::new(ErrorCode::GenerationFailed, "A render job did not complete")
                })
            })
            .collect()
    }
}

fn render_one(renderer: &dyn ArtifactRenderer, store: &ArtifactStore, input: &Path) -> Result<PathBuf> {
    let output = store.create_path(renderer.kind())?;
    store.register(&output);
    renderer.render(input, &output)?;
    debug!(input = %input.display(), output = %output.display(), "Rendered artifact");
    Ok(output)
}
