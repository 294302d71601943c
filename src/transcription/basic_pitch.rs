//! Note prediction through the `basic-pitch` command-line tool.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use super::adapter::Transcriber;
use super::midi::{read_midi, NoteEvent};
use crate::error::{DaemonError, Result};

/// Default executable name.
pub const DEFAULT_BASIC_PITCH_COMMAND: &str = "basic-pitch";

/// Runs `<program> <output dir> <audio>` and reads back the MIDI file the
/// tool writes as `<output dir>/<audio stem>_basic_pitch.mid`.
#[derive(Debug, Clone)]
pub struct BasicPitchCommand {
    program: PathBuf,
}

impl Default for BasicPitchCommand {
    fn default() -> Self {
        Self::new(DEFAULT_BASIC_PITCH_COMMAND)
    }
}

impl BasicPitchCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Path of the file the tool writes for `audio` inside `out_dir`.
    fn output_path(out_dir: &Path, audio: &Path) -> Result<PathBuf> {
        let stem = audio.file_stem().and_then(|s| s.to_str()).ok_or_else(|| {
            DaemonError::transcription_failed(format!("Invalid audio path: {}", audio.display()))
        })?;
        Ok(out_dir.join(format!("{}_basic_pitch.mid", stem)))
    }
}

impl Transcriber for BasicPitchCommand {
    fn predict(&self, audio: &Path) -> Result<Vec<NoteEvent>> {
        if !audio.is_file() {
            return Err(DaemonError::transcription_failed(format!(
                "Audio file not found: {}",
                audio.display()
            )));
        }

        let out_dir = tempfile::tempdir().map_err(|e| {
            DaemonError::transcription_failed(format!("Cannot create work directory: {}", e))
        })?;

        info!(program = %self.program.display(), audio = %audio.display(), "Running basic-pitch");
        let output = Command::new(&self.program)
            .arg(out_dir.path())
            .arg(audio)
            .output()
            .map_err(|e| {
                DaemonError::transcription_failed(format!(
                    "Cannot run {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DaemonError::transcription_failed(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        let midi_path = Self::output_path(out_dir.path(), audio)?;
        let notes = read_midi(&midi_path)?;
        debug!(notes = notes.len(), "basic-pitch finished");
        Ok(notes)
    }
}
