//! Artifact types describing files produced for download.
//!
//! Every artifact is a temporary file owned by the artifact store from the
//! moment it is registered; these structs only describe it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Kind of temporary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Generated audio (WAV).
    Audio,
    /// Waveform visualisation derived from an audio artifact (SVG).
    Visualization,
    /// Transcribed note events (Standard MIDI File).
    Midi,
}

impl ArtifactKind {
    /// Returns the string representation of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Audio => "audio",
            ArtifactKind::Visualization => "visualization",
            ArtifactKind::Midi => "midi",
        }
    }

    /// Returns the file suffix used for this kind, including the dot.
    pub fn suffix(&self) -> &'static str {
        match self {
            ArtifactKind::Audio => ".wav",
            ArtifactKind::Visualization => ".svg",
            ArtifactKind::Midi => ".mid",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A generated audio file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioArtifact {
    /// Path to the WAV file.
    pub path: PathBuf,

    /// Sample rate the file was written at.
    pub sample_rate: u32,

    /// Number of channels in the file.
    pub channels: u16,

    /// Length of the audio in seconds.
    pub duration_sec: f32,

    /// Derived waveform visualisation, when rendering was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization: Option<PathBuf>,
}

impl AudioArtifact {
    /// Returns the download label for this file.
    pub fn label(&self) -> String {
        download_label(ArtifactKind::Audio, &self.path)
    }
}

/// A transcribed MIDI file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiArtifact {
    /// Path to the `.mid` file.
    pub path: PathBuf,

    /// Audio file the notes were transcribed from.
    pub source: PathBuf,

    /// Number of notes in the file (zero for silent input).
    pub note_count: usize,
}

impl MidiArtifact {
    /// Returns the download label for this file.
    pub fn label(&self) -> String {
        download_label(ArtifactKind::Midi, &self.path)
    }
}

/// Builds a download label from a file name, e.g. `Download MIDI file tc-1a2b.mid`.
pub fn download_label(kind: ArtifactKind, path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let what = match kind {
        ArtifactKind::Audio => "audio file",
        ArtifactKind::Visualization => "waveform",
        ArtifactKind::Midi => "MIDI file",
    };
    format!("Download {} {}", what, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midi_label_uses_file_name() {
        let artifact = MidiArtifact {
            path: PathBuf::from("/tmp/artifacts/tc-abc.mid"),
            source: PathBuf::from("/tmp/artifacts/tc-abc.wav"),
            note_count: 0,
        };
        assert_eq!(artifact.label(), "Download MIDI file tc-abc.mid");
    }

    #[test]
    fn kind_suffixes() {
        assert_eq!(ArtifactKind::Audio.suffix(), ".wav");
        assert_eq!(ArtifactKind::Visualization.suffix(), ".svg");
        assert_eq!(ArtifactKind::Midi.suffix(), ".mid");
    }
}
