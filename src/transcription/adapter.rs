//! Audio-to-MIDI transcription into registered temporary artifacts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use super::midi::{write_midi, NoteEvent};
use crate::cache::ArtifactStore;
use crate::error::{DaemonError, ErrorCode, Result};
use crate::types::{ArtifactKind, MidiArtifact};

/// Predicts note events from an audio file.
pub trait Transcriber: Send + Sync {
    fn predict(&self, audio: &Path) -> Result<Vec<NoteEvent>>;
}

/// Turns audio files into `.mid` artifacts owned by the artifact store.
pub struct TranscriptionAdapter {
    transcriber: Arc<dyn Transcriber>,
    store: Arc<ArtifactStore>,
}

impl TranscriptionAdapter {
    pub fn new(transcriber: Arc<dyn Transcriber>, store: Arc<ArtifactStore>) -> Self {
        Self { transcriber, store }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Transcribes one audio file. Silent input yields a valid MIDI file
    /// with no notes.
    pub fn transcribe(&self, audio: &Path) -> Result<MidiArtifact> {
        let notes = self.transcriber.predict(audio).map_err(as_transcription_error)?;

        let path = self
            .store
            .create_path(ArtifactKind::Midi)
            .map_err(as_transcription_error)?;
        self.store.register(&path);

        if let Err(e) = write_midi(&notes, &path) {
            warn!(path = %path.display(), error = %e, "MIDI write failed; file left for the sweeper");
            return Err(as_transcription_error(e));
        }

        info!(
            source = %audio.display(),
            output = %path.display(),
            notes = notes.len(),
            "Transcription complete"
        );

        Ok(MidiArtifact {
            path,
            source: audio.to_path_buf(),
            note_count: notes.len(),
        })
    }

    /// Transcribes several files in order; the first failure aborts.
    pub fn transcribe_batch(&self, audios: &[PathBuf]) -> Result<Vec<MidiArtifact>> {
        audios.iter().map(|audio| self.transcribe(audio)).collect()
    }
}

fn as_transcription_error(e: DaemonError) -> DaemonError {
    if e.code == ErrorCode::TranscriptionFailed {
        e
    } else {
        DaemonError::transcription_failed(e.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{loudness::rms, read_wav, write_wav};
    use crate::cache::DEFAULT_LIFETIME;
    use crate::transcription::midi::read_midi;
    use crate::types::Waveform;
    use tempfile::tempdir;

    /// One note per loud file, none for silence.
    struct EnergyTranscriber;

    impl Transcriber for EnergyTranscriber {
        fn predict(&self, audio: &Path) -> Result<Vec<NoteEvent>> {
            let wave = read_wav(audio)?;
            if rms(&wave) < 1e-4 {
                return Ok(Vec::new());
            }
            Ok(vec![NoteEvent::new(0.0, wave.duration_sec() as f64, 69, 100)])
        }
    }

    struct FailingTranscriber;

    impl Transcriber for FailingTranscriber {
        fn predict(&self, _audio: &Path) -> Result<Vec<NoteEvent>> {
            Err(DaemonError::generation_failed("model crashed"))
        }
    }

    fn setup(transcriber: Arc<dyn Transcriber>) -> (tempfile::TempDir, TranscriptionAdapter) {
        let dir = tempdir().unwrap();
        let store = Arc::new(ArtifactStore::new(dir.path().join("artifacts"), DEFAULT_LIFETIME));
        (dir, TranscriptionAdapter::new(transcriber, store))
    }

    #[test]
    fn silent_input_gives_empty_midi() {
        let (dir, adapter) = setup(Arc::new(EnergyTranscriber));
        let audio = dir.path().join("silence.wav");
        write_wav(&Waveform::mono(vec![0.0; 16000], 16000), &audio).unwrap();

        let artifact = adapter.transcribe(&audio).unwrap();

        assert_eq!(artifact.note_count, 0);
        assert_eq!(artifact.path.extension().unwrap(), "mid");
        assert!(adapter.store().contains(&artifact.path));
        assert!(read_midi(&artifact.path).unwrap().is_empty());
        assert!(artifact.label().starts_with("Download MIDI file "));
    }

    #[test]
    fn tone_gives_one_note() {
        let (dir, adapter) = setup(Arc::new(EnergyTranscriber));
        let audio = dir.path().join("tone.wav");
        let samples = (0..16000).map(|i| (i as f32 * 0.17).sin() * 0.5).collect();
        write_wav(&Waveform::mono(samples, 16000), &audio).unwrap();

        let artifact = adapter.transcribe(&audio).unwrap();
        assert_eq!(artifact.note_count, 1);
        assert_eq!(artifact.source, audio);
        assert_eq!(read_midi(&artifact.path).unwrap()[0].pitch, 69);
    }

    #[test]
    fn failures_become_transcription_errors() {
        let (dir, adapter) = setup(Arc::new(FailingTranscriber));
        let err = adapter.transcribe(&dir.path().join("a.wav")).unwrap_err();
        assert_eq!(err.code, ErrorCode::TranscriptionFailed);
        assert!(err.message.contains("model crashed"));
        assert!(adapter.store().is_empty());
    }

    #[test]
    fn batch_produces_distinct_files() {
        let (dir, adapter) = setup(Arc::new(EnergyTranscriber));
        let inputs: Vec<_> = (0..3)
            .map(|i| {
                let path = dir.path().join(format!("{}.wav", i));
                write_wav(&Waveform::mono(vec![0.0; 800], 8000), &path).unwrap();
                path
            })
            .collect();

        let artifacts = adapter.transcribe_batch(&inputs).unwrap();
        assert_eq!(artifacts.len(), 3);
        assert_ne!(artifacts[0].path, artifacts[1].path);
        assert_eq!(adapter.store().len(), 3);
    }
}
