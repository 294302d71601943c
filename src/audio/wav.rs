//! WAV file reader/writer.
//!
//! Reads and writes multi-channel waveforms using the hound crate.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use ndarray::Array2;

use crate::error::{DaemonError, ErrorCode, Result};
use crate::types::Waveform;

/// Writes a waveform to a 32-bit float WAV file.
///
/// # Example
///
/// ```ignore
/// use tunecraft::audio::write_wav;
/// use tunecraft::types::Waveform;
///
/// let wave = Waveform::mono(vec![0.0, 0.5, -0.5, 0.0], 32000);
/// write_wav(&wave, Path::new("/tmp/test.wav"))?;
/// ```
pub fn write_wav(wave: &Waveform, path: &Path) -> Result<()> {
    let mut writer = WavWriter::create(path, spec_for(wave)?).map_err(|e| {
        DaemonError::new(
            ErrorCode::ArtifactIoFailed,
            format!("Failed to create WAV file {}: {}", path.display(), e),
        )
    })?;

    write_frames(wave, &mut writer)?;

    writer.finalize().map_err(|e| {
        DaemonError::new(
            ErrorCode::ArtifactIoFailed,
            format!("Failed to finalize WAV file: {}", e),
        )
    })?;

    Ok(())
}

/// Reads a WAV file into a waveform, converting integer samples to `[-1, 1]`.
pub fn read_wav(path: &Path) -> Result<Waveform> {
    let mut reader = WavReader::open(path).map_err(|e| {
        DaemonError::new(
            ErrorCode::ArtifactIoFailed,
            format!("Failed to open WAV file {}: {}", path.display(), e),
        )
    })?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| read_error(path, e))?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| read_error(path, e))?
        }
    };

    let frames = interleaved.len() / channels;
    let samples = Array2::from_shape_fn((channels, frames), |(c, i)| interleaved[i * channels + c]);
    Ok(Waveform::new(samples, spec.sample_rate))
}

fn spec_for(wave: &Waveform) -> Result<WavSpec> {
    let channels = u16::try_from(wave.channels())
        .ok()
        .filter(|c| *c > 0)
        .ok_or_else(|| {
            DaemonError::generation_failed(format!(
                "Cannot write a waveform with {} channels",
                wave.channels()
            ))
        })?;
    Ok(WavSpec {
        channels,
        sample_rate: wave.sample_rate(),
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    })
}

fn write_frames<W>(wave: &Waveform, writer: &mut WavWriter<W>) -> Result<()>
where
    W: std::io::Write + std::io::Seek,
{
    let samples = wave.samples();
    for frame in 0..wave.frames() {
        for channel in 0..wave.channels() {
            writer.write_sample(samples[[channel, frame]]).map_err(|e| {
                DaemonError::new(
                    ErrorCode::ArtifactIoFailed,
                    format!("Failed to write sample: {}", e),
                )
            })?;
        }
    }
    Ok(())
}

fn read_error(path: &Path, e: hound::Error) -> DaemonError {
    DaemonError::new(
        ErrorCode::ArtifactIoFailed,
        format!("Failed to read samples from {}: {}", path.display(), e),
    )
}
