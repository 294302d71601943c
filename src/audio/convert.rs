//! Conversion of reference audio into the format a model expects.
//!
//! Melody and continuation prompts arrive at whatever rate and channel
//! layout the user recorded. Before they reach a model they are cropped to
//! the requested duration, mixed to the model's channel count and resampled
//! to the model's sample rate.

use ndarray::{s, Array2, Axis};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{DaemonError, Result};
use crate::types::Waveform;

/// Keeps at most `duration_sec` seconds from the start of the waveform.
pub fn crop(wave: Waveform, duration_sec: f64) -> Waveform {
    let max_frames = (wave.sample_rate() as f64 * duration_sec).floor() as usize;
    if wave.frames() <= max_frames {
        return wave;
    }
    let sample_rate = wave.sample_rate();
    let samples = wave.samples().slice(s![.., ..max_frames]).to_owned();
    Waveform::new(samples, sample_rate)
}

/// Mixes the waveform to `channels` channels.
///
/// Mono targets average all input channels; a mono input is duplicated to
/// fill wider targets. Other layouts keep the first `channels` channels.
pub fn convert_channels(wave: Waveform, channels: usize) -> Waveform {
    let current = wave.channels();
    if current == channels || channels == 0 {
        return wave;
    }
    let sample_rate = wave.sample_rate();
    let samples = wave.into_samples();

    let converted = if channels == 1 {
        samples
            .mean_axis(Axis(0))
            .map(|m| m.insert_axis(Axis(0)))
            .unwrap_or_else(|| Array2::zeros((1, 0)))
    } else if current == 1 {
        let row = samples.row(0);
        Array2::from_shape_fn((channels, row.len()), |(_, i)| row[i])
    } else if current > channels {
        samples.slice(s![..channels, ..]).to_owned()
    } else {
        Array2::from_shape_fn((channels, samples.ncols()), |(c, i)| {
            samples[[c.min(current - 1), i]]
        })
    };

    Waveform::new(converted, sample_rate)
}

/// Resamples the waveform to `target_rate` Hz.
pub fn resample(wave: Waveform, target_rate: u32) -> Result<Waveform> {
    if wave.sample_rate() == target_rate || wave.frames() == 0 {
        return Ok(Waveform::new(wave.into_samples(), target_rate));
    }

    let ratio = target_rate as f64 / wave.sample_rate() as f64;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, wave.frames(), wave.channels())
        .map_err(|e| DaemonError::invalid_configuration(format!("Cannot resample melody: {}", e)))?;

    let input: Vec<Vec<f32>> = wave
        .samples()
        .outer_iter()
        .map(|row| row.to_vec())
        .collect();

    let output = resampler
        .process(&input, None)
        .map_err(|e| DaemonError::invalid_configuration(format!("Cannot resample melody: {}", e)))?;

    let frames = output.first().map(|c| c.len()).unwrap_or(0);
    let samples = Array2::from_shape_fn((output.len(), frames), |(c, i)| output[c][i]);
    Ok(Waveform::new(samples, target_rate))
}

/// Crops, remixes and resamples reference audio for a model.
pub fn convert_audio(
    wave: Waveform,
    duration_sec: Option<f64>,
    target_rate: u32,
    target_channels: usize,
) -> Result<Waveform> {
    let wave = match duration_sec {
        Some(d) => crop(wave, d),
        None => wave,
    };
    let wave = convert_channels(wave, target_channels);
    resample(wave, target_rate)
}
