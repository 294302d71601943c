//! Waveform type holding multi-channel audio.

use ndarray::{Array1, Array2, Axis};

/// Audio samples laid out as `(channels, frames)` plus their sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Array2<f32>,
    sample_rate: u32,
}

impl Waveform {
    /// Creates a waveform from a `(channels, frames)` array.
    pub fn new(samples: Array2<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Creates a single-channel waveform.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(Array1::from(samples).insert_axis(Axis(0)), sample_rate)
    }

    /// Creates a silent waveform.
    pub fn silence(channels: usize, frames: usize, sample_rate: u32) -> Self {
        Self::new(Array2::zeros((channels, frames)), sample_rate)
    }

    /// Returns the sample array.
    pub fn samples(&self) -> &Array2<f32> {
        &self.samples
    }

    /// Returns the sample array mutably.
    pub fn samples_mut(&mut self) -> &mut Array2<f32> {
        &mut self.samples
    }

    /// Consumes the waveform and returns the sample array.
    pub fn into_samples(self) -> Array2<f32> {
        self.samples
    }

    /// Returns the sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of channels.
    pub fn channels(&self) -> usize {
        self.samples.nrows()
    }

    /// Returns the number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.ncols()
    }

    /// Returns the duration in seconds.
    pub fn duration_sec(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f32 / self.sample_rate as f32
    }

    /// Returns true if every sample is finite.
    pub fn is_finite(&self) -> bool {
        self.samples.iter().all(|s| s.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_shape() {
        let wave = Waveform::mono(vec![0.0; 32000], 32000);
        assert_eq!(wave.channels(), 1);
        assert_eq!(wave.frames(), 32000);
        assert_eq!(wave.duration_sec(), 1.0);
    }

    #[test]
    fn silence_is_finite() {
        let wave = Waveform::silence(2, 100, 48000);
        assert_eq!(wave.channels(), 2);
        assert!(wave.is_finite());
    }

    #[test]
    fn detects_nan() {
        let wave = Waveform::mono(vec![0.0, f32::NAN], 16000);
        assert!(!wave.is_finite());
    }
}
