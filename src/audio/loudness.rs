//! Loudness mastering applied to every generated output.
//!
//! The policy is fixed: bring the signal to `-LOUDNESS_HEADROOM_DB` dBFS
//! RMS, soft-compress with `tanh`, then hard-clip to `[-1, 1]`. Callers
//! cannot change it per request.

use crate::types::Waveform;

/// Target headroom below full scale, in dB.
pub const LOUDNESS_HEADROOM_DB: f32 = 16.0;

/// Whether the `tanh` compressor is applied after the gain stage.
pub const LOUDNESS_COMPRESSOR: bool = true;

/// Signals with RMS energy below this floor are left untouched.
pub const ENERGY_FLOOR: f32 = 2e-3;

/// Applies the mastering policy in place.
///
/// Returns the gain (linear) that was applied, or `None` if the input was
/// below the energy floor and left unchanged.
pub fn normalize_loudness(wave: &mut Waveform) -> Option<f32> {
    let energy = rms(wave);
    if energy < ENERGY_FLOOR {
        return None;
    }

    let input_db = 20.0 * energy.log10();
    let delta_db = -LOUDNESS_HEADROOM_DB - input_db;
    let gain = 10f32.powf(delta_db / 20.0);

    wave.samples_mut().mapv_inplace(|s| {
        let mut out = s * gain;
        if LOUDNESS_COMPRESSOR {
            out = out.tanh();
        }
        out.clamp(-1.0, 1.0)
    });

    Some(gain)
}

/// Root-mean-square level across all channels.
pub fn rms(wave: &Waveform) -> f32 {
    let samples = wave.samples();
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}
