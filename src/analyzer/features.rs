//! Feature vector for classification
//!
//! Fourteen scalar features in three groups: time-domain statistics of the
//! raw IQ buffer, statistics of the FFT magnitude, and modulation cues from
//! the envelope and instantaneous frequency. The order of [`FEATURE_NAMES`]
//! is the order stored in `ml_features.feature_vector`.

use rustfft::num_complex::Complex;
use serde::Serialize;

pub const FEATURE_COUNT: usize = 14;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "mean_amplitude",
    "std_dev",
    "variance",
    "max_amplitude",
    "min_amplitude",
    "spectral_centroid",
    "spectral_spread",
    "mean_magnitude",
    "std_magnitude",
    "amplitude_std",
    "inst_freq_std",
    "phase_std",
    "envelope_mean",
    "inst_freq_mean",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureVector {
    // Time domain
    pub mean_amplitude: f64,
    /// Std of the complex samples, sqrt(E|x - mean|²)
    pub std_dev: f64,
    pub variance: f64,
    pub max_amplitude: f64,
    pub min_amplitude: f64,

    // Spectral, over FFT bin index weighted by |X|
    pub spectral_centroid: f64,
    pub spectral_spread: f64,
    pub mean_magnitude: f64,
    pub std_magnitude: f64,

    // Modulation
    pub amplitude_std: f64,
    /// Radians per sample
    pub inst_freq_std: f64,
    pub phase_std: f64,
    pub envelope_mean: f64,
    pub inst_freq_mean: f64,
}

impl FeatureVector {
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.mean_amplitude,
            self.std_dev,
            self.variance,
            self.max_amplitude,
            self.min_amplitude,
            self.spectral_centroid,
            self.spectral_spread,
            self.mean_magnitude,
            self.std_magnitude,
            self.amplitude_std,
            self.inst_freq_std,
            self.phase_std,
            self.envelope_mean,
            self.inst_freq_mean,
        ]
    }

    /// Envelope variation relative to its mean. Near zero for constant-envelope
    /// modulations (CW, FM, FSK).
    pub fn amplitude_cv(&self) -> f64 {
        if self.envelope_mean > 0.0 {
            self.amplitude_std / self.envelope_mean
        } else {
            0.0
        }
    }
}

fn mean_std(values: impl Iterator<Item = f64> + Clone) -> (f64, f64) {
    let (count, sum) = values.clone().fold((0usize, 0.0), |(n, s), v| (n + 1, s + v));
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f64;
    let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
    (mean, var.sqrt())
}

/// Extract features from a capture and its FFT. `None` with fewer than two
/// samples, since instantaneous frequency needs a difference.
pub fn extract(samples: &[Complex<f64>], spectrum: &[Complex<f64>]) -> Option<FeatureVector> {
    if samples.len() < 2 {
        return None;
    }
    let n = samples.len() as f64;

    let amplitudes: Vec<f64> = samples.iter().map(|s| s.norm()).collect();
    let (mean_amplitude, amplitude_std) = mean_std(amplitudes.iter().copied());
    let max_amplitude = amplitudes.iter().copied().fold(0.0, f64::max);
    let min_amplitude = amplitudes.iter().copied().fold(f64::INFINITY, f64::min);

    let sample_mean = samples.iter().sum::<Complex<f64>>() / n;
    let variance = samples.iter().map(|s| (s - sample_mean).norm_sqr()).sum::<f64>() / n;

    let magnitudes: Vec<f64> = spectrum.iter().map(|x| x.norm()).collect();
    let (mean_magnitude, std_magnitude) = mean_std(magnitudes.iter().copied());
    let total: f64 = magnitudes.iter().sum();
    let (spectral_centroid, spectral_spread) = if total > 0.0 {
        let centroid = magnitudes
            .iter()
            .enumerate()
            .map(|(k, m)| k as f64 * m)
            .sum::<f64>()
            / total;
        let spread = (magnitudes
            .iter()
            .enumerate()
            .map(|(k, m)| (k as f64 - centroid).powi(2) * m)
            .sum::<f64>()
            / total)
            .sqrt();
        (centroid, spread)
    } else {
        (0.0, 0.0)
    };

    let (_, phase_std) = mean_std(samples.iter().map(|s| s.arg()));

    // Wrapped phase step between neighbours, same as differencing the unwrapped phase
    let (inst_freq_mean, inst_freq_std) =
        mean_std(samples.windows(2).map(|w| (w[1] * w[0].conj()).arg()));

    Some(FeatureVector {
        mean_amplitude,
        std_dev: variance.sqrt(),
        variance,
        max_amplitude,
        min_amplitude,
        spectral_centroid,
        spectral_spread,
        mean_magnitude,
        std_magnitude,
        amplitude_std,
        inst_freq_std,
        phase_std,
        envelope_mean: mean_amplitude,
        inst_freq_mean,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::spectral::fft;
    use std::f64::consts::PI;

    fn tone(bin: f64, n: usize) -> Vec<Complex<f64>> {
        (0..n)
            .map(|i| Complex::from_polar(1.0, 2.0 * PI * bin * i as f64 / n as f64))
            .collect()
    }

    #[test]
    fn test_vector_order_matches_names() {
        let features = FeatureVector {
            spectral_centroid: 5.0,
            inst_freq_mean: 13.0,
            ..FeatureVector::default()
        };
        let values = features.to_vec();

        assert_eq!(values.len(), FEATURE_NAMES.len());
        assert_eq!(values[5], 5.0);
        assert_eq!(FEATURE_NAMES[13], "inst_freq_mean");
        assert_eq!(values[13], 13.0);
    }

    #[test]
    fn test_pure_tone_features() {
        let samples = tone(16.0, 256);
        let features = extract(&samples, &fft(&samples)).unwrap();

        assert!((features.mean_amplitude - 1.0).abs() < 1e-9);
        assert!(features.amplitude_std < 1e-9);
        assert!(features.amplitude_cv() < 1e-9);
        assert!(features.inst_freq_std < 1e-9);
        // 16 bins of 256 is 2π/16 rad per sample
        assert!((features.inst_freq_mean - 2.0 * PI / 16.0).abs() < 1e-9);
        assert!((features.spectral_centroid - 16.0).abs() < 1e-6);
    }

    #[test]
    fn test_am_has_envelope_variation() {
        let samples: Vec<Complex<f64>> = (0..512)
            .map(|i| {
                let t = i as f64 / 512.0;
                Complex::from_polar(1.0 + 0.5 * (2.0 * PI * 4.0 * t).cos(), 0.0)
            })
            .collect();
        let features = extract(&samples, &fft(&samples)).unwrap();

        assert!(features.amplitude_cv() > 0.3);
    }

    #[test]
    fn test_too_short_for_features() {
        let one = vec![Complex::new(1.0, 0.0)];
        assert!(extract(&one, &fft(&one)).is_none());
    }

    #[test]
    fn test_silence_is_all_zero() {
        let samples = vec![Complex::new(0.0, 0.0); 64];
        let features = extract(&samples, &fft(&samples)).unwrap();
        assert!(features.to_vec().iter().all(|v| *v == 0.0));
    }
}
