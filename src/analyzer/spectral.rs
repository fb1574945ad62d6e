//! Power spectrum of a complex capture
//!
//! Uses FFT (Fast Fourier Transform) to turn an IQ buffer into power per
//! frequency bin, then reduces it to the handful of numbers the store keeps.
//!
//! # Bin layout
//!
//! For an N-point FFT of complex baseband samples, bin `k` sits at
//! `k * fs / N` above the centre frequency for `k < N/2` and at
//! `(k - N) * fs / N` (below centre) otherwise:
//!
//! ```text
//! bin      0 ........ N/2-1 | N/2 ........ N-1
//! offset   0 ...... +fs/2   | -fs/2 ...... -fs/N
//! ```
//!
//! # Units
//!
//! Raw bin power is `10·log10(|X[k]|² + 1e-10)`. The additive floor keeps
//! empty bins finite. A unit-amplitude tone on a bin has `|X|² = N²`, so
//! subtracting `20·log10(N)` normalises to dB relative to full scale and
//! adding the source's `full_scale_dbm` gives absolute dBm.

use crate::source::Waveform;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::Serialize;

/// Added to |X|² before the log
pub const POWER_FLOOR: f64 = 1e-10;

/// Drop from the peak that bounds the occupied bandwidth
pub const BANDWIDTH_DROP_DB: f64 = 3.0;

#[derive(Debug, Clone, Serialize)]
pub struct SpectrumMetrics {
    /// Per-bin power in dBm, natural FFT order
    #[serde(skip)]
    pub power_dbm: Vec<f64>,
    pub peak_power_dbm: f64,
    /// Mean of the per-bin dB values
    pub mean_power_dbm: f64,
    pub peak_bin: usize,
    /// Median bin power
    pub noise_floor_dbm: f64,
    pub bin_width_hz: f64,
    pub total_bins: usize,
}

impl SpectrumMetrics {
    pub fn snr_db(&self) -> f64 {
        self.peak_power_dbm - self.noise_floor_dbm
    }

    /// Peak position relative to the capture centre
    pub fn peak_offset_hz(&self) -> f64 {
        bin_offset(self.peak_bin, self.total_bins) as f64 * self.bin_width_hz
    }

    /// Width of the contiguous run of bins within 3 dB of the peak
    pub fn occupied_bandwidth_hz(&self) -> f64 {
        let n = self.total_bins as i64;
        if n == 0 {
            return 0.0;
        }
        let threshold = self.peak_power_dbm - BANDWIDTH_DROP_DB;
        let lowest = -(n / 2);
        let highest = (n - 1) / 2;
        let at = |offset: i64| self.power_dbm[offset.rem_euclid(n) as usize];

        let peak = bin_offset(self.peak_bin, self.total_bins);
        let mut lo = peak;
        while lo > lowest && at(lo - 1) >= threshold {
            lo -= 1;
        }
        let mut hi = peak;
        while hi < highest && at(hi + 1) >= threshold {
            hi += 1;
        }

        (hi - lo + 1) as f64 * self.bin_width_hz
    }
}

/// Forward FFT of the samples
pub fn fft(samples: &[Complex<f64>]) -> Vec<Complex<f64>> {
    let mut buffer = samples.to_vec();
    if buffer.is_empty() {
        return buffer;
    }
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(buffer.len());
    fft.process(&mut buffer);
    buffer
}

/// Magnitude-squared spectrum in dB with the additive floor
pub fn power_spectrum_db(spectrum: &[Complex<f64>]) -> Vec<f64> {
    spectrum
        .iter()
        .map(|x| 10.0 * (x.norm_sqr() + POWER_FLOOR).log10())
        .collect()
}

/// Signed bin offset from the centre (FFT order to frequency order)
pub fn bin_offset(bin: usize, total_bins: usize) -> i64 {
    if bin < (total_bins + 1) / 2 {
        bin as i64
    } else {
        bin as i64 - total_bins as i64
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Reduce an FFT to spectrum metrics. `None` for an empty spectrum.
pub fn analyze_spectrum(
    spectrum: &[Complex<f64>],
    sample_rate_hz: f64,
    full_scale_dbm: f64,
) -> Option<SpectrumMetrics> {
    if spectrum.is_empty() {
        return None;
    }

    let n = spectrum.len();
    let normalise = 20.0 * (n as f64).log10();
    let power_dbm: Vec<f64> = power_spectrum_db(spectrum)
        .into_iter()
        .map(|db| db - normalise + full_scale_dbm)
        .collect();

    // First maximum wins on ties
    let (peak_bin, peak_power_dbm) = power_dbm
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best });

    let mean_power_dbm = power_dbm.iter().sum::<f64>() / n as f64;
    let noise_floor_dbm = median(&power_dbm);

    Some(SpectrumMetrics {
        peak_power_dbm,
        mean_power_dbm,
        peak_bin,
        noise_floor_dbm,
        bin_width_hz: sample_rate_hz / n as f64,
        total_bins: n,
        power_dbm,
    })
}

/// Full analysis of a capture
pub fn analyze(waveform: &Waveform) -> Option<SpectrumMetrics> {
    analyze_spectrum(&fft(&waveform.samples), waveform.sample_rate_hz, waveform.full_scale_dbm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn tone(bin: f64, amplitude: f64, n: usize) -> Vec<Complex<f64>> {
        (0..n)
            .map(|i| Complex::from_polar(amplitude, 2.0 * PI * bin * i as f64 / n as f64))
            .collect()
    }

    fn waveform(samples: Vec<Complex<f64>>) -> Waveform {
        Waveform {
            center_freq_hz: 100e6,
            sample_rate_hz: 1.024e6,
            full_scale_dbm: 0.0,
            samples,
        }
    }

    // ==========================================================================
    // BIN LAYOUT TESTS
    // ==========================================================================
    //
    // Complex FFT output is not in frequency order. The upper half of the
    // bins are negative frequencies, so bin N-1 is one bin *below* centre.
    // ==========================================================================

    #[test]
    fn test_bin_offset_even() {
        assert_eq!(bin_offset(0, 8), 0);
        assert_eq!(bin_offset(3, 8), 3);
        assert_eq!(bin_offset(4, 8), -4);
        assert_eq!(bin_offset(7, 8), -1);
    }

    #[test]
    fn test_bin_offset_odd() {
        // Matches numpy.fft.fftfreq(5) = [0, 1, 2, -2, -1]
        let offsets: Vec<i64> = (0..5).map(|b| bin_offset(b, 5)).collect();
        assert_eq!(offsets, vec![0, 1, 2, -2, -1]);
    }

    // ==========================================================================
    // POWER SPECTRUM TESTS
    // ==========================================================================

    #[test]
    fn test_power_floor_keeps_zero_bins_finite() {
        let db = power_spectrum_db(&[Complex::new(0.0, 0.0)]);
        assert_eq!(db[0], -100.0);
    }

    #[test]
    fn test_power_spectrum_deterministic() {
        let samples = tone(5.0, 0.5, 64);
        assert_eq!(power_spectrum_db(&fft(&samples)), power_spectrum_db(&fft(&samples)));
    }

    #[test]
    fn test_unit_tone_is_full_scale() {
        let metrics = analyze(&waveform(tone(10.0, 1.0, 256))).unwrap();

        assert_eq!(metrics.peak_bin, 10);
        assert!(
            metrics.peak_power_dbm.abs() < 1e-6,
            "unit tone should read 0 dBm at full_scale 0, got {}",
            metrics.peak_power_dbm
        );
        assert_eq!(metrics.total_bins, 256);
    }

    #[test]
    fn test_amplitude_scales_power() {
        // -20 dB amplitude is -20 dB power on the bin
        let metrics = analyze(&waveform(tone(10.0, 0.1, 256))).unwrap();
        assert!((metrics.peak_power_dbm + 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_negative_offset_tone() {
        let metrics = analyze(&waveform(tone(-5.0, 1.0, 256))).unwrap();

        assert_eq!(metrics.peak_bin, 251);
        assert_eq!(metrics.peak_offset_hz(), -5.0 * 4000.0);
    }

    #[test]
    fn test_silence_has_flat_floor() {
        let metrics = analyze(&waveform(vec![Complex::new(0.0, 0.0); 128])).unwrap();

        assert!(metrics.peak_power_dbm.is_finite());
        assert_eq!(metrics.peak_bin, 0, "ties resolve to the first bin");
        assert_eq!(metrics.snr_db(), 0.0);
        assert!((metrics.mean_power_dbm - metrics.noise_floor_dbm).abs() < 1e-9);
    }

    #[test]
    fn test_empty_waveform_has_no_metrics() {
        assert!(analyze(&waveform(Vec::new())).is_none());
    }

    // ==========================================================================
    // OCCUPIED BANDWIDTH TESTS
    // ==========================================================================

    #[test]
    fn test_single_bin_bandwidth() {
        let metrics = analyze(&waveform(tone(20.0, 1.0, 256))).unwrap();
        assert_eq!(metrics.occupied_bandwidth_hz(), metrics.bin_width_hz);
    }

    #[test]
    fn test_bandwidth_spans_centre() {
        // Three equal tones at -1, 0, +1 bins read as one three-bin emitter
        let n = 256;
        let samples: Vec<Complex<f64>> = tone(-1.0, 1.0, n)
            .into_iter()
            .zip(tone(0.0, 1.0, n))
            .zip(tone(1.0, 1.0, n))
            .map(|((a, b), c)| a + b + c)
            .collect();
        let metrics = analyze(&waveform(samples)).unwrap();

        assert_eq!(metrics.occupied_bandwidth_hz(), 3.0 * metrics.bin_width_hz);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }
}
