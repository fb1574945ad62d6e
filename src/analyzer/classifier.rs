//! Signal classification
//!
//! [`Classifier`] is the seam a trained model would plug into. The default
//! [`BandClassifier`] looks the detected frequency up in a table of common
//! allocations and reads the modulation family off the feature vector.

use super::features::FeatureVector;
use super::spectral::SpectrumMetrics;
use crate::model::UNKNOWN_SIGNAL_TYPE;
use crate::source::Waveform;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub signal_type: String,
    pub modulation: Option<String>,
    /// Always in [0, 1]
    pub confidence: f64,
}

/// Everything the pipeline knows about one detection
pub struct Detection<'a> {
    pub waveform: &'a Waveform,
    pub metrics: &'a SpectrumMetrics,
    pub features: &'a FeatureVector,
    pub frequency_hz: f64,
}

pub trait Classifier: Send {
    fn classify(&self, detection: &Detection<'_>) -> Classification;

    /// Stored with feature and prediction rows
    fn model_name(&self) -> &str;
}

struct Allocation {
    low_mhz: f64,
    high_mhz: f64,
    signal_type: &'static str,
    modulation: &'static str,
}

// First match wins, so narrower bands go before the ones they overlap
const ALLOCATIONS: &[Allocation] = &[
    Allocation { low_mhz: 87.5, high_mhz: 108.0, signal_type: "FM", modulation: "WFM" },
    Allocation { low_mhz: 430.0, high_mhz: 440.0, signal_type: "LORA", modulation: "CSS" },
    Allocation { low_mhz: 863.0, high_mhz: 870.0, signal_type: "LORA", modulation: "CSS" },
    Allocation { low_mhz: 880.0, high_mhz: 960.0, signal_type: "GSM", modulation: "GMSK" },
    Allocation { low_mhz: 1710.0, high_mhz: 1880.0, signal_type: "GSM", modulation: "GMSK" },
    Allocation { low_mhz: 2400.0, high_mhz: 2483.5, signal_type: "WIFI", modulation: "OFDM" },
    Allocation { low_mhz: 2700.0, high_mhz: 2900.0, signal_type: "RADAR", modulation: "PULSED" },
    Allocation { low_mhz: 5725.0, high_mhz: 5875.0, signal_type: "RADAR", modulation: "PULSED" },
    Allocation { low_mhz: 5150.0, high_mhz: 5725.0, signal_type: "WIFI", modulation: "OFDM" },
];

/// Envelope coefficient of variation above which a signal reads as AM
const AM_CV_THRESHOLD: f64 = 0.2;
/// Instantaneous frequency spread (rad/sample) above which a signal reads as FM
const FM_DEVIATION_THRESHOLD: f64 = 0.01;
/// SNR at which confidence saturates
const SNR_FULL_CONFIDENCE_DB: f64 = 40.0;

/// Modulation family from envelope and frequency variability
pub fn estimate_modulation(features: &FeatureVector) -> &'static str {
    if features.amplitude_cv() > AM_CV_THRESHOLD {
        "AM"
    } else if features.inst_freq_std > FM_DEVIATION_THRESHOLD {
        "FM"
    } else {
        "CW"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BandClassifier;

impl BandClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl Classifier for BandClassifier {
    fn classify(&self, detection: &Detection<'_>) -> Classification {
        let mhz = detection.frequency_hz / 1e6;
        let strength = (detection.metrics.snr_db() / SNR_FULL_CONFIDENCE_DB).clamp(0.0, 1.0);
        let family = estimate_modulation(detection.features);

        let allocation = ALLOCATIONS
            .iter()
            .find(|a| mhz >= a.low_mhz && mhz < a.high_mhz);

        let (signal_type, modulation, confidence) = match allocation {
            // Constant envelope with frequency movement in the 2.4 GHz band is GFSK
            Some(a) if a.signal_type == "WIFI" && a.high_mhz < 3000.0 && family == "FM" => {
                ("BLUETOOTH", "GFSK", 0.5 + 0.45 * strength)
            }
            Some(a) => (a.signal_type, a.modulation, 0.5 + 0.45 * strength),
            None => (UNKNOWN_SIGNAL_TYPE, family, 0.2 + 0.5 * strength),
        };

        Classification {
            signal_type: signal_type.to_string(),
            modulation: Some(modulation.to_string()),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    fn model_name(&self) -> &str {
        "band-allocation-v1"
    }
}
