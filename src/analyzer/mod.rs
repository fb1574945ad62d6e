//! Turning a captured waveform into numbers
//!
//! - [`spectral`]: power spectrum, peak, noise floor, occupied bandwidth
//! - [`features`]: the feature vector stored alongside each detection
//! - [`classifier`]: the pluggable classifier and the band-table default

pub mod classifier;
pub mod features;
pub mod spectral;

pub use classifier::{BandClassifier, Classification, Classifier, Detection};
pub use features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
pub use spectral::{analyze, analyze_spectrum, fft, SpectrumMetrics};
