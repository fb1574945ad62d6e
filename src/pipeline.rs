//! One acquisition tick: acquire, analyze, classify, persist
//!
//! The pipeline never decides cadence. The scheduler calls [`Pipeline::detect`]
//! for each quick-pass candidate, [`Pipeline::deep_tick`] for the deep sweep and
//! [`Pipeline::spectral_tick`] for spectrum records. Each call does one
//! acquisition and yields at most one record.

use crate::analyzer::{self, Classifier, Detection, SpectrumMetrics};
use crate::config::AcquisitionConfig;
use crate::error::PipelineError;
use crate::model::{DetectedSignal, FeatureRecord, LogLevel, PredictionRecord, SpectrumAnalysis};
use crate::repository::Repository;
use crate::source::{SignalSource, Waveform};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// What a single tick produced
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Signal { id: i32, signal: DetectedSignal },
    Spectrum { id: i32, record: SpectrumAnalysis },
    /// Acquired and analyzed, nothing above the detection threshold
    Quiet,
}

impl TickOutcome {
    pub fn is_signal(&self) -> bool {
        matches!(self, TickOutcome::Signal { .. })
    }
}

pub struct Pipeline {
    source: Box<dyn SignalSource>,
    classifier: Box<dyn Classifier>,
    repo: Arc<dyn Repository>,
    config: AcquisitionConfig,
    deep_cursor: usize,
    spectral_cursor: usize,
}

/// Centre of step `cursor` when `[lo, hi]` is cut into `steps` equal cells
pub fn sweep_center(range: [f64; 2], steps: usize, cursor: usize) -> f64 {
    let [lo, hi] = range;
    let steps = steps.max(1);
    lo + (hi - lo) * ((cursor % steps) as f64 + 0.5) / steps as f64
}

impl Pipeline {
    pub fn new(
        source: Box<dyn SignalSource>,
        classifier: Box<dyn Classifier>,
        repo: Arc<dyn Repository>,
        config: AcquisitionConfig,
    ) -> Self {
        Self {
            source,
            classifier,
            repo,
            config,
            deep_cursor: 0,
            spectral_cursor: 0,
        }
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    fn acquire(&mut self, center_freq_hz: f64) -> Result<Waveform, PipelineError> {
        let waveform = self.source.acquire(
            center_freq_hz,
            self.config.sample_rate_hz,
            self.config.fft_size,
        )?;
        if waveform.is_empty() {
            return Err(PipelineError::EmptyWaveform);
        }
        Ok(waveform)
    }

    /// Check one centre frequency for a detection and persist it
    pub fn detect(&mut self, session_id: i32, center_freq_hz: f64) -> Result<TickOutcome, PipelineError> {
        let waveform = self.acquire(center_freq_hz)?;
        let spectrum = analyzer::fft(&waveform.samples);
        let metrics = analyzer::analyze_spectrum(
            &spectrum,
            waveform.sample_rate_hz,
            waveform.full_scale_dbm,
        )
        .ok_or(PipelineError::EmptyWaveform)?;

        if metrics.snr_db() < self.config.detection_snr_db {
            debug!(
                center_mhz = center_freq_hz / 1e6,
                snr_db = metrics.snr_db(),
                "no detection"
            );
            return Ok(TickOutcome::Quiet);
        }

        let features =
            analyzer::features::extract(&waveform.samples, &spectrum).ok_or(PipelineError::EmptyWaveform)?;
        let frequency_hz = waveform.center_freq_hz + metrics.peak_offset_hz();

        let started = Instant::now();
        let classification = self.classifier.classify(&Detection {
            waveform: &waveform,
            metrics: &metrics,
            features: &features,
            frequency_hz,
        });
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let signal = DetectedSignal {
            timestamp: Utc::now(),
            frequency_hz,
            power_dbm: metrics.peak_power_dbm,
            signal_type: classification.signal_type.clone(),
            confidence: classification.confidence.clamp(0.0, 1.0),
            bandwidth_hz: metrics.occupied_bandwidth_hz(),
            modulation: classification.modulation.clone(),
        };
        let id = self.repo.record_signal(session_id, &signal)?;

        debug!(
            id,
            frequency_mhz = signal.frequency_mhz(),
            power_dbm = signal.power_dbm,
            signal_type = %signal.signal_type,
            "signal recorded"
        );

        self.record_side_tables(&signal, features.to_vec(), waveform.len(), elapsed_ms);

        Ok(TickOutcome::Signal { id, signal })
    }

    // Feature and prediction rows are informational. Failing them must not
    // undo or fail the detection that was already committed.
    fn record_side_tables(
        &self,
        signal: &DetectedSignal,
        features: Vec<f64>,
        samples: usize,
        elapsed_ms: f64,
    ) {
        let feature_row = FeatureRecord {
            timestamp: signal.timestamp,
            features,
            signal_class: signal.signal_type.clone(),
            model_used: self.classifier.model_name().to_string(),
            confidence: signal.confidence,
        };
        if let Err(e) = self.repo.record_features(&feature_row) {
            warn!(error = %e, "could not store feature vector");
            self.repo.log("pipeline", LogLevel::Warning, &format!("feature write failed: {}", e), None);
        }

        let prediction = PredictionRecord {
            timestamp: signal.timestamp,
            modulation: signal.modulation.clone().unwrap_or_else(|| "UNKNOWN".to_string()),
            confidence: signal.confidence,
            input_shape: format!("[{}, 2]", samples),
            prediction_time_ms: elapsed_ms,
        };
        if let Err(e) = self.repo.record_prediction(&prediction) {
            warn!(error = %e, "could not store prediction");
            self.repo.log("pipeline", LogLevel::Warning, &format!("prediction write failed: {}", e), None);
        }
    }

    /// Next centre of the deep sweep
    pub fn deep_tick(&mut self, session_id: i32) -> Result<TickOutcome, PipelineError> {
        let center = sweep_center(self.config.deep_range_hz, self.config.sweep_steps, self.deep_cursor);
        self.deep_cursor = self.deep_cursor.wrapping_add(1);
        self.detect(session_id, center)
    }

    /// Analyze the next centre of the spectral sweep and store the metrics
    pub fn spectral_tick(&mut self) -> Result<TickOutcome, PipelineError> {
        let center = sweep_center(
            self.config.spectral_range_hz,
            self.config.sweep_steps,
            self.spectral_cursor,
        );
        self.spectral_cursor = self.spectral_cursor.wrapping_add(1);

        let waveform = self.acquire(center)?;
        let metrics = analyzer::analyze(&waveform).ok_or(PipelineError::EmptyWaveform)?;
        let record = spectrum_record(&waveform, &metrics);
        let id = self.repo.record_spectrum(&record)?;

        debug!(
            id,
            center_mhz = center / 1e6,
            peak_dbm = record.peak_power_dbm,
            noise_floor_dbm = record.noise_floor_dbm,
            "spectrum recorded"
        );

        Ok(TickOutcome::Spectrum { id, record })
    }
}

fn spectrum_record(waveform: &Waveform, metrics: &SpectrumMetrics) -> SpectrumAnalysis {
    SpectrumAnalysis {
        timestamp: Utc::now(),
        center_frequency_hz: waveform.center_freq_hz,
        bandwidth_hz: waveform.sample_rate_hz,
        peak_power_dbm: metrics.peak_power_dbm,
        mean_power_dbm: metrics.mean_power_dbm,
        peak_frequency_bin: metrics.peak_bin,
        total_bands: metrics.total_bins,
        noise_floor_dbm: metrics.noise_floor_dbm,
    }
}
