//! Where waveforms come from
//!
//! The pipeline only sees [`SignalSource`]. A hardware capture front-end and
//! the bundled [`SimulatedSource`] are interchangeable behind it.

pub mod simulator;

pub use simulator::SimulatedSource;

use crate::error::SourceError;
use rustfft::num_complex::Complex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceCapability {
    Real,
    Simulated,
}

/// A buffer of complex baseband (IQ) samples
#[derive(Debug, Clone)]
pub struct Waveform {
    pub center_freq_hz: f64,
    pub sample_rate_hz: f64,
    /// Absolute power in dBm of a unit-amplitude tone at this capture gain
    pub full_scale_dbm: f64,
    pub samples: Vec<Complex<f64>>,
}

impl Waveform {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

pub trait SignalSource: Send {
    /// Capture `length` samples around `center_freq_hz`. One call is one
    /// bounded buffer; implementations must not block indefinitely.
    fn acquire(
        &mut self,
        center_freq_hz: f64,
        sample_rate_hz: f64,
        length: usize,
    ) -> Result<Waveform, SourceError>;

    fn capability(&self) -> SourceCapability;

    fn name(&self) -> &str;
}
