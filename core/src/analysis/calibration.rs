use std::time::Instant;

use crate::error::{Result, VitalsError};

/// Measured sampling rate in Hz. Always finite and positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct SamplingRate(f64);

impl SamplingRate {
    pub fn new(hz: f64) -> Result<Self> {
        if hz.is_finite() && hz > 0.0 {
            Ok(SamplingRate(hz))
        } else {
            Err(VitalsError::InvalidSamplingRate { rate: hz })
        }
    }

    pub fn hz(self) -> f64 {
        self.0
    }

    /// Number of samples spanning `seconds`, rounded to the nearest sample.
    pub fn samples_for(self, seconds: f64) -> usize {
        (seconds * self.0).round().max(0.0) as usize
    }

    /// Smallest sample count covering at least `seconds`.
    pub fn samples_at_least(self, seconds: f64) -> usize {
        (seconds * self.0).ceil().max(0.0) as usize
    }

    pub fn seconds_for(self, samples: usize) -> f64 {
        samples as f64 / self.0
    }
}

pub struct SampleRateCalibrator {
    required: usize,
    first: Option<Instant>,
    last: Option<Instant>,
    collected: usize,
}

impl SampleRateCalibrator {
    pub fn new(required: usize) -> Self {
        Self {
            required: required.max(2),
            first: None,
            last: None,
            collected: 0,
        }
    }

    pub fn record(&mut self, at: Instant) {
        if self.first.is_none() {
            self.first = Some(at);
        }
        self.last = Some(at);
        self.collected += 1;
    }

    pub fn collected(&self) -> usize {
        self.collected
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn is_complete(&self) -> bool {
        self.collected >= self.required
    }

    /// `fs = 1 / mean interval`, rounded to two decimals.
    ///
    /// The mean of consecutive intervals telescopes to
    /// `(t_last - t_first) / (n - 1)`.
    pub fn finish(&self) -> Result<SamplingRate> {
        let (first, last) = match (self.first, self.last) {
            (Some(first), Some(last)) if self.is_complete() => (first, last),
            _ => {
                return Err(VitalsError::CalibrationIncomplete {
                    collected: self.collected,
                    required: self.required,
                })
            }
        };

        let elapsed = last.saturating_duration_since(first).as_secs_f64();
        if elapsed <= 0.0 {
            return Err(VitalsError::NonMonotonicTimestamps);
        }

        let mean_interval = elapsed / (self.collected - 1) as f64;
        let fs = (100.0 / mean_interval).round() / 100.0;
        SamplingRate::new(fs)
    }
}
