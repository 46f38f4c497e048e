use std::fmt;

pub type Result<T> = std::result::Result<T, VitalsError>;

#[derive(Debug, Clone, PartialEq)]
pub enum VitalsError {
    /// Sampling rate is not a finite positive number.
    InvalidSamplingRate { rate: f64 },

    /// Pass band must satisfy `0 < low < high < fs / 2`.
    InvalidPassband { low_hz: f64, high_hz: f64, fs: f64 },

    /// The biquad designer rejected one of the filter sections.
    FilterDesign(String),

    /// Not enough timestamps were recorded to measure the sampling rate.
    CalibrationIncomplete { collected: usize, required: usize },

    /// Calibration timestamps did not advance.
    NonMonotonicTimestamps,

    /// Red and infrared windows handed to the estimator differ in length.
    WindowMismatch { red: usize, infrared: usize },

    /// The session has not fixed its sampling rate yet.
    NotCalibrated,
}

impl fmt::Display for VitalsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VitalsError::InvalidSamplingRate { rate } => {
                write!(f, "invalid sampling rate {rate} Hz")
            }
            VitalsError::InvalidPassband { low_hz, high_hz, fs } => write!(
                f,
                "invalid pass band {low_hz}..{high_hz} Hz for sampling rate {fs} Hz"
            ),
            VitalsError::FilterDesign(reason) => write!(f, "filter design failed: {reason}"),
            VitalsError::CalibrationIncomplete { collected, required } => write!(
                f,
                "calibration incomplete: {collected} of {required} samples collected"
            ),
            VitalsError::NonMonotonicTimestamps => {
                write!(f, "calibration timestamps did not advance")
            }
            VitalsError::WindowMismatch { red, infrared } => write!(
                f,
                "red window has {red} samples but infrared window has {infrared}"
            ),
            VitalsError::NotCalibrated => write!(f, "sampling rate not calibrated yet"),
        }
    }
}

impl std::error::Error for VitalsError {}
