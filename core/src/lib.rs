pub mod analysis;
pub mod error;
pub mod log;
pub mod mock;
pub mod monitor;
pub mod status;
pub mod storage;

pub use analysis::calibration::{SampleRateCalibrator, SamplingRate};
pub use analysis::filter::{Filter, FilterBackend};
pub use analysis::ppg::{Parameters, VitalEstimator};
pub use error::{Result, VitalsError};
pub use monitor::{Session, SessionConfig};
pub use storage::{SampleWindow, WindowSnapshot};

/// Raw readings are 18-bit.
pub const SAMPLE_MASK: u32 = 0x3FFFF;

/// One red/infrared intensity pair taken at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sample {
    pub red: u32,
    pub infrared: u32,
}

impl Sample {
    pub fn new(red: u32, infrared: u32) -> Self {
        Self {
            red: red & SAMPLE_MASK,
            infrared: infrared & SAMPLE_MASK,
        }
    }

    /// Decodes one FIFO record: red in bytes 0..3, infrared in bytes 3..6,
    /// both big-endian.
    pub fn from_fifo(bytes: [u8; 6]) -> Self {
        let red = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]);
        let infrared = u32::from_be_bytes([0, bytes[3], bytes[4], bytes[5]]);
        Self::new(red, infrared)
    }
}

/// Result of one estimation pass.
///
/// Zero `bpm` means "not available yet", never a measured heart rate of zero.
/// Zero `spo2` means the ratio of ratios could not be formed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VitalEstimate {
    pub bpm: f64,
    pub spo2: f64,
    pub quality: f64,
}

impl VitalEstimate {
    /// Sentinel for windows that do not hold enough history.
    pub fn insufficient() -> Self {
        Self {
            bpm: 0.0,
            spo2: 0.0,
            quality: 0.0,
        }
    }

    pub fn has_heart_rate(&self) -> bool {
        self.bpm > 0.0
    }

    pub fn has_spo2(&self) -> bool {
        self.spo2 > 0.0
    }
}
