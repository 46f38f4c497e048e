use crate::analysis::calibration::SamplingRate;
use crate::Sample;

mod ringbuffer;

pub use ringbuffer::SliceableRingBuffer;

/// Rolling red/infrared history of fixed duration.
///
/// Only the ingestion side mutates it; estimators work on a [`WindowSnapshot`].
#[derive(Debug, Clone)]
pub struct SampleWindow {
    red: SliceableRingBuffer<u32>,
    infrared: SliceableRingBuffer<u32>,
}

/// Read-only copy of both channels taken at one instant.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowSnapshot {
    pub red: Vec<u32>,
    pub infrared: Vec<u32>,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            red: SliceableRingBuffer::new(capacity, 0),
            infrared: SliceableRingBuffer::new(capacity, 0),
        }
    }

    pub fn with_duration(seconds: f64, fs: SamplingRate) -> Self {
        Self::new(fs.samples_for(seconds))
    }

    pub fn push(&mut self, sample: Sample) {
        self.red.push(sample.red);
        self.infrared.push(sample.infrared);
    }

    pub fn len(&self) -> usize {
        self.infrared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infrared.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.infrared.capacity()
    }

    pub fn red(&self) -> &[u32] {
        self.red.get_slice()
    }

    pub fn infrared(&self) -> &[u32] {
        self.infrared.get_slice()
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            red: self.red.snapshot(),
            infrared: self.infrared.snapshot(),
        }
    }
}

impl WindowSnapshot {
    pub fn len(&self) -> usize {
        self.infrared.len().min(self.red.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
