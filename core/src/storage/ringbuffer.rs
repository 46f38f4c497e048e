use crate::analysis::calibration::SamplingRate;

/// Fixed-capacity ring buffer whose contents can always be borrowed as one
/// contiguous, arrival-ordered slice.
///
/// Every write lands twice, at `pos` and `pos + capacity`, so the most recent
/// `len` elements are always `buffer[start..start + len]` for some `start`.
#[derive(Debug, Clone)]
pub struct SliceableRingBuffer<T: Clone> {
    buffer: Vec<T>,
    write_position: usize,
    capacity: usize,
    len: usize,
}

impl<T: Clone> SliceableRingBuffer<T> {
    // Capacity is clamped to at least one slot.
    pub fn new(capacity: usize, default_value: T) -> Self {
        let capacity = capacity.max(1);
        SliceableRingBuffer {
            buffer: vec![default_value; capacity * 2],
            write_position: 0,
            capacity,
            len: 0,
        }
    }

    /// Buffer covering `seconds` of history at the given sampling rate.
    pub fn with_duration(seconds: f64, fs: SamplingRate, default_value: T) -> Self {
        Self::new(fs.samples_for(seconds), default_value)
    }

    // Appends one element, evicting the oldest once full.
    pub fn push(&mut self, data: T) {
        let adjusted_position = self.write_position % self.capacity;
        self.buffer[adjusted_position] = data.clone();
        self.buffer[adjusted_position + self.capacity] = data;

        self.write_position = (self.write_position + 1) % self.capacity;
        self.len = (self.len + 1).min(self.capacity);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    pub fn clear(&mut self) {
        self.write_position = 0;
        self.len = 0;
    }

    /// Everything currently held, oldest first.
    pub fn get_slice(&self) -> &[T] {
        self.get_slice_with_len(self.len)
    }

    // Returns the last `len` elements written, oldest first. `len` is capped
    // at the current occupancy.
    pub fn get_slice_with_len(&self, len: usize) -> &[T] {
        let len = len.min(self.len);
        let start = (self.write_position + (self.capacity - len)) % self.capacity;
        &self.buffer[start..start + len]
    }

    /// Owned copy of the current contents.
    pub fn snapshot(&self) -> Vec<T> {
        self.get_slice().to_vec()
    }
}
