//! Fixed-capacity circular buffer for mono f32 PCM.
//!
//! The producer (a device callback) writes whatever the hardware delivers;
//! the consumer pulls the most recent window on its own schedule. When the
//! producer outruns the consumer the oldest samples are overwritten.

/// Circular sample buffer. One write index plus a saturating length counter
/// track occupancy; reads reconstruct chronological order across the wrap.
#[derive(Debug)]
pub struct RingBuffer {
    data: Vec<f32>,
    /// Next write position.
    pos: usize,
    /// Number of valid samples, saturating at capacity.
    len: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity.max(1)],
            pos: 0,
            len: 0,
        }
    }

    /// Capacity for a buffer holding `duration_ms` of audio at `sample_rate`.
    pub fn capacity_for(sample_rate: u32, duration_ms: u32) -> usize {
        (sample_rate as u64 * duration_ms as u64 / 1000).max(1) as usize
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append samples, overwriting the oldest data once full. Input larger
    /// than the whole buffer is truncated to its tail so the most recent
    /// capacity worth of samples is preserved.
    pub fn write(&mut self, input: &[f32]) {
        let cap = self.data.len();
        let input = if input.len() > cap {
            &input[input.len() - cap..]
        } else {
            input
        };

        let first = (cap - self.pos).min(input.len());
        self.data[self.pos..self.pos + first].copy_from_slice(&input[..first]);
        let rest = input.len() - first;
        if rest > 0 {
            self.data[..rest].copy_from_slice(&input[first..]);
        }

        self.pos = (self.pos + input.len()) % cap;
        self.len = (self.len + input.len()).min(cap);
    }

    /// Copy the most recent `n` samples (clamped to the current length) into
    /// `out` in chronological order.
    pub fn read_last(&self, n: usize, out: &mut Vec<f32>) {
        out.clear();
        let n = n.min(self.len);
        if n == 0 {
            return;
        }

        let cap = self.data.len();
        let start = (self.pos + cap - n) % cap;
        out.reserve(n);
        if start + n > cap {
            out.extend_from_slice(&self.data[start..]);
            out.extend_from_slice(&self.data[..n - (cap - start)]);
        } else {
            out.extend_from_slice(&self.data[start..start + n]);
        }
    }

    pub fn clear(&mut self) {
        self.pos = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize, offset: f32) -> Vec<f32> {
        (0..n).map(|i| offset + i as f32).collect()
    }

    #[test]
    fn capacity_derives_from_rate_and_duration() {
        assert_eq!(RingBuffer::capacity_for(16_000, 30_000), 480_000);
        assert_eq!(RingBuffer::capacity_for(16_000, 1), 16);
    }

    #[test]
    fn retains_min_of_written_and_capacity() {
        let mut buf = RingBuffer::new(100);
        buf.write(&ramp(60, 0.0));
        assert_eq!(buf.len(), 60);
        buf.write(&ramp(60, 60.0));
        assert_eq!(buf.len(), 100);
    }

    #[test]
    fn read_last_is_bit_identical_to_latest_writes() {
        let mut buf = RingBuffer::new(100);
        buf.write(&ramp(60, 0.0));
        buf.write(&ramp(60, 60.0));

        let mut out = Vec::new();
        buf.read_last(100, &mut out);
        assert_eq!(out, ramp(100, 20.0));

        buf.read_last(10, &mut out);
        assert_eq!(out, ramp(10, 110.0));
    }

    #[test]
    fn oversize_write_keeps_the_tail() {
        let mut buf = RingBuffer::new(8);
        buf.write(&ramp(20, 0.0));
        assert_eq!(buf.len(), 8);

        let mut out = Vec::new();
        buf.read_last(8, &mut out);
        assert_eq!(out, ramp(8, 12.0));
    }

    #[test]
    fn underflow_returns_fewer_samples() {
        let mut buf = RingBuffer::new(100);
        buf.write(&ramp(5, 0.0));

        let mut out = Vec::new();
        buf.read_last(50, &mut out);
        assert_eq!(out, ramp(5, 0.0));
    }

    #[test]
    fn clear_resets_occupancy() {
        let mut buf = RingBuffer::new(16);
        buf.write(&ramp(10, 0.0));
        buf.clear();
        assert!(buf.is_empty());

        let mut out = Vec::new();
        buf.read_last(16, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn wrap_point_sequence_stays_ordered() {
        let mut buf = RingBuffer::new(10);
        for chunk in ramp(35, 0.0).chunks(7) {
            buf.write(chunk);
        }
        let mut out = Vec::new();
        buf.read_last(10, &mut out);
        assert_eq!(out, ramp(10, 25.0));
    }
}
