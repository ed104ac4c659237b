//! Audio ring buffer: fixed pre-allocated circular buffer for PCM samples
//! shared between the cpal callback and the wakeword processing thread.

/// Fixed-size ring buffer for PCM i16 samples. Pre-allocated, never grows.
pub struct RingBuffer {
    buffer: Box<[i16]>,
    write_pos: usize,
    read_pos: usize,
    /// Unread samples; saturates at capacity when the reader falls behind.
    len: usize,
}

impl RingBuffer {
    /// Create a ring buffer sized for `duration_secs` at `sample_rate` Hz, mono.
    pub fn new(sample_rate: u32, duration_secs: f32) -> Self {
        let capacity = ((sample_rate as f32 * duration_secs) as usize).max(1);
        Self {
            buffer: vec![0i16; capacity].into_boxed_slice(),
            write_pos: 0,
            read_pos: 0,
            len: 0,
        }
    }

    /// Write samples, overwriting the oldest unread data when full.
    /// Called from the audio callback: no allocation.
    #[inline]
    pub fn write(&mut self, samples: &[i16]) {
        let capacity = self.capacity();
        for &s in samples {
            self.buffer[self.write_pos] = s;
            self.write_pos = (self.write_pos + 1) % capacity;
            if self.len == capacity {
                self.read_pos = self.write_pos;
            } else {
                self.len += 1;
            }
        }
    }

    /// Read available samples into `output`. Returns the number read.
    #[inline]
    pub fn read(&mut self, output: &mut [i16]) -> usize {
        let capacity = self.capacity();
        let to_read = output.len().min(self.len);
        for slot in output.iter_mut().take(to_read) {
            *slot = self.buffer[self.read_pos];
            self.read_pos = (self.read_pos + 1) % capacity;
        }
        self.len -= to_read;
        to_read
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.len
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let mut rb = RingBuffer::new(10, 1.0);
        rb.write(&[1, 2, 3]);
        assert_eq!(rb.available(), 3);
        let mut out = [0i16; 2];
        assert_eq!(rb.read(&mut out), 2);
        assert_eq!(out, [1, 2]);
        assert_eq!(rb.available(), 1);
    }

    #[test]
    fn test_overflow_keeps_newest() {
        let mut rb = RingBuffer::new(4, 1.0);
        rb.write(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(rb.available(), 4);
        let mut out = [0i16; 4];
        assert_eq!(rb.read(&mut out), 4);
        assert_eq!(out, [3, 4, 5, 6]);
    }
}
