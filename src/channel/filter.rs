//! Sliding-window mean for 4–20 mA loop readings.

/// Samples averaged per analog channel.
pub const WINDOW: usize = 10;

/// Fixed ring of the last [`WINDOW`] readings.  Stack-allocated.
#[derive(Debug, Clone)]
pub struct SlidingMean {
    ring: [f32; WINDOW],
    head: usize,
    count: usize,
}

impl Default for SlidingMean {
    fn default() -> Self {
        Self::new()
    }
}

impl SlidingMean {
    pub const fn new() -> Self {
        Self {
            ring: [0.0; WINDOW],
            head: 0,
            count: 0,
        }
    }

    /// Push a reading, dropping the oldest when full, and return the mean.
    /// Non-finite readings are ignored.
    pub fn push(&mut self, sample: f32) -> f32 {
        if sample.is_finite() {
            self.ring[self.head] = sample;
            self.head = (self.head + 1) % WINDOW;
            if self.count < WINDOW {
                self.count += 1;
            }
        }
        self.mean()
    }

    /// Mean of the buffered readings, 0.0 when empty.
    pub fn mean(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        let sum: f32 = if self.count < WINDOW {
            self.ring[..self.count].iter().sum()
        } else {
            self.ring.iter().sum()
        };
        sum / self.count as f32
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}
