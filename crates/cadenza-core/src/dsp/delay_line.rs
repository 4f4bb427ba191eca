//! Ring-buffer delay line with fractional-sample reads

/// Single-channel delay line
///
/// The buffer is allocated once at construction for the maximum delay; reads
/// and writes never allocate. A delay of `d` samples returns the value
/// written `d` writes ago, so the shortest usable delay is one sample
/// (read-before-write).
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    /// Create a delay line able to hold `max_delay_samples`
    pub fn new(max_delay_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; max_delay_samples.max(1) + 2],
            write_pos: 0,
        }
    }

    /// Create a delay line sized for `max_seconds` at `sample_rate`
    pub fn with_max_seconds(max_seconds: f32, sample_rate: f32) -> Self {
        Self::new((max_seconds * sample_rate).ceil() as usize)
    }

    /// Longest delay this line can produce, in samples
    #[inline]
    pub fn max_delay(&self) -> usize {
        self.buffer.len() - 2
    }

    /// Read with an integer delay (clamped to 1..=max)
    #[inline]
    pub fn read(&self, delay_samples: usize) -> f32 {
        let delay = delay_samples.clamp(1, self.max_delay());
        let len = self.buffer.len();
        self.buffer[(self.write_pos + len - delay) % len]
    }

    /// Read with a fractional delay using linear interpolation
    #[inline]
    pub fn read_fractional(&self, delay_samples: f32) -> f32 {
        let delay = delay_samples.clamp(1.0, self.max_delay() as f32);
        let whole = delay.floor();
        let frac = delay - whole;
        let a = self.read(whole as usize);
        if frac <= 0.0 {
            return a;
        }
        let b = self.read(whole as usize + 1);
        a + (b - a) * frac
    }

    /// Push one sample into the line
    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos += 1;
        if self.write_pos == self.buffer.len() {
            self.write_pos = 0;
        }
    }

    /// Read at `delay_samples`, then write `input`; returns the delayed value
    #[inline]
    pub fn process(&mut self, input: f32, delay_samples: f32) -> f32 {
        let out = self.read_fractional(delay_samples);
        self.write(input);
        out
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}
