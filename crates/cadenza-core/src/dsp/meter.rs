//! Peak / RMS level metering for telemetry

use crate::types::StereoBuffer;

/// Stereo peak and RMS meter
///
/// Peak holds the largest absolute sample and falls back with a per-block
/// release factor; RMS is computed over the last measured block.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevelMeter {
    peak: [f32; 2],
    rms: [f32; 2],
    release: f32,
}

impl LevelMeter {
    /// `release` is the factor applied to the held peak at each block (0..1)
    pub fn new(release: f32) -> Self {
        Self {
            peak: [0.0; 2],
            rms: [0.0; 2],
            release: release.clamp(0.0, 1.0),
        }
    }

    pub fn measure(&mut self, buffer: &StereoBuffer) {
        if buffer.is_empty() {
            return;
        }
        let mut peak = [0.0f32; 2];
        let mut sum = [0.0f64; 2];
        for s in buffer.iter() {
            peak[0] = peak[0].max(s.left.abs());
            peak[1] = peak[1].max(s.right.abs());
            sum[0] += (s.left as f64).powi(2);
            sum[1] += (s.right as f64).powi(2);
        }
        let n = buffer.len() as f64;
        for ch in 0..2 {
            self.peak[ch] = peak[ch].max(self.peak[ch] * self.release);
            self.rms[ch] = (sum[ch] / n).sqrt() as f32;
        }
    }

    /// (left, right) peak
    pub fn peak(&self) -> (f32, f32) {
        (self.peak[0], self.peak[1])
    }

    /// (left, right) RMS
    pub fn rms(&self) -> (f32, f32) {
        (self.rms[0], self.rms[1])
    }

    pub fn reset(&mut self) {
        self.peak = [0.0; 2];
        self.rms = [0.0; 2];
    }
}
