//! One-pole lowpass
//!
//! `y[n] = y[n-1] + a * (x[n] - y[n-1])`, with `a = 1 - exp(-2π fc / fs)`.
//! Used for damping inside feedback paths and for envelope smoothing.

use std::f32::consts::PI;

#[derive(Debug, Clone, Copy)]
pub struct OnePole {
    a: f32,
    state: f32,
}

impl OnePole {
    pub fn new(cutoff: f32, sample_rate: f32) -> Self {
        let mut filter = Self { a: 1.0, state: 0.0 };
        filter.set_cutoff(cutoff, sample_rate);
        filter
    }

    /// Set the cutoff; clamped to (1 Hz, Nyquist)
    pub fn set_cutoff(&mut self, cutoff: f32, sample_rate: f32) {
        let fc = cutoff.clamp(1.0, sample_rate * 0.5);
        self.a = 1.0 - (-2.0 * PI * fc / sample_rate).exp();
    }

    /// Set the raw smoothing coefficient (0 = frozen, 1 = passthrough)
    pub fn set_coefficient(&mut self, a: f32) {
        self.a = a.clamp(0.0, 1.0);
    }

    pub fn coefficient(&self) -> f32 {
        self.a
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        self.state += self.a * (input - self.state);
        if self.state.abs() < 1e-20 {
            self.state = 0.0;
        }
        self.state
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}
