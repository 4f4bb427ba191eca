//! Exponential parameter smoothing
//!
//! Every setting an effect forwards to a signal unit goes through a
//! [`SmoothedValue`]: the control side sets a target and the render side
//! approaches it with a one-pole exponential curve, so a change is never a
//! step discontinuity.
//!
//! ```text
//! current[n] = target + (current[n-1] - target) * coeff
//! coeff      = exp(-1 / (tau * sample_rate))
//! ```

use crate::types::StereoBuffer;

/// Default smoothing time constant in milliseconds
pub const DEFAULT_SMOOTHING_MS: f32 = 10.0;

/// Distance below which the smoother snaps onto its target
const SETTLE_EPSILON: f32 = 1e-6;

/// A value that approaches its target exponentially
#[derive(Debug, Clone, Copy)]
pub struct SmoothedValue {
    current: f32,
    target: f32,
    coeff: f32,
}

impl SmoothedValue {
    /// Create a smoother that starts settled at `value`
    pub fn new(value: f32, sample_rate: f32, time_ms: f32) -> Self {
        Self {
            current: value,
            target: value,
            coeff: Self::coefficient(sample_rate, time_ms),
        }
    }

    /// Create a smoother with the default 10 ms time constant
    pub fn with_default_time(value: f32, sample_rate: f32) -> Self {
        Self::new(value, sample_rate, DEFAULT_SMOOTHING_MS)
    }

    fn coefficient(sample_rate: f32, time_ms: f32) -> f32 {
        if time_ms <= 0.0 || sample_rate <= 0.0 {
            return 0.0;
        }
        let tau_samples = time_ms * 0.001 * sample_rate;
        (-1.0 / tau_samples).exp()
    }

    /// Change the time constant without disturbing the current value
    pub fn set_time(&mut self, sample_rate: f32, time_ms: f32) {
        self.coeff = Self::coefficient(sample_rate, time_ms);
    }

    /// Set a new target; the value glides towards it
    #[inline]
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    /// Jump straight to `value` (used at construction and on reset)
    #[inline]
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
    }

    /// Finish the current glide at once
    #[inline]
    pub fn settle(&mut self) {
        self.current = self.target;
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    #[inline]
    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }

    /// Advance one sample and return the new value
    #[inline]
    pub fn next(&mut self) -> f32 {
        if self.current != self.target {
            self.current = self.target + (self.current - self.target) * self.coeff;
            if (self.current - self.target).abs() < SETTLE_EPSILON {
                self.current = self.target;
            }
        }
        self.current
    }

    /// Advance `frames` samples at once and return the value reached
    pub fn skip(&mut self, frames: usize) -> f32 {
        if self.is_settled() {
            return self.current;
        }
        let decay = self.coeff.powi(frames as i32);
        self.current = self.target + (self.current - self.target) * decay;
        if (self.current - self.target).abs() < SETTLE_EPSILON {
            self.current = self.target;
        }
        self.current
    }
}

/// Smoothed gain unit
#[derive(Debug, Clone, Copy)]
pub struct GainStage {
    gain: SmoothedValue,
}

impl GainStage {
    pub fn new(gain: f32, sample_rate: f32) -> Self {
        Self {
            gain: SmoothedValue::with_default_time(gain, sample_rate),
        }
    }

    #[inline]
    pub fn set_gain(&mut self, gain: f32) {
        self.gain.set_target(gain);
    }

    #[inline]
    pub fn set_gain_immediate(&mut self, gain: f32) {
        self.gain.set_immediate(gain);
    }

    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain.current()
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.gain.target()
    }

    #[inline]
    pub fn next(&mut self) -> f32 {
        self.gain.next()
    }

    /// Apply the (ramping) gain to a buffer in place
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        if self.gain.is_settled() {
            let g = self.gain.current();
            if g != 1.0 {
                buffer.scale(g);
            }
            return;
        }
        for sample in buffer.iter_mut() {
            *sample *= self.gain.next();
        }
    }
}
