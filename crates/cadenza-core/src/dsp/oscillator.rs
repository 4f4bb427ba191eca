//! Phase-accumulator oscillator
//!
//! Phase runs in [0, 1). Each waveform is evaluated directly from the phase,
//! so the oscillator can be re-phased or read at an offset (for stereo LFOs
//! and chorus voices) without extra state.

use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

/// Oscillator waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Waveform {
    #[default]
    Sine,
    Triangle,
    Saw,
    Square,
    /// Random value held for one cycle
    SampleAndHold,
}

impl Waveform {
    pub const ALL: [Waveform; 5] = [
        Waveform::Sine,
        Waveform::Triangle,
        Waveform::Saw,
        Waveform::Square,
        Waveform::SampleAndHold,
    ];

    /// Map an enum parameter index onto a waveform
    pub fn from_index(index: f32) -> Self {
        let i = index.round().clamp(0.0, (Self::ALL.len() - 1) as f32) as usize;
        Self::ALL[i]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Waveform::Sine => "Sine",
            Waveform::Triangle => "Triangle",
            Waveform::Saw => "Saw",
            Waveform::Square => "Square",
            Waveform::SampleAndHold => "S&H",
        }
    }
}

/// Bipolar (-1..1) oscillator
#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    phase: f32,
    increment: f32,
    held: f32,
    rng: u64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, frequency: f32, sample_rate: f32) -> Self {
        let mut osc = Self {
            waveform,
            phase: 0.0,
            increment: 0.0,
            held: 0.0,
            rng: 0x9e37_79b9_7f4a_7c15,
        };
        osc.set_frequency(frequency, sample_rate);
        osc
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// Set frequency in Hz (negative values are treated as zero)
    pub fn set_frequency(&mut self, frequency: f32, sample_rate: f32) {
        self.increment = (frequency.max(0.0) / sample_rate).min(0.5);
    }

    pub fn frequency(&self, sample_rate: f32) -> f32 {
        self.increment * sample_rate
    }

    /// Set the phase in cycles (wrapped into [0, 1))
    pub fn set_phase(&mut self, phase: f32) {
        self.phase = phase.rem_euclid(1.0);
    }

    #[inline]
    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Evaluate the waveform at `phase + offset` without advancing
    #[inline]
    pub fn value_at(&self, offset: f32) -> f32 {
        let p = (self.phase + offset).rem_euclid(1.0);
        match self.waveform {
            Waveform::Sine => (p * TAU).sin(),
            Waveform::Triangle => 1.0 - 4.0 * (p - 0.5).abs(),
            Waveform::Saw => 2.0 * p - 1.0,
            Waveform::Square => {
                if p < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::SampleAndHold => self.held,
        }
    }

    /// Return the current value and advance one sample
    #[inline]
    pub fn next(&mut self) -> f32 {
        let out = self.value_at(0.0);
        self.advance(1);
        out
    }

    /// Advance the phase by `frames` samples
    #[inline]
    pub fn advance(&mut self, frames: usize) {
        let next = self.phase + self.increment * frames as f32;
        if next >= 1.0 {
            self.held = self.next_random();
        }
        self.phase = next.fract();
    }

    // xorshift64*
    fn next_random(&mut self) -> f32 {
        let mut x = self.rng;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng = x;
        let bits = x.wrapping_mul(0x2545_f491_4f6c_dd1d) >> 40;
        (bits as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.held = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sine_period() {
        let mut osc = Oscillator::new(Waveform::Sine, 1000.0, 48000.0);
        let first = osc.next();
        for _ in 0..47 {
            osc.next();
        }
        assert!((osc.next() - first).abs() < 1e-3);
    }

    #[test]
    fn test_shapes_are_bipolar() {
        for waveform in Waveform::ALL {
            let mut osc = Oscillator::new(waveform, 440.0, 48000.0);
            for _ in 0..4800 {
                let v = osc.next();
                assert!((-1.0..=1.0).contains(&v), "{:?} out of range: {}", waveform, v);
            }
        }
    }

    #[test]
    fn test_value_at_offset() {
        let osc = Oscillator::new(Waveform::Saw, 1.0, 48000.0);
        assert!((osc.value_at(0.5) - 0.0).abs() < 1e-6);
        assert!((osc.value_at(0.0) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_sample_and_hold_changes_per_cycle() {
        let mut osc = Oscillator::new(Waveform::SampleAndHold, 100.0, 48000.0);
        osc.advance(500);
        let a = osc.value_at(0.0);
        osc.advance(500);
        let b = osc.value_at(0.0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_waveform_from_index() {
        assert_eq!(Waveform::from_index(2.2), Waveform::Saw);
        assert_eq!(Waveform::from_index(99.0), Waveform::SampleAndHold);
    }
}
