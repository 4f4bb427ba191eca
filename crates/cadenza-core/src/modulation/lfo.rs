//! LFO controller

use serde::{Deserialize, Serialize};

use super::Controller;
use crate::dsp::{Oscillator, Waveform};
use crate::types::ProcessContext;

/// Cycle length of an LFO
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum LfoRate {
    /// Free running, in Hz
    Hz(f32),
    /// Tempo synced, one cycle every N beats
    Beats(f64),
}

impl LfoRate {
    /// Frequency in Hz at the given tempo
    pub fn frequency(&self, bpm: f64) -> f32 {
        match *self {
            LfoRate::Hz(hz) => hz.max(0.0),
            LfoRate::Beats(beats) if beats > 0.0 && bpm > 0.0 => (bpm / 60.0 / beats) as f32,
            LfoRate::Beats(_) => 0.0,
        }
    }
}

impl Default for LfoRate {
    fn default() -> Self {
        LfoRate::Hz(1.0)
    }
}

/// Block-rate low-frequency oscillator
///
/// The output is `offset + depth * wave`, where `wave` is the bipolar
/// waveform value at the start of the block. Defaults sweep 0..1.
#[derive(Debug, Clone)]
pub struct LfoController {
    osc: Oscillator,
    rate: LfoRate,
    depth: f32,
    offset: f32,
    start_phase: f32,
    value: f32,
}

impl LfoController {
    pub fn new(waveform: Waveform, rate: LfoRate) -> Self {
        Self {
            osc: Oscillator::new(waveform, 0.0, 1.0),
            rate,
            depth: 0.5,
            offset: 0.5,
            start_phase: 0.0,
            value: 0.0,
        }
    }

    pub fn with_depth(mut self, depth: f32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_offset(mut self, offset: f32) -> Self {
        self.offset = offset;
        self
    }

    /// Start phase in cycles
    pub fn with_phase(mut self, phase: f32) -> Self {
        self.start_phase = phase;
        self.osc.set_phase(phase);
        self
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.osc.set_waveform(waveform);
    }

    pub fn waveform(&self) -> Waveform {
        self.osc.waveform()
    }

    pub fn set_rate(&mut self, rate: LfoRate) {
        self.rate = rate;
    }

    pub fn rate(&self) -> LfoRate {
        self.rate
    }

    pub fn set_depth(&mut self, depth: f32) {
        self.depth = depth;
    }

    pub fn set_offset(&mut self, offset: f32) {
        self.offset = offset;
    }

    /// Current phase in cycles
    pub fn phase(&self) -> f32 {
        self.osc.phase()
    }
}

impl Controller for LfoController {
    fn process(&mut self, frames: usize, ctx: &ProcessContext) -> f32 {
        self.osc
            .set_frequency(self.rate.frequency(ctx.bpm), ctx.sample_rate);
        self.value = self.offset + self.depth * self.osc.value_at(0.0);
        self.osc.advance(frames);
        self.value
    }

    fn value(&self) -> f32 {
        self.value
    }

    fn reset(&mut self) {
        self.osc.reset();
        self.osc.set_phase(self.start_phase);
        self.value = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_frequency() {
        assert_eq!(LfoRate::Hz(2.0).frequency(120.0), 2.0);
        // one cycle per beat at 120 bpm
        assert_eq!(LfoRate::Beats(1.0).frequency(120.0), 2.0);
        assert_eq!(LfoRate::Beats(4.0).frequency(120.0), 0.5);
        assert_eq!(LfoRate::Beats(0.0).frequency(120.0), 0.0);
    }

    #[test]
    fn test_square_lfo_alternates_each_half_cycle() {
        let ctx = ProcessContext::new(1024.0);
        let mut lfo = LfoController::new(Waveform::Square, LfoRate::Hz(1.0));
        // a half cycle is 512 frames
        assert_eq!(lfo.process(256, &ctx), 1.0);
        assert_eq!(lfo.process(256, &ctx), 1.0);
        assert_eq!(lfo.process(256, &ctx), 0.0);
        assert_eq!(lfo.process(256, &ctx), 0.0);
        assert_eq!(lfo.process(256, &ctx), 1.0);
    }

    #[test]
    fn test_depth_offset_and_phase() {
        let ctx = ProcessContext::new(1000.0);
        let mut lfo = LfoController::new(Waveform::Sine, LfoRate::Hz(1.0))
            .with_depth(0.2)
            .with_offset(0.3)
            .with_phase(0.25);
        assert!((lfo.process(1, &ctx) - 0.5).abs() < 1e-6);
        lfo.reset();
        assert!((lfo.phase() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_tempo_sync_follows_bpm() {
        let slow = ProcessContext::new(1024.0).with_bpm(60.0);
        let fast = ProcessContext::new(1024.0).with_bpm(120.0);
        let mut a = LfoController::new(Waveform::Saw, LfoRate::Beats(1.0));
        let mut b = a.clone();
        a.process(256, &slow);
        b.process(256, &fast);
        assert!((a.phase() - 0.25).abs() < 1e-6);
        assert!((b.phase() - 0.5).abs() < 1e-6);
    }
}
