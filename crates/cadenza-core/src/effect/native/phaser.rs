//! Phaser - swept first-order allpass cascade
//!
//! Each stage is `y = c·x + x[n-1] - c·y[n-1]` with
//! `c = (tan(πf/Fs) - 1) / (tan(πf/Fs) + 1)`. The break frequency `f` is
//! swept exponentially between the min and max frequency by an LFO and the
//! coefficient is recomputed every sample. Left and right run the same LFO
//! at a phase offset; one sample of the cascade output is fed back to its
//! input.

use std::f32::consts::PI;

use crate::dsp::{Oscillator, SmoothedValue, Waveform};
use crate::effect::{DryTap, EffectProcessor, EffectSettings, ParamDescriptor, Telemetry};
use crate::types::{ProcessContext, StereoSample};

const MAX_STAGES: usize = 12;
const MIN_STAGES: usize = 2;
const MAX_FEEDBACK: f32 = 0.9;

/// First-order allpass coefficient for break frequency `freq`
#[inline]
pub(crate) fn allpass_coefficient(freq: f32, sample_rate: f32) -> f32 {
    let t = (PI * freq / sample_rate).tan();
    (t - 1.0) / (t + 1.0)
}

/// Round a stage count up to the next even number within 2..=12
pub(crate) fn even_stages(value: f32) -> usize {
    let n = value.round().clamp(MIN_STAGES as f32, MAX_STAGES as f32) as usize;
    (n + 1) & !1
}

#[derive(Clone, Copy, Default)]
struct AllpassChain {
    x1: [f32; MAX_STAGES],
    y1: [f32; MAX_STAGES],
    last: f32,
}

impl AllpassChain {
    #[inline]
    fn process(&mut self, input: f32, c: f32, stages: usize, feedback: f32) -> f32 {
        let mut x = input + feedback * self.last;
        for i in 0..stages {
            let y = c * x + self.x1[i] - c * self.y1[i];
            self.x1[i] = x;
            self.y1[i] = if y.abs() < 1e-20 { 0.0 } else { y };
            x = y;
        }
        self.last = x;
        x
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Stereo phaser processor
pub struct Phaser {
    sample_rate: f32,
    lfo: Oscillator,
    chains: [AllpassChain; 2],
    stages: usize,
    min_freq: SmoothedValue,
    max_freq: SmoothedValue,
    depth: SmoothedValue,
    feedback: SmoothedValue,
    /// Right channel LFO offset in cycles
    stereo_offset: SmoothedValue,
}

impl Phaser {
    pub fn new(settings: &EffectSettings) -> Self {
        let sr = settings.sample_rate;
        Self {
            sample_rate: sr,
            lfo: Oscillator::new(Waveform::Sine, 0.5, sr),
            chains: [AllpassChain::default(); 2],
            stages: 4,
            min_freq: settings.smoother(200.0),
            max_freq: settings.smoother(2000.0),
            depth: settings.smoother(1.0),
            feedback: settings.smoother(0.5),
            stereo_offset: settings.smoother(0.25),
        }
    }

    pub fn stages(&self) -> usize {
        self.stages
    }

    fn clamp_freq(&self, freq: f32) -> f32 {
        freq.clamp(20.0, self.sample_rate * 0.45)
    }
}

impl EffectProcessor for Phaser {
    fn descriptors(&self) -> Vec<ParamDescriptor> {
        vec![
            ParamDescriptor::new("stages", "Stages", 4.0)
                .with_range(MIN_STAGES as f32, MAX_STAGES as f32)
                .with_step(2.0),
            ParamDescriptor::new("rate", "Rate", 0.5)
                .with_range(0.01, 10.0)
                .with_unit("Hz")
                .logarithmic(),
            ParamDescriptor::new("depth", "Depth", 1.0),
            ParamDescriptor::new("min_freq", "Min Freq", 200.0)
                .with_range(20.0, 5000.0)
                .with_unit("Hz")
                .logarithmic(),
            ParamDescriptor::new("max_freq", "Max Freq", 2000.0)
                .with_range(100.0, 18000.0)
                .with_unit("Hz")
                .logarithmic(),
            ParamDescriptor::new("feedback", "Feedback", 0.5).with_range(-MAX_FEEDBACK, MAX_FEEDBACK),
            ParamDescriptor::new("stereo_phase", "Stereo Phase", 90.0)
                .with_range(0.0, 180.0)
                .with_unit("°"),
            ParamDescriptor::new("mix", "Mix", 0.5).with_unit("%"),
        ]
    }

    fn on_parameter_change(&mut self, key: &str, value: f32) {
        match key {
            "stages" => self.stages = even_stages(value),
            "rate" => self.lfo.set_frequency(value.clamp(0.01, 10.0), self.sample_rate),
            "depth" => self.depth.set_target(value.clamp(0.0, 1.0)),
            "min_freq" => self.min_freq.set_target(self.clamp_freq(value)),
            "max_freq" => self.max_freq.set_target(self.clamp_freq(value)),
            "feedback" => self
                .feedback
                .set_target(value.clamp(-MAX_FEEDBACK, MAX_FEEDBACK)),
            "stereo_phase" => self
                .stereo_offset
                .set_target(value.clamp(0.0, 180.0) / 360.0),
            _ => {}
        }
    }

    fn process(
        &mut self,
        block: &mut [StereoSample],
        _sidechain: Option<&[StereoSample]>,
        _ctx: &ProcessContext,
    ) {
        for sample in block.iter_mut() {
            let lo = self.min_freq.next();
            let hi = self.max_freq.next().max(lo);
            let depth = self.depth.next();
            let feedback = self.feedback.next();
            let offset = self.stereo_offset.next();
            let ratio = hi / lo;

            let sweep_l = 0.5 * (1.0 + self.lfo.value_at(0.0)) * depth;
            let sweep_r = 0.5 * (1.0 + self.lfo.value_at(offset)) * depth;
            let c_l = allpass_coefficient(lo * ratio.powf(sweep_l), self.sample_rate);
            let c_r = allpass_coefficient(lo * ratio.powf(sweep_r), self.sample_rate);
            self.lfo.advance(1);

            let left = self.chains[0].process(sample.left, c_l, self.stages, feedback);
            let right = self.chains[1].process(sample.right, c_r, self.stages, feedback);
            *sample = StereoSample::new(left, right);
        }
    }

    fn reset(&mut self) {
        for chain in &mut self.chains {
            chain.reset();
        }
        self.lfo.reset();
        self.min_freq.settle();
        self.max_freq.settle();
        self.depth.settle();
        self.feedback.settle();
        self.stereo_offset.settle();
    }

    fn dry_tap(&self) -> DryTap {
        DryTap::Complement
    }

    fn telemetry(&self) -> Telemetry {
        Telemetry::LfoPhase(self.lfo.phase())
    }
}
