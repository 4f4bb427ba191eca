//! Distortion - table waveshaping with seven transfer curves
//!
//! The selected nonlinearity is evaluated at drive into an 8192-point curve
//! and applied by an oversampling [`Waveshaper`]. A highpass before the
//! shaper keeps rumble out of the nonlinearity, a lowpass after it sets the
//! tone, and the output is scaled so a half-scale sine keeps its RMS level
//! whatever curve and drive are selected.

use std::f32::consts::{FRAC_PI_2, TAU};

use serde::{Deserialize, Serialize};

use crate::dsp::biquad::BUTTERWORTH_Q;
use crate::dsp::{
    db_to_gain, BiquadCoeffs, FilterType, Oversampling, SmoothedValue, StereoBiquad, Waveshaper,
};
use crate::effect::{DryTap, EffectProcessor, EffectSettings, ParamDescriptor};
use crate::types::{ProcessContext, StereoSample};

use super::option_index;

/// Upper bound on wave-fold reflections per sample
const MAX_FOLDS: usize = 32;
const COMPENSATION_POINTS: usize = 64;
const COMPENSATION_LEVEL: f32 = 0.5;
const OVERSAMPLING: [&str; 3] = ["Off", "2x", "4x"];
/// Drive movement that warrants a new curve while drive is gliding
const CURVE_DRIVE_STEP: f32 = 0.01;

/// Transfer curve family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistortionType {
    #[default]
    SoftClip,
    Fuzz,
    Tube,
    Clip,
    Fold,
    Sine,
    BitQuantize,
}

impl DistortionType {
    pub const ALL: [DistortionType; 7] = [
        DistortionType::SoftClip,
        DistortionType::Fuzz,
        DistortionType::Tube,
        DistortionType::Clip,
        DistortionType::Fold,
        DistortionType::Sine,
        DistortionType::BitQuantize,
    ];

    pub fn from_index(index: f32) -> Self {
        Self::ALL[option_index(index, Self::ALL.len())]
    }

    pub fn name(&self) -> &'static str {
        match self {
            DistortionType::SoftClip => "Soft Clip",
            DistortionType::Fuzz => "Fuzz",
            DistortionType::Tube => "Tube",
            DistortionType::Clip => "Hard Clip",
            DistortionType::Fold => "Wave Fold",
            DistortionType::Sine => "Sine",
            DistortionType::BitQuantize => "Bit Quantize",
        }
    }
}

/// Evaluate a transfer curve at input `x` for `drive` in 0..1
pub fn shape(kind: DistortionType, drive: f32, x: f32) -> f32 {
    let drive = drive.clamp(0.0, 1.0);
    match kind {
        DistortionType::SoftClip => {
            let k = 1.0 + drive * 49.0;
            (k * x).tanh() / k.tanh()
        }
        DistortionType::Fuzz => {
            // Hard on the positive half, softer and lower on the negative
            let k = 1.0 + drive * 20.0;
            if x >= 0.0 {
                (1.0 - (-k * x).exp()) / (1.0 - (-k).exp())
            } else {
                let k = k * 0.5;
                -0.8 * (1.0 - (k * x).exp()) / (1.0 - (-k).exp())
            }
        }
        DistortionType::Tube => {
            let k = 1.0 + drive * 10.0;
            x.signum() * (1.0 - (-k * x.abs()).exp()) / (1.0 - (-k).exp())
        }
        DistortionType::Clip => {
            let t = 1.0 - drive * 0.9;
            x.clamp(-t, t) / t
        }
        DistortionType::Fold => {
            let mut v = x * (1.0 + drive * 7.0);
            let mut folds = 0;
            while v.abs() > 1.0 && folds < MAX_FOLDS {
                v = if v > 1.0 { 2.0 - v } else { -2.0 - v };
                folds += 1;
            }
            v.clamp(-1.0, 1.0)
        }
        DistortionType::Sine => (FRAC_PI_2 * x * (1.0 + drive * 7.0)).sin(),
        DistortionType::BitQuantize => {
            let bits = 16.0 - drive * 15.0;
            let steps = 2.0f32.powf(bits - 1.0);
            ((x * steps).round() / steps).clamp(-1.0, 1.0)
        }
    }
}

/// Gain that brings a half-scale sine back to its own RMS after the curve
fn compensation_gain(shaper: &Waveshaper) -> f32 {
    let mut sum_in = 0.0;
    let mut sum_out = 0.0;
    for i in 0..COMPENSATION_POINTS {
        let x = COMPENSATION_LEVEL * (TAU * i as f32 / COMPENSATION_POINTS as f32).sin();
        let y = shaper.lookup(x);
        sum_in += x * x;
        sum_out += y * y;
    }
    if sum_out <= 1e-12 {
        return 1.0;
    }
    (sum_in / sum_out).sqrt().clamp(0.1, 10.0)
}

/// Waveshaping distortion
pub struct Distortion {
    sample_rate: f32,
    kind: DistortionType,
    drive: SmoothedValue,
    shaped_drive: f32,
    shapers: [Waveshaper; 2],
    compensation: SmoothedValue,
    pre_filter: StereoBiquad,
    low_cut: SmoothedValue,
    applied_low_cut: f32,
    post_filter: StereoBiquad,
    tone: SmoothedValue,
    applied_tone: f32,
    output: SmoothedValue,
}

impl Distortion {
    pub fn new(settings: &EffectSettings) -> Self {
        let sr = settings.sample_rate;
        let mut distortion = Self {
            sample_rate: sr,
            kind: DistortionType::SoftClip,
            drive: settings.smoother(0.5),
            shaped_drive: f32::NAN,
            shapers: [
                Waveshaper::new(Oversampling::X4, sr),
                Waveshaper::new(Oversampling::X4, sr),
            ],
            compensation: settings.smoother(1.0),
            pre_filter: StereoBiquad::passthrough(),
            low_cut: settings.smoother(20.0),
            applied_low_cut: f32::NAN,
            post_filter: StereoBiquad::passthrough(),
            tone: settings.smoother(1.0),
            applied_tone: f32::NAN,
            output: settings.smoother(1.0),
        };
        distortion.update_low_cut();
        distortion.rebuild_curve();
        distortion.update_tone();
        distortion
    }

    pub fn kind(&self) -> DistortionType {
        self.kind
    }

    pub fn curve(&self) -> &[f32] {
        self.shapers[0].curve()
    }

    fn rebuild_curve(&mut self) {
        let kind = self.kind;
        let drive = self.drive.current();
        for shaper in &mut self.shapers {
            shaper.set_curve_fn(|x| shape(kind, drive, x));
        }
        self.shaped_drive = drive;
        self.compensation.set_target(compensation_gain(&self.shapers[0]));
    }

    fn update_low_cut(&mut self) {
        let freq = self.low_cut.current();
        if freq == self.applied_low_cut {
            return;
        }
        self.applied_low_cut = freq;
        self.pre_filter.set_coeffs(BiquadCoeffs::design(
            FilterType::Highpass,
            freq,
            BUTTERWORTH_Q,
            0.0,
            self.sample_rate,
        ));
    }

    /// Tone 0..1 maps to a 1 kHz .. 20 kHz lowpass; fully open bypasses it
    fn update_tone(&mut self) {
        let tone = self.tone.current();
        if tone == self.applied_tone {
            return;
        }
        self.applied_tone = tone;
        let coeffs = if tone >= 1.0 {
            BiquadCoeffs::passthrough()
        } else {
            let cutoff = 1000.0 * 20.0f32.powf(tone);
            BiquadCoeffs::design(FilterType::Lowpass, cutoff, BUTTERWORTH_Q, 0.0, self.sample_rate)
        };
        self.post_filter.set_coeffs(coeffs);
    }
}

impl EffectProcessor for Distortion {
    fn descriptors(&self) -> Vec<ParamDescriptor> {
        let names: Vec<&str> = DistortionType::ALL.iter().map(|t| t.name()).collect();
        vec![
            ParamDescriptor::new("type", "Type", 0.0).with_options(&names),
            ParamDescriptor::new("drive", "Drive", 0.5),
            ParamDescriptor::new("tone", "Tone", 1.0),
            ParamDescriptor::new("low_cut", "Low Cut", 20.0)
                .with_range(20.0, 1000.0)
                .with_unit("Hz")
                .logarithmic(),
            ParamDescriptor::new("output", "Output", 0.0)
                .with_range(-24.0, 12.0)
                .with_unit("dB"),
            ParamDescriptor::new("oversampling", "Oversampling", 2.0).with_options(&OVERSAMPLING),
        ]
    }

    fn on_parameter_change(&mut self, key: &str, value: f32) {
        match key {
            "type" => {
                let kind = DistortionType::from_index(value);
                if kind != self.kind {
                    self.kind = kind;
                    self.rebuild_curve();
                }
            }
            "drive" => self.drive.set_target(value.clamp(0.0, 1.0)),
            "tone" => self.tone.set_target(value.clamp(0.0, 1.0)),
            "low_cut" => self.low_cut.set_target(value.clamp(20.0, 1000.0)),
            "output" => self.output.set_target(db_to_gain(value.clamp(-24.0, 12.0))),
            "oversampling" => {
                let oversampling = match option_index(value, OVERSAMPLING.len()) {
                    0 => Oversampling::None,
                    1 => Oversampling::X2,
                    _ => Oversampling::X4,
                };
                for shaper in &mut self.shapers {
                    shaper.set_oversampling(oversampling, self.sample_rate);
                }
            }
            _ => {}
        }
    }

    fn process(
        &mut self,
        block: &mut [StereoSample],
        _sidechain: Option<&[StereoSample]>,
        _ctx: &ProcessContext,
    ) {
        let frames = block.len();
        let drive = self.drive.skip(frames);
        let moved = (drive - self.shaped_drive).abs();
        if moved >= CURVE_DRIVE_STEP || (self.drive.is_settled() && moved > 0.0) {
            self.rebuild_curve();
        }
        self.tone.skip(frames);
        self.update_tone();
        self.low_cut.skip(frames);
        self.update_low_cut();

        for sample in block.iter_mut() {
            let (l, r) = self.pre_filter.process(sample.left, sample.right);
            let l = self.shapers[0].process(l);
            let r = self.shapers[1].process(r);
            let (l, r) = self.post_filter.process(l, r);
            let gain = self.compensation.next() * self.output.next();
            *sample = StereoSample::new(l * gain, r * gain);
        }
    }

    fn reset(&mut self) {
        self.drive.settle();
        self.tone.settle();
        self.output.settle();
        self.low_cut.settle();
        self.update_low_cut();
        self.rebuild_curve();
        self.compensation.settle();
        self.update_tone();
        for shaper in &mut self.shapers {
            shaper.reset();
        }
        self.pre_filter.reset();
        self.post_filter.reset();
    }

    fn dry_tap(&self) -> DryTap {
        DryTap::Complement
    }
}
