//! Bit crusher - amplitude quantization plus zero-order hold
//!
//! Each sample is mapped onto `2^bits` evenly spaced levels across -1..1:
//!
//! ```text
//! q = round((x + 1) / 2 · (L - 1)) / (L - 1) · 2 - 1,   L = 2^bits
//! ```
//!
//! The sample-rate reduction holds every `round(1 / factor)`-th quantized
//! sample; nothing is resampled or filtered.

use crate::effect::{DryTap, EffectProcessor, EffectSettings, ParamDescriptor};
use crate::types::{ProcessContext, StereoSample};

const MIN_BITS: f32 = 1.0;
const MAX_BITS: f32 = 16.0;
const MIN_FACTOR: f32 = 0.01;

/// Quantize `x` to `levels` evenly spaced values in -1..1
#[inline]
pub(crate) fn quantize(x: f32, levels: f32) -> f32 {
    let span = levels - 1.0;
    let unit = ((x.clamp(-1.0, 1.0) + 1.0) * 0.5 * span).round() / span;
    unit * 2.0 - 1.0
}

/// Hold length in samples for a sample-rate factor
#[inline]
pub(crate) fn hold_length(factor: f32) -> u32 {
    (1.0 / factor.clamp(MIN_FACTOR, 1.0)).round().max(1.0) as u32
}

/// Bit depth and sample rate reduction
pub struct BitCrusher {
    levels: f32,
    hold: u32,
    counter: u32,
    held: StereoSample,
}

impl BitCrusher {
    pub fn new(_settings: &EffectSettings) -> Self {
        Self {
            levels: 2.0f32.powf(8.0),
            hold: 1,
            counter: 0,
            held: StereoSample::silence(),
        }
    }

    pub fn hold(&self) -> u32 {
        self.hold
    }
}

impl EffectProcessor for BitCrusher {
    fn descriptors(&self) -> Vec<ParamDescriptor> {
        vec![
            ParamDescriptor::new("bits", "Bit Depth", 8.0)
                .with_range(MIN_BITS, MAX_BITS)
                .with_unit("bits"),
            ParamDescriptor::new("rate", "Sample Rate", 1.0)
                .with_range(MIN_FACTOR, 1.0)
                .logarithmic(),
        ]
    }

    fn on_parameter_change(&mut self, key: &str, value: f32) {
        match key {
            "bits" => self.levels = 2.0f32.powf(value.clamp(MIN_BITS, MAX_BITS)),
            "rate" => {
                self.hold = hold_length(value);
                self.counter = self.counter.min(self.hold - 1);
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
        for sample in block.iter_mut() {
            if self.counter == 0 {
                self.held = StereoSample::new(
                    quantize(sample.left, self.levels),
                    quantize(sample.right, self.levels),
                );
            }
            self.counter += 1;
            if self.counter >= self.hold {
                self.counter = 0;
            }
            *sample = self.held;
        }
    }

    fn reset(&mut self) {
        self.counter = 0;
        self.held = StereoSample::silence();
    }

    fn dry_tap(&self) -> DryTap {
        DryTap::Complement
    }
}
