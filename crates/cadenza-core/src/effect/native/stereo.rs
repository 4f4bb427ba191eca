//! Stereo imager - mid/side width, bass mono, balance and polarity
//!
//! ```text
//! M = (L + R) / 2        L' = M + S·width
//! S = (L - R) / 2        R' = M - S·width
//! ```
//!
//! With bass mono enabled the side signal is highpassed (24 dB/oct) at the
//! bass frequency before scaling, so everything below it collapses to the
//! centre.

use crate::dsp::biquad::BUTTERWORTH_Q;
use crate::dsp::{Biquad, BiquadCoeffs, FilterType, SmoothedValue};
use crate::effect::{EffectProcessor, EffectSettings, ParamDescriptor};
use crate::types::{ProcessContext, StereoSample};

use super::is_on;

/// Width, bass mono, pan and phase-invert processor
pub struct StereoImager {
    sample_rate: f32,
    width: SmoothedValue,
    pan: SmoothedValue,
    polarity: [SmoothedValue; 2],
    bass_mono: bool,
    bass_freq: SmoothedValue,
    applied_bass_freq: f32,
    side_highpass: [Biquad; 2],
}

impl StereoImager {
    pub fn new(settings: &EffectSettings) -> Self {
        let mut imager = Self {
            sample_rate: settings.sample_rate,
            width: settings.smoother(1.0),
            pan: settings.smoother(0.0),
            polarity: [settings.smoother(1.0); 2],
            bass_mono: false,
            bass_freq: settings.smoother(120.0),
            applied_bass_freq: f32::NAN,
            side_highpass: [Biquad::passthrough(); 2],
        };
        imager.update_highpass();
        imager
    }

    fn update_highpass(&mut self) {
        let freq = self.bass_freq.current();
        if freq == self.applied_bass_freq {
            return;
        }
        self.applied_bass_freq = freq;
        let coeffs = BiquadCoeffs::design(
            FilterType::Highpass,
            freq,
            BUTTERWORTH_Q,
            0.0,
            self.sample_rate,
        );
        for section in &mut self.side_highpass {
            section.set_coeffs(coeffs);
        }
    }
}

impl EffectProcessor for StereoImager {
    fn descriptors(&self) -> Vec<ParamDescriptor> {
        vec![
            ParamDescriptor::new("width", "Width", 1.0).with_range(0.0, 2.0),
            ParamDescriptor::new("bass_mono", "Bass Mono", 0.0).boolean(),
            ParamDescriptor::new("bass_freq", "Bass Mono Freq", 120.0)
                .with_range(20.0, 500.0)
                .with_unit("Hz")
                .logarithmic(),
            ParamDescriptor::new("pan", "Pan", 0.0).with_range(-1.0, 1.0),
            ParamDescriptor::new("invert_left", "Invert L", 0.0).boolean(),
            ParamDescriptor::new("invert_right", "Invert R", 0.0).boolean(),
        ]
    }

    fn on_parameter_change(&mut self, key: &str, value: f32) {
        let polarity = if is_on(value) { -1.0 } else { 1.0 };
        match key {
            "width" => self.width.set_target(value.clamp(0.0, 2.0)),
            "pan" => self.pan.set_target(value.clamp(-1.0, 1.0)),
            "invert_left" => self.polarity[0].set_target(polarity),
            "invert_right" => self.polarity[1].set_target(polarity),
            "bass_mono" => {
                let enabled = is_on(value);
                if enabled && !self.bass_mono {
                    for section in &mut self.side_highpass {
                        section.reset();
                    }
                }
                self.bass_mono = enabled;
            }
            "bass_freq" => self.bass_freq.set_target(value.clamp(20.0, 500.0)),
            _ => {}
        }
    }

    fn process(
        &mut self,
        block: &mut [StereoSample],
        _sidechain: Option<&[StereoSample]>,
        _ctx: &ProcessContext,
    ) {
        self.bass_freq.skip(block.len());
        self.update_highpass();

        for sample in block.iter_mut() {
            let mid = (sample.left + sample.right) * 0.5;
            let mut side = (sample.left - sample.right) * 0.5;
            if self.bass_mono {
                for section in &mut self.side_highpass {
                    side = section.process(side);
                }
            }
            side *= self.width.next();

            // Balance: unity at centre, the far side fades out
            let pan = self.pan.next();
            let gain_l = (1.0 - pan).min(1.0);
            let gain_r = (1.0 + pan).min(1.0);

            *sample = StereoSample::new(
                (mid + side) * gain_l * self.polarity[0].next(),
                (mid - side) * gain_r * self.polarity[1].next(),
            );
        }
    }

    fn reset(&mut self) {
        for section in &mut self.side_highpass {
            section.reset();
        }
        self.width.settle();
        self.pan.settle();
        self.bass_freq.settle();
        self.update_highpass();
        for p in &mut self.polarity {
            p.settle();
        }
    }
}
