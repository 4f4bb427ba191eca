//! Feed-forward compressor with soft knee and optional sidechain
//!
//! The detector measures either the stereo peak or a running RMS of the
//! key signal (the sidechain on input 1 when one is connected, the main
//! input otherwise) and converts it to dB. The static curve turns that level
//! into a gain reduction, which an attack/release envelope follower smooths
//! in the dB domain before it's applied together with the makeup gain.

use crate::dsp::{db_to_gain, gain_to_db};
use crate::effect::{EffectProcessor, EffectSettings, ParamDescriptor, Telemetry};
use crate::types::{ProcessContext, StereoSample};

use super::option_index;

const DETECTORS: [&str; 2] = ["Peak", "RMS"];
/// RMS averaging window
const RMS_WINDOW_MS: f32 = 10.0;

/// Gain reduction in dB for a detector level, using a quadratic soft knee
/// of `knee_db` width centred on the threshold
pub fn gain_reduction_db(level_db: f32, threshold_db: f32, ratio: f32, knee_db: f32) -> f32 {
    let ratio = ratio.max(1.0);
    let over = level_db - threshold_db;
    let slope = 1.0 - 1.0 / ratio;
    if knee_db > 0.0 && 2.0 * over.abs() <= knee_db {
        let x = over + knee_db * 0.5;
        slope * x * x / (2.0 * knee_db)
    } else if over > 0.0 {
        slope * over
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Detector {
    Peak,
    Rms,
}

/// Dynamic range compressor
pub struct Compressor {
    sample_rate: f32,
    threshold_db: f32,
    ratio: f32,
    knee_db: f32,
    makeup: f32,
    detector: Detector,
    attack_coeff: f32,
    release_coeff: f32,
    rms_coeff: f32,
    mean_square: f32,
    /// Smoothed gain reduction in dB (≥ 0)
    envelope: f32,
}

impl Compressor {
    pub fn new(settings: &EffectSettings) -> Self {
        let sr = settings.sample_rate;
        Self {
            sample_rate: sr,
            threshold_db: -18.0,
            ratio: 4.0,
            knee_db: 6.0,
            makeup: 1.0,
            detector: Detector::Peak,
            attack_coeff: time_coefficient(10.0, sr),
            release_coeff: time_coefficient(100.0, sr),
            rms_coeff: time_coefficient(RMS_WINDOW_MS, sr),
            mean_square: 0.0,
            envelope: 0.0,
        }
    }

    /// Current gain reduction in dB
    pub fn gain_reduction(&self) -> f32 {
        self.envelope
    }

    #[inline]
    fn detect(&mut self, key: StereoSample) -> f32 {
        match self.detector {
            Detector::Peak => gain_to_db(key.peak()),
            Detector::Rms => {
                let square = 0.5 * (key.left * key.left + key.right * key.right);
                self.mean_square = square + (self.mean_square - square) * self.rms_coeff;
                gain_to_db(self.mean_square.sqrt())
            }
        }
    }
}

/// One-pole coefficient for a time constant in milliseconds
fn time_coefficient(ms: f32, sample_rate: f32) -> f32 {
    (-1.0 / (ms * 0.001 * sample_rate)).exp()
}

impl EffectProcessor for Compressor {
    fn descriptors(&self) -> Vec<ParamDescriptor> {
        vec![
            ParamDescriptor::new("threshold", "Threshold", -18.0)
                .with_range(-60.0, 0.0)
                .with_unit("dB"),
            ParamDescriptor::new("ratio", "Ratio", 4.0)
                .with_range(1.0, 20.0)
                .logarithmic(),
            ParamDescriptor::new("attack", "Attack", 10.0)
                .with_range(0.1, 200.0)
                .with_unit("ms")
                .logarithmic(),
            ParamDescriptor::new("release", "Release", 100.0)
                .with_range(5.0, 2000.0)
                .with_unit("ms")
                .logarithmic(),
            ParamDescriptor::new("knee", "Knee", 6.0)
                .with_range(0.0, 24.0)
                .with_unit("dB"),
            ParamDescriptor::new("makeup", "Makeup", 0.0)
                .with_range(0.0, 24.0)
                .with_unit("dB"),
            ParamDescriptor::new("detector", "Detector", 0.0).with_options(&DETECTORS),
        ]
    }

    fn on_parameter_change(&mut self, key: &str, value: f32) {
        match key {
            "threshold" => self.threshold_db = value.clamp(-60.0, 0.0),
            "ratio" => self.ratio = value.clamp(1.0, 20.0),
            "attack" => self.attack_coeff = time_coefficient(value.clamp(0.1, 200.0), self.sample_rate),
            "release" => {
                self.release_coeff = time_coefficient(value.clamp(5.0, 2000.0), self.sample_rate)
            }
            "knee" => self.knee_db = value.clamp(0.0, 24.0),
            "makeup" => self.makeup = db_to_gain(value.clamp(0.0, 24.0)),
            "detector" => {
                self.detector = match option_index(value, DETECTORS.len()) {
                    0 => Detector::Peak,
                    _ => Detector::Rms,
                }
            }
            _ => {}
        }
    }

    fn process(
        &mut self,
        block: &mut [StereoSample],
        sidechain: Option<&[StereoSample]>,
        _ctx: &ProcessContext,
    ) {
        for (i, sample) in block.iter_mut().enumerate() {
            let key = sidechain.and_then(|s| s.get(i)).copied().unwrap_or(*sample);
            let level = self.detect(key);
            let target = gain_reduction_db(level, self.threshold_db, self.ratio, self.knee_db);

            let coeff = if target > self.envelope {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope = target + (self.envelope - target) * coeff;

            *sample *= db_to_gain(-self.envelope) * self.makeup;
        }
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
        self.mean_square = 0.0;
    }

    fn telemetry(&self) -> Telemetry {
        Telemetry::GainReduction(self.envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::native::testing::{configure, run, sine, SR};

    fn compressor(overrides: &[(&str, f32)]) -> Compressor {
        configure(Compressor::new(&EffectSettings::default()), overrides)
    }

    #[test]
    fn test_static_curve() {
        // Hard knee: 12 dB over at 4:1 → 9 dB reduction
        assert!((gain_reduction_db(-8.0, -20.0, 4.0, 0.0) - 9.0).abs() < 1e-4);
        assert_eq!(gain_reduction_db(-30.0, -20.0, 4.0, 6.0), 0.0);
        // At the threshold a soft knee already reduces a little
        let at_threshold = gain_reduction_db(-20.0, -20.0, 4.0, 6.0);
        assert!((at_threshold - 0.5625).abs() < 1e-4);
        // Above the knee the soft curve meets the hard one
        let above = gain_reduction_db(-10.0, -20.0, 4.0, 6.0);
        assert!((above - 7.5).abs() < 1e-4);
    }

    #[test]
    fn test_ratio_below_one_is_unity() {
        assert_eq!(gain_reduction_db(0.0, -20.0, 0.5, 0.0), 0.0);
    }

    #[test]
    fn test_below_threshold_is_untouched() {
        let mut fx = compressor(&[("threshold", -10.0)]);
        let mut signal = sine(4800, 440.0, 0.1);
        let original = signal.clone();
        run(&mut fx, &mut signal);
        assert_eq!(signal, original);
    }

    #[test]
    fn test_settles_on_static_curve() {
        let mut fx = compressor(&[
            ("threshold", -20.0),
            ("ratio", 4.0),
            ("knee", 0.0),
            ("attack", 1.0),
        ]);
        let mut signal = vec![StereoSample::mono(0.5); SR as usize];
        run(&mut fx, &mut signal);
        let expected = 0.5 * db_to_gain(-gain_reduction_db(gain_to_db(0.5), -20.0, 4.0, 0.0));
        let last = signal[signal.len() - 1].left;
        assert!((last - expected).abs() < 1e-3, "{} vs {}", last, expected);
        match fx.telemetry() {
            Telemetry::GainReduction(db) => assert!((db - 10.5).abs() < 0.05),
            other => panic!("unexpected telemetry {:?}", other),
        }
    }

    #[test]
    fn test_sidechain_drives_reduction() {
        let mut fx = compressor(&[("threshold", -30.0), ("ratio", 10.0), ("knee", 0.0)]);
        let key = vec![StereoSample::mono(1.0); 128];
        let ctx = ProcessContext::new(SR);
        let mut block = vec![StereoSample::mono(0.01); 128];
        for _ in 0..100 {
            block.fill(StereoSample::mono(0.01));
            fx.process(&mut block, Some(&key), &ctx);
        }
        // Quiet main signal, loud key: 27 dB reduction
        assert!(block[127].left < 0.01 * db_to_gain(-25.0));
        assert!(fx.gain_reduction() > 25.0);
    }

    #[test]
    fn test_release_recovers() {
        let mut fx = compressor(&[("threshold", -20.0), ("release", 50.0)]);
        let mut loud = vec![StereoSample::mono(0.9); 9600];
        run(&mut fx, &mut loud);
        assert!(fx.gain_reduction() > 5.0);
        let mut quiet = vec![StereoSample::mono(0.001); 48000];
        run(&mut fx, &mut quiet);
        assert!(fx.gain_reduction() < 0.01);
    }

    #[test]
    fn test_makeup_gain() {
        let mut fx = compressor(&[("threshold", 0.0), ("makeup", 6.0)]);
        let mut signal = vec![StereoSample::mono(0.1); 256];
        run(&mut fx, &mut signal);
        assert!((signal[255].left - 0.1 * db_to_gain(6.0)).abs() < 1e-4);
    }
}
