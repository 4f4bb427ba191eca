//! Feedback delay network reverb
//!
//! Eight delay lines of staggered prime lengths. Every line output goes
//! through a one-pole damping lowpass, the eight damped signals are mixed by
//! an orthonormal Hadamard matrix (±1/√8), scaled by the feedback gain and
//! written back together with the band-limited, pre-delayed input.
//!
//! The Hadamard mix preserves energy and the damping filters never amplify,
//! so the loop gain is bounded by the feedback gain. That gain is clamped to
//! [`MAX_FEEDBACK`] before it reaches the network.

use crate::dsp::{DelayLine, OnePole, SmoothedValue};
use crate::effect::{DryTap, EffectProcessor, EffectSettings, ParamDescriptor};
use crate::types::{ProcessContext, StereoSample};

/// Upper bound on the network feedback gain
pub const MAX_FEEDBACK: f32 = 0.98;

const NUM_LINES: usize = 8;
/// Line lengths in samples at 44.1 kHz and full room size
const LINE_LENGTHS: [usize; NUM_LINES] = [1031, 1327, 1523, 1801, 2053, 2311, 2617, 2903];
const MIN_ROOM_SCALE: f32 = 0.3;
const MAX_PRE_DELAY_MS: f32 = 500.0;
const INPUT_GAIN: f32 = 0.5;
const OUTPUT_GAIN: f32 = 0.5;

/// In-place orthonormal 8-point Hadamard transform
#[inline]
pub(crate) fn hadamard(v: &mut [f32; NUM_LINES]) {
    let mut h = 1;
    while h < NUM_LINES {
        for i in (0..NUM_LINES).step_by(h * 2) {
            for j in i..i + h {
                let (a, b) = (v[j], v[j + h]);
                v[j] = a + b;
                v[j + h] = a - b;
            }
        }
        h *= 2;
    }
    let norm = 1.0 / (NUM_LINES as f32).sqrt();
    for x in v.iter_mut() {
        *x *= norm;
    }
}

/// Eight-line FDN reverb
pub struct FdnReverb {
    sample_rate: f32,
    lines: Vec<DelayLine>,
    lengths: [f32; NUM_LINES],
    damping: [OnePole; NUM_LINES],
    damping_coeff: SmoothedValue,
    bandwidth: OnePole,
    bandwidth_hz: SmoothedValue,
    pre_delay: DelayLine,
    pre_delay_samples: SmoothedValue,
    room: SmoothedValue,
    feedback: SmoothedValue,
}

impl FdnReverb {
    pub fn new(settings: &EffectSettings) -> Self {
        let sr = settings.sample_rate;
        let scale = sr / 44100.0;
        let lines = LINE_LENGTHS
            .iter()
            .map(|&len| DelayLine::new((len as f32 * scale).ceil() as usize + 1))
            .collect();
        let mut reverb = Self {
            sample_rate: sr,
            lines,
            lengths: [1.0; NUM_LINES],
            damping: [OnePole::new(sr * 0.5, sr); NUM_LINES],
            damping_coeff: settings.smoother(damping_coefficient(0.5)),
            bandwidth: OnePole::new(sr * 0.5, sr),
            bandwidth_hz: settings.smoother(bandwidth_cutoff(0.8)),
            pre_delay: DelayLine::with_max_seconds(MAX_PRE_DELAY_MS * 0.001, sr),
            pre_delay_samples: settings.smoother(0.0),
            room: settings.smoother(0.5),
            feedback: settings.smoother(0.8),
        };
        reverb.update_lengths(0.5);
        reverb.apply_filters();
        reverb
    }

    /// Feedback gain the network is running with
    pub fn feedback(&self) -> f32 {
        self.feedback.target()
    }

    /// Current line lengths in samples
    pub fn line_lengths(&self) -> [f32; NUM_LINES] {
        self.lengths
    }

    fn update_lengths(&mut self, room: f32) {
        let scale = (MIN_ROOM_SCALE + (1.0 - MIN_ROOM_SCALE) * room) * self.sample_rate / 44100.0;
        for (length, base) in self.lengths.iter_mut().zip(LINE_LENGTHS) {
            *length = (base as f32 * scale).max(1.0);
        }
    }

    fn apply_filters(&mut self) {
        let a = self.damping_coeff.current();
        for filter in &mut self.damping {
            filter.set_coefficient(a);
        }
        self.bandwidth.set_cutoff(self.bandwidth_hz.current(), self.sample_rate);
    }
}

/// Damping 0..1 → loop filter coefficient 1.0 .. 0.1
fn damping_coefficient(damping: f32) -> f32 {
    1.0 - 0.9 * damping.clamp(0.0, 1.0)
}

/// Bandwidth 0..1 → 200 Hz .. 20 kHz
fn bandwidth_cutoff(bandwidth: f32) -> f32 {
    200.0 * 100.0f32.powf(bandwidth.clamp(0.0, 1.0))
}

impl EffectProcessor for FdnReverb {
    fn descriptors(&self) -> Vec<ParamDescriptor> {
        vec![
            ParamDescriptor::new("room_size", "Room Size", 0.5),
            ParamDescriptor::new("damping", "Damping", 0.5),
            ParamDescriptor::new("bandwidth", "Input Bandwidth", 0.8),
            ParamDescriptor::new("feedback", "Decay", 0.8).with_range(0.0, MAX_FEEDBACK),
            ParamDescriptor::new("pre_delay", "Pre-Delay", 0.0)
                .with_range(0.0, MAX_PRE_DELAY_MS)
                .with_unit("ms"),
            ParamDescriptor::new("mix", "Mix", 0.3).with_unit("%"),
        ]
    }

    fn on_parameter_change(&mut self, key: &str, value: f32) {
        match key {
            "room_size" => self.room.set_target(value.clamp(0.0, 1.0)),
            "damping" => self.damping_coeff.set_target(damping_coefficient(value)),
            "bandwidth" => self.bandwidth_hz.set_target(bandwidth_cutoff(value)),
            "feedback" => self.feedback.set_target(value.clamp(0.0, MAX_FEEDBACK)),
            "pre_delay" => self
                .pre_delay_samples
                .set_target(value.clamp(0.0, MAX_PRE_DELAY_MS) * 0.001 * self.sample_rate),
            _ => {}
        }
    }

    fn process(
        &mut self,
        block: &mut [StereoSample],
        _sidechain: Option<&[StereoSample]>,
        _ctx: &ProcessContext,
    ) {
        let mut taps = [0.0f32; NUM_LINES];
        for sample in block.iter_mut() {
            if !self.room.is_settled() {
                let room = self.room.next();
                self.update_lengths(room);
            }
            if !self.damping_coeff.is_settled() || !self.bandwidth_hz.is_settled() {
                self.damping_coeff.next();
                self.bandwidth_hz.next();
                self.apply_filters();
            }
            let pre_delay = self.pre_delay_samples.next();
            let feedback = self.feedback.next();

            self.pre_delay.write(sample.mid());
            let input = self.bandwidth.process(self.pre_delay.read_fractional(pre_delay + 1.0));

            let mut out = [0.0f32; 2];
            for (i, line) in self.lines.iter().enumerate() {
                let tap = line.read_fractional(self.lengths[i]);
                out[i % 2] += tap;
                taps[i] = self.damping[i].process(tap);
            }
            hadamard(&mut taps);
            for (line, mixed) in self.lines.iter_mut().zip(taps) {
                line.write(input * INPUT_GAIN + mixed * feedback);
            }

            *sample = StereoSample::new(out[0] * OUTPUT_GAIN, out[1] * OUTPUT_GAIN);
        }
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.reset();
        }
        for filter in &mut self.damping {
            filter.reset();
        }
        self.bandwidth.reset();
        self.pre_delay.reset();
        self.pre_delay_samples.settle();
        self.feedback.settle();
        self.room.settle();
        self.damping_coeff.settle();
        self.bandwidth_hz.settle();
        self.update_lengths(self.room.current());
        self.apply_filters();
    }

    fn dry_tap(&self) -> DryTap {
        DryTap::Unity
    }

    fn is_delay_capable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::native::testing::{configure, energy, impulse, run, SR};

    fn reverb(overrides: &[(&str, f32)]) -> FdnReverb {
        configure(FdnReverb::new(&EffectSettings::default()), overrides)
    }

    fn first_nonzero(signal: &[StereoSample]) -> Option<usize> {
        signal.iter().position(|s| s.left != 0.0 || s.right != 0.0)
    }

    #[test]
    fn test_hadamard_preserves_energy() {
        let mut v = [0.3, -1.0, 0.5, 0.25, 0.0, 0.9, -0.4, 0.1];
        let before: f32 = v.iter().map(|x| x * x).sum();
        hadamard(&mut v);
        let after: f32 = v.iter().map(|x| x * x).sum();
        assert!((before - after).abs() < 1e-5);

        let mut unit = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        hadamard(&mut unit);
        let expected = 1.0 / 8.0f32.sqrt();
        assert!(unit.iter().all(|x| (x - expected).abs() < 1e-6));
    }

    #[test]
    fn test_tail_decays() {
        let mut fx = reverb(&[("feedback", 0.8)]);
        let mut signal = impulse(8192 * 4, 1.0, 1.0);
        run(&mut fx, &mut signal);
        let windows: Vec<f64> = signal.chunks(8192).map(energy).collect();
        assert!(windows[0] > 0.0);
        for pair in windows.windows(2) {
            assert!(pair[1] < pair[0], "energy grew: {:?}", windows);
        }
    }

    #[test]
    fn test_feedback_clamped_below_one() {
        let mut fx = reverb(&[("feedback", 10.0), ("damping", 0.0)]);
        assert_eq!(fx.feedback(), MAX_FEEDBACK);
        let mut signal = impulse(SR as usize * 6, 1.0, 1.0);
        run(&mut fx, &mut signal);
        assert!(signal.iter().all(|s| s.left.is_finite() && s.left.abs() < 10.0));
        let windows: Vec<f64> = signal.chunks(SR as usize).map(energy).collect();
        assert!(windows[5] < windows[1]);
    }

    #[test]
    fn test_room_size_scales_lines() {
        let small = reverb(&[("room_size", 0.0)]);
        let large = reverb(&[("room_size", 1.0)]);
        let scale = SR / 44100.0;
        assert!((small.line_lengths()[0] - 1031.0 * 0.3 * scale).abs() < 1e-3);
        assert!((large.line_lengths()[7] - 2903.0 * scale).abs() < 1e-3);
    }

    #[test]
    fn test_room_change_moves_lengths_per_sample() {
        let mut fx = reverb(&[("room_size", 0.0)]);
        let start = fx.line_lengths()[7];
        fx.on_parameter_change("room_size", 1.0);
        assert_eq!(fx.line_lengths()[7], start);

        let mut block = vec![StereoSample::silence(); 2];
        fx.process(&mut block, None, &ProcessContext::new(SR));
        let step = fx.line_lengths()[7] - start;
        assert!(step > 0.0 && step < 20.0, "step {}", step);
    }

    #[test]
    fn test_damping_and_bandwidth_glide() {
        let mut fx = reverb(&[("damping", 0.0), ("bandwidth", 0.0)]);
        let low_bandwidth = OnePole::new(200.0, SR).coefficient();
        let high_bandwidth = OnePole::new(20000.0, SR).coefficient();
        assert!((fx.damping[0].coefficient() - 1.0).abs() < 1e-6);
        assert!((fx.bandwidth.coefficient() - low_bandwidth).abs() < 1e-6);

        fx.on_parameter_change("damping", 1.0);
        fx.on_parameter_change("bandwidth", 1.0);
        assert!((fx.damping[0].coefficient() - 1.0).abs() < 1e-6);

        let mut block = vec![StereoSample::silence(); 16];
        fx.process(&mut block, None, &ProcessContext::new(SR));
        let damping = fx.damping[0].coefficient();
        let bandwidth = fx.bandwidth.coefficient();
        assert!(damping > 0.5 && damping < 1.0, "damping {}", damping);
        assert!(bandwidth > low_bandwidth && bandwidth < high_bandwidth, "bandwidth {}", bandwidth);

        let mut tail = vec![StereoSample::silence(); SR as usize / 2];
        run(&mut fx, &mut tail);
        assert!((fx.damping[0].coefficient() - 0.1).abs() < 1e-4);
        assert!((fx.bandwidth.coefficient() - high_bandwidth).abs() < 1e-4);
    }

    #[test]
    fn test_pre_delay_shifts_onset() {
        let mut fx = reverb(&[("room_size", 0.0), ("pre_delay", 100.0)]);
        let mut signal = impulse(16384, 1.0, 1.0);
        run(&mut fx, &mut signal);
        // Linear interpolation puts the first nonzero tap at the whole part
        let shortest = fx.line_lengths()[0].floor() as usize;
        assert_eq!(first_nonzero(&signal), Some(4800 + shortest));

        let mut fx = reverb(&[("room_size", 0.0)]);
        let mut signal = impulse(16384, 1.0, 1.0);
        run(&mut fx, &mut signal);
        assert_eq!(first_nonzero(&signal), Some(shortest));
    }
}
