//! Stereo Delay effect
//!
//! A stereo delay with:
//! - Delay time in ms (1 ms to 5 s) or tempo-synced to a note value
//! - Feedback through a one-pole lowpass
//! - Optional ping-pong mode (cross-feedback, half time per side)

use crate::dsp::{DelayLine, OnePole, SmoothedValue};
use crate::effect::{DryTap, EffectProcessor, EffectSettings, ParamDescriptor};
use crate::types::{ProcessContext, StereoSample};

use super::{is_on, option_index};

/// Maximum delay time in seconds
const MAX_DELAY_SECONDS: f32 = 5.0;
/// Feedback is held strictly below unity
const MAX_FEEDBACK: f32 = 0.95;

/// Tempo-synced delay times (in beats)
pub const NOTE_VALUES: [(f32, &str); 9] = [
    (0.25, "1/16"),
    (1.0 / 3.0, "1/8T"),
    (0.5, "1/8"),
    (2.0 / 3.0, "1/4T"),
    (0.75, "1/8D"),
    (1.0, "1/4"),
    (1.5, "1/4D"),
    (2.0, "1/2"),
    (4.0, "1/1"),
];

/// Convert beats to milliseconds at given BPM
pub fn beats_to_ms(beats: f32, bpm: f64) -> f32 {
    let beat_duration_ms = 60_000.0 / bpm.max(1.0) as f32;
    beats * beat_duration_ms
}

/// Stereo delay with filtered feedback
///
/// In ping-pong mode the left line feeds the right and vice versa, and each
/// side runs at half the nominal time so a full L→R→L round trip takes the
/// nominal delay. Self-feedback and cross-feedback are never both non-zero.
pub struct StereoDelay {
    sample_rate: f32,
    lines: [DelayLine; 2],
    damping: [OnePole; 2],
    delay_samples: SmoothedValue,
    self_feedback: SmoothedValue,
    cross_feedback: SmoothedValue,
    cutoff: SmoothedValue,
    time_ms: f32,
    feedback: f32,
    ping_pong: bool,
    sync: bool,
    note: usize,
    bpm: f64,
}

impl StereoDelay {
    pub fn new(settings: &EffectSettings) -> Self {
        let sr = settings.sample_rate;
        Self {
            sample_rate: sr,
            lines: [
                DelayLine::with_max_seconds(MAX_DELAY_SECONDS, sr),
                DelayLine::with_max_seconds(MAX_DELAY_SECONDS, sr),
            ],
            damping: [OnePole::new(8000.0, sr), OnePole::new(8000.0, sr)],
            delay_samples: settings.smoother(0.375 * sr),
            self_feedback: settings.smoother(0.4),
            cross_feedback: settings.smoother(0.0),
            cutoff: settings.smoother(8000.0),
            time_ms: 375.0,
            feedback: 0.4,
            ping_pong: false,
            sync: false,
            note: 5,
            bpm: crate::types::DEFAULT_BPM,
        }
    }

    /// Nominal delay time in ms after tempo sync
    fn nominal_ms(&self) -> f32 {
        if self.sync {
            beats_to_ms(NOTE_VALUES[self.note].0, self.bpm)
        } else {
            self.time_ms
        }
    }

    fn update_time(&mut self) {
        let mut ms = self.nominal_ms().clamp(1.0, MAX_DELAY_SECONDS * 1000.0);
        if self.ping_pong {
            ms *= 0.5;
        }
        let samples = (ms * 0.001 * self.sample_rate).max(1.0);
        self.delay_samples.set_target(samples);
    }

    fn update_feedback(&mut self) {
        let fb = self.feedback.clamp(0.0, MAX_FEEDBACK);
        if self.ping_pong {
            self.self_feedback.set_target(0.0);
            self.cross_feedback.set_target(fb);
        } else {
            self.self_feedback.set_target(fb);
            self.cross_feedback.set_target(0.0);
        }
    }

    /// Current delay per side in samples
    pub fn delay_samples(&self) -> f32 {
        self.delay_samples.target()
    }
}

impl EffectProcessor for StereoDelay {
    fn descriptors(&self) -> Vec<ParamDescriptor> {
        vec![
            ParamDescriptor::new("time", "Time", 375.0)
                .with_range(1.0, MAX_DELAY_SECONDS * 1000.0)
                .with_unit("ms")
                .logarithmic(),
            ParamDescriptor::new("feedback", "Feedback", 0.4).with_range(0.0, MAX_FEEDBACK),
            ParamDescriptor::new("cutoff", "Feedback Cutoff", 8000.0)
                .with_range(200.0, 20000.0)
                .with_unit("Hz")
                .logarithmic(),
            ParamDescriptor::new("ping_pong", "Ping-Pong", 0.0).boolean(),
            ParamDescriptor::new("sync", "Tempo Sync", 0.0).boolean(),
            ParamDescriptor::new("note", "Note", 5.0)
                .with_options(&NOTE_VALUES.map(|(_, label)| label)),
            ParamDescriptor::new("mix", "Mix", 0.35).with_unit("%"),
        ]
    }

    fn on_parameter_change(&mut self, key: &str, value: f32) {
        match key {
            "time" => {
                self.time_ms = value;
                self.update_time();
            }
            "feedback" => {
                self.feedback = value;
                self.update_feedback();
            }
            "cutoff" => self.cutoff.set_target(value.clamp(200.0, 20000.0)),
            "ping_pong" => {
                self.ping_pong = is_on(value);
                self.update_feedback();
                self.update_time();
            }
            "sync" => {
                self.sync = is_on(value);
                self.update_time();
            }
            "note" => {
                self.note = option_index(value, NOTE_VALUES.len());
                self.update_time();
            }
            _ => {}
        }
    }

    fn process(
        &mut self,
        block: &mut [StereoSample],
        _sidechain: Option<&[StereoSample]>,
        ctx: &ProcessContext,
    ) {
        if self.sync && ctx.bpm != self.bpm {
            self.bpm = ctx.bpm;
            self.update_time();
        }

        // Filter cutoff moves at block rate
        if !self.cutoff.is_settled() {
            let fc = self.cutoff.skip(block.len());
            for lp in &mut self.damping {
                lp.set_cutoff(fc, self.sample_rate);
            }
        }

        for sample in block.iter_mut() {
            let d = self.delay_samples.next();
            let self_fb = self.self_feedback.next();
            let cross_fb = self.cross_feedback.next();

            let delayed_l = self.lines[0].read_fractional(d);
            let delayed_r = self.lines[1].read_fractional(d);
            let fb_l = self.damping[0].process(delayed_l);
            let fb_r = self.damping[1].process(delayed_r);

            self.lines[0].write(sample.left + self_fb * fb_l + cross_fb * fb_r);
            self.lines[1].write(sample.right + self_fb * fb_r + cross_fb * fb_l);

            *sample = StereoSample::new(delayed_l, delayed_r);
        }
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.reset();
        }
        self.cutoff.settle();
        for lp in &mut self.damping {
            lp.set_cutoff(self.cutoff.current(), self.sample_rate);
            lp.reset();
        }
        self.delay_samples.settle();
        self.self_feedback.settle();
        self.cross_feedback.settle();
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

    fn delay(overrides: &[(&str, f32)]) -> StereoDelay {
        configure(StereoDelay::new(&EffectSettings::default()), overrides)
    }

    fn first_peak(signal: &[StereoSample]) -> usize {
        signal
            .iter()
            .position(|s| s.left.abs() > 0.5)
            .unwrap_or(usize::MAX)
    }

    #[test]
    fn test_echo_arrives_at_delay_time() {
        for time_ms in [1.0, 10.0, 100.0, 750.0] {
            let mut fx = delay(&[("time", time_ms), ("feedback", 0.0), ("cutoff", 20000.0)]);
            let mut signal = impulse(48000, 1.0, 1.0);
            run(&mut fx, &mut signal);
            let expected = (time_ms * 0.001 * SR).round() as i64;
            let found = first_peak(&signal) as i64;
            assert!((found - expected).abs() <= 1, "{} ms: {} vs {}", time_ms, found, expected);
        }
    }

    #[test]
    fn test_long_delay_time() {
        let mut fx = delay(&[("time", 5000.0), ("feedback", 0.0)]);
        let mut signal = impulse(5 * 48000 + 64, 1.0, 1.0);
        run(&mut fx, &mut signal);
        let found = first_peak(&signal) as i64;
        assert!((found - 240000).abs() <= 1, "found {}", found);
    }

    #[test]
    fn test_feedback_repeats_decay() {
        let mut fx = delay(&[("time", 50.0), ("feedback", 0.9)]);
        let mut signal = impulse(48000 * 2, 1.0, 1.0);
        run(&mut fx, &mut signal);

        let period = 2400;
        let mut previous = f32::MAX;
        for k in 1..30 {
            let window = &signal[k * period - period / 2..k * period + period / 2];
            let peak = window.iter().map(|s| s.left.abs()).fold(0.0, f32::max);
            assert!(peak.is_finite());
            assert!(peak < previous, "repeat {} did not decay: {} >= {}", k, peak, previous);
            previous = peak;
        }
    }

    #[test]
    fn test_feedback_is_clamped_below_unity() {
        let mut fx = delay(&[("time", 10.0), ("feedback", 5.0), ("cutoff", 20000.0)]);
        let mut signal = impulse(48000 * 4, 1.0, 1.0);
        run(&mut fx, &mut signal);
        let tail = signal[signal.len() - 4800..]
            .iter()
            .map(|s| s.left.abs())
            .fold(0.0, f32::max);
        assert!(tail < 0.01, "tail {}", tail);
    }

    #[test]
    fn test_ping_pong_matches_mono_energy() {
        let overrides = [("time", 100.0), ("feedback", 0.5), ("cutoff", 20000.0)];
        let mut mono = delay(&overrides);
        let mut pong = delay(&[overrides[0], overrides[1], overrides[2], ("ping_pong", 1.0)]);

        let mut a = impulse(48000 * 2, 1.0, 0.0);
        let mut b = a.clone();
        run(&mut mono, &mut a);
        run(&mut pong, &mut b);

        let (ea, eb) = (energy(&a), energy(&b));
        assert!(ea > 0.1);
        assert!((ea - eb).abs() / ea < 1e-3, "mono {} vs ping-pong {}", ea, eb);
    }

    #[test]
    fn test_ping_pong_alternates_sides() {
        let mut fx = delay(&[("time", 100.0), ("feedback", 0.5), ("ping_pong", 1.0)]);
        let mut signal = impulse(48000, 1.0, 0.0);
        run(&mut fx, &mut signal);
        // Half time per side: first echo on the left at 50 ms, then the right
        assert!(signal[2400].left > 0.5);
        assert!(signal[4800].right.abs() > 0.1);
        assert!(signal[4800].left.abs() < 1e-3);
    }

    #[test]
    fn test_ping_pong_zeroes_self_feedback() {
        let mut fx = delay(&[("ping_pong", 1.0), ("feedback", 0.6)]);
        assert_eq!(fx.self_feedback.target(), 0.0);
        assert!((fx.cross_feedback.target() - 0.6).abs() < 1e-6);
        fx.on_parameter_change("ping_pong", 0.0);
        assert_eq!(fx.cross_feedback.target(), 0.0);
        assert!((fx.self_feedback.target() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_tempo_sync() {
        let ms = beats_to_ms(1.0, 120.0); // 1 beat at 120 BPM = 500ms
        assert!((ms - 500.0).abs() < 0.1);

        let fx = delay(&[("sync", 1.0), ("note", 2.0)]); // 1/8 at 120 BPM
        assert!((fx.delay_samples() - 0.25 * SR).abs() < 1.0);
    }

    #[test]
    fn test_reset_clears_lines() {
        let mut fx = delay(&[("time", 10.0)]);
        let mut signal = vec![StereoSample::mono(1.0); 4096];
        run(&mut fx, &mut signal);
        fx.reset();
        let mut silence = vec![StereoSample::silence(); 1024];
        run(&mut fx, &mut silence);
        assert!(silence.iter().all(|s| s.left == 0.0 && s.right == 0.0));
    }
}
