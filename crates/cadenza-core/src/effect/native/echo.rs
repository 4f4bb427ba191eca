//! Multi-tap echo
//!
//! Up to eight independent taps, each with its own delay line, feedback
//! loop, lowpass, level and pan, mixed into one stereo bus. Disabled taps
//! keep running with their level faded to zero so toggling a tap never
//! reallocates or restarts anything.

use crate::dsp::{equal_power_pan, DelayLine, OnePole, SmoothedValue};
use crate::effect::{DryTap, EffectProcessor, EffectSettings, ParamDescriptor};
use crate::types::{ProcessContext, StereoSample};

use super::is_on;

/// Number of taps
pub const MAX_TAPS: usize = 8;

/// Tempo sync grid in quarter-note beats, from a 1/16 note up to a half note
pub const SYNC_BEATS: [f32; 7] = [0.25, 0.375, 0.5, 0.75, 1.0, 1.5, 2.0];

const MIN_TIME_MS: f32 = 1.0;
const MAX_TIME_MS: f32 = 2000.0;
const MAX_FEEDBACK: f32 = 0.95;

#[derive(Clone, Copy, PartialEq, Eq)]
enum TapField {
    Time,
    Level,
    Pan,
    Feedback,
    Cutoff,
    Enabled,
}

impl TapField {
    fn parse(key: &str) -> Option<(usize, TapField)> {
        let rest = key.strip_prefix("tap")?;
        let (index, field) = rest.split_once('_')?;
        let index: usize = index.parse().ok()?;
        if index >= MAX_TAPS {
            return None;
        }
        let field = match field {
            "time" => TapField::Time,
            "level" => TapField::Level,
            "pan" => TapField::Pan,
            "feedback" => TapField::Feedback,
            "cutoff" => TapField::Cutoff,
            "enabled" => TapField::Enabled,
            _ => return None,
        };
        Some((index, field))
    }
}

/// Snap `ms` to the nearest sync value at `bpm`
pub(crate) fn snap_to_beats(ms: f32, bpm: f64) -> f32 {
    let beat_ms = 60_000.0 / bpm.max(1.0) as f32;
    let beats = ms / beat_ms;
    let nearest = SYNC_BEATS
        .iter()
        .copied()
        .min_by(|a, b| (a - beats).abs().total_cmp(&(b - beats).abs()))
        .unwrap_or(1.0);
    nearest * beat_ms
}

struct Tap {
    line: DelayLine,
    filter: OnePole,
    delay: SmoothedValue,
    gain_l: SmoothedValue,
    gain_r: SmoothedValue,
    feedback: SmoothedValue,
    cutoff: SmoothedValue,
    time_ms: f32,
    level: f32,
    pan: f32,
    enabled: bool,
}

impl Tap {
    fn new(index: usize, settings: &EffectSettings) -> Self {
        let sr = settings.sample_rate;
        Self {
            line: DelayLine::with_max_seconds(MAX_TIME_MS / 1000.0, sr),
            filter: OnePole::new(8000.0, sr),
            delay: settings.smoother(sr * 0.125),
            gain_l: settings.smoother(0.0),
            gain_r: settings.smoother(0.0),
            feedback: settings.smoother(0.0),
            cutoff: settings.smoother(8000.0),
            time_ms: default_time(index),
            level: default_level(index),
            pan: default_pan(index),
            enabled: index < 4,
        }
    }

    fn update_gains(&mut self) {
        let level = if self.enabled {
            self.level.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let (l, r) = equal_power_pan(self.pan);
        self.gain_l.set_target(level * l);
        self.gain_r.set_target(level * r);
    }

    fn settle(&mut self, sample_rate: f32) {
        self.delay.settle();
        self.gain_l.settle();
        self.gain_r.settle();
        self.feedback.settle();
        self.cutoff.settle();
        self.filter.set_cutoff(self.cutoff.current(), sample_rate);
    }
}

fn default_time(index: usize) -> f32 {
    125.0 * (index + 1) as f32
}

fn default_level(index: usize) -> f32 {
    0.8 - 0.08 * index as f32
}

fn default_pan(index: usize) -> f32 {
    if index % 2 == 0 {
        -0.5
    } else {
        0.5
    }
}

/// Multi-tap echo processor
pub struct MultiTapEcho {
    sample_rate: f32,
    taps: Vec<Tap>,
    sync: bool,
    bpm: f64,
}

impl MultiTapEcho {
    pub fn new(settings: &EffectSettings) -> Self {
        Self {
            sample_rate: settings.sample_rate,
            taps: (0..MAX_TAPS).map(|i| Tap::new(i, settings)).collect(),
            sync: false,
            bpm: crate::types::DEFAULT_BPM,
        }
    }

    fn update_time(&mut self, index: usize) {
        let tap = &mut self.taps[index];
        let mut ms = tap.time_ms.clamp(MIN_TIME_MS, MAX_TIME_MS);
        if self.sync {
            ms = snap_to_beats(ms, self.bpm).min(MAX_TIME_MS);
        }
        tap.delay.set_target((ms * 0.001 * self.sample_rate).max(1.0));
    }

    /// Effective delay of tap `index` in samples
    pub fn tap_delay_samples(&self, index: usize) -> f32 {
        self.taps[index].delay.target()
    }
}

impl EffectProcessor for MultiTapEcho {
    fn descriptors(&self) -> Vec<ParamDescriptor> {
        let mut params = Vec::with_capacity(MAX_TAPS * 6 + 2);
        for i in 0..MAX_TAPS {
            let n = i + 1;
            params.push(
                ParamDescriptor::new(format!("tap{}_time", i), format!("Tap {} Time", n), default_time(i))
                    .with_range(MIN_TIME_MS, MAX_TIME_MS)
                    .with_unit("ms"),
            );
            params.push(ParamDescriptor::new(
                format!("tap{}_level", i),
                format!("Tap {} Level", n),
                default_level(i),
            ));
            params.push(
                ParamDescriptor::new(format!("tap{}_pan", i), format!("Tap {} Pan", n), default_pan(i))
                    .with_range(-1.0, 1.0),
            );
            params.push(
                ParamDescriptor::new(format!("tap{}_feedback", i), format!("Tap {} Feedback", n), 0.0)
                    .with_range(0.0, MAX_FEEDBACK),
            );
            params.push(
                ParamDescriptor::new(format!("tap{}_cutoff", i), format!("Tap {} Cutoff", n), 8000.0)
                    .with_range(200.0, 20000.0)
                    .with_unit("Hz")
                    .logarithmic(),
            );
            params.push(
                ParamDescriptor::new(
                    format!("tap{}_enabled", i),
                    format!("Tap {} On", n),
                    if i < 4 { 1.0 } else { 0.0 },
                )
                .boolean(),
            );
        }
        params.push(ParamDescriptor::new("sync", "Tempo Sync", 0.0).boolean());
        params.push(ParamDescriptor::new("mix", "Mix", 0.35).with_unit("%"));
        params
    }

    fn on_parameter_change(&mut self, key: &str, value: f32) {
        if key == "sync" {
            self.sync = is_on(value);
            for i in 0..MAX_TAPS {
                self.update_time(i);
            }
            return;
        }
        let Some((index, field)) = TapField::parse(key) else {
            return;
        };
        let tap = &mut self.taps[index];
        match field {
            TapField::Time => {
                tap.time_ms = value;
                self.update_time(index);
            }
            TapField::Level => {
                tap.level = value;
                tap.update_gains();
            }
            TapField::Pan => {
                tap.pan = value;
                tap.update_gains();
            }
            TapField::Enabled => {
                tap.enabled = is_on(value);
                tap.update_gains();
            }
            TapField::Feedback => tap.feedback.set_target(value.clamp(0.0, MAX_FEEDBACK)),
            TapField::Cutoff => tap.cutoff.set_target(value.clamp(200.0, 20000.0)),
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
            for i in 0..MAX_TAPS {
                self.update_time(i);
            }
        }

        // Tap filters follow their cutoff at block rate
        for tap in &mut self.taps {
            if !tap.cutoff.is_settled() {
                let fc = tap.cutoff.skip(block.len());
                tap.filter.set_cutoff(fc, self.sample_rate);
            }
        }

        for sample in block.iter_mut() {
            let input = sample.mid();
            let mut out = StereoSample::silence();
            for tap in &mut self.taps {
                let d = tap.delay.next();
                let echo = tap.filter.process(tap.line.read_fractional(d));
                tap.line.write(input + echo * tap.feedback.next());
                out.left += echo * tap.gain_l.next();
                out.right += echo * tap.gain_r.next();
            }
            *sample = out;
        }
    }

    fn reset(&mut self) {
        for tap in &mut self.taps {
            tap.line.reset();
            tap.filter.reset();
            tap.settle(self.sample_rate);
        }
    }

    fn dry_tap(&self) -> DryTap {
        DryTap::Unity
    }

    fn is_delay_capable(&self) -> bool {
        true
    }
}
