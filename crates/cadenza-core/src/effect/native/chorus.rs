//! Chorus / Flanger - multi-voice modulated delay
//!
//! N voices (2-4) read one stereo delay line at positions swept by a shared
//! LFO; each voice sits at its own phase offset and a slightly smaller depth
//! than the one before. Voices are spread across the stereo field and each
//! is scaled by `1 / voices` so the level doesn't depend on the voice count.
//! The flanger is the same processor with short delays and feedback.

use crate::dsp::{DelayLine, Oscillator, SmoothedValue, Waveform};
use crate::effect::{DryTap, EffectProcessor, EffectSettings, ParamDescriptor, Telemetry};
use crate::types::{ProcessContext, StereoSample};

const MAX_VOICES: usize = 4;
const MIN_VOICES: usize = 2;
const MAX_LINE_SECONDS: f32 = 0.06;
const MAX_FEEDBACK: f32 = 0.9;
/// Each further voice sweeps this much less of the depth
const VOICE_DEPTH_STEP: f32 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Chorus,
    Flanger,
}

/// Parameter defaults and ranges per mode
struct Voicing {
    delay_range: (f32, f32),
    delay: f32,
    depth: f32,
    rate: f32,
    feedback: f32,
    spread: f32,
}

impl Mode {
    fn voicing(&self) -> Voicing {
        match self {
            Mode::Chorus => Voicing {
                delay_range: (5.0, 40.0),
                delay: 15.0,
                depth: 3.0,
                rate: 0.8,
                feedback: 0.0,
                spread: 0.8,
            },
            Mode::Flanger => Voicing {
                delay_range: (0.5, 10.0),
                delay: 2.0,
                depth: 1.5,
                rate: 0.25,
                feedback: 0.5,
                spread: 0.5,
            },
        }
    }
}

#[derive(Clone, Copy)]
struct Voice {
    gain_l: SmoothedValue,
    gain_r: SmoothedValue,
}

/// Chorus and flanger processor
pub struct Chorus {
    mode: Mode,
    sample_rate: f32,
    lines: [DelayLine; 2],
    lfo: Oscillator,
    voices: [Voice; MAX_VOICES],
    voice_count: usize,
    spread: f32,
    delay_ms: SmoothedValue,
    depth_ms: SmoothedValue,
    feedback: SmoothedValue,
    last_wet: StereoSample,
}

impl Chorus {
    /// Chorus voicing (5-40 ms delays, no feedback)
    pub fn new(settings: &EffectSettings) -> Self {
        Self::with_mode(Mode::Chorus, settings)
    }

    /// Flanger voicing (0.5-10 ms delays, feedback)
    pub fn flanger(settings: &EffectSettings) -> Self {
        Self::with_mode(Mode::Flanger, settings)
    }

    fn with_mode(mode: Mode, settings: &EffectSettings) -> Self {
        let sr = settings.sample_rate;
        let v = mode.voicing();
        let voice = Voice {
            gain_l: settings.smoother(0.0),
            gain_r: settings.smoother(0.0),
        };
        let mut chorus = Self {
            mode,
            sample_rate: sr,
            lines: [
                DelayLine::with_max_seconds(MAX_LINE_SECONDS, sr),
                DelayLine::with_max_seconds(MAX_LINE_SECONDS, sr),
            ],
            lfo: Oscillator::new(Waveform::Sine, v.rate, sr),
            voices: [voice; MAX_VOICES],
            voice_count: MIN_VOICES,
            spread: v.spread,
            delay_ms: settings.smoother(v.delay),
            depth_ms: settings.smoother(v.depth),
            feedback: settings.smoother(v.feedback),
            last_wet: StereoSample::silence(),
        };
        chorus.update_voices();
        chorus
    }

    fn update_voices(&mut self) {
        let n = self.voice_count;
        let gain = 1.0 / n as f32;
        for (i, voice) in self.voices.iter_mut().enumerate() {
            if i >= n {
                voice.gain_l.set_target(0.0);
                voice.gain_r.set_target(0.0);
                continue;
            }
            // Voices spread evenly from left to right
            let position = if n > 1 {
                i as f32 / (n - 1) as f32 * 2.0 - 1.0
            } else {
                0.0
            };
            let pan = position * self.spread;
            voice.gain_l.set_target(gain * (1.0 - pan).min(1.0));
            voice.gain_r.set_target(gain * (1.0 + pan).min(1.0));
        }
    }

    pub fn voice_count(&self) -> usize {
        self.voice_count
    }
}

impl EffectProcessor for Chorus {
    fn descriptors(&self) -> Vec<ParamDescriptor> {
        let v = self.mode.voicing();
        vec![
            ParamDescriptor::new("voices", "Voices", MIN_VOICES as f32)
                .with_range(MIN_VOICES as f32, MAX_VOICES as f32)
                .with_step(1.0),
            ParamDescriptor::new("delay", "Delay", v.delay)
                .with_range(v.delay_range.0, v.delay_range.1)
                .with_unit("ms"),
            ParamDescriptor::new("depth", "Depth", v.depth)
                .with_range(0.0, 10.0)
                .with_unit("ms"),
            ParamDescriptor::new("rate", "Rate", v.rate)
                .with_range(0.05, 10.0)
                .with_unit("Hz")
                .logarithmic(),
            ParamDescriptor::new("feedback", "Feedback", v.feedback)
                .with_range(-MAX_FEEDBACK, MAX_FEEDBACK),
            ParamDescriptor::new("spread", "Stereo Spread", v.spread),
            ParamDescriptor::new("mix", "Mix", 0.5).with_unit("%"),
        ]
    }

    fn on_parameter_change(&mut self, key: &str, value: f32) {
        let range = self.mode.voicing().delay_range;
        match key {
            "voices" => {
                self.voice_count = (value.round() as usize).clamp(MIN_VOICES, MAX_VOICES);
                self.update_voices();
            }
            "delay" => self.delay_ms.set_target(value.clamp(range.0, range.1)),
            "depth" => self.depth_ms.set_target(value.clamp(0.0, 10.0)),
            "rate" => self.lfo.set_frequency(value.clamp(0.05, 10.0), self.sample_rate),
            "feedback" => self
                .feedback
                .set_target(value.clamp(-MAX_FEEDBACK, MAX_FEEDBACK)),
            "spread" => {
                self.spread = value.clamp(0.0, 1.0);
                self.update_voices();
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
        let ms_to_samples = self.sample_rate * 0.001;
        let n = self.voice_count as f32;

        for sample in block.iter_mut() {
            let base = self.delay_ms.next();
            let depth = self.depth_ms.next();
            let feedback = self.feedback.next();

            self.lines[0].write(sample.left + feedback * self.last_wet.left);
            self.lines[1].write(sample.right + feedback * self.last_wet.right);

            let mut wet = StereoSample::silence();
            for (i, voice) in self.voices.iter_mut().enumerate() {
                let gl = voice.gain_l.next();
                let gr = voice.gain_r.next();
                if gl == 0.0 && gr == 0.0 {
                    continue;
                }
                let lfo = 0.5 * (1.0 + self.lfo.value_at(i as f32 / n));
                let voice_depth = depth * (1.0 - VOICE_DEPTH_STEP * i as f32);
                let d = ((base + voice_depth * lfo) * ms_to_samples).max(1.0);
                wet.left += gl * self.lines[0].read_fractional(d);
                wet.right += gr * self.lines[1].read_fractional(d);
            }
            self.lfo.advance(1);

            self.last_wet = wet;
            *sample = wet;
        }
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.reset();
        }
        self.lfo.reset();
        self.last_wet = StereoSample::silence();
        for voice in &mut self.voices {
            voice.gain_l.settle();
            voice.gain_r.settle();
        }
        self.delay_ms.settle();
        self.depth_ms.settle();
        self.feedback.settle();
    }

    fn dry_tap(&self) -> DryTap {
        DryTap::Complement
    }

    fn is_delay_capable(&self) -> bool {
        true
    }

    fn telemetry(&self) -> Telemetry {
        Telemetry::LfoPhase(self.lfo.phase())
    }
}
