//! Three-band parametric EQ (low shelf, peaking mid, high shelf)

use crate::dsp::biquad::BUTTERWORTH_Q;
use crate::dsp::{gain_to_db, BiquadCoeffs, FilterType, SmoothedValue, StereoBiquad};
use crate::effect::{EffectProcessor, EffectSettings, ParamDescriptor, Telemetry};
use crate::types::{ProcessContext, StereoSample};

const MAX_GAIN_DB: f32 = 24.0;
/// Gains closer to 0 dB than this leave the band out of the signal path
const FLAT_DB: f32 = 0.01;
const RESPONSE_POINTS: usize = 64;

struct Band {
    kind: FilterType,
    freq: SmoothedValue,
    gain_db: SmoothedValue,
    q: SmoothedValue,
    filter: StereoBiquad,
    applied: (f32, f32, f32),
}

impl Band {
    fn new(kind: FilterType, freq: f32, q: f32, settings: &EffectSettings) -> Self {
        let mut band = Self {
            kind,
            freq: settings.smoother(freq),
            gain_db: settings.smoother(0.0),
            q: settings.smoother(q),
            filter: StereoBiquad::passthrough(),
            applied: (f32::NAN, f32::NAN, f32::NAN),
        };
        band.design(settings.sample_rate);
        band
    }

    fn is_flat(&self) -> bool {
        self.gain_db.is_settled() && self.gain_db.current().abs() < FLAT_DB
    }

    fn coeffs(&self, sample_rate: f32) -> BiquadCoeffs {
        BiquadCoeffs::design(
            self.kind,
            self.freq.current(),
            self.q.current(),
            self.gain_db.current(),
            sample_rate,
        )
    }

    fn design(&mut self, sample_rate: f32) {
        let settings = (self.freq.current(), self.gain_db.current(), self.q.current());
        if settings != self.applied {
            self.filter.set_coeffs(self.coeffs(sample_rate));
            self.applied = settings;
        }
    }
}

/// Low shelf, peaking mid and high shelf in series
pub struct ParametricEq {
    sample_rate: f32,
    bands: [Band; 3],
}

impl ParametricEq {
    pub fn new(settings: &EffectSettings) -> Self {
        Self {
            sample_rate: settings.sample_rate,
            bands: [
                Band::new(FilterType::LowShelf, 100.0, BUTTERWORTH_Q, settings),
                Band::new(FilterType::Peaking, 1000.0, BUTTERWORTH_Q, settings),
                Band::new(FilterType::HighShelf, 8000.0, BUTTERWORTH_Q, settings),
            ],
        }
    }

    /// Combined magnitude response in dB at `freq`
    pub fn response_db(&self, freq: f32) -> f32 {
        let magnitude: f32 = self
            .bands
            .iter()
            .filter(|b| !b.is_flat())
            .map(|b| b.coeffs(self.sample_rate).magnitude(freq, self.sample_rate))
            .product();
        gain_to_db(magnitude)
    }
}

impl EffectProcessor for ParametricEq {
    fn descriptors(&self) -> Vec<ParamDescriptor> {
        let gain = |key: &'static str, label: &'static str| {
            ParamDescriptor::new(key, label, 0.0)
                .with_range(-MAX_GAIN_DB, MAX_GAIN_DB)
                .with_unit("dB")
        };
        let freq = |key: &'static str, label: &'static str, default: f32, min: f32, max: f32| {
            ParamDescriptor::new(key, label, default)
                .with_range(min, max)
                .with_unit("Hz")
                .logarithmic()
        };
        vec![
            freq("low_freq", "Low Freq", 100.0, 20.0, 1000.0),
            gain("low_gain", "Low Gain"),
            freq("mid_freq", "Mid Freq", 1000.0, 100.0, 10000.0),
            gain("mid_gain", "Mid Gain"),
            ParamDescriptor::new("mid_q", "Mid Q", BUTTERWORTH_Q)
                .with_range(0.1, 10.0)
                .logarithmic(),
            freq("high_freq", "High Freq", 8000.0, 1000.0, 20000.0),
            gain("high_gain", "High Gain"),
        ]
    }

    fn on_parameter_change(&mut self, key: &str, value: f32) {
        let gain = value.clamp(-MAX_GAIN_DB, MAX_GAIN_DB);
        match key {
            "low_freq" => self.bands[0].freq.set_target(value.clamp(20.0, 1000.0)),
            "low_gain" => self.bands[0].gain_db.set_target(gain),
            "mid_freq" => self.bands[1].freq.set_target(value.clamp(100.0, 10000.0)),
            "mid_gain" => self.bands[1].gain_db.set_target(gain),
            "mid_q" => self.bands[1].q.set_target(value.clamp(0.1, 10.0)),
            "high_freq" => self.bands[2].freq.set_target(value.clamp(1000.0, 20000.0)),
            "high_gain" => self.bands[2].gain_db.set_target(gain),
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
        for band in &mut self.bands {
            band.freq.skip(frames);
            band.gain_db.skip(frames);
            band.q.skip(frames);
            if band.is_flat() {
                continue;
            }
            band.design(self.sample_rate);
            for sample in block.iter_mut() {
                let (l, r) = band.filter.process(sample.left, sample.right);
                *sample = StereoSample::new(l, r);
            }
        }
    }

    fn reset(&mut self) {
        for band in &mut self.bands {
            band.freq.settle();
            band.gain_db.settle();
            band.q.settle();
            band.filter.reset();
            band.design(self.sample_rate);
        }
    }

    fn telemetry(&self) -> Telemetry {
        let (lo, hi) = (20.0f32, 20000.0f32);
        let points = (0..RESPONSE_POINTS)
            .map(|i| {
                let t = i as f32 / (RESPONSE_POINTS - 1) as f32;
                let freq = lo * (hi / lo).powf(t);
                (freq, self.response_db(freq))
            })
            .collect();
        Telemetry::FrequencyResponse(points)
    }
}
