//! Crossover EQ - 4 bands from 3 Linkwitz-Riley split points
//!
//! Each split is a 24 dB/oct Linkwitz-Riley pair: two cascaded Butterworth
//! (Q = 0.707) lowpass sections and two highpass sections at the same
//! frequency. The bands are produced as a tree:
//!
//! ```text
//!               ┌─ AP(f3) ─ split f1 ─┬─ band 1
//!  in ─ split f2┤                     └─ band 2
//!               └─ AP(f1) ─ split f3 ─┬─ band 3
//!                                     └─ band 4
//! ```
//!
//! An LR4 low + high pair sums to a second-order allpass at the split
//! frequency, so each branch carries the allpass of the split it doesn't go
//! through. With every band at unity the sum is then a pure allpass: flat
//! magnitude.

use crate::dsp::biquad::BUTTERWORTH_Q;
use crate::dsp::{db_to_gain, BiquadCoeffs, FilterType, SmoothedValue, StereoBiquad};
use crate::effect::{EffectProcessor, EffectSettings, ParamDescriptor, Telemetry};
use crate::types::{ProcessContext, StereoSample};

use super::is_on;

pub const NUM_BANDS: usize = 4;
const NUM_SPLITS: usize = NUM_BANDS - 1;
const DEFAULT_SPLITS: [f32; NUM_SPLITS] = [200.0, 2000.0, 8000.0];
const SPLIT_KEYS: [&str; NUM_SPLITS] = ["low_freq", "mid_freq", "high_freq"];
const MIN_FREQ: f32 = 20.0;
const MAX_FREQ: f32 = 20000.0;
const METER_RELEASE: f32 = 0.9;

/// One Linkwitz-Riley low/high split
#[derive(Clone, Copy)]
struct LrSplit {
    low: [StereoBiquad; 2],
    high: [StereoBiquad; 2],
}

impl LrSplit {
    fn new(freq: f32, sample_rate: f32) -> Self {
        let mut split = Self {
            low: [StereoBiquad::passthrough(); 2],
            high: [StereoBiquad::passthrough(); 2],
        };
        split.set_frequency(freq, sample_rate);
        split
    }

    fn set_frequency(&mut self, freq: f32, sample_rate: f32) {
        let lp = BiquadCoeffs::design(FilterType::Lowpass, freq, BUTTERWORTH_Q, 0.0, sample_rate);
        let hp = BiquadCoeffs::design(FilterType::Highpass, freq, BUTTERWORTH_Q, 0.0, sample_rate);
        for section in &mut self.low {
            section.set_coeffs(lp);
        }
        for section in &mut self.high {
            section.set_coeffs(hp);
        }
    }

    #[inline]
    fn process(&mut self, input: StereoSample) -> (StereoSample, StereoSample) {
        let (mut ll, mut lr) = (input.left, input.right);
        for section in &mut self.low {
            (ll, lr) = section.process(ll, lr);
        }
        let (mut hl, mut hr) = (input.left, input.right);
        for section in &mut self.high {
            (hl, hr) = section.process(hl, hr);
        }
        (StereoSample::new(ll, lr), StereoSample::new(hl, hr))
    }

    fn reset(&mut self) {
        for section in self.low.iter_mut().chain(self.high.iter_mut()) {
            section.reset();
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BandState {
    gain_db: f32,
    mute: bool,
    solo: bool,
}

/// Four-band Linkwitz-Riley crossover with per-band gain, mute and solo
pub struct CrossoverEq {
    sample_rate: f32,
    /// Requested split frequencies, as set
    requested: [f32; NUM_SPLITS],
    /// Split frequencies after ordering, smoothed at block rate
    freqs: [SmoothedValue; NUM_SPLITS],
    applied: [f32; NUM_SPLITS],
    splits: [LrSplit; NUM_SPLITS],
    /// Allpass at f3 on the low branch, at f1 on the high branch
    compensation: [StereoBiquad; 2],
    bands: [BandState; NUM_BANDS],
    gains: [SmoothedValue; NUM_BANDS],
    band_peaks: [f32; NUM_BANDS],
}

impl CrossoverEq {
    pub fn new(settings: &EffectSettings) -> Self {
        let sr = settings.sample_rate;
        let mut eq = Self {
            sample_rate: sr,
            requested: DEFAULT_SPLITS,
            freqs: DEFAULT_SPLITS.map(|f| settings.smoother(f)),
            applied: DEFAULT_SPLITS,
            splits: DEFAULT_SPLITS.map(|f| LrSplit::new(f, sr)),
            compensation: [StereoBiquad::passthrough(); 2],
            bands: [BandState::default(); NUM_BANDS],
            gains: [settings.smoother(1.0); NUM_BANDS],
            band_peaks: [0.0; NUM_BANDS],
        };
        eq.design(DEFAULT_SPLITS);
        eq
    }

    /// Split frequencies currently in effect
    pub fn frequencies(&self) -> [f32; NUM_SPLITS] {
        self.applied
    }

    fn design(&mut self, freqs: [f32; NUM_SPLITS]) {
        let sr = self.sample_rate;
        for (split, freq) in self.splits.iter_mut().zip(freqs) {
            split.set_frequency(freq, sr);
        }
        self.compensation[0].set_coeffs(BiquadCoeffs::design(
            FilterType::Allpass,
            freqs[2],
            BUTTERWORTH_Q,
            0.0,
            sr,
        ));
        self.compensation[1].set_coeffs(BiquadCoeffs::design(
            FilterType::Allpass,
            freqs[0],
            BUTTERWORTH_Q,
            0.0,
            sr,
        ));
        self.applied = freqs;
    }

    /// Clamp and order the requested frequencies so f1 ≤ f2 ≤ f3
    fn update_split_targets(&mut self) {
        let mut floor = MIN_FREQ;
        for (smoother, requested) in self.freqs.iter_mut().zip(self.requested) {
            let freq = requested.clamp(MIN_FREQ, MAX_FREQ).max(floor);
            smoother.set_target(freq);
            floor = freq;
        }
    }

    fn update_gains(&mut self) {
        let any_solo = self.bands.iter().any(|b| b.solo);
        for (band, gain) in self.bands.iter().zip(self.gains.iter_mut()) {
            let audible = if any_solo { band.solo } else { !band.mute };
            gain.set_target(if audible { db_to_gain(band.gain_db) } else { 0.0 });
        }
    }
}

/// Parse keys of the form `band{n}_{field}` with n in 1..=4
fn band_key(key: &str) -> Option<(usize, &str)> {
    let rest = key.strip_prefix("band")?;
    let (n, field) = rest.split_once('_')?;
    let n: usize = n.parse().ok()?;
    (1..=NUM_BANDS).contains(&n).then_some((n - 1, field))
}

impl EffectProcessor for CrossoverEq {
    fn descriptors(&self) -> Vec<ParamDescriptor> {
        let mut params: Vec<ParamDescriptor> = SPLIT_KEYS
            .iter()
            .zip(["Low Split", "Mid Split", "High Split"])
            .zip(DEFAULT_SPLITS)
            .map(|((key, label), default)| {
                ParamDescriptor::new(*key, label, default)
                    .with_range(MIN_FREQ, MAX_FREQ)
                    .with_unit("Hz")
                    .logarithmic()
            })
            .collect();
        for n in 1..=NUM_BANDS {
            params.push(
                ParamDescriptor::new(format!("band{n}_gain"), format!("Band {n} Gain"), 0.0)
                    .with_range(-24.0, 12.0)
                    .with_unit("dB"),
            );
            params.push(
                ParamDescriptor::new(format!("band{n}_mute"), format!("Band {n} Mute"), 0.0).boolean(),
            );
            params.push(
                ParamDescriptor::new(format!("band{n}_solo"), format!("Band {n} Solo"), 0.0).boolean(),
            );
        }
        params
    }

    fn on_parameter_change(&mut self, key: &str, value: f32) {
        if let Some(i) = SPLIT_KEYS.iter().position(|k| *k == key) {
            self.requested[i] = value;
            self.update_split_targets();
            return;
        }
        let Some((band, field)) = band_key(key) else {
            return;
        };
        match field {
            "gain" => self.bands[band].gain_db = value.clamp(-24.0, 12.0),
            "mute" => self.bands[band].mute = is_on(value),
            "solo" => self.bands[band].solo = is_on(value),
            _ => return,
        }
        self.update_gains();
    }

    fn process(
        &mut self,
        block: &mut [StereoSample],
        _sidechain: Option<&[StereoSample]>,
        _ctx: &ProcessContext,
    ) {
        let freqs = [
            self.freqs[0].skip(block.len()),
            self.freqs[1].skip(block.len()),
            self.freqs[2].skip(block.len()),
        ];
        if freqs != self.applied {
            self.design(freqs);
        }

        let mut peaks = [0.0f32; NUM_BANDS];
        for sample in block.iter_mut() {
            let (low, high) = self.splits[1].process(*sample);
            let (l, r) = self.compensation[0].process(low.left, low.right);
            let (b1, b2) = self.splits[0].process(StereoSample::new(l, r));
            let (l, r) = self.compensation[1].process(high.left, high.right);
            let (b3, b4) = self.splits[2].process(StereoSample::new(l, r));

            let mut out = StereoSample::silence();
            for (i, band) in [b1, b2, b3, b4].into_iter().enumerate() {
                let gained = band * self.gains[i].next();
                peaks[i] = peaks[i].max(gained.peak());
                out += gained;
            }
            *sample = out;
        }

        for (held, peak) in self.band_peaks.iter_mut().zip(peaks) {
            *held = peak.max(*held * METER_RELEASE);
        }
    }

    fn reset(&mut self) {
        for split in &mut self.splits {
            split.reset();
        }
        for ap in &mut self.compensation {
            ap.reset();
        }
        for freq in &mut self.freqs {
            freq.settle();
        }
        for gain in &mut self.gains {
            gain.settle();
        }
        let freqs = [
            self.freqs[0].current(),
            self.freqs[1].current(),
            self.freqs[2].current(),
        ];
        self.design(freqs);
        self.band_peaks = [0.0; NUM_BANDS];
    }

    fn telemetry(&self) -> Telemetry {
        Telemetry::BandLevels(self.band_peaks.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::native::testing::{configure, level_db, run, sine};

    fn crossover(overrides: &[(&str, f32)]) -> CrossoverEq {
        configure(CrossoverEq::new(&EffectSettings::default()), overrides)
    }

    /// Steady-state level of a processed sine, in dB relative to its input
    fn response_db(fx: &mut CrossoverEq, freq: f32) -> f32 {
        fx.reset();
        let mut signal = sine(24000, freq, 0.5);
        run(fx, &mut signal);
        level_db(&signal[12000..], 0.5)
    }

    #[test]
    fn test_unity_bands_sum_flat() {
        let mut fx = crossover(&[]);
        for freq in [40.0, 150.0, 200.0, 700.0, 2000.0, 5000.0, 8000.0, 15000.0] {
            let db = response_db(&mut fx, freq);
            assert!(db.abs() < 0.5, "{} Hz: {} dB", freq, db);
        }
    }

    #[test]
    fn test_band_gain_applies_to_its_range() {
        let mut fx = crossover(&[("band1_gain", -12.0)]);
        let low = response_db(&mut fx, 50.0);
        let high = response_db(&mut fx, 12000.0);
        assert!((low + 12.0).abs() < 1.0, "low {}", low);
        assert!(high.abs() < 0.5, "high {}", high);
    }

    #[test]
    fn test_solo_overrides_mute_of_other_bands() {
        let mut fx = crossover(&[("band4_solo", 1.0), ("band1_mute", 0.0)]);
        assert!(response_db(&mut fx, 60.0) < -40.0);
        assert!(response_db(&mut fx, 16000.0).abs() < 1.0);
    }

    #[test]
    fn test_mute_silences_band() {
        let mut fx = crossover(&[("band2_mute", 1.0), ("band3_mute", 1.0), ("band4_mute", 1.0)]);
        assert!(response_db(&mut fx, 50.0).abs() < 1.0);
        assert!(response_db(&mut fx, 10000.0) < -40.0);
    }

    #[test]
    fn test_frequencies_forced_monotonic() {
        let fx = crossover(&[("low_freq", 5000.0), ("mid_freq", 1000.0), ("high_freq", 30000.0)]);
        let f = fx.frequencies();
        assert_eq!(f, [5000.0, 5000.0, MAX_FREQ]);
    }

    #[test]
    fn test_band_levels_telemetry() {
        let mut fx = crossover(&[]);
        let mut signal = sine(12000, 60.0, 0.5);
        run(&mut fx, &mut signal);
        match fx.telemetry() {
            Telemetry::BandLevels(levels) => {
                assert_eq!(levels.len(), NUM_BANDS);
                assert!(levels[0] > 0.3);
                assert!(levels[3] < 0.01);
            }
            other => panic!("unexpected telemetry {:?}", other),
        }
    }

    #[test]
    fn test_band_key_parsing() {
        assert_eq!(band_key("band3_solo"), Some((2, "solo")));
        assert_eq!(band_key("band5_gain"), None);
        assert_eq!(band_key("low_freq"), None);
    }
}
