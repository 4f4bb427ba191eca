//! Signal unit primitives
//!
//! Portable versions of the unit generators every effect is composed from:
//! smoothed values and gain stages, RBJ biquads, fractional delay lines,
//! phase-accumulator oscillators, one-pole filters, an oversampled table
//! waveshaper and level meters.
//!
//! Everything here is allocation-free after construction and safe to call
//! from the render thread.

pub mod biquad;
pub mod delay_line;
pub mod meter;
pub mod one_pole;
pub mod oscillator;
pub mod smoothing;
pub mod waveshaper;

pub use biquad::{Biquad, BiquadCoeffs, FilterType, StereoBiquad};
pub use delay_line::DelayLine;
pub use meter::LevelMeter;
pub use one_pole::OnePole;
pub use oscillator::{Oscillator, Waveform};
pub use smoothing::{GainStage, SmoothedValue, DEFAULT_SMOOTHING_MS};
pub use waveshaper::{Oversampling, Waveshaper, CURVE_SIZE};

/// Convert decibels to linear gain
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear gain to decibels (floored at -120 dB)
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    if gain <= 1e-6 {
        -120.0
    } else {
        20.0 * gain.log10()
    }
}

/// Equal-power pan law: `pan` in -1..1 → (left gain, right gain)
#[inline]
pub fn equal_power_pan(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * std::f32::consts::FRAC_PI_4;
    (angle.cos(), angle.sin())
}
