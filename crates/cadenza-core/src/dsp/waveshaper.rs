//! Table-lookup waveshaper with optional oversampling
//!
//! The transfer curve is a table of [`CURVE_SIZE`] points spanning the input
//! range -1..1; inputs outside that range read the end points. With
//! oversampling enabled each input sample is linearly upsampled, shaped at
//! the higher rate, lowpassed by two cascaded Butterworth sections and
//! decimated.

use serde::{Deserialize, Serialize};

use super::biquad::{Biquad, BiquadCoeffs, FilterType, BUTTERWORTH_Q};

/// Number of points in a transfer curve
pub const CURVE_SIZE: usize = 8192;

/// Oversampling factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Oversampling {
    #[default]
    None,
    X2,
    X4,
}

impl Oversampling {
    pub fn factor(&self) -> usize {
        match self {
            Oversampling::None => 1,
            Oversampling::X2 => 2,
            Oversampling::X4 => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Waveshaper {
    curve: Vec<f32>,
    oversampling: Oversampling,
    previous: f32,
    anti_alias: [Biquad; 2],
}

impl Waveshaper {
    /// Create a waveshaper with a linear (identity) curve
    pub fn new(oversampling: Oversampling, sample_rate: f32) -> Self {
        let mut shaper = Self {
            curve: vec![0.0; CURVE_SIZE],
            oversampling,
            previous: 0.0,
            anti_alias: [Biquad::passthrough(); 2],
        };
        shaper.set_curve_fn(|x| x);
        shaper.set_oversampling(oversampling, sample_rate);
        shaper
    }

    /// Input value represented by curve point `index`
    #[inline]
    pub fn curve_input(index: usize) -> f32 {
        index as f32 / (CURVE_SIZE - 1) as f32 * 2.0 - 1.0
    }

    /// Fill the curve in place by evaluating `f` at every point
    pub fn set_curve_fn(&mut self, mut f: impl FnMut(f32) -> f32) {
        for (i, point) in self.curve.iter_mut().enumerate() {
            let y = f(Self::curve_input(i));
            *point = if y.is_finite() { y } else { 0.0 };
        }
    }

    pub fn curve(&self) -> &[f32] {
        &self.curve
    }

    pub fn set_oversampling(&mut self, oversampling: Oversampling, sample_rate: f32) {
        self.oversampling = oversampling;
        let factor = oversampling.factor();
        let coeffs = if factor == 1 {
            BiquadCoeffs::passthrough()
        } else {
            BiquadCoeffs::design(
                FilterType::Lowpass,
                sample_rate * 0.45,
                BUTTERWORTH_Q,
                0.0,
                sample_rate * factor as f32,
            )
        };
        for stage in &mut self.anti_alias {
            stage.set_coeffs(coeffs);
            stage.reset();
        }
    }

    pub fn oversampling(&self) -> Oversampling {
        self.oversampling
    }

    /// Look up the curve with linear interpolation
    #[inline]
    pub fn lookup(&self, x: f32) -> f32 {
        let pos = ((x.clamp(-1.0, 1.0) + 1.0) * 0.5) * (CURVE_SIZE - 1) as f32;
        let i = pos.floor() as usize;
        if i >= CURVE_SIZE - 1 {
            return self.curve[CURVE_SIZE - 1];
        }
        let frac = pos - i as f32;
        self.curve[i] + (self.curve[i + 1] - self.curve[i]) * frac
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let factor = self.oversampling.factor();
        if factor == 1 {
            return self.lookup(input);
        }

        let step = (input - self.previous) / factor as f32;
        let mut out = 0.0;
        for k in 1..=factor {
            let x = self.previous + step * k as f32;
            let mut y = self.lookup(x);
            for stage in &mut self.anti_alias {
                y = stage.process(y);
            }
            out = y;
        }
        self.previous = input;
        out
    }

    pub fn reset(&mut self) {
        self.previous = 0.0;
        for stage in &mut self.anti_alias {
            stage.reset();
        }
    }
}
