//! Peak (envelope follower) controller

use super::Controller;
use crate::types::{ProcessContext, StereoSample};

const MIN_TIME_MS: f32 = 0.1;

/// Envelope follower driven by audio the host feeds it
///
/// [`PeakController::analyze`] measures one block of the source signal and
/// sets the envelope target; [`Controller::process`] moves the envelope
/// towards it with separate attack and decay times. The output is
/// `amount * envelope`.
///
/// Tilt weighs the measurement towards low (`-1`) or high (`+1`) content.
/// It is a coarse approximation: the block is split into quarters, the
/// mean level of each quarter stands in for the low band and the mean
/// sample-to-sample movement for the high band.
#[derive(Debug, Clone)]
pub struct PeakController {
    attack_ms: f32,
    decay_ms: f32,
    amount: f32,
    tilt: f32,
    target: f32,
    envelope: f32,
}

impl Default for PeakController {
    fn default() -> Self {
        Self::new(10.0, 200.0)
    }
}

impl PeakController {
    pub fn new(attack_ms: f32, decay_ms: f32) -> Self {
        Self {
            attack_ms: attack_ms.max(MIN_TIME_MS),
            decay_ms: decay_ms.max(MIN_TIME_MS),
            amount: 1.0,
            tilt: 0.0,
            target: 0.0,
            envelope: 0.0,
        }
    }

    pub fn with_amount(mut self, amount: f32) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_tilt(mut self, tilt: f32) -> Self {
        self.set_tilt(tilt);
        self
    }

    pub fn set_attack_ms(&mut self, ms: f32) {
        self.attack_ms = ms.max(MIN_TIME_MS);
    }

    pub fn set_decay_ms(&mut self, ms: f32) {
        self.decay_ms = ms.max(MIN_TIME_MS);
    }

    pub fn set_amount(&mut self, amount: f32) {
        self.amount = amount;
    }

    pub fn set_tilt(&mut self, tilt: f32) {
        self.tilt = tilt.clamp(-1.0, 1.0);
    }

    /// Envelope before `amount` is applied
    pub fn envelope(&self) -> f32 {
        self.envelope
    }

    /// Measure one block of the followed signal
    pub fn analyze(&mut self, block: &[StereoSample]) {
        let peak = block.iter().fold(0.0f32, |acc, s| acc.max(s.peak()));
        self.target = if self.tilt == 0.0 || peak == 0.0 {
            peak
        } else {
            let weight = 1.0 + self.tilt * (2.0 * brightness(block) - 1.0);
            peak * weight.max(0.0)
        };
    }
}

/// Share of high-band movement in a block, 0 (all low) to 1 (all high)
fn brightness(block: &[StereoSample]) -> f32 {
    let quarter = block.len() / 4;
    if quarter < 2 {
        return 0.5;
    }
    let mut low = 0.0;
    let mut high = 0.0;
    for part in block.chunks_exact(quarter).take(4) {
        let mut level = 0.0;
        let mut movement = 0.0;
        let mut previous = part[0].mid();
        for s in part {
            let mid = s.mid();
            level += mid.abs();
            movement += (mid - previous).abs();
            previous = mid;
        }
        low += level / part.len() as f32;
        high += movement / (part.len() - 1) as f32;
    }
    if low + high <= f32::EPSILON {
        return 0.5;
    }
    high / (low + high)
}

impl Controller for PeakController {
    fn process(&mut self, frames: usize, ctx: &ProcessContext) -> f32 {
        let time_ms = if self.target > self.envelope {
            self.attack_ms
        } else {
            self.decay_ms
        };
        let elapsed_ms = frames as f32 * 1000.0 / ctx.sample_rate.max(1.0);
        let coeff = 1.0 - (-elapsed_ms / time_ms).exp();
        self.envelope += (self.target - self.envelope) * coeff;
        self.value()
    }

    fn value(&self) -> f32 {
        self.amount * self.envelope
    }

    fn reset(&mut self) {
        self.target = 0.0;
        self.envelope = 0.0;
    }
}
