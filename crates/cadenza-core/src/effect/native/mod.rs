//! Native effect processors
//!
//! Each processor is a plain struct implementing
//! [`EffectProcessor`](crate::effect::EffectProcessor); the factory wraps it
//! into an [`Effect`](crate::effect::Effect) record.

mod bitcrusher;
mod chorus;
mod compressor;
mod crossover;
mod delay;
mod distortion;
mod echo;
mod eq;
mod phaser;
mod reverb;
mod script;
mod stereo;

pub use bitcrusher::BitCrusher;
pub use chorus::Chorus;
pub use compressor::Compressor;
pub use crossover::CrossoverEq;
pub use delay::{beats_to_ms, StereoDelay, NOTE_VALUES};
pub use distortion::{shape, Distortion, DistortionType};
pub use echo::{MultiTapEcho, MAX_TAPS, SYNC_BEATS};
pub use eq::ParametricEq;
pub use phaser::Phaser;
pub use reverb::{FdnReverb, MAX_FEEDBACK};
pub use script::{ScriptEffect, ScriptFn};
pub use stereo::StereoImager;

/// Interpret a stored value as a switch
#[inline]
pub(crate) fn is_on(value: f32) -> bool {
    value >= 0.5
}

/// Interpret a stored value as an option index within `0..count`
#[inline]
pub(crate) fn option_index(value: f32, count: usize) -> usize {
    value.round().clamp(0.0, count.saturating_sub(1) as f32) as usize
}
