//! Modulation sources
//!
//! Controllers produce one value per block on the control side:
//! - [`LfoController`]: periodic sweep, free running or tempo synced
//! - [`PeakController`]: envelope of a signal the host feeds it
//!
//! [`ControllerManager`] runs them and forwards their values to listeners
//! and, for bound parameters, to a host-supplied sink.

mod lfo;
mod manager;
mod peak;

pub use lfo::{LfoController, LfoRate};
pub use manager::{AutomationListenerId, AutomationSink, ControllerManager, ParamTarget};
pub use peak::PeakController;

use crate::types::ProcessContext;

/// A block-rate value generator
pub trait Controller: Send {
    /// Compute the value for a block of `frames` samples starting at
    /// `ctx.frame_time`, then advance past it
    fn process(&mut self, frames: usize, ctx: &ProcessContext) -> f32;

    /// Last computed value
    fn value(&self) -> f32;

    fn reset(&mut self);
}
