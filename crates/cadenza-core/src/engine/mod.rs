//! Real-time render engine
//!
//! The engine is split across two threads:
//! - [`EngineController`] lives on the control thread. It owns the routing
//!   graph, builds render nodes and compiles render plans.
//! - [`Engine`] lives on the audio thread. It drains commands at block
//!   boundaries and renders the current plan without allocating or locking.
//!
//! Nodes and plans the engine lets go of are reclaimed on the control
//! thread by [`RenderCollector`].

mod command;
mod controller;
mod gc;
mod node;
mod plan;
mod render;

pub use command::{command_channel, EngineCommand};
pub use controller::{EngineController, MAX_BPM, MIN_BPM};
pub use gc::RenderCollector;
pub use node::{
    ChannelControls, ChannelStrip, NodeProcessor, RenderNode, SendControls, SendStrip,
    SignalSource,
};
pub use plan::{PlanInput, RenderPlan, RenderStep};
pub use render::Engine;

use crate::effect::EffectError;
use crate::graph::GraphError;

/// Errors from structural engine calls
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Effect(#[from] EffectError),

    #[error("Engine command queue is full")]
    QueueFull,

    #[error("All {capacity} node slots are in use")]
    NoFreeSlot { capacity: usize },

    #[error("No render node with id {0}")]
    NotFound(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
