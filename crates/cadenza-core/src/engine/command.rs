//! Lock-free command queue between the control and render threads
//!
//! The controller pushes commands into a wait-free SPSC ring buffer; the
//! engine drains it at the start of every block. Large payloads (nodes,
//! plans) travel as [`basedrop::Owned`] pointers, which keeps each command
//! small and means the render thread never frees what it replaces.
//!
//! ```text
//! ┌──────────────────┐   rtrb   ┌─────────────────┐
//! │ EngineController │ ───────▶ │     Engine      │
//! │ (control thread) │          │ (render thread) │
//! └──────────────────┘          └─────────────────┘
//!          ▲                             │
//!          └──── basedrop collector ◀────┘ dropped nodes and plans
//! ```

use basedrop::Owned;

use super::node::RenderNode;
use super::plan::RenderPlan;

/// Commands sent from the control thread to the engine
pub enum EngineCommand {
    /// Place a node into an empty slot
    InsertNode {
        slot: usize,
        node: Owned<RenderNode>,
    },
    /// Empty a slot; the node is reclaimed by the collector
    RemoveNode { slot: usize },
    /// Replace the render plan at the next block boundary
    SwapPlan(Owned<RenderPlan>),
    /// Clear the signal state of one node
    ResetNode { slot: usize },
    /// Set the tempo reported to effects
    SetBpm(f64),
}

impl std::fmt::Debug for EngineCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineCommand::InsertNode { slot, node } => {
                write!(f, "InsertNode {{ slot: {}, id: {} }}", slot, node.id)
            }
            EngineCommand::RemoveNode { slot } => write!(f, "RemoveNode {{ slot: {} }}", slot),
            EngineCommand::SwapPlan(plan) => write!(f, "SwapPlan({} steps)", plan.steps.len()),
            EngineCommand::ResetNode { slot } => write!(f, "ResetNode {{ slot: {} }}", slot),
            EngineCommand::SetBpm(bpm) => write!(f, "SetBpm({})", bpm),
        }
    }
}

/// Create a command channel (producer/consumer pair)
///
/// The producer stays with the controller, the consumer with the engine.
pub fn command_channel(
    capacity: usize,
) -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(capacity.max(1))
}
