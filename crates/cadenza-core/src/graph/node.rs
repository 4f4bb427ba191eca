//! Graph element types: nodes, connections, mixer channels and send buses

use serde::{Deserialize, Serialize};

use crate::effect::{Effect, EffectKind};

/// Id of the channel every other channel ends up in
pub const MASTER_ID: &str = "master";

/// What a node is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Instrument,
    Effect,
    Mixer,
    Utility,
    Send,
    Return,
}

/// A named vertex of the routing graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    /// Number of input ports
    pub inputs: usize,
    /// Number of output ports
    pub outputs: usize,
    /// Holds a delay element, so it may close a feedback cycle
    pub delay_capable: bool,
    /// Effect type for effect nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect_kind: Option<EffectKind>,
}

impl Node {
    /// One input, one output, no delay
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        let inputs = match kind {
            NodeKind::Instrument => 0,
            _ => 1,
        };
        Self {
            id: id.into(),
            kind,
            inputs,
            outputs: 1,
            delay_capable: false,
            effect_kind: None,
        }
    }

    /// Node describing `effect`; input 1 is its sidechain
    pub fn effect(effect: &Effect) -> Self {
        Self {
            id: effect.id().to_string(),
            kind: NodeKind::Effect,
            inputs: 2,
            outputs: 1,
            delay_capable: effect.is_delay_capable(),
            effect_kind: Some(effect.kind()),
        }
    }

    pub fn instrument(id: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Instrument)
    }

    pub fn with_ports(mut self, inputs: usize, outputs: usize) -> Self {
        self.inputs = inputs;
        self.outputs = outputs;
        self
    }

    pub fn with_delay(mut self, delay_capable: bool) -> Self {
        self.delay_capable = delay_capable;
        self
    }
}

/// A directed edge between two node ports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub source: String,
    pub target: String,
    pub source_output: usize,
    pub target_input: usize,
    /// Linear gain applied along the edge (send amount for send taps)
    pub gain: f32,
}

impl Connection {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_output: 0,
            target_input: 0,
            gain: 1.0,
        }
    }

    pub fn with_ports(mut self, source_output: usize, target_input: usize) -> Self {
        self.source_output = source_output;
        self.target_input = target_input;
        self
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }
}

/// Mixer channel state held by the graph
///
/// The channel's output route and send taps are connections; see
/// [`RoutingGraph::channel_output`](super::RoutingGraph::channel_output).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixerChannel {
    pub id: String,
    pub name: String,
    /// Linear fader gain (0..2)
    pub volume: f32,
    /// Stereo position (-1..1)
    pub pan: f32,
    pub mute: bool,
    pub solo: bool,
    /// Insert chain, processed in order
    pub effects: Vec<Node>,
}

impl MixerChannel {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            volume: 1.0,
            pan: 0.0,
            mute: false,
            solo: false,
            effects: Vec::new(),
        }
    }

    pub fn is_master(&self) -> bool {
        self.id == MASTER_ID
    }

    pub(crate) fn has_delay(&self) -> bool {
        self.effects.iter().any(|e| e.delay_capable)
    }
}

/// Auxiliary bus: scaled channel copies in, optional effect, return to master
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendBus {
    pub id: String,
    pub name: String,
    pub input_gain: f32,
    pub return_gain: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<Node>,
}

impl SendBus {
    pub fn new(id: impl Into<String>, name: impl Into<String>, effect: Option<Node>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input_gain: 1.0,
            return_gain: 1.0,
            effect,
        }
    }

    pub(crate) fn has_delay(&self) -> bool {
        self.effect.as_ref().is_some_and(|e| e.delay_capable)
    }
}
