//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::dsp::DEFAULT_SMOOTHING_MS;
use crate::effect::EffectSettings;
use crate::types::{DEFAULT_BLOCK_SIZE, DEFAULT_BPM, DEFAULT_SAMPLE_RATE};

/// Default capacity of the control → render command queue
pub const DEFAULT_COMMAND_CAPACITY: usize = 1024;

/// Default number of render node slots
pub const DEFAULT_MAX_NODES: usize = 256;

/// Engine configuration
///
/// Every field has a default, so a partial YAML file only overrides what
/// it names:
///
/// ```yaml
/// sample_rate: 44100.0
/// max_block_size: 256
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Render sample rate in Hz
    pub sample_rate: f32,

    /// Largest block the render thread processes in one pass; longer
    /// requests are split. All render buffers are allocated to this size.
    pub max_block_size: usize,

    /// Time constant of every parameter glide in milliseconds
    pub smoothing_ms: f32,

    /// Tempo used until the host sets one
    pub bpm: f64,

    /// Render node slots (nodes, chain effects and send effects)
    pub max_nodes: usize,

    /// Capacity of the command queue
    pub command_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_block_size: DEFAULT_BLOCK_SIZE,
            smoothing_ms: DEFAULT_SMOOTHING_MS,
            bpm: DEFAULT_BPM,
            max_nodes: DEFAULT_MAX_NODES,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Settings handed to every effect the engine creates
    pub fn effect_settings(&self) -> EffectSettings {
        EffectSettings {
            sample_rate: self.sample_rate,
            max_block_size: self.max_block_size.max(1),
            smoothing_ms: self.smoothing_ms,
        }
    }
}
