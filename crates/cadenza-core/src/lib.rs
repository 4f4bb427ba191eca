//! Cadenza Core - real-time effect processing engine and signal routing graph

pub mod config;
pub mod dsp;
pub mod effect;
pub mod engine;
pub mod graph;
pub mod modulation;
pub mod types;

pub use config::EngineConfig;
pub use effect::{Effect, EffectFactory, EffectHandle, EffectKind, ParamDescriptor, Preset};
pub use engine::{Engine, EngineController, EngineError, SignalSource};
pub use graph::{Connection, GraphEvent, RoutingGraph};
pub use types::*;
