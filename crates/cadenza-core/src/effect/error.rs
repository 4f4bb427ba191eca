//! Effect error types

use thiserror::Error;

/// Errors from effect construction and preset handling
#[derive(Error, Debug)]
pub enum EffectError {
    /// No constructor registered for the type id
    #[error("Unknown effect type: {0}")]
    UnknownType(String),

    /// A constructor is already registered under this type id
    #[error("Effect type already registered: {0}")]
    AlreadyRegistered(String),

    /// Preset index outside the preset list
    #[error("Preset index {index} out of range ({count} presets)")]
    PresetOutOfRange { index: usize, count: usize },

    /// Operation on an effect that has been disposed
    #[error("Effect {0} has been disposed")]
    Disposed(String),

    /// Preset or snapshot (de)serialization failed
    #[error("Preset serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for effect operations
pub type EffectResult<T> = Result<T, EffectError>;
