//! Routing graph error types

use thiserror::Error;

/// Errors from structural graph operations
///
/// Missing endpoints on `connect`/`disconnect`/`route_channel` are not
/// errors; those calls report failure with `false`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// A node, channel, send bus or chain effect already uses this id
    #[error("Id already in use: {0}")]
    DuplicateId(String),

    /// No mixer channel with this id
    #[error("Mixer channel not found: {0}")]
    ChannelNotFound(String),

    /// No send bus with this id
    #[error("Send bus not found: {0}")]
    SendBusNotFound(String),

    /// A cycle whose members are all free of delay elements
    #[error("Cycle without a delay element: {}", .0.join(" -> "))]
    UndelayedCycle(Vec<String>),

    /// Node kind not accepted by the operation
    #[error("Node {id} cannot be used here: {reason}")]
    InvalidNode { id: String, reason: &'static str },
}

/// Result type for graph operations
pub type GraphResult<T> = Result<T, GraphError>;
