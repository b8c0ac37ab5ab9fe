//! Error types for the pedalboard engine
//!
//! DSP-path problems never surface as errors: out-of-range values are
//! clamped where they enter. Everything here is reported to the control
//! plane, which logs it and keeps the other nodes running.

use thiserror::Error;

use crate::node::NodeId;

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, PedalError>;

/// Broad classification used by the control plane to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Out-of-range parameter or invalid voicing (clamped or rejected at build time)
    Configuration,
    /// A node id that is unknown, duplicated or already torn down (no-op)
    Topology,
    /// Requested delay beyond the line capacity (clamped)
    ResourceExhaustion,
    /// Feedback at or above unity outside a self-oscillation mode (clamped)
    InstabilityRisk,
    /// Presets, devices, queues: recoverable failures surfaced to the UI
    ControlPlane,
}

/// Errors that can occur while building or controlling a pedalboard
#[derive(Error, Debug)]
pub enum PedalError {
    #[error("Invalid value {value} for '{parameter}': {reason}")]
    Configuration {
        parameter: String,
        value: f32,
        reason: &'static str,
    },
    #[error("Unknown effect type '{0}'")]
    UnknownEffect(String),
    #[error("No node with id {0} in the chain")]
    UnknownNode(NodeId),
    #[error("Node {0} is already in the chain")]
    DuplicateNode(NodeId),
    #[error("Node {0} has been torn down and cannot be added")]
    DetachedNode(NodeId),
    #[error("Move from {from} to {to} is outside a chain of {len} nodes")]
    InvalidMove { from: usize, to: usize, len: usize },
    #[error("Delay of {requested} samples exceeds capacity {capacity}")]
    DelayOverflow { requested: f32, capacity: usize },
    #[error("Feedback {0} would be unstable")]
    UnstableFeedback(f32),
    #[error("Command queue is full")]
    QueueFull,
    #[error("Audio engine is not running")]
    Disconnected,
    #[error("Device error: {0}")]
    Device(String),
    #[error("Preset error: {0}")]
    Preset(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PedalError {
    /// Taxonomy bucket for this error
    pub fn class(&self) -> ErrorClass {
        match self {
            PedalError::Configuration { .. } | PedalError::UnknownEffect(_) => {
                ErrorClass::Configuration
            }
            PedalError::UnknownNode(_)
            | PedalError::DuplicateNode(_)
            | PedalError::DetachedNode(_)
            | PedalError::InvalidMove { .. } => ErrorClass::Topology,
            PedalError::DelayOverflow { .. } => ErrorClass::ResourceExhaustion,
            PedalError::UnstableFeedback(_) => ErrorClass::InstabilityRisk,
            PedalError::QueueFull
            | PedalError::Disconnected
            | PedalError::Device(_)
            | PedalError::Preset(_)
            | PedalError::Io(_) => ErrorClass::ControlPlane,
        }
    }

    /// Whether the engine keeps its current state unchanged after this error
    pub fn is_noop(&self) -> bool {
        matches!(self.class(), ErrorClass::Topology)
    }

    pub(crate) fn configuration(
        parameter: impl Into<String>,
        value: f32,
        reason: &'static str,
    ) -> Self {
        PedalError::Configuration {
            parameter: parameter.into(),
            value,
            reason,
        }
    }
}
