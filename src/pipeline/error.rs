//! Pipeline error types

use crate::pipeline::state::LifecycleState;
use crate::pipeline::types::TransportState;
use thiserror::Error;

/// Failures reported by a media backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("no stage kind named '{0}' is available")]
    UnknownKind(String),

    #[error("stage '{stage}' has no property '{property}'")]
    UnknownProperty { stage: String, property: String },

    #[error("value '{value}' is not valid for property '{property}'")]
    InvalidValue { property: String, value: String },

    #[error("cannot link '{upstream}' to '{downstream}'")]
    LinkRefused { upstream: String, downstream: String },

    #[error("state change to {0} refused")]
    StateChangeRefused(TransportState),

    #[error("seek refused: {0}")]
    SeekRefused(String),

    #[error("events are already attached to graph '{0}'")]
    EventsAlreadyAttached(String),

    #[error("handle does not refer to a live object")]
    StaleHandle,

    #[error("{0}")]
    Other(String),
}

/// Why a dynamic output could not be linked to its downstream input
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PadLinkError {
    /// The input already has a peer
    #[error("input is already linked")]
    AlreadyLinked,

    /// The stage or pad went away (graph stopping or being destroyed)
    #[error("pad is no longer available")]
    Unavailable,

    /// Formats or structure do not match
    #[error("incompatible pads: {0}")]
    Incompatible(String),
}

/// Failures of [`crate::pipeline::builder::GraphBuilder::build`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("required stage '{role}' could not be created (tried: {})", .tried.join(", "))]
    MissingStage { role: String, tried: Vec<String> },

    #[error("static link {from} -> {to} failed: {reason}")]
    LinkFailed {
        from: String,
        to: String,
        reason: String,
    },

    #[error("invalid topology: {0}")]
    Topology(String),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Errors surfaced by the orchestration core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The registry exhausted a stage's fallback chain
    #[error("unsupported stage '{role}' (tried: {})", .tried.join(", "))]
    UnsupportedStage { role: String, tried: Vec<String> },

    #[error(transparent)]
    Build(#[from] BuildError),

    /// A dynamic output was discovered but could not be linked
    #[error("dynamic link {stage}:{pad} -> {downstream} failed: {reason}")]
    LinkFailed {
        stage: String,
        pad: String,
        downstream: String,
        reason: String,
    },

    /// The framework refused a transport request
    #[error("transport error during {operation}: {source}")]
    Transport {
        operation: &'static str,
        source: BackendError,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("graph has not been built")]
    NotBuilt,

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },
}

impl PipelineError {
    pub(crate) fn transport(operation: &'static str, source: BackendError) -> Self {
        PipelineError::Transport { operation, source }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
