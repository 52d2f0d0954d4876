//! Boundary toward the media framework
//!
//! Stage implementations (demuxers, decoders, encoders, network I/O, render)
//! live in the framework. The orchestration core only ever talks to them
//! through [`MediaBackend`], using opaque handles.
//!
//! Two implementations ship with the crate:
//! - [`sim::SimBackend`]: in-process model used by tests and dry runs
//! - `gst::GstBackend`: GStreamer adapter (feature `gstreamer`)

use crate::pipeline::error::{BackendError, PadLinkError};
use crate::pipeline::events::EventSender;
use crate::pipeline::types::{ClockTime, SeekFlags, StageValue, StateChange, TransportState};

#[cfg(feature = "gstreamer")]
pub mod gst;
pub mod sim;

pub use sim::{SimBackend, SimMedia, SimStream};

/// Opaque reference to a stage instance owned by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageHandle(pub u64);

impl std::fmt::Display for StageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stage#{}", self.0)
    }
}

/// Opaque reference to a graph container owned by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphHandle(pub u64);

impl std::fmt::Display for GraphHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "graph#{}", self.0)
    }
}

/// A named pad on a stage
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PadRef {
    pub stage: StageHandle,
    pub name: String,
}

impl PadRef {
    pub fn new(stage: StageHandle, name: impl Into<String>) -> Self {
        Self {
            stage,
            name: name.into(),
        }
    }
}

/// Capability contract of the external media framework
///
/// All methods may be called from the controlling thread and from the event
/// dispatcher thread concurrently; implementations synchronize internally.
/// `request_state` is the only call allowed to block while the framework
/// settles the graph.
pub trait MediaBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Create an empty graph container
    fn new_graph(&self, name: &str) -> Result<GraphHandle, BackendError>;

    /// Instantiate a stage of a concrete kind
    fn create_stage(&self, kind: &str, name: &str) -> Result<StageHandle, BackendError>;

    /// Release a stage that was never added to a graph
    fn destroy_stage(&self, stage: StageHandle);

    /// Move a stage into a graph; the graph owns it from then on
    fn add_stage(&self, graph: GraphHandle, stage: StageHandle) -> Result<(), BackendError>;

    fn set_property(
        &self,
        stage: StageHandle,
        key: &str,
        value: &StageValue,
    ) -> Result<(), BackendError>;

    /// Link the static output of `upstream` to the static input of `downstream`
    fn link(&self, upstream: StageHandle, downstream: StageHandle) -> Result<(), BackendError>;

    /// Look up a static input pad by name
    fn static_input(&self, stage: StageHandle, name: &str) -> Option<PadRef>;

    fn is_linked(&self, pad: &PadRef) -> bool;

    /// Link a discovered output pad to a static input pad
    fn link_pads(&self, output: &PadRef, input: &PadRef) -> Result<(), PadLinkError>;

    /// Attach the graph's single event subscriber
    fn attach_events(&self, graph: GraphHandle, events: EventSender) -> Result<(), BackendError>;

    /// Forward output discoveries of `stage` as `PadDiscovered` events
    fn watch_dynamic_outputs(&self, stage: StageHandle) -> Result<(), BackendError>;

    fn request_state(
        &self,
        graph: GraphHandle,
        target: TransportState,
    ) -> Result<StateChange, BackendError>;

    /// Reposition the transport. A negative rate plays backwards toward `position`.
    fn seek(
        &self,
        graph: GraphHandle,
        rate: f64,
        position: ClockTime,
        flags: SeekFlags,
    ) -> Result<(), BackendError>;

    fn query_position(&self, graph: GraphHandle) -> Option<ClockTime>;

    fn query_duration(&self, graph: GraphHandle) -> Option<ClockTime>;

    /// Shut the graph down and release every stage it owns
    fn destroy_graph(&self, graph: GraphHandle);
}
