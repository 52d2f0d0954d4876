//! mediaflow: media graph orchestration
//!
//! Builds framework-backed media graphs from declarative topologies and
//! drives them through a serialized lifecycle. Three applications sit on
//! top: a file [`Player`], a camera [`Sender`] and a stream [`Receiver`].

pub mod config;
pub mod pipeline;
pub mod utils;

pub use config::AppConfig;
pub use pipeline::{
    ClockTime, GraphOrchestrator, LifecycleState, MediaBackend, PipelineError, PipelineResult,
    Player, Receiver, Sender, SimBackend, SimMedia,
};
