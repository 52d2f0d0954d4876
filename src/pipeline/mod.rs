//! Pipeline orchestration layer for mediaflow
//!
//! This module assembles media graphs from topology descriptors and drives
//! them, separating concerns between:
//! - Construction: stage registry with fallback chains, graph builder
//! - Control: lifecycle state machine and transport parameters
//! - Events: a single ordered dispatcher per graph
//! - Dynamic links: outputs resolved once a demultiplexer negotiates
//!
//! # Architecture
//!
//! Stage implementations live in an external framework reached through the
//! [`backend::MediaBackend`] trait:
//! - `GraphOrchestrator` builds one graph and owns its dispatcher thread
//! - `LifecycleController` serializes every state transition
//! - `EventDispatcher` applies framework events in emission order
//! - Player, Sender and Receiver are thin facades over one orchestrator

pub mod backend;
pub mod builder;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod health;
pub mod orchestrator;
pub mod player;
pub mod receiver;
pub mod registry;
pub mod resolver;
pub mod sender;
pub mod state;
pub mod topology;
pub mod types;

pub use backend::{MediaBackend, SimBackend, SimMedia};
pub use error::{BackendError, BuildError, PipelineError, PipelineResult};
pub use events::{EventSource, PipelineEvent};
pub use health::{HealthSummary, PipelineHealth};
pub use orchestrator::GraphOrchestrator;
pub use player::Player;
pub use receiver::Receiver;
pub use registry::{StageChoice, StageRegistry};
pub use sender::Sender;
pub use state::LifecycleState;
pub use topology::Topology;
pub use types::ClockTime;
