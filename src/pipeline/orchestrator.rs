//! Graph orchestrator
//!
//! The reusable primitive behind every facade: builds a graph from a topology,
//! wires its event stream to a dispatcher thread, and exposes the lifecycle
//! controller. Re-initializing or dropping the orchestrator tears the previous
//! session down: the transport is stopped, the resolver closed, queued events
//! drained, and the graph destroyed.

use crate::pipeline::backend::MediaBackend;
use crate::pipeline::builder::{Graph, GraphBuilder};
use crate::pipeline::controller::LifecycleController;
use crate::pipeline::dispatcher::EventDispatcher;
use crate::pipeline::error::{BuildError, PipelineError, PipelineResult};
use crate::pipeline::events;
use crate::pipeline::health::{HealthSummary, PipelineHealth};
use crate::pipeline::registry::StageChoice;
use crate::pipeline::state::LifecycleState;
use crate::pipeline::topology::Topology;
use crate::pipeline::types::StageValue;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

struct Session {
    // Field order matters: the dispatcher must be joined before the graph goes
    dispatcher: EventDispatcher,
    graph: Graph,
}

pub struct GraphOrchestrator {
    backend: Arc<dyn MediaBackend>,
    topology: Topology,
    volume_stage: Option<String>,
    controller: Arc<LifecycleController>,
    health: Arc<PipelineHealth>,
    session: Option<Session>,
}

impl GraphOrchestrator {
    pub fn new(backend: Arc<dyn MediaBackend>, topology: Topology) -> Self {
        let controller = Arc::new(LifecycleController::new(
            backend.clone(),
            topology.name.clone(),
        ));
        Self {
            backend,
            topology,
            volume_stage: None,
            controller,
            health: Arc::new(PipelineHealth::new()),
            session: None,
        }
    }

    /// Name the stage that receives volume changes
    pub fn with_volume_stage(mut self, name: impl Into<String>) -> Self {
        self.volume_stage = Some(name.into());
        self
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Replace the topology used by the next `initialize`
    pub fn set_topology(&mut self, topology: Topology) {
        self.topology = topology;
    }

    pub fn controller(&self) -> &LifecycleController {
        &self.controller
    }

    pub fn state(&self) -> LifecycleState {
        self.controller.state()
    }

    /// Build a new graph, replacing any previous one
    pub fn initialize(&mut self) -> PipelineResult<()> {
        self.teardown();

        let builder = GraphBuilder::new(self.backend.clone(), self.health.clone());
        let graph = builder.build(&self.topology)?;

        let (sender, inbox) = events::channel();
        self.backend
            .attach_events(graph.handle(), sender.clone())
            .map_err(BuildError::from)?;

        let dispatcher = EventDispatcher::spawn(
            graph.name(),
            sender,
            inbox,
            self.controller.clone(),
            graph.resolver().clone(),
            self.health.clone(),
        )?;

        let volume_stage = self
            .volume_stage
            .as_deref()
            .and_then(|name| graph.stage(name))
            .map(|stage| stage.handle);
        self.controller.attach(graph.handle(), volume_stage);

        for choice in graph.choices() {
            if choice.is_fallback() {
                info!("{}", choice);
            }
        }

        self.session = Some(Session { dispatcher, graph });
        Ok(())
    }

    /// Set a property on a live stage
    pub fn set_stage_property(
        &self,
        stage: &str,
        key: &str,
        value: impl Into<StageValue>,
    ) -> PipelineResult<()> {
        let session = self.session.as_ref().ok_or(PipelineError::NotBuilt)?;
        let handle = session
            .graph
            .stage(stage)
            .ok_or_else(|| PipelineError::InvalidParameter(format!("no stage named '{}'", stage)))?
            .handle;
        self.backend
            .set_property(handle, key, &value.into())
            .map_err(|e| PipelineError::transport("configure", e))
    }

    /// Concrete kind chosen for every stage of the current graph
    pub fn stage_choices(&self) -> Vec<StageChoice> {
        self.session
            .as_ref()
            .map(|s| s.graph.choices().to_vec())
            .unwrap_or_default()
    }

    pub fn health(&self) -> HealthSummary {
        self.health.summary()
    }

    /// Block until every event posted so far has been handled
    pub fn sync_events(&self, timeout: Duration) -> bool {
        match &self.session {
            Some(session) => session.dispatcher.sync(timeout),
            None => true,
        }
    }

    /// Stop the transport and release the graph
    pub fn teardown(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        debug!("Tearing down graph '{}'", session.graph.name());
        self.controller.stop();
        session.graph.resolver().close();
        session.dispatcher.shutdown();
        self.controller.detach();
    }
}

impl Drop for GraphOrchestrator {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::backend::SimBackend;
    use crate::pipeline::events::PipelineEvent;
    use crate::pipeline::topology::{DynamicLinkSpec, StageCandidate, StageSpec};
    use crate::pipeline::types::Capability;

    const SYNC: Duration = Duration::from_secs(2);

    fn spec(name: &str, capability: Capability, kind: &str) -> StageSpec {
        StageSpec::new(name, capability).candidate(StageCandidate::new(kind))
    }

    fn topology() -> Topology {
        Topology::new("orchestrator-test")
            .stage(spec("source", Capability::Source, "filesrc"))
            .stage(spec("demuxer", Capability::DynamicDemux, "tsdemux"))
            .stage(spec("parser", Capability::Filter, "h264parse"))
            .stage(spec("decoder", Capability::Filter, "avdec_h264"))
            .stage(spec("sink", Capability::Sink, "fakesink"))
            .chain(&["source", "demuxer"])
            .chain(&["parser", "decoder", "sink"])
            .dynamic(DynamicLinkSpec::new("demuxer", "parser").with_prefix("video"))
    }

    #[test]
    fn test_initialize_and_link_on_start() {
        let sim = Arc::new(SimBackend::default());
        let mut orchestrator = GraphOrchestrator::new(sim.clone(), topology());
        orchestrator.initialize().unwrap();
        assert_eq!(orchestrator.state(), LifecycleState::Built);

        orchestrator.controller().start().unwrap();
        assert!(orchestrator.sync_events(SYNC));
        assert!(sim.input_linked("parser"));
        assert_eq!(orchestrator.health().dynamic_links, 1);
        assert_eq!(orchestrator.health().ignored_pads, 1);
    }

    #[test]
    fn test_error_event_fails_session() {
        let sim = Arc::new(SimBackend::default());
        let mut orchestrator = GraphOrchestrator::new(sim.clone(), topology());
        orchestrator.initialize().unwrap();
        orchestrator.controller().start().unwrap();

        sim.emit(PipelineEvent::Error {
            source: "decoder".into(),
            message: "decode failed".into(),
            detail: None,
        });
        assert!(orchestrator.sync_events(SYNC));
        assert_eq!(orchestrator.state(), LifecycleState::Failed);

        // Re-initializing is the way out
        orchestrator.initialize().unwrap();
        assert_eq!(orchestrator.state(), LifecycleState::Built);
        assert_eq!(sim.live_graphs(), 1);
    }

    #[test]
    fn test_drop_tears_down() {
        let sim = Arc::new(SimBackend::default());
        let mut orchestrator = GraphOrchestrator::new(sim.clone(), topology());
        orchestrator.initialize().unwrap();
        orchestrator.controller().start().unwrap();
        drop(orchestrator);
        assert_eq!(sim.live_graphs(), 0);
        assert_eq!(sim.live_stages(), 0);
    }

    #[test]
    fn test_set_stage_property() {
        let sim = Arc::new(SimBackend::default());
        let mut orchestrator = GraphOrchestrator::new(sim.clone(), topology());
        assert_eq!(
            orchestrator.set_stage_property("source", "location", "a.ts"),
            Err(PipelineError::NotBuilt)
        );
        orchestrator.initialize().unwrap();
        orchestrator
            .set_stage_property("source", "location", "a.ts")
            .unwrap();
        assert_eq!(
            sim.property("source", "location"),
            Some(StageValue::Str("a.ts".into()))
        );
    }
}
