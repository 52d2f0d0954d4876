//! Graph builder
//!
//! Turns a [`Topology`] into a live graph: every stage is instantiated through
//! the registry, moved into one graph container and statically linked, and
//! each dynamic stage gets exactly one resolver entry. A failure at any step
//! destroys everything created so far.

use crate::pipeline::backend::{GraphHandle, MediaBackend, StageHandle};
use crate::pipeline::error::{BuildError, PipelineError};
use crate::pipeline::health::PipelineHealth;
use crate::pipeline::registry::{StageChoice, StageRegistry};
use crate::pipeline::resolver::{DynamicLinkResolver, Route};
use crate::pipeline::topology::Topology;
use crate::pipeline::types::Capability;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;

/// A stage owned by a built graph
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    pub kind: String,
    pub capability: Capability,
    pub handle: StageHandle,
}

/// A fully linked graph
///
/// Dropping it destroys the graph and every stage it owns.
pub struct Graph {
    backend: Arc<dyn MediaBackend>,
    handle: GraphHandle,
    name: String,
    stages: Vec<Stage>,
    choices: Vec<StageChoice>,
    resolver: Arc<DynamicLinkResolver>,
}

impl Graph {
    pub fn handle(&self) -> GraphHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn choices(&self) -> &[StageChoice] {
        &self.choices
    }

    pub fn resolver(&self) -> &Arc<DynamicLinkResolver> {
        &self.resolver
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        self.resolver.close();
        self.backend.destroy_graph(self.handle);
        debug!("Destroyed graph '{}'", self.name);
    }
}

/// Releases partial work if a build does not complete
struct BuildGuard<'a> {
    backend: &'a dyn MediaBackend,
    graph: Option<GraphHandle>,
    loose: Vec<StageHandle>,
}

impl BuildGuard<'_> {
    fn disarm(mut self) {
        self.graph = None;
        self.loose.clear();
    }
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        for stage in self.loose.drain(..) {
            self.backend.destroy_stage(stage);
        }
        if let Some(graph) = self.graph.take() {
            self.backend.destroy_graph(graph);
        }
    }
}

pub struct GraphBuilder {
    backend: Arc<dyn MediaBackend>,
    registry: StageRegistry,
    health: Arc<PipelineHealth>,
}

impl GraphBuilder {
    pub fn new(backend: Arc<dyn MediaBackend>, health: Arc<PipelineHealth>) -> Self {
        Self {
            registry: StageRegistry::new(backend.clone()),
            backend,
            health,
        }
    }

    pub fn build(&self, topology: &Topology) -> Result<Graph, BuildError> {
        topology.validate()?;

        let mut guard = BuildGuard {
            backend: self.backend.as_ref(),
            graph: None,
            loose: Vec::new(),
        };

        // 1. Instantiate every stage
        let mut stages = Vec::with_capacity(topology.stages.len());
        let mut choices = Vec::with_capacity(topology.stages.len());
        for spec in &topology.stages {
            let (handle, choice) = self.registry.create(spec).map_err(|e| match e {
                PipelineError::UnsupportedStage { role, tried } => {
                    BuildError::MissingStage { role, tried }
                }
                other => BuildError::Topology(other.to_string()),
            })?;
            guard.loose.push(handle);
            stages.push(Stage {
                name: spec.name.clone(),
                kind: choice.kind.clone(),
                capability: spec.capability,
                handle,
            });
            choices.push(choice);
        }

        // 2. Move them into one container
        let graph = self.backend.new_graph(&topology.name)?;
        guard.graph = Some(graph);
        for stage in &stages {
            self.backend.add_stage(graph, stage.handle)?;
            guard.loose.retain(|h| *h != stage.handle);
        }

        let by_name: HashMap<&str, &Stage> = stages.iter().map(|s| (s.name.as_str(), s)).collect();
        let lookup = |name: &str| {
            by_name
                .get(name)
                .copied()
                .ok_or_else(|| BuildError::Topology(format!("unknown stage '{}'", name)))
        };

        // 3. Static links, in topology order
        for (from, to) in &topology.links {
            let (up, down) = (lookup(from)?, lookup(to)?);
            self.backend
                .link(up.handle, down.handle)
                .map_err(|e| BuildError::LinkFailed {
                    from: from.clone(),
                    to: to.clone(),
                    reason: e.to_string(),
                })?;
        }

        // 4. One resolver entry per dynamic stage
        let mut routes: HashMap<StageHandle, Vec<Route>> = HashMap::new();
        for spec in &topology.dynamic_links {
            let (up, down) = (lookup(&spec.from)?, lookup(&spec.to)?);
            let input = self
                .backend
                .static_input(down.handle, &spec.input_pad)
                .ok_or_else(|| BuildError::LinkFailed {
                    from: spec.from.clone(),
                    to: spec.to.clone(),
                    reason: format!("'{}' has no input pad '{}'", spec.to, spec.input_pad),
                })?;
            let entry = routes.entry(up.handle).or_default();
            if entry.is_empty() {
                self.backend.watch_dynamic_outputs(up.handle)?;
            }
            entry.push(Route {
                from: spec.from.clone(),
                to: spec.to.clone(),
                pad_prefix: spec.pad_prefix.clone(),
                input,
            });
        }

        guard.disarm();

        info!(
            "Built graph '{}' with {} stages on {} backend",
            topology.name,
            stages.len(),
            self.backend.name()
        );

        Ok(Graph {
            resolver: Arc::new(DynamicLinkResolver::new(
                self.backend.clone(),
                routes,
                self.health.clone(),
            )),
            backend: self.backend.clone(),
            handle: graph,
            name: topology.name.clone(),
            stages,
            choices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::backend::SimBackend;
    use crate::pipeline::topology::{DynamicLinkSpec, StageCandidate, StageSpec};

    fn spec(name: &str, capability: Capability, kinds: &[&str]) -> StageSpec {
        kinds.iter().fold(StageSpec::new(name, capability), |spec, kind| {
            spec.candidate(StageCandidate::new(*kind))
        })
    }

    fn file_topology() -> Topology {
        Topology::new("test-graph")
            .stage(spec("source", Capability::Source, &["filesrc"]))
            .stage(spec("demuxer", Capability::DynamicDemux, &["tsdemux"]))
            .stage(spec("decoder", Capability::Filter, &["nvh264dec", "avdec_h264"]))
            .stage(spec("converter", Capability::Filter, &["videoconvert"]))
            .stage(spec("sink", Capability::Sink, &["autovideosink"]))
            .chain(&["source", "demuxer"])
            .chain(&["decoder", "converter", "sink"])
            .dynamic(DynamicLinkSpec::new("demuxer", "decoder").with_prefix("video"))
    }

    fn builder(sim: &Arc<SimBackend>) -> GraphBuilder {
        GraphBuilder::new(sim.clone(), Arc::new(PipelineHealth::new()))
    }

    #[test]
    fn test_build_links_everything() {
        let sim = Arc::new(SimBackend::default());
        let graph = builder(&sim).build(&file_topology()).unwrap();

        assert_eq!(graph.stages().len(), 5);
        assert_eq!(graph.stage("decoder").unwrap().kind, "nvh264dec");
        assert!(sim.input_linked("demuxer"));
        assert!(sim.input_linked("sink"));
        // Waits for negotiation
        assert!(!sim.input_linked("decoder"));
    }

    #[test]
    fn test_missing_stage_leaves_nothing_behind() {
        let sim = Arc::new(SimBackend::default());
        sim.make_unavailable("autovideosink");

        let err = builder(&sim).build(&file_topology()).err().unwrap();
        assert!(matches!(err, BuildError::MissingStage { ref role, .. } if role == "sink"));
        assert_eq!(sim.live_stages(), 0);
        assert_eq!(sim.live_graphs(), 0);
    }

    #[test]
    fn test_link_failure_leaves_nothing_behind() {
        let sim = Arc::new(SimBackend::default());
        // udpsrc produces RTP, which the converter does not accept
        let topology = Topology::new("bad")
            .stage(spec("source", Capability::Source, &["udpsrc"]))
            .stage(spec("converter", Capability::Filter, &["videoconvert"]))
            .chain(&["source", "converter"]);

        let err = builder(&sim).build(&topology).err().unwrap();
        assert!(matches!(err, BuildError::LinkFailed { .. }));
        assert_eq!(sim.live_stages(), 0);
        assert_eq!(sim.live_graphs(), 0);
    }

    #[test]
    fn test_invalid_topology_rejected_before_instantiation() {
        let sim = Arc::new(SimBackend::default());
        let topology = file_topology().link("nowhere", "sink");

        let err = builder(&sim).build(&topology).err().unwrap();
        assert!(matches!(err, BuildError::Topology(_)));
        assert_eq!(sim.live_stages(), 0);
    }

    #[test]
    fn test_drop_destroys_graph() {
        let sim = Arc::new(SimBackend::default());
        let graph = builder(&sim).build(&file_topology()).unwrap();
        assert_eq!(sim.live_graphs(), 1);
        drop(graph);
        assert_eq!(sim.live_graphs(), 0);
        assert_eq!(sim.live_stages(), 0);
    }
}
