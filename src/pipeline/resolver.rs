//! Dynamic link resolution
//!
//! Outputs of a demultiplexer appear only after format negotiation. The
//! resolver maps each dynamic stage to the downstream inputs declared for it
//! and links a discovered output the first time it can. Resolution checks the
//! input before linking, so duplicate discoveries are no-ops, and it refuses
//! to touch the graph once teardown has started.

use crate::pipeline::backend::{MediaBackend, PadRef, StageHandle};
use crate::pipeline::error::{PadLinkError, PipelineError, PipelineResult};
use crate::pipeline::health::PipelineHealth;
use log::{debug, info};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A declared dynamic link, resolved against live handles
#[derive(Debug, Clone)]
pub struct Route {
    pub from: String,
    pub to: String,
    pub pad_prefix: Option<String>,
    pub input: PadRef,
}

impl Route {
    fn accepts(&self, pad: &str) -> bool {
        self.pad_prefix
            .as_deref()
            .is_none_or(|prefix| pad.starts_with(prefix))
    }
}

/// What happened to one discovered output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Linked to its downstream input
    Linked,
    /// The downstream input already had a peer
    AlreadyLinked,
    /// No declared route takes this output
    Ignored,
    /// The graph is being torn down or the pad went away
    Stale,
}

pub struct DynamicLinkResolver {
    backend: Arc<dyn MediaBackend>,
    routes: HashMap<StageHandle, Vec<Route>>,
    /// Set once teardown starts; resolutions hold the read side
    closed: RwLock<bool>,
    health: Arc<PipelineHealth>,
}

impl DynamicLinkResolver {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        routes: HashMap<StageHandle, Vec<Route>>,
        health: Arc<PipelineHealth>,
    ) -> Self {
        Self {
            backend,
            routes,
            closed: RwLock::new(false),
            health,
        }
    }

    /// Stop resolving; waits for an in-flight resolution to finish
    pub fn close(&self) {
        *self.closed.write() = true;
    }

    pub fn resolve(&self, stage: StageHandle, pad: &str) -> PipelineResult<LinkOutcome> {
        let closed = self.closed.read();
        if *closed {
            debug!("Ignoring {}:{} discovered during teardown", stage, pad);
            self.health.record_stale_pad();
            return Ok(LinkOutcome::Stale);
        }

        let Some(route) = self
            .routes
            .get(&stage)
            .and_then(|routes| routes.iter().find(|r| r.accepts(pad)))
        else {
            debug!("No route for discovered output {}:{}", stage, pad);
            self.health.record_ignored_pad();
            return Ok(LinkOutcome::Ignored);
        };

        if self.backend.is_linked(&route.input) {
            debug!("'{}' input already linked, ignoring {}", route.to, pad);
            self.health.record_duplicate_pad();
            return Ok(LinkOutcome::AlreadyLinked);
        }

        let output = PadRef::new(stage, pad);
        match self.backend.link_pads(&output, &route.input) {
            Ok(()) => {
                info!("Linked {}:{} -> {}", route.from, pad, route.to);
                self.health.record_dynamic_link();
                Ok(LinkOutcome::Linked)
            }
            Err(PadLinkError::AlreadyLinked) => {
                self.health.record_duplicate_pad();
                Ok(LinkOutcome::AlreadyLinked)
            }
            Err(PadLinkError::Unavailable) => {
                debug!("{}:{} vanished before it could be linked", route.from, pad);
                self.health.record_stale_pad();
                Ok(LinkOutcome::Stale)
            }
            Err(PadLinkError::Incompatible(reason)) => Err(PipelineError::LinkFailed {
                stage: route.from.clone(),
                pad: pad.to_string(),
                downstream: route.to.clone(),
                reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::backend::{SimBackend, SimMedia, SimStream};
    use crate::pipeline::types::{ClockTime, TransportState};

    struct Fixture {
        sim: Arc<SimBackend>,
        health: Arc<PipelineHealth>,
        resolver: DynamicLinkResolver,
        demuxer: StageHandle,
    }

    fn fixture(media: SimMedia, prefix: Option<&str>) -> Fixture {
        let sim = Arc::new(SimBackend::new(media));
        let graph = sim.new_graph("g").unwrap();
        let demuxer = sim.create_stage("tsdemux", "demuxer").unwrap();
        let parser = sim.create_stage("h264parse", "parser").unwrap();
        sim.add_stage(graph, demuxer).unwrap();
        sim.add_stage(graph, parser).unwrap();
        sim.request_state(graph, TransportState::Paused).unwrap();

        let route = Route {
            from: "demuxer".into(),
            to: "parser".into(),
            pad_prefix: prefix.map(str::to_string),
            input: sim.static_input(parser, "sink").unwrap(),
        };
        let health = Arc::new(PipelineHealth::new());
        let resolver = DynamicLinkResolver::new(
            sim.clone(),
            HashMap::from([(demuxer, vec![route])]),
            health.clone(),
        );
        Fixture {
            sim,
            health,
            resolver,
            demuxer,
        }
    }

    #[test]
    fn test_duplicate_discovery_links_once() {
        let f = fixture(SimMedia::default(), Some("video"));

        assert_eq!(f.resolver.resolve(f.demuxer, "video_0"), Ok(LinkOutcome::Linked));
        assert_eq!(
            f.resolver.resolve(f.demuxer, "video_0"),
            Ok(LinkOutcome::AlreadyLinked)
        );
        assert_eq!(f.sim.dynamic_link_count(), 1);
        assert_eq!(f.health.summary().duplicate_pads, 1);
    }

    #[test]
    fn test_prefix_filters_other_streams() {
        let f = fixture(SimMedia::default(), Some("video"));
        assert_eq!(f.resolver.resolve(f.demuxer, "audio_0"), Ok(LinkOutcome::Ignored));
        assert_eq!(f.sim.dynamic_link_count(), 0);
    }

    #[test]
    fn test_incompatible_output_is_link_failure() {
        // Without a prefix the audio stream reaches the H.264 parser
        let f = fixture(SimMedia::default(), None);
        let err = f.resolver.resolve(f.demuxer, "audio_0").unwrap_err();
        assert!(matches!(err, PipelineError::LinkFailed { ref pad, .. } if pad == "audio_0"));
    }

    #[test]
    fn test_closed_resolver_is_noop() {
        let f = fixture(SimMedia::default(), Some("video"));
        f.resolver.close();
        assert_eq!(f.resolver.resolve(f.demuxer, "video_0"), Ok(LinkOutcome::Stale));
        assert_eq!(f.sim.dynamic_link_count(), 0);
    }

    #[test]
    fn test_vanished_pad_is_stale() {
        let media = SimMedia::file(ClockTime::from_seconds(1))
            .with_streams(vec![SimStream::new("video_0", "video/x-h264")]);
        let f = fixture(media, None);
        assert_eq!(f.resolver.resolve(f.demuxer, "video_7"), Ok(LinkOutcome::Stale));
    }

    #[test]
    fn test_unknown_stage_is_ignored() {
        let f = fixture(SimMedia::default(), None);
        assert_eq!(
            f.resolver.resolve(StageHandle(9999), "video_0"),
            Ok(LinkOutcome::Ignored)
        );
    }
}
