//! GStreamer backend
//!
//! Stages are GStreamer elements, graphs are pipelines. Bus messages are
//! forwarded from a sync handler into the graph's event channel, and
//! `pad-added` signals become `PadDiscovered` events.

use super::{GraphHandle, MediaBackend, PadRef, StageHandle};
use crate::pipeline::error::{BackendError, PadLinkError};
use crate::pipeline::events::{EventSender, EventSource, PipelineEvent};
use crate::pipeline::types::{ClockTime, SeekFlags, StageValue, StateChange, TransportState};
use gst::glib;
use gst::prelude::*;
use gstreamer as gst;
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

type EventSlot = Arc<OnceLock<EventSender>>;

struct GstStage {
    element: gst::Element,
    graph: Option<u64>,
}

struct GstGraph {
    pipeline: gst::Pipeline,
    events: EventSlot,
}

#[derive(Default)]
struct GstInner {
    next_id: u64,
    stages: HashMap<u64, GstStage>,
    graphs: HashMap<u64, GstGraph>,
}

impl GstInner {
    fn element(&self, stage: StageHandle) -> Result<gst::Element, BackendError> {
        self.stages
            .get(&stage.0)
            .map(|s| s.element.clone())
            .ok_or(BackendError::StaleHandle)
    }

    fn pipeline(&self, graph: GraphHandle) -> Result<gst::Pipeline, BackendError> {
        self.graphs
            .get(&graph.0)
            .map(|g| g.pipeline.clone())
            .ok_or(BackendError::StaleHandle)
    }
}

pub struct GstBackend {
    inner: Mutex<GstInner>,
}

impl GstBackend {
    /// Initialize GStreamer and create an empty backend
    pub fn new() -> Result<Self, BackendError> {
        gst::init().map_err(|e| BackendError::Other(format!("failed to initialize GStreamer: {}", e)))?;
        Ok(Self {
            inner: Mutex::new(GstInner::default()),
        })
    }

    fn pad(element: &gst::Element, name: &str) -> Option<gst::Pad> {
        element
            .static_pad(name)
            .or_else(|| element.pads().into_iter().find(|p| p.name().as_str() == name))
    }
}

fn transport_state(state: gst::State) -> Option<TransportState> {
    match state {
        gst::State::Null => Some(TransportState::Null),
        gst::State::Ready => Some(TransportState::Ready),
        gst::State::Paused => Some(TransportState::Paused),
        gst::State::Playing => Some(TransportState::Playing),
        _ => None,
    }
}

fn gst_state(state: TransportState) -> gst::State {
    match state {
        TransportState::Null => gst::State::Null,
        TransportState::Ready => gst::State::Ready,
        TransportState::Paused => gst::State::Paused,
        TransportState::Playing => gst::State::Playing,
    }
}

/// Translate a bus message into an event, if it is one we forward
fn bus_event(msg: &gst::Message, pipeline: &glib::WeakRef<gst::Pipeline>) -> Option<PipelineEvent> {
    use gst::MessageView;

    let source_name = || {
        msg.src()
            .map(|s| s.name().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    };

    match msg.view() {
        MessageView::Error(err) => Some(PipelineEvent::Error {
            source: source_name(),
            message: err.error().to_string(),
            detail: err.debug().map(|d| d.to_string()),
        }),
        MessageView::Eos(..) => Some(PipelineEvent::EndOfStream),
        MessageView::DurationChanged(..) => Some(PipelineEvent::DurationChanged),
        MessageView::StateChanged(changed) => {
            let is_graph = match (msg.src(), pipeline.upgrade()) {
                (Some(src), Some(pipeline)) => src == pipeline.upcast_ref::<gst::Object>(),
                _ => false,
            };
            let source = if is_graph {
                EventSource::Graph
            } else {
                EventSource::Stage(source_name())
            };
            Some(PipelineEvent::StateChanged {
                source,
                old: transport_state(changed.old())?,
                new: transport_state(changed.current())?,
                pending: transport_state(changed.pending()),
            })
        }
        _ => None,
    }
}

impl MediaBackend for GstBackend {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn new_graph(&self, name: &str) -> Result<GraphHandle, BackendError> {
        let pipeline = gst::Pipeline::with_name(name);
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.graphs.insert(
            id,
            GstGraph {
                pipeline,
                events: Arc::new(OnceLock::new()),
            },
        );
        Ok(GraphHandle(id))
    }

    fn create_stage(&self, kind: &str, name: &str) -> Result<StageHandle, BackendError> {
        let element = gst::ElementFactory::make(kind)
            .name(name)
            .build()
            .map_err(|_| BackendError::UnknownKind(kind.to_string()))?;
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.stages.insert(
            id,
            GstStage {
                element,
                graph: None,
            },
        );
        Ok(StageHandle(id))
    }

    fn destroy_stage(&self, stage: StageHandle) {
        let mut inner = self.inner.lock();
        if inner
            .stages
            .get(&stage.0)
            .is_some_and(|s| s.graph.is_none())
        {
            inner.stages.remove(&stage.0);
        }
    }

    fn add_stage(&self, graph: GraphHandle, stage: StageHandle) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        let pipeline = inner.pipeline(graph)?;
        let s = inner
            .stages
            .get_mut(&stage.0)
            .ok_or(BackendError::StaleHandle)?;
        pipeline
            .add(&s.element)
            .map_err(|e| BackendError::Other(e.to_string()))?;
        s.graph = Some(graph.0);
        Ok(())
    }

    fn set_property(
        &self,
        stage: StageHandle,
        key: &str,
        value: &StageValue,
    ) -> Result<(), BackendError> {
        let element = self.inner.lock().element(stage)?;
        let pspec = element
            .find_property(key)
            .filter(|p| p.flags().contains(glib::ParamFlags::WRITABLE))
            .ok_or_else(|| BackendError::UnknownProperty {
                stage: element.name().to_string(),
                property: key.to_string(),
            })?;
        let text = value.to_string();
        let value = glib::Value::deserialize(text.as_str(), pspec.value_type()).map_err(|_| {
            BackendError::InvalidValue {
                property: key.to_string(),
                value: text.clone(),
            }
        })?;
        element.set_property_from_value(key, &value);
        Ok(())
    }

    fn link(&self, upstream: StageHandle, downstream: StageHandle) -> Result<(), BackendError> {
        let (up, down) = {
            let inner = self.inner.lock();
            (inner.element(upstream)?, inner.element(downstream)?)
        };
        up.link(&down).map_err(|_| BackendError::LinkRefused {
            upstream: up.name().to_string(),
            downstream: down.name().to_string(),
        })
    }

    fn static_input(&self, stage: StageHandle, name: &str) -> Option<PadRef> {
        let element = self.inner.lock().element(stage).ok()?;
        element
            .static_pad(name)
            .filter(|pad| pad.direction() == gst::PadDirection::Sink)
            .map(|_| PadRef::new(stage, name))
    }

    fn is_linked(&self, pad: &PadRef) -> bool {
        let Ok(element) = self.inner.lock().element(pad.stage) else {
            return false;
        };
        Self::pad(&element, &pad.name).is_some_and(|p| p.is_linked())
    }

    fn link_pads(&self, output: &PadRef, input: &PadRef) -> Result<(), PadLinkError> {
        let (up, down) = {
            let inner = self.inner.lock();
            match (inner.element(output.stage), inner.element(input.stage)) {
                (Ok(up), Ok(down)) => (up, down),
                _ => return Err(PadLinkError::Unavailable),
            }
        };
        let src = Self::pad(&up, &output.name).ok_or(PadLinkError::Unavailable)?;
        let sink = Self::pad(&down, &input.name).ok_or(PadLinkError::Unavailable)?;
        match src.link(&sink) {
            Ok(_) => Ok(()),
            Err(gst::PadLinkError::WasLinked) => Err(PadLinkError::AlreadyLinked),
            Err(e) => Err(PadLinkError::Incompatible(format!("{:?}", e))),
        }
    }

    fn attach_events(&self, graph: GraphHandle, events: EventSender) -> Result<(), BackendError> {
        let (pipeline, slot) = {
            let inner = self.inner.lock();
            let g = inner.graphs.get(&graph.0).ok_or(BackendError::StaleHandle)?;
            (g.pipeline.clone(), g.events.clone())
        };
        slot.set(events.clone())
            .map_err(|_| BackendError::EventsAlreadyAttached(pipeline.name().to_string()))?;

        let bus = pipeline
            .bus()
            .ok_or_else(|| BackendError::Other("pipeline has no bus".to_string()))?;
        let weak = pipeline.downgrade();
        bus.set_sync_handler(move |_, msg| {
            if let Some(event) = bus_event(msg, &weak) {
                events.post(event);
            }
            gst::BusSyncReply::Drop
        });
        Ok(())
    }

    fn watch_dynamic_outputs(&self, stage: StageHandle) -> Result<(), BackendError> {
        let (element, slot) = {
            let inner = self.inner.lock();
            let s = inner.stages.get(&stage.0).ok_or(BackendError::StaleHandle)?;
            let graph = s
                .graph
                .and_then(|g| inner.graphs.get(&g))
                .ok_or_else(|| BackendError::Other("stage is not in a graph".to_string()))?;
            (s.element.clone(), graph.events.clone())
        };
        element.connect_pad_added(move |_, pad| {
            if pad.direction() != gst::PadDirection::Src {
                return;
            }
            match slot.get() {
                Some(events) => {
                    events.post(PipelineEvent::PadDiscovered {
                        stage,
                        pad: pad.name().to_string(),
                    });
                }
                None => debug!("pad {} added before events were attached", pad.name()),
            }
        });
        Ok(())
    }

    fn request_state(
        &self,
        graph: GraphHandle,
        target: TransportState,
    ) -> Result<StateChange, BackendError> {
        let pipeline = self.inner.lock().pipeline(graph)?;
        match pipeline.set_state(gst_state(target)) {
            Ok(gst::StateChangeSuccess::Success) => Ok(StateChange::Success),
            Ok(gst::StateChangeSuccess::Async) => Ok(StateChange::Async),
            Ok(gst::StateChangeSuccess::NoPreroll) => Ok(StateChange::NoPreroll),
            Err(_) => Err(BackendError::StateChangeRefused(target)),
        }
    }

    fn seek(
        &self,
        graph: GraphHandle,
        rate: f64,
        position: ClockTime,
        flags: SeekFlags,
    ) -> Result<(), BackendError> {
        let pipeline = self.inner.lock().pipeline(graph)?;
        let mut seek_flags = gst::SeekFlags::empty();
        if flags.flush {
            seek_flags |= gst::SeekFlags::FLUSH;
        }
        if flags.key_unit {
            seek_flags |= gst::SeekFlags::KEY_UNIT;
        }
        let position = gst::ClockTime::from_nseconds(position.nseconds());

        let result = if rate > 0.0 {
            pipeline.seek(
                rate,
                seek_flags,
                gst::SeekType::Set,
                position,
                gst::SeekType::End,
                gst::ClockTime::ZERO,
            )
        } else {
            // Reverse playback runs from the requested position back to the start
            pipeline.seek(
                rate,
                seek_flags,
                gst::SeekType::Set,
                gst::ClockTime::ZERO,
                gst::SeekType::Set,
                position,
            )
        };
        result.map_err(|e| BackendError::SeekRefused(e.to_string()))
    }

    fn query_position(&self, graph: GraphHandle) -> Option<ClockTime> {
        let pipeline = self.inner.lock().pipeline(graph).ok()?;
        pipeline
            .query_position::<gst::ClockTime>()
            .map(|t| ClockTime::from_nseconds(t.nseconds()))
    }

    fn query_duration(&self, graph: GraphHandle) -> Option<ClockTime> {
        let pipeline = self.inner.lock().pipeline(graph).ok()?;
        pipeline
            .query_duration::<gst::ClockTime>()
            .map(|t| ClockTime::from_nseconds(t.nseconds()))
    }

    fn destroy_graph(&self, graph: GraphHandle) {
        let removed = {
            let mut inner = self.inner.lock();
            let removed = inner.graphs.remove(&graph.0);
            inner.stages.retain(|_, s| s.graph != Some(graph.0));
            removed
        };
        if let Some(g) = removed {
            if let Some(bus) = g.pipeline.bus() {
                bus.unset_sync_handler();
            }
            if g.pipeline.set_state(gst::State::Null).is_err() {
                debug!("pipeline {} did not shut down cleanly", g.pipeline.name());
            }
        }
    }
}
