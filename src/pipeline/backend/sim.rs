//! In-process simulated media framework
//!
//! Models just enough of a real framework for the orchestration core to be
//! exercised without one: a catalog of stage kinds with media tags, static and
//! dynamic pads, a transport with position/duration/rate, key-unit seeking,
//! and an event stream. Stage kinds can be marked unavailable to exercise
//! fallback chains, and the next state change can be made to fail.

use super::{GraphHandle, MediaBackend, PadRef, StageHandle};
use crate::pipeline::error::{BackendError, PadLinkError};
use crate::pipeline::events::{EventSender, EventSource, PipelineEvent};
use crate::pipeline::types::{ClockTime, SeekFlags, StageValue, StateChange, TransportState};
use log::debug;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

const ANY: &str = "ANY";
const RAW_VIDEO: &str = "video/x-raw";
const H264: &str = "video/x-h264";
const RTP: &str = "application/x-rtp";
const MPEGTS: &str = "video/mpegts";

const INPUT_PAD: &str = "sink";

#[derive(Debug, Clone, Copy)]
enum Output {
    None,
    Static(&'static str),
    Dynamic,
}

#[derive(Debug, Clone, Copy)]
struct KindProfile {
    input: Option<&'static str>,
    output: Output,
    properties: &'static [&'static str],
}

const CAMERA_PROPS: &[&str] = &[
    "device-index",
    "device-name",
    "device",
    "do-timestamp",
    "caps",
    "is-live",
    "pattern",
];
const VIDEO_SINK_PROPS: &[&str] = &["sync", "async", "caps", "force-aspect-ratio"];
const ENCODER_PROPS: &[&str] = &[
    "bitrate",
    "tune",
    "speed-preset",
    "key-int-max",
    "preset",
    "gop-size",
    "rc-mode",
    "zerolatency",
];

fn profile(kind: &str) -> Option<KindProfile> {
    let profile = match kind {
        "filesrc" => KindProfile {
            input: None,
            output: Output::Static(ANY),
            properties: &["location"],
        },
        "udpsrc" => KindProfile {
            input: None,
            output: Output::Static(RTP),
            properties: &["port", "address", "buffer-size", "caps"],
        },
        "avfvideosrc" | "mfvideosrc" | "v4l2src" | "ksvideosrc" | "autovideosrc"
        | "videotestsrc" => KindProfile {
            input: None,
            output: Output::Static(RAW_VIDEO),
            properties: CAMERA_PROPS,
        },
        "queue" => KindProfile {
            input: Some(ANY),
            output: Output::Static(ANY),
            properties: &["max-size-buffers", "max-size-time", "max-size-bytes", "leaky"],
        },
        "capsfilter" => KindProfile {
            input: Some(ANY),
            output: Output::Static(ANY),
            properties: &["caps"],
        },
        "tsdemux" | "qtdemux" | "matroskademux" => KindProfile {
            input: Some(ANY),
            output: Output::Dynamic,
            properties: &[],
        },
        "h264parse" => KindProfile {
            input: Some(H264),
            output: Output::Static(H264),
            properties: &["config-interval", "disable-passthrough"],
        },
        "avdec_h264" | "nvh264dec" | "vtdec" | "d3d11h264dec" | "vah264dec" => KindProfile {
            input: Some(H264),
            output: Output::Static(RAW_VIDEO),
            properties: &["max-threads"],
        },
        "videoconvert" | "videoscale" => KindProfile {
            input: Some(RAW_VIDEO),
            output: Output::Static(RAW_VIDEO),
            properties: &[],
        },
        "autovideosink" | "d3dvideosink" | "osxvideosink" | "xvimagesink" | "glimagesink" => {
            KindProfile {
                input: Some(RAW_VIDEO),
                output: Output::None,
                properties: VIDEO_SINK_PROPS,
            }
        }
        "fakesink" => KindProfile {
            input: Some(ANY),
            output: Output::None,
            properties: &["sync", "async", "silent"],
        },
        "pulsesink" | "playsink" => KindProfile {
            input: Some(ANY),
            output: Output::None,
            properties: &["sync", "async", "volume", "mute"],
        },
        "x264enc" | "nvh264enc" | "vtenc_h264" | "openh264enc" => KindProfile {
            input: Some(RAW_VIDEO),
            output: Output::Static(H264),
            properties: ENCODER_PROPS,
        },
        "rtph264pay" => KindProfile {
            input: Some(H264),
            output: Output::Static(RTP),
            properties: &["pt", "config-interval", "mtu"],
        },
        "rtph264depay" => KindProfile {
            input: Some(RTP),
            output: Output::Static(H264),
            properties: &[],
        },
        "mpegtsmux" => KindProfile {
            input: Some(ANY),
            output: Output::Static(MPEGTS),
            properties: &["alignment"],
        },
        "filesink" => KindProfile {
            input: Some(ANY),
            output: Output::None,
            properties: &["location", "sync", "async"],
        },
        "udpsink" => KindProfile {
            input: Some(ANY),
            output: Output::None,
            properties: &["host", "port", "sync", "async"],
        },
        _ => return None,
    };
    Some(profile)
}

fn compatible(output: &str, input: &str) -> bool {
    output == ANY || input == ANY || output == input
}

/// One elementary stream a demultiplexer exposes once negotiated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimStream {
    pub pad: String,
    pub media: String,
}

impl SimStream {
    pub fn new(pad: impl Into<String>, media: impl Into<String>) -> Self {
        Self {
            pad: pad.into(),
            media: media.into(),
        }
    }
}

/// Description of the simulated media behind every graph
#[derive(Debug, Clone)]
pub struct SimMedia {
    /// Known stream duration; `None` models live capture
    pub duration: Option<ClockTime>,
    /// Distance between decodable sync points
    pub key_unit_interval: ClockTime,
    /// Outputs announced by demultiplexers
    pub streams: Vec<SimStream>,
}

impl SimMedia {
    /// A transport-stream file with one H.264 video and one audio stream
    pub fn file(duration: ClockTime) -> Self {
        Self {
            duration: Some(duration),
            key_unit_interval: ClockTime::SECOND,
            streams: vec![
                SimStream::new("video_0", H264),
                SimStream::new("audio_0", "audio/mpeg"),
            ],
        }
    }

    /// A live source without a declared duration
    pub fn live() -> Self {
        Self {
            duration: None,
            key_unit_interval: ClockTime::SECOND,
            streams: vec![SimStream::new("video_0", H264)],
        }
    }

    pub fn with_key_unit_interval(mut self, interval: ClockTime) -> Self {
        self.key_unit_interval = interval;
        self
    }

    pub fn with_streams(mut self, streams: Vec<SimStream>) -> Self {
        self.streams = streams;
        self
    }
}

impl Default for SimMedia {
    fn default() -> Self {
        SimMedia::file(ClockTime::from_seconds(10))
    }
}

struct SimStage {
    kind: String,
    name: String,
    profile: KindProfile,
    properties: HashMap<String, StageValue>,
    graph: Option<u64>,
    watched: bool,
    /// Announced dynamic outputs: pad name -> media
    dynamic_pads: HashMap<String, String>,
}

impl SimStage {
    fn output_media(&self, pad: &str) -> Option<String> {
        match self.profile.output {
            Output::Static(media) if pad == "src" => Some(media.to_string()),
            Output::Dynamic => self.dynamic_pads.get(pad).cloned(),
            _ => None,
        }
    }
}

struct SimGraph {
    name: String,
    stages: Vec<u64>,
    events: Option<EventSender>,
    state: TransportState,
    position: ClockTime,
    rate: f64,
    playing_since: Option<Instant>,
    eos_sent: bool,
}

#[derive(Default)]
struct SimInner {
    next_id: u64,
    stages: HashMap<u64, SimStage>,
    graphs: HashMap<u64, SimGraph>,
    /// input pad -> output pad
    links: HashMap<PadRef, PadRef>,
    current_graph: Option<u64>,
    dynamic_links: u64,
    unavailable: HashSet<String>,
    fail_next_state_change: bool,
    defer_next_state_change: bool,
    /// Graph-level state change held back by a deferred request
    deferred: Option<(u64, PipelineEvent)>,
}

impl SimInner {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn post(&self, graph: u64, event: PipelineEvent) {
        if let Some(sender) = self.graphs.get(&graph).and_then(|g| g.events.as_ref()) {
            sender.post(event);
        }
    }

    fn stage_name(&self, stage: StageHandle) -> String {
        self.stages
            .get(&stage.0)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| stage.to_string())
    }

    /// Current position, posting end-of-stream the first time the edge is reached
    fn position(&mut self, graph: u64, duration: Option<ClockTime>) -> Option<ClockTime> {
        let g = self.graphs.get_mut(&graph)?;
        let mut position = g.position;
        if let Some(since) = g.playing_since {
            let travelled = ClockTime::from(since.elapsed().mul_f64(g.rate.abs()));
            position = if g.rate >= 0.0 {
                position.saturating_add(travelled)
            } else {
                position.saturating_sub(travelled)
            };
        }
        if let Some(duration) = duration {
            position = position.min(duration);
            let at_edge = if g.rate >= 0.0 {
                position >= duration
            } else {
                position.is_zero()
            };
            if at_edge && g.playing_since.is_some() && !g.eos_sent {
                g.eos_sent = true;
                self.post(graph, PipelineEvent::EndOfStream);
            }
        }
        Some(position)
    }

    fn announce_dynamic_pads(&mut self, graph: u64, streams: &[SimStream]) {
        let stage_ids = match self.graphs.get(&graph) {
            Some(g) => g.stages.clone(),
            None => return,
        };
        for id in stage_ids {
            let Some(stage) = self.stages.get_mut(&id) else {
                continue;
            };
            if !matches!(stage.profile.output, Output::Dynamic) {
                continue;
            }
            let mut fresh = Vec::new();
            for stream in streams {
                if !stage.dynamic_pads.contains_key(&stream.pad) {
                    stage
                        .dynamic_pads
                        .insert(stream.pad.clone(), stream.media.clone());
                    fresh.push(stream.pad.clone());
                }
            }
            if stage.watched {
                for pad in fresh {
                    self.post(
                        graph,
                        PipelineEvent::PadDiscovered {
                            stage: StageHandle(id),
                            pad,
                        },
                    );
                }
            }
        }
    }

    fn release_dynamic_pads(&mut self, graph: u64) {
        let stage_ids = match self.graphs.get(&graph) {
            Some(g) => g.stages.clone(),
            None => return,
        };
        for id in stage_ids {
            if let Some(stage) = self.stages.get_mut(&id) {
                stage.dynamic_pads.clear();
            }
            let stage = StageHandle(id);
            self.links
                .retain(|_, output| !(output.stage == stage && output.name != "src"));
        }
    }
}

/// Simulated framework; see the module docs
pub struct SimBackend {
    media: Mutex<SimMedia>,
    inner: Mutex<SimInner>,
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new(SimMedia::default())
    }
}

impl SimBackend {
    pub fn new(media: SimMedia) -> Self {
        Self {
            media: Mutex::new(media),
            inner: Mutex::new(SimInner::default()),
        }
    }

    /// Make a stage kind fail to instantiate
    pub fn make_unavailable(&self, kind: &str) {
        self.inner.lock().unavailable.insert(kind.to_string());
    }

    /// Refuse the next `request_state` call
    pub fn fail_next_state_change(&self) {
        self.inner.lock().fail_next_state_change = true;
    }

    /// Answer the next `request_state` with `Async` and hold back the
    /// graph-level `StateChanged` until `complete_state_change`
    pub fn defer_next_state_change(&self) {
        self.inner.lock().defer_next_state_change = true;
    }

    /// Post the held-back graph `StateChanged`, if any
    pub fn complete_state_change(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.deferred.take() {
            Some((graph, event)) => {
                inner.post(graph, event);
                true
            }
            None => false,
        }
    }

    /// Change the media duration and announce it on the current graph
    pub fn set_duration(&self, duration: Option<ClockTime>) {
        self.media.lock().duration = duration;
        self.emit(PipelineEvent::DurationChanged);
    }

    /// Inject an event into the most recently created live graph
    pub fn emit(&self, event: PipelineEvent) -> bool {
        let inner = self.inner.lock();
        let Some(graph) = inner.current_graph else {
            return false;
        };
        match inner.graphs.get(&graph).and_then(|g| g.events.as_ref()) {
            Some(sender) => sender.post(event),
            None => false,
        }
    }

    /// Announce a dynamic output again, as a framework re-negotiating would
    pub fn rediscover(&self, stage_name: &str, pad: &str) -> bool {
        let handle = {
            let inner = self.inner.lock();
            inner
                .stages
                .iter()
                .find(|(_, s)| s.name == stage_name && s.dynamic_pads.contains_key(pad))
                .map(|(id, _)| StageHandle(*id))
        };
        match handle {
            Some(stage) => self.emit(PipelineEvent::PadDiscovered {
                stage,
                pad: pad.to_string(),
            }),
            None => false,
        }
    }

    /// Number of dynamic links made so far
    pub fn dynamic_link_count(&self) -> u64 {
        self.inner.lock().dynamic_links
    }

    /// Transport state of the most recent live graph
    pub fn transport_state(&self) -> Option<TransportState> {
        let inner = self.inner.lock();
        inner
            .current_graph
            .and_then(|g| inner.graphs.get(&g))
            .map(|g| g.state)
    }

    /// Current playback rate of the most recent live graph
    pub fn transport_rate(&self) -> Option<f64> {
        let inner = self.inner.lock();
        inner
            .current_graph
            .and_then(|g| inner.graphs.get(&g))
            .map(|g| g.rate)
    }

    /// Read back a property set on a live stage
    pub fn property(&self, stage_name: &str, key: &str) -> Option<StageValue> {
        let inner = self.inner.lock();
        inner
            .stages
            .values()
            .find(|s| s.name == stage_name)
            .and_then(|s| s.properties.get(key).cloned())
    }

    /// Concrete kind of a live stage
    pub fn stage_kind(&self, stage_name: &str) -> Option<String> {
        let inner = self.inner.lock();
        inner
            .stages
            .values()
            .find(|s| s.name == stage_name)
            .map(|s| s.kind.clone())
    }

    /// Whether the named stage's input pad has a peer
    pub fn input_linked(&self, stage_name: &str) -> bool {
        let inner = self.inner.lock();
        inner
            .links
            .keys()
            .any(|pad| inner.stage_name(pad.stage) == stage_name)
    }

    pub fn live_stages(&self) -> usize {
        self.inner.lock().stages.len()
    }

    pub fn live_graphs(&self) -> usize {
        self.inner.lock().graphs.len()
    }
}

impl MediaBackend for SimBackend {
    fn name(&self) -> &'static str {
        "sim"
    }

    fn new_graph(&self, name: &str) -> Result<GraphHandle, BackendError> {
        let mut inner = self.inner.lock();
        let id = inner.next_id();
        inner.graphs.insert(
            id,
            SimGraph {
                name: name.to_string(),
                stages: Vec::new(),
                events: None,
                state: TransportState::Null,
                position: ClockTime::ZERO,
                rate: 1.0,
                playing_since: None,
                eos_sent: false,
            },
        );
        inner.current_graph = Some(id);
        Ok(GraphHandle(id))
    }

    fn create_stage(&self, kind: &str, name: &str) -> Result<StageHandle, BackendError> {
        let mut inner = self.inner.lock();
        if inner.unavailable.contains(kind) {
            return Err(BackendError::UnknownKind(kind.to_string()));
        }
        let profile = profile(kind).ok_or_else(|| BackendError::UnknownKind(kind.to_string()))?;
        let id = inner.next_id();
        inner.stages.insert(
            id,
            SimStage {
                kind: kind.to_string(),
                name: name.to_string(),
                profile,
                properties: HashMap::new(),
                graph: None,
                watched: false,
                dynamic_pads: HashMap::new(),
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
        if !inner.graphs.contains_key(&graph.0) {
            return Err(BackendError::StaleHandle);
        }
        let s = inner
            .stages
            .get_mut(&stage.0)
            .ok_or(BackendError::StaleHandle)?;
        if s.graph.is_some() {
            return Err(BackendError::Other(format!(
                "stage '{}' already belongs to a graph",
                s.name
            )));
        }
        s.graph = Some(graph.0);
        if let Some(g) = inner.graphs.get_mut(&graph.0) {
            g.stages.push(stage.0);
        }
        Ok(())
    }

    fn set_property(
        &self,
        stage: StageHandle,
        key: &str,
        value: &StageValue,
    ) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        let s = inner
            .stages
            .get_mut(&stage.0)
            .ok_or(BackendError::StaleHandle)?;
        if !s.profile.properties.contains(&key) {
            return Err(BackendError::UnknownProperty {
                stage: s.name.clone(),
                property: key.to_string(),
            });
        }
        s.properties.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn link(&self, upstream: StageHandle, downstream: StageHandle) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        let refused = |inner: &SimInner| BackendError::LinkRefused {
            upstream: inner.stage_name(upstream),
            downstream: inner.stage_name(downstream),
        };
        let (Some(up), Some(down)) = (inner.stages.get(&upstream.0), inner.stages.get(&downstream.0))
        else {
            return Err(BackendError::StaleHandle);
        };
        let (Output::Static(output), Some(input)) = (up.profile.output, down.profile.input) else {
            return Err(refused(&inner));
        };
        if up.graph.is_none() || up.graph != down.graph || !compatible(output, input) {
            return Err(refused(&inner));
        }
        let input_pad = PadRef::new(downstream, INPUT_PAD);
        let output_pad = PadRef::new(upstream, "src");
        if inner.links.contains_key(&input_pad) || inner.links.values().any(|o| *o == output_pad) {
            return Err(refused(&inner));
        }
        inner.links.insert(input_pad, output_pad);
        Ok(())
    }

    fn static_input(&self, stage: StageHandle, name: &str) -> Option<PadRef> {
        let inner = self.inner.lock();
        let s = inner.stages.get(&stage.0)?;
        (name == INPUT_PAD && s.profile.input.is_some()).then(|| PadRef::new(stage, name))
    }

    fn is_linked(&self, pad: &PadRef) -> bool {
        let inner = self.inner.lock();
        inner.links.contains_key(pad) || inner.links.values().any(|o| o == pad)
    }

    fn link_pads(&self, output: &PadRef, input: &PadRef) -> Result<(), PadLinkError> {
        let mut inner = self.inner.lock();
        let Some(media) = inner
            .stages
            .get(&output.stage.0)
            .and_then(|s| s.output_media(&output.name))
        else {
            return Err(PadLinkError::Unavailable);
        };
        let Some(down) = inner.stages.get(&input.stage.0) else {
            return Err(PadLinkError::Unavailable);
        };
        let Some(accepts) = down.profile.input else {
            return Err(PadLinkError::Incompatible(format!(
                "'{}' has no input",
                down.name
            )));
        };
        if inner.links.contains_key(input) {
            return Err(PadLinkError::AlreadyLinked);
        }
        if !compatible(&media, accepts) {
            return Err(PadLinkError::Incompatible(format!(
                "{} cannot feed {} input of '{}'",
                media, accepts, down.name
            )));
        }
        inner.links.insert(input.clone(), output.clone());
        inner.dynamic_links += 1;
        debug!("sim: linked {}:{} -> {}", output.stage, output.name, input.stage);
        Ok(())
    }

    fn attach_events(&self, graph: GraphHandle, events: EventSender) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        let g = inner
            .graphs
            .get_mut(&graph.0)
            .ok_or(BackendError::StaleHandle)?;
        if g.events.is_some() {
            return Err(BackendError::EventsAlreadyAttached(g.name.clone()));
        }
        g.events = Some(events);
        Ok(())
    }

    fn watch_dynamic_outputs(&self, stage: StageHandle) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        let s = inner
            .stages
            .get_mut(&stage.0)
            .ok_or(BackendError::StaleHandle)?;
        if !matches!(s.profile.output, Output::Dynamic) {
            return Err(BackendError::Other(format!(
                "'{}' has no dynamic outputs",
                s.name
            )));
        }
        s.watched = true;
        Ok(())
    }

    fn request_state(
        &self,
        graph: GraphHandle,
        target: TransportState,
    ) -> Result<StateChange, BackendError> {
        let media = self.media.lock().clone();
        let mut inner = self.inner.lock();
        if std::mem::take(&mut inner.fail_next_state_change) {
            return Err(BackendError::StateChangeRefused(target));
        }
        let old = inner
            .graphs
            .get(&graph.0)
            .map(|g| g.state)
            .ok_or(BackendError::StaleHandle)?;
        let deferred = std::mem::take(&mut inner.defer_next_state_change);

        // Fold elapsed play time into the stored position before the clock stops
        if old == TransportState::Playing && target != TransportState::Playing {
            let position = inner.position(graph.0, media.duration);
            if let Some(g) = inner.graphs.get_mut(&graph.0) {
                g.position = position.unwrap_or(g.position);
                g.playing_since = None;
            }
        }

        if old <= TransportState::Ready && target >= TransportState::Paused {
            inner.announce_dynamic_pads(graph.0, &media.streams);
        }
        if target <= TransportState::Ready {
            inner.release_dynamic_pads(graph.0);
        }

        let stage_names: Vec<String> = inner
            .graphs
            .get(&graph.0)
            .map(|g| g.stages.iter().map(|id| inner.stage_name(StageHandle(*id))).collect())
            .unwrap_or_default();

        if let Some(g) = inner.graphs.get_mut(&graph.0) {
            g.state = target;
            match target {
                TransportState::Playing => {
                    if old != TransportState::Playing {
                        g.playing_since = Some(Instant::now());
                    }
                }
                TransportState::Paused => {}
                TransportState::Ready | TransportState::Null => {
                    g.position = ClockTime::ZERO;
                    g.eos_sent = false;
                }
            }
        }

        if old != target {
            for name in stage_names {
                inner.post(
                    graph.0,
                    PipelineEvent::StateChanged {
                        source: EventSource::Stage(name),
                        old,
                        new: target,
                        pending: None,
                    },
                );
            }
            let graph_change = PipelineEvent::StateChanged {
                source: EventSource::Graph,
                old,
                new: target,
                pending: None,
            };
            if deferred {
                inner.deferred = Some((graph.0, graph_change));
            } else {
                inner.post(graph.0, graph_change);
            }
            if old <= TransportState::Ready
                && target >= TransportState::Paused
                && media.duration.is_some()
            {
                inner.post(graph.0, PipelineEvent::DurationChanged);
            }
        }
        if deferred {
            return Ok(StateChange::Async);
        }
        Ok(StateChange::Success)
    }

    fn seek(
        &self,
        graph: GraphHandle,
        rate: f64,
        position: ClockTime,
        flags: SeekFlags,
    ) -> Result<(), BackendError> {
        if rate == 0.0 || !rate.is_finite() {
            return Err(BackendError::SeekRefused(format!("rate {}", rate)));
        }
        let media = self.media.lock().clone();
        let mut inner = self.inner.lock();
        let g = inner
            .graphs
            .get_mut(&graph.0)
            .ok_or(BackendError::StaleHandle)?;

        let mut target = match media.duration {
            Some(duration) => position.min(duration),
            None => position,
        };
        let interval = media.key_unit_interval.nseconds();
        if flags.key_unit && interval > 0 {
            target = ClockTime::from_nseconds(target.nseconds() / interval * interval);
        }

        g.position = target;
        g.rate = rate;
        g.eos_sent = false;
        if g.playing_since.is_some() {
            g.playing_since = Some(Instant::now());
        }
        debug!("sim: seek to {} at rate {} ({:?})", target, rate, flags);
        Ok(())
    }

    fn query_position(&self, graph: GraphHandle) -> Option<ClockTime> {
        let duration = self.media.lock().duration;
        self.inner.lock().position(graph.0, duration)
    }

    fn query_duration(&self, graph: GraphHandle) -> Option<ClockTime> {
        let duration = self.media.lock().duration;
        let inner = self.inner.lock();
        let g = inner.graphs.get(&graph.0)?;
        if g.state >= TransportState::Paused {
            duration
        } else {
            None
        }
    }

    fn destroy_graph(&self, graph: GraphHandle) {
        let mut inner = self.inner.lock();
        let Some(g) = inner.graphs.remove(&graph.0) else {
            return;
        };
        for id in &g.stages {
            inner.stages.remove(id);
        }
        let owned: HashSet<u64> = g.stages.iter().copied().collect();
        inner
            .links
            .retain(|input, output| !owned.contains(&input.stage.0) && !owned.contains(&output.stage.0));
        if inner.current_graph == Some(graph.0) {
            inner.current_graph = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::events;

    fn graph_with(sim: &SimBackend, kinds: &[(&str, &str)]) -> (GraphHandle, Vec<StageHandle>) {
        let graph = sim.new_graph("test").unwrap();
        let stages = kinds
            .iter()
            .map(|(kind, name)| {
                let stage = sim.create_stage(kind, name).unwrap();
                sim.add_stage(graph, stage).unwrap();
                stage
            })
            .collect();
        (graph, stages)
    }

    #[test]
    fn test_unknown_and_unavailable_kinds() {
        let sim = SimBackend::default();
        assert!(matches!(
            sim.create_stage("nosuchthing", "x"),
            Err(BackendError::UnknownKind(_))
        ));
        sim.make_unavailable("nvh264dec");
        assert!(sim.create_stage("nvh264dec", "decoder").is_err());
        assert!(sim.create_stage("avdec_h264", "decoder").is_ok());
    }

    #[test]
    fn test_static_link_checks_media() {
        let sim = SimBackend::default();
        let (_, stages) = graph_with(
            &sim,
            &[("videotestsrc", "src"), ("rtph264depay", "depay"), ("videoconvert", "conv")],
        );
        assert!(sim.link(stages[0], stages[1]).is_err());
        assert!(sim.link(stages[0], stages[2]).is_ok());
        // An input takes one peer only
        assert!(sim.link(stages[0], stages[2]).is_err());
    }

    #[test]
    fn test_demux_pads_announced_on_preroll() {
        let sim = SimBackend::default();
        let (graph, stages) = graph_with(&sim, &[("tsdemux", "demuxer"), ("avdec_h264", "decoder")]);
        let (sender, _inbox) = events::channel();
        sim.attach_events(graph, sender.clone()).unwrap();
        sim.watch_dynamic_outputs(stages[0]).unwrap();

        sim.request_state(graph, TransportState::Paused).unwrap();
        // Two pads, two stage state changes, one graph state change, one duration change
        assert_eq!(sender.posted(), 6);

        let video = PadRef::new(stages[0], "video_0");
        let audio = PadRef::new(stages[0], "audio_0");
        let input = sim.static_input(stages[1], "sink").unwrap();
        assert!(matches!(
            sim.link_pads(&audio, &input),
            Err(PadLinkError::Incompatible(_))
        ));
        sim.link_pads(&video, &input).unwrap();
        assert_eq!(sim.link_pads(&video, &input), Err(PadLinkError::AlreadyLinked));

        // Going back to Null releases the dynamic pads and their links
        sim.request_state(graph, TransportState::Null).unwrap();
        assert!(!sim.is_linked(&input));
        assert_eq!(sim.link_pads(&video, &input), Err(PadLinkError::Unavailable));
    }

    #[test]
    fn test_seek_snaps_to_key_unit() {
        let sim = SimBackend::new(
            SimMedia::file(ClockTime::from_seconds(10))
                .with_key_unit_interval(ClockTime::from_seconds(2)),
        );
        let (graph, _) = graph_with(&sim, &[("filesrc", "source")]);
        sim.request_state(graph, TransportState::Paused).unwrap();

        sim.seek(graph, 1.0, ClockTime::from_nseconds(5_500_000_000), SeekFlags::FLUSH_KEY_UNIT)
            .unwrap();
        assert_eq!(sim.query_position(graph), Some(ClockTime::from_seconds(4)));

        sim.seek(graph, 1.0, ClockTime::from_seconds(60), SeekFlags::default())
            .unwrap();
        assert_eq!(sim.query_position(graph), Some(ClockTime::from_seconds(10)));
    }

    #[test]
    fn test_duration_unknown_before_preroll() {
        let sim = SimBackend::default();
        let (graph, _) = graph_with(&sim, &[("filesrc", "source")]);
        assert_eq!(sim.query_duration(graph), None);
        sim.request_state(graph, TransportState::Paused).unwrap();
        assert_eq!(sim.query_duration(graph), Some(ClockTime::from_seconds(10)));
    }

    #[test]
    fn test_destroy_graph_releases_stages() {
        let sim = SimBackend::default();
        let (graph, _) = graph_with(&sim, &[("filesrc", "source"), ("queue", "queue")]);
        let loose = sim.create_stage("queue", "loose").unwrap();
        assert_eq!(sim.live_stages(), 3);
        sim.destroy_graph(graph);
        sim.destroy_stage(loose);
        assert_eq!(sim.live_stages(), 0);
        assert_eq!(sim.live_graphs(), 0);
    }
}
