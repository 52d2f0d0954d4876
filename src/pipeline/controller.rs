//! Lifecycle controller
//!
//! Owns the lifecycle state and transport parameters of one orchestrator.
//! Every transition, whether requested through the API or forced by the event
//! dispatcher, goes through the same mutex, so no two transitions race. The
//! lock is held across the backend's state-change request.

use crate::pipeline::backend::{GraphHandle, MediaBackend, StageHandle};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::state::LifecycleState;
use crate::pipeline::types::{ClockTime, SeekFlags, StageValue, StateChange, TransportState};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

struct ControlState {
    lifecycle: LifecycleState,
    graph: Option<GraphHandle>,
    volume_stage: Option<StageHandle>,
    playing: bool,
    volume: f64,
    rate: f64,
    duration: ClockTime,
}

pub struct LifecycleController {
    backend: Arc<dyn MediaBackend>,
    name: String,
    inner: Mutex<ControlState>,
}

impl LifecycleController {
    pub fn new(backend: Arc<dyn MediaBackend>, name: impl Into<String>) -> Self {
        Self {
            backend,
            name: name.into(),
            inner: Mutex::new(ControlState {
                lifecycle: LifecycleState::Unbuilt,
                graph: None,
                volume_stage: None,
                playing: false,
                volume: 1.0,
                rate: 1.0,
                duration: ClockTime::ZERO,
            }),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.lock().lifecycle
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().playing
    }

    pub fn volume(&self) -> f64 {
        self.inner.lock().volume
    }

    pub fn playback_rate(&self) -> f64 {
        self.inner.lock().rate
    }

    /// Last known duration; zero means unknown
    pub fn duration(&self) -> ClockTime {
        self.inner.lock().duration
    }

    /// Current transport position; zero when stopped or not built
    pub fn position(&self) -> ClockTime {
        let inner = self.inner.lock();
        match (inner.lifecycle, inner.graph) {
            (
                LifecycleState::Built | LifecycleState::Playing | LifecycleState::Paused,
                Some(graph),
            ) => self.backend.query_position(graph).unwrap_or(ClockTime::ZERO),
            _ => ClockTime::ZERO,
        }
    }

    /// Take over a freshly built graph
    pub(crate) fn attach(&self, graph: GraphHandle, volume_stage: Option<StageHandle>) {
        let mut inner = self.inner.lock();
        inner.graph = Some(graph);
        inner.volume_stage = volume_stage;
        inner.playing = false;
        inner.rate = 1.0;
        inner.duration = ClockTime::ZERO;
        self.transition(&mut inner, LifecycleState::Built);
        let volume = inner.volume;
        self.apply_volume(&inner, volume);
    }

    /// Forget the graph; called on teardown after the transport was stopped
    pub(crate) fn detach(&self) {
        let mut inner = self.inner.lock();
        inner.graph = None;
        inner.volume_stage = None;
        inner.playing = false;
        inner.duration = ClockTime::ZERO;
        self.transition(&mut inner, LifecycleState::Unbuilt);
    }

    pub fn start(&self) -> PipelineResult<()> {
        self.run("start")
    }

    pub fn resume(&self) -> PipelineResult<()> {
        self.run("resume")
    }

    fn run(&self, operation: &'static str) -> PipelineResult<()> {
        let mut inner = self.inner.lock();
        let graph = self.graph(&inner)?;
        match inner.lifecycle {
            LifecycleState::Playing => return Ok(()),
            LifecycleState::Built | LifecycleState::Paused | LifecycleState::Stopped => {}
            state => return Err(PipelineError::InvalidState { operation, state }),
        }

        let change = self
            .backend
            .request_state(graph, TransportState::Playing)
            .map_err(|e| PipelineError::transport(operation, e))?;
        // An async change completes later and is reported by a StateChanged event
        inner.playing = change != StateChange::Async;
        self.transition(&mut inner, LifecycleState::Playing);
        Ok(())
    }

    pub fn pause(&self) -> PipelineResult<()> {
        let mut inner = self.inner.lock();
        let graph = self.graph(&inner)?;
        match inner.lifecycle {
            LifecycleState::Paused => return Ok(()),
            LifecycleState::Playing => {}
            state => {
                return Err(PipelineError::InvalidState {
                    operation: "pause",
                    state,
                });
            }
        }

        self.backend
            .request_state(graph, TransportState::Paused)
            .map_err(|e| PipelineError::transport("pause", e))?;
        inner.playing = false;
        self.transition(&mut inner, LifecycleState::Paused);
        Ok(())
    }

    /// Stop the transport. Always succeeds and is safe to repeat.
    ///
    /// A failed graph stays `Failed`; only its transport is released.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        self.halt(&mut inner);
    }

    fn halt(&self, inner: &mut ControlState) {
        inner.playing = false;
        let Some(graph) = inner.graph else {
            return;
        };
        match inner.lifecycle {
            LifecycleState::Stopped | LifecycleState::Unbuilt => return,
            _ => {}
        }
        if let Err(e) = self.backend.request_state(graph, TransportState::Null) {
            warn!("{}: failed to release transport: {}", self.name, e);
        }
        if inner.lifecycle != LifecycleState::Failed {
            self.transition(inner, LifecycleState::Stopped);
        }
    }

    pub fn seek(&self, position: ClockTime) -> PipelineResult<()> {
        let inner = self.inner.lock();
        let graph = self.seekable(&inner, "seek")?;
        let target = self.clamp(&inner, graph, position);
        self.backend
            .seek(graph, inner.rate, target, SeekFlags::FLUSH_KEY_UNIT)
            .map_err(|e| PipelineError::transport("seek", e))?;
        debug!("{}: seek to {} at rate {}", self.name, target, inner.rate);
        Ok(())
    }

    pub fn set_playback_rate(&self, rate: f64) -> PipelineResult<()> {
        if rate == 0.0 || !rate.is_finite() {
            return Err(PipelineError::InvalidParameter(format!(
                "playback rate must be a non-zero finite number, got {}",
                rate
            )));
        }

        let mut inner = self.inner.lock();
        if inner.graph.is_some() && inner.lifecycle.is_seekable() {
            let graph = self.seekable(&inner, "set_playback_rate")?;
            let position = self.backend.query_position(graph).unwrap_or(ClockTime::ZERO);
            let target = self.clamp(&inner, graph, position);
            self.backend
                .seek(graph, rate, target, SeekFlags::FLUSH_KEY_UNIT)
                .map_err(|e| PipelineError::transport("set_playback_rate", e))?;
        }
        inner.rate = rate;
        info!("{}: playback rate {}x", self.name, rate);
        Ok(())
    }

    /// Clamp and store the volume, then apply it to the sink if it has one
    pub fn set_volume(&self, volume: f64) -> f64 {
        let volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        let mut inner = self.inner.lock();
        inner.volume = volume;
        self.apply_volume(&inner, volume);
        volume
    }

    /// Re-query the duration from the graph
    pub fn refresh_duration(&self) -> ClockTime {
        let mut inner = self.inner.lock();
        inner.duration = inner
            .graph
            .and_then(|graph| self.backend.query_duration(graph))
            .unwrap_or(ClockTime::ZERO);
        inner.duration
    }

    /// Force the Failed state and release the transport
    pub(crate) fn fail(&self, reason: &str) {
        let mut inner = self.inner.lock();
        if inner.lifecycle == LifecycleState::Unbuilt {
            return;
        }
        if inner.lifecycle != LifecycleState::Failed {
            warn!("{}: failing: {}", self.name, reason);
            self.transition(&mut inner, LifecycleState::Failed);
        }
        self.halt(&mut inner);
    }

    pub(crate) fn end_of_stream(&self) {
        let mut inner = self.inner.lock();
        match inner.lifecycle {
            LifecycleState::Built | LifecycleState::Playing | LifecycleState::Paused => {
                self.halt(&mut inner)
            }
            _ => inner.playing = false,
        }
    }

    /// Graph-level transport change reported by the framework
    pub(crate) fn graph_state_changed(&self, new: TransportState) {
        let mut inner = self.inner.lock();
        if inner.lifecycle == LifecycleState::Playing {
            inner.playing = new == TransportState::Playing;
        }
    }

    fn transition(&self, inner: &mut ControlState, target: LifecycleState) {
        if inner.lifecycle == target {
            return;
        }
        if !inner.lifecycle.can_transition_to(&target) {
            warn!(
                "{}: unexpected transition {} -> {}",
                self.name, inner.lifecycle, target
            );
        }
        info!("{}: {} -> {}", self.name, inner.lifecycle, target);
        inner.lifecycle = target;
    }

    fn graph(&self, inner: &ControlState) -> PipelineResult<GraphHandle> {
        inner.graph.ok_or(PipelineError::NotBuilt)
    }

    fn seekable(&self, inner: &ControlState, operation: &'static str) -> PipelineResult<GraphHandle> {
        let graph = self.graph(inner)?;
        if !inner.lifecycle.is_seekable() {
            return Err(PipelineError::InvalidState {
                operation,
                state: inner.lifecycle,
            });
        }
        Ok(graph)
    }

    fn clamp(&self, inner: &ControlState, graph: GraphHandle, position: ClockTime) -> ClockTime {
        let duration = if inner.duration.is_zero() {
            self.backend.query_duration(graph).unwrap_or(ClockTime::ZERO)
        } else {
            inner.duration
        };
        if duration.is_zero() {
            position
        } else {
            position.min(duration)
        }
    }

    fn apply_volume(&self, inner: &ControlState, volume: f64) {
        let Some(stage) = inner.volume_stage else {
            return;
        };
        if let Err(e) = self
            .backend
            .set_property(stage, "volume", &StageValue::Double(volume))
        {
            debug!("{}: sink ignores volume: {}", self.name, e);
        }
    }
}
