//! Player coordinator
//!
//! File playback with transport controls: seek, rate, volume and
//! position/duration queries on top of a [`GraphOrchestrator`].

use crate::config::PlayerConfig;
use crate::pipeline::backend::MediaBackend;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::health::HealthSummary;
use crate::pipeline::orchestrator::GraphOrchestrator;
use crate::pipeline::player::topology::{self, player_topology};
use crate::pipeline::registry::StageChoice;
use crate::pipeline::state::LifecycleState;
use crate::pipeline::types::ClockTime;
use log::info;
use std::sync::Arc;
use std::time::Duration;

pub struct Player {
    orchestrator: GraphOrchestrator,
    config: PlayerConfig,
    location: Option<String>,
}

impl Player {
    pub fn new(backend: Arc<dyn MediaBackend>, config: PlayerConfig) -> Self {
        let orchestrator = GraphOrchestrator::new(backend, player_topology(&config, None))
            .with_volume_stage(topology::SINK);
        orchestrator.controller().set_volume(config.volume);
        Self {
            orchestrator,
            config,
            location: None,
        }
    }

    /// Build the playback graph. A previously loaded source is kept.
    pub fn initialize(&mut self) -> PipelineResult<()> {
        self.orchestrator
            .set_topology(player_topology(&self.config, self.location.as_deref()));
        self.orchestrator.initialize()
    }

    /// Point the source at a file and refresh the cached duration
    ///
    /// Only possible while the transport is idle (built or stopped).
    pub fn load_source(&mut self, location: &str) -> PipelineResult<()> {
        match self.state() {
            LifecycleState::Unbuilt => return Err(PipelineError::NotBuilt),
            LifecycleState::Built | LifecycleState::Stopped => {}
            state => {
                return Err(PipelineError::InvalidState {
                    operation: "load_source",
                    state,
                });
            }
        }

        self.orchestrator
            .set_stage_property(topology::SOURCE, "location", location)?;
        self.location = Some(location.to_string());
        self.orchestrator.controller().refresh_duration();
        info!("Player: loaded {}", location);
        Ok(())
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn start(&self) -> PipelineResult<()> {
        self.orchestrator.controller().start()
    }

    pub fn stop(&self) {
        self.orchestrator.controller().stop()
    }

    pub fn pause(&self) -> PipelineResult<()> {
        self.orchestrator.controller().pause()
    }

    pub fn resume(&self) -> PipelineResult<()> {
        self.orchestrator.controller().resume()
    }

    /// Seek to a position in nanoseconds; negative positions clamp to zero
    pub fn seek(&self, position_ns: i64) -> PipelineResult<()> {
        self.orchestrator
            .controller()
            .seek(ClockTime::from_signed(position_ns))
    }

    /// Set the volume, clamped to [0, 1]; returns the applied value
    pub fn set_volume(&self, volume: f64) -> f64 {
        self.orchestrator.controller().set_volume(volume)
    }

    pub fn set_playback_rate(&self, rate: f64) -> PipelineResult<()> {
        self.orchestrator.controller().set_playback_rate(rate)
    }

    pub fn is_playing(&self) -> bool {
        self.orchestrator.controller().is_playing()
    }

    pub fn position(&self) -> ClockTime {
        self.orchestrator.controller().position()
    }

    /// Stream duration; zero while unknown
    pub fn duration(&self) -> ClockTime {
        self.orchestrator.controller().duration()
    }

    pub fn volume(&self) -> f64 {
        self.orchestrator.controller().volume()
    }

    pub fn playback_rate(&self) -> f64 {
        self.orchestrator.controller().playback_rate()
    }

    pub fn state(&self) -> LifecycleState {
        self.orchestrator.state()
    }

    pub fn stage_choices(&self) -> Vec<StageChoice> {
        self.orchestrator.stage_choices()
    }

    pub fn health(&self) -> HealthSummary {
        self.orchestrator.health()
    }

    /// Wait until every pending graph event has been handled
    pub fn sync_events(&self, timeout: Duration) -> bool {
        self.orchestrator.sync_events(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::backend::SimBackend;
    use crate::pipeline::types::StageValue;

    fn player(sim: &Arc<SimBackend>) -> Player {
        let mut player = Player::new(sim.clone(), PlayerConfig::default());
        player.initialize().unwrap();
        player
    }

    #[test]
    fn test_load_source_sets_location() {
        let sim = Arc::new(SimBackend::default());
        let mut player = player(&sim);
        player.load_source("movie.ts").unwrap();
        assert_eq!(
            sim.property(topology::SOURCE, "location"),
            Some(StageValue::from("movie.ts"))
        );
        // The transport has not prerolled yet
        assert_eq!(player.duration(), ClockTime::ZERO);
    }

    #[test]
    fn test_load_source_requires_idle_transport() {
        let sim = Arc::new(SimBackend::default());
        let mut player = Player::new(sim.clone(), PlayerConfig::default());
        assert_eq!(player.load_source("a.ts"), Err(PipelineError::NotBuilt));

        player.initialize().unwrap();
        player.start().unwrap();
        assert!(matches!(
            player.load_source("b.ts"),
            Err(PipelineError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_location_survives_reinitialize() {
        let sim = Arc::new(SimBackend::default());
        let mut player = player(&sim);
        player.load_source("movie.ts").unwrap();
        player.initialize().unwrap();
        assert_eq!(
            sim.property(topology::SOURCE, "location"),
            Some(StageValue::from("movie.ts"))
        );
    }

    #[test]
    fn test_configured_volume_applied() {
        let sim = Arc::new(SimBackend::default());
        let config = PlayerConfig {
            volume: 3.0,
            ..Default::default()
        };
        let player = Player::new(sim, config);
        assert_eq!(player.volume(), 1.0);
    }
}
