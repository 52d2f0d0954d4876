//! Receiver pipeline coordinator
//!
//! Chains receive → (demux | depayload) → decode → render and manages its
//! lifecycle. Playback stops on end of stream or error.

use crate::config::ReceiverConfig;
use crate::pipeline::backend::MediaBackend;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::health::HealthSummary;
use crate::pipeline::orchestrator::GraphOrchestrator;
use crate::pipeline::receiver::topology::{self, receiver_topology};
use crate::pipeline::registry::StageChoice;
use crate::pipeline::state::LifecycleState;
use log::info;
use std::sync::Arc;
use std::time::Duration;

/// Coordinates the receiver graph
pub struct Receiver {
    orchestrator: GraphOrchestrator,
    config: ReceiverConfig,
}

impl Receiver {
    pub fn new(backend: Arc<dyn MediaBackend>, config: ReceiverConfig) -> Self {
        Self {
            orchestrator: GraphOrchestrator::new(backend, receiver_topology(&config)),
            config,
        }
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Build the receive graph and report the decoder that was picked
    pub fn initialize(&mut self) -> PipelineResult<()> {
        self.orchestrator.set_topology(receiver_topology(&self.config));
        self.orchestrator.initialize()?;
        if let Some(decoder) = self.decoder() {
            info!("Receiver: using decoder {}", decoder.kind);
        }
        Ok(())
    }

    /// Decoder chosen from the fallback chain
    pub fn decoder(&self) -> Option<StageChoice> {
        self.stage_choices()
            .into_iter()
            .find(|choice| choice.role == topology::DECODER)
    }

    pub fn start(&self) -> PipelineResult<()> {
        self.orchestrator.controller().start()
    }

    pub fn pause(&self) -> PipelineResult<()> {
        self.orchestrator.controller().pause()
    }

    pub fn resume(&self) -> PipelineResult<()> {
        self.orchestrator.controller().resume()
    }

    pub fn stop(&self) {
        self.orchestrator.controller().stop()
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Playing
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

    pub fn sync_events(&self, timeout: Duration) -> bool {
        self.orchestrator.sync_events(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReceiverInput;
    use crate::pipeline::backend::SimBackend;

    #[test]
    fn test_decoder_fallback_reported() {
        let sim = Arc::new(SimBackend::default());
        sim.make_unavailable("nvh264dec");
        let mut receiver = Receiver::new(sim, ReceiverConfig::default());
        receiver.initialize().unwrap();

        let decoder = receiver.decoder().unwrap();
        assert_eq!(decoder.kind, "avdec_h264");
        assert_eq!(decoder.rejected, vec!["nvh264dec".to_string()]);
    }

    #[test]
    fn test_file_receiver_links_video_stream() {
        let sim = Arc::new(SimBackend::default());
        let config = ReceiverConfig {
            input: ReceiverInput::File,
            ..Default::default()
        };
        let mut receiver = Receiver::new(sim.clone(), config);
        receiver.initialize().unwrap();
        receiver.start().unwrap();

        assert!(receiver.sync_events(Duration::from_secs(2)));
        assert!(sim.input_linked(topology::PARSER));
        assert_eq!(sim.stage_kind(topology::PARSER).as_deref(), Some("h264parse"));
        assert!(receiver.is_running());
    }
}
