//! Sender pipeline coordinator
//!
//! Chains capture → encode → (mux | payload) → output and manages its lifecycle.
//! End of stream or an error stops the sender.

use crate::config::SenderConfig;
use crate::pipeline::backend::MediaBackend;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::health::HealthSummary;
use crate::pipeline::orchestrator::GraphOrchestrator;
use crate::pipeline::registry::StageChoice;
use crate::pipeline::sender::topology::sender_topology;
use crate::pipeline::state::LifecycleState;
use log::info;
use std::sync::Arc;
use std::time::Duration;

/// Coordinates the camera sender graph
pub struct Sender {
    orchestrator: GraphOrchestrator,
    config: SenderConfig,
}

impl Sender {
    pub fn new(backend: Arc<dyn MediaBackend>, config: SenderConfig) -> Self {
        Self {
            orchestrator: GraphOrchestrator::new(backend, sender_topology(&config)),
            config,
        }
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Build the capture graph
    pub fn initialize(&mut self) -> PipelineResult<()> {
        self.orchestrator.set_topology(sender_topology(&self.config));
        self.orchestrator.initialize()?;
        info!("Sender: initialized ({:?} output)", self.config.output);
        Ok(())
    }

    /// Start streaming
    pub fn start(&self) -> PipelineResult<()> {
        self.orchestrator.controller().start()
    }

    /// Pause streaming
    pub fn pause(&self) -> PipelineResult<()> {
        self.orchestrator.controller().pause()
    }

    /// Resume from pause
    pub fn resume(&self) -> PipelineResult<()> {
        self.orchestrator.controller().resume()
    }

    /// Stop the pipeline
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
    use crate::config::SenderOutput;
    use crate::pipeline::backend::SimBackend;
    use crate::pipeline::sender::topology;
    use crate::pipeline::types::StageValue;

    #[test]
    fn test_rtp_sender_configures_sink() {
        let sim = Arc::new(SimBackend::default());
        let mut sender = Sender::new(sim.clone(), SenderConfig::default());
        sender.initialize().unwrap();
        sender.start().unwrap();

        assert!(sender.is_running());
        assert_eq!(sim.property(topology::SINK, "port"), Some(StageValue::Int(5000)));
        assert_eq!(sim.property(topology::PAYLOADER, "pt"), Some(StageValue::Int(96)));
        assert_eq!(
            sim.property(topology::ENCODER, "tune"),
            Some(StageValue::Int(4))
        );
    }

    #[test]
    fn test_file_sender_falls_back_to_software_encoder() {
        let sim = Arc::new(SimBackend::default());
        sim.make_unavailable("nvh264enc");
        let config = SenderConfig {
            output: SenderOutput::File,
            ..Default::default()
        };
        let mut sender = Sender::new(sim.clone(), config);
        sender.initialize().unwrap();

        let encoder = sender
            .stage_choices()
            .into_iter()
            .find(|c| c.role == topology::ENCODER)
            .unwrap();
        assert_eq!(encoder.kind, "x264enc");
        assert!(encoder.is_fallback());
        assert_eq!(
            sim.property(topology::SINK, "location"),
            Some(StageValue::from("output.ts"))
        );
    }
}
