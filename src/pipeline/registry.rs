//! Stage registry
//!
//! Instantiates logical stages through the backend, walking each stage's
//! fallback chain until one concrete kind can be created.

use crate::pipeline::backend::{MediaBackend, StageHandle};
use crate::pipeline::error::{BackendError, PipelineError, PipelineResult};
use crate::pipeline::topology::{StageCandidate, StageSpec};
use log::{debug, info, warn};
use std::sync::Arc;

/// Which concrete kind was picked for a logical stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageChoice {
    /// Logical stage name from the topology
    pub role: String,
    /// Concrete kind that instantiated
    pub kind: String,
    /// Kinds tried earlier in the chain that could not be created
    pub rejected: Vec<String>,
}

impl StageChoice {
    /// True if a preferred candidate was skipped
    pub fn is_fallback(&self) -> bool {
        !self.rejected.is_empty()
    }
}

impl std::fmt::Display for StageChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_fallback() {
            write!(
                f,
                "{}: {} (fallback, unavailable: {})",
                self.role,
                self.kind,
                self.rejected.join(", ")
            )
        } else {
            write!(f, "{}: {}", self.role, self.kind)
        }
    }
}

/// Factory for stages, stateless apart from the backend it wraps
#[derive(Clone)]
pub struct StageRegistry {
    backend: Arc<dyn MediaBackend>,
}

impl StageRegistry {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self { backend }
    }

    /// Instantiate one concrete candidate and apply its configuration
    ///
    /// Configuration is best effort: a key the stage rejects is logged and
    /// skipped, the stage itself is kept.
    pub fn instantiate(
        &self,
        candidate: &StageCandidate,
        name: &str,
    ) -> Result<StageHandle, BackendError> {
        let stage = self.backend.create_stage(&candidate.kind, name)?;
        for (key, value) in &candidate.config {
            if let Err(e) = self.backend.set_property(stage, key, value) {
                warn!(
                    "Failed to set {}={} on '{}' ({}): {}",
                    key, value, name, candidate.kind, e
                );
            }
        }
        Ok(stage)
    }

    /// Create a stage from the first candidate that instantiates
    pub fn create(&self, spec: &StageSpec) -> PipelineResult<(StageHandle, StageChoice)> {
        let mut rejected = Vec::new();
        for candidate in &spec.candidates {
            match self.instantiate(candidate, &spec.name) {
                Ok(stage) => {
                    let choice = StageChoice {
                        role: spec.name.clone(),
                        kind: candidate.kind.clone(),
                        rejected,
                    };
                    info!("Using {}", choice);
                    return Ok((stage, choice));
                }
                Err(e) => {
                    debug!("Candidate {} for '{}' unavailable: {}", candidate.kind, spec.name, e);
                    rejected.push(candidate.kind.clone());
                }
            }
        }

        Err(PipelineError::UnsupportedStage {
            role: spec.name.clone(),
            tried: rejected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::backend::SimBackend;
    use crate::pipeline::types::{Capability, StageValue};

    fn decoder_spec() -> StageSpec {
        StageSpec::new("decoder", Capability::Filter)
            .candidate(StageCandidate::new("nvh264dec"))
            .candidate(StageCandidate::new("avdec_h264").with("max-threads", 2))
    }

    #[test]
    fn test_prefers_first_candidate() {
        let sim = Arc::new(SimBackend::default());
        let registry = StageRegistry::new(sim.clone());

        let (_, choice) = registry.create(&decoder_spec()).unwrap();
        assert_eq!(choice.kind, "nvh264dec");
        assert!(!choice.is_fallback());
    }

    #[test]
    fn test_falls_back_and_reports_choice() {
        let sim = Arc::new(SimBackend::default());
        sim.make_unavailable("nvh264dec");
        let registry = StageRegistry::new(sim.clone());

        let (_, choice) = registry.create(&decoder_spec()).unwrap();
        assert_eq!(choice.kind, "avdec_h264");
        assert_eq!(choice.rejected, vec!["nvh264dec".to_string()]);
        assert_eq!(
            choice.to_string(),
            "decoder: avdec_h264 (fallback, unavailable: nvh264dec)"
        );
        assert_eq!(sim.property("decoder", "max-threads"), Some(StageValue::Int(2)));
    }

    #[test]
    fn test_exhausted_chain_is_unsupported() {
        let sim = Arc::new(SimBackend::default());
        sim.make_unavailable("nvh264dec");
        sim.make_unavailable("avdec_h264");
        let registry = StageRegistry::new(sim);

        let err = registry.create(&decoder_spec()).unwrap_err();
        assert_eq!(
            err,
            PipelineError::UnsupportedStage {
                role: "decoder".into(),
                tried: vec!["nvh264dec".into(), "avdec_h264".into()],
            }
        );
    }

    #[test]
    fn test_bad_property_keeps_stage() {
        let sim = Arc::new(SimBackend::default());
        let registry = StageRegistry::new(sim.clone());
        let candidate = StageCandidate::new("queue").with("no-such-property", true);

        assert!(registry.instantiate(&candidate, "queue").is_ok());
        assert_eq!(sim.live_stages(), 1);
    }
}
