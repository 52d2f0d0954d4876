//! Topology descriptors
//!
//! A [`Topology`] names every stage of a graph, the ordered fallback chain of
//! concrete kinds for each stage, the static links, and the links that can only
//! be made once a dynamic stage announces its outputs.

use crate::pipeline::error::BuildError;
use crate::pipeline::types::{Capability, StageValue};
use std::collections::HashSet;

/// One concrete stage kind to try, with the configuration it needs
#[derive(Debug, Clone, PartialEq)]
pub struct StageCandidate {
    pub kind: String,
    /// Applied in order after instantiation
    pub config: Vec<(String, StageValue)>,
}

impl StageCandidate {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            config: Vec::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<StageValue>) -> Self {
        self.config.push((key.into(), value.into()));
        self
    }
}

/// A logical stage: a role name plus its fallback chain
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    pub name: String,
    pub capability: Capability,
    pub candidates: Vec<StageCandidate>,
}

impl StageSpec {
    pub fn new(name: impl Into<String>, capability: Capability) -> Self {
        Self {
            name: name.into(),
            capability,
            candidates: Vec::new(),
        }
    }

    /// A stage whose candidates need no configuration
    pub fn from_kinds<S: AsRef<str>>(
        name: impl Into<String>,
        capability: Capability,
        kinds: &[S],
    ) -> Self {
        kinds.iter().fold(Self::new(name, capability), |spec, kind| {
            spec.candidate(StageCandidate::new(kind.as_ref()))
        })
    }

    pub fn candidate(mut self, candidate: StageCandidate) -> Self {
        self.candidates.push(candidate);
        self
    }

    /// Kinds of every candidate, in preference order
    pub fn kinds(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.kind.clone()).collect()
    }
}

/// A link resolved at runtime from a dynamic stage's discovered output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicLinkSpec {
    pub from: String,
    pub to: String,
    pub input_pad: String,
    /// Only outputs whose name starts with this prefix are linked
    pub pad_prefix: Option<String>,
}

impl DynamicLinkSpec {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            input_pad: "sink".to_string(),
            pad_prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.pad_prefix = Some(prefix.into());
        self
    }

    pub fn with_input_pad(mut self, pad: impl Into<String>) -> Self {
        self.input_pad = pad.into();
        self
    }

    pub fn accepts(&self, pad: &str) -> bool {
        self.pad_prefix
            .as_deref()
            .is_none_or(|prefix| pad.starts_with(prefix))
    }
}

/// Full description of one graph
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Topology {
    pub name: String,
    pub stages: Vec<StageSpec>,
    pub links: Vec<(String, String)>,
    pub dynamic_links: Vec<DynamicLinkSpec>,
}

impl Topology {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn stage(mut self, spec: StageSpec) -> Self {
        self.stages.push(spec);
        self
    }

    pub fn link(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.links.push((from.into(), to.into()));
        self
    }

    /// Link each named stage to the next one
    pub fn chain(mut self, names: &[&str]) -> Self {
        for pair in names.windows(2) {
            self.links.push((pair[0].to_string(), pair[1].to_string()));
        }
        self
    }

    pub fn dynamic(mut self, spec: DynamicLinkSpec) -> Self {
        self.dynamic_links.push(spec);
        self
    }

    pub fn find(&self, name: &str) -> Option<&StageSpec> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut StageSpec> {
        self.stages.iter_mut().find(|s| s.name == name)
    }

    /// Check structural consistency before anything is instantiated
    pub fn validate(&self) -> Result<(), BuildError> {
        let invalid = |msg: String| Err(BuildError::Topology(msg));

        if self.stages.is_empty() {
            return invalid(format!("topology '{}' has no stages", self.name));
        }

        let mut names = HashSet::new();
        for stage in &self.stages {
            if !names.insert(stage.name.as_str()) {
                return invalid(format!("duplicate stage name '{}'", stage.name));
            }
            if stage.candidates.is_empty() {
                return invalid(format!("stage '{}' has no candidates", stage.name));
            }
        }

        let mut fed = HashSet::new();
        for (from, to) in &self.links {
            let (Some(up), Some(down)) = (self.find(from), self.find(to)) else {
                return invalid(format!("link {} -> {} names an unknown stage", from, to));
            };
            match up.capability {
                Capability::Sink => {
                    return invalid(format!("sink '{}' cannot feed another stage", from));
                }
                Capability::DynamicDemux => {
                    return invalid(format!(
                        "'{}' has dynamic outputs and needs a dynamic link",
                        from
                    ));
                }
                _ => {}
            }
            if down.capability == Capability::Source {
                return invalid(format!("source '{}' has no input", to));
            }
            if !fed.insert(to.as_str()) {
                return invalid(format!("stage '{}' is fed by more than one link", to));
            }
        }

        for spec in &self.dynamic_links {
            let (Some(up), Some(down)) = (self.find(&spec.from), self.find(&spec.to)) else {
                return invalid(format!(
                    "dynamic link {} -> {} names an unknown stage",
                    spec.from, spec.to
                ));
            };
            if up.capability != Capability::DynamicDemux {
                return invalid(format!("'{}' has no dynamic outputs", spec.from));
            }
            if down.capability == Capability::Source {
                return invalid(format!("source '{}' has no input", spec.to));
            }
            if fed.contains(spec.to.as_str()) {
                return invalid(format!(
                    "stage '{}' is fed by both a static and a dynamic link",
                    spec.to
                ));
            }
        }

        Ok(())
    }
}
