//! Pipeline lifecycle state management

/// Lifecycle state machine
///
/// Represents the coarse playback/transport status of an orchestrator's graph.
/// State transitions are validated so that every control path (API calls and
/// dispatched events) agrees on what is legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// No graph has been built yet
    Unbuilt,

    /// Graph is assembled and linked but the transport has never run
    Built,

    /// Transport is running
    Playing,

    /// Transport is paused (can resume to Playing)
    Paused,

    /// Transport was stopped, the graph is kept and can be started again
    Stopped,

    /// An unrecoverable error was reported; terminal until the graph is rebuilt
    Failed,
}

impl LifecycleState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &LifecycleState) -> bool {
        use LifecycleState::*;

        match (self, target) {
            // Any state may fail, and a rebuild always lands in Built
            (_, Failed) => true,
            (_, Built) => true,

            (Built | Paused | Stopped, Playing) => true,
            (Playing, Paused) => true,
            (Built | Playing | Paused, Stopped) => true,

            // Teardown
            (_, Unbuilt) => true,

            // Self-transitions
            (a, b) if a == b => true,

            // All other transitions invalid
            _ => false,
        }
    }

    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            LifecycleState::Unbuilt => "Unbuilt",
            LifecycleState::Built => "Built",
            LifecycleState::Playing => "Playing",
            LifecycleState::Paused => "Paused",
            LifecycleState::Stopped => "Stopped",
            LifecycleState::Failed => "Failed",
        }
    }

    /// Check if a seek may be issued in this state
    pub fn is_seekable(&self) -> bool {
        matches!(
            self,
            LifecycleState::Built | LifecycleState::Playing | LifecycleState::Paused
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}
