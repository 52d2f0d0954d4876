//! Health counters for a pipeline session

use std::sync::atomic::{AtomicU64, Ordering};

/// Health metrics for a graph
///
/// Tracks what the event dispatcher and the dynamic-link resolver did.
/// All fields use atomic operations for thread-safe access.
#[derive(Default)]
pub struct PipelineHealth {
    /// Events taken off the inbox and dispatched
    pub events_dispatched: AtomicU64,

    /// Error events and dynamic link failures
    pub errors: AtomicU64,

    /// End-of-stream notifications
    pub end_of_stream: AtomicU64,

    /// Duration re-queries
    pub duration_updates: AtomicU64,

    /// Graph-level state changes surfaced to the controller
    pub state_changes: AtomicU64,

    /// Dynamic outputs linked to their downstream stage
    pub dynamic_links: AtomicU64,

    /// Discoveries for inputs that were already linked
    pub duplicate_pads: AtomicU64,

    /// Discoveries that matched no declared route
    pub ignored_pads: AtomicU64,

    /// Discoveries dropped because the graph was being torn down
    pub stale_pads: AtomicU64,
}

impl PipelineHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_end_of_stream(&self) {
        self.end_of_stream.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duration_update(&self) {
        self.duration_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_state_change(&self) {
        self.state_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dynamic_link(&self) {
        self.dynamic_links.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_pad(&self) {
        self.duplicate_pads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ignored_pad(&self) {
        self.ignored_pads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_pad(&self) {
        self.stale_pads.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a summary of health metrics
    pub fn summary(&self) -> HealthSummary {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        HealthSummary {
            events_dispatched: load(&self.events_dispatched),
            errors: load(&self.errors),
            end_of_stream: load(&self.end_of_stream),
            duration_updates: load(&self.duration_updates),
            state_changes: load(&self.state_changes),
            dynamic_links: load(&self.dynamic_links),
            duplicate_pads: load(&self.duplicate_pads),
            ignored_pads: load(&self.ignored_pads),
            stale_pads: load(&self.stale_pads),
        }
    }
}

/// Snapshot of health metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthSummary {
    pub events_dispatched: u64,
    pub errors: u64,
    pub end_of_stream: u64,
    pub duration_updates: u64,
    pub state_changes: u64,
    pub dynamic_links: u64,
    pub duplicate_pads: u64,
    pub ignored_pads: u64,
    pub stale_pads: u64,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Health: {} events ({} errors, {} eos, {} duration updates, {} state changes), {} dynamic links ({} duplicate, {} ignored, {} stale)",
            self.events_dispatched,
            self.errors,
            self.end_of_stream,
            self.duration_updates,
            self.state_changes,
            self.dynamic_links,
            self.duplicate_pads,
            self.ignored_pads,
            self.stale_pads
        )
    }
}
