//! Graph event stream
//!
//! The backend posts events from whatever thread the framework uses; a single
//! dispatcher drains them in emission order. The sender and inbox share a pair
//! of counters so callers can wait until everything posted so far has been
//! handled.

use crate::pipeline::backend::StageHandle;
use crate::pipeline::types::TransportState;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Where a state-change event originated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSource {
    /// The top-level graph container
    Graph,
    /// An individual stage inside the graph
    Stage(String),
}

/// Events produced by a graph at arbitrary times
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A stage reported an unrecoverable error
    Error {
        source: String,
        message: String,
        detail: Option<String>,
    },

    /// All data has been processed
    EndOfStream,

    /// The stream duration may have changed; re-query it
    DurationChanged,

    /// A transport state transition completed
    StateChanged {
        source: EventSource,
        old: TransportState,
        new: TransportState,
        pending: Option<TransportState>,
    },

    /// A dynamic stage exposed a new output after format negotiation
    PadDiscovered { stage: StageHandle, pad: String },
}

impl std::fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineEvent::Error {
                source, message, ..
            } => write!(f, "Error from {}: {}", source, message),
            PipelineEvent::EndOfStream => write!(f, "EOS"),
            PipelineEvent::DurationChanged => write!(f, "DurationChanged"),
            PipelineEvent::StateChanged {
                source, old, new, ..
            } => match source {
                EventSource::Graph => write!(f, "StateChanged(graph): {} -> {}", old, new),
                EventSource::Stage(name) => {
                    write!(f, "StateChanged({}): {} -> {}", name, old, new)
                }
            },
            PipelineEvent::PadDiscovered { stage, pad } => {
                write!(f, "PadDiscovered({}:{})", stage, pad)
            }
        }
    }
}

pub(crate) enum Envelope {
    Event(PipelineEvent),
    Shutdown,
}

struct Counters {
    posted: AtomicU64,
    handled: Mutex<u64>,
    drained: Condvar,
}

/// Posting side of a graph's event stream
///
/// Cheap to clone; the backend keeps one per graph.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Envelope>,
    counters: Arc<Counters>,
}

impl EventSender {
    /// Post an event. Returns false once the dispatcher has shut down.
    pub fn post(&self, event: PipelineEvent) -> bool {
        self.counters.posted.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(Envelope::Event(event)).is_err() {
            // Nobody will handle it; keep the counters balanced
            self.counters.posted.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.tx.send(Envelope::Shutdown);
    }

    /// Block until every event posted so far has been handled.
    ///
    /// Returns false if the timeout elapsed first.
    pub fn wait_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut handled = self.counters.handled.lock();
        loop {
            let posted = self.counters.posted.load(Ordering::SeqCst);
            if *handled >= posted {
                return true;
            }
            if self.counters.drained.wait_until(&mut handled, deadline).timed_out() {
                return *handled >= self.counters.posted.load(Ordering::SeqCst);
            }
        }
    }

    pub fn posted(&self) -> u64 {
        self.counters.posted.load(Ordering::SeqCst)
    }
}

/// Consuming side of a graph's event stream
pub(crate) struct EventInbox {
    rx: mpsc::UnboundedReceiver<Envelope>,
    counters: Arc<Counters>,
}

impl EventInbox {
    /// Wait for the next envelope. Must not be called from inside an async runtime.
    pub(crate) fn next(&mut self) -> Option<Envelope> {
        self.rx.blocking_recv()
    }

    /// Mark one event as fully handled
    pub(crate) fn ack(&self) {
        let mut handled = self.counters.handled.lock();
        *handled += 1;
        self.counters.drained.notify_all();
    }

    /// Account for events that will never be handled (inbox shut down)
    pub(crate) fn close(&mut self) {
        self.rx.close();
        let mut dropped = 0u64;
        while let Ok(envelope) = self.rx.try_recv() {
            if matches!(envelope, Envelope::Event(_)) {
                dropped += 1;
            }
        }
        let mut handled = self.counters.handled.lock();
        *handled += dropped;
        self.counters.drained.notify_all();
    }
}

/// Create a connected sender/inbox pair for one graph
pub(crate) fn channel() -> (EventSender, EventInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    let counters = Arc::new(Counters {
        posted: AtomicU64::new(0),
        handled: Mutex::new(0),
        drained: Condvar::new(),
    });
    (
        EventSender {
            tx,
            counters: counters.clone(),
        },
        EventInbox { rx, counters },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_arrive_in_order() {
        let (sender, mut inbox) = channel();
        sender.post(PipelineEvent::DurationChanged);
        sender.post(PipelineEvent::EndOfStream);

        assert!(matches!(
            inbox.next(),
            Some(Envelope::Event(PipelineEvent::DurationChanged))
        ));
        assert!(matches!(
            inbox.next(),
            Some(Envelope::Event(PipelineEvent::EndOfStream))
        ));
    }

    #[test]
    fn test_wait_drained_tracks_acks() {
        let (sender, mut inbox) = channel();
        sender.post(PipelineEvent::EndOfStream);
        assert!(!sender.wait_drained(Duration::from_millis(10)));

        let _ = inbox.next();
        inbox.ack();
        assert!(sender.wait_drained(Duration::from_millis(10)));
    }

    #[test]
    fn test_close_accounts_for_pending_events() {
        let (sender, mut inbox) = channel();
        sender.post(PipelineEvent::EndOfStream);
        sender.post(PipelineEvent::DurationChanged);
        inbox.close();

        assert!(sender.wait_drained(Duration::from_millis(10)));
        assert!(!sender.post(PipelineEvent::EndOfStream));
    }
}
