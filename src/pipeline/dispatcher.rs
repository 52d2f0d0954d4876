//! Event dispatcher
//!
//! A dedicated thread drains one graph's event inbox in emission order and
//! applies each event to the controller or the dynamic-link resolver. It is the
//! only place that forces a `Failed` transition.

use crate::pipeline::controller::LifecycleController;
use crate::pipeline::error::{BackendError, BuildError, PipelineError, PipelineResult};
use crate::pipeline::events::{Envelope, EventInbox, EventSender, EventSource, PipelineEvent};
use crate::pipeline::health::PipelineHealth;
use crate::pipeline::resolver::DynamicLinkResolver;
use log::{debug, error, info};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

struct DispatchContext {
    controller: Arc<LifecycleController>,
    resolver: Arc<DynamicLinkResolver>,
    health: Arc<PipelineHealth>,
}

impl DispatchContext {
    fn dispatch(&self, event: PipelineEvent) {
        self.health.record_event();
        match event {
            PipelineEvent::Error {
                source,
                message,
                detail,
            } => {
                error!("Error received from element {}: {}", source, message);
                error!("Debugging information: {}", detail.as_deref().unwrap_or("none"));
                self.health.record_error();
                self.controller.fail(&message);
            }
            PipelineEvent::EndOfStream => {
                info!("End-Of-Stream reached");
                self.health.record_end_of_stream();
                self.controller.end_of_stream();
            }
            PipelineEvent::DurationChanged => {
                let duration = self.controller.refresh_duration();
                debug!("Duration is now {}", duration);
                self.health.record_duration_update();
            }
            PipelineEvent::StateChanged {
                source: EventSource::Graph,
                old,
                new,
                ..
            } => {
                info!("Pipeline state changed from {} to {}", old, new);
                self.health.record_state_change();
                self.controller.graph_state_changed(new);
            }
            PipelineEvent::StateChanged { .. } => {}
            PipelineEvent::PadDiscovered { stage, pad } => {
                if let Err(e) = self.resolver.resolve(stage, &pad) {
                    error!("{}", e);
                    self.health.record_error();
                    self.controller.fail(&e.to_string());
                }
            }
        }
    }
}

/// Owns the dispatcher thread of one graph
pub struct EventDispatcher {
    sender: EventSender,
    thread: Option<JoinHandle<()>>,
}

impl EventDispatcher {
    pub(crate) fn spawn(
        name: &str,
        sender: EventSender,
        mut inbox: EventInbox,
        controller: Arc<LifecycleController>,
        resolver: Arc<DynamicLinkResolver>,
        health: Arc<PipelineHealth>,
    ) -> PipelineResult<Self> {
        let context = DispatchContext {
            controller,
            resolver,
            health,
        };

        let thread = std::thread::Builder::new()
            .name(format!("{}-events", name))
            .spawn(move || {
                while let Some(envelope) = inbox.next() {
                    match envelope {
                        Envelope::Event(event) => {
                            context.dispatch(event);
                            inbox.ack();
                        }
                        Envelope::Shutdown => break,
                    }
                }
                inbox.close();
                debug!("Event dispatcher exited");
            })
            .map_err(|e| {
                PipelineError::Build(BuildError::Backend(BackendError::Other(format!(
                    "failed to spawn event dispatcher: {}",
                    e
                ))))
            })?;

        Ok(Self {
            sender,
            thread: Some(thread),
        })
    }

    /// Wait until every event posted so far has been handled
    pub fn sync(&self, timeout: Duration) -> bool {
        self.sender.wait_drained(timeout)
    }

    /// Handle the events already queued, then stop the thread
    pub fn shutdown(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.sender.shutdown();
            if thread.join().is_err() {
                error!("Event dispatcher panicked");
            }
        }
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
