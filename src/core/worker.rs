use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

use super::{Event, Payload};

/// Routing entry point every worker emits into.
///
/// Implemented by the controller; called synchronously on the emitting
/// worker's thread, so implementations must tolerate concurrent callers.
pub trait EventSink: Send + Sync {
    fn route(&self, event: Event);
}

/// Handle a worker uses to talk to the rest of the system while running.
#[derive(Clone)]
pub struct WorkerContext {
    name: String,
    sink: Option<Weak<dyn EventSink>>,
    stop: Arc<AtomicBool>,
}

impl WorkerContext {
    pub fn new(name: impl Into<String>, sink: Weak<dyn EventSink>, stop: Arc<AtomicBool>) -> Self {
        Self {
            name: name.into(),
            sink: Some(sink),
            stop,
        }
    }

    /// Context that is not attached to any controller; emitted events are dropped.
    pub fn detached(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sink: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Forward an event to the controller for routing.
    pub fn emit(&self, event: Event) {
        match self.sink.as_ref().and_then(Weak::upgrade) {
            Some(sink) => sink.route(event),
            None => trace!(worker = %self.name, event = %event, "dropping event, worker not attached"),
        }
    }

    /// Build an event sourced from this worker and emit it.
    pub fn publish(&self, name: &str, data: Payload, frame_number: Option<u64>) {
        self.emit(Event::new(self.name.clone(), name, data).with_optional_frame_number(frame_number));
    }

    /// Ask the loop running this worker to exit after the current tick.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Unit of concurrent execution driven by a worker loop.
///
/// The loop repeatedly hands every queued event to [`handle_event`](Worker::handle_event),
/// runs one [`task`](Worker::task) tick and reports its timing, until stopped.
/// [`finish`](Worker::finish) runs exactly once when the loop exits, also after a failure.
pub trait Worker: Send {
    /// Event names for which only the most recent pending instance is kept.
    fn coalesced_events(&self) -> &[&'static str] {
        &[]
    }

    /// Whether this worker must own the thread that starts the system (rendering loops).
    fn runs_on_main_thread(&self) -> bool {
        false
    }

    fn handle_event(&mut self, event: Event, ctx: &WorkerContext) -> Result<()> {
        trace!(worker = %ctx.name(), event = %event, "ignoring event");
        Ok(())
    }

    /// One unit of work. Must not block indefinitely.
    fn task(&mut self, ctx: &WorkerContext) -> Result<()>;

    fn finish(&mut self, _ctx: &WorkerContext) {}
}
