use anyhow::{bail, Context, Result};
use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Instant;
use tracing::{debug, error, info, trace, Span};

use super::WorkerState;
use crate::config::WorkerSettings;
use crate::core::{names, Event, EventQueue, EventSink, Payload, Worker, WorkerContext};
use crate::error::WorkerTaskError;
use crate::observability::{TaskProfiler, WorkerMetrics};

/// Where a worker loop executes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Dedicated thread; `start` returns immediately
    Thread,
    /// The calling thread; `start` blocks until the loop exits
    CurrentThread,
}

/// Report sent when a worker loop ends
#[derive(Debug)]
pub struct WorkerExit {
    pub worker: String,
    pub error: Option<WorkerTaskError>,
}

struct Shared {
    name: String,
    queue: EventQueue,
    stop: Arc<AtomicBool>,
    state: Mutex<WorkerState>,
    active: Mutex<bool>,
    exited: Condvar,
    loop_thread: Mutex<Option<ThreadId>>,
    finished: AtomicBool,
    metrics: Arc<WorkerMetrics>,
}

impl Shared {
    fn transition(&self, next: WorkerState) -> bool {
        let mut state = self.state.lock();
        if !state.can_transition_to(&next) {
            trace!(worker = %self.name, from = state.name(), to = next.name(), "Ignoring state change");
            return false;
        }
        debug!(worker = %self.name, from = state.name(), to = next.name(), "Worker state change");
        *state = next;
        true
    }

    fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.transition(WorkerState::Stopping);
        self.queue.wake();
    }

    fn on_loop_thread(&self) -> bool {
        *self.loop_thread.lock() == Some(thread::current().id())
    }

    fn mark_exited(&self) {
        *self.active.lock() = false;
        self.exited.notify_all();
    }

    fn wait_exited(&self) {
        let mut active = self.active.lock();
        while *active {
            self.exited.wait(&mut active);
        }
    }

    fn finish_once(&self, worker: &mut dyn Worker, ctx: &WorkerContext) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(worker = %self.name, "Running cleanup");
        if panic::catch_unwind(AssertUnwindSafe(|| worker.finish(ctx))).is_err() {
            self.metrics.record_error();
            error!(worker = %self.name, "Worker cleanup panicked");
        }
    }
}

/// Owns one worker and drives its loop.
///
/// The handle is shared between the controller (which starts, stops and
/// dispatches to it) and every thread that routes events to it.
pub struct WorkerHandle {
    shared: Arc<Shared>,
    settings: WorkerSettings,
    main_thread: bool,
    worker: Mutex<Option<Box<dyn Worker>>>,
    thread: Mutex<Option<JoinHandle<Box<dyn Worker>>>>,
    span: Span,
    exits: Option<Sender<WorkerExit>>,
}

impl WorkerHandle {
    pub fn new(name: impl Into<String>, worker: Box<dyn Worker>, settings: WorkerSettings) -> Self {
        let name = name.into();
        let coalesced = worker
            .coalesced_events()
            .iter()
            .map(|event| event.to_string())
            .chain(settings.coalesce.iter().cloned());

        Self {
            shared: Arc::new(Shared {
                queue: EventQueue::with_coalescing(coalesced),
                stop: Arc::new(AtomicBool::new(false)),
                state: Mutex::new(WorkerState::Idle),
                active: Mutex::new(false),
                exited: Condvar::new(),
                loop_thread: Mutex::new(None),
                finished: AtomicBool::new(false),
                metrics: Arc::new(WorkerMetrics::new(name.clone())),
                name: name.clone(),
            }),
            settings,
            main_thread: worker.runs_on_main_thread(),
            worker: Mutex::new(Some(worker)),
            thread: Mutex::new(None),
            span: tracing::info_span!("worker", name = %name),
            exits: None,
        }
    }

    /// Span the worker loop runs in
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn with_exit_notifier(mut self, exits: Sender<WorkerExit>) -> Self {
        self.exits = Some(exits);
        self
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state.lock().clone()
    }

    pub fn metrics(&self) -> Arc<WorkerMetrics> {
        self.shared.metrics.clone()
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    pub fn runs_on_main_thread(&self) -> bool {
        self.main_thread
    }

    pub fn coalesces(&self, event_name: &str) -> bool {
        self.shared.queue.coalesces(event_name)
    }

    /// Events queued but not yet handled
    pub fn pending_events(&self) -> Vec<Event> {
        self.shared.queue.snapshot()
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Hand an inbound event to this worker. Safe to call from any thread.
    pub fn dispatch(&self, event: Event) {
        if self.shared.state.lock().is_terminal() {
            trace!(worker = %self.name(), event = %event, "Dropping event for stopped worker");
            return;
        }
        let superseded = self.shared.queue.push(event);
        self.shared.metrics.record_received(superseded);
        if superseded > 0 {
            trace!(worker = %self.name(), superseded, "Coalesced pending events");
        }
    }

    /// Start the worker loop, emitting into `sink`.
    ///
    /// With [`RunMode::CurrentThread`] this blocks until the loop exits.
    pub fn start(&self, sink: Weak<dyn EventSink>, mode: RunMode) -> Result<()> {
        let Some(worker) = self.worker.lock().take() else {
            bail!("Worker '{}' is already running", self.name());
        };

        let shared = self.shared.clone();
        shared.stop.store(false, Ordering::SeqCst);
        shared.finished.store(false, Ordering::SeqCst);
        *shared.active.lock() = true;
        shared.transition(WorkerState::Running);

        let ctx = WorkerContext::new(shared.name.clone(), sink, shared.stop.clone());
        let settings = self.settings.clone();
        let exits = self.exits.clone();
        let span = self.span.clone();

        match mode {
            RunMode::CurrentThread => {
                let worker = span.in_scope(|| run_loop(worker, &ctx, &shared, &settings, exits.as_ref()));
                *self.worker.lock() = Some(worker);
            }
            RunMode::Thread => {
                let spawned = thread::Builder::new()
                    .name(shared.name.clone())
                    .spawn({
                        let shared = shared.clone();
                        move || {
                            let _entered = span.enter();
                            run_loop(worker, &ctx, &shared, &settings, exits.as_ref())
                        }
                    });

                match spawned {
                    Ok(handle) => *self.thread.lock() = Some(handle),
                    Err(e) => {
                        shared.transition(WorkerState::Failed {
                            message: e.to_string(),
                        });
                        shared.mark_exited();
                        return Err(e).with_context(|| format!("Failed to spawn thread for worker '{}'", shared.name));
                    }
                }
            }
        }

        Ok(())
    }

    /// Set the stop flag and wake the loop without waiting for it.
    pub fn request_stop(&self) {
        self.shared.request_stop();
    }

    /// Stop the loop and wait until it has exited and cleaned up.
    ///
    /// Idempotent. Called from the worker's own loop it only signals.
    pub fn stop(&self) {
        self.shared.request_stop();

        if self.shared.on_loop_thread() {
            debug!(worker = %self.name(), "Stop requested from the worker's own loop");
            return;
        }

        let handle = self.thread.lock().take();
        match handle {
            Some(handle) => match handle.join() {
                Ok(worker) => *self.worker.lock() = Some(worker),
                Err(_) => error!(worker = %self.name(), "Worker thread panicked outside its loop"),
            },
            None => self.shared.wait_exited(),
        }

        // Never started: cleanup still runs exactly once
        let mut slot = self.worker.lock();
        if let Some(worker) = slot.as_mut() {
            if !self.shared.finished.load(Ordering::SeqCst) {
                let ctx = WorkerContext::detached(self.name());
                self.shared.finish_once(worker.as_mut(), &ctx);
                self.shared.transition(WorkerState::Stopped);
            }
        }
    }
}

fn run_loop(
    mut worker: Box<dyn Worker>,
    ctx: &WorkerContext,
    shared: &Shared,
    settings: &WorkerSettings,
    exits: Option<&Sender<WorkerExit>>,
) -> Box<dyn Worker> {
    *shared.loop_thread.lock() = Some(thread::current().id());
    info!(worker = %shared.name, "Starting loop");

    let mut profiler = TaskProfiler::new(settings.profile_window);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        tick_until_stopped(worker.as_mut(), ctx, shared, settings, &mut profiler)
    }));

    let error = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(source)) => {
            error!(worker = %shared.name, "Error in loop: {:#}", source);
            Some(WorkerTaskError::Failed {
                worker: shared.name.clone(),
                source,
            })
        }
        Err(payload) => Some(WorkerTaskError::Panicked {
            worker: shared.name.clone(),
            message: panic_message(payload.as_ref()),
        }),
    };

    if error.is_some() {
        shared.metrics.record_error();
    }

    shared.finish_once(worker.as_mut(), ctx);

    let final_state = match &error {
        None => WorkerState::Stopped,
        Some(e) => WorkerState::Failed { message: e.to_string() },
    };
    shared.transition(final_state);
    *shared.loop_thread.lock() = None;
    shared.mark_exited();
    info!(worker = %shared.name, "Loop stopped");

    if let Some(exits) = exits {
        let _ = exits.send(WorkerExit {
            worker: shared.name.clone(),
            error,
        });
    }

    worker
}

fn tick_until_stopped(
    worker: &mut dyn Worker,
    ctx: &WorkerContext,
    shared: &Shared,
    settings: &WorkerSettings,
    profiler: &mut TaskProfiler,
) -> Result<()> {
    while !ctx.stop_requested() {
        handle_pending(worker, ctx, shared)?;

        let started = Instant::now();
        worker.task(ctx)?;
        let elapsed = started.elapsed();

        profiler.record(elapsed);
        shared.metrics.record_task(elapsed);
        ctx.publish(names::WORKER_PROFILE, Payload::Profile(profiler.profile()), None);

        if ctx.stop_requested() {
            break;
        }
        shared.queue.wait_timeout(settings.tick_interval);
    }

    // Events that arrived while stopping
    handle_pending(worker, ctx, shared)
}

fn handle_pending(worker: &mut dyn Worker, ctx: &WorkerContext, shared: &Shared) -> Result<()> {
    for event in shared.queue.drain() {
        trace!(worker = %shared.name, event = %event, "Handling event");
        shared.metrics.record_handled();
        worker.handle_event(event, ctx)?;
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
