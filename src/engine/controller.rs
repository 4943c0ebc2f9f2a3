use anyhow::Result;
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, info_span, trace, warn};

use super::resolver::resolve_order;
use super::runner::{RunMode, WorkerExit, WorkerHandle};
use super::RouteTable;
use crate::config::{Config, WifiConfig, WorkerConfig};
use crate::core::{names, Event, EventSink, Worker};
use crate::error::{ConfigError, InitializationError};
use crate::hal::DriverRegistry;
use crate::net::{NetworkManager, NmcliManager, WifiSession};
use crate::observability::{MetricsCollector, SystemMonitor};
use crate::registry::{BuildContext, WorkerTypeRegistry};

type NetworkFactory = Arc<dyn Fn(&str, &WifiConfig) -> Box<dyn NetworkManager> + Send + Sync>;

/// Assembles a [`Controller`] from a configuration and the registries it needs.
pub struct ControllerBuilder {
    config: Config,
    worker_types: WorkerTypeRegistry,
    drivers: DriverRegistry,
    network: NetworkFactory,
}

impl ControllerBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            worker_types: WorkerTypeRegistry::builtin(),
            drivers: DriverRegistry::with_defaults(),
            network: Arc::new(|_system: &str, wifi: &WifiConfig| {
                Box::new(NmcliManager::new(wifi.connect.interface.clone())) as Box<dyn NetworkManager>
            }),
        }
    }

    pub fn worker_types(mut self, registry: WorkerTypeRegistry) -> Self {
        self.worker_types = registry;
        self
    }

    pub fn register_worker<F>(mut self, type_name: &str, factory: F) -> Self
    where
        F: Fn(&WorkerConfig, &BuildContext<'_>) -> Result<Box<dyn Worker>> + Send + Sync + 'static,
    {
        self.worker_types.register(type_name, factory);
        self
    }

    pub fn drivers(mut self, drivers: DriverRegistry) -> Self {
        self.drivers = drivers;
        self
    }

    /// Backend used to join each system's wireless network
    pub fn network_manager<F>(mut self, factory: F) -> Self
    where
        F: Fn(&str, &WifiConfig) -> Box<dyn NetworkManager> + Send + Sync + 'static,
    {
        self.network = Arc::new(factory);
        self
    }

    pub fn build(self) -> Result<Controller, InitializationError> {
        let config = &self.config;
        info!(
            systems = config.systems.len(),
            offline = config.controller.offline,
            "Initializing controller"
        );

        let declared = config.workers();
        let order = resolve_order(&declared)?;
        for worker in &order {
            self.worker_types.check(worker)?;
        }
        let settings = order
            .iter()
            .map(|worker| worker.settings(&config.controller))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let mut networks = Vec::new();
        if config.controller.offline {
            warn!("Global offline mode enabled, skipping WiFi setup");
        } else {
            for system in &config.systems {
                let Some(wifi) = &system.wifi else {
                    warn!(system = %system.name, "No WiFi config found, skipping WiFi setup");
                    continue;
                };
                let manager = (self.network)(&system.name, wifi);
                match WifiSession::establish(system.name.clone(), manager, wifi) {
                    Ok(session) => networks.push(session),
                    Err(source) => {
                        restore_networks(&mut networks);
                        return Err(InitializationError::Network {
                            system: system.name.clone(),
                            source,
                        });
                    }
                }
            }
        }

        let ctx = BuildContext {
            controller: &config.controller,
            drivers: &self.drivers,
        };
        let (exits_tx, exits_rx) = unbounded();
        let mut handles: Vec<Arc<WorkerHandle>> = Vec::with_capacity(order.len());

        for (worker_config, settings) in order.iter().zip(settings) {
            info!(worker = %worker_config.name, worker_type = %worker_config.worker_type, "Initializing worker");
            let worker = match self.worker_types.create(worker_config, &ctx) {
                Ok(worker) => worker,
                Err(e) => {
                    error!(worker = %worker_config.name, "Failed to initialize worker: {}", e);
                    release(&handles, &mut networks);
                    return Err(e);
                }
            };

            let span = info_span!(
                "worker",
                name = %worker_config.name,
                system = worker_config.system.as_deref().unwrap_or("-")
            );
            let handle = WorkerHandle::new(worker_config.name.clone(), worker, settings)
                .with_span(span)
                .with_exit_notifier(exits_tx.clone());
            handles.push(Arc::new(handle));
        }

        let live: HashSet<&str> = handles.iter().map(|h| h.name()).collect();
        let skipped: HashSet<&str> = config.disabled_ui.iter().map(String::as_str).collect();
        let routes = match RouteTable::build(declared.iter().copied(), &live, &skipped) {
            Ok(routes) => routes,
            Err(e) => {
                release(&handles, &mut networks);
                return Err(e.into());
            }
        };

        let mut main_worker = None;
        for handle in handles.iter().filter(|h| h.runs_on_main_thread()) {
            if main_worker.is_none() {
                main_worker = Some(handle.name().to_string());
            } else {
                warn!(worker = %handle.name(), "Only one worker can own the main thread, running it on its own thread");
            }
        }

        let mut metrics = MetricsCollector::new();
        for handle in &handles {
            metrics.register(handle.metrics());
        }

        let by_name = handles
            .iter()
            .map(|h| (h.name().to_string(), h.clone()))
            .collect();
        let (shutdown_tx, shutdown_rx) = bounded(1);

        info!(workers = handles.len(), routes = routes.len(), "Controller initialized");

        Ok(Controller {
            inner: Arc::new(ControllerInner {
                handles,
                by_name,
                routes,
                main_worker,
                stopping: AtomicBool::new(false),
                started: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                running: AtomicUsize::new(0),
                shutdown_tx,
                shutdown_rx,
                exits_rx,
                networks: Mutex::new(networks),
                metrics,
            }),
        })
    }
}

fn restore_networks(networks: &mut [WifiSession]) {
    for session in networks.iter_mut() {
        if let Err(e) = session.restore() {
            error!(system = %session.system(), "Failed to restore WiFi: {}", e);
        }
    }
}

/// Undo a partially built system: clean up constructed workers, restore networks.
fn release(handles: &[Arc<WorkerHandle>], networks: &mut [WifiSession]) {
    for handle in handles {
        handle.stop();
    }
    restore_networks(networks);
}

struct ControllerInner {
    handles: Vec<Arc<WorkerHandle>>,
    by_name: HashMap<String, Arc<WorkerHandle>>,
    routes: RouteTable,
    main_worker: Option<String>,
    stopping: AtomicBool,
    /// Set by the first start; a stop before it stays pending
    started: AtomicBool,
    shut_down: AtomicBool,
    /// Started loops that have not reported their exit yet
    running: AtomicUsize,
    shutdown_tx: Sender<()>,
    shutdown_rx: Receiver<()>,
    exits_rx: Receiver<WorkerExit>,
    networks: Mutex<Vec<WifiSession>>,
    metrics: MetricsCollector,
}

impl ControllerInner {
    /// Set every stop flag and wake the owner; never joins.
    fn signal_stop(&self, reason: &str) {
        if !self.stopping.swap(true, Ordering::SeqCst) {
            info!(reason, "Stopping all workers");
            let _ = self.shutdown_tx.try_send(());
        }
        for handle in &self.handles {
            handle.request_stop();
        }
    }
}

impl EventSink for ControllerInner {
    fn route(&self, event: Event) {
        trace!(event = %event, "Controller received event");

        if event.is(names::STOP) {
            self.signal_stop(&format!("stop event from {}", event.source()));
            return;
        }

        let Some(targets) = self.routes.targets(event.source(), event.name()) else {
            return;
        };
        for target in targets {
            match self.by_name.get(target) {
                Some(handle) => handle.dispatch(event.clone()),
                None => warn!(target = %target, "Unknown target worker"),
            }
        }
    }
}

/// Composition root and event bus of a running system.
///
/// Owns every worker, routes events between them by the subscriptions in
/// the configuration, and tears everything down on [`shutdown`](Controller::shutdown)
/// or drop.
pub struct Controller {
    inner: Arc<ControllerInner>,
}

impl Controller {
    pub fn builder(config: Config) -> ControllerBuilder {
        ControllerBuilder::new(config)
    }

    pub fn new(config: Config) -> Result<Self, InitializationError> {
        ControllerBuilder::new(config).build()
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, InitializationError> {
        let config = Config::load(path)?;
        Self::new(config)
    }

    /// Route an event to its subscribers, or stop the system on "stop".
    pub fn route(&self, event: Event) {
        self.inner.route(event);
    }

    /// Start every worker on its own thread, then the main-thread worker last.
    ///
    /// Blocks while a main-thread worker runs. A stop requested before the
    /// first start leaves every worker unstarted.
    pub fn start(&self) -> Result<()> {
        let restart = self.inner.started.swap(true, Ordering::SeqCst);
        if !restart && self.inner.stopping.load(Ordering::SeqCst) {
            info!("Stop requested before start, not starting workers");
            return Ok(());
        }
        if restart {
            self.inner.stopping.store(false, Ordering::SeqCst);
            while self.inner.shutdown_rx.try_recv().is_ok() {}
        }
        while self.inner.exits_rx.try_recv().is_ok() {}
        self.inner.running.store(0, Ordering::SeqCst);

        let inner: Arc<dyn EventSink> = self.inner.clone();
        let sink: Weak<dyn EventSink> = Arc::downgrade(&inner);
        drop(inner);

        let main_worker = self.inner.main_worker.as_deref();
        for handle in self.inner.handles.iter().filter(|h| Some(h.name()) != main_worker) {
            debug!(worker = %handle.name(), "Starting worker");
            if let Err(e) = handle.start(sink.clone(), RunMode::Thread) {
                self.stop();
                return Err(e);
            }
            self.inner.running.fetch_add(1, Ordering::SeqCst);
        }

        if let Some(handle) = main_worker.and_then(|name| self.inner.by_name.get(name)) {
            if self.inner.stopping.load(Ordering::SeqCst) {
                return Ok(());
            }
            debug!(worker = %handle.name(), "Starting worker on the main thread");
            self.inner.running.fetch_add(1, Ordering::SeqCst);
            handle.start(sink, RunMode::CurrentThread)?;
        }

        Ok(())
    }

    /// Block until a stop is signalled or every started worker has exited.
    pub fn wait(&self) {
        while self.inner.running.load(Ordering::SeqCst) > 0 {
            select! {
                recv(self.inner.exits_rx) -> exit => {
                    let Ok(exit) = exit else { break };
                    self.inner.running.fetch_sub(1, Ordering::SeqCst);
                    match exit.error {
                        Some(error) => warn!(worker = %exit.worker, "Worker exited with error: {}", error),
                        None => debug!(worker = %exit.worker, "Worker exited"),
                    }
                }
                recv(self.inner.shutdown_rx) -> _ => break,
            }
        }
    }

    /// Signal and join every worker. Safe to call repeatedly.
    pub fn stop(&self) {
        self.inner.signal_stop("stop requested");
        for handle in &self.inner.handles {
            debug!(worker = %handle.name(), "Stopping worker");
            handle.stop();
        }
        debug!("All workers stopped");
    }

    /// Stop everything and release what startup acquired. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop();
        info!("\n{}", self.metrics_report());

        let mut networks = self.inner.networks.lock();
        if !networks.is_empty() {
            info!("Restoring previous WiFi connections");
            restore_networks(&mut networks);
        }
    }

    /// Start, wait for the system to stop, then shut down.
    pub fn run(&self) -> Result<()> {
        let started = self.start();
        if started.is_ok() && self.inner.main_worker.is_none() {
            self.wait();
        }
        self.shutdown();
        started
    }

    /// Handle that can request a stop from another thread (signal handlers).
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn worker(&self, name: &str) -> Option<Arc<WorkerHandle>> {
        self.inner.by_name.get(name).cloned()
    }

    /// Worker names in initialization order
    pub fn worker_names(&self) -> Vec<&str> {
        self.inner.handles.iter().map(|h| h.name()).collect()
    }

    pub fn routes(&self) -> &RouteTable {
        &self.inner.routes
    }

    pub fn main_worker(&self) -> Option<&str> {
        self.inner.main_worker.as_deref()
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.stopping.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.inner.metrics
    }

    pub fn metrics_report(&self) -> String {
        SystemMonitor::new(self.inner.metrics.clone()).generate_report()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Requests an orderly stop of a [`Controller`] without joining its workers.
#[derive(Clone)]
pub struct StopHandle {
    inner: Weak<ControllerInner>,
}

impl StopHandle {
    pub fn stop(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.signal_stop("external stop request");
        }
    }
}
