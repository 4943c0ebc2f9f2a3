use thiserror::Error;

/// Errors raised while loading and validating the configuration document.
///
/// All of these are fatal: they surface before any worker is started.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    NotFound { path: String },

    #[error("Failed to read config file {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config document: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid parameters for worker '{worker}'")]
    InvalidParameters {
        worker: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("All workers must have a non-empty 'name' field (found in section '{section}')")]
    MissingName { section: String },

    #[error("Worker names must be unique. Found duplicates: {0:?}")]
    DuplicateNames(Vec<String>),

    #[error("Unknown worker type '{type_name}' for worker '{worker}'. Available: {available}")]
    UnknownWorkerType {
        worker: String,
        type_name: String,
        available: String,
    },

    #[error("Could not initialize all workers. Check for missing or circular dependencies:\n{}", .details.join("\n"))]
    UnresolvedDependencies { details: Vec<String> },

    #[error("Unknown source worker '{source_worker}' in event spec for '{worker}'")]
    UnknownEventSource { worker: String, source_worker: String },

    #[error("Unknown driver '{0}'")]
    UnknownDriver(String),

    #[error("Unknown detection model '{0}'")]
    UnknownModel(String),
}

/// Errors raised while building the running system.
///
/// Wraps configuration failures as well as failures of individual worker
/// constructors or of network setup.
#[derive(Error, Debug)]
pub enum InitializationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed during initialization of worker '{worker}'")]
    WorkerConstruction {
        worker: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("WiFi initialization failed for {system}")]
    Network {
        system: String,
        #[source]
        source: NetworkError,
    },
}

/// Faults raised by a driver while executing an actuation command.
///
/// These are contained at the drone's command dispatch point.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActuationError {
    #[error("Unknown drone command: {0}")]
    UnknownCommand(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Fault that ended a worker loop.
#[derive(Error, Debug)]
pub enum WorkerTaskError {
    #[error("Worker '{worker}' failed")]
    Failed {
        worker: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Worker '{worker}' panicked: {message}")]
    Panicked { worker: String, message: String },
}

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Network command `{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("No valid WiFi device found")]
    NoDevice,

    #[error("Failed to connect to WiFi network {ssid} after {attempts} attempts")]
    Exhausted { ssid: String, attempts: usize },

    #[error("Failed to run network command")]
    Io(#[from] std::io::Error),
}
