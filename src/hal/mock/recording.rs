use crate::error::ActuationError;
use crate::hal::{CommandState, DriverLimits, DroneDriver, Telemetry};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A single call made on a [`RecordingDriver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Connect,
    Disconnect,
    Takeoff,
    Land,
    StreamOn,
    StreamOff,
    State,
    Rc(CommandState),
}

impl DriverCall {
    pub fn kind(&self) -> &'static str {
        match self {
            DriverCall::Connect => "connect",
            DriverCall::Disconnect => "disconnect",
            DriverCall::Takeoff => "takeoff",
            DriverCall::Land => "land",
            DriverCall::StreamOn => "streamon",
            DriverCall::StreamOff => "streamoff",
            DriverCall::State => "state",
            DriverCall::Rc(_) => "rc",
        }
    }
}

/// Shared view of everything a [`RecordingDriver`] was asked to do.
///
/// Stays usable after the driver itself has been moved into a worker.
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<DriverCall>>>,
    faults: Arc<Mutex<HashMap<&'static str, ActuationError>>>,
}

impl CallLog {
    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().clone()
    }

    /// RC commands as they reached the vehicle, after limiting
    pub fn rc_commands(&self) -> Vec<CommandState> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                DriverCall::Rc(command) => Some(*command),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.calls.lock().iter().filter(|call| call.kind() == kind).count()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Make every subsequent call of `kind` fail with `error`.
    pub fn fail(&self, kind: &'static str, error: ActuationError) {
        self.faults.lock().insert(kind, error);
    }

    pub fn heal(&self, kind: &str) {
        self.faults.lock().remove(kind);
    }

    fn record(&self, call: DriverCall) -> Result<(), ActuationError> {
        let kind = call.kind();
        self.calls.lock().push(call);
        match self.faults.lock().get(kind) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Driver double that records every call and can inject faults.
pub struct RecordingDriver {
    limits: DriverLimits,
    log: CallLog,
}

impl RecordingDriver {
    pub fn new(limits: DriverLimits) -> Self {
        Self {
            limits,
            log: CallLog::default(),
        }
    }

    /// Driver appending to an existing log, for factories that build drivers later.
    pub fn with_log(limits: DriverLimits, log: CallLog) -> Self {
        Self { limits, log }
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl Default for RecordingDriver {
    fn default() -> Self {
        Self::new(DriverLimits::default())
    }
}

impl DroneDriver for RecordingDriver {
    fn driver_id(&self) -> &str {
        "recording"
    }

    fn limits(&self) -> &DriverLimits {
        &self.limits
    }

    fn connect(&mut self) -> Result<(), ActuationError> {
        self.log.record(DriverCall::Connect)
    }

    fn disconnect(&mut self) -> Result<(), ActuationError> {
        self.log.record(DriverCall::Disconnect)
    }

    fn takeoff(&mut self) -> Result<(), ActuationError> {
        self.log.record(DriverCall::Takeoff)
    }

    fn land(&mut self) -> Result<(), ActuationError> {
        self.log.record(DriverCall::Land)
    }

    fn streamon(&mut self) -> Result<(), ActuationError> {
        self.log.record(DriverCall::StreamOn)
    }

    fn streamoff(&mut self) -> Result<(), ActuationError> {
        self.log.record(DriverCall::StreamOff)
    }

    fn current_state(&mut self) -> Result<Telemetry, ActuationError> {
        self.log.record(DriverCall::State)?;
        let mut state = Telemetry::new();
        state.insert("bat".to_string(), serde_json::json!(87));
        Ok(state)
    }

    fn transmit_rc(&mut self, command: CommandState) -> Result<(), ActuationError> {
        self.log.record(DriverCall::Rc(command))
    }
}
