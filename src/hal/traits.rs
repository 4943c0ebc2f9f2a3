use super::types::{CommandState, DriverLimits, Telemetry};
use crate::error::ActuationError;

/// Actuation contract every vehicle backend satisfies.
///
/// Backends implement the primitive [`transmit_rc`](DroneDriver::transmit_rc);
/// callers go through [`send_rc_control`](DroneDriver::send_rc_control), which
/// applies the safety limits first.
pub trait DroneDriver: Send {
    /// Unique driver identifier (e.g., "offline")
    fn driver_id(&self) -> &str;

    fn limits(&self) -> &DriverLimits;

    fn connect(&mut self) -> Result<(), ActuationError>;

    fn disconnect(&mut self) -> Result<(), ActuationError>;

    fn takeoff(&mut self) -> Result<(), ActuationError>;

    fn land(&mut self) -> Result<(), ActuationError>;

    fn streamon(&mut self) -> Result<(), ActuationError>;

    fn streamoff(&mut self) -> Result<(), ActuationError>;

    fn current_state(&mut self) -> Result<Telemetry, ActuationError>;

    /// Send an already limited command to the vehicle
    fn transmit_rc(&mut self, command: CommandState) -> Result<(), ActuationError>;

    fn send_rc_control(&mut self, command: CommandState) -> Result<(), ActuationError> {
        let safe = self.limits().apply(command);
        self.transmit_rc(safe)
    }

    /// cm/s
    fn max_linear_velocity(&self) -> f64 {
        self.limits().max_linear_velocity
    }

    /// deg/s
    fn max_angular_velocity(&self) -> f64 {
        self.limits().max_angular_velocity
    }

    /// cm/s
    fn max_vertical_velocity(&self) -> f64 {
        self.limits().max_vertical_velocity
    }

    /// Horizontal camera field of view in degrees
    fn field_of_view(&self) -> f64 {
        self.limits().field_of_view
    }
}
