use std::fmt;
use std::str::FromStr;

use crate::error::ActuationError;
use crate::hal::{CommandState, DroneDriver};

/// Actuation commands understood by the drone worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DroneCommand {
    Connect,
    Disconnect,
    Takeoff,
    Land,
    StreamOn,
    StreamOff,
    Rc(CommandState),
}

impl DroneCommand {
    pub fn name(&self) -> &'static str {
        match self {
            DroneCommand::Connect => "connect",
            DroneCommand::Disconnect => "disconnect",
            DroneCommand::Takeoff => "takeoff",
            DroneCommand::Land => "land",
            DroneCommand::StreamOn => "streamon",
            DroneCommand::StreamOff => "streamoff",
            DroneCommand::Rc(_) => "send_rc_control",
        }
    }

    /// Execute the command on `driver`.
    pub fn apply(self, driver: &mut dyn DroneDriver) -> Result<(), ActuationError> {
        match self {
            DroneCommand::Connect => driver.connect(),
            DroneCommand::Disconnect => driver.disconnect(),
            DroneCommand::Takeoff => driver.takeoff(),
            DroneCommand::Land => driver.land(),
            DroneCommand::StreamOn => driver.streamon(),
            DroneCommand::StreamOff => driver.streamoff(),
            DroneCommand::Rc(command) => driver.send_rc_control(command),
        }
    }
}

impl fmt::Display for DroneCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DroneCommand::Rc(c) => write!(f, "send_rc_control({}, {}, {}, {})", c.lr, c.fb, c.ud, c.yaw),
            other => f.write_str(other.name()),
        }
    }
}

/// Parses the textual command vocabulary, `send_rc_control lr fb ud yaw` included.
impl FromStr for DroneCommand {
    type Err = ActuationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let name = parts.next().unwrap_or_default();

        let command = match name {
            "connect" => DroneCommand::Connect,
            "disconnect" | "end" => DroneCommand::Disconnect,
            "takeoff" => DroneCommand::Takeoff,
            "land" => DroneCommand::Land,
            "streamon" => DroneCommand::StreamOn,
            "streamoff" => DroneCommand::StreamOff,
            "send_rc_control" => {
                let axes = parts
                    .by_ref()
                    .map(|v| v.parse::<i32>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| ActuationError::InvalidArgument(format!("{}: {}", s, e)))?;
                return match axes.as_slice() {
                    [lr, fb, ud, yaw] => Ok(DroneCommand::Rc(CommandState::new(*lr, *fb, *ud, *yaw))),
                    _ => Err(ActuationError::InvalidArgument(format!(
                        "send_rc_control takes 4 values, got {}",
                        axes.len()
                    ))),
                };
            }
            other => return Err(ActuationError::UnknownCommand(other.to_string())),
        };

        match parts.next() {
            None => Ok(command),
            Some(extra) => Err(ActuationError::InvalidArgument(format!("{} takes no argument, got '{}'", name, extra))),
        }
    }
}
