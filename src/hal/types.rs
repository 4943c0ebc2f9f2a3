use serde::{Deserialize, Serialize};

/// Key/value telemetry reported by a driver
pub type Telemetry = serde_json::Map<String, serde_json::Value>;

/// Normalized RC actuation vector, each axis in [-100, 100].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CommandState {
    pub lr: i32,
    pub fb: i32,
    pub ud: i32,
    pub yaw: i32,
}

impl CommandState {
    pub const ZERO: CommandState = CommandState {
        lr: 0,
        fb: 0,
        ud: 0,
        yaw: 0,
    };

    pub fn new(lr: i32, fb: i32, ud: i32, yaw: i32) -> Self {
        Self { lr, fb, ud, yaw }
    }

    pub fn with_yaw(mut self, yaw: i32) -> Self {
        self.yaw = yaw;
        self
    }

    /// Clamp every axis into [-100, 100]
    pub fn saturated(self) -> Self {
        let c = |v: i32| v.clamp(-RC_LIMIT, RC_LIMIT);
        Self::new(c(self.lr), c(self.fb), c(self.ud), c(self.yaw))
    }
}

pub const RC_LIMIT: i32 = 100;

/// Physical limits and safety switches of a vehicle.
///
/// Velocities are cm/s (linear, vertical) and deg/s (angular); the field of
/// view is in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverLimits {
    pub max_linear_velocity: f64,
    pub max_angular_velocity: f64,
    pub max_vertical_velocity: f64,
    pub field_of_view: f64,
    pub max_yaw_to_command: i32,
    pub disable_yaw: bool,
    pub disable_xy: bool,
    pub disable_z: bool,
}

impl Default for DriverLimits {
    fn default() -> Self {
        Self {
            max_linear_velocity: 50.0,
            max_angular_velocity: 50.0,
            max_vertical_velocity: 30.0,
            field_of_view: 82.6,
            max_yaw_to_command: RC_LIMIT,
            disable_yaw: false,
            disable_xy: false,
            disable_z: false,
        }
    }
}

impl DriverLimits {
    /// Apply the safety switches and the yaw ceiling to a command.
    pub fn apply(&self, command: CommandState) -> CommandState {
        let mut safe = command.saturated();

        if self.disable_xy {
            safe.lr = 0;
            safe.fb = 0;
        }
        if self.disable_z {
            safe.ud = 0;
        }
        if self.disable_yaw {
            safe.yaw = 0;
        } else {
            let ceiling = self.max_yaw_to_command.abs().min(RC_LIMIT);
            safe.yaw = safe.yaw.clamp(-ceiling, ceiling);
        }

        safe
    }
}

/// Driver section of a drone worker's parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(rename = "type", default = "default_driver")]
    pub kind: String,
    /// Network interface the vehicle is reachable on
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(flatten)]
    pub limits: DriverLimits,
}

fn default_driver() -> String {
    "offline".to_string()
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            kind: default_driver(),
            interface: None,
            ip: None,
            limits: DriverLimits::default(),
        }
    }
}
