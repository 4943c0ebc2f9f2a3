use crate::error::ActuationError;
use crate::hal::{CommandState, DriverConfig, DriverLimits, DroneDriver, Telemetry};
use tracing::debug;

/// Simulated vehicle: accepts every command and only logs it.
pub struct OfflineDriver {
    config: DriverConfig,
}

impl OfflineDriver {
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }
}

impl DroneDriver for OfflineDriver {
    fn driver_id(&self) -> &str {
        "offline"
    }

    fn limits(&self) -> &DriverLimits {
        &self.config.limits
    }

    fn connect(&mut self) -> Result<(), ActuationError> {
        debug!(
            ip = self.config.ip.as_deref().unwrap_or("192.168.10.1"),
            "Would connect to drone"
        );
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), ActuationError> {
        debug!("Would disconnect from drone");
        Ok(())
    }

    fn takeoff(&mut self) -> Result<(), ActuationError> {
        debug!("Would take off");
        Ok(())
    }

    fn land(&mut self) -> Result<(), ActuationError> {
        debug!("Would land");
        Ok(())
    }

    fn streamon(&mut self) -> Result<(), ActuationError> {
        debug!("Would start video stream");
        Ok(())
    }

    fn streamoff(&mut self) -> Result<(), ActuationError> {
        debug!("Would stop video stream");
        Ok(())
    }

    fn current_state(&mut self) -> Result<Telemetry, ActuationError> {
        let mut state = Telemetry::new();
        state.insert("offline".to_string(), serde_json::Value::Bool(true));
        Ok(state)
    }

    fn transmit_rc(&mut self, command: CommandState) -> Result<(), ActuationError> {
        debug!(
            lr = command.lr,
            fb = command.fb,
            ud = command.ud,
            yaw = command.yaw,
            "Would send RC control"
        );
        Ok(())
    }
}
