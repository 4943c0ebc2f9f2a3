pub mod drivers;
pub mod mock;
pub mod registry;
pub mod traits;
pub mod types;

pub use registry::DriverRegistry;
pub use traits::DroneDriver;
pub use types::{CommandState, DriverConfig, DriverLimits, Telemetry, RC_LIMIT};
