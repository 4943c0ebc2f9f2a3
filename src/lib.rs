pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod hal;
pub mod logging;
pub mod net;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod workers;

pub use config::Config;
pub use engine::{Controller, StopHandle};
pub use error::{ConfigError, InitializationError};
