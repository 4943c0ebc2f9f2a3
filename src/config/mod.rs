pub mod loader;
pub mod types;

pub use loader::DEFAULT_UI_TYPE;
pub use types::{
    Backoff, Config, ControllerConfig, Subscription, SystemConfig, WifiConfig, WifiConnect, WorkerConfig,
    WorkerSettings,
};
