pub mod controller;
pub mod resolver;
pub mod routes;
pub mod runner;
pub mod state;

pub use controller::{Controller, ControllerBuilder, StopHandle};
pub use resolver::resolve_order;
pub use routes::RouteTable;
pub use runner::{RunMode, WorkerExit, WorkerHandle};
pub use state::WorkerState;
