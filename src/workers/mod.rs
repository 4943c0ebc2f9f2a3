//! Built-in worker types.
//!
//! Each type registers itself with the worker type registry under the
//! identifier used in configuration documents.

pub mod detector;
pub mod drone;
pub mod monitor;
pub mod navigator;
pub mod video;

pub use detector::{AnnotationModel, DetectionModel, Detector, DetectorParams};
pub use drone::{Drone, DroneCommand, DroneParams};
pub use monitor::{Monitor, MonitorParams};
pub use navigator::{Navigator, NavigatorParams};
pub use video::{VideoParams, VideoSource};
