pub mod recording;

pub use recording::{CallLog, DriverCall, RecordingDriver};
