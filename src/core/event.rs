use std::fmt;
use std::time::{Duration, Instant};

use super::Payload;

/// Well-known event names exchanged between the built-in workers.
pub mod names {
    pub const FRAME: &str = "frame";
    pub const DETECTION: &str = "detection";
    pub const TARGET: &str = "target";
    pub const WORKER_PROFILE: &str = "worker_profile";
    pub const TELEMETRY: &str = "telemetry";
    /// Textual actuation command for the drone, e.g. "land"
    pub const COMMAND: &str = "command";
    /// Routed specially by the controller: shuts the whole system down.
    pub const STOP: &str = "stop";
}

/// Immutable message exchanged between workers.
///
/// `frame_number` ties an event back to the video frame that caused it, so
/// downstream consumers can account for end-to-end latency.
#[derive(Debug, Clone)]
pub struct Event {
    source: String,
    name: String,
    data: Payload,
    timestamp: Instant,
    frame_number: Option<u64>,
}

impl Event {
    pub fn new(source: impl Into<String>, name: impl Into<String>, data: Payload) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
            data,
            timestamp: Instant::now(),
            frame_number: None,
        }
    }

    /// Event without payload
    pub fn empty(source: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(source, name, Payload::None)
    }

    pub fn with_frame_number(mut self, frame_number: u64) -> Self {
        self.frame_number = Some(frame_number);
        self
    }

    pub fn with_optional_frame_number(mut self, frame_number: Option<u64>) -> Self {
        self.frame_number = frame_number;
        self
    }

    /// Name of the worker that emitted the event
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &Payload {
        &self.data
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn frame_number(&self) -> Option<u64> {
        self.frame_number
    }

    /// Time elapsed since the event was created
    pub fn age(&self) -> Duration {
        self.timestamp.elapsed()
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    pub fn into_data(self) -> Payload {
        self.data
    }
}

// Timestamps differ between otherwise identical events, so they are left out.
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.name == other.name
            && self.data == other.data
            && self.frame_number == other.frame_number
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.name)?;
        if let Some(n) = self.frame_number {
            write!(f, " #{}", n)?;
        }
        if !self.data.is_none() {
            write!(f, " ({})", self.data.kind())?;
        }
        Ok(())
    }
}
