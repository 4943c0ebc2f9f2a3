use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Data carried by an [`Event`](super::Event).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    #[default]
    None,
    Frame(Arc<Frame>),
    Detections(Vec<Detection>),
    Target(Target),
    Profile(WorkerProfile),
    Json(serde_json::Value),
}

impl Payload {
    pub fn is_none(&self) -> bool {
        matches!(self, Payload::None)
    }

    /// Short name of the variant, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::None => "none",
            Payload::Frame(_) => "frame",
            Payload::Detections(_) => "detections",
            Payload::Target(_) => "target",
            Payload::Profile(_) => "profile",
            Payload::Json(_) => "json",
        }
    }

    pub fn as_frame(&self) -> Option<&Frame> {
        match self {
            Payload::Frame(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn as_detections(&self) -> Option<&[Detection]> {
        match self {
            Payload::Detections(detections) => Some(detections),
            _ => None,
        }
    }

    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Payload::Target(target) => Some(target),
            _ => None,
        }
    }

    pub fn as_profile(&self) -> Option<&WorkerProfile> {
        match self {
            Payload::Profile(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// Object annotated on a frame, in pixel coordinates.
///
/// Real frames carry pixels; synthetic frames carry the objects they depict so
/// that a detection model can report them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub class_name: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// [x1, y1, x2, y2] in pixels
    pub bbox: [f64; 4],
}

fn default_confidence() -> f64 {
    1.0
}

/// A captured video frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub annotations: Vec<Annotation>,
}

impl Frame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            annotations: Vec::new(),
        }
    }

    pub fn with_annotations(mut self, annotations: Vec<Annotation>) -> Self {
        self.annotations = annotations;
        self
    }
}

/// Detected object with coordinates normalized to [-1, 1].
///
/// Positive x is right of frame center, positive y is below it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f64,
    /// [x1, y1, x2, y2] normalized
    pub bbox: [f64; 4],
    pub x: f64,
    pub y: f64,
}

impl Detection {
    /// Normalize a pixel-space box against the frame size.
    pub fn from_pixels(
        class_name: impl Into<String>,
        confidence: f64,
        bbox: [f64; 4],
        width: u32,
        height: u32,
    ) -> Self {
        let nx = |v: f64| normalize(v, width);
        let ny = |v: f64| normalize(v, height);
        let bbox = [nx(bbox[0]), ny(bbox[1]), nx(bbox[2]), ny(bbox[3])];

        Self {
            class_name: class_name.into(),
            confidence,
            x: (bbox[0] + bbox[2]) / 2.0,
            y: (bbox[1] + bbox[3]) / 2.0,
            bbox,
        }
    }

    pub fn area(&self) -> f64 {
        (self.bbox[2] - self.bbox[0]) * (self.bbox[3] - self.bbox[1])
    }
}

fn normalize(value: f64, extent: u32) -> f64 {
    if extent == 0 {
        return 0.0;
    }
    (2.0 * value / extent as f64 - 1.0).clamp(-1.0, 1.0)
}

/// Target selected by the navigator, normalized like [`Detection`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
    pub bbox: [f64; 4],
}

impl From<&Detection> for Target {
    fn from(detection: &Detection) -> Self {
        Self {
            x: detection.x,
            y: detection.y,
            confidence: detection.confidence,
            bbox: detection.bbox,
        }
    }
}

/// Profiling sample emitted by every worker after each task tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkerProfile {
    /// Maximum task time over the current profiling window, in seconds
    pub task_time: f64,
    /// Duration of the last task tick, in seconds
    pub last_task_time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_normalization() {
        // Right half of a 640x480 frame
        let det = Detection::from_pixels("person", 0.9, [320.0, 0.0, 640.0, 480.0], 640, 480);
        assert_eq!(det.bbox, [0.0, -1.0, 1.0, 1.0]);
        assert!((det.x - 0.5).abs() < 1e-9);
        assert!(det.y.abs() < 1e-9);
        assert!((det.area() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_sized_frame_does_not_divide_by_zero() {
        let det = Detection::from_pixels("person", 0.9, [1.0, 1.0, 2.0, 2.0], 0, 0);
        assert_eq!(det.bbox, [0.0; 4]);
    }

    #[test]
    fn test_payload_accessors() {
        let payload = Payload::Target(Target {
            x: 0.1,
            y: 0.2,
            confidence: 0.5,
            bbox: [0.0, 0.0, 0.2, 0.4],
        });
        assert_eq!(payload.kind(), "target");
        assert!(payload.as_target().is_some());
        assert!(payload.as_frame().is_none());
        assert!(Payload::default().is_none());
    }
}
