use anyhow::Result;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::config::WorkerConfig;
use crate::core::{names, Detection, Event, Frame, Payload, Worker, WorkerContext};
use crate::error::ConfigError;
use crate::registry::{BuildContext, WorkerRegistration};

/// Object detection backend.
///
/// Returns detections normalized against the frame size.
pub trait DetectionModel: Send {
    fn name(&self) -> &str;

    /// Run once on a blank frame before the first real inference
    fn warm_up(&mut self) -> Result<()> {
        self.detect(&Frame::new(640, 640)).map(|_| ())
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Reports the objects annotated on synthetic frames.
pub struct AnnotationModel {
    min_confidence: f64,
}

impl AnnotationModel {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }
}

impl DetectionModel for AnnotationModel {
    fn name(&self) -> &str {
        "annotations"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        Ok(frame
            .annotations
            .iter()
            .filter(|a| a.confidence >= self.min_confidence)
            .map(|a| Detection::from_pixels(a.class_name.clone(), a.confidence, a.bbox, frame.width, frame.height))
            .collect())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    pub model: String,
    /// Run detection on every n-th frame received
    pub frame_skip: u64,
    pub confidence_threshold: f64,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            model: "annotations".to_string(),
            frame_skip: 1,
            confidence_threshold: 0.0,
        }
    }
}

/// Runs a detection model over the latest frame.
pub struct Detector {
    model: Box<dyn DetectionModel>,
    frame_skip: u64,
    frame_count: u64,
    latest: Option<(Arc<Frame>, Option<u64>)>,
}

impl Detector {
    pub fn new(model: Box<dyn DetectionModel>, frame_skip: u64) -> Self {
        Self {
            model,
            frame_skip: frame_skip.max(1),
            frame_count: 0,
            latest: None,
        }
    }

    pub fn from_config(config: &WorkerConfig, _ctx: &BuildContext<'_>) -> Result<Box<dyn Worker>> {
        let params: DetectorParams = config.parameters()?;
        let mut model = load_model(&params)?;
        model.warm_up()?;
        debug!(worker = %config.name, model = model.name(), frame_skip = params.frame_skip, "detector ready");
        Ok(Box::new(Self::new(model, params.frame_skip)))
    }
}

fn load_model(params: &DetectorParams) -> Result<Box<dyn DetectionModel>, ConfigError> {
    match params.model.as_str() {
        "annotations" => Ok(Box::new(AnnotationModel::new(params.confidence_threshold))),
        other => Err(ConfigError::UnknownModel(other.to_string())),
    }
}

impl Worker for Detector {
    fn coalesced_events(&self) -> &[&'static str] {
        &[names::FRAME]
    }

    fn handle_event(&mut self, event: Event, ctx: &WorkerContext) -> Result<()> {
        if !event.is(names::FRAME) {
            trace!(worker = %ctx.name(), event = %event, "ignoring event");
            return Ok(());
        }

        self.frame_count += 1;
        if self.frame_count % self.frame_skip != 0 {
            return Ok(());
        }

        let frame_number = event.frame_number();
        match event.into_data() {
            Payload::Frame(frame) => self.latest = Some((frame, frame_number)),
            other => warn!(worker = %ctx.name(), payload = other.kind(), "frame event without frame data"),
        }
        Ok(())
    }

    fn task(&mut self, ctx: &WorkerContext) -> Result<()> {
        let Some((frame, frame_number)) = self.latest.take() else {
            return Ok(());
        };

        let detections = self.model.detect(&frame)?;
        trace!(worker = %ctx.name(), count = detections.len(), frame = ?frame_number, "detections");
        ctx.publish(names::DETECTION, Payload::Detections(detections), frame_number);
        Ok(())
    }
}

inventory::submit! {
    WorkerRegistration::new("detector", "Object detector over the latest frame", Detector::from_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Annotation;

    fn person_frame() -> Arc<Frame> {
        Arc::new(Frame::new(640, 480).with_annotations(vec![Annotation {
            class_name: "person".to_string(),
            confidence: 0.8,
            bbox: [320.0, 0.0, 640.0, 480.0],
        }]))
    }

    #[test]
    fn test_annotation_model_normalizes() {
        let mut model = AnnotationModel::new(0.5);
        let detections = model.detect(&person_frame()).unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox, [0.0, -1.0, 1.0, 1.0]);
        assert!((detections[0].x - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_threshold_filters() {
        let mut model = AnnotationModel::new(0.9);
        assert!(model.detect(&person_frame()).unwrap().is_empty());
    }

    #[test]
    fn test_frame_skip() {
        let mut detector = Detector::new(Box::new(AnnotationModel::new(0.0)), 2);
        let ctx = WorkerContext::detached("detector");

        let frame = |n| Event::new("video", names::FRAME, Payload::Frame(person_frame())).with_frame_number(n);
        detector.handle_event(frame(1), &ctx).unwrap();
        assert!(detector.latest.is_none());
        detector.handle_event(frame(2), &ctx).unwrap();
        assert_eq!(detector.latest.as_ref().and_then(|(_, n)| *n), Some(2));

        detector.task(&ctx).unwrap();
        assert!(detector.latest.is_none());
    }

    #[test]
    fn test_unknown_model() {
        let params = DetectorParams {
            model: "yolov8n".to_string(),
            ..Default::default()
        };
        assert!(matches!(load_model(&params), Err(ConfigError::UnknownModel(_))));
    }
}
