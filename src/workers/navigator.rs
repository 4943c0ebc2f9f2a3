use anyhow::Result;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::config::WorkerConfig;
use crate::core::{names, Detection, Event, Payload, Target, Worker, WorkerContext};
use crate::registry::{BuildContext, WorkerRegistration};

#[derive(Debug, Clone, Deserialize)]
pub struct NavigatorParams {
    pub target_class: String,
    #[serde(default)]
    pub min_confidence: f64,
}

/// Picks the target to follow out of the latest detections.
pub struct Navigator {
    params: NavigatorParams,
    latest: Option<Event>,
}

impl Navigator {
    pub fn new(params: NavigatorParams) -> Self {
        Self { params, latest: None }
    }

    pub fn from_config(config: &WorkerConfig, _ctx: &BuildContext<'_>) -> Result<Box<dyn Worker>> {
        let params: NavigatorParams = config.parameters()?;
        debug!(worker = %config.name, target_class = %params.target_class, "navigator configured");
        Ok(Box::new(Self::new(params)))
    }

    /// Largest detection of the target class, if any.
    pub fn select<'a>(&self, detections: &'a [Detection]) -> Option<&'a Detection> {
        detections
            .iter()
            .filter(|d| d.class_name == self.params.target_class && d.confidence >= self.params.min_confidence)
            .max_by(|a, b| a.area().total_cmp(&b.area()))
    }
}

impl Worker for Navigator {
    fn coalesced_events(&self) -> &[&'static str] {
        &[names::DETECTION]
    }

    fn handle_event(&mut self, event: Event, ctx: &WorkerContext) -> Result<()> {
        if event.is(names::DETECTION) {
            self.latest = Some(event);
        } else {
            trace!(worker = %ctx.name(), event = %event, "ignoring event");
        }
        Ok(())
    }

    fn task(&mut self, ctx: &WorkerContext) -> Result<()> {
        let Some(event) = self.latest.take() else {
            return Ok(());
        };

        let detections = event.data().as_detections().unwrap_or_default();
        let payload = match self.select(detections) {
            Some(best) => {
                trace!(worker = %ctx.name(), x = best.x, y = best.y, confidence = best.confidence, "target selected");
                Payload::Target(Target::from(best))
            }
            None => {
                trace!(worker = %ctx.name(), class = %self.params.target_class, "no target in frame");
                Payload::None
            }
        };

        ctx.publish(names::TARGET, payload, event.frame_number());
        Ok(())
    }
}

inventory::submit! {
    WorkerRegistration::new("navigator", "Selects the target to follow", Navigator::from_config)
}
