use anyhow::Result;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::WorkerConfig;
use crate::core::{names, Annotation, Frame, Payload, Worker, WorkerContext};
use crate::error::ConfigError;
use crate::registry::{BuildContext, WorkerRegistration};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    /// Frames per second; 0 emits one frame per tick
    pub fps: f64,
    /// End of stream after this many frames
    pub max_frames: Option<u64>,
    /// Objects depicted in every frame, in pixels
    pub objects: Vec<Annotation>,
}

impl Default for VideoParams {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30.0,
            max_frames: None,
            objects: Vec::new(),
        }
    }
}

/// Synthetic frame source.
///
/// Emits a "frame" event per captured frame, numbered from 1, and stops
/// itself once `max_frames` have been produced.
pub struct VideoSource {
    params: VideoParams,
    period: Option<Duration>,
    next_frame: Option<Instant>,
    frame_number: u64,
}

impl VideoSource {
    pub fn new(params: VideoParams) -> Result<Self, ConfigError> {
        if !params.fps.is_finite() || params.fps < 0.0 {
            return Err(ConfigError::Invalid(format!("video fps must be >= 0, got {}", params.fps)));
        }
        let period = if params.fps > 0.0 {
            let period = Duration::try_from_secs_f64(1.0 / params.fps)
                .map_err(|_| ConfigError::Invalid(format!("video fps {} gives an unrepresentable frame period", params.fps)))?;
            Some(period)
        } else {
            None
        };

        Ok(Self {
            params,
            period,
            next_frame: None,
            frame_number: 0,
        })
    }

    pub fn from_config(config: &WorkerConfig, _ctx: &BuildContext<'_>) -> Result<Box<dyn Worker>> {
        let params: VideoParams = config.parameters()?;
        debug!(
            worker = %config.name,
            width = params.width,
            height = params.height,
            fps = params.fps,
            "video source configured"
        );
        Ok(Box::new(Self::new(params)?))
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frame_number
    }

    fn capture(&self) -> Frame {
        Frame::new(self.params.width, self.params.height).with_annotations(self.params.objects.clone())
    }
}

impl Worker for VideoSource {
    fn task(&mut self, ctx: &WorkerContext) -> Result<()> {
        if let Some(max) = self.params.max_frames {
            if self.frame_number >= max {
                info!(worker = %ctx.name(), frames = self.frame_number, "end of video stream");
                ctx.request_stop();
                return Ok(());
            }
        }

        if let Some(period) = self.period {
            let now = Instant::now();
            if self.next_frame.is_some_and(|next| now < next) {
                return Ok(());
            }
            self.next_frame = now.checked_add(period);
            if self.next_frame.is_none() {
                info!(worker = %ctx.name(), "next frame lies past the clock range, ending stream");
                self.params.max_frames = Some(self.frame_number + 1);
            }
        }

        self.frame_number += 1;
        let frame = Arc::new(self.capture());
        ctx.publish(names::FRAME, Payload::Frame(frame), Some(self.frame_number));
        Ok(())
    }

    fn finish(&mut self, ctx: &WorkerContext) {
        debug!(worker = %ctx.name(), frames = self.frame_number, "video source released");
    }
}

inventory::submit! {
    WorkerRegistration::new("video", "Synthetic video frame source", VideoSource::from_config)
}
