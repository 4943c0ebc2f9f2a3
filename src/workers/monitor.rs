use anyhow::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

use crate::config::WorkerConfig;
use crate::core::{names, Detection, Event, Payload, Target, Worker, WorkerContext};
use crate::error::ConfigError;
use crate::registry::{BuildContext, WorkerRegistration};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorParams {
    /// Seconds between status lines; 0 disables them
    pub report_interval: f64,
    /// Request shutdown after this many seconds
    pub stop_after: Option<f64>,
    /// Request shutdown once this many frames were shown
    pub stop_after_frames: Option<u64>,
}

impl Default for MonitorParams {
    fn default() -> Self {
        Self {
            report_interval: 1.0,
            stop_after: None,
            stop_after_frames: None,
        }
    }
}

/// Headless rendering surface.
///
/// Keeps the latest state of the pipeline, logs it periodically and asks the
/// controller to stop the system when its quit condition is met.
pub struct Monitor {
    params: MonitorParams,
    report_every: Option<Duration>,
    started: Option<Instant>,
    last_report: Option<Instant>,
    frames_seen: u64,
    last_frame: Option<(u64, u32, u32)>,
    frame_latency: Duration,
    detections: Vec<Detection>,
    target: Option<Target>,
    profiles: BTreeMap<String, f64>,
    telemetry: Option<serde_json::Value>,
    stop_sent: bool,
}

impl Monitor {
    pub fn new(params: MonitorParams) -> Result<Self, ConfigError> {
        if !params.report_interval.is_finite() || params.report_interval < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "monitor report_interval must be >= 0, got {}",
                params.report_interval
            )));
        }
        let report_every = if params.report_interval > 0.0 {
            let every = Duration::try_from_secs_f64(params.report_interval).map_err(|_| {
                ConfigError::Invalid(format!("monitor report_interval {} is too large", params.report_interval))
            })?;
            Some(every)
        } else {
            None
        };

        Ok(Self {
            params,
            report_every,
            started: None,
            last_report: None,
            frames_seen: 0,
            last_frame: None,
            frame_latency: Duration::ZERO,
            detections: Vec::new(),
            target: None,
            profiles: BTreeMap::new(),
            telemetry: None,
            stop_sent: false,
        })
    }

    pub fn from_config(config: &WorkerConfig, _ctx: &BuildContext<'_>) -> Result<Box<dyn Worker>> {
        let params: MonitorParams = config.parameters()?;
        Ok(Box::new(Self::new(params)?))
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Last reported task time per worker, in seconds
    pub fn profiles(&self) -> &BTreeMap<String, f64> {
        &self.profiles
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    fn quit_requested(&self, now: Instant) -> bool {
        let frames_done = self.params.stop_after_frames.is_some_and(|n| self.frames_seen >= n);
        let time_done = match (self.params.stop_after, self.started) {
            (Some(seconds), Some(started)) => now.duration_since(started).as_secs_f64() >= seconds,
            _ => false,
        };
        frames_done || time_done
    }

    fn status_line(&self) -> String {
        let mut line = match self.last_frame {
            Some((n, _, _)) => format!("frame {} ({:.1}ms)", n, self.frame_latency.as_secs_f64() * 1000.0),
            None => "no frame".to_string(),
        };
        line.push_str(&format!(", {} detections", self.detections.len()));

        if let (Some(target), Some((_, w, h))) = (&self.target, self.last_frame) {
            let (px, py) = denormalize(target.x, target.y, w, h);
            line.push_str(&format!(", target at ({}, {})", px, py));
        }
        for (worker, task_time) in &self.profiles {
            line.push_str(&format!(", {}: {:.1}ms", worker, task_time * 1000.0));
        }
        line
    }
}

/// Map a normalized [-1, 1] point back to pixel coordinates.
pub fn denormalize(x: f64, y: f64, width: u32, height: u32) -> (i32, i32) {
    let px = (x + 1.0) / 2.0 * width as f64;
    let py = (y + 1.0) / 2.0 * height as f64;
    (px.round() as i32, py.round() as i32)
}

impl Worker for Monitor {
    fn coalesced_events(&self) -> &[&'static str] {
        &[names::FRAME]
    }

    fn runs_on_main_thread(&self) -> bool {
        true
    }

    fn handle_event(&mut self, event: Event, ctx: &WorkerContext) -> Result<()> {
        match event.name() {
            names::FRAME => {
                self.frames_seen += 1;
                self.frame_latency = event.age();
                if let Some(frame) = event.data().as_frame() {
                    self.last_frame = Some((event.frame_number().unwrap_or(self.frames_seen), frame.width, frame.height));
                }
            }
            names::DETECTION => {
                self.detections = event.data().as_detections().map(<[_]>::to_vec).unwrap_or_default();
            }
            names::TARGET => self.target = event.data().as_target().cloned(),
            names::WORKER_PROFILE => {
                if let Some(profile) = event.data().as_profile() {
                    self.profiles.insert(event.source().to_string(), profile.task_time);
                }
            }
            names::TELEMETRY => self.telemetry = event.data().as_json().cloned(),
            _ => trace!(worker = %ctx.name(), event = %event, "unknown event"),
        }
        Ok(())
    }

    fn task(&mut self, ctx: &WorkerContext) -> Result<()> {
        let now = Instant::now();
        let started = *self.started.get_or_insert(now);

        if !self.stop_sent && self.quit_requested(now) {
            info!(worker = %ctx.name(), frames = self.frames_seen, "quit requested, stopping system");
            self.stop_sent = true;
            ctx.publish(names::STOP, Payload::None, None);
            ctx.request_stop();
            return Ok(());
        }

        if let Some(every) = self.report_every {
            let due = self.last_report.unwrap_or(started).checked_add(every);
            if due.is_some_and(|due| now >= due) {
                self.last_report = Some(now);
                info!(worker = %ctx.name(), "{}", self.status_line());
                if let Some(telemetry) = &self.telemetry {
                    debug!(worker = %ctx.name(), %telemetry, "telemetry");
                }
            }
        }
        Ok(())
    }

    fn finish(&mut self, ctx: &WorkerContext) {
        info!(worker = %ctx.name(), frames = self.frames_seen, "monitor closed");
    }
}

inventory::submit! {
    WorkerRegistration::new("monitor", "Headless pipeline monitor", Monitor::from_config)
}
