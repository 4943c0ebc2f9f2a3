//! Drone control state machine.
//!
//! Turns intermittent "target" observations into rate-limited, deduplicated
//! RC commands for the vehicle owned by this worker.

pub mod command;
pub mod control;

use anyhow::Result;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::config::WorkerConfig;
use crate::core::{names, Event, Payload, Target, Worker, WorkerContext};
use crate::error::ConfigError;
use crate::hal::{CommandState, DriverConfig, DriverLimits, DroneDriver, RC_LIMIT};
use crate::registry::{BuildContext, WorkerRegistration};

pub use command::DroneCommand;
pub use control::{FollowSettings, Kinematics};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DroneParams {
    pub driver: DriverConfig,
    /// Take off without waiting for a target
    pub auto_takeoff: bool,
    /// Seconds after which the last target is considered lost
    pub target_timeout: f64,
    /// Deadband on every axis, in normalized units
    pub movement_threshold: f64,
    /// Minimum seconds between the starts of two yaw bursts
    pub min_yaw_delay: f64,
    pub percent_angle_to_command: f64,
    /// Desired target box width as a fraction of the frame width
    pub target_width: f64,
    /// Point of the box height held at frame center, 0 = top edge
    pub target_height_anchor: f64,
    /// Seconds spent sweeping toward a lost target
    pub search_duration: f64,
    pub stream_video: bool,
    /// Seconds between telemetry events, 0 disables them
    pub telemetry_interval: f64,
}

impl Default for DroneParams {
    fn default() -> Self {
        Self {
            driver: DriverConfig::default(),
            auto_takeoff: false,
            target_timeout: 1.0,
            movement_threshold: 0.1,
            min_yaw_delay: 0.5,
            percent_angle_to_command: 100.0,
            target_width: 0.3,
            target_height_anchor: 0.2,
            search_duration: 3.0,
            stream_video: false,
            telemetry_interval: 0.0,
        }
    }
}

impl DroneParams {
    /// Check the tuning values and convert the time settings.
    fn timing(&self) -> Result<Timing, ConfigError> {
        let non_negative = [
            ("movement_threshold", self.movement_threshold),
            ("percent_angle_to_command", self.percent_angle_to_command),
        ];
        for (key, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!("drone {} must be >= 0, got {}", key, value)));
            }
        }

        let telemetry_interval = seconds("telemetry_interval", self.telemetry_interval)?;
        Ok(Timing {
            target_timeout: seconds("target_timeout", self.target_timeout)?,
            min_yaw_delay: seconds("min_yaw_delay", self.min_yaw_delay)?,
            search_duration: seconds("search_duration", self.search_duration)?,
            telemetry_interval: (!telemetry_interval.is_zero()).then_some(telemetry_interval),
        })
    }

    fn follow_settings(&self) -> FollowSettings {
        FollowSettings {
            movement_threshold: self.movement_threshold,
            target_width: self.target_width,
            target_height_anchor: self.target_height_anchor,
            percent_angle_to_command: self.percent_angle_to_command,
        }
    }
}

fn seconds(key: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| ConfigError::Invalid(format!("drone {} must be a non-negative number of seconds, got {}", key, value)))
}

/// Velocities and field of view must be positive for commands to scale.
fn check_limits(limits: &DriverLimits) -> Result<(), ConfigError> {
    let positive = [
        ("max_linear_velocity", limits.max_linear_velocity),
        ("max_angular_velocity", limits.max_angular_velocity),
        ("max_vertical_velocity", limits.max_vertical_velocity),
        ("field_of_view", limits.field_of_view),
    ];
    for (key, value) in positive {
        if !value.is_finite() || value <= 0.0 {
            return Err(ConfigError::Invalid(format!("driver {} must be > 0, got {}", key, value)));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct Timing {
    target_timeout: Duration,
    min_yaw_delay: Duration,
    search_duration: Duration,
    telemetry_interval: Option<Duration>,
}

/// Target being followed, as last received.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedTarget {
    pub target: Target,
    pub frame_number: Option<u64>,
    pub received_at: Instant,
    pub processed: bool,
}

/// Horizontal side of the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    fn yaw_sign(self) -> i32 {
        match self {
            Side::Left => -1,
            Side::Right => 1,
        }
    }
}

// A deadline of `None` lies beyond what the clock can represent.
#[derive(Debug, Clone, Copy)]
struct YawBurst {
    deadline: Option<Instant>,
}

#[derive(Debug, Clone, Copy)]
struct Search {
    side: Side,
    until: Option<Instant>,
}

/// Worker steering a vehicle to keep the target framed.
pub struct Drone {
    params: DroneParams,
    settings: FollowSettings,
    timing: Timing,
    driver: Box<dyn DroneDriver>,
    pending: Option<Event>,
    pending_commands: Vec<DroneCommand>,
    current: Option<TrackedTarget>,
    last_side: Option<Side>,
    flying: bool,
    ready: bool,
    streaming: bool,
    command: CommandState,
    last_sent: Option<CommandState>,
    yaw_burst: Option<YawBurst>,
    last_yaw_start: Option<Instant>,
    search: Option<Search>,
    next_telemetry: Option<Instant>,
}

impl Drone {
    /// Connect to the vehicle behind `driver` and start the video stream if asked.
    pub fn new(params: DroneParams, mut driver: Box<dyn DroneDriver>) -> Result<Self> {
        let timing = params.timing()?;
        check_limits(driver.limits())?;
        driver.connect()?;
        info!(driver = driver.driver_id(), ip = ?params.driver.ip, "connected to drone");

        let mut drone = Self {
            settings: params.follow_settings(),
            timing,
            params,
            driver,
            pending: None,
            pending_commands: Vec::new(),
            current: None,
            last_side: None,
            flying: false,
            ready: false,
            streaming: false,
            command: CommandState::ZERO,
            last_sent: None,
            yaw_burst: None,
            last_yaw_start: None,
            search: None,
            next_telemetry: None,
        };

        if drone.params.stream_video {
            drone.streaming = drone.dispatch(DroneCommand::StreamOn);
        }
        Ok(drone)
    }

    pub fn from_config(config: &WorkerConfig, ctx: &BuildContext<'_>) -> Result<Box<dyn Worker>> {
        let params: DroneParams = config.parameters()?;

        let mut driver_config = params.driver.clone();
        if ctx.controller.offline && driver_config.kind != "offline" {
            warn!(worker = %config.name, driver = %driver_config.kind, "offline mode, using the offline driver");
            driver_config.kind = "offline".to_string();
        }
        let driver = ctx.drivers.create(&driver_config)?;

        debug!(
            worker = %config.name,
            driver = driver.driver_id(),
            auto_takeoff = params.auto_takeoff,
            target_timeout = params.target_timeout,
            movement_threshold = params.movement_threshold,
            "drone configured"
        );
        Ok(Box::new(Self::new(params, driver)?))
    }

    pub fn is_flying(&self) -> bool {
        self.flying
    }

    /// True strictly between a successful takeoff and the start of a landing
    pub fn ready_to_process_targets(&self) -> bool {
        self.ready
    }

    pub fn executing_yaw(&self) -> bool {
        self.yaw_burst.is_some()
    }

    pub fn searching(&self) -> bool {
        self.search.is_some()
    }

    pub fn current_target(&self) -> Option<&TrackedTarget> {
        self.current.as_ref()
    }

    /// Command computed by the last tick
    pub fn command(&self) -> CommandState {
        self.command
    }

    pub fn last_sent(&self) -> Option<CommandState> {
        self.last_sent
    }

    /// Run a command on the driver, containing any fault.
    ///
    /// Returns whether the driver accepted the command.
    pub fn dispatch(&mut self, command: DroneCommand) -> bool {
        if command == DroneCommand::Land {
            self.ready = false;
        }

        trace!(%command, "dispatching");
        match command.apply(self.driver.as_mut()) {
            Ok(()) => {
                match command {
                    DroneCommand::Takeoff => {
                        self.flying = true;
                        self.ready = true;
                    }
                    DroneCommand::Land => self.flying = false,
                    DroneCommand::Rc(state) => self.last_sent = Some(state),
                    _ => {}
                }
                true
            }
            Err(err) => {
                error!(%command, error = %err, "drone command failed");
                false
            }
        }
    }

    /// One iteration of the control loop at time `now`.
    pub fn step(&mut self, now: Instant, ctx: &WorkerContext) {
        for command in std::mem::take(&mut self.pending_commands) {
            self.dispatch(command);
        }

        let new_target = self.pending.take().and_then(|event| {
            let frame_number = event.frame_number();
            event.data().as_target().cloned().map(|target| (target, frame_number))
        });

        if let Some((target, frame_number)) = new_target {
            self.accept_target(target, frame_number, now);
            if !self.flying && !self.params.auto_takeoff {
                info!("target detected, taking off");
                self.dispatch(DroneCommand::Takeoff);
            }
        } else if self.params.auto_takeoff && !self.flying {
            info!("auto takeoff");
            self.dispatch(DroneCommand::Takeoff);
            self.command = CommandState::ZERO;
        }

        self.expire_target(now);

        if self.current.is_some() {
            if self.ready {
                self.follow(now);
            }
        } else {
            self.command = self.search_command(now);
        }

        if self.yaw_burst.is_some_and(|burst| burst.deadline.is_some_and(|deadline| now >= deadline)) {
            debug!("yaw burst complete");
            self.yaw_burst = None;
            self.command.yaw = 0;
        }

        if self.last_sent != Some(self.command) {
            self.dispatch(DroneCommand::Rc(self.command));
        }

        self.publish_telemetry(now, ctx);
    }

    fn accept_target(&mut self, target: Target, frame_number: Option<u64>, now: Instant) {
        if self.yaw_burst.take().is_some() {
            debug!("new target, resetting yaw burst");
            self.command.yaw = 0;
        }
        trace!(x = target.x, y = target.y, frame = ?frame_number, "new target");

        self.last_side = if target.x >= self.settings.movement_threshold {
            Some(Side::Right)
        } else if target.x <= -self.settings.movement_threshold {
            Some(Side::Left)
        } else {
            None
        };
        self.search = None;
        self.current = Some(TrackedTarget {
            target,
            frame_number,
            received_at: now,
            processed: false,
        });
    }

    fn expire_target(&mut self, now: Instant) {
        let Some(current) = &self.current else {
            return;
        };
        if now.duration_since(current.received_at) < self.timing.target_timeout {
            return;
        }

        debug!(after = ?now.duration_since(current.received_at), "target lost");
        self.current = None;
        self.yaw_burst = None;
        self.search = self.last_side.take().map(|side| Search {
            side,
            until: now.checked_add(self.timing.search_duration),
        });
    }

    fn follow(&mut self, now: Instant) {
        let min_delay = self.timing.min_yaw_delay;
        let yaw_allowed = self
            .last_yaw_start
            .map_or(true, |start| now.duration_since(start) >= min_delay);

        let Some(current) = self.current.as_mut() else {
            return;
        };
        if current.processed {
            return;
        }

        let kinematics = Kinematics::of(self.driver.as_ref());
        let output = control::follow(&current.target, &self.settings, &kinematics, yaw_allowed);
        current.processed = true;
        if let Some(frame) = current.frame_number {
            trace!(frame, x = current.target.x, y = current.target.y, "processing target");
        }

        self.command = output.command;
        if let Some(duration) = output.yaw_burst {
            debug!(?duration, yaw = output.command.yaw, "starting yaw burst");
            self.yaw_burst = Some(YawBurst {
                deadline: now.checked_add(duration),
            });
            self.last_yaw_start = Some(now);
        }
    }

    fn search_command(&mut self, now: Instant) -> CommandState {
        match self.search {
            Some(search) if self.ready && search.until.map_or(true, |until| now < until) => {
                CommandState::ZERO.with_yaw(search.side.yaw_sign() * RC_LIMIT / 2)
            }
            Some(_) => {
                debug!("search window elapsed");
                self.search = None;
                CommandState::ZERO
            }
            None => CommandState::ZERO,
        }
    }

    fn publish_telemetry(&mut self, now: Instant, ctx: &WorkerContext) {
        let Some(interval) = self.timing.telemetry_interval else {
            return;
        };
        if self.next_telemetry.is_some_and(|next| now < next) {
            return;
        }
        match now.checked_add(interval) {
            Some(next) => self.next_telemetry = Some(next),
            // Next report lies past the clock's range
            None => self.timing.telemetry_interval = None,
        }

        match self.driver.current_state() {
            Ok(state) => ctx.publish(names::TELEMETRY, Payload::Json(serde_json::Value::Object(state)), None),
            Err(err) => warn!(error = %err, "failed to read drone state"),
        }
    }

    fn queue_command(&mut self, event: &Event) {
        let text = match event.data().as_json() {
            Some(serde_json::Value::String(text)) => Some(text.as_str()),
            Some(value) => value.get("command").and_then(serde_json::Value::as_str),
            None => None,
        };

        match text.map(str::parse::<DroneCommand>) {
            Some(Ok(command)) => self.pending_commands.push(command),
            Some(Err(err)) => error!(source = event.source(), error = %err, "rejected drone command"),
            None => warn!(source = event.source(), "command event without command"),
        }
    }
}

impl Worker for Drone {
    fn coalesced_events(&self) -> &[&'static str] {
        &[names::TARGET]
    }

    fn handle_event(&mut self, event: Event, ctx: &WorkerContext) -> Result<()> {
        if event.is(names::TARGET) {
            // An empty target does not refresh the timeout.
            if event.data().is_none() {
                trace!(worker = %ctx.name(), frame = ?event.frame_number(), "empty target");
            } else {
                self.pending = Some(event);
            }
        } else if event.is(names::COMMAND) {
            self.queue_command(&event);
        } else {
            trace!(worker = %ctx.name(), event = %event, "ignoring event");
        }
        Ok(())
    }

    fn task(&mut self, ctx: &WorkerContext) -> Result<()> {
        self.step(Instant::now(), ctx);
        Ok(())
    }

    fn finish(&mut self, ctx: &WorkerContext) {
        if self.flying {
            info!(worker = %ctx.name(), "landing drone");
            self.dispatch(DroneCommand::Rc(CommandState::ZERO));
            self.dispatch(DroneCommand::Land);
            self.flying = false;
        }
        if self.streaming {
            self.dispatch(DroneCommand::StreamOff);
            self.streaming = false;
        }
        debug!(worker = %ctx.name(), "ending drone connection");
        self.dispatch(DroneCommand::Disconnect);
    }
}

inventory::submit! {
    WorkerRegistration::new("drone", "Drone follow control loop", Drone::from_config)
}
