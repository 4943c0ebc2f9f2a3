//! Proportional follow control.
//!
//! Pure functions turning a normalized target observation into an RC
//! command, so the state machine can be exercised without a vehicle.

use std::time::Duration;

use crate::core::Target;
use crate::hal::{CommandState, DroneDriver, RC_LIMIT};

/// Physical capabilities of the vehicle used to scale commands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kinematics {
    /// cm/s
    pub max_linear_velocity: f64,
    /// cm/s
    pub max_vertical_velocity: f64,
    /// deg/s
    pub max_angular_velocity: f64,
    /// degrees
    pub field_of_view: f64,
}

impl Kinematics {
    pub fn of(driver: &dyn DroneDriver) -> Self {
        Self {
            max_linear_velocity: driver.max_linear_velocity(),
            max_vertical_velocity: driver.max_vertical_velocity(),
            max_angular_velocity: driver.max_angular_velocity(),
            field_of_view: driver.field_of_view(),
        }
    }
}

/// Tuning of the follow behavior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FollowSettings {
    /// Deviations smaller than this leave their axis at rest
    pub movement_threshold: f64,
    /// Desired box width as a fraction of the frame width
    pub target_width: f64,
    /// Point of the box height kept at frame center, 0 = top edge
    pub target_height_anchor: f64,
    /// Share of the angular offset corrected by one yaw burst
    pub percent_angle_to_command: f64,
}

/// Result of one follow step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FollowOutput {
    pub command: CommandState,
    /// Length of the full-rate yaw burst to start, if any
    pub yaw_burst: Option<Duration>,
}

/// Convert a physical velocity into an RC command value.
pub fn velocity_to_command(velocity: f64, max_velocity: f64) -> i32 {
    if max_velocity <= 0.0 || !velocity.is_finite() {
        return 0;
    }
    let command = (velocity / max_velocity * RC_LIMIT as f64).round() as i32;
    command.clamp(-RC_LIMIT, RC_LIMIT)
}

/// Time to rotate at full rate to cover a normalized horizontal offset.
///
/// Saturates at [`Duration::MAX`] when the rotation would outlast any clock.
pub fn yaw_burst_duration(offset: f64, field_of_view: f64, percent_angle_to_command: f64, max_angular_velocity: f64) -> Duration {
    if max_angular_velocity <= 0.0 {
        return Duration::ZERO;
    }
    let angle = (offset * (field_of_view / 2.0) * (percent_angle_to_command / 100.0)).abs();
    let seconds = angle / max_angular_velocity;
    if seconds.is_nan() {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

/// Width of a normalized box as a fraction of the frame width.
pub fn box_width(bbox: &[f64; 4]) -> f64 {
    ((bbox[2] - bbox[0]) / 2.0).abs()
}

/// Vertical position of the anchor point on a normalized box.
pub fn anchor_y(bbox: &[f64; 4], anchor: f64) -> f64 {
    bbox[1] + anchor * (bbox[3] - bbox[1])
}

/// Compute the command that brings `target` back to the desired framing.
///
/// `yaw_allowed` is false while the minimum delay between yaw bursts has not
/// elapsed; the yaw axis then stays at rest.
pub fn follow(target: &Target, settings: &FollowSettings, kinematics: &Kinematics, yaw_allowed: bool) -> FollowOutput {
    let threshold = settings.movement_threshold;

    let width_error = settings.target_width - box_width(&target.bbox);
    let fb = if width_error.abs() < threshold {
        0
    } else {
        let velocity = width_error * kinematics.max_linear_velocity * target.confidence;
        velocity_to_command(velocity, kinematics.max_linear_velocity)
    };

    // Positive y is below center, positive ud is up.
    let height_error = anchor_y(&target.bbox, settings.target_height_anchor);
    let ud = if height_error.abs() < threshold {
        0
    } else {
        let velocity = -height_error * kinematics.max_vertical_velocity * target.confidence;
        velocity_to_command(velocity, kinematics.max_vertical_velocity)
    };

    let mut yaw = 0;
    let mut yaw_burst = None;
    if target.x.abs() >= threshold && yaw_allowed {
        yaw = if target.x > 0.0 { RC_LIMIT } else { -RC_LIMIT };
        yaw_burst = Some(yaw_burst_duration(
            target.x,
            kinematics.field_of_view,
            settings.percent_angle_to_command,
            kinematics.max_angular_velocity,
        ));
    }

    FollowOutput {
        command: CommandState::new(0, fb, ud, yaw),
        yaw_burst,
    }
}
